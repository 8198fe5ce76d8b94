// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::routing::{HierarchyDescriptor, RoutingAlgorithm};
use crate::swap::{WhenToSwap, WhichToSwap};
use crate::{Cycle, Error};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// The default number of virtual channels per virtual network.
const VCS_PER_VNET: usize = 4;

/// The default depth, in flits, of each virtual channel buffer.
const BUFFERS_PER_VC: usize = 4;

/// Which physical topology the network is wired as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum TopologyKind {
    /// A `num_rows` x `num_cols` mesh.
    Mesh,
    /// Chiplet meshes bridged by an interposer mesh, as described by a
    /// `HierarchyDescriptor`.
    HetMeshes,
}

impl FromStr for TopologyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mesh" | "mesh" => Ok(TopologyKind::Mesh),
            "HetMeshes" | "het_meshes" => Ok(TopologyKind::HetMeshes),
            _ => Err(Error::InvalidConfiguration(format!(
                "Invalid topology: {}",
                s
            ))),
        }
    }
}

/// Network-wide, static parameters shared by every router.
///
/// Constructed programmatically or read from a YAML file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfiguration {
    pub topology: TopologyKind,
    pub num_rows: usize,
    pub num_cols: usize,
    pub num_routers: usize,
    /// Terminals (network interfaces) attached to each router.
    pub terminals_per_router: usize,
    pub routing_algorithm: RoutingAlgorithm,
    pub enable_interswap: bool,
    pub when_to_swap: WhenToSwap,
    pub which_to_swap: WhichToSwap,
    /// One entry per virtual network: whether its traffic must be delivered
    /// in order.
    pub ordered_vnets: Vec<bool>,
    pub vcs_per_vnet: usize,
    pub buffers_per_vc: usize,
    pub link_latency: Cycle,
    /// Seed of the random source injected into routing decisions.
    pub seed: u64,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            topology: TopologyKind::Mesh,
            num_rows: 4,
            num_cols: 4,
            num_routers: 16,
            terminals_per_router: 1,
            routing_algorithm: RoutingAlgorithm::Table,
            enable_interswap: false,
            when_to_swap: WhenToSwap::Tdm1,
            which_to_swap: WhichToSwap::DisableLocalSwap,
            ordered_vnets: vec![false, false, false],
            vcs_per_vnet: VCS_PER_VNET,
            buffers_per_vc: BUFFERS_PER_VC,
            link_latency: 1,
            seed: 0x87654321FEDCBA09u64,
        }
    }
}

impl NetworkConfiguration {
    /// A mesh of `rows` x `cols` routers, one terminal each.
    pub fn mesh(rows: usize, cols: usize) -> Self {
        Self {
            num_rows: rows,
            num_cols: cols,
            num_routers: rows * cols,
            ..Default::default()
        }
    }

    /// The chiplet + interposer system described by `hierarchy`, routed
    /// with the hierarchical algorithm.
    pub fn het_meshes(hierarchy: HierarchyDescriptor) -> Self {
        Self {
            topology: TopologyKind::HetMeshes,
            num_rows: hierarchy.band_rows(),
            num_cols: hierarchy.band_cols,
            num_routers: hierarchy.num_routers(),
            routing_algorithm: RoutingAlgorithm::Custom(hierarchy),
            ..Default::default()
        }
    }

    pub fn num_vnets(&self) -> usize {
        self.ordered_vnets.len()
    }

    pub fn num_vcs(&self) -> usize {
        self.num_vnets() * self.vcs_per_vnet
    }

    pub fn num_terminals(&self) -> usize {
        self.num_routers * self.terminals_per_router
    }

    pub fn is_vnet_ordered(&self, vnet: usize) -> bool {
        self.ordered_vnets.get(vnet).copied().unwrap_or(false)
    }

    /// The hierarchy used to wire a `HetMeshes` topology: the one carried by
    /// the custom routing algorithm, or the default chiplet system.
    pub fn hierarchy(&self) -> HierarchyDescriptor {
        match &self.routing_algorithm {
            RoutingAlgorithm::Custom(hierarchy) => hierarchy.clone(),
            _ => HierarchyDescriptor::het_meshes(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));
        if self.num_rows == 0 || self.num_cols == 0 {
            return invalid(format!(
                "mesh dimensions must be positive, got {}x{}",
                self.num_rows, self.num_cols
            ));
        }
        if self.num_vnets() == 0 {
            return invalid("at least one virtual network is required".to_string());
        }
        if self.vcs_per_vnet == 0 || self.buffers_per_vc == 0 {
            return invalid("virtual channels need at least one buffer".to_string());
        }
        if self.terminals_per_router == 0 {
            return invalid("every router needs a terminal".to_string());
        }
        if self.link_latency == 0 {
            return invalid("links have at least one cycle of latency".to_string());
        }
        match self.topology {
            TopologyKind::Mesh => {
                if self.num_rows * self.num_cols != self.num_routers {
                    return invalid(format!(
                        "{} routers do not fill a {}x{} mesh",
                        self.num_routers, self.num_rows, self.num_cols
                    ));
                }
            }
            TopologyKind::HetMeshes => {
                let hierarchy = self.hierarchy();
                hierarchy.validate()?;
                if hierarchy.num_routers() != self.num_routers {
                    return invalid(format!(
                        "hierarchy describes {} routers, configuration has {}",
                        hierarchy.num_routers(),
                        self.num_routers
                    ));
                }
            }
        }
        if let RoutingAlgorithm::Custom(hierarchy) = &self.routing_algorithm {
            hierarchy.validate()?;
            if hierarchy.num_routers() != self.num_routers || hierarchy.band_cols != self.num_cols {
                return invalid(format!(
                    "hierarchical routing over {} routers in rows of {} does not fit {} routers \
                     in rows of {}",
                    hierarchy.num_routers(),
                    hierarchy.band_cols,
                    self.num_routers,
                    self.num_cols
                ));
            }
            // a plain mesh has none of the bridges the gateways rely on
            if self.topology == TopologyKind::Mesh {
                return invalid("hierarchical routing needs a het-meshes topology".to_string());
            }
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(file_name: P) -> anyhow::Result<Self> {
        let file = File::open(file_name.as_ref())
            .with_context(|| format!("opening {}", file_name.as_ref().display()))?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(config: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(config)
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}
