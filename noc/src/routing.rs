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

//! The routing decision engine: picks the output port of a flit at the
//! router currently holding it.

mod hierarchy;
pub mod mesh;
mod table;

pub use hierarchy::{Bridge, ChipletBand, HierarchyDescriptor, Leg};
pub use mesh::TurnPolicy;
pub use table::{RoutingTable, INFINITE_WEIGHT};

use crate::{
    DestinationSet, Error, NetworkConfiguration, PortDirection, PortDirectionMap, RouteInfo,
};
use log::trace;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum RoutingAlgorithm {
    /// Minimal-weight lookup in the routing table built from the topology.
    Table,
    Xy,
    TurnModelOblivious,
    TurnModelAdaptive,
    RandomOblivious,
    RandomAdaptive,
    /// Chiplets bridged by an interposer.
    Custom(HierarchyDescriptor),
}

impl FromStr for RoutingAlgorithm {
    type Err = Error;

    /// Accepts algorithm names as well as their numeric codes, 0 to 6.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "table" | "Table" => Ok(Self::Table),
            "1" | "xy" | "Xy" => Ok(Self::Xy),
            "2" | "turn_model_oblivious" | "TurnModelOblivious" => Ok(Self::TurnModelOblivious),
            "3" | "turn_model_adaptive" | "TurnModelAdaptive" => Ok(Self::TurnModelAdaptive),
            "4" | "random_oblivious" | "RandomOblivious" => Ok(Self::RandomOblivious),
            "5" | "random_adaptive" | "RandomAdaptive" => Ok(Self::RandomAdaptive),
            "6" | "custom" | "Custom" => Ok(Self::Custom(HierarchyDescriptor::het_meshes())),
            _ => Err(Error::InvalidConfiguration(format!(
                "Invalid routing algorithm: {}",
                s
            ))),
        }
    }
}

/// Occupancy of a router's output ports, as seen by adaptive routing.
pub trait FreeVcQuery {
    /// Whether output port `outport` has a virtual channel of `vnet` with
    /// buffer space downstream.
    fn has_free_vc(&self, outport: usize, vnet: usize) -> bool;
}

/// What a routing decision may consult besides the flit itself.
pub struct RoutingContext<'a> {
    pub config: &'a NetworkConfiguration,
    pub occupancy: &'a dyn FreeVcQuery,
    pub rng: &'a mut dyn RngCore,
}

/// Per-router routing state: the routing table and the port direction maps.
#[derive(Clone, Debug)]
pub struct RoutingUnit {
    router_id: usize,
    table: RoutingTable,
    inports: PortDirectionMap,
    outports: PortDirectionMap,
}

impl RoutingUnit {
    pub fn new(router_id: usize) -> Self {
        Self {
            router_id,
            table: RoutingTable::new(),
            inports: PortDirectionMap::new(),
            outports: PortDirectionMap::new(),
        }
    }

    /// Adds the table entry of the next output port.
    pub fn add_route(&mut self, entry: DestinationSet, weight: u32) {
        self.table.add_route(entry, weight);
    }

    pub fn add_in_direction(&mut self, dirn: PortDirection, inport: usize) {
        self.inports.add(dirn, inport);
    }

    pub fn add_out_direction(&mut self, dirn: PortDirection, outport: usize) {
        self.outports.add(dirn, outport);
    }

    pub fn inports(&self) -> &PortDirectionMap {
        &self.inports
    }

    pub fn outports(&self) -> &PortDirectionMap {
        &self.outports
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn lookup_routing_table(
        &self,
        vnet: usize,
        dest: &DestinationSet,
        ctx: &mut RoutingContext,
    ) -> Result<usize, Error> {
        let ordered = ctx.config.is_vnet_ordered(vnet);
        self.table
            .lookup(dest, ordered, ctx.rng)
            .ok_or(Error::NoRoute {
                router: self.router_id,
                vnet,
            })
    }

    fn outport_index(&self, dirn: PortDirection) -> Result<usize, Error> {
        self.outports.index(dirn).ok_or(Error::UnknownDirection {
            router: self.router_id,
            direction: dirn,
        })
    }

    /// Chooses the output port of a flit that entered through `inport`.
    ///
    /// Flits that have reached their destination router always use the
    /// routing table, which tells the local ports apart.
    pub fn outport_compute(
        &self,
        route: &RouteInfo,
        inport: usize,
        inport_dirn: PortDirection,
        vc: usize,
        ctx: &mut RoutingContext,
    ) -> Result<usize, Error> {
        let my_id = self.router_id;
        if route.dest_router == my_id {
            return self.lookup_routing_table(route.vnet, &route.net_dest, ctx);
        }
        let config = ctx.config;
        let cols = config.num_cols;
        let dest = route.dest_router;
        let occupancy = ctx.occupancy;
        let vnet = route.vnet;
        let outports = &self.outports;
        let has_free_vc = move |dirn: PortDirection| {
            outports
                .index(dirn)
                .map_or(false, |outport| occupancy.has_free_vc(outport, vnet))
        };
        let dirn = match &config.routing_algorithm {
            RoutingAlgorithm::Table => {
                return self.lookup_routing_table(route.vnet, &route.net_dest, ctx)
            }
            RoutingAlgorithm::Xy => mesh::xy_direction(my_id, dest, cols, inport_dirn),
            RoutingAlgorithm::TurnModelOblivious => {
                mesh::oblivious_direction(my_id, dest, cols, TurnPolicy::TurnModel, ctx.rng)
            }
            RoutingAlgorithm::TurnModelAdaptive => mesh::adaptive_direction(
                my_id,
                dest,
                cols,
                TurnPolicy::TurnModel,
                &has_free_vc,
                ctx.rng,
            ),
            RoutingAlgorithm::RandomOblivious => {
                mesh::oblivious_direction(my_id, dest, cols, TurnPolicy::Random, ctx.rng)
            }
            RoutingAlgorithm::RandomAdaptive => mesh::adaptive_direction(
                my_id,
                dest,
                cols,
                TurnPolicy::Random,
                &has_free_vc,
                ctx.rng,
            ),
            RoutingAlgorithm::Custom(hierarchy) => {
                hierarchy.direction(my_id, route.src_router, dest, inport_dirn, ctx.rng)
            }
        };
        trace!(
            "router {}: flit for router {} from inport {} ({}) vc {} goes {}",
            my_id,
            dest,
            inport,
            inport_dirn,
            vc,
            dirn
        );
        self.outport_index(dirn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::tests::route;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use crate::PortDirection::*;
    use std::collections::HashSet;

    /// Output ports listed here have no free virtual channel.
    struct Busy(HashSet<usize>);

    impl FreeVcQuery for Busy {
        fn has_free_vc(&self, outport: usize, _vnet: usize) -> bool {
            !self.0.contains(&outport)
        }
    }

    // Router 5 of a 4x4 mesh, ports in order Local, North, East, South, West.
    fn unit() -> RoutingUnit {
        let mut unit = RoutingUnit::new(5);
        let mut local = DestinationSet::new(16);
        local.add(5);
        unit.add_route(local, 1);
        unit.add_in_direction(Local, 0);
        unit.add_out_direction(Local, 0);
        for (idx, dirn) in PortDirection::CARDINALS.iter().enumerate() {
            let mut reach = DestinationSet::new(16);
            match dirn {
                North => (9..16).for_each(|t| reach.add(t)),
                East => reach.add(6),
                South => (0..4).for_each(|t| reach.add(t)),
                _ => reach.add(4),
            }
            unit.add_route(reach, 1);
            unit.add_in_direction(*dirn, idx + 1);
            unit.add_out_direction(*dirn, idx + 1);
        }
        unit
    }

    fn compute(
        unit: &RoutingUnit,
        algorithm: RoutingAlgorithm,
        dest: usize,
        inport_dirn: PortDirection,
        busy: &[usize],
        rng: &mut Xoshiro256StarStar,
    ) -> Result<usize, Error> {
        let config = NetworkConfiguration {
            routing_algorithm: algorithm,
            ..Default::default()
        };
        let occupancy = Busy(busy.iter().copied().collect());
        let mut ctx = RoutingContext {
            config: &config,
            occupancy: &occupancy,
            rng,
        };
        let inport = unit.inports().index(inport_dirn).unwrap();
        unit.outport_compute(&route(5, dest, 16), inport, inport_dirn, 0, &mut ctx)
    }

    #[test]
    fn parse_algorithms() {
        assert_eq!("xy".parse::<RoutingAlgorithm>().unwrap(), RoutingAlgorithm::Xy);
        assert_eq!(
            "3".parse::<RoutingAlgorithm>().unwrap(),
            RoutingAlgorithm::TurnModelAdaptive
        );
        assert_eq!(
            "custom".parse::<RoutingAlgorithm>().unwrap(),
            RoutingAlgorithm::Custom(HierarchyDescriptor::het_meshes())
        );
        assert!("7".parse::<RoutingAlgorithm>().is_err());
    }

    #[test]
    fn destination_router_uses_the_table() {
        let unit = unit();
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        for algorithm in vec![RoutingAlgorithm::Xy, RoutingAlgorithm::RandomAdaptive] {
            assert_eq!(compute(&unit, algorithm, 5, West, &[], &mut rng), Ok(0));
        }
    }

    #[test]
    fn xy_maps_directions_to_ports() {
        let unit = unit();
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let east = unit.outports().index(East).unwrap();
        let north = unit.outports().index(North).unwrap();
        let xy = RoutingAlgorithm::Xy;
        assert_eq!(compute(&unit, xy.clone(), 7, Local, &[], &mut rng), Ok(east));
        assert_eq!(compute(&unit, xy, 13, West, &[], &mut rng), Ok(north));
    }

    #[test]
    fn table_routing_reports_missing_routes() {
        let unit = unit();
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        assert_eq!(
            compute(&unit, RoutingAlgorithm::Table, 3, Local, &[], &mut rng),
            Ok(unit.outports().index(South).unwrap())
        );
        // nothing in the table reaches terminal 7
        assert_eq!(
            compute(&unit, RoutingAlgorithm::Table, 7, Local, &[], &mut rng),
            Err(Error::NoRoute { router: 5, vnet: 0 })
        );
    }

    #[test]
    fn adaptive_avoids_busy_ports() {
        let unit = unit();
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let west = unit.outports().index(West).unwrap();
        let south = unit.outports().index(South).unwrap();
        // router 0 is south-west of router 5
        for _ in 0..16 {
            let turn_model = RoutingAlgorithm::TurnModelAdaptive;
            assert_eq!(
                compute(&unit, turn_model, 0, Local, &[west], &mut rng),
                Ok(south)
            );
            let random = RoutingAlgorithm::RandomAdaptive;
            assert_eq!(
                compute(&unit, random, 0, Local, &[south], &mut rng),
                Ok(west)
            );
        }
    }

    #[test]
    fn missing_port_is_an_error() {
        let mut unit = RoutingUnit::new(0);
        unit.add_route(DestinationSet::single(0, 16), 1);
        unit.add_in_direction(Local, 0);
        unit.add_out_direction(Local, 0);
        let config = NetworkConfiguration {
            routing_algorithm: RoutingAlgorithm::Xy,
            ..Default::default()
        };
        let occupancy = Busy(HashSet::new());
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let mut ctx = RoutingContext {
            config: &config,
            occupancy: &occupancy,
            rng: &mut rng,
        };
        assert_eq!(
            unit.outport_compute(&route(0, 1, 16), 0, Local, 0, &mut ctx),
            Err(Error::UnknownDirection {
                router: 0,
                direction: East
            })
        );
    }
}
