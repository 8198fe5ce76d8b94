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

use crate::{Cycle, DestinationSet, Error, NetworkConfiguration, PortDirection, TopologyKind};
use petgraph::algo::dijkstra;
use petgraph::graph::node_index;
use petgraph::prelude::*;
use std::collections::{HashMap, HashSet};

mod het_meshes;
mod mesh;

pub use het_meshes::het_meshes;
pub use mesh::mesh;

/// One direction of a physical link between two routers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSpec {
    /// Direction of the output port at the source router.
    pub src_outport: PortDirection,
    /// Direction of the input port at the destination router.
    pub dst_inport: PortDirection,
    pub latency: Cycle,
    /// Routing weight; among the links on shortest paths, table routing
    /// prefers the lightest.
    pub weight: u32,
}

/// The routers and links of a network. Node `i` of the graph is router `i`.
///
/// Terminal `t` attaches to router `t % num_routers`, so every router has
/// `terminals_per_router` local ports.
#[derive(Clone, Debug)]
pub struct Topology {
    graph: Graph<usize, LinkSpec>,
    terminals_per_router: usize,
}

impl Topology {
    pub fn new(num_routers: usize, terminals_per_router: usize) -> Self {
        let mut graph = Graph::new();
        for id in 0..num_routers {
            graph.add_node(id);
        }
        Self {
            graph,
            terminals_per_router,
        }
    }

    /// Builds the topology named by `config`.
    pub fn from_config(config: &NetworkConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let topology = match config.topology {
            TopologyKind::Mesh => mesh(config),
            TopologyKind::HetMeshes => het_meshes(config, &config.hierarchy()),
        };
        topology.validate()?;
        Ok(topology)
    }

    pub fn graph(&self) -> &Graph<usize, LinkSpec> {
        &self.graph
    }

    pub fn num_routers(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_terminals(&self) -> usize {
        self.num_routers() * self.terminals_per_router
    }

    pub fn terminals_per_router(&self) -> usize {
        self.terminals_per_router
    }

    pub fn router_of(&self, terminal: usize) -> usize {
        terminal % self.num_routers()
    }

    pub fn terminals_of(&self, router: usize) -> impl Iterator<Item = usize> {
        let num_routers = self.num_routers();
        (0..self.terminals_per_router).map(move |k| router + k * num_routers)
    }

    /// Adds a simplex link from router `src` to router `dst`.
    pub fn link_simplex(&mut self, src: usize, dst: usize, link: LinkSpec) -> EdgeIndex {
        self.graph.add_edge(node_index(src), node_index(dst), link)
    }

    /// Adds a pair of links between `a` and `b`: `a` reaches `b` through
    /// its `dirn` port, `b` reaches `a` through the opposite one.
    pub fn link_duplex(
        &mut self,
        a: usize,
        b: usize,
        dirn: PortDirection,
        latency: Cycle,
        weight: u32,
    ) {
        self.link_simplex(
            a,
            b,
            LinkSpec {
                src_outport: dirn,
                dst_inport: dirn.opposite(),
                latency,
                weight,
            },
        );
        self.link_simplex(
            b,
            a,
            LinkSpec {
                src_outport: dirn.opposite(),
                dst_inport: dirn,
                latency,
                weight,
            },
        );
    }

    /// The router reached by leaving `router` through its `dirn` port, and
    /// the link used.
    pub fn neighbor(&self, router: usize, dirn: PortDirection) -> Option<(usize, &LinkSpec)> {
        self.graph
            .edges_directed(node_index(router), Direction::Outgoing)
            .find(|edge| edge.weight().src_outport == dirn)
            .map(|edge| (edge.target().index(), edge.weight()))
    }

    /// Checks that port directions are unique per router and that every
    /// router can reach every other one.
    pub fn validate(&self) -> Result<(), Error> {
        for node in self.graph.node_indices() {
            for dir in [Direction::Outgoing, Direction::Incoming].iter() {
                let mut seen = HashSet::new();
                for edge in self.graph.edges_directed(node, *dir) {
                    let dirn = match dir {
                        Direction::Outgoing => edge.weight().src_outport,
                        Direction::Incoming => edge.weight().dst_inport,
                    };
                    if dirn.is_local() || !seen.insert(dirn) {
                        return Err(Error::InvalidTopology(format!(
                            "router {} has more than one {:?} port facing {}",
                            node.index(),
                            dir,
                            dirn
                        )));
                    }
                }
            }
        }
        for node in self.graph.node_indices() {
            let reachable = dijkstra(&self.graph, node, None, |_| 1u32);
            if reachable.len() != self.num_routers() {
                return Err(Error::InvalidTopology(format!(
                    "router {} reaches only {} of {} routers",
                    node.index(),
                    reachable.len(),
                    self.num_routers()
                )));
            }
        }
        Ok(())
    }

    /// The routing table entry of every link: the terminals for which the
    /// link lies on a minimum-weight path.
    pub fn routing_entries(&self) -> HashMap<EdgeIndex, DestinationSet> {
        let num_terminals = self.num_terminals();
        let distances = self
            .graph
            .node_indices()
            .map(|node| dijkstra(&self.graph, node, None, |edge| edge.weight().weight))
            .collect::<Vec<_>>();
        self.graph
            .edge_references()
            .map(|edge| {
                let (src, next) = (edge.source(), edge.target());
                let mut entry = DestinationSet::new(num_terminals);
                for dest in self.graph.node_indices() {
                    if dest == src {
                        continue;
                    }
                    let via = distances[next.index()]
                        .get(&dest)
                        .map(|d| d + edge.weight().weight);
                    if via.is_some() && via == distances[src.index()].get(&dest).copied() {
                        self.terminals_of(dest.index()).for_each(|t| entry.add(t));
                    }
                }
                (edge.id(), entry)
            })
            .collect()
    }
}

/// return the linear index of the element in a multi-dimensional grid
/// The element is represented as a vector of coordinates in `dims`.
fn linearize_index(elem: &[usize], dims: &[usize]) -> usize {
    elem.iter()
        .enumerate()
        .map(|(d, c)| c * dims[0..d].iter().product::<usize>())
        .sum()
}

/// given a linear index of the element, return the vector of coordinates in a
/// multi-dimensional grid of `dims` dimensions.
fn delinearize_index(index: usize, dims: &[usize]) -> Vec<usize> {
    let mut idx = index;
    let mut elem = vec![0; dims.len()];
    for (d, m) in dims.iter().enumerate() {
        elem[d] = idx % m;
        idx /= m;
    }
    elem
}

/// Wires routers `base..base + rows * cols` as a `rows` x `cols` mesh.
/// East/West links weigh `x_weight`, North/South links `y_weight`.
fn mesh_band(
    topology: &mut Topology,
    base: usize,
    rows: usize,
    cols: usize,
    latency: Cycle,
    (x_weight, y_weight): (u32, u32),
) {
    let dims = [cols, rows];
    for n in 0..rows * cols {
        let e = delinearize_index(n, &dims);
        if e[0] + 1 < cols {
            let east = linearize_index(&[e[0] + 1, e[1]], &dims);
            let dirn = PortDirection::East;
            topology.link_duplex(base + n, base + east, dirn, latency, x_weight);
        }
        if e[1] + 1 < rows {
            let north = linearize_index(&[e[0], e[1] + 1], &dims);
            let dirn = PortDirection::North;
            topology.link_duplex(base + n, base + north, dirn, latency, y_weight);
        }
    }
}
