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


use super::{mesh_band, LinkSpec, Topology};
use crate::routing::HierarchyDescriptor;
use crate::NetworkConfiguration;

/// Chiplet meshes stacked on an interposer mesh. Every band is a
/// `band_rows` x `band_cols` mesh; each bridge is a pair of links between a
/// chiplet router and an interposer router. All links weigh the same.
pub fn het_meshes(config: &NetworkConfiguration, hierarchy: &HierarchyDescriptor) -> Topology {
    let mut topology = Topology::new(hierarchy.num_routers(), config.terminals_per_router);
    let (rows, cols) = (hierarchy.band_rows(), hierarchy.band_cols);
    for band in 0..hierarchy.num_bands() {
        let base = band * hierarchy.band_size;
        mesh_band(&mut topology, base, rows, cols, config.link_latency, (1, 1));
    }
    for chiplet in hierarchy.chiplets.iter() {
        for bridge in chiplet.bridges.iter() {
            topology.link_simplex(
                bridge.chiplet_router,
                bridge.interposer_router,
                LinkSpec {
                    src_outport: chiplet.exit_direction,
                    dst_inport: chiplet.entry_direction,
                    latency: config.link_latency,
                    weight: 1,
                },
            );
            topology.link_simplex(
                bridge.interposer_router,
                bridge.chiplet_router,
                LinkSpec {
                    src_outport: chiplet.entry_direction,
                    dst_inport: chiplet.exit_direction,
                    latency: config.link_latency,
                    weight: 1,
                },
            );
        }
    }
    topology
}
