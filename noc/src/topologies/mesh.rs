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


use super::{mesh_band, Topology};
use crate::NetworkConfiguration;

/// Routing weight of East/West links. North/South links weigh more, which
/// makes table routing resolve ties between minimal paths X first.
const X_WEIGHT: u32 = 1;
const Y_WEIGHT: u32 = 2;

/// A `num_rows` x `num_cols` mesh. Router `id` sits at column
/// `id % num_cols` and row `id / num_cols`.
pub fn mesh(config: &NetworkConfiguration) -> Topology {
    let mut topology = Topology::new(config.num_routers, config.terminals_per_router);
    mesh_band(
        &mut topology,
        0,
        config.num_rows,
        config.num_cols,
        config.link_latency,
        (X_WEIGHT, Y_WEIGHT),
    );
    topology
}
