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

use crate::DestinationSet;
use itertools::Itertools;
use rand::Rng;
use rand_core::RngCore;

/// Weight of a link that should never be picked while another one reaches
/// the same destination.
pub const INFINITE_WEIGHT: u32 = 10000;

/// Per output port: the terminals reachable through it and the cost of
/// getting there.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    entries: Vec<DestinationSet>,
    weights: Vec<u32>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the entry for the next output port.
    pub fn add_route(&mut self, entry: DestinationSet, weight: u32) {
        self.entries.push(entry);
        self.weights.push(weight);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, outport: usize) -> Option<(&DestinationSet, u32)> {
        self.entries.get(outport).map(|e| (e, self.weights[outport]))
    }

    /// Output ports reaching `dest` at the minimal weight, in port order.
    pub fn candidates(&self, dest: &DestinationSet) -> Vec<usize> {
        let reaching = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| dest.intersects(entry))
            .map(|(outport, _)| outport)
            .collect::<Vec<_>>();
        let min_weight = match reaching.iter().map(|o| self.weights[*o]).min() {
            Some(weight) => weight,
            None => return vec![],
        };
        reaching
            .into_iter()
            .filter(|o| self.weights[*o] == min_weight)
            .collect_vec()
    }

    /// Picks one of the minimal-weight candidates: always the first one for
    /// `ordered` traffic, a uniformly random one otherwise.
    pub fn lookup(
        &self,
        dest: &DestinationSet,
        ordered: bool,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let candidates = self.candidates(dest);
        if candidates.is_empty() {
            return None;
        }
        let pick = if ordered {
            0
        } else {
            rng.gen_range(0..candidates.len())
        };
        Some(candidates[pick])
    }
}
