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

use crate::routing::FreeVcQuery;
use crate::PortDirection;

/// Credit counters for the virtual channels downstream of one output port.
///
/// Local ports feed terminals, which always sink flits; they carry no
/// credits.
#[derive(Clone, Debug)]
pub struct OutputUnit {
    direction: PortDirection,
    credits: Vec<usize>,
    depth: usize,
    vcs_per_vnet: usize,
}

impl OutputUnit {
    pub fn new(
        direction: PortDirection,
        num_vcs: usize,
        vcs_per_vnet: usize,
        depth: usize,
    ) -> Self {
        Self {
            direction,
            credits: vec![depth; num_vcs],
            depth,
            vcs_per_vnet,
        }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn is_sink(&self) -> bool {
        self.direction.is_local()
    }

    pub fn has_credit(&self, vc: usize) -> bool {
        self.is_sink() || self.credits[vc] > 0
    }

    pub fn has_free_vc(&self, vnet: usize) -> bool {
        let first = vnet * self.vcs_per_vnet;
        (first..first + self.vcs_per_vnet).any(|vc| self.has_credit(vc))
    }

    pub fn consume_credit(&mut self, vc: usize) {
        if self.is_sink() {
            return;
        }
        assert!(self.credits[vc] > 0, "{} vc {} has no credit", self.direction, vc);
        self.credits[vc] -= 1;
    }

    pub fn return_credit(&mut self, vc: usize) {
        assert!(
            self.credits[vc] < self.depth,
            "{} vc {} returned more credits than buffers",
            self.direction,
            vc
        );
        self.credits[vc] += 1;
    }
}

impl FreeVcQuery for Vec<OutputUnit> {
    fn has_free_vc(&self, outport: usize, vnet: usize) -> bool {
        self.get(outport).map_or(false, |unit| unit.has_free_vc(vnet))
    }
}
