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

use crate::{Flit, PortDirection};
use std::collections::VecDeque;

/// The virtual channel buffers behind one input port.
#[derive(Clone, Debug)]
pub struct InputUnit {
    direction: PortDirection,
    vcs: Vec<VecDeque<Flit>>,
    depth: usize,
}

impl InputUnit {
    pub fn new(direction: PortDirection, num_vcs: usize, depth: usize) -> Self {
        Self {
            direction,
            vcs: (0..num_vcs).map(|_| VecDeque::with_capacity(depth)).collect(),
            depth,
        }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn num_vcs(&self) -> usize {
        self.vcs.len()
    }

    pub fn has_space(&self, vc: usize) -> bool {
        self.vcs[vc].len() < self.depth
    }

    /// Appends `flit` to its virtual channel, handing it back when the
    /// buffer is full.
    pub fn enqueue(&mut self, mut flit: Flit) -> Result<(), Flit> {
        let vc = flit.vc();
        if !self.has_space(vc) {
            return Err(flit);
        }
        flit.clear_outport();
        self.vcs[vc].push_back(flit);
        Ok(())
    }

    pub fn peek(&self, vc: usize) -> Option<&Flit> {
        self.vcs[vc].front()
    }

    pub fn peek_mut(&mut self, vc: usize) -> Option<&mut Flit> {
        self.vcs[vc].front_mut()
    }

    pub fn dequeue(&mut self, vc: usize) -> Option<Flit> {
        self.vcs[vc].pop_front()
    }

    pub fn occupancy(&self) -> usize {
        self.vcs.iter().map(|vc| vc.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vcs.iter().all(|vc| vc.is_empty())
    }

    pub fn flits(&self) -> impl Iterator<Item = &Flit> {
        self.vcs.iter().flat_map(|vc| vc.iter())
    }
}
