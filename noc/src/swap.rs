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

//! Time-division multiplexed port swapping.
//!
//! Routers take turns: in a rotation of `multiplier * num_routers` cycles,
//! router `r` owns cycle `r` and may hand the head flit of one of its input
//! virtual channels directly to the downstream router, bypassing switch
//! allocation. At most one router swaps in any cycle.

use crate::{Cycle, Error, Flit, PortDirection};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How often a router gets a swap turn, as a multiple of the number of
/// routers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum WhenToSwap {
    Tdm1,
    Tdm2,
    Tdm4,
    Tdm8,
    Tdm16,
    Tdm32,
    Tdm64,
    Tdm512,
    Tdm1024,
    Tdm2048,
}

impl WhenToSwap {
    pub fn multiplier(&self) -> usize {
        match self {
            Self::Tdm1 => 1,
            Self::Tdm2 => 2,
            Self::Tdm4 => 4,
            Self::Tdm8 => 8,
            Self::Tdm16 => 16,
            Self::Tdm32 => 32,
            Self::Tdm64 => 64,
            Self::Tdm512 => 512,
            Self::Tdm1024 => 1024,
            Self::Tdm2048 => 2048,
        }
    }

    fn from_multiplier(multiplier: usize) -> Option<Self> {
        let when = match multiplier {
            1 => Self::Tdm1,
            2 => Self::Tdm2,
            4 => Self::Tdm4,
            8 => Self::Tdm8,
            16 => Self::Tdm16,
            32 => Self::Tdm32,
            64 => Self::Tdm64,
            512 => Self::Tdm512,
            1024 => Self::Tdm1024,
            2048 => Self::Tdm2048,
            _ => return None,
        };
        Some(when)
    }
}

impl FromStr for WhenToSwap {
    type Err = Error;

    /// Accepts "tdm", "4tdm", "Tdm4" or the bare multiplier, "4".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let digits = lower.trim_start_matches("tdm").trim_end_matches("tdm");
        let multiplier = if digits.is_empty() {
            Some(1)
        } else {
            digits.parse::<usize>().ok()
        };
        multiplier
            .and_then(Self::from_multiplier)
            .ok_or_else(|| Error::InvalidConfiguration(format!("Invalid swap period: {}", s)))
    }
}

/// Whether a swap may deliver a flit straight to a local terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum WhichToSwap {
    DisableLocalSwap,
    EnableLocalSwap,
}

impl FromStr for WhichToSwap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" | "DisableLocalSwap" => Ok(Self::DisableLocalSwap),
            "enable" | "EnableLocalSwap" => Ok(Self::EnableLocalSwap),
            _ => Err(Error::InvalidConfiguration(format!(
                "Invalid local swap policy: {}",
                s
            ))),
        }
    }
}

/// The swap rotation shared by all routers of a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapCalendar {
    num_routers: usize,
    period: Cycle,
}

impl SwapCalendar {
    pub fn new(when: WhenToSwap, num_routers: usize) -> Self {
        assert!(num_routers > 0);
        Self {
            num_routers,
            period: when.multiplier() * num_routers,
        }
    }

    /// Length of one full rotation.
    pub fn period(&self) -> Cycle {
        self.period
    }

    /// The router whose turn it is at `cycle`, if any.
    pub fn owner(&self, cycle: Cycle) -> Option<usize> {
        let slot = cycle % self.period;
        if slot < self.num_routers {
            Some(slot)
        } else {
            None
        }
    }

    pub fn is_turn(&self, cycle: Cycle, router_id: usize) -> bool {
        cycle % self.period == router_id
    }
}

/// The input virtual channel a router considers for its next swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapPointer {
    /// Set once the pointed-to flit has been committed to a swap.
    pub valid: bool,
    pub inport: usize,
    pub vc: usize,
    pub vnet: usize,
    pub inport_dirn: PortDirection,
}

impl Default for SwapPointer {
    fn default() -> Self {
        Self {
            valid: false,
            inport: 0,
            vc: 0,
            vnet: 0,
            inport_dirn: PortDirection::Local,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    Offering,
    Committed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclineReason {
    /// The flit is bound for a terminal and local swaps are disabled.
    LocalSwapDisabled,
    /// The flit has not been routed at this router yet.
    Unrouted,
    /// The downstream virtual channel is full.
    NoCredit,
    /// This router is still completing an earlier swap.
    SwapInProgress,
    /// The downstream router is completing a swap.
    PeerBusy,
}

/// The result of one swap turn.
#[derive(Debug)]
pub enum SwapOutcome {
    NotMyTurn,
    /// The designated virtual channel holds no flit.
    Empty,
    Declined(DeclineReason),
    Committed {
        inport: usize,
        vc: usize,
        outport: usize,
        /// The swapped flit, bound for whatever lies behind `outport`.
        flit: Flit,
    },
}

impl SwapOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SwapOutcome::Committed { .. })
    }
}

/// Per-router swap bookkeeping.
#[derive(Clone, Debug)]
pub struct SwapScheduler {
    state: SwapState,
    ptr: SwapPointer,
    /// The router is part of a swap until this cycle.
    busy_until: Cycle,
    num_inports: usize,
    num_vcs: usize,
}

impl SwapScheduler {
    pub fn new(num_vcs: usize) -> Self {
        Self {
            state: SwapState::Idle,
            ptr: SwapPointer::default(),
            busy_until: 0,
            num_inports: 0,
            num_vcs,
        }
    }

    /// Grows the round-robin range as input ports get attached.
    pub fn set_num_inports(&mut self, num_inports: usize) {
        self.num_inports = num_inports;
    }

    pub fn state(&self) -> SwapState {
        self.state
    }

    pub fn pointer(&self) -> SwapPointer {
        self.ptr
    }

    /// True while the router takes part in a swap started at an earlier turn.
    pub fn is_swap(&self, cycle: Cycle) -> bool {
        cycle < self.busy_until
    }

    pub fn mark_swap(&mut self, until: Cycle) {
        self.busy_until = self.busy_until.max(until);
    }

    /// Starts a turn. The pointer keeps its position, but a new turn never
    /// inherits the previous commitment.
    pub fn begin_turn(&mut self) -> SwapPointer {
        self.state = SwapState::Offering;
        self.ptr.valid = false;
        self.ptr
    }

    pub fn commit(&mut self, vnet: usize, inport_dirn: PortDirection) {
        assert_eq!(self.state, SwapState::Offering, "commit outside of a turn");
        self.ptr.valid = true;
        self.ptr.vnet = vnet;
        self.ptr.inport_dirn = inport_dirn;
        self.state = SwapState::Committed;
    }

    /// Ends the turn and advances the pointer, virtual channels first, then
    /// input ports.
    pub fn mov_swap_ptr(&mut self) {
        self.state = SwapState::Idle;
        if self.num_inports == 0 {
            return;
        }
        self.ptr.vc += 1;
        if self.ptr.vc == self.num_vcs {
            self.ptr.vc = 0;
            self.ptr.inport = (self.ptr.inport + 1) % self.num_inports;
        }
    }
}
