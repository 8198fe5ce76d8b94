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

mod config;
mod error;
mod flit;
mod network;
mod ports;
mod router;
pub mod routing;
mod swap;
pub mod topologies;

// Public types
// type to use for cycles
pub type Cycle = usize;

pub use crate::config::{NetworkConfiguration, TopologyKind};
pub use crate::error::Error;
pub use crate::flit::{
    DestinationSet, Flit, FlitStage, FlitType, Message, MsgPtr, Packet, RouteInfo,
    FLITS_PER_BLOCK,
};
pub use crate::network::{Network, NetworkStats};
pub use crate::ports::{PortDirection, PortDirectionMap};
pub use crate::router::{Departure, Router, SwapTarget};
pub use crate::routing::{HierarchyDescriptor, RoutingAlgorithm, RoutingUnit};
pub use crate::swap::{
    DeclineReason, SwapCalendar, SwapOutcome, SwapPointer, SwapScheduler, SwapState, WhenToSwap,
    WhichToSwap,
};
pub use crate::topologies::Topology;
