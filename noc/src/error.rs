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

use std::fmt;

use crate::PortDirection;

/// Errors surfaced by the router core.
///
/// All of them are fatal for a simulation run: they describe an invalid
/// topology, weight assignment or configuration, never a transient
/// condition. Logic invariants (e.g., a zero-delta hop) are asserted instead.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// No routing table entry intersects the destination set.
    NoRoute { router: usize, vnet: usize },
    /// A routing decision or a swap named a direction this router has no
    /// port for.
    UnknownDirection {
        router: usize,
        direction: PortDirection,
    },
    InvalidPort { router: usize, port: usize },
    InvalidConfiguration(String),
    InvalidTopology(String),
    /// A flit was written into a full virtual channel.
    BufferOverflow { router: usize, port: usize, vc: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoRoute { router, vnet } => write!(
                f,
                "ERROR: No route exists from router {} for vnet {}",
                router, vnet
            ),
            Self::UnknownDirection { router, direction } => write!(
                f,
                "ERROR: Router {} has no port in direction {}",
                router, direction
            ),
            Self::InvalidPort { router, port } => {
                write!(f, "ERROR: Invalid port {} for router {}", port, router)
            }
            Self::BufferOverflow { router, port, vc } => write!(
                f,
                "ERROR: Buffer overflow at router {} port {} vc {}",
                router, port, vc
            ),
            Self::InvalidConfiguration(msg) => write!(f, "ERROR: Invalid configuration: {}", msg),
            Self::InvalidTopology(msg) => write!(f, "ERROR: Invalid topology: {}", msg),
        }
    }
}

// Allows `anyhow::Result` to carry our errors in the binaries.
impl std::error::Error for Error {}
