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

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// The symbolic direction of a router port.
///
/// Mesh-like topologies only ever need the four cardinal directions plus
/// `Local`, the port(s) connecting a router to its terminals.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Copy, Debug, Deserialize, Serialize)]
pub enum PortDirection {
    North,
    East,
    South,
    West,
    Local,
}

impl PortDirection {
    pub const CARDINALS: [PortDirection; 4] = [
        PortDirection::North,
        PortDirection::East,
        PortDirection::South,
        PortDirection::West,
    ];

    /// The direction of the port on the other end of a link leaving through
    /// `self`. A flit leaving East enters the next router from the West.
    pub fn opposite(&self) -> PortDirection {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
            Self::Local => Self::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        *self == Self::Local
    }
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            Self::North => "North",
            Self::East => "East",
            Self::South => "South",
            Self::West => "West",
            Self::Local => "Local",
        };
        name.fmt(f)
    }
}

impl FromStr for PortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "North" => Ok(Self::North),
            "East" => Ok(Self::East),
            "South" => Ok(Self::South),
            "West" => Ok(Self::West),
            "Local" => Ok(Self::Local),
            _ => Err(Error::InvalidConfiguration(format!(
                "Invalid port direction: {}",
                s
            ))),
        }
    }
}

/// Two inverse mappings between port indices and port directions.
///
/// Built once, while the topology attaches links to a router, and read-only
/// afterwards. Several ports may share the `Local` direction (one per
/// terminal); in that case the direction maps to the last such port added,
/// and only the routing table can tell the local ports apart.
#[derive(Clone, Debug, Default)]
pub struct PortDirectionMap {
    dirn2idx: HashMap<PortDirection, usize>,
    idx2dirn: Vec<PortDirection>,
}

impl PortDirectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `dirn` as the direction of port `idx`. Ports must be added
    /// in index order.
    pub fn add(&mut self, dirn: PortDirection, idx: usize) {
        assert_eq!(
            idx,
            self.idx2dirn.len(),
            "ports must be added in index order"
        );
        assert!(
            dirn.is_local() || !self.dirn2idx.contains_key(&dirn),
            "direction {} is already connected",
            dirn
        );
        self.dirn2idx.insert(dirn, idx);
        self.idx2dirn.push(dirn);
    }

    pub fn index(&self, dirn: PortDirection) -> Option<usize> {
        self.dirn2idx.get(&dirn).copied()
    }

    pub fn direction(&self, idx: usize) -> Option<PortDirection> {
        self.idx2dirn.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.idx2dirn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx2dirn.is_empty()
    }

    pub fn directions(&self) -> impl Iterator<Item = (usize, PortDirection)> + '_ {
        self.idx2dirn.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trip_through_names() {
        for dirn in PortDirection::CARDINALS
            .iter()
            .chain(std::iter::once(&PortDirection::Local))
        {
            assert_eq!(dirn.to_string().parse::<PortDirection>().unwrap(), *dirn);
        }
        assert!("Up".parse::<PortDirection>().is_err());
    }

    #[test]
    fn opposite_is_an_involution() {
        for dirn in PortDirection::CARDINALS.iter() {
            assert_ne!(dirn.opposite(), *dirn);
            assert_eq!(dirn.opposite().opposite(), *dirn);
        }
    }

    #[test]
    fn local_ports_map_to_the_last_added() {
        let mut map = PortDirectionMap::new();
        map.add(PortDirection::Local, 0);
        map.add(PortDirection::East, 1);
        map.add(PortDirection::Local, 2);
        assert_eq!(map.index(PortDirection::Local), Some(2));
        assert_eq!(map.index(PortDirection::East), Some(1));
        assert_eq!(map.index(PortDirection::West), None);
        assert_eq!(map.direction(0), Some(PortDirection::Local));
        assert_eq!(map.direction(3), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    #[should_panic]
    fn duplicate_cardinal_is_rejected() {
        let mut map = PortDirectionMap::new();
        map.add(PortDirection::North, 0);
        map.add(PortDirection::North, 1);
    }
}
