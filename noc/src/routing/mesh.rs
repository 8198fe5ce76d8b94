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

//! Direction choice on a 2D grid.
//!
//! Router `id` sits at column `id % cols`, row `id / cols`. East is
//! increasing column, North is increasing row.

use crate::PortDirection;
use rand::Rng;
use rand_core::RngCore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn of(id: usize, cols: usize) -> Self {
        Self {
            x: id % cols,
            y: id / cols,
        }
    }
}

/// Offset from the current router to the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Delta {
    x_hops: usize,
    y_hops: usize,
    east: bool,
    north: bool,
}

impl Delta {
    fn new(my: Coord, dest: Coord) -> Self {
        Self {
            x_hops: my.x.max(dest.x) - my.x.min(dest.x),
            y_hops: my.y.max(dest.y) - my.y.min(dest.y),
            east: dest.x >= my.x,
            north: dest.y >= my.y,
        }
    }

    fn x_dirn(&self) -> PortDirection {
        if self.east {
            PortDirection::East
        } else {
            PortDirection::West
        }
    }

    fn y_dirn(&self) -> PortDirection {
        if self.north {
            PortDirection::North
        } else {
            PortDirection::South
        }
    }

    /// The only productive direction, when the destination shares a row or
    /// column with the current router.
    fn aligned(&self) -> Option<PortDirection> {
        assert!(
            self.x_hops > 0 || self.y_hops > 0,
            "routing a flit that has already arrived"
        );
        if self.x_hops == 0 {
            Some(self.y_dirn())
        } else if self.y_hops == 0 {
            Some(self.x_dirn())
        } else {
            None
        }
    }
}

/// How diagonal quadrants are split between the two candidate directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPolicy {
    /// West-first style turn restrictions: no turn from North in the upper
    /// quadrants.
    TurnModel,
    /// Either productive direction in every quadrant.
    Random,
}

impl TurnPolicy {
    fn candidates(&self, delta: &Delta) -> [PortDirection; 2] {
        use crate::PortDirection::*;
        match (self, delta.east, delta.north) {
            (TurnPolicy::TurnModel, true, true) => [East, East],
            (TurnPolicy::TurnModel, false, true) => [West, West],
            (_, false, false) => [West, South],
            (_, true, false) => [East, South],
            (TurnPolicy::Random, true, true) => [East, North],
            (TurnPolicy::Random, false, true) => [West, North],
        }
    }
}

/// Dimension-order routing: all X hops, then all Y hops.
///
/// Panics if the flit came in through a port that XY would never deliver it
/// on, which indicates a broken topology.
pub fn xy_direction(
    my_id: usize,
    dest_id: usize,
    cols: usize,
    inport: PortDirection,
) -> PortDirection {
    let delta = Delta::new(Coord::of(my_id, cols), Coord::of(dest_id, cols));
    assert!(
        delta.x_hops > 0 || delta.y_hops > 0,
        "router {}: routing a flit destined to itself",
        my_id
    );
    if delta.x_hops > 0 {
        if delta.east {
            assert!(
                inport == PortDirection::Local || inport == PortDirection::West,
                "router {}: eastbound flit entered from {}",
                my_id,
                inport
            );
            PortDirection::East
        } else {
            assert!(
                inport == PortDirection::Local || inport == PortDirection::East,
                "router {}: westbound flit entered from {}",
                my_id,
                inport
            );
            PortDirection::West
        }
    } else if delta.north {
        assert!(
            inport != PortDirection::North,
            "router {}: northbound flit entered from North",
            my_id
        );
        PortDirection::North
    } else {
        assert!(
            inport != PortDirection::South,
            "router {}: southbound flit entered from South",
            my_id
        );
        PortDirection::South
    }
}

/// One random productive step: the aligned direction, or a fair coin between
/// the policy's two candidates.
pub fn oblivious_direction(
    my_id: usize,
    dest_id: usize,
    cols: usize,
    policy: TurnPolicy,
    rng: &mut dyn RngCore,
) -> PortDirection {
    let delta = Delta::new(Coord::of(my_id, cols), Coord::of(dest_id, cols));
    if let Some(dirn) = delta.aligned() {
        return dirn;
    }
    let candidates = policy.candidates(&delta);
    candidates[rng.gen_range(0..2)]
}

/// Like `oblivious_direction`, but prefers the candidate whose output port
/// has a free virtual channel. Falls back to the coin when both or neither
/// have one.
pub fn adaptive_direction(
    my_id: usize,
    dest_id: usize,
    cols: usize,
    policy: TurnPolicy,
    has_free_vc: &dyn Fn(PortDirection) -> bool,
    rng: &mut dyn RngCore,
) -> PortDirection {
    let delta = Delta::new(Coord::of(my_id, cols), Coord::of(dest_id, cols));
    if let Some(dirn) = delta.aligned() {
        return dirn;
    }
    let [first, second] = policy.candidates(&delta);
    if first == second {
        return first;
    }
    match (has_free_vc(first), has_free_vc(second)) {
        (true, false) => first,
        (false, true) => second,
        _ => {
            if rng.gen_bool(0.5) {
                first
            } else {
                second
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use crate::PortDirection::*;

    fn rng() -> Xoshiro256StarStar {
        Xoshiro256StarStar::seed_from_u64(7)
    }

    #[test]
    fn xy_goes_x_first() {
        // 4x4: router 5 is (1, 1), router 14 is (2, 3)
        assert_eq!(xy_direction(5, 14, 4, Local), East);
        assert_eq!(xy_direction(6, 14, 4, West), North);
        assert_eq!(xy_direction(14, 5, 4, Local), West);
        assert_eq!(xy_direction(13, 5, 4, East), South);
        assert_eq!(xy_direction(13, 5, 4, North), South);
    }

    #[test]
    #[should_panic]
    fn xy_rejects_a_turn_back_west() {
        // an eastbound flit can only arrive from the West or be injected
        xy_direction(5, 7, 4, North);
    }

    #[test]
    #[should_panic]
    fn xy_rejects_a_flit_at_its_destination() {
        xy_direction(5, 5, 4, Local);
    }

    #[test]
    fn aligned_destinations_are_deterministic() {
        let mut rng = rng();
        for policy in [TurnPolicy::TurnModel, TurnPolicy::Random].iter() {
            assert_eq!(oblivious_direction(0, 3, 4, *policy, &mut rng), East);
            assert_eq!(oblivious_direction(3, 0, 4, *policy, &mut rng), West);
            assert_eq!(oblivious_direction(1, 13, 4, *policy, &mut rng), North);
            assert_eq!(oblivious_direction(13, 1, 4, *policy, &mut rng), South);
        }
    }

    #[test]
    fn turn_model_quadrants() {
        let mut rng = rng();
        for _ in 0..32 {
            // north-east and north-west never turn from North
            assert_eq!(oblivious_direction(5, 15, 4, TurnPolicy::TurnModel, &mut rng), East);
            assert_eq!(oblivious_direction(6, 12, 4, TurnPolicy::TurnModel, &mut rng), West);
        }
        let south_west = (0..64)
            .map(|_| oblivious_direction(15, 5, 4, TurnPolicy::TurnModel, &mut rng))
            .collect::<Vec<_>>();
        assert!(south_west.iter().all(|d| *d == West || *d == South));
        assert!(south_west.contains(&West) && south_west.contains(&South));
        let south_east = (0..64)
            .map(|_| oblivious_direction(12, 6, 4, TurnPolicy::TurnModel, &mut rng))
            .collect::<Vec<_>>();
        assert!(south_east.iter().all(|d| *d == East || *d == South));
        assert!(south_east.contains(&East) && south_east.contains(&South));
    }

    #[test]
    fn random_quadrants_use_both_axes() {
        let mut rng = rng();
        let north_east = (0..64)
            .map(|_| oblivious_direction(5, 15, 4, TurnPolicy::Random, &mut rng))
            .collect::<Vec<_>>();
        assert!(north_east.iter().all(|d| *d == East || *d == North));
        assert!(north_east.contains(&East) && north_east.contains(&North));
        let north_west = (0..64)
            .map(|_| oblivious_direction(6, 12, 4, TurnPolicy::Random, &mut rng))
            .collect::<Vec<_>>();
        assert!(north_west.iter().all(|d| *d == West || *d == North));
    }

    #[test]
    fn adaptive_prefers_free_ports() {
        let mut rng = rng();
        let only_south = |d: PortDirection| d == South;
        for _ in 0..32 {
            assert_eq!(
                adaptive_direction(15, 5, 4, TurnPolicy::TurnModel, &only_south, &mut rng),
                South
            );
            assert_eq!(
                adaptive_direction(5, 15, 4, TurnPolicy::Random, &|d| d == East, &mut rng),
                East
            );
            // single candidate quadrant ignores occupancy
            assert_eq!(
                adaptive_direction(5, 15, 4, TurnPolicy::TurnModel, &only_south, &mut rng),
                East
            );
        }
        let congested = (0..64)
            .map(|_| adaptive_direction(15, 5, 4, TurnPolicy::TurnModel, &|_| false, &mut rng))
            .collect::<Vec<_>>();
        assert!(congested.contains(&West) && congested.contains(&South));
    }
}
