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

use super::mesh::{oblivious_direction, xy_direction, TurnPolicy};
use crate::{Error, PortDirection};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

/// A vertical link between a chiplet router and an interposer router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bridge {
    pub chiplet_router: usize,
    pub interposer_router: usize,
}

/// How traffic leaves and enters one chiplet.
///
/// Gateway tables are indexed by the destination router id modulo their
/// length, which spreads traffic over all bridges of a chiplet.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChipletBand {
    /// Chiplet routers at which outbound traffic takes a bridge.
    pub exit_gateways: Vec<usize>,
    /// Direction of the bridge port on the chiplet side.
    pub exit_direction: PortDirection,
    /// Interposer routers at which inbound traffic takes a bridge.
    pub entry_gateways: Vec<usize>,
    /// Direction of the bridge port on the interposer side.
    pub entry_direction: PortDirection,
    pub bridges: Vec<Bridge>,
}

/// A system of equally sized mesh bands: chiplets `0..chiplets.len()` and
/// an interposer, always the last band.
///
/// Router ids are global; band `b` holds routers
/// `b * band_size..(b + 1) * band_size`, laid out row-major with
/// `band_cols` columns.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HierarchyDescriptor {
    pub band_size: usize,
    pub band_cols: usize,
    pub chiplets: Vec<ChipletBand>,
}

/// Which leg of its journey a flit is on at a given router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Leg {
    /// Source and destination share a band.
    IntraBand,
    /// In the source chiplet, heading for the exit gateway.
    Exit { gateway: usize },
    /// On the interposer, heading for the entry gateway of the destination
    /// chiplet.
    Interposer { gateway: usize },
    /// On the interposer, with the destination on the interposer too.
    InterposerDestination,
    /// In the destination chiplet, after crossing a bridge.
    Entry,
}

impl HierarchyDescriptor {
    /// Three 4x4 chiplets on a 4x4 interposer.
    pub fn het_meshes() -> Self {
        use crate::PortDirection::*;
        let bridges = |pairs: &[(usize, usize)]| {
            pairs
                .iter()
                .map(|(chiplet_router, interposer_router)| Bridge {
                    chiplet_router: *chiplet_router,
                    interposer_router: *interposer_router,
                })
                .collect::<Vec<_>>()
        };
        Self {
            band_size: 16,
            band_cols: 4,
            chiplets: vec![
                ChipletBand {
                    exit_gateways: vec![0, 1, 2, 3],
                    exit_direction: South,
                    entry_gateways: vec![56, 60, 48, 52],
                    entry_direction: West,
                    bridges: bridges(&[(0, 48), (1, 52), (2, 56), (3, 60)]),
                },
                ChipletBand {
                    exit_gateways: vec![16, 17, 18, 19],
                    exit_direction: South,
                    entry_gateways: vec![55, 51, 63, 59],
                    entry_direction: East,
                    bridges: bridges(&[(16, 63), (17, 59), (18, 55), (19, 51)]),
                },
                ChipletBand {
                    exit_gateways: vec![44, 45, 46, 47],
                    exit_direction: North,
                    entry_gateways: vec![50, 51, 48, 49],
                    entry_direction: South,
                    bridges: bridges(&[(44, 48), (45, 49), (46, 50), (47, 51)]),
                },
            ],
        }
    }

    pub fn num_bands(&self) -> usize {
        self.chiplets.len() + 1
    }

    pub fn num_routers(&self) -> usize {
        self.num_bands() * self.band_size
    }

    pub fn band_rows(&self) -> usize {
        self.band_size / self.band_cols.max(1)
    }

    pub fn interposer_band(&self) -> usize {
        self.chiplets.len()
    }

    pub fn band_of(&self, router: usize) -> usize {
        router / self.band_size
    }

    pub fn is_interposer(&self, router: usize) -> bool {
        self.band_of(router) == self.interposer_band()
    }

    /// Position of `router` within its band.
    pub fn local_id(&self, router: usize) -> usize {
        router % self.band_size
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));
        if self.band_size == 0 || self.band_cols == 0 || self.band_size % self.band_cols != 0 {
            return invalid(format!(
                "{} routers per band do not fill rows of {}",
                self.band_size, self.band_cols
            ));
        }
        if self.chiplets.is_empty() {
            return invalid("a hierarchy needs at least one chiplet".to_string());
        }
        let interposer = self.interposer_band();
        for (band, chiplet) in self.chiplets.iter().enumerate() {
            if chiplet.exit_gateways.is_empty() || chiplet.entry_gateways.is_empty() {
                return invalid(format!("chiplet {} has no gateways", band));
            }
            if chiplet.exit_direction.is_local() || chiplet.entry_direction.is_local() {
                return invalid(format!("chiplet {} bridges through a local port", band));
            }
            for bridge in chiplet.bridges.iter() {
                if bridge.chiplet_router >= self.num_routers()
                    || self.band_of(bridge.chiplet_router) != band
                    || self.band_of(bridge.interposer_router) != interposer
                {
                    return invalid(format!(
                        "bridge {:?} does not connect chiplet {} to the interposer",
                        bridge, band
                    ));
                }
            }
            for gateway in chiplet.exit_gateways.iter() {
                if !chiplet.bridges.iter().any(|b| b.chiplet_router == *gateway) {
                    return invalid(format!(
                        "exit gateway {} of chiplet {} has no bridge",
                        gateway, band
                    ));
                }
            }
            for gateway in chiplet.entry_gateways.iter() {
                if !chiplet.bridges.iter().any(|b| b.interposer_router == *gateway) {
                    return invalid(format!(
                        "entry gateway {} of chiplet {} has no bridge",
                        gateway, band
                    ));
                }
            }
        }
        Ok(())
    }

    /// Classifies the hop a flit from `src` to `dest` takes at router `my`.
    pub fn leg(&self, my: usize, src: usize, dest: usize) -> Leg {
        let (my_band, src_band, dest_band) =
            (self.band_of(my), self.band_of(src), self.band_of(dest));
        if src_band == dest_band {
            assert_eq!(
                my_band, src_band,
                "router {}: flit from {} to {} left its band",
                my, src, dest
            );
            return Leg::IntraBand;
        }
        let interposer = self.interposer_band();
        if my_band == interposer {
            if dest_band == interposer {
                return Leg::InterposerDestination;
            }
            let entry = &self.chiplets[dest_band].entry_gateways;
            return Leg::Interposer {
                gateway: entry[dest % entry.len()],
            };
        }
        if my_band == dest_band {
            return Leg::Entry;
        }
        assert_eq!(
            my_band, src_band,
            "router {}: flit from {} to {} strayed into another chiplet",
            my, src, dest
        );
        let exit = &self.chiplets[src_band].exit_gateways;
        Leg::Exit {
            gateway: exit[dest % exit.len()],
        }
    }

    /// The direction a flit from `src` to `dest` leaves router `my` in.
    ///
    /// Bands route internally with XY in band-local coordinates; the
    /// interposer takes random productive steps.
    pub fn direction(
        &self,
        my: usize,
        src: usize,
        dest: usize,
        inport: PortDirection,
        rng: &mut dyn RngCore,
    ) -> PortDirection {
        let cols = self.band_cols;
        let local = |router: usize| self.local_id(router);
        match self.leg(my, src, dest) {
            Leg::IntraBand => xy_direction(local(my), local(dest), cols, inport),
            Leg::Exit { gateway } if gateway == my => {
                self.chiplets[self.band_of(src)].exit_direction
            }
            Leg::Exit { gateway } => xy_direction(local(my), local(gateway), cols, inport),
            Leg::Interposer { gateway } if gateway == my => {
                self.chiplets[self.band_of(dest)].entry_direction
            }
            Leg::Interposer { gateway } => {
                oblivious_direction(local(my), local(gateway), cols, TurnPolicy::Random, rng)
            }
            Leg::InterposerDestination => {
                oblivious_direction(local(my), local(dest), cols, TurnPolicy::Random, rng)
            }
            // the bridge port counts as an injection point
            Leg::Entry => xy_direction(local(my), local(dest), cols, PortDirection::Local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use crate::PortDirection::*;

    #[test]
    fn default_hierarchy_is_valid() {
        let hier = HierarchyDescriptor::het_meshes();
        hier.validate().unwrap();
        assert_eq!(hier.num_routers(), 64);
        assert_eq!(hier.band_rows(), 4);
        assert_eq!(hier.interposer_band(), 3);
        assert!(hier.is_interposer(48));
        assert!(!hier.is_interposer(47));
        assert_eq!(hier.local_id(53), 5);
    }

    #[test]
    fn gateways_need_bridges() {
        let mut hier = HierarchyDescriptor::het_meshes();
        hier.chiplets[1].exit_gateways[2] = 20;
        assert!(hier.validate().is_err());

        let mut hier = HierarchyDescriptor::het_meshes();
        hier.chiplets[0].bridges[0].interposer_router = 12;
        assert!(hier.validate().is_err());

        let mut hier = HierarchyDescriptor::het_meshes();
        hier.band_cols = 3;
        assert!(hier.validate().is_err());
    }

    #[test]
    fn intra_band_matches_local_xy() {
        let hier = HierarchyDescriptor::het_meshes();
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        for band in 0..hier.num_bands() {
            let base = band * hier.band_size;
            for my in base..base + 16 {
                for dest in base..base + 16 {
                    if my == dest {
                        continue;
                    }
                    assert_eq!(
                        hier.direction(my, my, dest, Local, &mut rng),
                        xy_direction(my - base, dest - base, 4, Local),
                        "{} -> {}",
                        my,
                        dest
                    );
                }
            }
        }
    }

    #[test]
    fn chiplet_to_chiplet_legs() {
        let hier = HierarchyDescriptor::het_meshes();
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);

        // 33 % 4 selects exit gateway 1 of chiplet 0
        assert_eq!(hier.leg(5, 5, 33), Leg::Exit { gateway: 1 });
        assert_eq!(hier.direction(5, 5, 33, Local, &mut rng), South);
        assert_eq!(hier.direction(1, 5, 33, North, &mut rng), South);

        // and entry gateway 51 of chiplet 2
        assert_eq!(hier.leg(52, 5, 33), Leg::Interposer { gateway: 51 });
        for _ in 0..16 {
            let dirn = hier.direction(52, 5, 33, West, &mut rng);
            assert!(dirn == East || dirn == South, "{}", dirn);
        }
        assert_eq!(hier.direction(51, 5, 33, West, &mut rng), South);

        // entering from the interposer is not an XY violation
        assert_eq!(hier.leg(47, 5, 33), Leg::Entry);
        assert_eq!(hier.direction(47, 5, 33, North, &mut rng), West);
    }

    #[test]
    fn interposer_endpoints() {
        let hier = HierarchyDescriptor::het_meshes();
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        // chiplet to interposer: exit by dest % 4, then random steps
        assert_eq!(hier.leg(20, 20, 61), Leg::Exit { gateway: 17 });
        assert_eq!(hier.leg(59, 20, 61), Leg::InterposerDestination);
        assert_eq!(hier.direction(60, 20, 61, West, &mut rng), East);
        // interposer to chiplet: straight to the entry gateway
        assert_eq!(hier.leg(48, 48, 2), Leg::Interposer { gateway: 48 });
        assert_eq!(hier.direction(48, 48, 2, Local, &mut rng), West);
    }

    #[test]
    #[should_panic]
    fn flits_never_visit_a_third_chiplet() {
        let hier = HierarchyDescriptor::het_meshes();
        hier.leg(20, 5, 33);
    }
}
