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


//! Uniform random traffic between the chiplets of the het-meshes system,
//! routed hierarchically with port swapping enabled. Every packet must
//! arrive at its destination terminal.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use noc::{
    HierarchyDescriptor, Network, NetworkConfiguration, NetworkStats, WhenToSwap, WhichToSwap,
};

const PACKET_SIZE: usize = 4;

fn config(which_to_swap: WhichToSwap) -> NetworkConfiguration {
    NetworkConfiguration {
        enable_interswap: true,
        when_to_swap: WhenToSwap::Tdm1,
        which_to_swap,
        ..NetworkConfiguration::het_meshes(HierarchyDescriptor::het_meshes())
    }
}

/// Runs `cycles` cycles of traffic at `rate` packets per terminal per cycle
/// and drains the network. Returns the statistics and, per terminal, the
/// number of packets sent to it.
fn simulate_traffic(
    config: NetworkConfiguration,
    cycles: usize,
    rate: f64,
    seed: u64,
) -> anyhow::Result<(NetworkStats, Vec<usize>)> {
    let mut network = Network::new(config)?;
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let num_terminals = network.num_terminals();
    let mut expected = vec![0; num_terminals];
    for _ in 0..cycles {
        for src in 0..num_terminals {
            if rng.gen_bool(rate) {
                let dest = rng.gen_range(0..num_terminals);
                network.inject(src, dest, rng.gen_range(0..3), PACKET_SIZE)?;
                expected[dest] += 1;
            }
        }
        network.step()?;
    }
    if !network.drain(20 * cycles)? {
        anyhow::bail!("network did not drain after {} cycles", network.cycle());
    }
    for (terminal, packets) in expected.iter().enumerate() {
        let delivered = network.ejected(terminal);
        assert_eq!(delivered.len(), packets * PACKET_SIZE);
        assert!(delivered.iter().all(|flit| flit.route().dest_ni == terminal));
    }
    Ok((network.stats().clone(), expected))
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn delivers_without_local_swaps() {
        let (stats, expected) =
            simulate_traffic(config(WhichToSwap::DisableLocalSwap), 500, 0.01, 3).unwrap();
        assert_eq!(stats.packets_ejected, expected.iter().sum::<usize>());
        assert_eq!(stats.packets_ejected, stats.packets_injected);
    }

    #[test]
    fn delivers_with_local_swaps() {
        let (stats, _) =
            simulate_traffic(config(WhichToSwap::EnableLocalSwap), 500, 0.02, 5).unwrap();
        assert_eq!(stats.packets_ejected, stats.packets_injected);
        assert_eq!(stats.flits_ejected, stats.packets_ejected * PACKET_SIZE);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    for which_to_swap in [WhichToSwap::DisableLocalSwap, WhichToSwap::EnableLocalSwap].iter() {
        let (stats, _) = simulate_traffic(config(*which_to_swap), 2000, 0.01, 1)?;
        log::info!(
            "{:?}: {} packets delivered, average latency {:.2}, {} swaps committed",
            which_to_swap,
            stats.packets_ejected,
            stats.average_latency(),
            stats.swaps_committed
        );
    }
    Ok(())
}
