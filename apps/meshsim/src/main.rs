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


//! Synthetic traffic on a mesh or on the het-meshes chiplet system.
//!
//! Every cycle each terminal starts a packet to a uniformly random terminal
//! with probability `rate`. After `cycles` cycles injection stops and the
//! network drains.

use anyhow::{bail, Context};
use env_logger::Target;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::path::PathBuf;
use structopt::StructOpt;

use noc::{
    HierarchyDescriptor, Network, NetworkConfiguration, RoutingAlgorithm, TopologyKind,
    WhenToSwap, WhichToSwap,
};

#[derive(StructOpt)]
#[structopt(name = "meshsim", about = "Synthetic traffic through a network of routers")]
struct Arguments {
    /// YAML network configuration; overrides the topology options below.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// supported topologies: Mesh, HetMeshes
    #[structopt(short, long, default_value = "Mesh")]
    topology: TopologyKind,
    #[structopt(long, default_value = "4")]
    rows: usize,
    #[structopt(long, default_value = "4")]
    cols: usize,
    /// table, xy, turn_model_oblivious, turn_model_adaptive,
    /// random_oblivious, random_adaptive, custom, or a code 0-6
    #[structopt(short, long, default_value = "table")]
    routing: RoutingAlgorithm,
    /// Enable TDM port swapping.
    #[structopt(short, long)]
    swap: bool,
    /// Swap period multiplier: tdm, 2tdm, ..., 2048tdm
    #[structopt(long, default_value = "tdm")]
    when_to_swap: WhenToSwap,
    /// disable or enable swaps into local ports
    #[structopt(long, default_value = "disable")]
    which_to_swap: WhichToSwap,
    /// Packets per terminal per cycle.
    #[structopt(long, default_value = "0.02")]
    rate: f64,
    /// Flits per packet.
    #[structopt(long, default_value = "4")]
    packet_size: usize,
    #[structopt(short, long, default_value = "10000")]
    cycles: usize,
    #[structopt(long, default_value = "100000")]
    drain_cycles: usize,
    #[structopt(long, default_value = "1")]
    seed: u64,
    /// Print the effective configuration as YAML and exit.
    #[structopt(long)]
    dump_config: bool,
}

impl Arguments {
    fn network_config(&self) -> anyhow::Result<NetworkConfiguration> {
        if let Some(path) = &self.config {
            return NetworkConfiguration::from_file(path);
        }
        let base = match self.topology {
            TopologyKind::Mesh => NetworkConfiguration::mesh(self.rows, self.cols),
            TopologyKind::HetMeshes => {
                NetworkConfiguration::het_meshes(HierarchyDescriptor::het_meshes())
            }
        };
        let routing_algorithm = match (&self.routing, self.topology) {
            (RoutingAlgorithm::Custom(_), TopologyKind::Mesh) => {
                bail!("hierarchical routing needs the HetMeshes topology")
            }
            // keep the hierarchy the topology was built from
            (RoutingAlgorithm::Custom(_), TopologyKind::HetMeshes) => {
                base.routing_algorithm.clone()
            }
            (routing, _) => routing.clone(),
        };
        let config = NetworkConfiguration {
            routing_algorithm,
            enable_interswap: self.swap,
            when_to_swap: self.when_to_swap,
            which_to_swap: self.which_to_swap,
            ..base
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::from_args();

    let _logger = env_logger::builder()
        .filter(Some("meshsim"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .init();

    let config = args.network_config()?;
    if args.dump_config {
        print!("{}", config.to_yaml());
        return Ok(());
    }
    if !(0.0..=1.0).contains(&args.rate) {
        bail!("injection rate {} is not a probability", args.rate);
    }

    let mut network = Network::new(config).context("building the network")?;
    let mut rng = Xoshiro256StarStar::seed_from_u64(args.seed);
    let num_terminals = network.num_terminals();
    let num_vnets = network.config().num_vnets();
    for _ in 0..args.cycles {
        for src in 0..num_terminals {
            if rng.gen_bool(args.rate) {
                let dest = rng.gen_range(0..num_terminals);
                let vnet = rng.gen_range(0..num_vnets);
                network.inject(src, dest, vnet, args.packet_size)?;
            }
        }
        network.step()?;
    }
    log::info!("cycle {}: injection stopped", network.cycle());
    if !network.drain(args.drain_cycles)? {
        bail!("network did not drain within {} cycles", args.drain_cycles);
    }

    let stats = network.stats();
    println!("cycles:            {}", network.cycle());
    println!("packets injected:  {}", stats.packets_injected);
    println!("packets delivered: {}", stats.packets_ejected);
    println!("flits delivered:   {}", stats.flits_ejected);
    println!("average latency:   {:.2}", stats.average_latency());
    println!("average hops:      {:.2}", stats.average_hops());
    println!(
        "swaps:             {} committed of {} offered",
        stats.swaps_committed, stats.swap_offers
    );
    Ok(())
}
