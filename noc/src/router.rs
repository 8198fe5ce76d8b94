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

mod input_unit;
mod output_unit;

pub use input_unit::InputUnit;
pub use output_unit::OutputUnit;

use crate::routing::{RoutingContext, RoutingUnit};
use crate::swap::{DeclineReason, SwapCalendar, SwapOutcome, SwapPointer, SwapScheduler};
use crate::{
    Cycle, DestinationSet, Error, Flit, FlitStage, NetworkConfiguration, Packet, PortDirection,
    WhichToSwap,
};
use log::{debug, trace};
use rand_core::RngCore;
use std::cell::RefCell;
use std::rc::Rc;

/// A flit leaving through `outport` after winning switch allocation.
#[derive(Debug)]
pub struct Departure {
    pub outport: usize,
    pub flit: Flit,
}

/// What lies behind an output port, as needed to complete a swap.
pub enum SwapTarget {
    Router {
        router: Rc<RefCell<Router>>,
        /// The input port direction of the downstream router.
        inport_dirn: PortDirection,
        latency: Cycle,
    },
    Terminal,
}

/// The router shell: input buffers, output credits, the routing unit and
/// the swap scheduler of one network node.
#[derive(Debug)]
pub struct Router {
    id: usize,
    num_vcs: usize,
    vcs_per_vnet: usize,
    buffers_per_vc: usize,
    input_units: Vec<InputUnit>,
    output_units: Vec<OutputUnit>,
    routing_unit: RoutingUnit,
    swap: SwapScheduler,
    // switch allocation round-robin pointers
    rr_inport: usize,
    rr_vc: Vec<usize>,
    /// Input buffer slots freed since the last call to `take_freed_slots`.
    freed: Vec<(usize, usize)>,
    wakeup_at: Option<Cycle>,
}

impl Router {
    pub fn new(id: usize, config: &NetworkConfiguration) -> Self {
        Self {
            id,
            num_vcs: config.num_vcs(),
            vcs_per_vnet: config.vcs_per_vnet,
            buffers_per_vc: config.buffers_per_vc,
            input_units: vec![],
            output_units: vec![],
            routing_unit: RoutingUnit::new(id),
            swap: SwapScheduler::new(config.num_vcs()),
            rr_inport: 0,
            rr_vc: vec![],
            freed: vec![],
            wakeup_at: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn add_in_port(&mut self, dirn: PortDirection) -> usize {
        let inport = self.input_units.len();
        self.input_units
            .push(InputUnit::new(dirn, self.num_vcs, self.buffers_per_vc));
        self.routing_unit.add_in_direction(dirn, inport);
        self.rr_vc.push(0);
        self.swap.set_num_inports(self.input_units.len());
        inport
    }

    /// Attaches an output port together with its routing table entry.
    pub fn add_out_port(
        &mut self,
        dirn: PortDirection,
        entry: DestinationSet,
        weight: u32,
    ) -> usize {
        let outport = self.output_units.len();
        self.output_units.push(OutputUnit::new(
            dirn,
            self.num_vcs,
            self.vcs_per_vnet,
            self.buffers_per_vc,
        ));
        self.routing_unit.add_route(entry, weight);
        self.routing_unit.add_out_direction(dirn, outport);
        outport
    }

    pub fn num_inports(&self) -> usize {
        self.input_units.len()
    }

    pub fn num_outports(&self) -> usize {
        self.output_units.len()
    }

    pub fn routing_unit(&self) -> &RoutingUnit {
        &self.routing_unit
    }

    pub fn swap_pointer(&self) -> SwapPointer {
        self.swap.pointer()
    }

    /// True while the router takes part in a swap.
    pub fn is_swap(&self, cycle: Cycle) -> bool {
        self.swap.is_swap(cycle)
    }

    pub fn input_unit(&self, inport: usize) -> Option<&InputUnit> {
        self.input_units.get(inport)
    }

    pub fn output_unit(&self, outport: usize) -> Option<&OutputUnit> {
        self.output_units.get(outport)
    }

    pub fn can_accept(&self, inport: usize, vc: usize) -> bool {
        self.input_units
            .get(inport)
            .map_or(false, |unit| unit.has_space(vc))
    }

    pub fn num_buffered_flits(&self) -> usize {
        self.input_units.iter().map(|unit| unit.occupancy()).sum()
    }

    /// Buffers `flit` at `inport`; it becomes eligible for routing at
    /// `ready_at`.
    pub fn enqueue(
        &mut self,
        inport: usize,
        mut flit: Flit,
        ready_at: Cycle,
    ) -> Result<(), Error> {
        let (id, vc) = (self.id, flit.vc());
        let unit = self.input_units.get_mut(inport).ok_or(Error::InvalidPort {
            router: id,
            port: inport,
        })?;
        flit.set_time(ready_at);
        flit.advance_stage(FlitStage::VcAlloc, ready_at);
        unit.enqueue(flit).map_err(|_| Error::BufferOverflow {
            router: id,
            port: inport,
            vc,
        })?;
        self.schedule_wakeup(ready_at);
        Ok(())
    }

    /// Receives a flit handed over by an upstream router's swap, through the
    /// input port facing `inport_dirn`. Both routers were marked busy when
    /// the swap committed.
    pub fn enqueue_from_swap(
        &mut self,
        mut flit: Flit,
        inport_dirn: PortDirection,
        vc: usize,
        ready_at: Cycle,
    ) -> Result<(), Error> {
        let inport = self
            .routing_unit
            .inports()
            .index(inport_dirn)
            .filter(|_| !inport_dirn.is_local())
            .ok_or(Error::UnknownDirection {
                router: self.id,
                direction: inport_dirn,
            })?;
        flit.set_vc(vc);
        trace!("router {}: {} swapped in from {}", self.id, flit, inport_dirn);
        self.enqueue(inport, flit, ready_at)
    }

    pub fn return_credit(&mut self, outport: usize, vc: usize) -> Result<(), Error> {
        let unit = self.output_units.get_mut(outport).ok_or(Error::InvalidPort {
            router: self.id,
            port: outport,
        })?;
        unit.return_credit(vc);
        Ok(())
    }

    /// The `(inport, vc)` buffer slots freed since the last call; each is
    /// owed as a credit to the upstream router.
    pub fn take_freed_slots(&mut self) -> Vec<(usize, usize)> {
        std::mem::take(&mut self.freed)
    }

    /// Requests a wakeup no later than `cycle`.
    pub fn schedule_wakeup(&mut self, cycle: Cycle) {
        self.wakeup_at = Some(self.wakeup_at.map_or(cycle, |at| at.min(cycle)));
    }

    pub fn is_scheduled(&self, cycle: Cycle) -> bool {
        self.wakeup_at.map_or(false, |at| at <= cycle)
    }

    /// One router cycle: route compute for newly arrived flits, then switch
    /// allocation. Returns the flits that traverse the crossbar.
    pub fn wakeup(
        &mut self,
        cycle: Cycle,
        config: &NetworkConfiguration,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Departure>, Error> {
        self.wakeup_at = None;
        self.route_compute(cycle, config, rng)?;
        let departures = self.switch_allocate(cycle);
        if self.num_buffered_flits() > 0 {
            self.schedule_wakeup(cycle + 1);
        }
        Ok(departures)
    }

    /// Resolves the output port of every head flit that has none yet.
    pub fn route_compute(
        &mut self,
        cycle: Cycle,
        config: &NetworkConfiguration,
        rng: &mut dyn RngCore,
    ) -> Result<(), Error> {
        for (inport, unit) in self.input_units.iter_mut().enumerate() {
            let inport_dirn = unit.direction();
            for vc in 0..unit.num_vcs() {
                let flit = match unit.peek_mut(vc) {
                    Some(flit) if flit.outport().is_none() && flit.time() <= cycle => flit,
                    _ => continue,
                };
                let mut ctx = RoutingContext {
                    config,
                    occupancy: &self.output_units,
                    rng: &mut *rng,
                };
                let outport = self.routing_unit.outport_compute(
                    flit.route(),
                    inport,
                    inport_dirn,
                    vc,
                    &mut ctx,
                )?;
                let outport_dirn = self
                    .routing_unit
                    .outports()
                    .direction(outport)
                    .ok_or(Error::InvalidPort {
                        router: self.id,
                        port: outport,
                    })?;
                flit.set_outport(outport, outport_dirn);
                flit.advance_stage(FlitStage::SwitchAlloc, cycle);
            }
        }
        Ok(())
    }

    /// Grants at most one flit per input port and per output port, round
    /// robin over input ports and, within a port, over virtual channels.
    fn switch_allocate(&mut self, cycle: Cycle) -> Vec<Departure> {
        let num_inports = self.input_units.len();
        let mut granted = vec![false; self.output_units.len()];
        let mut departures = vec![];
        for i in 0..num_inports {
            let inport = (self.rr_inport + i) % num_inports;
            for j in 0..self.num_vcs {
                let vc = (self.rr_vc[inport] + j) % self.num_vcs;
                let outport = match self.input_units[inport].peek(vc) {
                    Some(flit) if flit.is_stage(FlitStage::SwitchAlloc, cycle) => {
                        match flit.outport() {
                            Some(outport) => outport,
                            None => continue,
                        }
                    }
                    _ => continue,
                };
                if granted[outport] || !self.output_units[outport].has_credit(vc) {
                    continue;
                }
                if let Some(mut flit) = self.input_units[inport].dequeue(vc) {
                    self.output_units[outport].consume_credit(vc);
                    self.freed.push((inport, vc));
                    flit.increment_hops();
                    flit.set_dequeue_time(cycle);
                    flit.advance_stage(FlitStage::SwitchTraversal, cycle);
                    trace!(
                        "router {}: cycle {}: {} -> outport {}",
                        self.id,
                        cycle,
                        flit,
                        outport
                    );
                    departures.push(Departure { outport, flit });
                    granted[outport] = true;
                    self.rr_vc[inport] = (vc + 1) % self.num_vcs;
                    break;
                }
            }
        }
        if num_inports > 0 {
            self.rr_inport = (self.rr_inport + 1) % num_inports;
        }
        departures
    }

    /// Whether `cycle` is this router's swap turn. Only meaningful with
    /// swapping enabled.
    pub fn is_my_turn(&self, cycle: Cycle, config: &NetworkConfiguration) -> bool {
        assert!(
            config.enable_interswap,
            "router {}: swap turn queried with swapping disabled",
            self.id
        );
        SwapCalendar::new(config.when_to_swap, config.num_routers).is_turn(cycle, self.id)
    }

    /// Takes this router's swap turn, if `cycle` is one: pulls the head flit
    /// of the virtual channel under the swap pointer past switch allocation.
    /// A committed flit is returned to the caller, which puts it on the
    /// outbound link behind the flits already travelling there, or hands it
    /// to the terminal.
    ///
    /// `downstream` resolves an output port to what lies behind it.
    pub fn attempt_swap<F>(
        &mut self,
        cycle: Cycle,
        config: &NetworkConfiguration,
        downstream: F,
    ) -> Result<SwapOutcome, Error>
    where
        F: Fn(usize) -> Option<SwapTarget>,
    {
        if !self.is_my_turn(cycle, config) {
            return Ok(SwapOutcome::NotMyTurn);
        }
        let ptr = self.swap.begin_turn();
        let outcome = self.offer_swap(cycle, config, ptr, &downstream);
        self.swap.mov_swap_ptr();
        outcome
    }

    fn offer_swap(
        &mut self,
        cycle: Cycle,
        config: &NetworkConfiguration,
        ptr: SwapPointer,
        downstream: &dyn Fn(usize) -> Option<SwapTarget>,
    ) -> Result<SwapOutcome, Error> {
        let declined = |reason| Ok(SwapOutcome::Declined(reason));
        if self.swap.is_swap(cycle) {
            return declined(DeclineReason::SwapInProgress);
        }
        let (inport, vc) = (ptr.inport, ptr.vc);
        let head = match self.input_units.get(inport).and_then(|unit| unit.peek(vc)) {
            Some(head) => head,
            None => return Ok(SwapOutcome::Empty),
        };
        let (outport, outport_dirn) = match (head.outport(), head.outport_dirn()) {
            (Some(outport), Some(dirn)) => (outport, dirn),
            _ => return declined(DeclineReason::Unrouted),
        };
        if outport_dirn.is_local() && config.which_to_swap == WhichToSwap::DisableLocalSwap {
            return declined(DeclineReason::LocalSwapDisabled);
        }
        if !self.output_units[outport].has_credit(vc) {
            return declined(DeclineReason::NoCredit);
        }
        let target = downstream(outport).ok_or(Error::InvalidPort {
            router: self.id,
            port: outport,
        })?;
        if let SwapTarget::Router { router, .. } = &target {
            if router.borrow().swap.is_swap(cycle) {
                return declined(DeclineReason::PeerBusy);
            }
        }

        let mut flit = match self.input_units[inport].dequeue(vc) {
            Some(flit) => flit,
            None => return Ok(SwapOutcome::Empty),
        };
        let inport_dirn = self.input_units[inport].direction();
        self.swap.commit(flit.vnet(), inport_dirn);
        self.output_units[outport].consume_credit(vc);
        self.freed.push((inport, vc));
        flit.increment_hops();
        flit.set_dequeue_time(cycle);
        flit.advance_stage(FlitStage::LinkTraversal, cycle);
        let ready_at = match &target {
            SwapTarget::Router { router, latency, .. } => {
                router.borrow_mut().swap.mark_swap(cycle + latency);
                cycle + latency
            }
            SwapTarget::Terminal => cycle + config.link_latency,
        };
        self.swap.mark_swap(ready_at);
        debug!(
            "router {}: cycle {}: swap {} from {} vc {} to {}",
            self.id, cycle, flit, inport_dirn, vc, outport_dirn
        );
        Ok(SwapOutcome::Committed {
            inport,
            vc,
            outport,
            flit,
        })
    }

    /// Updates the message of every buffered flit matching `pkt`; returns
    /// how many flits matched.
    pub fn functional_write(&mut self, pkt: &Packet) -> u32 {
        self.input_units
            .iter()
            .flat_map(|unit| unit.flits())
            .filter(|flit| flit.functional_write(pkt))
            .count() as u32
    }

    pub fn functional_read(&self, pkt: &mut Packet) -> bool {
        self.input_units
            .iter()
            .flat_map(|unit| unit.flits())
            .any(|flit| flit.functional_read(pkt))
    }
}
