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

//! Flits and the addressing information they carry from router to router.

use crate::{Cycle, Error, PortDirection};
use bitvec::prelude::*;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Flits are grouped in blocks of this many flits; the first flit of each
/// block is a head flit.
pub const FLITS_PER_BLOCK: usize = 8;

/// A set of terminal (network interface) ids.
///
/// Routing only ever asks whether two sets intersect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationSet {
    bits: BitVec,
}

impl DestinationSet {
    pub fn new(num_terminals: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, num_terminals),
        }
    }

    pub fn single(terminal: usize, num_terminals: usize) -> Self {
        let mut set = Self::new(num_terminals);
        set.add(terminal);
        set
    }

    pub fn add(&mut self, terminal: usize) {
        if terminal >= self.bits.len() {
            self.bits.resize(terminal + 1, false);
        }
        self.bits.set(terminal, true);
    }

    pub fn contains(&self, terminal: usize) -> bool {
        self.bits.get(terminal).map_or(false, |bit| *bit)
    }

    pub fn intersects(&self, other: &DestinationSet) -> bool {
        self.bits.iter_ones().any(|terminal| other.contains(terminal))
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }
}

/// Addressing of a flit: which traffic class it belongs to and where it is
/// going, both as a terminal set (table routing) and as router ids
/// (topology-aware routing).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub vnet: usize,
    pub net_dest: DestinationSet,
    pub src_ni: usize,
    pub src_router: usize,
    pub dest_ni: usize,
    pub dest_router: usize,
    pub hops_traversed: usize,
}

impl RouteInfo {
    pub fn new(
        vnet: usize,
        net_dest: DestinationSet,
        (src_ni, src_router): (usize, usize),
        (dest_ni, dest_router): (usize, usize),
    ) -> Result<Self, Error> {
        if net_dest.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "empty destination set for a flit from terminal {} to terminal {}",
                src_ni, dest_ni
            )));
        }
        Ok(Self {
            vnet,
            net_dest,
            src_ni,
            src_router,
            dest_ni,
            dest_router,
            hops_traversed: 0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlitType {
    Head,
    Body,
    Tail,
    HeadTail,
}

impl FlitType {
    fn of(id: usize, size: usize) -> Self {
        if size == 1 {
            return FlitType::HeadTail;
        }
        if id % FLITS_PER_BLOCK == 0 {
            FlitType::Head
        } else if id == size - 1 {
            FlitType::Tail
        } else {
            FlitType::Body
        }
    }
}

/// Router pipeline stages a flit goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlitStage {
    Inject,
    VcAlloc,
    SwitchAlloc,
    SwitchTraversal,
    LinkTraversal,
}

/// A functional access into the memory system, e.g. from a debugger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    pub addr: u64,
    pub data: Vec<u8>,
}

/// The message carried by the flits of one network packet.
///
/// The router never looks inside; the payload only supports functional
/// (out-of-band) reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub addr: u64,
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(addr: u64, data: Vec<u8>) -> Self {
        Self { addr, data }
    }

    pub fn functional_read(&self, pkt: &mut Packet) -> bool {
        if pkt.addr != self.addr {
            return false;
        }
        pkt.data = self.data.clone();
        true
    }

    pub fn functional_write(&mut self, pkt: &Packet) -> bool {
        if pkt.addr != self.addr {
            return false;
        }
        self.data = pkt.data.clone();
        true
    }
}

/// All flits of a packet share their message.
pub type MsgPtr = Rc<RefCell<Message>>;

/// The unit of transport through the network.
#[derive(Clone, Debug)]
pub struct Flit {
    id: usize,
    size: usize,
    flit_type: FlitType,
    vnet: usize,
    vc: usize,
    route: RouteInfo,
    msg: MsgPtr,
    enqueue_time: Cycle,
    dequeue_time: Cycle,
    time: Cycle,
    stage: (FlitStage, Cycle),
    /// Outbound port chosen at the router currently holding the flit.
    outport: Option<usize>,
    outport_dirn: Option<PortDirection>,
}

impl Flit {
    pub fn new(
        id: usize,
        vc: usize,
        vnet: usize,
        route: RouteInfo,
        size: usize,
        msg: MsgPtr,
        cur_time: Cycle,
    ) -> Self {
        assert!(size > 0 && id < size, "flit {} of a {}-flit packet", id, size);
        Self {
            id,
            size,
            flit_type: FlitType::of(id, size),
            vnet,
            vc,
            route,
            msg,
            enqueue_time: cur_time,
            dequeue_time: cur_time,
            time: cur_time,
            stage: (FlitStage::Inject, cur_time),
            outport: None,
            outport_dirn: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn flit_type(&self) -> FlitType {
        self.flit_type
    }
    pub fn vnet(&self) -> usize {
        self.vnet
    }
    pub fn vc(&self) -> usize {
        self.vc
    }
    pub fn set_vc(&mut self, vc: usize) {
        self.vc = vc;
    }
    pub fn route(&self) -> &RouteInfo {
        &self.route
    }
    pub fn msg(&self) -> &MsgPtr {
        &self.msg
    }
    pub fn enqueue_time(&self) -> Cycle {
        self.enqueue_time
    }
    pub fn dequeue_time(&self) -> Cycle {
        self.dequeue_time
    }
    pub fn time(&self) -> Cycle {
        self.time
    }
    pub fn stage(&self) -> (FlitStage, Cycle) {
        self.stage
    }
    pub fn outport(&self) -> Option<usize> {
        self.outport
    }
    pub fn outport_dirn(&self) -> Option<PortDirection> {
        self.outport_dirn
    }

    pub fn set_outport(&mut self, outport: usize, dirn: PortDirection) {
        self.outport = Some(outport);
        self.outport_dirn = Some(dirn);
    }

    /// Forgets the previous router's decision when the flit enters a new one.
    pub fn clear_outport(&mut self) {
        self.outport = None;
        self.outport_dirn = None;
    }

    /// Called once per router traversal.
    pub fn increment_hops(&mut self) {
        self.route.hops_traversed += 1;
    }

    pub fn set_time(&mut self, time: Cycle) {
        assert!(time >= self.time, "flit {} time moves backwards", self.id);
        self.time = time;
    }

    pub fn set_dequeue_time(&mut self, time: Cycle) {
        assert!(time >= self.dequeue_time);
        self.dequeue_time = time;
    }

    pub fn advance_stage(&mut self, stage: FlitStage, time: Cycle) {
        assert!(
            time >= self.stage.1,
            "flit {} stage {:?} at {} precedes {:?} at {}",
            self.id,
            stage,
            time,
            self.stage.0,
            self.stage.1
        );
        self.stage = (stage, time);
    }

    pub fn is_stage(&self, stage: FlitStage, time: Cycle) -> bool {
        self.stage.0 == stage && self.stage.1 <= time
    }

    pub fn functional_read(&self, pkt: &mut Packet) -> bool {
        self.msg.borrow().functional_read(pkt)
    }

    pub fn functional_write(&self, pkt: &Packet) -> bool {
        self.msg.borrow_mut().functional_write(pkt)
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "flit,{},{:?},{},{},{},{},{}",
            self.id,
            self.flit_type,
            self.vnet,
            self.vc,
            self.route.src_router,
            self.route.dest_router,
            self.enqueue_time
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn route(src: usize, dest: usize, num_terminals: usize) -> RouteInfo {
        RouteInfo::new(
            0,
            DestinationSet::single(dest, num_terminals),
            (src, src),
            (dest, dest),
        )
        .unwrap()
    }

    fn flit(id: usize, size: usize) -> Flit {
        Flit::new(
            id,
            0,
            0,
            route(0, 1, 2),
            size,
            Rc::new(RefCell::new(Message::default())),
            0,
        )
    }

    #[test]
    fn flit_types() {
        assert_eq!(flit(0, 1).flit_type(), FlitType::HeadTail);

        assert_eq!(flit(0, 2).flit_type(), FlitType::Head);
        assert_eq!(flit(1, 2).flit_type(), FlitType::Tail);

        let types = (0..8).map(|id| flit(id, 8).flit_type()).collect::<Vec<_>>();
        assert_eq!(types[0], FlitType::Head);
        assert!(types[1..7].iter().all(|t| *t == FlitType::Body));
        assert_eq!(types[7], FlitType::Tail);

        // The last flit of a 9-flit packet starts a new block.
        assert_eq!(flit(0, 9).flit_type(), FlitType::Head);
        assert_eq!(flit(4, 9).flit_type(), FlitType::Body);
        assert_eq!(flit(8, 9).flit_type(), FlitType::Head);

        for id in 0..16 {
            let expected = match id {
                0 | 8 => FlitType::Head,
                15 => FlitType::Tail,
                _ => FlitType::Body,
            };
            assert_eq!(flit(id, 16).flit_type(), expected, "id {}", id);
        }
    }

    #[test]
    fn destination_sets_intersect() {
        let mut a = DestinationSet::new(8);
        a.add(1);
        a.add(5);
        let b = DestinationSet::single(5, 8);
        let c = DestinationSet::single(2, 8);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert_eq!(a.count(), 2);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 5]);
        // sets of different widths still compare by terminal id
        assert!(DestinationSet::single(5, 6).intersects(&a));
    }

    #[test]
    fn empty_destination_is_rejected() {
        assert!(RouteInfo::new(0, DestinationSet::new(4), (0, 0), (1, 1)).is_err());
    }

    #[test]
    #[should_panic]
    fn stages_never_go_back_in_time() {
        let mut f = flit(0, 1);
        f.advance_stage(FlitStage::SwitchAlloc, 10);
        f.advance_stage(FlitStage::SwitchTraversal, 9);
    }

    #[test]
    fn functional_access_goes_through_the_message() {
        let f = flit(0, 1);
        f.msg().borrow_mut().addr = 0x40;
        assert!(!f.functional_write(&Packet {
            addr: 0x80,
            data: vec![1]
        }));
        assert!(f.functional_write(&Packet {
            addr: 0x40,
            data: vec![1, 2]
        }));
        let mut pkt = Packet {
            addr: 0x40,
            ..Default::default()
        };
        assert!(f.functional_read(&mut pkt));
        assert_eq!(pkt.data, vec![1, 2]);
        assert_eq!(f.to_string(), "flit,0,HeadTail,0,0,0,1,0");
    }
}
