//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// OSPF interfaces.
//
// An interface is an IP address plus a physical interface and an area,
// with a type tag selecting the type-specific behavior. The interface
// state machine is table-driven: a static transition table maps (state
// set, event) to an action routine, and the action may compute the next
// state itself, as the DR election does.
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use ipnetwork::Ipv4Network;
use ism::{Event, State};
use smallvec::{SmallVec, smallvec};

use crate::area::{Area, AreaType, OptionsLocation, area_options};
use crate::collections::{
    Arena, InterfaceId, Lsdb, NeighborIndex, Neighbors,
};
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, InterfaceCfgError};
use crate::fsm;
use crate::instance::{InstanceUpView, SouthboundMsg};
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::MulticastAddr;
use crate::output;
use crate::packet::auth::AuthMethod;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, LsAck, Options, Packet, PacketHdr, PacketType};
use crate::tasks::{self, IntervalTask, TimeoutTask};

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    // Interface IP address; doubles as the interface identity.
    pub addr: Ipv4Addr,
    pub config: crate::config::InterfaceCfg,
    pub state: InterfaceState,
}

#[derive(Debug)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // The network DR/BDR, as claimed by the last election.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // Pending update: LSAs waiting to be grouped into Link State Update
    // packets.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // Pending delayed acknowledgments.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // LSDB of link-scope LSAs.
    pub lsdb: Lsdb,
    pub network_lsa_self: Option<LsaKey>,
    // Authentication data.
    pub auth: Option<AuthMethod>,
    // Cryptographic authentication sequence number, monotonic per sending
    // interface.
    pub auth_seqno: Arc<AtomicU32>,
    // Virtual link endpoint discovered by the routing calculation.
    pub vlink_nbr_addr: Option<Ipv4Addr>,
    // Statistics.
    pub event_count: u32,
    // Tasks.
    pub tasks: InterfaceTasks,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // NBMA poll interval tasks.
    pub nbma_poll_interval: HashMap<Ipv4Addr, IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

// Interface type. The type-specific behavior is dispatched on this tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InterfaceType {
    #[default]
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    VirtualLink,
    Loopback,
}

// A router competing in the DR election, with its current claims.
#[derive(Clone, Copy, Debug)]
struct DrCandidate {
    router_id: Ipv4Addr,
    net_id: NeighborNetId,
    priority: u8,
    claims_dr: bool,
    claims_bdr: bool,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// Interface states, as bits for the transition table.
const IFS_DOWN: u16 = 1 << 0;
const IFS_LOOP: u16 = 1 << 1;
const IFS_WAIT: u16 = 1 << 2;
const IFS_PP: u16 = 1 << 3;
const IFS_OTHER: u16 = 1 << 4;
const IFS_BACKUP: u16 = 1 << 5;
const IFS_DR: u16 = 1 << 6;

// Interface event codes.
const IFE_UP: u8 = 1;
const IFE_WTIM: u8 = 2;
const IFE_BSEEN: u8 = 3;
const IFE_NCHG: u8 = 4;
const IFE_DOWN: u8 = 5;

// Interface FSM actions.
#[derive(Clone, Copy, Debug)]
enum IsmAction {
    // Bring the interface into operation; the action picks the state.
    Start,
    // Run (or re-run) the DR election.
    Elect,
    // Tear the interface down.
    Reset,
    // Nothing to do.
    Ignore,
}

// The interface state machine proper. A NbrChange while still waiting is
// not in the RFC 2328 table but occurs in normal operation, so it is
// ignored rather than logged.
static ISM_TRANSITIONS: &[fsm::Transition<IsmAction, State>] = &[
    fsm::Transition {
        states: IFS_DOWN,
        event: IFE_UP,
        action: IsmAction::Start,
        new_state: None,
    },
    fsm::Transition {
        states: IFS_WAIT,
        event: IFE_WTIM,
        action: IsmAction::Elect,
        new_state: None,
    },
    fsm::Transition {
        states: IFS_WAIT,
        event: IFE_BSEEN,
        action: IsmAction::Elect,
        new_state: None,
    },
    fsm::Transition {
        states: IFS_WAIT,
        event: IFE_NCHG,
        action: IsmAction::Ignore,
        new_state: None,
    },
    fsm::Transition {
        states: IFS_OTHER | IFS_BACKUP | IFS_DR,
        event: IFE_NCHG,
        action: IsmAction::Elect,
        new_state: None,
    },
    fsm::Transition {
        states: fsm::ANY,
        event: IFE_DOWN,
        action: IsmAction::Reset,
        new_state: Some(State::Down),
    },
];

fn state_bit(state: State) -> u16 {
    match state {
        State::Down => IFS_DOWN,
        State::Loopback => IFS_LOOP,
        State::Waiting => IFS_WAIT,
        State::PointToPoint => IFS_PP,
        State::DrOther => IFS_OTHER,
        State::Backup => IFS_BACKUP,
        State::Dr => IFS_DR,
    }
}

fn event_code(event: &Event) -> u8 {
    match event {
        Event::InterfaceUp => IFE_UP,
        Event::WaitTimer => IFE_WTIM,
        Event::BackupSeen => IFE_BSEEN,
        Event::NbrChange => IFE_NCHG,
        Event::InterfaceDown(_) => IFE_DOWN,
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, addr: Ipv4Addr) -> Interface {
        Debug::InterfaceCreate(&addr.to_string()).log();

        Interface {
            id,
            addr,
            config: Default::default(),
            state: InterfaceState::default(),
        }
    }

    // The prefix directly attached to this interface.
    pub(crate) fn network(&self) -> Ipv4Network {
        Ipv4Network::new(self.addr, self.config.prefixlen)
            .unwrap_or_else(|_| Ipv4Network::new(self.addr, 32).unwrap())
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.config.passive || self.config.if_type == InterfaceType::Loopback
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    // IPv4 address identifying this router on the attached network.
    pub(crate) fn network_id(&self) -> NeighborNetId {
        NeighborNetId::from(self.addr)
    }

    // ===== state machine =====

    pub(crate) fn run_fsm(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.addr.to_string(), &self.state.ism_state, &event)
            .log();

        let Some((action, table_state)) = fsm::run(
            ISM_TRANSITIONS,
            state_bit(self.state.ism_state),
            event_code(&event),
        ) else {
            Error::IsmUnexpectedEvent(self.state.ism_state, event).log();
            return;
        };

        let computed = match action {
            IsmAction::Start => Some(self.start(area, instance, neighbors)),
            IsmAction::Elect => {
                self.state.tasks.wait_timer = None;
                Some(self.elect_dr(area, instance, neighbors))
            }
            IsmAction::Reset => {
                let Event::InterfaceDown(reason) = event else {
                    unreachable!();
                };
                self.stop(area, instance, neighbors, lsa_entries, reason);
                None
            }
            IsmAction::Ignore => None,
        };

        if let Some(next_state) = computed.or(table_state) {
            if next_state != self.state.ism_state {
                self.changed_state(area, instance, next_state);
            }
        }
    }

    // Brings the interface into operation and returns its first state.
    fn start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        Debug::InterfaceStart(&self.addr.to_string()).log();

        if !self.is_passive() {
            self.state.auth = self.config.auth.clone();
            if self.config.if_type != InterfaceType::VirtualLink {
                instance.tx.sb_send(SouthboundMsg::PhyOpen {
                    ifindex: self.config.ifindex,
                });
            }
            self.hello_interval_start(area, instance);
        }

        match self.config.if_type {
            InterfaceType::Loopback => State::Loopback,
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => State::PointToPoint,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                // Ineligible routers never wait for a Backup to show up.
                if self.config.priority == 0 {
                    return State::DrOther;
                }

                let task = tasks::ism_wait_timer(self, area, instance.tx);
                self.state.tasks.wait_timer = Some(task);

                // On NBMA segments, poke every configured DR-eligible
                // neighbor so hellos start flowing.
                if self.config.if_type == InterfaceType::NonBroadcast {
                    for (addr, _) in self
                        .config
                        .static_nbrs
                        .iter()
                        .filter(|(_, snbr)| snbr.priority != 0)
                    {
                        if let Some(nbr) = self
                            .state
                            .neighbors
                            .iter(neighbors)
                            .find(|nbr| nbr.src == *addr)
                        {
                            instance.tx.protocol_input.nsm_event(
                                area.id,
                                self.id,
                                nbr.id,
                                nsm::Event::Start,
                            );
                        }
                    }
                }

                State::Waiting
            }
        }
    }

    // Takes the interface out of operation, destroying its neighbors.
    fn stop(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(&self.addr.to_string(), reason).log();

        let event = match reason {
            InterfaceInactiveReason::OperationalDown => nsm::Event::LinkDown,
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.run_fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // The physical interface is released here; the multicast groups
        // are left when the state transition is processed.
        if !self.is_passive()
            && self.config.if_type != InterfaceType::VirtualLink
        {
            instance.tx.sb_send(SouthboundMsg::PhyClose {
                ifindex: self.config.ifindex,
            });
        }

        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        // NOTE: the interface LSDB is preserved.
        self.state.auth = None;
        self.state.vlink_nbr_addr = None;
        self.state.tasks = Default::default();
    }

    // Commits a state transition: reoriginate what the change invalidates,
    // fix up multicast memberships and record the event.
    fn changed_state(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        next_state: State,
    ) {
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceStateChange {
                area_id: area.id,
                iface_id: self.id,
            },
        );
        // Entering or leaving the DR role affects the network-LSA as well.
        if self.state.ism_state == State::Dr || next_state == State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        Debug::IsmTransition(
            &self.addr.to_string(),
            &self.state.ism_state,
            &next_state,
        )
        .log();
        let old_state = self.state.ism_state;
        self.state.ism_state = next_state;

        self.update_mcast_groups(instance, old_state);

        self.state.event_count += 1;
    }

    // ===== DR election =====

    // The election of RFC 2328 section 9.4. The Backup is chosen first,
    // among routers not claiming to be DR; the DR among routers claiming
    // to be DR, with the Backup promoted if there is no claimant. When the
    // calculating router's own role changes, both steps repeat once with
    // the updated claims.
    fn elect_dr(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        let net_id = self.network_id();
        let prev_dr = self.state.dr;
        let prev_bdr = self.state.bdr;

        // Everyone with bidirectional communication and a nonzero priority
        // competes, ourselves included.
        let mut candidates = Vec::with_capacity(
            self.state.neighbors.count() + 1,
        );
        if self.config.priority != 0 {
            candidates.push(DrCandidate {
                router_id: instance.state.router_id,
                net_id,
                priority: self.config.priority,
                claims_dr: self.state.dr == Some(net_id),
                claims_bdr: self.state.bdr == Some(net_id),
            });
        }
        for nbr in self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
        {
            let nbr_net_id = nbr.network_id();
            candidates.push(DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr_net_id,
                priority: nbr.priority,
                claims_dr: nbr.dr == Some(nbr_net_id),
                claims_bdr: nbr.bdr == Some(nbr_net_id),
            });
        }

        let mut new_bdr = Self::elect_backup(&candidates);
        let mut new_dr = Self::elect_designated(&candidates, new_bdr);

        // Repeat once if our own standing changed, with our claims set to
        // the first pass's outcome.
        if (new_dr == Some(net_id)) != (prev_dr == Some(net_id))
            || (new_bdr == Some(net_id)) != (prev_bdr == Some(net_id))
        {
            for cand in candidates.iter_mut() {
                if cand.net_id == net_id {
                    cand.claims_dr = new_dr == Some(net_id);
                    cand.claims_bdr = new_bdr == Some(net_id);
                }
            }
            new_bdr = Self::elect_backup(&candidates);
            new_dr = Self::elect_designated(&candidates, new_bdr);
        }

        self.state.dr = new_dr;
        self.state.bdr = new_bdr;
        Debug::IsmDrElection(
            &self.addr.to_string(),
            prev_dr,
            new_dr,
            prev_bdr,
            new_bdr,
        )
        .log();

        let next_state = if new_dr == Some(net_id) {
            State::Dr
        } else if new_bdr == Some(net_id) {
            State::Backup
        } else {
            State::DrOther
        };

        // An NBMA router that just took over one of the roles must start
        // polling the ineligible neighbors too.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(next_state, State::Dr | State::Backup)
        {
            for (addr, _) in self
                .config
                .static_nbrs
                .iter()
                .filter(|(_, snbr)| snbr.priority == 0)
            {
                if let Some(nbr) = self
                    .state
                    .neighbors
                    .iter(neighbors)
                    .find(|nbr| nbr.src == *addr)
                {
                    instance.tx.protocol_input.nsm_event(
                        area.id,
                        self.id,
                        nbr.id,
                        nsm::Event::Start,
                    );
                }
            }
        }

        // A role change anywhere on the segment may require adjacencies to
        // form or dissolve.
        if new_dr != prev_dr || new_bdr != prev_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            self.sync_hello_tx(area, instance);
        }

        if new_dr != prev_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        next_state
    }

    // Backup election: routers claiming DR are out; a router claiming
    // Backup beats one that doesn't; ties break on priority, then
    // Router ID.
    fn elect_backup(candidates: &[DrCandidate]) -> Option<NeighborNetId> {
        let mut best: Option<&DrCandidate> = None;
        for cand in candidates {
            if cand.claims_dr {
                continue;
            }
            let better = match best {
                None => true,
                Some(cur) => {
                    (cand.claims_bdr, cand.priority, cand.router_id)
                        > (cur.claims_bdr, cur.priority, cur.router_id)
                }
            };
            if better {
                best = Some(cand);
            }
        }
        best.map(|cand| cand.net_id)
    }

    // DR election: the best router claiming the role, or the fresh Backup
    // when nobody claims it.
    fn elect_designated(
        candidates: &[DrCandidate],
        bdr: Option<NeighborNetId>,
    ) -> Option<NeighborNetId> {
        let mut best: Option<&DrCandidate> = None;
        for cand in candidates {
            if !cand.claims_dr {
                continue;
            }
            let better = match best {
                None => true,
                Some(cur) => {
                    (cand.priority, cand.router_id)
                        > (cur.priority, cur.router_id)
                }
            };
            if better {
                best = Some(cand);
            }
        }
        best.map(|cand| cand.net_id).or(bdr)
    }

    // Whether an adjacency to this neighbor should be established. On
    // multi-access segments only the DR and Backup are adjacent to
    // everyone.
    pub(crate) fn adjacency_wanted(&self, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => true,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.is_dr_or_backup()
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
            InterfaceType::Loopback => false,
        }
    }

    // ===== hello receive =====

    // Finds the neighbor a received packet belongs to. On point-to-point
    // and virtual links neighbors are known by Router ID; elsewhere by the
    // packet's source address.
    pub(crate) fn find_nbr<'a>(
        &mut self,
        neighbors: &'a mut Arena<Neighbor>,
        src: Ipv4Addr,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => self
                .state
                .neighbors
                .get_mut_by_router_id(neighbors, router_id),
            _ => self
                .state
                .neighbors
                .get_mut_by_net_id(neighbors, src.into()),
        }
    }

    // Processes a received Hello packet: parameter agreement, neighbor
    // discovery, bidirectionality and the claims that feed the DR
    // election.
    pub(crate) fn recv_hello(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        src: Ipv4Addr,
        hello: Hello,
    ) -> Result<(), Error> {
        let cfg_error = |iface: &Interface, error| {
            Error::InterfaceCfgError(
                iface.addr.to_string(),
                src,
                PacketType::Hello,
                error,
            )
        };

        // The packet and the interface must agree on the network mask (on
        // real multi-access segments), the timer values and the external
        // routing capability; and the sender must not reuse our Router ID.
        if self.is_broadcast_or_nbma()
            && hello.network_mask != self.network().mask()
        {
            return Err(cfg_error(
                self,
                InterfaceCfgError::HelloMaskMismatch(
                    hello.network_mask,
                    self.network().mask(),
                ),
            ));
        }
        if hello.hello_interval != self.config.hello_interval {
            return Err(cfg_error(
                self,
                InterfaceCfgError::HelloIntervalMismatch(
                    hello.hello_interval,
                    self.config.hello_interval,
                ),
            ));
        }
        if hello.dead_interval != self.config.dead_interval as u32 {
            return Err(cfg_error(
                self,
                InterfaceCfgError::DeadIntervalMismatch(
                    hello.dead_interval,
                    self.config.dead_interval as u32,
                ),
            ));
        }
        if hello.options.contains(Options::E)
            != (area.config.area_type == AreaType::Normal)
        {
            return Err(cfg_error(
                self,
                InterfaceCfgError::ExternalRoutingCapabilityMismatch(
                    hello.options.contains(Options::E),
                ),
            ));
        }
        if hello.hdr.router_id == instance.state.router_id {
            return Err(cfg_error(
                self,
                InterfaceCfgError::DuplicateRouterId(hello.hdr.router_id),
            ));
        }

        // First contact creates the neighbor.
        let router_id = hello.hdr.router_id;
        let (_, nbr) = match self.find_nbr(neighbors, src, router_id) {
            Some(found) => found,
            None => {
                let (nbr_idx, nbr) =
                    self.state.neighbors.insert(neighbors, router_id, src);
                nbr.priority = hello.priority;
                if self.is_broadcast_or_nbma() {
                    nbr.dr = hello.dr;
                    nbr.bdr = hello.bdr;
                }
                (nbr_idx, nbr)
            }
        };

        // A point-to-point neighbor may renumber without losing its
        // identity.
        nbr.src = src;

        nbr.run_fsm(self, area, instance, lsa_entries, nsm::Event::HelloRcvd);

        // Seeing our own Router ID in the packet means the neighbor hears
        // us too.
        let heard = hello
            .neighbors
            .iter()
            .any(|id| *id == instance.state.router_id);
        if !heard {
            nbr.run_fsm(
                self,
                area,
                instance,
                lsa_entries,
                nsm::Event::OneWayRcvd,
            );
            if self.is_broadcast_or_nbma() {
                nbr.priority = hello.priority;
                nbr.dr = hello.dr;
                nbr.bdr = hello.bdr;
            }
            return Ok(());
        }
        nbr.run_fsm(self, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);

        // The remainder only matters where a DR is elected. (On
        // point-to-multipoint segments the claims are ignored, per errata
        // 4022 of RFC 2328.)
        if !self.is_broadcast_or_nbma() {
            return Ok(());
        }

        let protocol_input = &instance.tx.protocol_input;
        if hello.priority != nbr.priority {
            nbr.priority = hello.priority;
            protocol_input.ism_event(area.id, self.id, Event::NbrChange);
        }

        let nbr_net_id = nbr.network_id();
        let was_dr = nbr.dr == Some(nbr_net_id);
        let is_dr = hello.dr == Some(nbr_net_id);
        let was_bdr = nbr.bdr == Some(nbr_net_id);
        let is_bdr = hello.bdr == Some(nbr_net_id);

        // A neighbor declaring itself ends the waiting period: either it
        // is the Backup, or it is the DR of a segment with no Backup.
        if self.state.ism_state == State::Waiting
            && (is_bdr || (is_dr && hello.bdr.is_none()))
        {
            protocol_input.ism_event(area.id, self.id, Event::BackupSeen);
        }

        // Claims appearing or disappearing re-run the election.
        if was_dr != is_dr || was_bdr != is_bdr {
            protocol_input.ism_event(area.id, self.id, Event::NbrChange);
        }

        nbr.dr = hello.dr;
        nbr.bdr = hello.bdr;

        Ok(())
    }

    // ===== packet transmission =====

    // Builds and queues a Hello packet for the given destinations.
    pub(crate) fn send_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
        dst: SmallVec<[Ipv4Addr; 4]>,
    ) {
        // Point-to-point and virtual links carry no mask.
        let network_mask = if self.is_broadcast_or_nbma()
            || self.config.if_type == InterfaceType::PointToMultipoint
        {
            self.network().mask()
        } else {
            Ipv4Addr::UNSPECIFIED
        };

        let packet = Packet::Hello(Hello {
            hdr: PacketHdr::new(
                PacketType::Hello,
                instance.state.router_id,
                area.area_id,
            ),
            network_mask,
            hello_interval: self.config.hello_interval,
            options: area_options(
                area,
                OptionsLocation::new_packet(PacketType::Hello),
            ),
            priority: self.config.priority,
            dead_interval: self.config.dead_interval as u32,
            dr: self.state.dr,
            bdr: self.state.bdr,
            neighbors: self
                .state
                .neighbors
                .iter(neighbors)
                .map(|nbr| nbr.router_id)
                .collect(),
        });

        instance.tx.net_send(output::build_msg(self, packet, dst));
    }

    // Where this interface's hellos go: the AllSPFRouters group where
    // multicast works, each configured neighbor otherwise.
    pub(crate) fn hello_destinations(&self) -> SmallVec<[Ipv4Addr; 4]> {
        match self.config.if_type {
            InterfaceType::Broadcast | InterfaceType::PointToPoint => {
                smallvec![MulticastAddr::AllSpfRtrs.addr()]
            }
            InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
                self.config.static_nbrs.keys().copied().collect()
            }
            InterfaceType::VirtualLink => {
                self.state.vlink_nbr_addr.into_iter().collect()
            }
            InterfaceType::Loopback => SmallVec::new(),
        }
    }

    // Where flooded traffic (updates and delayed acks) goes. Non-DR
    // routers on a broadcast segment talk to AllDRouters only; on
    // non-broadcast segments each adjacent neighbor is addressed
    // individually.
    pub(crate) fn flood_destinations(
        &self,
        neighbors: &Arena<Neighbor>,
    ) -> SmallVec<[Ipv4Addr; 4]> {
        match self.config.if_type {
            InterfaceType::Broadcast => {
                let group = if self.is_dr_or_backup() {
                    MulticastAddr::AllSpfRtrs
                } else {
                    MulticastAddr::AllDrRtrs
                };
                smallvec![group.addr()]
            }
            InterfaceType::PointToPoint => {
                smallvec![MulticastAddr::AllSpfRtrs.addr()]
            }
            InterfaceType::NonBroadcast
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Exchange)
                .map(|nbr| nbr.src)
                .collect(),
            InterfaceType::Loopback => SmallVec::new(),
        }
    }

    // Adds an LSA to the pending update, starting the grouping timer so
    // nearby floods share packets.
    pub(crate) fn add_to_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance.tx);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    // Adds an LSA header to the pending delayed acknowledgment, starting
    // the ack timer if it isn't already ticking.
    pub(crate) fn build_dack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance.tx);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    // Flushes the pending update as one or more Link State Update packets.
    pub(crate) fn send_update_list(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) {
        let dst = self.flood_destinations(neighbors);
        let mut list = std::mem::take(&mut self.state.ls_update_list);
        for packet in output::lsupd_packets(
            instance.state.router_id,
            area.area_id,
            &mut list,
            output::max_packet_size(self),
            instance.now(),
            self.config.transmit_delay,
        ) {
            instance
                .tx
                .net_send(output::build_msg(self, packet, dst.clone()));
        }
    }

    // Flushes the pending delayed acknowledgments.
    pub(crate) fn send_delayed_acks(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) {
        let dst = self.flood_destinations(neighbors);
        let per_packet = (output::max_packet_size(self) - PacketHdr::LENGTH)
            / LsaHdr::LENGTH;

        let mut pending = std::mem::take(&mut self.state.ls_ack_list);
        while !pending.is_empty() {
            let mut lsa_hdrs = Vec::with_capacity(per_packet as usize);
            while lsa_hdrs.len() < per_packet as usize {
                match pending.pop_first() {
                    Some((_, lsa_hdr)) => lsa_hdrs.push(lsa_hdr),
                    None => break,
                }
            }

            let packet = Packet::LsAck(LsAck {
                hdr: PacketHdr::new(
                    PacketType::LsAck,
                    instance.state.router_id,
                    area.area_id,
                ),
                lsa_hdrs,
            });
            instance
                .tx
                .net_send(output::build_msg(self, packet, dst.clone()));
        }
    }

    // ===== timer management =====

    // Restart the Hello Tx task.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.is_passive() && self.state.ism_state >= State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance.tx, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        addr: Ipv4Addr,
        poll_interval: u16,
    ) {
        let task = tasks::nbma_poll_interval(
            self,
            area,
            instance.tx,
            addr,
            poll_interval,
        );
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: Ipv4Addr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    // Reconciles multicast group memberships with the new state.
    fn update_mcast_groups(
        &mut self,
        instance: &InstanceUpView<'_>,
        old_state: State,
    ) {
        if self.is_passive()
            || self.config.if_type == InterfaceType::VirtualLink
        {
            return;
        }
        let ifindex = self.config.ifindex;

        // AllSPFRouters membership follows interface operation.
        let was_member = old_state >= State::Waiting;
        let is_member = self.state.ism_state >= State::Waiting;
        if is_member && !was_member {
            instance.tx.sb_send(SouthboundMsg::Join {
                ifindex,
                group: MulticastAddr::AllSpfRtrs,
            });
        } else if !is_member && was_member {
            instance.tx.sb_send(SouthboundMsg::Leave {
                ifindex,
                group: MulticastAddr::AllSpfRtrs,
            });
        }

        // AllDRouters membership follows the DR and Backup roles.
        let was_member = matches!(old_state, State::Dr | State::Backup);
        let is_member = self.is_dr_or_backup();
        if is_member && !was_member {
            instance.tx.sb_send(SouthboundMsg::Join {
                ifindex,
                group: MulticastAddr::AllDrRtrs,
            });
        } else if !is_member && was_member {
            instance.tx.sb_send(SouthboundMsg::Leave {
                ifindex,
                group: MulticastAddr::AllDrRtrs,
            });
        }
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.addr.to_string()).log();
    }
}

impl Default for InterfaceState {
    fn default() -> InterfaceState {
        InterfaceState {
            ism_state: Default::default(),
            dr: None,
            bdr: None,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            lsdb: Default::default(),
            network_lsa_self: None,
            auth: None,
            auth_seqno: Arc::new(AtomicU32::new(0)),
            vlink_nbr_addr: None,
            event_count: 0,
            tasks: Default::default(),
        }
    }
}
