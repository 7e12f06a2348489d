//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// OSPF neighbors.
//
// One neighbor per remote router per interface. The neighbor state
// machine is table-driven like the interface's; the database exchange
// keeps the master/slave bookkeeping, the three retransmission lists and
// the last sent/received Database Description packets here.
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use nsm::{Event, State};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::area::{Area, OptionsLocation, area_options};
use crate::collections::{Arena, NeighborId};
use crate::debug::{Debug, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::fsm;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType};
use crate::lsdb::{self, LsaEntry, LsaOriginateEvent, lsa_admissible};
use crate::network::MulticastAddr;
use crate::output;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaScope};
use crate::packet::tlv::GrReason;
use crate::packet::{
    DbDesc, DbDescFlags, LsAck, LsRequest, Options, Packet, PacketHdr,
    PacketType,
};
use crate::tasks::{self, IntervalTask, TimeoutTask};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<output::NetTxPacketMsg>,
    pub auth_seqno: std::collections::HashMap<PacketType, u32>,

    // Set while the neighbor waits for a free database exchange slot.
    pub dd_pending: bool,

    pub event_count: u32,

    pub gr: Option<NeighborGrHelper>,
    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

// IPv4 address identifying the neighbor on a multi-access network.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(Ipv4Addr);

#[derive(Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description
    // packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be requested from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs requested but not yet received.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug)]
pub struct NeighborGrHelper {
    pub restart_reason: GrReason,
    pub grace_period: TimeoutTask,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
#[derive(Deserialize, Serialize)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// Neighbor states, as bits for the transition table.
const NBS_DOWN: u16 = 1 << 0;
const NBS_ATTEMPT: u16 = 1 << 1;
const NBS_INIT: u16 = 1 << 2;
const NBS_2WAY: u16 = 1 << 3;
const NBS_EXSTART: u16 = 1 << 4;
const NBS_EXCHANGE: u16 = 1 << 5;
const NBS_LOADING: u16 = 1 << 6;
const NBS_FULL: u16 = 1 << 7;

// Any state with bidirectional communication, and the adjacency-forming
// subsets.
const NBS_BIDIR: u16 =
    NBS_2WAY | NBS_EXSTART | NBS_EXCHANGE | NBS_LOADING | NBS_FULL;
const NBS_ADJFORM: u16 = NBS_EXSTART | NBS_EXCHANGE | NBS_LOADING | NBS_FULL;
const NBS_ACTIVE: u16 = NBS_INIT | NBS_BIDIR;

// Neighbor event codes.
const NBE_HELLO: u8 = 1;
const NBE_START: u8 = 2;
const NBE_2WAY: u8 = 3;
const NBE_NEGDONE: u8 = 4;
const NBE_EXCHDONE: u8 = 5;
const NBE_BADREQ: u8 = 6;
const NBE_LDONE: u8 = 7;
const NBE_EVAL: u8 = 8;
const NBE_SEQMIS: u8 = 9;
const NBE_1WAY: u8 = 10;
const NBE_DESTROY: u8 = 11;
const NBE_INACT: u8 = 12;
const NBE_LDOWN: u8 = 13;

// Neighbor FSM actions.
#[derive(Clone, Copy, Debug)]
enum NsmAction {
    // Restart the inactivity timer.
    Heard,
    // Decide whether an adjacency should form; picks ExStart or TwoWay.
    EvalAdj,
    // Snapshot the database into the summary list.
    Snapshot,
    // Decide whether loading is still outstanding; picks Full or Loading.
    DonePick,
    // Tear the adjacency down and renegotiate from scratch.
    Restart,
    // Reconsider an established adjacency; may fall back to TwoWay.
    Reeval,
    // Communication became one-way; helper mode may keep the state.
    OneWay,
    // The neighbor is gone; helper mode may keep the state.
    Destroy,
    // Nothing to do.
    Ignore,
}

// The neighbor state machine proper.
static NSM_TRANSITIONS: &[fsm::Transition<NsmAction, State>] = &[
    fsm::Transition {
        states: NBS_DOWN,
        event: NBE_START,
        action: NsmAction::Heard,
        new_state: Some(State::Attempt),
    },
    fsm::Transition {
        states: NBS_DOWN | NBS_ATTEMPT,
        event: NBE_HELLO,
        action: NsmAction::Heard,
        new_state: Some(State::Init),
    },
    fsm::Transition {
        states: NBS_ACTIVE,
        event: NBE_HELLO,
        action: NsmAction::Heard,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_INIT,
        event: NBE_2WAY,
        action: NsmAction::EvalAdj,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_2WAY,
        event: NBE_EVAL,
        action: NsmAction::EvalAdj,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_EXSTART,
        event: NBE_NEGDONE,
        action: NsmAction::Snapshot,
        new_state: Some(State::Exchange),
    },
    fsm::Transition {
        states: NBS_EXCHANGE,
        event: NBE_EXCHDONE,
        action: NsmAction::DonePick,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_LOADING,
        event: NBE_LDONE,
        action: NsmAction::Ignore,
        new_state: Some(State::Full),
    },
    fsm::Transition {
        states: NBS_ADJFORM,
        event: NBE_EVAL,
        action: NsmAction::Reeval,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_EXCHANGE | NBS_LOADING | NBS_FULL,
        event: NBE_SEQMIS,
        action: NsmAction::Restart,
        new_state: Some(State::ExStart),
    },
    fsm::Transition {
        states: NBS_EXCHANGE | NBS_LOADING | NBS_FULL,
        event: NBE_BADREQ,
        action: NsmAction::Restart,
        new_state: Some(State::ExStart),
    },
    fsm::Transition {
        states: NBS_BIDIR,
        event: NBE_1WAY,
        action: NsmAction::OneWay,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_BIDIR,
        event: NBE_2WAY,
        action: NsmAction::Ignore,
        new_state: None,
    },
    fsm::Transition {
        states: NBS_INIT,
        event: NBE_1WAY,
        action: NsmAction::Ignore,
        new_state: None,
    },
    fsm::Transition {
        states: fsm::ANY,
        event: NBE_DESTROY,
        action: NsmAction::Destroy,
        new_state: None,
    },
    fsm::Transition {
        states: fsm::ANY,
        event: NBE_INACT,
        action: NsmAction::Destroy,
        new_state: None,
    },
    fsm::Transition {
        states: fsm::ANY,
        event: NBE_LDOWN,
        action: NsmAction::Destroy,
        new_state: None,
    },
];

fn state_bit(state: State) -> u16 {
    match state {
        State::Down => NBS_DOWN,
        State::Attempt => NBS_ATTEMPT,
        State::Init => NBS_INIT,
        State::TwoWay => NBS_2WAY,
        State::ExStart => NBS_EXSTART,
        State::Exchange => NBS_EXCHANGE,
        State::Loading => NBS_LOADING,
        State::Full => NBS_FULL,
    }
}

fn event_code(event: &Event) -> u8 {
    match event {
        Event::HelloRcvd => NBE_HELLO,
        Event::Start => NBE_START,
        Event::TwoWayRcvd => NBE_2WAY,
        Event::NegotiationDone => NBE_NEGDONE,
        Event::ExchangeDone => NBE_EXCHDONE,
        Event::BadLsReq => NBE_BADREQ,
        Event::LoadingDone => NBE_LDONE,
        Event::AdjOk => NBE_EVAL,
        Event::SeqNoMismatch(_) => NBE_SEQMIS,
        Event::OneWayRcvd => NBE_1WAY,
        Event::Kill => NBE_DESTROY,
        Event::InactivityTimer => NBE_INACT,
        Event::LinkDown => NBE_LDOWN,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        // Initialize the DD Sequence Number.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                // Random value.
                use rand::RngCore;
                rand::rng().next_u32()
            }
            #[cfg(feature = "deterministic")]
            {
                // Fixed value for deterministic test results.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            auth_seqno: Default::default(),
            dd_pending: false,
            event_count: 0,
            gr: None,
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    // Whether the neighbor should be advertised as fully adjacent. True in
    // the Full state, and also for as long as we act as the neighbor's
    // graceful restart helper.
    pub(crate) fn adv_as_full(&self) -> bool {
        self.state == State::Full || self.we_are_helping()
    }

    // Whether this neighbor is being helped through a restart.
    pub(crate) fn we_are_helping(&self) -> bool {
        self.gr.is_some()
    }

    pub(crate) fn network_id(&self) -> NeighborNetId {
        NeighborNetId(self.src)
    }

    // ===== state machine =====

    pub(crate) fn run_fsm(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let Some((action, table_state)) = fsm::run(
            NSM_TRANSITIONS,
            state_bit(self.state),
            event_code(&event),
        ) else {
            Error::NsmUnexpectedEvent(self.router_id, self.state, event)
                .log();
            return;
        };

        let computed = match action {
            NsmAction::Heard => {
                self.inactivity_timer_restart(iface, area, instance);
                None
            }
            NsmAction::EvalAdj => {
                Some(self.eval_adjacency(iface, area, instance))
            }
            NsmAction::Snapshot => {
                self.snapshot_database(iface, area, instance, lsa_entries);
                None
            }
            NsmAction::DonePick => {
                // Loading continues until every request is answered.
                if self.lists.ls_request.is_empty()
                    && self.lists.ls_request_pending.is_empty()
                {
                    Some(State::Full)
                } else {
                    Some(State::Loading)
                }
            }
            NsmAction::Restart => {
                self.clear_adjacency();
                self.dd_exchange_start(iface, area, instance);
                None
            }
            NsmAction::Reeval => {
                if iface.adjacency_wanted(self) {
                    None
                } else {
                    self.clear_adjacency();
                    Some(State::TwoWay)
                }
            }
            NsmAction::OneWay => {
                self.clear_adjacency();
                self.tasks.inactivity_timer = None;

                // Helper mode pins the state; the grace period decides the
                // neighbor's fate instead.
                if self.we_are_helping() {
                    None
                } else {
                    Some(State::Init)
                }
            }
            NsmAction::Destroy => {
                self.clear_adjacency();
                self.tasks.inactivity_timer = None;

                // As above: an inactivity timeout while helping doesn't
                // take the neighbor down.
                if event == Event::InactivityTimer && self.we_are_helping() {
                    None
                } else {
                    Some(State::Down)
                }
            }
            NsmAction::Ignore => None,
        };

        if let Some(next_state) = computed.or(table_state) {
            if next_state != self.state {
                self.changed_state(iface, area, instance, event, next_state);
            }
        }
    }

    // Decides whether the adjacency should form. The number of concurrent
    // database exchanges is bounded network-wide; over the limit the
    // neighbor parks in 2-Way until a slot frees up.
    fn eval_adjacency(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> State {
        if !iface.adjacency_wanted(self) {
            self.dd_pending = false;
            return State::TwoWay;
        }

        if instance.state.dd_active_count.get() >= instance.config.max_dds {
            self.dd_pending = true;
            instance.tx.protocol_input.dd_slot_check();
            return State::TwoWay;
        }

        self.dd_exchange_start(iface, area, instance);
        State::ExStart
    }

    // Lists the entire database in the summary list for the exchange.
    // MaxAge LSAs are not summarized; the neighbor gets them as regular
    // floods so it can acknowledge the removal.
    fn snapshot_database(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        let options = self.options;
        for lse in iface
            .state
            .lsdb
            .iter(lsa_entries)
            .chain(area.state.lsdb.iter(lsa_entries))
            .chain(instance.state.lsdb.iter(lsa_entries))
            .map(|(_, lse)| lse)
            .filter(|lse| {
                lsa_admissible(
                    Some(area.config.area_type),
                    options,
                    lse.data.hdr.lsa_type,
                )
            })
        {
            let lsa_key = lse.data.hdr.key();
            if lse.data.hdr.is_maxage() {
                self.lists.ls_rxmt.insert(lsa_key, lse.data.clone());
                self.rxmt_lsupd_start_check(iface, area, instance);
            } else {
                self.lists.db_summary.insert(lsa_key, lse.data.clone());
            }
        }

        self.dd_flags.remove(DbDescFlags::I);
    }

    // Commits a state transition and its side effects.
    fn changed_state(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        event: Event,
        next_state: State,
    ) {
        let old_state = self.state;

        // Gaining or losing bidirectional communication changes the DR
        // election inputs on multi-access segments.
        let was_bidir = old_state >= State::TwoWay;
        let is_bidir = next_state >= State::TwoWay;
        if was_bidir != is_bidir && iface.is_broadcast_or_nbma() {
            instance.tx.protocol_input.ism_event(
                area.id,
                iface.id,
                crate::interface::ism::Event::NbrChange,
            );
        }

        // Database exchange slot accounting, with promotion of a parked
        // neighbor when a slot frees up.
        let was_exchanging = matches!(
            old_state,
            State::ExStart | State::Exchange | State::Loading
        );
        let is_exchanging = matches!(
            next_state,
            State::ExStart | State::Exchange | State::Loading
        );
        if is_exchanging != was_exchanging {
            let count = instance.state.dd_active_count.get();
            if is_exchanging {
                instance.state.dd_active_count.set(count.saturating_add(1));
            } else {
                instance.state.dd_active_count.set(count.saturating_sub(1));
                instance.tx.protocol_input.dd_slot_check();
            }
        }

        // Entering or leaving Full changes the links we advertise, except
        // while the adjacency is being carried through a graceful restart.
        if (next_state == State::Full || old_state == State::Full)
            && !self.we_are_helping()
        {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // A dead NBMA neighbor is still polled, only slower.
        if iface.config.if_type == InterfaceType::NonBroadcast {
            if next_state == State::Down && event == Event::InactivityTimer {
                if let Some(snbr) = iface.config.static_nbrs.get(&self.src) {
                    let poll_interval = snbr.poll_interval;
                    iface.nbma_poll_interval_start(
                        area,
                        instance,
                        self.src,
                        poll_interval,
                    );
                }
            } else if old_state == State::Down {
                iface.nbma_poll_interval_stop(self.src);
            }
        }

        Debug::NsmTransition(self.router_id, &old_state, &next_state).log();
        self.state = next_state;
        self.event_count += 1;
    }

    // Drops all adjacency state, leaving only what hellos maintain.
    fn clear_adjacency(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.dd_pending = false;
        self.lists = Default::default();
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    // Claims mastership and sends the initial Database Description packet.
    pub(crate) fn dd_exchange_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        self.dd_pending = false;
        self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
        self.dd_flags =
            DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS;
        self.send_dbdesc(iface, area, instance);
    }

    // ===== database description receive =====

    pub(crate) fn recv_dbdesc(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        src: Ipv4Addr,
        dd: DbDesc,
    ) -> Result<(), Error> {
        // The exchange is only possible when both routers can carry the
        // same packets.
        if iface.config.if_type != InterfaceType::VirtualLink
            && dd.mtu > iface.config.mtu
        {
            return Err(Error::InterfaceCfgError(
                iface.addr.to_string(),
                src,
                PacketType::DbDesc,
                InterfaceCfgError::MtuMismatch(dd.mtu),
            ));
        }

        match self.state {
            State::Down | State::Attempt | State::TwoWay => {
                return Err(Error::DbDescReject(self.router_id, self.state));
            }
            State::Init | State::ExStart => {
                // A Database Description packet also proves
                // bidirectionality.
                if self.state == State::Init {
                    self.run_fsm(
                        iface,
                        area,
                        instance,
                        lsa_entries,
                        Event::TwoWayRcvd,
                    );
                    if self.state != State::ExStart {
                        return Ok(());
                    }
                }

                if !self.dd_negotiate(instance, &dd) {
                    return Ok(());
                }
                self.options = Some(dd.options);
                self.run_fsm(
                    iface,
                    area,
                    instance,
                    lsa_entries,
                    Event::NegotiationDone,
                );
            }
            State::Exchange => {
                if self.dd_is_duplicate(&dd) {
                    // The slave answers duplicates by resending its last
                    // packet; the master just ignores them.
                    if !self.dd_flags.contains(DbDescFlags::MS) {
                        self.rxmt_dbdesc(instance);
                    }
                    return Ok(());
                }

                if let Some(reason) = self.dd_mismatch(&dd) {
                    self.run_fsm(
                        iface,
                        area,
                        instance,
                        lsa_entries,
                        Event::SeqNoMismatch(reason),
                    );
                    return Ok(());
                }
            }
            State::Loading | State::Full => {
                if self.dd_is_duplicate(&dd) {
                    if !self.dd_flags.contains(DbDescFlags::MS) {
                        self.rxmt_dbdesc(instance);
                    }
                    return Ok(());
                }

                let reason = SeqNoMismatchReason::UnexpectedDbDesc;
                self.run_fsm(
                    iface,
                    area,
                    instance,
                    lsa_entries,
                    Event::SeqNoMismatch(reason),
                );
                return Ok(());
            }
        }

        self.dd_accept(iface, area, instance, lsa_entries, dd);
        Ok(())
    }

    // ExStart negotiation: the router with the larger Router ID becomes
    // master and dictates the sequence numbers. Returns whether the packet
    // settled the roles.
    fn dd_negotiate(
        &mut self,
        instance: &InstanceUpView<'_>,
        dd: &DbDesc,
    ) -> bool {
        let my_id = instance.state.router_id;

        // An empty initial packet from the higher Router ID makes us
        // slave.
        if dd.dd_flags
            .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
            && dd.lsa_hdrs.is_empty()
            && dd.hdr.router_id > my_id
        {
            self.dd_flags.remove(DbDescFlags::MS);
            self.dd_seq_no = dd.dd_seq_no;
            return true;
        }

        // An echo of our own sequence number from the lower Router ID
        // confirms us as master.
        if !dd.dd_flags.intersects(DbDescFlags::I | DbDescFlags::MS)
            && dd.dd_seq_no == self.dd_seq_no
            && dd.hdr.router_id < my_id
        {
            return true;
        }

        false
    }

    pub(crate) fn dd_is_duplicate(&self, dd: &DbDesc) -> bool {
        match &self.last_rcvd_dbdesc {
            Some(last) => {
                last.options == dd.options
                    && last.dd_flags == dd.dd_flags
                    && last.dd_seq_no == dd.dd_seq_no
            }
            None => false,
        }
    }

    // In-exchange consistency checks.
    fn dd_mismatch(&self, dd: &DbDesc) -> Option<SeqNoMismatchReason> {
        let last = self.last_rcvd_dbdesc.as_ref().unwrap();

        // The Init bit must stay clear, and the master bit must not flip.
        if dd.dd_flags.contains(DbDescFlags::I)
            || dd.dd_flags.contains(DbDescFlags::MS)
                != last.dd_flags.contains(DbDescFlags::MS)
        {
            return Some(SeqNoMismatchReason::InconsistentFlags);
        }

        if dd.options != last.options {
            return Some(SeqNoMismatchReason::InconsistentOptions);
        }

        // The master expects its own sequence echoed; the slave expects
        // the next one.
        let expected = if self.dd_flags.contains(DbDescFlags::MS) {
            self.dd_seq_no
        } else {
            self.dd_seq_no.wrapping_add(1)
        };
        if dd.dd_seq_no != expected {
            return Some(SeqNoMismatchReason::InconsistentSeqNo);
        }

        None
    }

    // The packet was accepted: absorb its headers, advance the sequence
    // and answer or finish as master or slave.
    fn dd_accept(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        dd: DbDesc,
    ) {
        self.rxmt_dbdesc_stop();

        for lsa_hdr in &dd.lsa_hdrs {
            // A header the area or neighbor can't carry poisons the whole
            // exchange.
            if !lsa_admissible(
                Some(area.config.area_type),
                self.options,
                lsa_hdr.lsa_type,
            ) {
                let reason = SeqNoMismatchReason::InvalidLsaType;
                self.run_fsm(
                    iface,
                    area,
                    instance,
                    lsa_entries,
                    Event::SeqNoMismatch(reason),
                );
                return;
            }

            // A summarized LSA the neighbor already has at least as
            // recently needn't be described to it (RFC 5243).
            let lsa_key = lsa_hdr.key();
            if let Some(mine) = self.lists.db_summary.get(&lsa_key) {
                if lsdb::lsa_compare(&mine.hdr, lsa_hdr)
                    != std::cmp::Ordering::Greater
                {
                    self.lists.db_summary.remove(&lsa_key);
                }
            }

            // Request whatever is newer than (or absent from) our
            // database.
            let lsdb = match lsa_hdr.lsa_type.scope() {
                LsaScope::Link => &iface.state.lsdb,
                LsaScope::Area => &area.state.lsdb,
                LsaScope::As => &instance.state.lsdb,
                LsaScope::Unknown => unreachable!(),
            };
            let outdated = match lsdb.get(lsa_entries, &lsa_key) {
                Some((_, lse)) => {
                    lsdb::lsa_compare(&lse.data.hdr, lsa_hdr)
                        == std::cmp::Ordering::Less
                }
                None => true,
            };
            if outdated {
                self.lists.ls_request.insert(lsa_key, *lsa_hdr);
            }
        }

        // Kick off loading as soon as there is something to ask for.
        if !self.lists.ls_request.is_empty()
            && self.lists.ls_request_pending.is_empty()
        {
            self.send_lsreq(iface, area, instance);
        }

        // Sequencing. The exchange ends once both sides have emptied their
        // summary lists; the master detects this before answering, the
        // slave after its own reply possibly clears its More bit.
        let theirs_done = !dd.dd_flags.contains(DbDescFlags::M);
        let mut exchange_done = false;
        if self.dd_flags.contains(DbDescFlags::MS) {
            self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
            if theirs_done && !self.dd_flags.contains(DbDescFlags::M) {
                exchange_done = true;
            } else {
                self.send_dbdesc(iface, area, instance);
            }
        } else {
            self.dd_seq_no = dd.dd_seq_no;
            self.send_dbdesc(iface, area, instance);
            if theirs_done && !self.dd_flags.contains(DbDescFlags::M) {
                exchange_done = true;
            }
        }

        if exchange_done {
            self.run_fsm(
                iface,
                area,
                instance,
                lsa_entries,
                Event::ExchangeDone,
            );

            // The slave must keep its last packet around for a dead
            // interval, in case the master retransmits.
            if !self.dd_flags.contains(DbDescFlags::MS) {
                let task =
                    tasks::dbdesc_free_timer(self, iface, area, instance.tx);
                self.tasks.dbdesc_free_timer = Some(task);
            }
        }

        self.last_rcvd_dbdesc = Some(LastDbDesc {
            options: dd.options,
            dd_flags: dd.dd_flags,
            dd_seq_no: dd.dd_seq_no,
        });
    }

    // ===== link state request receive =====

    pub(crate) fn recv_lsreq(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        ls_req: LsRequest,
    ) {
        if self.state < State::Exchange {
            Debug::PacketRxIgnore(self.router_id, &self.state).log();
            return;
        }

        for lsa_key in &ls_req.entries {
            let lsdb = match lsa_key.lsa_type.scope() {
                LsaScope::Link => &iface.state.lsdb,
                LsaScope::Area => &area.state.lsdb,
                LsaScope::As => &instance.state.lsdb,
                LsaScope::Unknown => continue,
            };

            // Requesting something we don't have means the exchange went
            // wrong; start over.
            let Some((_, lse)) = lsdb.get(lsa_entries, lsa_key) else {
                self.run_fsm(
                    iface,
                    area,
                    instance,
                    lsa_entries,
                    Event::BadLsReq,
                );
                return;
            };
            self.lists.ls_update.insert(*lsa_key, lse.data.clone());
        }

        if !self.lists.ls_update.is_empty() {
            instance
                .tx
                .protocol_input
                .send_lsupd(area.id, iface.id, Some(self.id));
        }
    }

    // ===== link state acknowledgment receive =====

    pub(crate) fn recv_lsack(&mut self, ls_ack: LsAck) {
        if self.state < State::Exchange {
            Debug::PacketRxIgnore(self.router_id, &self.state).log();
            return;
        }

        for lsa_hdr in &ls_ack.lsa_hdrs {
            let lsa_key = lsa_hdr.key();
            let Some(pending) = self.lists.ls_rxmt.get(&lsa_key) else {
                continue;
            };

            // Only an ack for the exact instance clears the
            // retransmission; anything else is noise worth logging.
            if lsdb::lsa_compare(&pending.hdr, lsa_hdr)
                == std::cmp::Ordering::Equal
            {
                self.lists.ls_rxmt.remove(&lsa_key);
                self.rxmt_lsupd_stop_check();
            } else {
                Debug::QuestionableAck(self.router_id, lsa_hdr).log();
            }
        }
    }

    // Checks whether database loading has finished, requesting more if
    // anything is still missing.
    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.lists.ls_request_pending.is_empty() {
            return;
        }
        self.rxmt_lsreq_stop();

        if !self.lists.ls_request.is_empty() {
            self.send_lsreq(iface, area, instance);
        } else if self.state == State::Loading {
            instance.tx.protocol_input.nsm_event(
                area.id,
                iface.id,
                self.id,
                Event::LoadingDone,
            );
        }
    }

    // ===== packet transmission =====

    // Unicast destination of adjacency traffic for this neighbor.
    // Point-to-point links keep using the AllSPFRouters group.
    fn unicast_destination(
        &self,
        iface: &Interface,
    ) -> SmallVec<[Ipv4Addr; 4]> {
        if iface.config.if_type == InterfaceType::PointToPoint {
            smallvec![MulticastAddr::AllSpfRtrs.addr()]
        } else {
            smallvec![self.src]
        }
    }

    // Builds and sends the next Database Description packet from the
    // summary list.
    pub(crate) fn send_dbdesc(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let now = instance.now();
        let per_packet = (output::max_packet_size(iface)
            - PacketHdr::LENGTH
            - DbDesc::BASE_LENGTH)
            / LsaHdr::LENGTH;

        let mut lsa_hdrs = vec![];
        while lsa_hdrs.len() < per_packet as usize {
            match self.lists.db_summary.pop_first() {
                Some((_, lsa)) => {
                    let mut lsa_hdr = lsa.hdr;
                    lsa_hdr.age = lsa.age(now);
                    lsa_hdrs.push(lsa_hdr);
                }
                None => break,
            }
        }

        // Once the summary list is empty there is no more to send.
        if !self.dd_flags.contains(DbDescFlags::I)
            && self.lists.db_summary.is_empty()
        {
            self.dd_flags.remove(DbDescFlags::M);
        }

        // Virtual links advertise no MTU.
        let mtu = match iface.config.if_type {
            InterfaceType::VirtualLink => 0,
            _ => iface.config.mtu,
        };
        let packet = Packet::DbDesc(DbDesc {
            hdr: PacketHdr::new(
                PacketType::DbDesc,
                instance.state.router_id,
                area.area_id,
            ),
            mtu,
            options: area_options(
                area,
                OptionsLocation::new_packet(PacketType::DbDesc),
            ),
            dd_flags: self.dd_flags,
            dd_seq_no: self.dd_seq_no,
            lsa_hdrs,
        });

        let msg =
            output::build_msg(iface, packet, self.unicast_destination(iface));
        self.last_sent_dbdesc = Some(msg.clone());
        instance.tx.net_send(msg);

        // The master retransmits on a timer; so does whoever sent the
        // initial packet.
        if self
            .dd_flags
            .intersects(DbDescFlags::MS | DbDescFlags::I)
        {
            let task = tasks::packet_rxmt_interval(
                self,
                iface,
                area,
                instance.tx,
                RxmtPacketType::DbDesc,
            );
            self.tasks.rxmt_dbdesc = Some(task);
        }
    }

    // Resends the last Database Description packet unchanged.
    pub(crate) fn rxmt_dbdesc(&self, instance: &InstanceUpView<'_>) {
        if let Some(msg) = &self.last_sent_dbdesc {
            instance.tx.net_send(msg.clone());
        }
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
    }

    // Moves the next batch of requests to the pending list and asks for
    // them.
    pub(crate) fn send_lsreq(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let per_packet = (output::max_packet_size(iface)
            - PacketHdr::LENGTH)
            / LsRequest::ENTRY_LENGTH;

        while self.lists.ls_request_pending.len() < per_packet as usize {
            match self.lists.ls_request.pop_first() {
                Some((lsa_key, lsa_hdr)) => {
                    self.lists.ls_request_pending.insert(lsa_key, lsa_hdr);
                }
                None => break,
            }
        }

        self.rxmt_lsreq(iface, area, instance);

        let task = tasks::packet_rxmt_interval(
            self,
            iface,
            area,
            instance.tx,
            RxmtPacketType::LsRequest,
        );
        self.tasks.rxmt_lsreq = Some(task);
    }

    // (Re)sends the Link State Request covering everything pending.
    pub(crate) fn rxmt_lsreq(
        &self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let packet = Packet::LsRequest(LsRequest {
            hdr: PacketHdr::new(
                PacketType::LsRequest,
                instance.state.router_id,
                area.area_id,
            ),
            entries: self.lists.ls_request_pending.keys().copied().collect(),
        });
        instance.tx.net_send(output::build_msg(
            iface,
            packet,
            self.unicast_destination(iface),
        ));
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
    }

    // Sends the LSAs queued for this neighbor (answers to its requests,
    // or database copies it must be brought up to date with).
    pub(crate) fn send_update_list(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let dst = self.unicast_destination(iface);
        let mut list = std::mem::take(&mut self.lists.ls_update);
        for packet in output::lsupd_packets(
            instance.state.router_id,
            area.area_id,
            &mut list,
            output::max_packet_size(iface),
            instance.now(),
            iface.config.transmit_delay,
        ) {
            instance
                .tx
                .net_send(output::build_msg(iface, packet, dst.clone()));
        }
    }

    // Retransmits the head of the retransmission list, one packet's worth
    // per tick. Entries stay listed until acknowledged.
    pub(crate) fn rxmt_update(
        &self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let now = instance.now();
        let budget = output::max_packet_size(iface)
            - PacketHdr::LENGTH
            - crate::packet::LsUpdate::BASE_LENGTH;

        let mut used = 0;
        let mut lsas = vec![];
        for lsa in self.lists.ls_rxmt.values() {
            if !lsas.is_empty() && used + lsa.hdr.length > budget {
                break;
            }
            used += lsa.hdr.length;

            let mut lsa = (**lsa).clone();
            let age = std::cmp::min(
                lsa.age(now) + iface.config.transmit_delay,
                lsdb::LSA_MAX_AGE,
            );
            lsa.set_age(age);
            lsas.push(lsa);
        }

        let packet = Packet::LsUpdate(crate::packet::LsUpdate {
            hdr: PacketHdr::new(
                PacketType::LsUpdate,
                instance.state.router_id,
                area.area_id,
            ),
            lsas,
        });
        instance.tx.net_send(output::build_msg(
            iface,
            packet,
            self.unicast_destination(iface),
        ));
    }

    // Acknowledges a single LSA directly to this neighbor.
    pub(crate) fn send_ack_direct(
        &self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        let packet = Packet::LsAck(LsAck {
            hdr: PacketHdr::new(
                PacketType::LsAck,
                instance.state.router_id,
                area.area_id,
            ),
            lsa_hdrs: vec![*lsa_hdr],
        });
        instance.tx.net_send(output::build_msg(
            iface,
            packet,
            self.unicast_destination(iface),
        ));
    }

    // ===== timer management =====

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = tasks::nsm_inactivity_timer(self, iface, area, instance.tx);
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_restart(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        match self.tasks.inactivity_timer.as_ref() {
            Some(timer) => {
                instance.tx.timers.borrow_mut().reset(
                    timer,
                    instance.tx.now.get(),
                    None,
                );
            }
            None => self.inactivity_timer_start(iface, area, instance),
        }
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_none() {
            let task = tasks::packet_rxmt_interval(
                self,
                iface,
                area,
                instance.tx,
                RxmtPacketType::LsUpdate,
            );
            self.tasks.rxmt_lsupd = Some(task);
        }
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        if self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some() {
            self.tasks.rxmt_lsupd = None;
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}

// ===== impl NeighborNetId =====

impl NeighborNetId {
    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

impl std::fmt::Display for NeighborNetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Ipv4Addr> for NeighborNetId {
    fn from(addr: Ipv4Addr) -> NeighborNetId {
        NeighborNetId(addr)
    }
}
