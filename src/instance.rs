//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// The OSPF instance.
//
// Everything the protocol owns hangs off the `Ospf` context struct: the
// arenas, the AS-scope LSDB, the routing table, the multipath intern
// table and the timer queue. The core never blocks; the host calls in
// with packets, clock ticks and configuration deltas, and collects the
// resulting packet transmissions and kernel route updates through the
// `SysCalls` trait when each call returns.
//

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;

use bytes::Bytes;
use ipnetwork::Ipv4Network;

use crate::area::AreaType;
use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, InterfaceId, InterfaceIndex, Lsdb,
    LsdbId, NeighborId,
};
use crate::config::{
    CfgTransaction, ConfigItem, HostCfg, InstanceCfg, RangeCfg, StaticNbr,
    VlinkCfg,
};
use crate::debug::{Debug, InterfaceInactiveReason, LsaFlushReason};
use crate::error::Error;
use crate::events;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{AgeBins, LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, nsm};
use crate::network::{self, IP_PROTO_OSPF, MulticastAddr};
use crate::output::NetTxPacketMsg;
use crate::packet::auth::AuthDecodeCtx;
use crate::packet::lsa::LsaBody;
use crate::packet::{Options, Packet};
use crate::route::{MpathDb, Nexthop, RouteNet, RouteNetFlags, route_avl_key};
use crate::spf;
use crate::sys::{HaltCode, SysCalls};
use crate::tasks::{
    Etime, IntervalTask, MSECS_PER_SEC, TimerAction, TimerQueue, TimeoutTask,
};
use crate::collections::avl::AvlTree;

// Instance state.
#[derive(Debug)]
pub struct InstanceState {
    // Router ID, immutable after start.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb,
    // Aging and refresh bins shared by all LSDBs.
    pub age_bins: AgeBins,
    // Routing table, ordered by (network, mask).
    pub rib: AvlTree<RouteNet>,
    // Multipath intern table.
    pub mpath_db: MpathDb,
    // Routing calculation scheduling flags.
    pub full_sched: bool,
    pub ase_sched: bool,
    // Number of neighbors being helped through a graceful restart.
    pub gr_helper_count: u32,
    // Number of neighbors undergoing database exchange.
    pub dd_active_count: Cell<u16>,
    // Database overflow state.
    pub overflow: bool,
    pub overflow_timer: Option<TimeoutTask>,
    // AS-external origination budget for the current second.
    pub ext_orig_count: u32,
    pub ext_pending: bool,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
}

// Deferred protocol events, processed in order after the current event
// finishes.
#[derive(Debug)]
pub(crate) enum ProtocolEvent {
    IsmEvent {
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    },
    NsmEvent {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    },
    LsaOrigEvent {
        event: LsaOriginateEvent,
    },
    LsaOrigCheck {
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    },
    LsaFlush {
        lsdb_id: LsdbId,
        lse_id: crate::collections::LsaEntryId,
        reason: LsaFlushReason,
    },
    SendLsUpdate {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    },
    DdSlotCheck,
}

// Messages to the host's forwarding and interface management services.
#[derive(Debug)]
pub(crate) enum SouthboundMsg {
    RouteAdd {
        prefix: Ipv4Network,
        nexthops: Vec<Nexthop>,
        reject: bool,
    },
    RouteDelete {
        prefix: Ipv4Network,
    },
    Join {
        ifindex: u32,
        group: MulticastAddr,
    },
    Leave {
        ifindex: u32,
        group: MulticastAddr,
    },
    PhyOpen {
        ifindex: u32,
    },
    PhyClose {
        ifindex: u32,
    },
    Halt {
        code: HaltCode,
        reason: String,
    },
}

// Queue of deferred protocol events.
#[derive(Debug, Default)]
pub(crate) struct ProtocolInputQueue(RefCell<VecDeque<ProtocolEvent>>);

// Output channels and shared services reachable from everywhere in the
// protocol core.
#[derive(Debug)]
pub(crate) struct InstanceTx {
    pub protocol_input: ProtocolInputQueue,
    pub net: RefCell<VecDeque<NetTxPacketMsg>>,
    pub sb: RefCell<VecDeque<SouthboundMsg>>,
    pub timers: RefCell<TimerQueue>,
    pub now: Cell<Etime>,
}

// Borrowed view of the instance used by the protocol code.
pub(crate) struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceTx,
}

// Arenas holding all protocol objects.
#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

// An OSPF instance.
pub struct Ospf {
    sys: Box<dyn SysCalls>,
    config: InstanceCfg,
    state: InstanceState,
    arenas: InstanceArenas,
    tx: InstanceTx,
    // Operational physical interfaces.
    phys_up: HashSet<u32>,
    // In-progress configuration transaction.
    cfg_transaction: Option<CfgTransaction>,
    // Database aging tick, firing once per second.
    _age_tick: IntervalTask,
    // In-progress shutdown.
    shutdown_timer: Option<TimeoutTask>,
}

// ===== impl ProtocolInputQueue =====

impl ProtocolInputQueue {
    fn push(&self, event: ProtocolEvent) {
        self.0.borrow_mut().push_back(event);
    }

    fn pop(&self) -> Option<ProtocolEvent> {
        self.0.borrow_mut().pop_front()
    }

    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        self.push(ProtocolEvent::IsmEvent {
            area_id,
            iface_id,
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        self.push(ProtocolEvent::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        self.push(ProtocolEvent::LsaOrigEvent { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        self.push(ProtocolEvent::LsaOrigCheck {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: crate::collections::LsaEntryId,
        reason: LsaFlushReason,
    ) {
        self.push(ProtocolEvent::LsaFlush {
            lsdb_id,
            lse_id,
            reason,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        self.push(ProtocolEvent::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        });
    }

    pub(crate) fn dd_slot_check(&self) {
        self.push(ProtocolEvent::DdSlotCheck);
    }
}

// ===== impl InstanceTx =====

impl InstanceTx {
    pub(crate) fn net_send(&self, msg: NetTxPacketMsg) {
        self.net.borrow_mut().push_back(msg);
    }

    pub(crate) fn sb_send(&self, msg: SouthboundMsg) {
        self.sb.borrow_mut().push_back(msg);
    }

    pub(crate) fn halt(&self, code: HaltCode, reason: &str) {
        self.sb_send(SouthboundMsg::Halt {
            code,
            reason: reason.to_owned(),
        });
    }
}

// ===== impl InstanceUpView =====

impl InstanceUpView<'_> {
    pub(crate) fn now(&self) -> Etime {
        self.tx.now.get()
    }
}

// ===== impl Ospf =====

impl Ospf {
    // Creates a new OSPF instance. The Router ID is immutable for the
    // instance's lifetime.
    pub fn new(router_id: Ipv4Addr, sys: Box<dyn SysCalls>) -> Ospf {
        Debug::InstanceCreate.log();

        let now = sys.elapsed_since_start();
        let tx = InstanceTx {
            protocol_input: Default::default(),
            net: Default::default(),
            sb: Default::default(),
            timers: RefCell::new(TimerQueue::new()),
            now: Cell::new(now),
        };

        // Start the database aging tick.
        let age_tick = tx.timers.borrow_mut().interval_task(
            now,
            MSECS_PER_SEC,
            TimerAction::DbAgeTick,
        );

        Ospf {
            sys,
            config: InstanceCfg::default(),
            state: InstanceState {
                router_id,
                lsdb: Default::default(),
                age_bins: Default::default(),
                rib: Default::default(),
                mpath_db: Default::default(),
                full_sched: false,
                ase_sched: false,
                gr_helper_count: 0,
                dd_active_count: Cell::new(0),
                overflow: false,
                overflow_timer: None,
                ext_orig_count: 0,
                ext_pending: false,
                orig_lsa_count: 0,
                rx_lsa_count: 0,
            },
            arenas: Default::default(),
            tx,
            phys_up: Default::default(),
            cfg_transaction: None,
            _age_tick: age_tick,
            shutdown_timer: None,
        }
    }

    pub fn router_id(&self) -> Ipv4Addr {
        self.state.router_id
    }

    // ===== operational state queries =====

    // Returns the ISM state of the interface with the given address.
    pub fn interface_state(&self, addr: Ipv4Addr) -> Option<ism::State> {
        for area_idx in self.arenas.areas.indexes() {
            let area = &self.arenas.areas[area_idx];
            if let Some((_, iface)) =
                area.interfaces.get_by_addr(&self.arenas.interfaces, addr)
            {
                return Some(iface.state.ism_state);
            }
        }
        None
    }

    // Returns all neighbors and their states.
    pub fn neighbors(&self) -> Vec<(Ipv4Addr, nsm::State)> {
        self.arenas
            .neighbors
            .iter()
            .map(|(_, nbr)| (nbr.router_id, nbr.state))
            .collect()
    }

    // Returns the contents of the given area's LSDB.
    pub fn area_lsas(&self, area_id: Ipv4Addr) -> Vec<crate::packet::lsa::Lsa> {
        let Some((_, area)) = self.arenas.areas.get_by_area_id(area_id)
        else {
            return vec![];
        };
        area.state
            .lsdb
            .iter(&self.arenas.lsa_entries)
            .map(|(_, lse)| (*lse.data).clone())
            .collect()
    }

    // Returns the contents of the AS-scope LSDB.
    pub fn as_lsas(&self) -> Vec<crate::packet::lsa::Lsa> {
        self.state
            .lsdb
            .iter(&self.arenas.lsa_entries)
            .map(|(_, lse)| (*lse.data).clone())
            .collect()
    }

    // Returns the routing table contents.
    pub fn routes(&self) -> Vec<RouteNet> {
        self.state
            .rib
            .iter()
            .map(|(_, route)| route.clone())
            .collect()
    }

    // Returns the number of neighbors currently being helped through a
    // graceful restart.
    pub fn gr_helper_count(&self) -> u32 {
        self.state.gr_helper_count
    }

    fn refresh_clock(&self) {
        self.tx.now.set(self.sys.elapsed_since_start());
    }

    fn as_up(&mut self) -> (InstanceUpView<'_>, &mut InstanceArenas) {
        (
            InstanceUpView {
                config: &self.config,
                state: &mut self.state,
                tx: &self.tx,
            },
            &mut self.arenas,
        )
    }

    // ===== inbound operations =====

    // Dispatches a received IP packet.
    pub fn receive_ip_packet(&mut self, ifindex: u32, data: Bytes) {
        self.refresh_clock();

        let info = match network::ip_decode(data) {
            Ok(info) => info,
            Err(error) => {
                Error::PacketDecodeError(error).log();
                return;
            }
        };
        if info.proto != IP_PROTO_OSPF {
            // IGMP and anything else is the host's business.
            return;
        }

        // Find the receiving interface.
        let Some((area_idx, iface_idx)) = self.find_iface(ifindex, info.src)
        else {
            Error::UnknownInterface(ifindex).log();
            return;
        };

        // Decode the OSPF packet using the interface's authentication
        // context.
        let iface = &self.arenas.interfaces[iface_idx];
        let auth = iface.state.auth.clone();
        let auth_ctx = auth.as_ref().map(AuthDecodeCtx::new);
        let mut buf = info.payload;
        let packet = match Packet::decode(&mut buf, auth_ctx) {
            Ok(packet) => packet,
            Err(error) => {
                Error::PacketDecodeError(error).log();
                return;
            }
        };

        let (mut instance, arenas) = self.as_up();
        if let Err(error) = events::process_packet(
            &mut instance,
            arenas,
            area_idx,
            iface_idx,
            info.src,
            info.dst,
            packet,
        ) {
            error.log();
        }

        self.run_pending();
    }

    // Fires all timers whose deadline has passed.
    pub fn tick(&mut self) {
        self.refresh_clock();

        loop {
            let now = self.tx.now.get();
            let action = self.tx.timers.borrow_mut().next_due(now);
            let Some(action) = action else {
                break;
            };

            if matches!(action, TimerAction::ShutdownTimer) {
                self.finish_shutdown();
                return;
            }

            let (mut instance, arenas) = self.as_up();
            if let Err(error) =
                events::process_timer_action(&mut instance, arenas, action)
            {
                error.log();
            }
        }

        // Drain events deferred by earlier calls even when no timer fired.
        self.run_pending();
    }

    // Milliseconds until the next timer fires, or -1 when idle.
    pub fn timeout(&mut self) -> i32 {
        self.refresh_clock();
        let now = self.tx.now.get();
        match self.tx.timers.borrow_mut().timeout(now) {
            Some(ms) => ms.min(i32::MAX as i64) as i32,
            None => -1,
        }
    }

    // Raises all OSPF interfaces attached to the given physical interface.
    pub fn phy_up(&mut self, ifindex: u32) {
        self.refresh_clock();
        self.phys_up.insert(ifindex);
        self.update_interfaces();
        self.run_pending();
    }

    // Drops all OSPF interfaces attached to the given physical interface.
    pub fn phy_down(&mut self, ifindex: u32) {
        self.refresh_clock();
        self.phys_up.remove(&ifindex);
        self.update_interfaces();
        self.run_pending();
    }

    // The kernel deleted one of our routes behind our back; reinstall it.
    pub fn krt_delete_notification(&mut self, prefix: Ipv4Network) {
        self.refresh_clock();
        if let Some(route) = self.state.rib.get_mut(route_avl_key(prefix)) {
            if route.flags.contains(RouteNetFlags::INSTALLED) {
                if let Some(mpath) = &route.last_mpath {
                    self.tx.sb_send(SouthboundMsg::RouteAdd {
                        prefix,
                        nexthops: mpath.nexthops.clone(),
                        reject: false,
                    });
                }
            }
        }
        self.flush_output();
    }

    // The kernel has a route we don't know about; delete it.
    pub fn remnant_notification(&mut self, prefix: Ipv4Network) {
        self.refresh_clock();
        if self.state.rib.get(route_avl_key(prefix)).is_none() {
            self.tx.sb_send(SouthboundMsg::RouteDelete { prefix });
        }
        self.flush_output();
    }

    // Withdraws from the routing domain over the given time budget, then
    // halts.
    pub fn shutdown(&mut self, seconds: u16) {
        self.refresh_clock();
        Debug::InstanceShutdown(seconds).log();

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up();
        crate::lsdb::flush_all_self_originated(&mut instance, arenas);

        // Send empty hellos so neighbors drop us quickly.
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &self.arenas.areas[area_idx];
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let iface = &mut self.arenas.interfaces[iface_idx];
                if iface.is_down() || iface.is_passive() {
                    continue;
                }
                for nbr_idx in
                    iface.state.neighbors.indexes().collect::<Vec<_>>()
                {
                    iface
                        .state
                        .neighbors
                        .delete(&mut self.arenas.neighbors, nbr_idx);
                }
                let dst = iface.hello_destinations();
                if !dst.is_empty() {
                    let instance = InstanceUpView {
                        config: &self.config,
                        state: &mut self.state,
                        tx: &self.tx,
                    };
                    let iface = &self.arenas.interfaces[iface_idx];
                    iface.send_hello(
                        area,
                        &instance,
                        &self.arenas.neighbors,
                        dst,
                    );
                }
            }
        }

        // Delete all installed kernel routes.
        let keys = self
            .state
            .rib
            .iter()
            .filter(|(_, route)| {
                route.flags.contains(RouteNetFlags::INSTALLED)
            })
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        for key in keys {
            let route = self.state.rib.get_mut(key).unwrap();
            route.flags.remove(RouteNetFlags::INSTALLED);
            let prefix = route.prefix;
            self.tx.sb_send(SouthboundMsg::RouteDelete { prefix });
        }

        // Leave the protocol running for the given budget so the flushes
        // propagate, then halt.
        let now = self.tx.now.get();
        let task = self.tx.timers.borrow_mut().timeout_task(
            now,
            seconds as u32 * MSECS_PER_SEC,
            TimerAction::ShutdownTimer,
        );
        self.shutdown_timer = Some(task);

        self.run_pending();
    }

    fn finish_shutdown(&mut self) {
        self.shutdown_timer = None;

        // Stop all interfaces.
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &self.arenas.areas[area_idx];
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let area = &self.arenas.areas[area_idx];
                let iface = &mut self.arenas.interfaces[iface_idx];
                if !iface.is_down() {
                    let instance = InstanceUpView {
                        config: &self.config,
                        state: &mut self.state,
                        tx: &self.tx,
                    };
                    iface.run_fsm(
                        area,
                        &instance,
                        &mut self.arenas.neighbors,
                        &self.arenas.lsa_entries,
                        ism::Event::InterfaceDown(
                            InterfaceInactiveReason::Shutdown,
                        ),
                    );
                }
            }
        }

        self.flush_output();
        self.sys.halt(HaltCode::Shutdown, "shutdown complete");
    }

    // ===== configuration =====

    // Opens a configuration transaction.
    pub fn cfg_start(&mut self) {
        self.cfg_transaction = Some(CfgTransaction::default());
    }

    // Applies one configuration item.
    pub fn cfg_update(&mut self, item: ConfigItem) {
        self.refresh_clock();
        match item {
            ConfigItem::Global {
                max_dds,
                new_flood_rate,
                lsdb_limit,
                ovfl_int,
                random_refresh,
                gr_helper_enabled,
            } => {
                self.config.max_dds = max_dds;
                self.config.new_flood_rate = new_flood_rate;
                self.config.lsdb_limit = lsdb_limit;
                self.config.ovfl_int = ovfl_int;
                self.config.random_refresh = random_refresh;
                self.config.gr_helper_enabled = gr_helper_enabled;
            }
            ConfigItem::Area {
                area_id,
                stub,
                default_cost,
                import_summaries,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.areas.insert(area_id);
                }
                let (_, area) = self.get_or_create_area(area_id);
                area.config.area_type = if stub {
                    AreaType::Stub
                } else {
                    AreaType::Normal
                };
                area.config.default_cost = default_cost;
                area.config.summary = import_summaries;
            }
            ConfigItem::Range {
                area_id,
                prefix,
                advertise,
                cost,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.areas.insert(area_id);
                    txn.ranges.insert((area_id, prefix));
                }
                let (_, area) = self.get_or_create_area(area_id);
                let range = area.ranges.entry(prefix).or_default();
                range.config = RangeCfg { advertise, cost };
            }
            ConfigItem::Host {
                area_id,
                addr,
                cost,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.areas.insert(area_id);
                    txn.hosts.insert((area_id, addr));
                }
                let (area_idx, area) = self.get_or_create_area(area_id);
                area.hosts.retain(|host| host.addr != addr);
                area.hosts.push(HostCfg { addr, cost });
                let area = &self.arenas.areas[area_idx];
                self.tx.protocol_input.lsa_orig_event(
                    LsaOriginateEvent::AreaStart { area_id: area.id },
                );
            }
            ConfigItem::Interface {
                addr,
                area_id,
                ifindex,
                if_type,
                prefixlen,
                mtu,
                cost,
                priority,
                hello_interval,
                dead_interval,
                rxmt_interval,
                transmit_delay,
                enabled,
                passive,
                auth,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.areas.insert(area_id);
                    txn.interfaces.insert(addr);
                }
                let (area_idx, _) = self.get_or_create_area(area_id);
                let area = &mut self.arenas.areas[area_idx];
                let (_, iface) = match area
                    .interfaces
                    .get_by_addr(&self.arenas.interfaces, addr)
                {
                    Some((iface_idx, _)) => {
                        (iface_idx, &mut self.arenas.interfaces[iface_idx])
                    }
                    None => area
                        .interfaces
                        .insert(&mut self.arenas.interfaces, addr),
                };
                let old_cost = iface.config.cost;
                iface.config.ifindex = ifindex;
                iface.config.if_type = if_type;
                iface.config.prefixlen = prefixlen;
                iface.config.mtu = mtu;
                iface.config.cost = cost;
                iface.config.priority = priority;
                iface.config.hello_interval = hello_interval;
                iface.config.dead_interval = dead_interval;
                iface.config.rxmt_interval = rxmt_interval;
                iface.config.transmit_delay = transmit_delay;
                iface.config.enabled = enabled;
                iface.config.passive = passive;
                iface.config.auth = auth;
                if old_cost != cost {
                    let area = &self.arenas.areas[area_idx];
                    self.tx.protocol_input.lsa_orig_event(
                        LsaOriginateEvent::InterfaceCostChange {
                            area_id: area.id,
                        },
                    );
                }
            }
            ConfigItem::VirtualLink {
                transit_area,
                nbr_router_id,
                hello_interval,
                dead_interval,
                rxmt_interval,
                auth,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.vlinks.insert((transit_area, nbr_router_id));
                }
                // Virtual links always attach to the backbone.
                let backbone = Ipv4Addr::UNSPECIFIED;
                let (area_idx, _) = self.get_or_create_area(backbone);
                let area = &mut self.arenas.areas[area_idx];
                let vlink = VlinkCfg {
                    transit_area,
                    nbr_router_id,
                };
                let iface_idx = area
                    .interfaces
                    .iter(&self.arenas.interfaces)
                    .find(|iface| iface.config.vlink == Some(vlink))
                    .map(|iface| iface.id);
                let (_, iface) = match iface_idx {
                    Some(iface_id) => area
                        .interfaces
                        .get_mut_by_id(&mut self.arenas.interfaces, iface_id)
                        .unwrap(),
                    None => area.interfaces.insert(
                        &mut self.arenas.interfaces,
                        // The source address is resolved through the
                        // transit area later.
                        Ipv4Addr::UNSPECIFIED,
                    ),
                };
                iface.config.if_type = InterfaceType::VirtualLink;
                iface.config.vlink = Some(vlink);
                iface.config.hello_interval = hello_interval;
                iface.config.dead_interval = dead_interval;
                iface.config.rxmt_interval = rxmt_interval;
                iface.config.auth = auth;
                iface.config.prefixlen = 32;
            }
            ConfigItem::Neighbor {
                iface_addr,
                addr,
                priority,
                poll_interval,
            } => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.static_nbrs.insert((iface_addr, addr));
                }
                for area_idx in
                    self.arenas.areas.indexes().collect::<Vec<_>>()
                {
                    let area = &self.arenas.areas[area_idx];
                    if let Some((iface_idx, _)) = area
                        .interfaces
                        .get_by_addr(&self.arenas.interfaces, iface_addr)
                    {
                        let iface = &mut self.arenas.interfaces[iface_idx];
                        iface.config.static_nbrs.insert(
                            addr,
                            StaticNbr {
                                priority,
                                poll_interval,
                            },
                        );
                    }
                }
            }
            ConfigItem::ExternalRoute(route) => {
                if let Some(txn) = &mut self.cfg_transaction {
                    txn.external_routes.insert(route.prefix);
                }
                self.config.external_routes.insert(route.prefix, route);
                self.tx.protocol_input.lsa_orig_event(
                    LsaOriginateEvent::ExternalRoutesChange,
                );
            }
        }

        self.update_interfaces();
        self.run_pending();
    }

    // Commits the configuration transaction: whatever wasn't refreshed is
    // deleted.
    pub fn cfg_done(&mut self) {
        self.refresh_clock();
        let Some(txn) = self.cfg_transaction.take() else {
            return;
        };

        // Delete stale external routes.
        let stale = self
            .config
            .external_routes
            .keys()
            .filter(|prefix| !txn.external_routes.contains(*prefix))
            .copied()
            .collect::<Vec<_>>();
        if !stale.is_empty() {
            for prefix in stale {
                self.config.external_routes.remove(&prefix);
            }
            self.tx
                .protocol_input
                .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        }

        // Delete stale ranges, hosts and interfaces, and finally stale
        // areas.
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &mut self.arenas.areas[area_idx];
            let area_id = area.area_id;
            area.ranges
                .retain(|prefix, _| txn.ranges.contains(&(area_id, *prefix)));
            area.hosts
                .retain(|host| txn.hosts.contains(&(area_id, host.addr)));

            let stale_ifaces = area
                .interfaces
                .iter(&self.arenas.interfaces)
                .filter(|iface| match iface.config.vlink {
                    Some(vlink) => !txn
                        .vlinks
                        .contains(&(vlink.transit_area, vlink.nbr_router_id)),
                    None => !txn.interfaces.contains(&iface.addr),
                })
                .map(|iface| iface.id)
                .collect::<Vec<_>>();
            for iface_id in stale_ifaces {
                let area = &self.arenas.areas[area_idx];
                let Ok((iface_idx, _)) = area
                    .interfaces
                    .get_by_id(&self.arenas.interfaces, iface_id)
                else {
                    continue;
                };
                let instance = InstanceUpView {
                    config: &self.config,
                    state: &mut self.state,
                    tx: &self.tx,
                };
                let iface = &mut self.arenas.interfaces[iface_idx];
                if !iface.is_down() {
                    iface.run_fsm(
                        area,
                        &instance,
                        &mut self.arenas.neighbors,
                        &self.arenas.lsa_entries,
                        ism::Event::InterfaceDown(
                            InterfaceInactiveReason::AdminDown,
                        ),
                    );
                }
                // Drop the interface's link-scope LSAs before the
                // interface itself.
                let iface = &self.arenas.interfaces[iface_idx];
                let lse_idxs = iface
                    .state
                    .lsdb
                    .iter(&self.arenas.lsa_entries)
                    .map(|(lse_idx, _)| lse_idx)
                    .collect::<Vec<_>>();
                let iface = &mut self.arenas.interfaces[iface_idx];
                for lse_idx in lse_idxs {
                    crate::lsdb::delete_entry(
                        &mut iface.state.lsdb,
                        &mut self.state.age_bins,
                        &mut self.arenas.lsa_entries,
                        lse_idx,
                    );
                }

                let area = &mut self.arenas.areas[area_idx];
                area.interfaces
                    .delete(&mut self.arenas.interfaces, iface_idx);
            }

            // Remove stale neighbor configuration.
            let area = &self.arenas.areas[area_idx];
            for iface_idx in
                area.interfaces.indexes().collect::<Vec<_>>()
            {
                let iface = &mut self.arenas.interfaces[iface_idx];
                let iface_addr = iface.addr;
                iface.config.static_nbrs.retain(|addr, _| {
                    txn.static_nbrs.contains(&(iface_addr, *addr))
                });
            }
        }

        self.update_interfaces();
        self.run_pending();
    }

    // ===== helper functions =====

    fn get_or_create_area(
        &mut self,
        area_id: Ipv4Addr,
    ) -> (AreaIndex, &mut crate::area::Area) {
        match self.arenas.areas.get_by_area_id(area_id) {
            Some((area_idx, _)) => {
                (area_idx, &mut self.arenas.areas[area_idx])
            }
            None => {
                let (area_idx, _) = self.arenas.areas.insert(area_id);
                let area = &self.arenas.areas[area_idx];
                self.tx.protocol_input.lsa_orig_event(
                    LsaOriginateEvent::AreaStart { area_id: area.id },
                );
                (area_idx, &mut self.arenas.areas[area_idx])
            }
        }
    }

    // Starts or stops interfaces to match the configuration and physical
    // interface state.
    fn update_interfaces(&mut self) {
        for area_idx in self.arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &self.arenas.areas[area_idx];
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let iface = &self.arenas.interfaces[iface_idx];

                // Virtual links come and go with the routing calculation.
                if iface.config.if_type == InterfaceType::VirtualLink {
                    continue;
                }

                let operative = iface.config.enabled
                    && (iface.config.if_type == InterfaceType::Loopback
                        || self.phys_up.contains(&iface.config.ifindex));
                let area = &self.arenas.areas[area_idx];
                if operative && iface.is_down() {
                    self.tx.protocol_input.ism_event(
                        area.id,
                        iface.id,
                        ism::Event::InterfaceUp,
                    );
                } else if !operative && !iface.is_down() {
                    let reason = if iface.config.enabled {
                        InterfaceInactiveReason::OperationalDown
                    } else {
                        InterfaceInactiveReason::AdminDown
                    };
                    self.tx.protocol_input.ism_event(
                        area.id,
                        iface.id,
                        ism::Event::InterfaceDown(reason),
                    );
                }
            }
        }
    }

    // Finds the interface a packet was received on.
    fn find_iface(
        &self,
        ifindex: u32,
        src: Ipv4Addr,
    ) -> Option<(AreaIndex, InterfaceIndex)> {
        let mut vlink = None;
        for area_idx in self.arenas.areas.indexes() {
            let area = &self.arenas.areas[area_idx];
            for iface_idx in area.interfaces.indexes() {
                let iface = &self.arenas.interfaces[iface_idx];
                if iface.is_down() {
                    continue;
                }
                match iface.config.if_type {
                    InterfaceType::VirtualLink => {
                        if iface.state.vlink_nbr_addr == Some(src) {
                            vlink = Some((area_idx, iface_idx));
                        }
                    }
                    InterfaceType::PointToPoint => {
                        if iface.config.ifindex == ifindex {
                            return Some((area_idx, iface_idx));
                        }
                    }
                    _ => {
                        if iface.config.ifindex == ifindex
                            && iface.network().contains(src)
                        {
                            return Some((area_idx, iface_idx));
                        }
                    }
                }
            }
        }

        vlink
    }

    // Processes deferred events, runs the routing calculation when
    // scheduled and hands the queued output to the host.
    fn run_pending(&mut self) {
        // Event processing may schedule more events; bound the draining to
        // guard against ping-pong loops.
        for _ in 0..64 {
            let mut idle = true;

            while let Some(event) = self.tx.protocol_input.pop() {
                idle = false;
                let (mut instance, arenas) = self.as_up();
                if let Err(error) =
                    events::process_protocol_event(&mut instance, arenas, event)
                {
                    error.log();
                }
            }

            if self.state.full_sched || self.state.ase_sched {
                idle = false;
                let (mut instance, arenas) = self.as_up();
                spf::run_calculation(&mut instance, arenas);
            }

            if idle {
                break;
            }
        }

        self.flush_output();
    }

    // Hands the queued packet transmissions and kernel updates to the
    // host.
    fn flush_output(&mut self) {
        // Transmit packets. Each message is encoded once, no matter how
        // many destinations it has.
        loop {
            let msg = self.tx.net.borrow_mut().pop_front();
            let Some(msg) = msg else {
                break;
            };

            let auth_ctx = msg.auth.as_ref().map(|auth| {
                crate::packet::auth::AuthEncodeCtx::new(
                    &auth.method,
                    &auth.seqno,
                )
            });
            let data = msg.packet.encode(auth_ctx);
            for dst in &msg.dst.addrs {
                Debug::PacketTx(msg.dst.ifindex, dst, &msg.packet).log();
                self.sys.send_packet(msg.dst.ifindex, msg.src, *dst, &data);
            }
        }

        // Kernel and interface management updates.
        loop {
            let msg = self.tx.sb.borrow_mut().pop_front();
            let Some(msg) = msg else {
                break;
            };

            match msg {
                SouthboundMsg::RouteAdd {
                    prefix,
                    nexthops,
                    reject,
                } => self.sys.route_add(prefix, &nexthops, reject),
                SouthboundMsg::RouteDelete { prefix } => {
                    self.sys.route_delete(prefix)
                }
                SouthboundMsg::Join { ifindex, group } => {
                    self.sys.join_multicast(ifindex, group.addr())
                }
                SouthboundMsg::Leave { ifindex, group } => {
                    self.sys.leave_multicast(ifindex, group.addr())
                }
                SouthboundMsg::PhyOpen { ifindex } => {
                    self.sys.phy_open(ifindex)
                }
                SouthboundMsg::PhyClose { ifindex } => {
                    self.sys.phy_close(ifindex)
                }
                SouthboundMsg::Halt { code, reason } => {
                    self.sys.halt(code, &reason)
                }
            }
        }
    }
}
