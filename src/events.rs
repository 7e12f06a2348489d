//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Event dispatch.
//
// Everything that happens to the instance arrives here: received packets,
// timer firings and the protocol events deferred by earlier processing.
// The handlers resolve object IDs into arena references and hand off to
// the interface, neighbor, flooding and database code.
//

use std::net::Ipv4Addr;

use crate::collections::{
    AreaId, AreaIndex, InterfaceId, InterfaceIndex, LsdbId, NeighborId,
    lsdb_get, lsdb_index_mut,
};
use crate::debug::Debug;
use crate::error::{Error, InterfaceCfgError};
use crate::flood;
use crate::gr::{self, GrExitReason};
use crate::instance::{InstanceArenas, InstanceUpView, ProtocolEvent};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{self, LsaOriginateEvent};
use crate::neighbor::{RxmtPacketType, nsm};
use crate::network::MulticastAddr;
use crate::packet::Packet;
use crate::packet::lsa::LsaKey;
use crate::tasks::TimerAction;

// ===== deferred protocol events =====

pub(crate) fn process_protocol_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    event: ProtocolEvent,
) -> Result<(), Error> {
    match event {
        ProtocolEvent::IsmEvent {
            area_id,
            iface_id,
            event,
        } => process_ism_event(instance, arenas, area_id, iface_id, event),
        ProtocolEvent::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        } => {
            process_nsm_event(instance, arenas, area_id, iface_id, nbr_id, event)
        }
        ProtocolEvent::LsaOrigEvent { event } => {
            lsdb::lsa_orig_event(instance, arenas, event)
        }
        ProtocolEvent::LsaOrigCheck {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        } => {
            let (lsdb_idx, _) = lsdb_get(
                &instance.state.lsdb,
                &arenas.areas,
                &arenas.interfaces,
                lsdb_id,
            )?;
            lsdb::originate_check(
                instance, arenas, lsdb_idx, options, lsa_id, lsa_body,
            );
            Ok(())
        }
        ProtocolEvent::LsaFlush {
            lsdb_id,
            lse_id,
            reason,
        } => {
            let (lsdb_idx, lsdb) = lsdb_get(
                &instance.state.lsdb,
                &arenas.areas,
                &arenas.interfaces,
                lsdb_id,
            )?;
            if let Some((lse_idx, _)) =
                lsdb.get_by_id(&arenas.lsa_entries, lse_id)
            {
                lsdb::flush(instance, arenas, lsdb_idx, lse_idx, reason);
            }
            Ok(())
        }
        ProtocolEvent::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        } => process_send_lsupd(instance, arenas, area_id, iface_id, nbr_id),
        ProtocolEvent::DdSlotCheck => {
            process_dd_slot_check(instance, arenas);
            Ok(())
        }
    }
}

// ===== timer firings =====

pub(crate) fn process_timer_action(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    action: TimerAction,
) -> Result<(), Error> {
    match action {
        TimerAction::IsmWaitTimer { area_id, iface_id } => process_ism_event(
            instance,
            arenas,
            area_id,
            iface_id,
            ism::Event::WaitTimer,
        ),
        TimerAction::HelloInterval { area_id, iface_id } => {
            process_hello_interval(instance, arenas, area_id, iface_id, None)
        }
        TimerAction::NbmaPollInterval {
            area_id,
            iface_id,
            addr,
        } => process_hello_interval(
            instance,
            arenas,
            area_id,
            iface_id,
            Some(addr),
        ),
        TimerAction::NsmInactivityTimer {
            area_id,
            iface_id,
            nbr_id,
        } => process_nsm_event(
            instance,
            arenas,
            area_id,
            iface_id,
            nbr_id,
            nsm::Event::InactivityTimer,
        ),
        TimerAction::PacketRxmtInterval {
            area_id,
            iface_id,
            nbr_id,
            packet_type,
        } => process_packet_rxmt(
            instance,
            arenas,
            area_id,
            iface_id,
            nbr_id,
            packet_type,
        ),
        TimerAction::DbDescFreeTimer {
            area_id,
            iface_id,
            nbr_id,
        } => process_dbdesc_free(arenas, area_id, iface_id, nbr_id),
        TimerAction::LsUpdateTimer { area_id, iface_id } => {
            process_send_lsupd(instance, arenas, area_id, iface_id, None)
        }
        TimerAction::DelayedAckTimer { area_id, iface_id } => {
            process_delayed_ack_timeout(instance, arenas, area_id, iface_id)
        }
        TimerAction::LsaOrigDelayedTimer { lsdb_id, lsa_key } => {
            process_lsa_orig_delayed_timer(instance, arenas, lsdb_id, lsa_key)
        }
        TimerAction::GracePeriodTimer {
            area_id,
            iface_id,
            nbr_id,
        } => process_grace_period_timeout(
            instance, arenas, area_id, iface_id, nbr_id,
        ),
        TimerAction::DbAgeTick => {
            lsdb::age_tick(instance, arenas);
            Ok(())
        }
        TimerAction::OverflowExitTimer => {
            process_overflow_exit(instance);
            Ok(())
        }
        TimerAction::ShutdownTimer => {
            // Handled by the instance driver.
            Ok(())
        }
    }
}

// ===== FSM events =====

pub(crate) fn process_ism_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    event: ism::Event,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    iface.run_fsm(
        area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

pub(crate) fn process_nsm_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    event: nsm::Event,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    nbr.run_fsm(iface, area, instance, &arenas.lsa_entries, event);

    // A neighbor reaching Down ceases to exist.
    if nbr.state == nsm::State::Down {
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);
    }

    Ok(())
}

// ===== hello transmission =====

fn process_hello_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    poll_addr: Option<Ipv4Addr>,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_by_id(area_id)?;
    let (_, iface) = area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;

    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    let dst = match poll_addr {
        Some(addr) => smallvec::smallvec![addr],
        None => iface.hello_destinations(),
    };
    if !dst.is_empty() {
        iface.send_hello(area, instance, &arenas.neighbors, dst);
    }

    Ok(())
}

// ===== packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    iface_idx: InterfaceIndex,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    packet: Packet,
) -> Result<(), Error> {
    let area = &arenas.areas[area_idx];
    let iface = &mut arenas.interfaces[iface_idx];

    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    validate_packet_dst(iface, dst)?;

    // The area in the header must be the one the interface is configured
    // into; virtual links always carry the backbone area.
    let pkt_type = packet.hdr().pkt_type;
    let expected_area_id = match iface.config.if_type {
        InterfaceType::VirtualLink => Ipv4Addr::UNSPECIFIED,
        _ => area.area_id,
    };
    if packet.hdr().area_id != expected_area_id {
        return Err(Error::InterfaceCfgError(
            iface.addr.to_string(),
            src,
            pkt_type,
            InterfaceCfgError::AreaIdMismatch(
                packet.hdr().area_id,
                expected_area_id,
            ),
        ));
    }

    // Cryptographic sequence numbers must not move backwards, tracked per
    // packet type to allow for prioritized queueing at the sender.
    let router_id = packet.hdr().router_id;
    if let Some(auth_seqno) = packet.hdr().auth_seqno {
        if let Some((_, nbr)) =
            iface.find_nbr(&mut arenas.neighbors, src, router_id)
        {
            let recorded = nbr.auth_seqno.entry(pkt_type).or_default();
            if auth_seqno < *recorded {
                return Err(Error::PacketAuthInvalidSeqno(src, auth_seqno));
            }
            *recorded = auth_seqno;
        }
    }

    Debug::PacketRx(&iface.addr.to_string(), &src, &dst, &packet).log();

    // Hellos discover neighbors; everything else requires one.
    if let Packet::Hello(hello) = packet {
        return iface.recv_hello(
            area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
            src,
            hello,
        );
    }

    let (nbr_idx, nbr) = iface
        .find_nbr(&mut arenas.neighbors, src, router_id)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;

    match packet {
        Packet::Hello(_) => unreachable!(),
        Packet::DbDesc(dd) => nbr.recv_dbdesc(
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            src,
            dd,
        )?,
        Packet::LsRequest(ls_req) => {
            nbr.recv_lsreq(iface, area, instance, &arenas.lsa_entries, ls_req)
        }
        Packet::LsUpdate(ls_upd) => flood::receive_lsupd(
            instance, arenas, area_idx, iface_idx, nbr_idx, ls_upd,
        ),
        Packet::LsAck(ls_ack) => nbr.recv_lsack(ls_ack),
    }

    Ok(())
}

// Accepts AllSPFRouters always, AllDRouters only in the DR or Backup
// role, and unicasts addressed to the interface.
fn validate_packet_dst(iface: &Interface, dst: Ipv4Addr) -> Result<(), Error> {
    if dst == MulticastAddr::AllSpfRtrs.addr() || dst == iface.addr {
        return Ok(());
    }
    if dst == MulticastAddr::AllDrRtrs.addr() && iface.is_dr_or_backup() {
        return Ok(());
    }

    Err(Error::InvalidDstAddr(dst))
}

// ===== deferred transmissions and retransmissions =====

fn process_send_lsupd(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: Option<NeighborId>,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    match nbr_id {
        Some(nbr_id) => {
            let (_, nbr) = iface
                .state
                .neighbors
                .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;
            nbr.send_update_list(iface, area, instance);
        }
        None => {
            iface.state.tasks.ls_update_timer = None;
            iface.send_update_list(area, instance, &arenas.neighbors);
        }
    }

    Ok(())
}

fn process_packet_rxmt(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    packet_type: RxmtPacketType,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    match packet_type {
        RxmtPacketType::DbDesc => nbr.rxmt_dbdesc(instance),
        RxmtPacketType::LsRequest => nbr.rxmt_lsreq(iface, area, instance),
        RxmtPacketType::LsUpdate => nbr.rxmt_update(iface, area, instance),
    }

    Ok(())
}

fn process_delayed_ack_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    iface.state.tasks.ls_delayed_ack = None;
    iface.send_delayed_acks(area, instance, &arenas.neighbors);

    Ok(())
}

// The slave may now forget the exchange's final packets.
fn process_dbdesc_free(
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== delayed origination =====

fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    let (lsdb_idx, _) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        lsdb_id,
    )?;
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // The MinLSInterval wait is over; originate what was held back.
    if let Some(delayed) = lsdb.delayed_orig.remove(&lsa_key) {
        lsdb::originate(instance, arenas, lsdb_idx, delayed.data);
    }

    Ok(())
}

// ===== graceful restart =====

fn process_grace_period_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) =
        area.interfaces.get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    if nbr.we_are_helping() {
        gr::exit_helper_mode(
            nbr,
            iface,
            area,
            GrExitReason::TimedOut,
            instance,
        );

        // The restarter never came back; take the neighbor down now.
        instance.tx.protocol_input.nsm_event(
            area.id,
            iface.id,
            nbr.id,
            nsm::Event::InactivityTimer,
        );
    }

    Ok(())
}

// ===== database exchange slots =====

// Promotes neighbors parked in 2-Way for lack of a database exchange
// slot, until the limit is reached again.
fn process_dd_slot_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        for iface_idx in arenas.areas[area_idx]
            .interfaces
            .indexes()
            .collect::<Vec<_>>()
        {
            let iface = &arenas.interfaces[iface_idx];
            for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>()
            {
                if instance.state.dd_active_count.get()
                    >= instance.config.max_dds
                {
                    return;
                }

                let area = &arenas.areas[area_idx];
                let iface = &mut arenas.interfaces[iface_idx];
                let nbr = &mut arenas.neighbors[nbr_idx];
                if nbr.dd_pending && nbr.state == nsm::State::TwoWay {
                    nbr.run_fsm(
                        iface,
                        area,
                        instance,
                        &arenas.lsa_entries,
                        nsm::Event::AdjOk,
                    );
                }
            }
        }
    }
}

// ===== database overflow =====

fn process_overflow_exit(instance: &mut InstanceUpView<'_>) {
    if instance.state.overflow {
        Debug::DbOverflowExit.log();
        instance.state.overflow = false;
        instance.state.overflow_timer = None;

        // Try importing the external routes again.
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
    }
}
