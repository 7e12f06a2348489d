//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Reliable flooding.
//
// Both halves of the protocol live here: deciding what to do with each
// LSA carried by a received Link State Update, and pushing accepted LSAs
// back out to the rest of the flooding scope. Reliability comes from the
// per-neighbor retransmission lists; an LSA leaves a list only when the
// exact instance is acknowledged, implicitly or explicitly.
//

use std::cmp::Ordering;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{
    AreaIndex, Areas, Arena, InterfaceIndex, LsdbIndex, NeighborIndex,
    lsdb_index,
};
use crate::debug::Debug;
use crate::gr;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{
    self, LsaEntryFlags, LsaOriginateEvent, lsa_admissible, lsa_compare,
};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::LsUpdate;
use crate::packet::lsa::{Lsa, LsaKey};

// ===== flooding =====

// Floods an LSA through its scope: one interface for link-local LSAs, one
// area's interfaces for area-scoped ones, and every area that admits the
// type for AS-scoped ones. Returns whether the LSA went back out the
// interface it arrived on, which the caller needs for the ack decision.
pub(crate) fn flood(
    instance: &InstanceUpView<'_>,
    areas: &Areas,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsdb_idx: LsdbIndex,
    lsa: &Arc<Lsa>,
    from: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool {
    let mut scope: Vec<(AreaIndex, InterfaceIndex)> = vec![];
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            scope.push((area_idx, iface_idx));
        }
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];
            scope.extend(
                area.interfaces.indexes().map(|iface_idx| (area_idx, iface_idx)),
            );
        }
        LsdbIndex::As => {
            for area_idx in areas.indexes() {
                let area = &areas[area_idx];
                if !lsa_admissible(
                    Some(area.config.area_type),
                    None,
                    lsa.hdr.lsa_type,
                ) {
                    continue;
                }
                scope.extend(
                    area.interfaces
                        .indexes()
                        .map(|iface_idx| (area_idx, iface_idx)),
                );
            }
        }
    }

    let mut echoed = false;
    for (area_idx, iface_idx) in scope {
        let area = &areas[area_idx];
        echoed |= flood_out(
            area, iface_idx, instance, interfaces, neighbors, lsa, from,
        );
    }
    echoed
}

// One interface's worth of RFC 2328 section 13.3: decide per neighbor
// whether the LSA must be retransmitted, then whether the interface
// itself needs to carry the flood.
fn flood_out(
    area: &Area,
    iface_idx: InterfaceIndex,
    instance: &InstanceUpView<'_>,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    from: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool {
    let iface = &mut interfaces[iface_idx];
    let lsa_key = lsa.hdr.key();
    let from_nbr = from.map(|(_, nbr_idx)| nbr_idx);

    // Step 1: examine each neighbor on the interface.
    let mut listed = false;
    for nbr_idx in iface.state.neighbors.indexes() {
        let nbr = &mut neighbors[nbr_idx];
        if !nbr_needs_lsa(nbr, iface, area, instance, lsa, lsa_key) {
            continue;
        }
        // 1c) The sending neighbor obviously has this instance already.
        if from_nbr == Some(nbr_idx) {
            continue;
        }

        // 1d) Put the LSA on the retransmission list, replacing any older
        // instance.
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
        listed = true;
    }

    // Step 2: with nothing added to any retransmission list, the
    // interface has nobody left to tell.
    if !listed {
        return false;
    }

    // Steps 3 and 4 apply when the LSA arrived on this very interface:
    // a flood from the DR or Backup already covered the segment, and the
    // Backup itself defers to the DR.
    let mut echoed = false;
    if let Some((from_iface, from_nbr)) = from {
        if from_iface == iface_idx {
            let sender = neighbors[from_nbr].network_id();
            if iface.state.dr == Some(sender)
                || iface.state.bdr == Some(sender)
            {
                return false;
            }
            if iface.state.ism_state == ism::State::Backup {
                return false;
            }
            echoed = true;
        }
    }

    // Step 5: queue the LSA on the interface's pending update, so nearby
    // floods share packets.
    iface.add_to_update(area, instance, lsa_key, lsa.clone());

    echoed
}

// Step 1a/1b for a single neighbor: whether this LSA belongs on its
// retransmission list, reconciling the request lists of an adjacency
// still being built.
fn nbr_needs_lsa(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa: &Arc<Lsa>,
    lsa_key: LsaKey,
) -> bool {
    // 1a) Neighbors that haven't begun the database exchange get the LSA
    // through that exchange instead.
    if nbr.state < nsm::State::Exchange {
        return false;
    }

    // The neighbor must be capable of holding this LSA type.
    if !lsa_admissible(None, nbr.options, lsa.hdr.lsa_type) {
        return false;
    }

    // 1b) The neighbor may have this very LSA on order. A newer instance
    // supersedes the request; the requested instance itself completes it;
    // an older one changes nothing.
    if nbr.state != nsm::State::Full {
        let requested = nbr
            .lists
            .ls_request
            .get(&lsa_key)
            .or_else(|| nbr.lists.ls_request_pending.get(&lsa_key))
            .copied();
        if let Some(requested) = requested {
            let cmp = lsa_compare(&lsa.hdr, &requested);
            if cmp == Ordering::Less {
                return false;
            }

            nbr.lists.ls_request.remove(&lsa_key);
            nbr.lists.ls_request_pending.remove(&lsa_key);
            nbr.loading_done_check(iface, area, instance);

            if cmp == Ordering::Equal {
                return false;
            }
        }
    }

    true
}

// ===== link state update receive =====

// Processes a received Link State Update packet.
pub(crate) fn receive_lsupd(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    iface_idx: InterfaceIndex,
    nbr_idx: NeighborIndex,
    ls_upd: LsUpdate,
) {
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return;
    }

    for lsa in ls_upd.lsas {
        if receive_lsa(instance, arenas, area_idx, iface_idx, nbr_idx, lsa) {
            break;
        }
    }
}

// Handles one LSA of a Link State Update. Returns true when the rest of
// the packet must be abandoned (the exchange is being restarted).
fn receive_lsa(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    iface_idx: InterfaceIndex,
    nbr_idx: NeighborIndex,
    #[allow(unused_mut)] mut lsa: Lsa,
) -> bool {
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];

    // LSAs received in testing mode arrive without their wire image.
    #[cfg(feature = "testing")]
    if lsa.raw.is_empty() {
        lsa.encode();
    }

    // Checksum, age and sequence number must all be sane, and the type
    // must be one this area and neighbor can carry.
    if let Err(error) = lsa.validate() {
        Debug::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();
        return false;
    }
    if !lsa_admissible(
        Some(area.config.area_type),
        nbr.options,
        lsa.hdr.lsa_type,
    ) {
        if lsa.hdr.lsa_type.type_code().is_none() {
            crate::error::Error::LsaUnknownType(lsa.hdr.lsa_type).log();
        }
        return false;
    }

    // Locate the database copy.
    let lsdb_idx =
        lsdb::lsdb_get_by_lsa_type(iface_idx, area_idx, lsa.hdr.lsa_type);
    let lsdb = match lsdb_idx {
        LsdbIndex::Link(_, _) => &iface.state.lsdb,
        LsdbIndex::Area(_) => &area.state.lsdb,
        LsdbIndex::As => &instance.state.lsdb,
    };
    let lsa_key = lsa.hdr.key();
    let db_copy = lsdb.get(&arenas.lsa_entries, &lsa_key).map(|(_, lse)| lse);

    // A flush for an LSA we never had needs no more than an ack, unless a
    // database exchange is in progress somewhere.
    if lsa.hdr.is_maxage() && db_copy.is_none() {
        let exchanging = arenas.neighbors.iter().any(|(_, nbr)| {
            matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
        });
        if !exchanging {
            nbr.send_ack_direct(iface, area, instance, &lsa.hdr);
            return false;
        }
    }

    let now = instance.now();
    match db_copy.map(|lse| lsa_compare(&lse.data.hdr, &lsa.hdr)) {
        // The received instance is the news.
        None | Some(Ordering::Less) => {
            // Instances of one LSA are accepted at most once per
            // MinLSArrival.
            if let Some(lse) = db_copy {
                if lsdb::lsa_min_arrival_check(lse, now) {
                    Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr)
                        .log();
                    return false;
                }
            }

            accept_newer(
                instance, arenas, lsdb_idx, area_idx, iface_idx, nbr_idx, lsa,
            );
            false
        }
        // Same instance: usually an implicit acknowledgment.
        Some(Ordering::Equal) => {
            let nbr = &mut arenas.neighbors[nbr_idx];
            let iface = &mut arenas.interfaces[iface_idx];
            let on_rxmt_list = nbr.lists.ls_rxmt.remove(&lsa_key).is_some();
            if on_rxmt_list {
                nbr.rxmt_lsupd_stop_check();

                // As Backup, echo the DR's flood with a delayed ack.
                let sender = nbr.network_id();
                if iface.state.ism_state == ism::State::Backup
                    && iface.state.dr == Some(sender)
                {
                    iface.build_dack(area, instance, &lsa.hdr);
                }
            } else {
                // A plain duplicate is acknowledged directly.
                nbr.send_ack_direct(iface, area, instance, &lsa.hdr);
            }
            false
        }
        // Our copy is newer.
        Some(Ordering::Greater) => {
            let db_hdr = db_copy.map(|lse| lse.data.hdr).unwrap();
            let db_data = db_copy.map(|lse| lse.data.clone()).unwrap();
            let stale =
                db_copy.map(|lse| lsdb::lsa_min_arrival_check(lse, now));

            // The neighbor answering a request with an old instance means
            // the exchange derailed.
            let nbr = &mut arenas.neighbors[nbr_idx];
            if nbr.lists.ls_request.contains_key(&lsa_key)
                || nbr.lists.ls_request_pending.contains_key(&lsa_key)
            {
                let iface = &mut arenas.interfaces[iface_idx];
                nbr.run_fsm(
                    iface,
                    area,
                    instance,
                    &arenas.lsa_entries,
                    nsm::Event::BadLsReq,
                );
                return true;
            }

            // A wrapped-out instance awaiting its acknowledgments is
            // deliberately not pushed back.
            if db_hdr.is_maxage() && db_hdr.seq_no == lsdb::LSA_MAX_SEQ_NO {
                return false;
            }

            // Bring the neighbor up to date, rate-limited like any other
            // instance of this LSA.
            if stale == Some(false) {
                nbr.lists.ls_update.insert(lsa_key, db_data);
                instance
                    .tx
                    .protocol_input
                    .send_lsupd(area.id, iface.id, Some(nbr.id));
            } else {
                Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
            }
            false
        }
    }
}

// Accepts a received instance that is newer than anything we hold: flood
// it on, install it, acknowledge it, and follow up on grace and
// self-origination.
fn accept_newer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    area_idx: AreaIndex,
    iface_idx: InterfaceIndex,
    nbr_idx: NeighborIndex,
    mut lsa: Lsa,
) {
    lsa.base_time = Some(instance.now());
    let lsa = Arc::new(lsa);

    // Flood first; installation clears superseded retransmissions.
    let echoed = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lsa,
        Some((iface_idx, nbr_idx)),
    );

    let lse_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
    let lse = &mut arenas.lsa_entries[lse_idx];
    lse.flags.insert(LsaEntryFlags::RECEIVED);
    let lsa_hdr = lse.data.hdr;
    let grace = lse.data.body.as_grace();
    let self_originated =
        lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED);
    let lse_id = lse.id;

    instance.state.rx_lsa_count += 1;

    // Ack policy: a delayed ack unless the flood already echoed the LSA
    // out the receiving interface, with the Backup only answering for the
    // DR.
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];
    let sender = nbr.network_id();
    let nbr_router_id = nbr.router_id;
    if !echoed
        && (iface.state.ism_state != ism::State::Backup
            || iface.state.dr == Some(sender))
    {
        iface.build_dack(area, instance, &lsa_hdr);
    }

    // A Grace-LSA starts (or refreshes, or ends) a helper session. On
    // multi-access segments the restarter names its interface address in
    // the LSA body.
    if let Some((grace_period, reason, grace_addr)) = grace {
        let restarter = match grace_addr {
            Some(grace_addr) => iface
                .find_nbr(&mut arenas.neighbors, grace_addr, nbr_router_id)
                .map(|(restarter_idx, _)| restarter_idx),
            None => Some(nbr_idx),
        };
        if let Some(restarter_idx) = restarter {
            let nbr = &mut arenas.neighbors[restarter_idx];
            gr::grace_lsa_rx(
                nbr,
                iface,
                area,
                &lsa_hdr,
                grace_period,
                reason,
                instance,
            );
        }
    }

    // Someone is flooding our own words back at us, newer than we told
    // them. Reclaim the advertisement.
    if self_originated {
        Debug::LsaSelfOriginated(nbr_router_id, &lsa_hdr).log();

        let (lsdb_id, _) = lsdb_index(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            lsdb_idx,
        );
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id },
        );
    }
}
