//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Helper mode for hitless restart.
//
// While a fully adjacent neighbor restarts, the router keeps advertising
// the adjacency so the restarter stays on the forwarding path. The
// neighbor FSM holds its state for the duration (see `adv_as_full`); this
// module decides when a helper session may start and what must be redone
// when it ends.
//

use crate::area::Area;
use crate::debug::{Debug, GrRejectReason};
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::LsaOriginateEvent;
use crate::neighbor::{Neighbor, NeighborGrHelper, nsm};
use crate::packet::lsa::LsaHdr;
use crate::packet::tlv::GrReason;
use crate::tasks;

// Why a helper session ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrExitReason {
    Completed,
    TimedOut,
    TopologyChanged,
}

// ===== impl GrExitReason =====

impl std::fmt::Display for GrExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            GrExitReason::Completed => "restart completed",
            GrExitReason::TimedOut => "grace period expired",
            GrExitReason::TopologyChanged => "network topology changed",
        };
        f.write_str(reason)
    }
}

// ===== global functions =====

// A Grace-LSA was received from (or on behalf of) the given neighbor.
// A fresh one opens or extends the helper session; a flushed one means
// the restarter finished on its own.
pub(crate) fn grace_lsa_rx(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    lsa_hdr: &LsaHdr,
    grace_period: u32,
    reason: GrReason,
    instance: &mut InstanceUpView<'_>,
) {
    if lsa_hdr.is_maxage() {
        if nbr.we_are_helping() {
            exit_helper_mode(
                nbr,
                iface,
                area,
                GrExitReason::Completed,
                instance,
            );
        }
        return;
    }

    // The grace period started when the LSA was originated, not when it
    // got here.
    let remaining = grace_period.saturating_sub(lsa_hdr.age() as u32);

    // An ongoing session is just extended.
    if let Some(gr) = &nbr.gr {
        instance.tx.timers.borrow_mut().reset(
            &gr.grace_period,
            instance.tx.now.get(),
            Some(remaining * 1000),
        );
        return;
    }

    match helper_eligible(nbr, lsa_hdr, grace_period, instance) {
        Err(reject) => {
            Debug::GrHelperReject(nbr.router_id, reject).log();
        }
        Ok(()) => {
            Debug::GrHelperEnter(nbr.router_id, reason, remaining).log();

            let grace_period = tasks::grace_period_timer(
                nbr,
                iface,
                area,
                instance.tx,
                remaining,
            );
            nbr.gr = Some(NeighborGrHelper {
                restart_reason: reason,
                grace_period,
            });
            instance.state.gr_helper_count += 1;
        }
    }
}

// The conditions under which a helper session may start: a full
// adjacency, no topology change already in flight towards the restarter,
// time left on the grace period, and local policy agreeing at all.
fn helper_eligible(
    nbr: &Neighbor,
    lsa_hdr: &LsaHdr,
    grace_period: u32,
    instance: &InstanceUpView<'_>,
) -> Result<(), GrRejectReason> {
    if nbr.state != nsm::State::Full {
        return Err(GrRejectReason::NeighborNotFull);
    }

    // An unacknowledged topology LSA on the retransmission list means the
    // restarter's pre-restart database is already stale.
    if instance.config.gr_helper_strict_lsa_checking
        && nbr
            .lists
            .ls_rxmt
            .values()
            .any(|lsa| lsa.hdr.lsa_type.is_gr_topology_info())
    {
        return Err(GrRejectReason::TopologyChange);
    }

    if lsa_hdr.age() as u32 >= grace_period {
        return Err(GrRejectReason::GracePeriodExpired);
    }

    if !instance.config.gr_helper_enabled {
        return Err(GrRejectReason::HelperDisabled);
    }

    Ok(())
}

// A topology-affecting database change ends every helper session: the
// restarters' pre-restart routing decisions can no longer be trusted.
pub(crate) fn topology_change(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    // Collect the sessions first; ending one reoriginates LSAs.
    let mut helped = vec![];
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            for nbr_idx in iface.state.neighbors.indexes() {
                if arenas.neighbors[nbr_idx].we_are_helping() {
                    helped.push((area_idx, iface_idx, nbr_idx));
                }
            }
        }
    }

    for (area_idx, iface_idx, nbr_idx) in helped {
        let area = &arenas.areas[area_idx];
        let iface = &arenas.interfaces[iface_idx];
        let nbr = &mut arenas.neighbors[nbr_idx];
        exit_helper_mode(
            nbr,
            iface,
            area,
            GrExitReason::TopologyChanged,
            instance,
        );
    }
}

// Ends a helper session. The side effects the session suppressed must
// happen now: if the neighbor silently fell out of Full while we were
// covering for it, this is where the withdrawal it owed the area finally
// runs; if it is still the segment's DR, its claim survives until its
// next hello so the segment isn't needlessly re-elected.
pub(crate) fn exit_helper_mode(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    reason: GrExitReason,
    instance: &mut InstanceUpView<'_>,
) {
    Debug::GrHelperExit(nbr.router_id, reason).log();

    // Stops the grace period timer with it.
    nbr.gr = None;
    instance.state.gr_helper_count -= 1;

    if nbr.state != nsm::State::Full {
        // The processing skipped when the neighbor first left Full: stop
        // advertising the adjacency in the router-LSA and network-LSA.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::NeighborToFromFull {
                area_id: area.id,
                iface_id: iface.id,
            },
        );
    } else {
        // Still Full: the advertisements stand, but the segment's roles
        // may have drifted. The neighbor's own DR claim is part of the
        // election input, so a restarting DR keeps its seat until its
        // next hello says otherwise.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::GrHelperExit {
                area_id: area.id,
                iface_id: iface.id,
            },
        );
    }

    // Re-run the election either way on segments that elect.
    if iface.is_broadcast_or_nbma() {
        instance.tx.protocol_input.ism_event(
            area.id,
            iface.id,
            ism::Event::NbrChange,
        );
    }
}
