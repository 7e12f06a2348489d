//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// LSA storage and maintenance: installation, origination, refresh, premature
// aging and expiry.
//
// Aging is bin-driven. Every LSA subject to aging sits in one of MaxAge+1
// one-second bins with a rotating origin, so a single pointer advance per
// second replaces walking the whole database. Three derived bins require
// action on each tick: the bin reaching MaxAge, the bin due for checksum
// audit, and the refresh bin holding self-originated LSAs at
// LSRefreshTime.
//

use std::collections::{HashSet, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;

use bitflags::bitflags;
use itertools::Itertools;

use crate::area::{Area, AreaType, OptionsLocation, area_options};
use crate::collections::{
    AreaId, Arena, InterfaceId, InterfaceIndex, LsaEntryId, LsaEntryIndex,
    LsdbId, LsdbIndex, lsdb_get, lsdb_index, lsdb_index_mut,
};
use crate::config::ExternalRouteCfg;
use crate::debug::{Debug, LsaFlushReason, SpfReason};
use crate::error::Error;
use crate::flood::flood;
use crate::gr;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, InterfaceType, ism};
use crate::neighbor::nsm;
use crate::packet::Options;
use crate::packet::lsa::{
    Lsa, LsaBody, LsaKey, LsaNetwork, LsaRouter, LsaRouterFlags,
    LsaRouterLink, LsaRouterLinkType, LsaScope, LsaSummary, LsaType,
    LsaTypeCode,
};
use crate::sys::HaltCode;
use crate::tasks::{self, Etime, TimeoutTask};

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_CHECK_AGE: u16 = 300;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_DO_NOT_AGE: u16 = 0x8000;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u32 = 5;
pub const LSA_MIN_ARRIVAL: u32 = 1;

// Number of aging bins.
const AGE_BINS: usize = LSA_MAX_AGE as usize + 1;
// Number of refresh bins.
const REFRESH_BINS: usize = LSA_MAX_AGE_DIFF as usize;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSDB that owns this entry.
    pub lsdb_id: LsdbId,
    // LSA data.
    pub data: Arc<Lsa>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
    // Aging bin, when the LSA is subject to aging or checksum auditing.
    pub agebin: Option<u16>,
    // Refresh bin, for self-originated LSAs.
    pub refresh_bin: Option<u16>,
    // Time the current instance was received or originated.
    pub event_time: Option<Etime>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Debug)]
pub enum LsaOriginateEvent {
    AreaStart {
        area_id: AreaId,
    },
    InterfaceStateChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceDrChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceCostChange {
        area_id: AreaId,
    },
    NeighborToFromFull {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    SelfOriginatedLsaRcvd {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
    GrHelperExit {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    ExternalRoutesChange,
}

#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

// Aging and refresh bins, shared by all LSDBs of the instance.
#[derive(Debug)]
pub struct AgeBins {
    bins: Vec<HashSet<(LsdbId, LsaEntryId)>>,
    bin0: u16,
    // LSAs exempt from aging; re-parked instead of expired when the
    // origin wraps onto their bin.
    do_not_age: HashSet<(LsdbId, LsaEntryId)>,
    refresh_bins: Vec<HashSet<(LsdbId, LsaEntryId)>>,
    refresh_cur: u16,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(id: LsaEntryId, data: Arc<Lsa>) -> LsaEntry {
        LsaEntry {
            id,
            // Rewritten right after insertion.
            lsdb_id: LsdbId::As,
            data,
            flags: Default::default(),
            agebin: None,
            refresh_bin: None,
            event_time: None,
        }
    }
}

// ===== impl AgeBins =====

impl AgeBins {
    // The bin holding LSAs of the given age.
    fn age_bin(&self, age: u16) -> u16 {
        ((self.bin0 as usize + AGE_BINS - age as usize) % AGE_BINS) as u16
    }

    // Places an LSA into the aging structure. DoNotAge LSAs are parked at
    // the current origin so they never reach MaxAge but still cycle through
    // the checksum audit.
    pub(crate) fn insert(
        &mut self,
        key: (LsdbId, LsaEntryId),
        age: u16,
        do_not_age: bool,
    ) -> u16 {
        let bin = if do_not_age {
            self.do_not_age.insert(key);
            self.bin0
        } else {
            self.age_bin(std::cmp::min(age, LSA_MAX_AGE - 1))
        };
        self.bins[bin as usize].insert(key);
        bin
    }

    pub(crate) fn remove(&mut self, bin: u16, key: &(LsdbId, LsaEntryId)) {
        self.bins[bin as usize].remove(key);
        self.do_not_age.remove(key);
    }

    // Schedules a self-originated LSA for refresh at LSRefreshTime. With
    // randomized refresh the bin is jittered to spread the refreshes of
    // large databases.
    pub(crate) fn refresh_insert(
        &mut self,
        key: (LsdbId, LsaEntryId),
        random: bool,
    ) -> u16 {
        let mut bin = self.refresh_cur;
        #[cfg(not(feature = "deterministic"))]
        if random {
            use rand::Rng;
            let jitter =
                rand::rng().random_range(0..REFRESH_BINS as u16);
            bin = (bin + jitter) % REFRESH_BINS as u16;
        }
        #[cfg(feature = "deterministic")]
        let _ = random;
        self.refresh_bins[bin as usize].insert(key);
        bin
    }

    pub(crate) fn refresh_remove(
        &mut self,
        bin: u16,
        key: &(LsdbId, LsaEntryId),
    ) {
        self.refresh_bins[bin as usize].remove(key);
    }

    // Advances the aging origin by one second. Returns the LSAs that just
    // reached MaxAge, the LSAs due for checksum audit and the refresh
    // candidates.
    #[allow(clippy::type_complexity)]
    pub(crate) fn advance(
        &mut self,
    ) -> (
        Vec<(LsdbId, LsaEntryId)>,
        Vec<(LsdbId, LsaEntryId)>,
        Vec<(LsdbId, LsaEntryId)>,
    ) {
        self.bin0 = ((self.bin0 as usize + 1) % AGE_BINS) as u16;

        // The bin one past the new origin now holds MaxAge LSAs. It must be
        // drained so the origin never wraps onto stale entries. DoNotAge
        // LSAs are re-parked at the origin instead of expiring.
        let expired_bin = (self.bin0 as usize + 1) % AGE_BINS;
        let (parked, expired): (Vec<_>, Vec<_>) = self.bins[expired_bin]
            .drain()
            .partition(|key| self.do_not_age.contains(key));
        for key in parked {
            self.bins[self.bin0 as usize].insert(key);
        }

        // The bin at CheckAge distance is due for checksum audit.
        let audit_bin = self.age_bin(LSA_CHECK_AGE);
        let audit = self.bins[audit_bin as usize].iter().copied().collect();

        // Advance the refresh cursor. Candidates stay binned; entries that
        // actually refresh are replaced by their new instance.
        self.refresh_cur = ((self.refresh_cur as usize + 1) % REFRESH_BINS) as u16;
        let refresh = self.refresh_bins[self.refresh_cur as usize]
            .iter()
            .copied()
            .collect();

        (expired, audit, refresh)
    }
}

impl Default for AgeBins {
    fn default() -> AgeBins {
        AgeBins {
            bins: vec![HashSet::new(); AGE_BINS],
            bin0: 0,
            do_not_age: Default::default(),
            refresh_bins: vec![HashSet::new(); REFRESH_BINS],
            refresh_cur: 0,
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub(crate) fn lsa_compare(
    a: &crate::packet::lsa::LsaHdr,
    b: &crate::packet::lsa::LsaHdr,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age().abs_diff(b.age()) > LSA_MAX_AGE_DIFF {
        return b.age().cmp(&a.age());
    }

    Ordering::Equal
}

// Checks whether an LSA type can be held by the given area and advertised
// to the given neighbor. Unknown type codes are never admitted; opaque
// types require the neighbor to have signaled the O-bit; type-4, type-5
// and AS-scope opaque LSAs are excluded from stub areas.
pub(crate) fn lsa_admissible(
    area_type: Option<AreaType>,
    nbr_options: Option<Options>,
    lsa_type: LsaType,
) -> bool {
    let Some(type_code) = lsa_type.type_code() else {
        return false;
    };

    if lsa_type.is_opaque() {
        if let Some(options) = nbr_options {
            if !options.contains(Options::O) {
                return false;
            }
        }
    }

    if area_type == Some(AreaType::Stub)
        && matches!(
            type_code,
            LsaTypeCode::SummaryRouter
                | LsaTypeCode::AsExternal
                | LsaTypeCode::OpaqueAs
        )
    {
        return false;
    }

    true
}

// Compares two LSAs according to the rules specified in Section 13.2 of
// RFC 2328. Its purpose is to determine if the contents of the LSAs are
// identical.
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = crate::packet::lsa::LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry, now: Etime) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.event_time {
        Some(event_time) => {
            now.sec.saturating_sub(event_time.sec) < LSA_MIN_ARRIVAL
        }
        None => false,
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds
// ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry, now: Etime) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.event_time {
        Some(event_time) => {
            now.sec.saturating_sub(event_time.sec) < LSA_MIN_INTERVAL
        }
        None => false,
    }
}

// Installs the provided LSA to the specified LSDB.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    // Lookup LSDB.
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // Remove old instance of the LSA.
    let mut old_lsa = None;
    if let Some((old_lse_idx, old_lse)) =
        lsdb.get(&arenas.lsa_entries, &lsa.hdr.key())
    {
        old_lsa = Some(old_lse.data.clone());
        delete_entry(
            lsdb,
            &mut instance.state.age_bins,
            &mut arenas.lsa_entries,
            old_lse_idx,
        );
    }

    // Add LSA entry to LSDB.
    let (lse_idx, lse) = lsdb.insert(&mut arenas.lsa_entries, lsa.clone());
    lse.lsdb_id = lsdb_id;
    lse.event_time = Some(instance.tx.now.get());

    // Place the LSA into the aging structure, unless it's already at
    // MaxAge.
    if !lse.data.hdr.is_maxage() {
        let bin = instance.state.age_bins.insert(
            (lsdb_id, lse.id),
            lse.data.hdr.age(),
            lse.data.hdr.do_not_age(),
        );
        lse.agebin = Some(bin);
    }

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(&lse.data, instance.state.router_id, &arenas.interfaces) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // Keep track of self-originated Network-LSAs in the corresponding
    // interface structures, so they can be flushed when the interface
    // address changes or the DR role is lost.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && lsa.hdr.adv_rtr == instance.state.router_id
    {
        if let LsdbIndex::Area(area_idx) = lsdb_idx {
            let area = &arenas.areas[area_idx];
            for iface_idx in
                area.interfaces.indexes().collect::<Vec<_>>()
            {
                let iface = &mut arenas.interfaces[iface_idx];
                if iface.addr == lsa.hdr.lsa_id {
                    if lsa.hdr.is_maxage() {
                        iface.state.network_lsa_self = None;
                    } else {
                        iface.state.network_lsa_self = Some(lsa.hdr.key());
                    }
                }
            }
        }
    }

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance,
    // if present. If there is no difference, there is no need to
    // recalculate the routing table".
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa {
        if lsa_same_contents(old_lsa, &lsa) {
            content_change = false;
        }
    }
    let lse = &arenas.lsa_entries[lse_idx];
    let self_orig_summary = lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
        && matches!(
            lsa.hdr.lsa_type.type_code(),
            Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter)
        );
    let route_recalc =
        content_change && !lsa.body.is_unknown_body() && !self_orig_summary;

    // A network topology change forces the termination of a graceful
    // restart.
    if content_change
        && lsa.hdr.lsa_type.is_gr_topology_info()
        && instance.state.gr_helper_count > 0
    {
        gr::topology_change(instance, arenas);
    }

    // Schedule the routing calculation if necessary.
    if route_recalc {
        if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::AsExternal) {
            if !instance.state.ase_sched {
                Debug::SpfScheduled(SpfReason::External).log();
                instance.state.ase_sched = true;
            }
        } else if !instance.state.full_sched {
            Debug::SpfScheduled(SpfReason::Full).log();
            instance.state.full_sched = true;
        }
    }

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Lsa,
) {
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        if lsa.hdr.seq_no == LSA_MAX_SEQ_NO.wrapping_add(1) {
            // Record LSA that will be originated later and then flush the
            // existing instance.
            match lsdb.seqno_wrapping.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    *o.get_mut() = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    v.insert(lsa);
                }
            }
            let reason = LsaFlushReason::PrematureAging;
            flush(instance, arenas, lsdb_idx, old_lse_idx, reason);
            return;
        }
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    let mut lsa = lsa;
    lsa.base_time = Some(instance.tx.now.get());
    let lse_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    // Schedule LSA refreshing.
    let lse = &mut arenas.lsa_entries[lse_idx];
    let bin = instance.state.age_bins.refresh_insert(
        (lsdb_id, lse.id),
        instance.config.random_refresh,
    );
    lse.refresh_bin = Some(bin);

    // Flood the new instance.
    let lse = &arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data.clone(),
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;
}

// Attempts to originate the provided LSA, but only if it passes a few
// checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let now = instance.tx.now.get();

    // An origination request whose LSA type doesn't match the target
    // database is a configuration conflict.
    let scope_ok = matches!(
        (lsdb_idx, lsa_body.lsa_type().scope()),
        (LsdbIndex::Link(..), LsaScope::Link)
            | (LsdbIndex::Area(_), LsaScope::Area)
            | (LsdbIndex::As, LsaScope::As)
    );
    if !scope_ok {
        instance.tx.halt(
            HaltCode::LsType,
            "LSA type does not match the target database",
        );
        return;
    }

    // Non-default AS-external-LSAs are subject to the database overflow
    // limit and to the origination rate cap.
    if matches!(lsa_body, LsaBody::AsExternal(_))
        && lsa_id != Ipv4Addr::UNSPECIFIED
    {
        let exists = {
            let adv_rtr = instance.state.router_id;
            let lsa_key =
                LsaKey::new(LsaTypeCode::AsExternal.into(), adv_rtr, lsa_id);
            instance
                .state
                .lsdb
                .get(&arenas.lsa_entries, &lsa_key)
                .is_some()
        };
        if !exists {
            if instance.state.overflow {
                return;
            }
            let limit = instance.config.lsdb_limit;
            if limit > 0 {
                let count = instance
                    .state
                    .lsdb
                    .iter_by_type(
                        &arenas.lsa_entries,
                        LsaTypeCode::AsExternal.into(),
                    )
                    .count();
                if count >= limit as usize {
                    Debug::DbOverflowEnter.log();
                    instance.state.overflow = true;
                    let timer = instance.tx.timers.borrow_mut().timeout_task(
                        now,
                        instance.config.ovfl_int as u32 * 1000,
                        crate::tasks::TimerAction::OverflowExitTimer,
                    );
                    instance.state.overflow_timer = Some(timer);
                    return;
                }
            }
            if instance.state.ext_orig_count >= instance.config.new_flood_rate
            {
                // Over the per-second origination budget; retry on the
                // next aging tick.
                instance.state.ext_pending = true;
                return;
            }
            instance.state.ext_orig_count += 1;
        }
    }
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);

    // Get next sequence number.
    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no.wrapping_add(1))
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // If an LSA with identical contents already exists in the LSDB,
        // skip originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse, now)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    let ldo = o.get_mut();
                    ldo.data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let elapsed = old_lse
                        .event_time
                        .map(|t| now.sec.saturating_sub(t.sec))
                        .unwrap_or(0);
                    let delay_ms =
                        LSA_MIN_INTERVAL.saturating_sub(elapsed) * 1000;
                    let timeout = tasks::lsa_orig_delayed_timer(
                        instance.tx,
                        lsdb_id,
                        lsa_key,
                        delay_ms.max(1000),
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_idx, lsa);
}

// Flushes LSA from the LSDB by prematurely aging it to MaxAge and
// reflooding.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Set the LSA age to MaxAge.
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route
    // calculations.
    let lse_idx = install(instance, arenas, lsdb_idx, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data.clone(),
        None,
    );

    // Get LSA's LSDB.
    let lsa_key = arenas.lsa_entries[lse_idx].data.hdr.key();
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // Remove pending LSA origination, if any.
    lsdb.delayed_orig.remove(&lsa_key);
}

// Prematurely ages every self-originated LSA out of every database. Used
// by the shutdown sequence to withdraw the router from the domain.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    // Gather (lsdb, entry) pairs first; flushing reshapes the databases.
    fn self_originated(
        (lse_idx, lse): (LsaEntryIndex, &LsaEntry),
    ) -> Option<LsaEntryIndex> {
        lse.flags
            .contains(LsaEntryFlags::SELF_ORIGINATED)
            .then_some(lse_idx)
    }

    let mut doomed = vec![];
    doomed.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter_map(self_originated)
            .map(|lse_idx| (LsdbIndex::As, lse_idx)),
    );
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        doomed.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter_map(self_originated)
                .map(|lse_idx| (LsdbIndex::Area(area_idx), lse_idx)),
        );
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            doomed.extend(
                iface
                    .state
                    .lsdb
                    .iter(&arenas.lsa_entries)
                    .filter_map(self_originated)
                    .map(|lse_idx| (LsdbIndex::Link(area_idx, iface_idx), lse_idx)),
            );
        }
    }

    for (lsdb_idx, lse_idx) in doomed {
        flush(
            instance,
            arenas,
            lsdb_idx,
            lse_idx,
            LsaFlushReason::PrematureAging,
        );
    }
}

// One-second database aging tick.
pub(crate) fn age_tick(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let (expired, audit, refresh) = instance.state.age_bins.advance();

    // LSAs reaching MaxAge are prematurely removed from the aging pipeline
    // and reflooded with age set to MaxAge.
    for (lsdb_id, lse_id) in expired {
        let Ok((lsdb_idx, lsdb)) = lsdb_get(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            lsdb_id,
        ) else {
            continue;
        };
        let Some((lse_idx, _)) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)
        else {
            continue;
        };
        arenas.lsa_entries[lse_idx].agebin = None;
        flush(instance, arenas, lsdb_idx, lse_idx, LsaFlushReason::Expiry);
    }

    // Checksum audit: a failure indicates memory corruption and halts the
    // router.
    for (lsdb_id, lse_id) in audit {
        let Ok((_, lsdb)) = lsdb_get(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            lsdb_id,
        ) else {
            continue;
        };
        let Some((_, lse)) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)
        else {
            continue;
        };
        if !lse.data.is_checksum_valid() {
            instance.tx.halt(
                HaltCode::DbCorrupt,
                "LSA checksum audit failed",
            );
            return;
        }
    }

    // Refresh self-originated LSAs at LSRefreshTime.
    let now = instance.tx.now.get();
    for (lsdb_id, lse_id) in refresh {
        let Ok((lsdb_idx, lsdb)) = lsdb_get(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            lsdb_id,
        ) else {
            continue;
        };
        let Some((lse_idx, lse)) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)
        else {
            continue;
        };
        let due = lse
            .event_time
            .map(|t| now.sec.saturating_sub(t.sec) >= LSA_REFRESH_TIME as u32)
            .unwrap_or(true);
        if !due {
            continue;
        }

        let lse = &arenas.lsa_entries[lse_idx];
        Debug::LsaRefresh(&lse.data.hdr).log();

        // Originate new instance of the LSA.
        let lsa = Lsa::new(
            0,
            lse.data.hdr.options,
            lse.data.hdr.lsa_id,
            lse.data.hdr.adv_rtr,
            lse.data.hdr.seq_no.wrapping_add(1),
            lse.data.body.clone(),
        );
        originate(instance, arenas, lsdb_idx, lsa);
    }

    // Replenish the AS-external origination budget and retry deferred
    // originations.
    instance.state.ext_orig_count = 0;
    if std::mem::take(&mut instance.state.ext_pending) {
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
    }

    // Sweep MaxAge LSAs that are no longer needed.
    maxage_sweep(instance, arenas);

    // DoNotAge LSAs are only valid while all adjacent neighbors support the
    // DC capability.
    do_not_age_check(instance, arenas);
}

// Removes MaxAge LSAs that are no longer on any neighbor retransmission
// list, as long as no neighbor is undergoing database exchange.
fn maxage_sweep(instance: &mut InstanceUpView<'_>, arenas: &mut InstanceArenas) {
    // Skip discarding MaxAge LSAs if any of the router's neighbors are in
    // states Exchange or Loading.
    if arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    }) {
        return;
    }

    let mut lsdb_idxs = vec![LsdbIndex::As];
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        lsdb_idxs.push(LsdbIndex::Area(area_idx));
        for iface_idx in arenas.areas[area_idx].interfaces.indexes() {
            lsdb_idxs.push(LsdbIndex::Link(area_idx, iface_idx));
        }
    }

    for lsdb_idx in lsdb_idxs {
        // Get list of MaxAge LSAs that are no longer contained on any
        // neighbor LS retransmission lists.
        let (_, lsdb) = lsdb_index(
            &instance.state.lsdb,
            &arenas.areas,
            &arenas.interfaces,
            lsdb_idx,
        );
        let sweep = lsdb
            .maxage_lsas
            .iter()
            .copied()
            .filter(|lse_idx| {
                let lse = &arenas.lsa_entries[*lse_idx];
                !arenas.neighbors.iter().any(|(_, nbr)| {
                    nbr.lists
                        .ls_rxmt
                        .get(&lse.data.hdr.key())
                        .filter(|rxmt_lsa| Arc::ptr_eq(&lse.data, rxmt_lsa))
                        .is_some()
                })
            })
            .collect::<Vec<_>>();

        for lse_idx in sweep {
            let lsa_key = arenas.lsa_entries[lse_idx].data.hdr.key();
            let (_, lsdb) = lsdb_index_mut(
                &mut instance.state.lsdb,
                &mut arenas.areas,
                &mut arenas.interfaces,
                lsdb_idx,
            );

            // Delete the LSA, and originate a new instance when it's
            // wrapping its sequence number.
            let wrapping = lsdb.seqno_wrapping.remove(&lsa_key);
            delete_entry(
                lsdb,
                &mut instance.state.age_bins,
                &mut arenas.lsa_entries,
                lse_idx,
            );
            if let Some(lsa) = wrapping {
                let lsa = Lsa::new(
                    0,
                    lsa.hdr.options,
                    lsa.hdr.lsa_id,
                    lsa.hdr.adv_rtr,
                    LSA_INIT_SEQ_NO,
                    lsa.body.clone(),
                );
                originate(instance, arenas, lsdb_idx, lsa);
            }
        }
    }
}

// Flushes all DoNotAge LSAs once any adjacent neighbor lacks the DC
// capability.
fn do_not_age_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let non_dc = arenas.neighbors.iter().any(|(_, nbr)| {
        nbr.state >= nsm::State::Exchange
            && nbr
                .options
                .map(|options| !options.contains(Options::DC))
                .unwrap_or(false)
    });
    if !non_dc {
        return;
    }

    let mut idxs = vec![];
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| lse.data.hdr.do_not_age())
            .map(|(lse_idx, _)| (LsdbIndex::As, lse_idx)),
    );
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, lse)| lse.data.hdr.do_not_age())
                .map(|(lse_idx, _)| (LsdbIndex::Area(area_idx), lse_idx)),
        );
    }
    for (lsdb_idx, lse_idx) in idxs {
        flush(instance, arenas, lsdb_idx, lse_idx, LsaFlushReason::PrematureAging);
    }
}

// Removes an LSA entry from the LSDB and the aging structure.
pub(crate) fn delete_entry(
    lsdb: &mut crate::collections::Lsdb,
    age_bins: &mut AgeBins,
    lsa_entries: &mut Arena<LsaEntry>,
    lse_idx: LsaEntryIndex,
) {
    let lse = &lsa_entries[lse_idx];
    let key = (lse.lsdb_id, lse.id);
    if let Some(bin) = lse.agebin {
        age_bins.remove(bin, &key);
    }
    if let Some(bin) = lse.refresh_bin {
        age_bins.refresh_remove(bin, &key);
    }
    lsdb.delete(lsa_entries, lse_idx);
}

// Checks whether the LSA is self-originated.
fn lsa_is_self_originated(
    lsa: &Lsa,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
) -> bool {
    // 1) The LSA's Advertising Router is equal to the router's own Router
    // ID.
    if lsa.hdr.adv_rtr == router_id {
        return true;
    }

    // 2) The LSA is a network-LSA and its Link State ID is equal to one of
    // the router's own IP interface addresses.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && interfaces
            .iter()
            .any(|(_, iface)| iface.addr == lsa.hdr.lsa_id)
    {
        return true;
    }

    false
}

// A newly installed instance supersedes any older instance sitting on a
// retransmission list within its scope.
fn rxmt_lists_remove(
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    // The interfaces whose neighbors may hold the old instance.
    let mut ifaces: Vec<InterfaceIndex> = vec![];
    match lsdb_idx {
        LsdbIndex::Link(_, iface_idx) => ifaces.push(iface_idx),
        LsdbIndex::Area(area_idx) => {
            ifaces.extend(arenas.areas[area_idx].interfaces.indexes());
        }
        LsdbIndex::As => {
            for area in arenas.areas.iter() {
                ifaces.extend(area.interfaces.indexes());
            }
        }
    }

    let lsa_key = lsa.hdr.key();
    for iface_idx in ifaces {
        let iface = &arenas.interfaces[iface_idx];
        for nbr_idx in iface.state.neighbors.indexes() {
            let nbr = &mut arenas.neighbors[nbr_idx];
            let Some(listed) = nbr.lists.ls_rxmt.get(&lsa_key) else {
                continue;
            };
            if lsa_compare(&listed.hdr, &lsa.hdr) == std::cmp::Ordering::Less {
                nbr.lists.ls_rxmt.remove(&lsa_key);
                nbr.rxmt_lsupd_stop_check();
            }
        }
    }
}

// ===== LSA origination =====

// Originates or flushes the required LSAs in response to an LSA
// origination event.
pub(crate) fn lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::AreaStart { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::InterfaceStateChange { .. } => {
            // (Re)originate Router-LSA in all areas since the ABR status
            // might have changed.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceDrChange { area_id, iface_id }
        | LsaOriginateEvent::GrHelperExit { area_id, iface_id } => {
            // (Re)originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.adv_as_full())
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceCostChange { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::NeighborToFromFull { area_id, iface_id } => {
            // (Re)originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.adv_as_full())
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            // Check if the received self-originated LSA needs to be
            // reoriginated or flushed.
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
        LsaOriginateEvent::ExternalRoutesChange => {
            lsa_orig_all_external(instance, arenas);
        }
    };

    Ok(())
}

// (Re)originates the Router-LSA for the given area.
pub(crate) fn lsa_orig_router(
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area_options(area, OptionsLocation::Lsa);

    // Router-LSA's flags.
    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if !instance.config.external_routes.is_empty()
        && area.config.area_type == AreaType::Normal
    {
        flags.insert(LsaRouterFlags::E);
    }
    if area.state.transit_capability {
        flags.insert(LsaRouterFlags::V);
    }

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
    {
        // Add Type-3 (stub) links for interfaces in Loopback state.
        if iface.state.ism_state == ism::State::Loopback {
            links.push(LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                iface.addr,
                Ipv4Addr::BROADCAST,
                0,
            ));
            continue;
        }

        let cost = iface.config.cost;
        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                // Parallel point-to-point links to the same neighbor are
                // collapsed into a single link at the best cost, gated on at
                // least one full adjacency.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.adv_as_full())
                {
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        nbr.router_id,
                        iface.addr,
                        cost,
                    );
                    links.push(link);
                }

                // Add a Type-3 (stub) link for the interface subnet.
                if iface.config.if_type == InterfaceType::PointToMultipoint {
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::StubNetwork,
                        iface.addr,
                        Ipv4Addr::BROADCAST,
                        0,
                    ));
                } else {
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::StubNetwork,
                        iface.network().network(),
                        iface.network().mask(),
                        cost,
                    ));
                }
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let dr_full = (iface.state.ism_state == ism::State::Dr
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.adv_as_full()))
                    || iface
                        .state
                        .dr
                        .and_then(|net_id| {
                            iface
                                .state
                                .neighbors
                                .get_by_net_id(&arenas.neighbors, net_id)
                                .filter(|(_, nbr)| nbr.adv_as_full())
                        })
                        .is_some();
                if iface.state.ism_state != ism::State::Waiting && dr_full {
                    // Add a Type-2 (transit) link.
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::TransitNetwork,
                        iface.state.dr.unwrap().get(),
                        iface.addr,
                        cost,
                    );
                    links.push(link);
                } else {
                    // Add a Type-3 (stub) link.
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::StubNetwork,
                        iface.network().network(),
                        iface.network().mask(),
                        cost,
                    ));
                }
            }
            InterfaceType::VirtualLink => {
                // Add a Type-4 link per fully adjacent virtual neighbor.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.adv_as_full())
                {
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::VirtualLink,
                        nbr.router_id,
                        iface.addr,
                        cost,
                    );
                    links.push(link);
                }
            }
            InterfaceType::Loopback => {
                links.push(LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    iface.addr,
                    Ipv4Addr::BROADCAST,
                    0,
                ));
            }
        }
    }

    // Collapse parallel point-to-point links at the best cost.
    let (p2p, mut links): (Vec<_>, Vec<_>) = links
        .into_iter()
        .partition(|link| link.link_type == LsaRouterLinkType::PointToPoint);
    links.extend(
        p2p.into_iter()
            .map(|link| (link.link_id, link))
            .into_group_map()
            .into_iter()
            .filter_map(|(_, group)| {
                group.into_iter().min_by_key(|link| link.metric)
            }),
    );

    // Add Type-3 (stub) links for the configured host addresses.
    for host in area.hosts.iter() {
        links.push(LsaRouterLink::new(
            LsaRouterLinkType::StubNetwork,
            host.addr,
            Ipv4Addr::BROADCAST,
            host.cost,
        ));
    }

    // (Re)originate Router-LSA.
    let lsa_body = LsaBody::Router(LsaRouter { flags, links });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        options,
        instance.state.router_id,
        lsa_body,
    );
}

// (Re)originates the Network-LSA for the given interface.
pub(crate) fn lsa_orig_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area_options(area, OptionsLocation::Lsa);

    // The Link State ID for a network-LSA is the IP interface address of
    // the Designated Router.
    let lsa_id = iface.addr;

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.adv_as_full())
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    // (Re)originate Network-LSA.
    let lsa_body = LsaBody::Network(LsaNetwork {
        mask: iface.network().mask(),
        attached_rtrs,
    });
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, options, lsa_id, lsa_body);
}

fn lsa_flush_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    if let Some(lsa_key) = &iface.state.network_lsa_self {
        if let Some((_, lse)) = area.state.lsdb.get(&arenas.lsa_entries, lsa_key)
        {
            instance.tx.protocol_input.lsa_flush(
                LsdbId::Area(area.id),
                lse.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }
}

// Originates Type-3 Summary-LSA.
pub(crate) fn lsa_orig_inter_area_network(
    area: &Area,
    instance: &InstanceUpView<'_>,
    prefix: ipnetwork::Ipv4Network,
    metric: u32,
) -> u32 {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area_options(area, OptionsLocation::Lsa);

    let lsa_id = prefix.ip();

    // (Re)originate Type-3 Summary-LSA.
    let lsa_body = LsaBody::SummaryNetwork(LsaSummary {
        mask: prefix.mask(),
        metric,
    });
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, options, lsa_id, lsa_body);

    lsa_id.into()
}

// Originates Type-4 Summary-LSA.
pub(crate) fn lsa_orig_inter_area_router(
    area: &Area,
    instance: &InstanceUpView<'_>,
    router_id: Ipv4Addr,
    metric: u32,
) -> u32 {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area_options(area, OptionsLocation::Lsa);

    let lsa_id = router_id;

    // (Re)originate Type-4 Summary-LSA.
    let lsa_body = LsaBody::SummaryRouter(LsaSummary {
        mask: Ipv4Addr::BROADCAST,
        metric,
    });
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, options, lsa_id, lsa_body);

    lsa_id.into()
}

// (Re)originates AS-external-LSAs for all imported external routes, and
// flushes the ones whose import source has withdrawn.
pub(crate) fn lsa_orig_all_external(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let adv_rtr = instance.state.router_id;

    // Refuse new origination while in database overflow state.
    if !instance.state.overflow {
        for route in instance.config.external_routes.values() {
            lsa_orig_as_external(instance, route);
        }
    }

    // Flush self-originated AS-external-LSAs with no matching import.
    for (_, lse) in instance
        .state
        .lsdb
        .iter_by_type_advrtr(
            &arenas.lsa_entries,
            LsaTypeCode::AsExternal.into(),
            adv_rtr,
        )
        .filter(|(_, lse)| {
            !instance
                .config
                .external_routes
                .keys()
                .any(|prefix| prefix.ip() == lse.data.hdr.lsa_id)
        })
    {
        instance.tx.protocol_input.lsa_flush(
            LsdbId::As,
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

fn lsa_orig_as_external(
    instance: &InstanceUpView<'_>,
    route: &ExternalRouteCfg,
) {
    let lsa_body = LsaBody::AsExternal(crate::packet::lsa::LsaAsExternal {
        mask: route.prefix.mask(),
        flags: if route.type2 {
            crate::packet::lsa::LsaAsExternalFlags::E
        } else {
            crate::packet::lsa::LsaAsExternalFlags::empty()
        },
        metric: route.metric,
        fwd_addr: route.fwd_addr,
        tag: route.tag,
    });
    instance.tx.protocol_input.lsa_orig_check(
        LsdbId::As,
        Options::E,
        route.prefix.ip(),
        lsa_body,
    );
}

// Handles the receipt of a newer self-originated LSA: either take over the
// advertisement by reoriginating a newer instance, or flush it from the
// routing domain.
fn process_self_originated_lsa(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        lsdb_id,
    )?;
    let Some((_, lse)) = lsdb.get_by_id(&arenas.lsa_entries, lse_id) else {
        return Ok(());
    };
    let lsa = &lse.data;

    // Check LSA type.
    match lsa.hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Reoriginate Router-LSA.
            lsa_orig_router(area, instance, arenas);
        }
        Some(LsaTypeCode::Network) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Check if the router is still the DR for the network.
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| iface.addr == lsa.hdr.lsa_id)
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
                .filter(|_| lsa.hdr.adv_rtr == instance.state.router_id)
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter) => {
            // Do nothing. These LSAs will be either reoriginated or flushed
            // once the routing table is recomputed.
        }
        Some(LsaTypeCode::AsExternal) => {
            // Reoriginate if the import still exists, flush otherwise.
            if instance
                .config
                .external_routes
                .keys()
                .any(|prefix| prefix.ip() == lsa.hdr.lsa_id)
            {
                instance
                    .tx
                    .protocol_input
                    .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
            } else {
                flush = true;
            }
        }
        Some(
            LsaTypeCode::OpaqueLink
            | LsaTypeCode::OpaqueArea
            | LsaTypeCode::OpaqueAs,
        ) => {
            // Flush Opaque-LSA. The helper side of graceful restart never
            // originates Grace-LSAs of its own.
            flush = true;
        }
        None => {
            // Receiving self-originated LSAs of unknown type shouldn't
            // happen in practice. If it does, the LSA will be rejected
            // early on before it reaches this point.
            flush = true;
        }
    }

    if flush {
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            lse_id,
            LsaFlushReason::PrematureAging,
        );
    }

    Ok(())
}

// Returns the LSDB index corresponding to the provided LSA type.
pub(crate) fn lsdb_get_by_lsa_type(
    iface_idx: crate::collections::InterfaceIndex,
    area_idx: crate::collections::AreaIndex,
    lsa_type: crate::packet::lsa::LsaType,
) -> LsdbIndex {
    match lsa_type.scope() {
        LsaScope::Link => LsdbIndex::Link(area_idx, iface_idx),
        LsaScope::Area => LsdbIndex::Area(area_idx),
        LsaScope::As => LsdbIndex::As,
        LsaScope::Unknown => {
            unreachable!();
        }
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;
    use crate::packet::lsa::LsaHdr;
    use crate::packet::lsa::LsaType;

    fn hdr(age: u16, seq_no: u32, cksum: u16) -> LsaHdr {
        LsaHdr {
            age,
            options: Options::E,
            lsa_type: LsaType(1),
            lsa_id: Ipv4Addr::new(1, 1, 1, 1),
            adv_rtr: Ipv4Addr::new(1, 1, 1, 1),
            seq_no,
            cksum,
            length: 24,
        }
    }

    #[test]
    fn compare_by_seqno() {
        // Sequence numbers form a signed ordered set, so InitLSSeq is the
        // smallest valid value.
        let a = hdr(0, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(0, LSA_INIT_SEQ_NO + 1, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Less);
        assert_eq!(lsa_compare(&b, &a), Ordering::Greater);

        let c = hdr(0, LSA_MAX_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &c), Ordering::Less);
    }

    #[test]
    fn compare_by_cksum_and_age() {
        // Equal sequence number: the larger checksum wins.
        let a = hdr(0, LSA_INIT_SEQ_NO, 0x2222);
        let b = hdr(0, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);

        // Equal checksum: MaxAge wins.
        let a = hdr(LSA_MAX_AGE, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(10, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);

        // Ages differing by more than MaxAgeDiff: the younger wins.
        let a = hdr(0, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(LSA_MAX_AGE_DIFF + 10, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);

        // Ages within MaxAgeDiff: same instance.
        let a = hdr(0, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(100, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn age_bins_rotation() {
        let mut bins = AgeBins::default();
        let key = (LsdbId::As, 1);

        // An LSA received with age zero expires after MaxAge ticks.
        bins.insert(key, 0, false);
        for tick in 1..=(LSA_MAX_AGE as usize) {
            let (expired, _, _) = bins.advance();
            if tick < LSA_MAX_AGE as usize {
                assert!(expired.is_empty(), "early expiry at tick {tick}");
            } else {
                assert_eq!(expired, vec![key]);
            }
        }
    }

    #[test]
    fn age_bins_received_age() {
        let mut bins = AgeBins::default();
        let key = (LsdbId::As, 7);

        // An LSA received at age 3000 expires after 600 ticks.
        bins.insert(key, 3000, false);
        for _ in 0..599 {
            let (expired, _, _) = bins.advance();
            assert!(expired.is_empty());
        }
        let (expired, _, _) = bins.advance();
        assert_eq!(expired, vec![key]);
    }

    #[test]
    fn age_bins_checksum_audit() {
        let mut bins = AgeBins::default();
        let key = (LsdbId::As, 3);

        bins.insert(key, 0, false);
        for tick in 1..=(LSA_CHECK_AGE as usize) {
            let (_, audit, _) = bins.advance();
            if tick < LSA_CHECK_AGE as usize {
                assert!(audit.is_empty(), "early audit at tick {tick}");
            } else {
                assert_eq!(audit, vec![key]);
            }
        }
    }

    #[test]
    fn seqno_wrap() {
        use std::cell::{Cell, RefCell};

        use crate::config::InstanceCfg;
        use crate::instance::{InstanceArenas, InstanceState, InstanceTx, InstanceUpView};
        use crate::packet::lsa::LsaAsExternal;
        use crate::tasks::TimerQueue;

        let config = InstanceCfg::default();
        let tx = InstanceTx {
            protocol_input: Default::default(),
            net: Default::default(),
            sb: Default::default(),
            timers: RefCell::new(TimerQueue::new()),
            now: Cell::new(Etime::new(0, 0)),
        };
        let mut state = InstanceState {
            router_id: Ipv4Addr::new(1, 1, 1, 1),
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
        };
        let mut arenas = InstanceArenas::default();
        let mut instance = InstanceUpView {
            config: &config,
            state: &mut state,
            tx: &tx,
        };

        let body = LsaBody::AsExternal(LsaAsExternal {
            mask: Ipv4Addr::new(255, 255, 255, 0),
            flags: Default::default(),
            metric: 20,
            fwd_addr: None,
            tag: 0,
        });
        let lsa_id = Ipv4Addr::new(10, 1, 0, 0);
        let adv_rtr = Ipv4Addr::new(1, 1, 1, 1);
        let lsa_key =
            LsaKey::new(LsaTypeCode::AsExternal.into(), adv_rtr, lsa_id);

        // Originate at the maximum sequence number.
        let lsa = Lsa::new(
            0,
            Options::E,
            lsa_id,
            adv_rtr,
            LSA_MAX_SEQ_NO,
            body.clone(),
        );
        originate(&mut instance, &mut arenas, LsdbIndex::As, lsa);

        // The next instance cannot increment the sequence number; the
        // current instance must be prematurely aged first.
        let lsa = Lsa::new(
            0,
            Options::E,
            lsa_id,
            adv_rtr,
            LSA_MAX_SEQ_NO.wrapping_add(1),
            body.clone(),
        );
        originate(&mut instance, &mut arenas, LsdbIndex::As, lsa);

        let (_, lse) = instance
            .state
            .lsdb
            .get(&arenas.lsa_entries, &lsa_key)
            .unwrap();
        assert!(lse.data.hdr.is_maxage());
        assert_eq!(lse.data.hdr.seq_no, LSA_MAX_SEQ_NO);

        // With no neighbor holding the flush on a retransmission list, the
        // sweep deletes the MaxAge instance and reoriginates at the
        // initial sequence number.
        maxage_sweep(&mut instance, &mut arenas);

        let (_, lse) = instance
            .state
            .lsdb
            .get(&arenas.lsa_entries, &lsa_key)
            .unwrap();
        assert!(!lse.data.hdr.is_maxage());
        assert_eq!(lse.data.hdr.seq_no, LSA_INIT_SEQ_NO);
    }

    #[test]
    fn age_bins_do_not_age() {
        let mut bins = AgeBins::default();
        let key = (LsdbId::As, 9);

        // DoNotAge LSAs never expire but are still audited once per aging
        // cycle.
        bins.insert(key, 200, true);
        let mut audited = 0;
        for _ in 0..AGE_BINS {
            let (expired, audit, _) = bins.advance();
            assert!(expired.is_empty());
            if audit.contains(&key) {
                audited += 1;
            }
        }
        assert_eq!(audited, 1);
    }
}
