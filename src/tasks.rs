//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Timer support.
//
// All protocol timers live in a single queue layered over the priority
// queue: the cost tuple encodes the firing time (seconds, milliseconds)
// plus a monotonic sequence so that timers with equal deadlines fire in
// insertion order. Nothing here blocks; the host drives the queue through
// `Ospf::tick` and learns how long it may sleep from `Ospf::timeout`.
//
// Timer handles disarm their queue entry when dropped, so owning
// structures cancel a timer by overwriting an `Option` field.
//

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use derive_new::new;

use crate::area::Area;
use crate::collections::{AreaId, InterfaceId, LsdbId, NeighborId};
use crate::collections::priq::{PriQ, PriqCost};
use crate::instance::InstanceTx;
use crate::interface::Interface;
use crate::neighbor::{Neighbor, RxmtPacketType};
use crate::packet::lsa::LsaKey;

pub const MSECS_PER_SEC: u32 = 1000;

// Elapsed time since the instance started, as reported by the host.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd, new)]
pub struct Etime {
    pub sec: u32,
    pub msec: u16,
}

// What to do when a timer fires.
#[derive(Clone, Debug)]
pub enum TimerAction {
    IsmWaitTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    HelloInterval {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NbmaPollInterval {
        area_id: AreaId,
        iface_id: InterfaceId,
        addr: Ipv4Addr,
    },
    NsmInactivityTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    PacketRxmtInterval {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        packet_type: RxmtPacketType,
    },
    DbDescFreeTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    LsUpdateTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    DelayedAckTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    LsaOrigDelayedTimer {
        lsdb_id: LsdbId,
        lsa_key: LsaKey,
    },
    GracePeriodTimer {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    DbAgeTick,
    OverflowExitTimer,
    ShutdownTimer,
}

#[derive(Debug)]
enum TimerKind {
    SingleShot,
    Interval { period_ms: u32 },
}

#[derive(Debug)]
struct TimerEntry {
    token: u64,
    armed: Rc<Cell<bool>>,
    kind: TimerKind,
    fire: Etime,
    period_ms: u32,
    action: TimerAction,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    priq: PriQ<TimerEntry>,
    tokens: HashMap<u64, u32>,
    next_token: u64,
    seq: u32,
}

// Handle of a single-shot timer. Dropping the handle stops the timer.
#[derive(Debug)]
pub struct TimeoutTask {
    token: u64,
    armed: Rc<Cell<bool>>,
}

// Handle of an interval timer. Dropping the handle stops the timer.
#[derive(Debug)]
pub struct IntervalTask {
    #[allow(dead_code)]
    token: u64,
    armed: Rc<Cell<bool>>,
}

// ===== impl Etime =====

impl Etime {
    pub fn add_ms(self, ms: u32) -> Etime {
        let total = self.msec as u32 + ms;
        Etime {
            sec: self.sec + total / MSECS_PER_SEC,
            msec: (total % MSECS_PER_SEC) as u16,
        }
    }

    // Difference in milliseconds, `self - other`.
    pub fn diff_ms(self, other: Etime) -> i64 {
        (self.sec as i64 - other.sec as i64) * MSECS_PER_SEC as i64
            + (self.msec as i64 - other.msec as i64)
    }
}

// ===== impl TimerQueue =====

impl TimerQueue {
    pub fn new() -> TimerQueue {
        TimerQueue::default()
    }

    fn enqueue(&mut self, entry: TimerEntry) {
        let token = entry.token;
        let cost = PriqCost::new(
            entry.fire.sec,
            entry.fire.msec,
            0,
            u32::MAX - self.seq,
        );
        self.seq = self.seq.wrapping_add(1);
        let id = self.priq.add(cost, entry);
        self.tokens.insert(token, id);
    }

    // Starts a single-shot timer. Timers of one second or longer are
    // jittered by plus or minus half a second.
    pub fn timeout_task(
        &mut self,
        now: Etime,
        delay_ms: u32,
        action: TimerAction,
    ) -> TimeoutTask {
        let mut ms = delay_ms;
        #[cfg(not(feature = "deterministic"))]
        if ms >= 1000 {
            ms = ms + random_period(1000) - 500;
        }

        let token = self.next_token;
        self.next_token += 1;
        let armed = Rc::new(Cell::new(true));
        self.enqueue(TimerEntry {
            token,
            armed: armed.clone(),
            kind: TimerKind::SingleShot,
            fire: now.add_ms(ms),
            period_ms: delay_ms,
            action,
        });

        TimeoutTask { token, armed }
    }

    // Starts an interval timer. The first interval is randomized to spread
    // periodic traffic; subsequent firings requeue at the exact period.
    pub fn interval_task(
        &mut self,
        now: Etime,
        period_ms: u32,
        action: TimerAction,
    ) -> IntervalTask {
        #[cfg(not(feature = "deterministic"))]
        let first_ms = random_period(period_ms) + 1;
        #[cfg(feature = "deterministic")]
        let first_ms = period_ms;

        let token = self.next_token;
        self.next_token += 1;
        let armed = Rc::new(Cell::new(true));
        self.enqueue(TimerEntry {
            token,
            armed: armed.clone(),
            kind: TimerKind::Interval { period_ms },
            fire: now.add_ms(first_ms),
            period_ms,
            action,
        });

        IntervalTask { token, armed }
    }

    // Restarts a running single-shot timer, optionally with a new delay.
    // No-op if the timer already fired or was stopped.
    pub fn reset(
        &mut self,
        task: &TimeoutTask,
        now: Etime,
        delay_ms: Option<u32>,
    ) {
        if !task.armed.get() {
            return;
        }
        let Some(id) = self.tokens.remove(&task.token) else {
            return;
        };
        let (_, mut entry) = self.priq.delete(id).unwrap();
        if let Some(delay_ms) = delay_ms {
            entry.period_ms = delay_ms;
        }
        entry.fire = now.add_ms(entry.period_ms);
        self.enqueue(entry);
    }

    // Stops a timer through its queue entry. Idempotent; dropping the
    // handle has the same effect, with the dead entry discarded lazily.
    pub fn stop(&mut self, task: &TimeoutTask) {
        task.armed.set(false);
        if let Some(id) = self.tokens.remove(&task.token) {
            self.priq.delete(id);
        }
    }

    // Pops the next timer with a deadline at or before `now`, requeueing
    // interval timers at `previous fire time + period`.
    pub fn next_due(&mut self, now: Etime) -> Option<TimerAction> {
        loop {
            let (id, cost, _) = self.priq.peek()?;
            let fire = Etime::new(cost.cost0, cost.cost1);
            if fire > now {
                return None;
            }

            let (_, entry) = self.priq.delete(id).unwrap();
            self.tokens.remove(&entry.token);
            if !entry.armed.get() {
                continue;
            }

            match entry.kind {
                TimerKind::SingleShot => {
                    entry.armed.set(false);
                    return Some(entry.action);
                }
                TimerKind::Interval { period_ms } => {
                    // Requeue first so the action may stop the timer.
                    let action = entry.action.clone();
                    let mut entry = entry;
                    entry.fire = entry.fire.add_ms(period_ms);
                    self.enqueue(entry);
                    return Some(action);
                }
            }
        }
    }

    // Milliseconds until the next armed timer fires, or `None` when idle.
    pub fn timeout(&mut self, now: Etime) -> Option<i64> {
        loop {
            let (id, cost, entry) = self.priq.peek()?;
            if !entry.armed.get() {
                self.priq.delete(id);
                continue;
            }
            let fire = Etime::new(cost.cost0, cost.cost1);
            return Some(fire.diff_ms(now).max(0));
        }
    }
}

impl Drop for TimeoutTask {
    fn drop(&mut self) {
        self.armed.set(false);
    }
}

impl Drop for IntervalTask {
    fn drop(&mut self) {
        self.armed.set(false);
    }
}

// ===== helper functions =====

// Random number of milliseconds in [0, period), used to jitter timers.
#[cfg(not(feature = "deterministic"))]
fn random_period(period_ms: u32) -> u32 {
    use rand::Rng;

    if period_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..period_ms)
}

// ===== timer constructors =====

pub(crate) fn ism_wait_timer(
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        iface.config.dead_interval as u32 * MSECS_PER_SEC,
        TimerAction::IsmWaitTimer {
            area_id: area.id,
            iface_id: iface.id,
        },
    )
}

pub(crate) fn hello_interval(
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
    interval: u16,
) -> IntervalTask {
    tx.timers.borrow_mut().interval_task(
        tx.now.get(),
        interval as u32 * MSECS_PER_SEC,
        TimerAction::HelloInterval {
            area_id: area.id,
            iface_id: iface.id,
        },
    )
}

pub(crate) fn nbma_poll_interval(
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
    addr: Ipv4Addr,
    poll_interval: u16,
) -> IntervalTask {
    tx.timers.borrow_mut().interval_task(
        tx.now.get(),
        poll_interval as u32 * MSECS_PER_SEC,
        TimerAction::NbmaPollInterval {
            area_id: area.id,
            iface_id: iface.id,
            addr,
        },
    )
}

pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        iface.config.dead_interval as u32 * MSECS_PER_SEC,
        TimerAction::NsmInactivityTimer {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: nbr.id,
        },
    )
}

pub(crate) fn packet_rxmt_interval(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
    packet_type: RxmtPacketType,
) -> IntervalTask {
    tx.timers.borrow_mut().interval_task(
        tx.now.get(),
        iface.config.rxmt_interval as u32 * MSECS_PER_SEC,
        TimerAction::PacketRxmtInterval {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: nbr.id,
            packet_type,
        },
    )
}

pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        iface.config.dead_interval as u32 * MSECS_PER_SEC,
        TimerAction::DbDescFreeTimer {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: nbr.id,
        },
    )
}

pub(crate) fn ls_update_timer(
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        100,
        TimerAction::LsUpdateTimer {
            area_id: area.id,
            iface_id: iface.id,
        },
    )
}

pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
) -> TimeoutTask {
    // Delayed acks must go out within RxmtInterval of the flood.
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        iface.config.rxmt_interval as u32 * MSECS_PER_SEC / 2,
        TimerAction::DelayedAckTimer {
            area_id: area.id,
            iface_id: iface.id,
        },
    )
}

pub(crate) fn lsa_orig_delayed_timer(
    tx: &InstanceTx,
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
    delay_ms: u32,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        delay_ms,
        TimerAction::LsaOrigDelayedTimer { lsdb_id, lsa_key },
    )
}

pub(crate) fn grace_period_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    tx: &InstanceTx,
    grace_period: u32,
) -> TimeoutTask {
    tx.timers.borrow_mut().timeout_task(
        tx.now.get(),
        grace_period * MSECS_PER_SEC,
        TimerAction::GracePeriodTimer {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: nbr.id,
        },
    )
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_in_deadline_order() {
        let mut timers = TimerQueue::new();
        let now = Etime::new(0, 0);

        let _t1 = timers.timeout_task(now, 500, TimerAction::DbAgeTick);
        let _t2 = timers.timeout_task(now, 200, TimerAction::ShutdownTimer);
        let _t3 = timers.timeout_task(now, 200, TimerAction::OverflowExitTimer);

        assert_eq!(timers.timeout(now), Some(200));
        assert!(timers.next_due(Etime::new(0, 100)).is_none());

        // Equal deadlines fire in insertion order.
        let now = Etime::new(0, 600);
        assert!(matches!(
            timers.next_due(now),
            Some(TimerAction::ShutdownTimer)
        ));
        assert!(matches!(
            timers.next_due(now),
            Some(TimerAction::OverflowExitTimer)
        ));
        assert!(matches!(timers.next_due(now), Some(TimerAction::DbAgeTick)));
        assert!(timers.next_due(now).is_none());
        assert_eq!(timers.timeout(now), None);
    }

    #[test]
    fn drop_stops_timer() {
        let mut timers = TimerQueue::new();
        let now = Etime::new(0, 0);

        let t1 = timers.timeout_task(now, 100, TimerAction::DbAgeTick);
        drop(t1);
        assert!(timers.next_due(Etime::new(1, 0)).is_none());

        // Explicit stop is idempotent.
        let t2 = timers.timeout_task(now, 100, TimerAction::DbAgeTick);
        timers.stop(&t2);
        timers.stop(&t2);
        assert!(timers.next_due(Etime::new(1, 0)).is_none());
    }

    #[test]
    fn interval_requeues_at_exact_period() {
        let mut timers = TimerQueue::new();
        let now = Etime::new(0, 0);

        let task = timers.interval_task(now, 1000, TimerAction::DbAgeTick);
        let first = timers.timeout(now).unwrap();
        assert!(first >= 1 && first <= 1000);

        // Fire a few periods late in one tick; the timer catches up at the
        // original phase.
        let later = Etime::new(3, 500);
        let mut fired = 0;
        while timers.next_due(later).is_some() {
            fired += 1;
        }
        assert!(fired >= 3);

        drop(task);
        assert!(timers.next_due(Etime::new(100, 0)).is_none());
    }

    #[test]
    fn reset_restarts_single_shot() {
        let mut timers = TimerQueue::new();
        let now = Etime::new(0, 0);

        let task = timers.timeout_task(now, 500, TimerAction::DbAgeTick);
        timers.reset(&task, Etime::new(0, 400), None);

        // The original deadline no longer fires.
        assert!(timers.next_due(Etime::new(0, 600)).is_none());
        assert!(timers.next_due(Etime::new(0, 900)).is_some());

        // Resetting a fired timer is a no-op.
        timers.reset(&task, Etime::new(1, 0), Some(100));
        assert!(timers.next_due(Etime::new(10, 0)).is_none());
    }
}
