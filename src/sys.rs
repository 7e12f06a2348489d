//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Host interface.
//
// The protocol core performs no I/O of its own: packet transmission,
// kernel route updates, multicast group management and the clock are all
// delegated to the host through this trait. Calls are expected to return
// promptly or buffer internally.
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::route::Nexthop;
use crate::tasks::Etime;

// Reasons for a halt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HaltCode {
    // LSDB checksum audit failure.
    DbCorrupt,
    // Inconsistent cost discovered during the routing calculation.
    RtCost,
    // Configuration conflict on LS type.
    LsType,
    // Orderly shutdown completed.
    Shutdown,
}

// Operations the protocol core requires from the host.
pub trait SysCalls {
    // Time elapsed since the instance started.
    fn elapsed_since_start(&self) -> Etime;

    // Sends a ready-made IP payload (an OSPF packet) on the given physical
    // interface.
    fn send_packet(
        &mut self,
        ifindex: u32,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        data: &[u8],
    );

    // Adds or replaces a kernel route. Reject routes black-hole matching
    // traffic instead of forwarding it.
    fn route_add(
        &mut self,
        prefix: Ipv4Network,
        nexthops: &[Nexthop],
        reject: bool,
    );

    // Deletes a kernel route.
    fn route_delete(&mut self, prefix: Ipv4Network);

    // Multicast group management.
    fn join_multicast(&mut self, ifindex: u32, group: Ipv4Addr);
    fn leave_multicast(&mut self, ifindex: u32, group: Ipv4Addr);

    // Physical interface management.
    fn phy_open(&mut self, ifindex: u32);
    fn phy_close(&mut self, ifindex: u32);

    // Fatal error; the process is expected to terminate.
    fn halt(&mut self, code: HaltCode, reason: &str);
}
