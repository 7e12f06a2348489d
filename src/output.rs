//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Outgoing packet descriptors.
//
// The senders live with the objects that own the pending data: hellos,
// delayed acks and the interface update list on `Interface`, everything
// adjacency-related on `Neighbor`. This module holds the common pieces:
// the message handed to the host, the per-interface size budget and the
// update-packet packing.
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use smallvec::SmallVec;

use crate::interface::Interface;
use crate::lsdb;
use crate::network::SendDestination;
use crate::packet::auth::AuthMethod;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{DbDesc, LsUpdate, Packet, PacketHdr};
use crate::tasks::Etime;

// Outgoing packet, ready for encoding and transmission.
#[derive(Clone, Debug)]
pub struct NetTxPacketMsg {
    pub packet: Packet,
    pub src: Ipv4Addr,
    pub dst: SendDestination,
    pub auth: Option<AuthCtx>,
}

// Authentication material attached to an outgoing packet.
#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub method: AuthMethod,
    pub seqno: Arc<AtomicU32>,
}

// ===== global functions =====

// Builds the transmission descriptor for a packet leaving the given
// interface, attaching its authentication material.
pub(crate) fn build_msg(
    iface: &Interface,
    packet: Packet,
    dst: SmallVec<[Ipv4Addr; 4]>,
) -> NetTxPacketMsg {
    let auth = iface.state.auth.clone().map(|method| AuthCtx {
        method,
        seqno: iface.state.auth_seqno.clone(),
    });
    NetTxPacketMsg {
        packet,
        src: iface.addr,
        dst: SendDestination::new(iface.config.ifindex, dst),
        auth,
    }
}

// The largest OSPF packet that fits the interface without IP
// fragmentation.
pub(crate) fn max_packet_size(iface: &Interface) -> u16 {
    // IPv4 header with no options.
    const IPV4_HDR_SIZE: u16 = 20;

    iface
        .config
        .mtu
        .saturating_sub(IPV4_HDR_SIZE)
        .max(PacketHdr::LENGTH + DbDesc::BASE_LENGTH + LsaHdr::LENGTH)
}

// Packs the given LSAs into as few Link State Update packets as the size
// budget allows, stamping each LSA's transmitted age. An oversized LSA
// still goes out alone; IP fragmentation is then unavoidable.
pub(crate) fn lsupd_packets(
    router_id: Ipv4Addr,
    area_id: Ipv4Addr,
    list: &mut BTreeMap<LsaKey, Arc<Lsa>>,
    max_size: u16,
    now: Etime,
    transmit_delay: u16,
) -> Vec<Packet> {
    let budget = max_size - PacketHdr::LENGTH - LsUpdate::BASE_LENGTH;
    let mut packets = vec![];
    let mut lsas: Vec<Lsa> = vec![];
    let mut used = 0;

    let flush = |lsas: &mut Vec<Lsa>, packets: &mut Vec<Packet>| {
        if lsas.is_empty() {
            return;
        }
        let hdr = PacketHdr::new(
            crate::packet::PacketType::LsUpdate,
            router_id,
            area_id,
        );
        packets.push(Packet::LsUpdate(LsUpdate {
            hdr,
            lsas: std::mem::take(lsas),
        }));
    };

    while let Some((_, lsa)) = list.pop_first() {
        if !lsas.is_empty() && used + lsa.hdr.length > budget {
            flush(&mut lsas, &mut packets);
            used = 0;
        }
        used += lsa.hdr.length;

        // The transmitted age includes the configured transmission delay.
        let mut lsa = (*lsa).clone();
        let age =
            std::cmp::min(lsa.age(now) + transmit_delay, lsdb::LSA_MAX_AGE);
        lsa.set_age(age);
        lsas.push(lsa);
    }
    flush(&mut lsas, &mut packets);

    packets
}
