//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// IP-level packet validation and addressing.
//

use std::net::Ipv4Addr;

use bytes::{Buf, Bytes};
use derive_new::new;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::packet::error::{DecodeError, DecodeResult};
use crate::util::BytesExt;

// IP protocol numbers.
pub const IP_PROTO_OSPF: u8 = 89;
pub const IP_PROTO_IGMP: u8 = 2;

// Minimum IPv4 header length.
const IP_HDR_MIN_LENGTH: u16 = 20;

// OSPF multicast groups.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Destination of an outgoing packet: a physical interface plus one or more
// IP destinations (multicast groups or unicast neighbors).
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SendDestination {
    pub ifindex: u32,
    pub addrs: SmallVec<[Ipv4Addr; 4]>,
}

// Decoded IPv4 packet.
#[derive(Debug)]
pub struct IpPacketInfo {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
    pub payload: Bytes,
}

// ===== impl MulticastAddr =====

impl MulticastAddr {
    pub fn addr(&self) -> Ipv4Addr {
        match self {
            MulticastAddr::AllSpfRtrs => Ipv4Addr::new(224, 0, 0, 5),
            MulticastAddr::AllDrRtrs => Ipv4Addr::new(224, 0, 0, 6),
        }
    }
}

// ===== global functions =====

// Validates the IPv4 header of a received packet and extracts the fields
// the dispatching logic needs. The host is responsible for verifying the
// IP header checksum.
pub(crate) fn ip_decode(mut buf: Bytes) -> DecodeResult<IpPacketInfo> {
    if buf.remaining() < IP_HDR_MIN_LENGTH as usize {
        return Err(DecodeError::IncompletePacket);
    }

    // Parse version and header length.
    let ver_ihl = buf.try_get_u8()?;
    if ver_ihl >> 4 != 4 {
        return Err(DecodeError::InvalidVersion(ver_ihl >> 4));
    }
    let hdr_len = (ver_ihl & 0x0f) as u16 * 4;
    if hdr_len < IP_HDR_MIN_LENGTH {
        return Err(DecodeError::InvalidIpHdrLength(hdr_len));
    }

    // Parse total length.
    let _tos = buf.try_get_u8()?;
    let total_len = buf.try_get_u16()?;
    if total_len < hdr_len {
        return Err(DecodeError::InvalidLength(total_len));
    }

    // Skip identification, flags/fragment offset and TTL.
    let _ = buf.try_get_u32()?;
    let _ttl = buf.try_get_u8()?;

    // Parse protocol.
    let proto = buf.try_get_u8()?;

    // Skip header checksum.
    let _ = buf.try_get_u16()?;

    // Parse addresses.
    let src = buf.try_get_ipv4()?;
    let dst = buf.try_get_ipv4()?;

    // Skip IP options.
    let options_len = (hdr_len - IP_HDR_MIN_LENGTH) as usize;
    if buf.remaining() < options_len {
        return Err(DecodeError::IncompletePacket);
    }
    buf.advance(options_len);

    // Extract the payload.
    let payload_len = (total_len - hdr_len) as usize;
    if buf.remaining() < payload_len {
        return Err(DecodeError::IncompletePacket);
    }
    let payload = buf.copy_to_bytes(payload_len);

    Ok(IpPacketInfo {
        src,
        dst,
        proto,
        payload,
    })
}
