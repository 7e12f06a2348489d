//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// TLV encoding used by the Grace Opaque LSA.
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::util::{BytesExt, BytesMutExt};

// TLV header size.
pub const TLV_HDR_SIZE: u16 = 4;

// Grace-LSA top level TLV types.
//
// IANA registry:
// https://www.iana.org/assignments/ospf-parameters/ospf-parameters.xhtml#grace-lsa-tlv
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GraceTlvType {
    GracePeriod = 1,
    GrReason = 2,
    InterfaceAddr = 3,
}

// Grace-LSA's Grace Period TLV.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct GracePeriodTlv(u32);

// Grace-LSA's Graceful Restart reason TLV.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct GrReasonTlv(u8);

// Grace-LSA's IP interface address TLV.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct GrInterfaceAddrTlv(Ipv4Addr);

// Graceful Restart reason value.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GrReason {
    Unknown = 0,
    SoftwareRestart = 1,
    SoftwareUpgrade = 2,
    ControlProcessorSwitchover = 3,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct UnknownTlv {
    pub tlv_type: u16,
    pub length: u16,
    pub value: Bytes,
}

// ===== impl GracePeriodTlv =====

impl GracePeriodTlv {
    pub(crate) fn decode(tlv_len: u16, buf: &mut Bytes) -> DecodeResult<Self> {
        if tlv_len != 4 {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }

        let period = buf.try_get_u32()?;

        Ok(GracePeriodTlv(period))
    }

    pub(crate) fn encode(&self, tlv_type: u16, buf: &mut BytesMut) {
        let start_pos = tlv_encode_start(buf, tlv_type);
        buf.put_u32(self.0);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn get(&self) -> u32 {
        self.0
    }
}

// ===== impl GrReasonTlv =====

impl GrReasonTlv {
    pub(crate) fn decode(tlv_len: u16, buf: &mut Bytes) -> DecodeResult<Self> {
        if tlv_len != 1 {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }

        let reason = buf.try_get_u8()?;

        Ok(GrReasonTlv(reason))
    }

    pub(crate) fn encode(&self, tlv_type: u16, buf: &mut BytesMut) {
        let start_pos = tlv_encode_start(buf, tlv_type);
        buf.put_u8(self.0);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn get(&self) -> u8 {
        self.0
    }
}

// ===== impl GrInterfaceAddrTlv =====

impl GrInterfaceAddrTlv {
    pub(crate) fn decode(tlv_len: u16, buf: &mut Bytes) -> DecodeResult<Self> {
        if tlv_len != 4 {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }

        let addr = buf.try_get_ipv4()?;

        Ok(GrInterfaceAddrTlv(addr))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, GraceTlvType::InterfaceAddr as u16);
        buf.put_ipv4(&self.0);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

// ===== global functions =====

// The TLV length is padded to 4-byte alignment.
pub(crate) fn tlv_wire_len(tlv_len: u16) -> u16 {
    (tlv_len + 3) & !0x03
}

pub(crate) fn tlv_encode_start(buf: &mut BytesMut, tlv_type: u16) -> usize {
    let start_pos = buf.len();
    buf.put_u16(tlv_type);
    // The TLV length will be rewritten later.
    buf.put_u16(0);
    start_pos
}

pub(crate) fn tlv_encode_end(buf: &mut BytesMut, start_pos: usize) {
    let tlv_len = (buf.len() - start_pos) as u16 - TLV_HDR_SIZE;

    // Rewrite TLV length.
    buf[start_pos + 2..start_pos + 4].copy_from_slice(&tlv_len.to_be_bytes());

    // Add padding if necessary.
    let tlv_wlen = tlv_wire_len(tlv_len);
    if tlv_wlen != tlv_len {
        buf.put_bytes(0, (tlv_wlen - tlv_len) as usize);
    }
}
