//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// LSA types and codecs.
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::lsdb::{
    LSA_DO_NOT_AGE, LSA_MAX_AGE, LSA_RESERVED_SEQ_NO,
};
use crate::packet::Options;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};
use crate::packet::tlv::{
    GrInterfaceAddrTlv, GrReason, GrReasonTlv, GracePeriodTlv, GraceTlvType,
    TLV_HDR_SIZE, UnknownTlv, tlv_wire_len,
};
use crate::tasks::Etime;
use crate::util::{BytesExt, BytesMutExt, TLS_BUF};

// OSPF LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lsa {
    // LSA raw bytes.
    #[cfg_attr(feature = "testing", serde(default, skip_serializing))]
    pub raw: Bytes,
    // LSA header.
    pub hdr: LsaHdr,
    // LSA body.
    pub body: LsaBody,
    // Time the LSA was created or received. When combined with the Age
    // field in the LSA header, the actual LSA age can be determined.
    #[serde(skip)]
    pub base_time: Option<Etime>,
}

// OSPF LSA key. It serves both as a global LSA identifier and as a key to
// store LSAs in an LSDB.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    // LSA type.
    pub lsa_type: LsaType,
    // LSA advertising router.
    pub adv_rtr: Ipv4Addr,
    // LSA ID.
    pub lsa_id: Ipv4Addr,
}

// OSPF LSA scope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaScope {
    Link,
    Area,
    As,
    Unknown,
}

// OSPFv2 LSA type.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u8);

// OSPFv2 LSA type code.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-5
#[derive(Clone, Copy, Debug, Eq, Ord, FromPrimitive, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaTypeCode {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryRouter = 4,
    AsExternal = 5,
    OpaqueLink = 9,
    OpaqueArea = 10,
    OpaqueAs = 11,
}

//
// OSPFv2 LSA header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            LS age             |    Options    |    LS type    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Link State ID                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Advertising Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     LS sequence number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         LS checksum           |             length            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    #[cfg_attr(
        feature = "testing",
        serde(default, skip_serializing_if = "serde_lsa_age_filter")
    )]
    pub age: u16,
    pub options: Options,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    #[cfg_attr(feature = "testing", serde(skip_serializing))]
    pub seq_no: u32,
    #[cfg_attr(feature = "testing", serde(default, skip_serializing))]
    pub cksum: u16,
    pub length: u16,
}

// OSPFv2 LSA body.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    Network(LsaNetwork),
    SummaryNetwork(LsaSummary),
    SummaryRouter(LsaSummary),
    AsExternal(LsaAsExternal),
    OpaqueLink(LsaOpaque),
    OpaqueArea(LsaOpaque),
    OpaqueAs(LsaOpaque),
    Unknown(LsaUnknown),
}

//
// OSPFv2 Router-LSA.
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |    0    |V|E|B|        0      |            # links            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Link ID                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Link Data                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Type      |     # TOS     |            metric             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

// OSPFv2 Router Properties Registry.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaRouterFlags: u8 {
        const B = 0x01;
        const E = 0x02;
        const V = 0x04;
    }
}

// OSPFv2 Router LSA Link Type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 0x01,
    TransitNetwork = 0x02,
    StubNetwork = 0x03,
    VirtualLink = 0x04,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

//
// OSPFv2 Network-LSA.
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Network Mask                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Attached Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaNetwork {
    pub mask: Ipv4Addr,
    pub attached_rtrs: BTreeSet<Ipv4Addr>,
}

//
// OSPFv2 Summary-LSA (types 3 and 4).
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Network Mask                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |      0        |                  metric                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaSummary {
    pub mask: Ipv4Addr,
    pub metric: u32,
}

//
// OSPFv2 AS-External-LSA.
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Network Mask                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |E|     0       |                  metric                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      Forwarding address                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      External Route Tag                       |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaAsExternal {
    pub mask: Ipv4Addr,
    pub flags: LsaAsExternalFlags,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaAsExternalFlags: u8 {
        const E = 0x80;
    }
}

// OSPFv2 Opaque LSA types.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaOpaqueType {
    Grace = 3,
}

// OSPFv2 Opaque LSA.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaOpaque {
    Grace(LsaGrace),
    Unknown(LsaUnknown),
}

// Type and ID of an Opaque LSA, packed into the Link State ID field.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct OpaqueLsaId {
    pub opaque_type: u8,
    pub opaque_id: u32,
}

//
// OSPFv2 Grace Opaque LSA.
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaGrace {
    pub grace_period: Option<GracePeriodTlv>,
    pub gr_reason: Option<GrReasonTlv>,
    pub addr: Option<GrInterfaceAddrTlv>,
    pub unknown_tlvs: Vec<UnknownTlv>,
}

//
// OSPFv2 Unknown LSA.
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknown {}

// ===== impl Lsa =====

impl Lsa {
    // LSA maximum length.
    //
    // Opt for a conservative value to avoid packet fragmentation even in
    // low-MTU links.
    pub const MAX_LENGTH: usize = 1024;

    pub fn new(
        age: u16,
        options: Options,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: LsaBody,
    ) -> Self {
        // Build LSA header (the length and checksum are computed later).
        let hdr = LsaHdr {
            age,
            options,
            lsa_type: body.lsa_type(),
            lsa_id,
            adv_rtr,
            seq_no,
            cksum: 0,
            length: 0,
        };

        // Build full LSA and encode it.
        let mut lsa = Lsa {
            raw: Default::default(),
            hdr,
            body,
            base_time: None,
        };
        lsa.encode();
        lsa
    }

    // Returns the LSA age at the given time.
    pub(crate) fn age(&self, now: Etime) -> u16 {
        if self.hdr.do_not_age() {
            return self.hdr.age;
        }
        match self.base_time {
            Some(base_time) => {
                let elapsed = now.sec.saturating_sub(base_time.sec);
                let elapsed = u16::try_from(elapsed).unwrap_or(u16::MAX);
                std::cmp::min(
                    self.hdr.age.saturating_add(elapsed),
                    LSA_MAX_AGE,
                )
            }
            None => self.hdr.age,
        }
    }

    // Updates the LSA age.
    pub(crate) fn set_age(&mut self, age: u16) {
        // Update header.
        self.hdr.age = age;

        // Update raw data.
        let mut raw = BytesMut::from(self.raw.as_ref());
        raw[0..2].copy_from_slice(&age.to_be_bytes());
        self.raw = raw.freeze();
    }

    // Sets the LSA age to MaxAge.
    pub(crate) fn set_maxage(&mut self) {
        self.set_age(LSA_MAX_AGE);
    }

    // Decodes LSA from a bytes buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Decode LSA header.
        let buf_orig = buf.clone();
        if buf.remaining() < LsaHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }
        let hdr = LsaHdr::decode(buf)?;
        let lsa_len = hdr.length;
        if lsa_len < LsaHdr::LENGTH {
            return Err(DecodeError::InvalidLsaLength);
        }
        let lsa_body_len = lsa_len - LsaHdr::LENGTH;

        // Decode LSA body.
        if buf.remaining() < lsa_body_len as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mut buf_lsa = buf.copy_to_bytes(lsa_body_len as usize);
        let body = LsaBody::decode(hdr.lsa_type, hdr.lsa_id, &mut buf_lsa)?;

        Ok(Lsa {
            raw: buf_orig.slice(0..lsa_len as usize),
            hdr,
            body,
            base_time: None,
        })
    }

    // Encodes LSA into a bytes buffer.
    pub(crate) fn encode(&mut self) {
        // Encode LSA in network byte order.
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            self.hdr.encode(&mut buf);
            self.body.encode(&mut buf);

            // Rewrite LSA length.
            let lsa_len = buf.len() as u16;
            buf[18..20].copy_from_slice(&lsa_len.to_be_bytes());
            self.hdr.length = lsa_len;

            // Compute LSA checksum.
            let cksum = Self::checksum(&buf[2..(lsa_len as usize)]);
            buf[16..18].copy_from_slice(&cksum);
            self.hdr.cksum = u16::from_be_bytes(cksum);

            // Store LSA raw data.
            self.raw = buf.clone().freeze();
        });
    }

    pub(crate) fn validate(&self) -> Result<(), LsaValidationError> {
        // Validate LSA header.
        if self.hdr.age() > LSA_MAX_AGE {
            return Err(LsaValidationError::InvalidLsaAge);
        }
        if self.hdr.seq_no == LSA_RESERVED_SEQ_NO {
            return Err(LsaValidationError::InvalidLsaSeqNo);
        }
        if !self.is_checksum_valid() {
            return Err(LsaValidationError::InvalidChecksum);
        }

        // Validate LSA body.
        self.body.validate(&self.hdr)?;

        Ok(())
    }

    // Fletcher checksum computed over the LSA, excluding the age field.
    pub(crate) fn checksum(data: &[u8]) -> [u8; 2] {
        let checksum = fletcher::calc_fletcher16(data);
        let mut checkbyte0 = (checksum & 0x00FF) as i32;
        let mut checkbyte1 = ((checksum >> 8) & 0x00FF) as i32;

        // Adjust checksum value using scaling factor.
        let sop = data.len() as u16 - 15;
        let mut x = (sop as i32 * checkbyte0 - checkbyte1) % 255;
        if x <= 0 {
            x += 255;
        }
        checkbyte1 = 510 - checkbyte0 - x;
        if checkbyte1 > 255 {
            checkbyte1 -= 255;
        }
        checkbyte0 = x;
        [checkbyte0 as u8, checkbyte1 as u8]
    }

    // Checks if the checksum is valid.
    pub(crate) fn is_checksum_valid(&self) -> bool {
        // Skip checksum validation in testing mode if the checksum field is
        // set to zero.
        #[cfg(feature = "testing")]
        {
            if self.hdr.cksum == 0 {
                return true;
            }
        }

        // Skip the Age field.
        fletcher::calc_fletcher16(&self.raw[2..(self.hdr.length as usize)])
            == 0
    }
}

// ===== impl LsaType =====

impl LsaType {
    pub fn type_code(&self) -> Option<LsaTypeCode> {
        LsaTypeCode::from_u8(self.0)
    }

    pub(crate) fn is_opaque(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::OpaqueLink
                    | LsaTypeCode::OpaqueArea
                    | LsaTypeCode::OpaqueAs
            )
        )
    }

    // Returns the flooding scope associated to the LSA type.
    pub(crate) fn scope(&self) -> LsaScope {
        match self.type_code() {
            Some(LsaTypeCode::OpaqueLink) => LsaScope::Link,
            Some(
                LsaTypeCode::Router
                | LsaTypeCode::Network
                | LsaTypeCode::SummaryNetwork
                | LsaTypeCode::SummaryRouter
                | LsaTypeCode::OpaqueArea,
            ) => LsaScope::Area,
            Some(LsaTypeCode::AsExternal | LsaTypeCode::OpaqueAs) => {
                LsaScope::As
            }
            None => LsaScope::Unknown,
        }
    }

    // Returns whether the LSA type, as seen from the Graceful Restart
    // perspective, corresponds to topology-related information.
    pub(crate) fn is_gr_topology_info(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::Router
                    | LsaTypeCode::Network
                    | LsaTypeCode::SummaryNetwork
                    | LsaTypeCode::SummaryRouter
                    | LsaTypeCode::AsExternal
            )
        )
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LsaTypeCode> for LsaType {
    fn from(code: LsaTypeCode) -> LsaType {
        LsaType(code as u8)
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let age = buf.try_get_u16()?;
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let lsa_type = LsaType(buf.try_get_u8()?);
        let lsa_id = buf.try_get_ipv4()?;
        let adv_rtr = buf.try_get_ipv4()?;
        let seq_no = buf.try_get_u32()?;
        let cksum = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;

        Ok(LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.lsa_type.0);
        buf.put_ipv4(&self.lsa_id);
        buf.put_ipv4(&self.adv_rtr);
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    // Returns the age with the DoNotAge bit masked off.
    pub(crate) fn age(&self) -> u16 {
        self.age & !LSA_DO_NOT_AGE
    }

    pub(crate) fn do_not_age(&self) -> bool {
        self.age & LSA_DO_NOT_AGE != 0 && self.age() != LSA_MAX_AGE
    }

    pub fn is_maxage(&self) -> bool {
        self.age() == LSA_MAX_AGE
    }

    pub fn key(&self) -> LsaKey {
        LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr: self.adv_rtr,
            lsa_id: self.lsa_id,
        }
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub(crate) fn as_summary(&self) -> Option<&LsaSummary> {
        match self {
            LsaBody::SummaryNetwork(summary)
            | LsaBody::SummaryRouter(summary) => Some(summary),
            _ => None,
        }
    }

    pub(crate) fn decode(
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let lsa = match lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                LsaBody::Router(LsaRouter::decode(buf)?)
            }
            Some(LsaTypeCode::Network) => {
                LsaBody::Network(LsaNetwork::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryNetwork) => {
                LsaBody::SummaryNetwork(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryRouter) => {
                LsaBody::SummaryRouter(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::AsExternal) => {
                LsaBody::AsExternal(LsaAsExternal::decode(buf)?)
            }
            Some(LsaTypeCode::OpaqueLink) => {
                LsaBody::OpaqueLink(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueArea) => {
                LsaBody::OpaqueArea(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueAs) => {
                LsaBody::OpaqueAs(LsaOpaque::decode(lsa_id, buf)?)
            }
            None => LsaBody::Unknown(LsaUnknown::decode(buf)?),
        };

        Ok(lsa)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::Network(lsa) => lsa.encode(buf),
            LsaBody::SummaryNetwork(lsa) => lsa.encode(buf),
            LsaBody::SummaryRouter(lsa) => lsa.encode(buf),
            LsaBody::AsExternal(lsa) => lsa.encode(buf),
            LsaBody::OpaqueLink(lsa) => lsa.encode(buf),
            LsaBody::OpaqueArea(lsa) => lsa.encode(buf),
            LsaBody::OpaqueAs(lsa) => lsa.encode(buf),
            LsaBody::Unknown(lsa) => lsa.encode(buf),
        }
    }

    pub(crate) fn lsa_type(&self) -> LsaType {
        match self {
            LsaBody::Router(_lsa) => LsaTypeCode::Router.into(),
            LsaBody::Network(_lsa) => LsaTypeCode::Network.into(),
            LsaBody::SummaryNetwork(_lsa) => LsaTypeCode::SummaryNetwork.into(),
            LsaBody::SummaryRouter(_lsa) => LsaTypeCode::SummaryRouter.into(),
            LsaBody::AsExternal(_lsa) => LsaTypeCode::AsExternal.into(),
            LsaBody::OpaqueLink(_lsa) => LsaTypeCode::OpaqueLink.into(),
            LsaBody::OpaqueArea(_lsa) => LsaTypeCode::OpaqueArea.into(),
            LsaBody::OpaqueAs(_lsa) => LsaTypeCode::OpaqueAs.into(),
            LsaBody::Unknown(_lsa) => unreachable!(),
        }
    }

    pub(crate) fn is_unknown_body(&self) -> bool {
        matches!(
            self,
            LsaBody::Unknown(_)
                | LsaBody::OpaqueLink(LsaOpaque::Unknown(_))
                | LsaBody::OpaqueArea(LsaOpaque::Unknown(_))
                | LsaBody::OpaqueAs(LsaOpaque::Unknown(_))
        )
    }

    pub(crate) fn validate(
        &self,
        hdr: &LsaHdr,
    ) -> Result<(), LsaValidationError> {
        match self {
            LsaBody::Router(lsa) => lsa.validate(hdr),
            _ => Ok(()),
        }
    }

    // Returns the grace period, restart reason and restarting interface
    // address when this is a Grace-LSA.
    pub(crate) fn as_grace(
        &self,
    ) -> Option<(u32, GrReason, Option<Ipv4Addr>)> {
        let grace = self.as_opaque_link()?.as_grace()?;
        let grace_period = grace.grace_period?.get();
        let gr_reason = grace.gr_reason?.get();
        let gr_reason =
            GrReason::from_u8(gr_reason).unwrap_or(GrReason::Unknown);
        let addr = grace.addr.map(|addr| addr.get());
        Some((grace_period, gr_reason, addr))
    }
}

// ===== impl LsaRouter =====

impl LsaRouter {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Validate minimum LSA length.
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let flags = LsaRouterFlags::from_bits_truncate(buf.get_u8());
        let _ = buf.get_u8();
        let links_cnt = buf.get_u16();

        let mut links = vec![];
        for _ in 0..links_cnt {
            let link_id = buf.try_get_ipv4()?;
            let link_data = buf.try_get_ipv4()?;
            let link_type = buf.try_get_u8()?;
            let link_type = LsaRouterLinkType::from_u8(link_type)
                .ok_or(DecodeError::UnknownRouterLinkType(link_type))?;
            let num_tos = buf.try_get_u8()?;
            let metric = buf.try_get_u16()?;

            // Ignore deprecated TOS metrics.
            for _ in 0..num_tos {
                let _ = buf.try_get_u32()?;
            }

            let link =
                LsaRouterLink::new(link_type, link_id, link_data, metric);
            links.push(link);
        }

        Ok(LsaRouter { flags, links })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(0);
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_ipv4(&link.link_id);
            buf.put_ipv4(&link.link_data);
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
        }
    }

    fn validate(&self, hdr: &LsaHdr) -> Result<(), LsaValidationError> {
        // The Router-LSA's advertising router and LSA-ID must be equal.
        if hdr.adv_rtr != hdr.lsa_id {
            return Err(LsaValidationError::RouterLsaIdMismatch);
        }

        Ok(())
    }
}

// ===== impl LsaRouterFlags =====

impl LsaRouterFlags {
    pub(crate) fn is_abr(&self) -> bool {
        self.contains(LsaRouterFlags::B)
    }

    pub(crate) fn is_asbr(&self) -> bool {
        self.contains(LsaRouterFlags::E)
    }
}

// ===== impl LsaNetwork =====

impl LsaNetwork {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Validate minimum LSA length.
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.get_ipv4();

        let mut attached_rtrs = BTreeSet::new();
        let rtrs_cnt = buf.remaining() / 4;
        for _ in 0..rtrs_cnt {
            let rtr = buf.get_ipv4();
            attached_rtrs.insert(rtr);
        }

        Ok(LsaNetwork {
            mask,
            attached_rtrs,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        for rtr in &self.attached_rtrs {
            buf.put_ipv4(rtr);
        }
    }
}

// ===== impl LsaSummary =====

impl LsaSummary {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Validate minimum LSA length.
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.get_ipv4();
        let _ = buf.get_u8();
        let metric = buf.get_u24();
        // Ignore deprecated TOS metrics.

        Ok(LsaSummary { mask, metric })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(0);
        buf.put_u24(self.metric);
    }
}

// ===== impl LsaAsExternal =====

impl LsaAsExternal {
    pub const BASE_LENGTH: u16 = 16;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Validate minimum LSA length.
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.get_ipv4();
        let flags = LsaAsExternalFlags::from_bits_truncate(buf.get_u8());
        let metric = buf.get_u24();
        let fwd_addr = buf.get_opt_ipv4();
        let tag = buf.get_u32();
        // Ignore deprecated TOS-specific information.

        Ok(LsaAsExternal {
            mask,
            flags,
            metric,
            fwd_addr,
            tag,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(self.flags.bits());
        buf.put_u24(self.metric);
        buf.put_ipv4(&self.fwd_addr.unwrap_or(Ipv4Addr::UNSPECIFIED));
        buf.put_u32(self.tag);
    }
}

// ===== impl LsaOpaque =====

impl LsaOpaque {
    fn decode(lsa_id: Ipv4Addr, buf: &mut Bytes) -> DecodeResult<Self> {
        let opaque_type = lsa_id.octets()[0];
        let lsa = match LsaOpaqueType::from_u8(opaque_type) {
            Some(LsaOpaqueType::Grace) => {
                LsaOpaque::Grace(LsaGrace::decode(buf)?)
            }
            _ => LsaOpaque::Unknown(LsaUnknown::decode(buf)?),
        };

        Ok(lsa)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaOpaque::Grace(lsa) => lsa.encode(buf),
            LsaOpaque::Unknown(lsa) => lsa.encode(buf),
        }
    }
}

// ===== impl OpaqueLsaId =====

impl From<Ipv4Addr> for OpaqueLsaId {
    fn from(lsa_id: Ipv4Addr) -> OpaqueLsaId {
        let mut lsa_id = lsa_id.octets();
        let opaque_type = lsa_id[0];
        lsa_id[0] = 0;
        let opaque_id = u32::from_be_bytes(lsa_id);

        OpaqueLsaId {
            opaque_type,
            opaque_id,
        }
    }
}

impl From<OpaqueLsaId> for Ipv4Addr {
    fn from(opaque_lsa_id: OpaqueLsaId) -> Ipv4Addr {
        let mut lsa_id = opaque_lsa_id.opaque_id.to_be_bytes();
        lsa_id[0] = opaque_lsa_id.opaque_type;
        Ipv4Addr::from(lsa_id)
    }
}

// ===== impl LsaGrace =====

impl LsaGrace {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let mut grace = LsaGrace::default();

        while buf.remaining() >= TLV_HDR_SIZE as usize {
            // Parse TLV type.
            let tlv_type = buf.get_u16();
            let tlv_etype = GraceTlvType::from_u16(tlv_type);

            // Parse and validate TLV length.
            let tlv_len = buf.get_u16();
            let tlv_wlen = tlv_wire_len(tlv_len);
            if tlv_wlen as usize > buf.remaining() {
                return Err(DecodeError::InvalidTlvLength(tlv_len));
            }

            // Parse TLV value.
            let mut buf_tlv = buf.copy_to_bytes(tlv_wlen as usize);
            match tlv_etype {
                Some(GraceTlvType::GracePeriod) => {
                    let period = GracePeriodTlv::decode(tlv_len, &mut buf_tlv)?;
                    grace.grace_period.get_or_insert(period);
                }
                Some(GraceTlvType::GrReason) => {
                    let reason = GrReasonTlv::decode(tlv_len, &mut buf_tlv)?;
                    grace.gr_reason.get_or_insert(reason);
                }
                Some(GraceTlvType::InterfaceAddr) => {
                    let addr =
                        GrInterfaceAddrTlv::decode(tlv_len, &mut buf_tlv)?;
                    grace.addr.get_or_insert(addr);
                }
                _ => {
                    // Save unknown TLV.
                    let value = buf_tlv.copy_to_bytes(tlv_len as usize);
                    grace
                        .unknown_tlvs
                        .push(UnknownTlv::new(tlv_type, tlv_len, value));
                }
            }
        }

        Ok(grace)
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(grace_period) = &self.grace_period {
            grace_period.encode(GraceTlvType::GracePeriod as u16, buf);
        }
        if let Some(gr_reason) = &self.gr_reason {
            gr_reason.encode(GraceTlvType::GrReason as u16, buf);
        }
        if let Some(addr) = &self.addr {
            addr.encode(buf);
        }
    }
}

// ===== impl LsaUnknown =====

impl LsaUnknown {
    pub(crate) fn decode(_buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(LsaUnknown {})
    }

    pub(crate) fn encode(&self, _buf: &mut BytesMut) {
        #[cfg(not(feature = "testing"))]
        unreachable!()
    }
}

// ===== global functions =====

// When serializing an LSA header in testing mode, skip the age field as
// it's unimportant and non-deterministic, with one exception: when the LSA
// age is MaxAge. It's important to differentiate this specific case for
// more precise testing.
#[cfg(feature = "testing")]
pub fn serde_lsa_age_filter(age: &u16) -> bool {
    *age != LSA_MAX_AGE
}
