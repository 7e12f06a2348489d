//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Packet decoding errors.
//

use std::net::Ipv4Addr;

use bytes::TryGetError;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub type DecodeResult<T> = Result<T, DecodeError>;

// OSPF packet decoding errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompletePacket,
    InvalidIpHdrLength(u16),
    UnknownIpProtocol(u8),
    InvalidVersion(u8),
    UnknownPacketType(u8),
    InvalidLength(u16),
    InvalidRouterId(Ipv4Addr),
    InvalidChecksum,
    UnsupportedAuthType(u16),
    AuthTypeMismatch,
    AuthKeyIdNotFound(u8),
    AuthLenError(u16),
    AuthError,
    InvalidLsaLength,
    UnknownRouterLinkType(u8),
    InvalidTlvLength(u16),
}

// Errors that may invalidate a received LSA.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaValidationError {
    InvalidChecksum,
    InvalidLsaAge,
    InvalidLsaSeqNo,
    RouterLsaIdMismatch,
}

// ===== impl DecodeError =====

impl DecodeError {
    pub(crate) fn log(&self) {
        warn!("{}", self);
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompletePacket => {
                write!(f, "incomplete packet")
            }
            DecodeError::InvalidIpHdrLength(len) => {
                write!(f, "invalid IP header length: {len}")
            }
            DecodeError::UnknownIpProtocol(proto) => {
                write!(f, "unknown IP protocol: {proto}")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid version: {version}")
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type: {pkt_type}")
            }
            DecodeError::InvalidLength(len) => {
                write!(f, "invalid length: {len}")
            }
            DecodeError::InvalidRouterId(router_id) => {
                write!(f, "invalid router ID: {router_id}")
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            DecodeError::UnsupportedAuthType(au_type) => {
                write!(f, "unsupported authentication type: {au_type}")
            }
            DecodeError::AuthTypeMismatch => {
                write!(f, "authentication type mismatch")
            }
            DecodeError::AuthKeyIdNotFound(key_id) => {
                write!(f, "authentication key ID not found: {key_id}")
            }
            DecodeError::AuthLenError(len) => {
                write!(f, "invalid authentication data length: {len}")
            }
            DecodeError::AuthError => {
                write!(f, "authentication failed")
            }
            DecodeError::InvalidLsaLength => {
                write!(f, "invalid LSA length")
            }
            DecodeError::UnknownRouterLinkType(link_type) => {
                write!(f, "unknown router link type: {link_type}")
            }
            DecodeError::InvalidTlvLength(len) => {
                write!(f, "invalid TLV length: {len}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::IncompletePacket
    }
}

// ===== impl LsaValidationError =====

impl std::fmt::Display for LsaValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaValidationError::InvalidChecksum => {
                write!(f, "invalid LSA checksum")
            }
            LsaValidationError::InvalidLsaAge => {
                write!(f, "invalid LSA age")
            }
            LsaValidationError::InvalidLsaSeqNo => {
                write!(f, "invalid LSA sequence number")
            }
            LsaValidationError::RouterLsaIdMismatch => {
                write!(f, "Router-LSA ID and advertising router mismatch")
            }
        }
    }
}

impl std::error::Error for LsaValidationError {}
