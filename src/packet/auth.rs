//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// OSPFv2 packet authentication.
//
// Supports the three RFC 2328 authentication types: null, simple password
// and cryptographic (keyed MD5 per Appendix D; the 16-byte digest is
// computed over the packet followed by the secret key padded to the digest
// size).
//

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use derive_new::new;
use md5::{Digest, Md5};

pub const MD5_DIGEST_SIZE: u8 = 16;
pub const SIMPLE_PWD_SIZE: usize = 8;

// Cryptographic authentication key.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct AuthKey {
    pub id: u8,
    pub string: Vec<u8>,
}

// Authentication method configured on an interface.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthMethod {
    Simple(Vec<u8>),
    Cryptographic(AuthKey),
}

// Authentication context used when encoding packets.
#[derive(Clone, Copy, Debug, new)]
pub struct AuthEncodeCtx<'a> {
    pub method: &'a AuthMethod,
    // Per-interface monotonic sequence number.
    pub seqno: &'a Arc<AtomicU32>,
}

// Authentication context used when decoding packets.
#[derive(Clone, Copy, Debug, new)]
pub struct AuthDecodeCtx<'a> {
    pub method: &'a AuthMethod,
}

// ===== global functions =====

// Computes the keyed-MD5 message digest of an OSPF packet.
pub(crate) fn message_digest(data: &[u8], key: &[u8]) -> [u8; 16] {
    let mut ctx = Md5::new();
    ctx.update(data);

    // The secret key is padded with trailing zeros to the digest size.
    let mut key_pad = [0u8; MD5_DIGEST_SIZE as usize];
    let len = key.len().min(key_pad.len());
    key_pad[..len].copy_from_slice(&key[..len]);
    ctx.update(key_pad);

    ctx.finalize().into()
}
