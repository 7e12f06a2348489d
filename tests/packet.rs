//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Wire-format tests: known-good packet captures are decoded and compared
// against their native form, and re-encoded back to the exact bytes.
//

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, LazyLock as Lazy};

use bytes::Bytes;
use maplit::btreeset;
use ospfd::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthKey, AuthMethod};
use ospfd::packet::lsa::{
    Lsa, LsaBody, LsaGrace, LsaHdr, LsaKey, LsaOpaque, LsaOpaqueType,
    LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaSummary,
    LsaTypeCode, OpaqueLsaId,
};
use ospfd::packet::tlv::{GrReasonTlv, GracePeriodTlv};
use ospfd::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketType,
};

//
// Helper functions.
//

fn test_encode_packet(
    bytes_expected: &[u8],
    auth_data: &Option<(AuthKey, u32)>,
    packet: &Packet,
) {
    // Prepare authentication context.
    let mut auth = None;
    let auth_method;
    let auth_seqno;
    if let Some((auth_key, seqno)) = auth_data {
        auth_method = AuthMethod::Cryptographic(auth_key.clone());
        auth_seqno = Arc::new(AtomicU32::new(*seqno));
        auth = Some(AuthEncodeCtx::new(&auth_method, &auth_seqno));
    }

    // Encode the packet.
    let bytes_actual = packet.encode(auth);
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(
    bytes: &[u8],
    auth_data: &Option<(AuthKey, u32)>,
    packet_expected: &Packet,
) {
    // Prepare authentication context.
    let mut auth = None;
    let auth_method;
    if let Some((auth_key, _)) = auth_data {
        auth_method = AuthMethod::Cryptographic(auth_key.clone());
        auth = Some(AuthDecodeCtx::new(&auth_method));
    };

    // Decode the packet.
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf, auth).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x01, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0xf6, 0x9e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03,
                0x02, 0x01, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01,
            ],
            None,
            Packet::Hello(Hello {
                hdr: PacketHdr {
                    pkt_type: PacketType::Hello,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                network_mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                hello_interval: 3,
                options: Options::E,
                priority: 1,
                dead_interval: 36,
                dr: None,
                bdr: None,
                neighbors: btreeset![Ipv4Addr::from_str("1.1.1.1").unwrap()],
            }),
        )
    });

static HELLO1_MD5: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x01, 0x00, 0x34, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01, 0x10,
                0x32, 0x45, 0xd0, 0x14, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03,
                0x02, 0x01, 0x00, 0x00, 0x00, 0x0c, 0x0a, 0x00, 0x01, 0x03,
                0x0a, 0x00, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03,
                0x03, 0x03, 0x7b, 0xd0, 0x86, 0xdb, 0x41, 0xfe, 0x42, 0xea,
                0x5a, 0x77, 0xc8, 0x10, 0x60, 0x8d, 0xad, 0x9a,
            ],
            Some((
                AuthKey::new(1, "S3CR3T".as_bytes().to_vec()),
                843436052,
            )),
            Packet::Hello(Hello {
                hdr: PacketHdr {
                    pkt_type: PacketType::Hello,
                    router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
                    auth_seqno: Some(843436052),
                },
                network_mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                hello_interval: 3,
                options: Options::E,
                priority: 1,
                dead_interval: 12,
                dr: Some(Ipv4Addr::from_str("10.0.1.3").unwrap().into()),
                bdr: Some(Ipv4Addr::from_str("10.0.1.2").unwrap().into()),
                neighbors: btreeset![
                    Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    Ipv4Addr::from_str("3.3.3.3").unwrap()
                ],
            }),
        )
    });

static DBDESC1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x02, 0x00, 0x48, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
                0x00, 0x01, 0xd8, 0x9e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x05, 0xdc, 0x42, 0x00, 0x4e, 0xb8,
                0x8f, 0x2e, 0x00, 0x03, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01,
                0x01, 0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x02, 0x48, 0xd6,
                0x00, 0x30, 0x00, 0x03, 0x02, 0x05, 0xac, 0x10, 0x01, 0x00,
                0x01, 0x01, 0x01, 0x01, 0x80, 0x00, 0x00, 0x01, 0xfc, 0xff,
                0x00, 0x24,
            ],
            None,
            Packet::DbDesc(DbDesc {
                hdr: PacketHdr {
                    pkt_type: PacketType::DbDesc,
                    router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                mtu: 1500,
                options: Options::E | Options::O,
                dd_flags: DbDescFlags::empty(),
                dd_seq_no: 1320718126,
                lsa_hdrs: vec![
                    LsaHdr {
                        age: 3,
                        options: Options::E,
                        lsa_type: LsaTypeCode::Router.into(),
                        lsa_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        seq_no: 0x80000002,
                        cksum: 0x48d6,
                        length: 48,
                    },
                    LsaHdr {
                        age: 3,
                        options: Options::E,
                        lsa_type: LsaTypeCode::AsExternal.into(),
                        lsa_id: Ipv4Addr::from_str("172.16.1.0").unwrap(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        seq_no: 0x80000001,
                        cksum: 0xfcff,
                        length: 36,
                    },
                ],
            }),
        )
    });

static LSREQUEST1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x03, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0x46, 0xab, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01,
                0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x05,
                0xac, 0x10, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01,
            ],
            None,
            Packet::LsRequest(LsRequest {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsRequest,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                entries: vec![
                    LsaKey {
                        lsa_type: LsaTypeCode::Router.into(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        lsa_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    },
                    LsaKey {
                        lsa_type: LsaTypeCode::AsExternal.into(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        lsa_id: Ipv4Addr::from_str("172.16.1.0").unwrap(),
                    },
                ],
            }),
        )
    });

static LSUPDATE1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x04, 0x00, 0x78, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0x40, 0xa1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x31,
                0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
                0x80, 0x00, 0x00, 0x02, 0x37, 0xf4, 0x00, 0x24, 0x01, 0x00,
                0x00, 0x01, 0x0a, 0x00, 0x01, 0x00, 0xff, 0xff, 0xff, 0x00,
                0x03, 0x00, 0x00, 0x0a, 0x00, 0x31, 0x02, 0x03, 0x02, 0x02,
                0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
                0xd2, 0x7a, 0x00, 0x1c, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x31, 0x02, 0x03, 0x0a, 0x00, 0x02, 0x00,
                0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xfa, 0x44,
                0x00, 0x1c, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x0a,
            ],
            None,
            Packet::LsUpdate(LsUpdate {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsUpdate,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                lsas: vec![
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000002,
                        LsaBody::Router(LsaRouter {
                            flags: LsaRouterFlags::B,
                            links: vec![LsaRouterLink {
                                link_type: LsaRouterLinkType::StubNetwork,
                                link_id: Ipv4Addr::from_str("10.0.1.0")
                                    .unwrap(),
                                link_data: Ipv4Addr::from_str("255.255.255.0")
                                    .unwrap(),
                                metric: 10,
                            }],
                        }),
                    ),
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000001,
                        LsaBody::SummaryNetwork(LsaSummary {
                            mask: Ipv4Addr::from_str("255.255.255.255")
                                .unwrap(),
                            metric: 0,
                        }),
                    ),
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("10.0.2.0").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000001,
                        LsaBody::SummaryNetwork(LsaSummary {
                            mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                            metric: 10,
                        }),
                    ),
                ],
            }),
        )
    });

static LSACK1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x05, 0x00, 0x54, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
                0x00, 0x01, 0xa0, 0x2e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x03, 0x03,
                0x03, 0x03, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
                0x09, 0x36, 0x00, 0x1c, 0x00, 0x01, 0x02, 0x03, 0x0a, 0x00,
                0x03, 0x00, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
                0x54, 0xdf, 0x00, 0x1c, 0x00, 0x01, 0x02, 0x03, 0x0a, 0x00,
                0x04, 0x00, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
                0x49, 0xe9, 0x00, 0x1c,
            ],
            None,
            Packet::LsAck(LsAck {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsAck,
                    router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                lsa_hdrs: vec![
                    LsaHdr {
                        age: 1,
                        options: Options::E,
                        lsa_type: LsaTypeCode::SummaryNetwork.into(),
                        lsa_id: Ipv4Addr::from_str("3.3.3.3").unwrap(),
                        adv_rtr: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        seq_no: 0x80000001,
                        cksum: 0x0936,
                        length: 28,
                    },
                    LsaHdr {
                        age: 1,
                        options: Options::E,
                        lsa_type: LsaTypeCode::SummaryNetwork.into(),
                        lsa_id: Ipv4Addr::from_str("10.0.3.0").unwrap(),
                        adv_rtr: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        seq_no: 0x80000001,
                        cksum: 0x54df,
                        length: 28,
                    },
                    LsaHdr {
                        age: 1,
                        options: Options::E,
                        lsa_type: LsaTypeCode::SummaryNetwork.into(),
                        lsa_id: Ipv4Addr::from_str("10.0.4.0").unwrap(),
                        adv_rtr: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        seq_no: 0x80000001,
                        cksum: 0x49e9,
                        length: 28,
                    },
                ],
            }),
        )
    });

//
// Test LSAs.
//

static LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x31, 0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x02, 0x37, 0xf4, 0x00, 0x24, 0x01, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x01, 0x00, 0xff, 0xff, 0xff, 0x00, 0x03,
            0x00, 0x00, 0x0a,
        ],
        Lsa::new(
            49,
            Options::E,
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000002,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::B,
                links: vec![LsaRouterLink {
                    link_type: LsaRouterLinkType::StubNetwork,
                    link_id: Ipv4Addr::from_str("10.0.1.0").unwrap(),
                    link_data: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                    metric: 10,
                }],
            }),
        ),
    )
});

static GRACE_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x42, 0x09, 0x03, 0x00, 0x00, 0x00, 0x06, 0x06, 0x06,
            0x06, 0x80, 0x00, 0x00, 0x01, 0x7e, 0xf4, 0x00, 0x24, 0x00, 0x01,
            0x00, 0x04, 0x00, 0x00, 0x00, 0x78, 0x00, 0x02, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00,
        ],
        Lsa::new(
            1,
            Options::O | Options::E,
            OpaqueLsaId::new(LsaOpaqueType::Grace as u8, 0).into(),
            Ipv4Addr::from_str("6.6.6.6").unwrap(),
            0x80000001,
            LsaBody::OpaqueLink(LsaOpaque::Grace(LsaGrace {
                grace_period: Some(GracePeriodTlv::new(120)),
                gr_reason: Some(GrReasonTlv::new(0)),
                addr: None,
                unknown_tlvs: vec![],
            })),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_encode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5_badauth() {
    let (ref bytes, _, _) = *HELLO1_MD5;
    let auth_method = AuthMethod::Cryptographic(AuthKey::new(
        1,
        "WRONG".as_bytes().to_vec(),
    ));
    let auth = Some(AuthDecodeCtx::new(&auth_method));
    let mut buf = Bytes::copy_from_slice(bytes);
    assert!(Packet::decode(&mut buf, auth).is_err());
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref auth, ref dbdescr) = *DBDESC1;
    test_encode_packet(bytes, auth, dbdescr);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref auth, ref dbdescr) = *DBDESC1;
    test_decode_packet(bytes, auth, dbdescr);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_encode_packet(bytes, auth, request);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_decode_packet(bytes, auth, request);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupdate) = *LSUPDATE1;
    test_encode_packet(bytes, auth, lsupdate);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupdate) = *LSUPDATE1;
    test_decode_packet(bytes, auth, lsupdate);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref auth, ref lsack) = *LSACK1;
    test_encode_packet(bytes, auth, lsack);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref auth, ref lsack) = *LSACK1;
    test_decode_packet(bytes, auth, lsack);
}

#[test]
fn test_encode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_grace_lsa1() {
    let (ref bytes, ref lsa) = *GRACE_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_grace_lsa1() {
    let (ref bytes, ref lsa) = *GRACE_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_decode_truncated() {
    let (ref bytes, _, _) = *HELLO1;
    for len in [0, 10, 23] {
        let mut buf = Bytes::copy_from_slice(&bytes[..len]);
        assert!(Packet::decode(&mut buf, None).is_err());
    }

    // Corrupted checksum.
    let mut bytes = bytes.clone();
    bytes[12] ^= 0xff;
    let mut buf = Bytes::copy_from_slice(&bytes);
    assert!(Packet::decode(&mut buf, None).is_err());
}
