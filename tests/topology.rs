//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Multi-router end-to-end tests.
//
// Several OSPF instances run against a mock host that captures packet
// transmissions and kernel route updates. The test network forwards
// packets between instances and drives a shared simulated clock, so whole
// adjacency formations, floods and routing convergences run in
// milliseconds of real time.
//

use std::cell::RefCell;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::str::FromStr;

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use ospfd::config::ConfigItem;
use ospfd::interface::InterfaceType;
use ospfd::interface::ism;
use ospfd::neighbor::nsm;
use ospfd::packet::lsa::{
    Lsa, LsaBody, LsaGrace, LsaOpaque, LsaOpaqueType, LsaRouterLinkType,
    LsaTypeCode, OpaqueLsaId,
};
use ospfd::packet::tlv::{GrReasonTlv, GracePeriodTlv};
use ospfd::packet::{LsUpdate, Options, Packet, PacketHdr, PacketType};
use ospfd::route::Nexthop;
use ospfd::sys::{HaltCode, SysCalls};
use ospfd::tasks::Etime;
use ospfd::Ospf;

//
// Mock host.
//

#[derive(Debug, Default)]
struct SysInner {
    now: Etime,
    sent: Vec<(u32, Ipv4Addr, Ipv4Addr, Vec<u8>)>,
    route_adds: Vec<(Ipv4Network, Vec<Nexthop>, bool)>,
    route_dels: Vec<Ipv4Network>,
    halted: Option<HaltCode>,
}

#[derive(Clone, Debug, Default)]
struct TestSys(Rc<RefCell<SysInner>>);

impl SysCalls for TestSys {
    fn elapsed_since_start(&self) -> Etime {
        self.0.borrow().now
    }

    fn send_packet(
        &mut self,
        ifindex: u32,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        data: &[u8],
    ) {
        self.0
            .borrow_mut()
            .sent
            .push((ifindex, src, dst, data.to_vec()));
    }

    fn route_add(
        &mut self,
        prefix: Ipv4Network,
        nexthops: &[Nexthop],
        reject: bool,
    ) {
        self.0
            .borrow_mut()
            .route_adds
            .push((prefix, nexthops.to_vec(), reject));
    }

    fn route_delete(&mut self, prefix: Ipv4Network) {
        self.0.borrow_mut().route_dels.push(prefix);
    }

    fn join_multicast(&mut self, _ifindex: u32, _group: Ipv4Addr) {}
    fn leave_multicast(&mut self, _ifindex: u32, _group: Ipv4Addr) {}
    fn phy_open(&mut self, _ifindex: u32) {}
    fn phy_close(&mut self, _ifindex: u32) {}

    fn halt(&mut self, code: HaltCode, _reason: &str) {
        self.0.borrow_mut().halted = Some(code);
    }
}

//
// Test network.
//

struct Router {
    ospf: Ospf,
    sys: TestSys,
}

struct Net {
    routers: Vec<Router>,
    // Routers sharing a layer-2 segment, as (router, ifindex) pairs.
    segments: Vec<Vec<(usize, u32)>>,
    // Routers taken out of service (restart simulation).
    frozen: HashSet<usize>,
    now: Etime,
}

impl Net {
    fn new() -> Net {
        Net {
            routers: vec![],
            segments: vec![],
            frozen: HashSet::new(),
            now: Etime::new(0, 0),
        }
    }

    fn add_router(&mut self, router_id: &str) -> usize {
        let sys = TestSys::default();
        let ospf = Ospf::new(
            Ipv4Addr::from_str(router_id).unwrap(),
            Box::new(sys.clone()),
        );
        self.routers.push(Router { ospf, sys });
        self.routers.len() - 1
    }

    fn add_segment(&mut self, members: &[(usize, u32)]) {
        self.segments.push(members.to_vec());
    }

    // Configures a non-virtual interface and brings its physical up.
    #[allow(clippy::too_many_arguments)]
    fn add_iface(
        &mut self,
        router: usize,
        addr: &str,
        prefixlen: u8,
        ifindex: u32,
        if_type: InterfaceType,
        cost: u16,
        priority: u8,
    ) {
        let ospf = &mut self.routers[router].ospf;
        ospf.cfg_update(ConfigItem::Interface {
            addr: Ipv4Addr::from_str(addr).unwrap(),
            area_id: Ipv4Addr::UNSPECIFIED,
            ifindex,
            if_type,
            prefixlen,
            mtu: 1500,
            cost,
            priority,
            hello_interval: 10,
            dead_interval: 40,
            rxmt_interval: 5,
            transmit_delay: 1,
            enabled: true,
            passive: false,
            auth: None,
        });
        ospf.phy_up(ifindex);
    }

    // Advances the simulated clock and delivers all packets in flight.
    fn advance(&mut self, ms: u32) {
        self.now = self.now.add_ms(ms);
        for (idx, router) in self.routers.iter_mut().enumerate() {
            router.sys.0.borrow_mut().now = self.now;
            if !self.frozen.contains(&idx) {
                router.ospf.tick();
            }
        }
        self.deliver();
    }

    fn run(&mut self, seconds: u32) {
        for _ in 0..seconds * 10 {
            self.advance(100);
        }
    }

    fn deliver(&mut self) {
        loop {
            let mut in_flight = vec![];
            for (idx, router) in self.routers.iter_mut().enumerate() {
                let sent =
                    std::mem::take(&mut router.sys.0.borrow_mut().sent);
                if self.frozen.contains(&idx) {
                    continue;
                }
                for (ifindex, src, dst, data) in sent {
                    in_flight.push((idx, ifindex, src, dst, data));
                }
            }
            if in_flight.is_empty() {
                break;
            }

            for (sender, ifindex, src, dst, data) in in_flight {
                let Some(segment) = self
                    .segments
                    .iter()
                    .find(|segment| segment.contains(&(sender, ifindex)))
                else {
                    continue;
                };
                for (member, member_if) in segment.clone() {
                    if member == sender || self.frozen.contains(&member) {
                        continue;
                    }
                    let packet = ip_wrap(src, dst, &data);
                    self.routers[member]
                        .ospf
                        .receive_ip_packet(member_if, packet);
                }
            }
        }
    }
}

// Wraps an OSPF packet in a minimal IPv4 header.
fn ip_wrap(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Bytes {
    let total_len = 20 + payload.len() as u16;
    let mut data = Vec::with_capacity(total_len as usize);
    data.push(0x45);
    data.push(0);
    data.extend_from_slice(&total_len.to_be_bytes());
    data.extend_from_slice(&[0, 0, 0, 0]); // identification + fragmentation
    data.push(1); // TTL
    data.push(89); // OSPF
    data.extend_from_slice(&[0, 0]); // checksum (not verified by the core)
    data.extend_from_slice(&src.octets());
    data.extend_from_slice(&dst.octets());
    data.extend_from_slice(payload);
    Bytes::from(data)
}

fn addr(s: &str) -> Ipv4Addr {
    Ipv4Addr::from_str(s).unwrap()
}

fn prefix(s: &str) -> Ipv4Network {
    Ipv4Network::from_str(s).unwrap()
}

// Builds a two-router point-to-point setup and runs it to convergence.
fn two_router_ptp() -> Net {
    let mut net = Net::new();
    let r1 = net.add_router("1.1.1.1");
    let r2 = net.add_router("2.2.2.2");
    net.add_iface(r1, "10.0.0.1", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_iface(r2, "10.0.0.2", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_segment(&[(r1, 1), (r2, 1)]);
    net.run(40);
    net
}

//
// Tests.
//

#[test]
fn ptp_adjacency() {
    let net = two_router_ptp();

    // Both neighbors reach Full.
    for router in &net.routers {
        let nbrs = router.ospf.neighbors();
        assert_eq!(nbrs.len(), 1);
        assert_eq!(nbrs[0].1, nsm::State::Full);
    }
    assert_eq!(
        net.routers[0].ospf.neighbors()[0].0,
        addr("2.2.2.2")
    );

    // Both LSDBs contain exactly the two router-LSAs, fully synchronized.
    let lsas1 = net.routers[0].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    let lsas2 = net.routers[1].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    assert_eq!(lsas1.len(), 2);
    assert_eq!(lsas2.len(), 2);
    for (a, b) in lsas1.iter().zip(lsas2.iter()) {
        assert_eq!(a.hdr.key(), b.hdr.key());
        assert_eq!(a.hdr.seq_no, b.hdr.seq_no);
        assert_eq!(a.hdr.cksum, b.hdr.cksum);
    }

    // Both router-LSAs advertise the point-to-point adjacency.
    for lsa in &lsas1 {
        let body = lsa.body.as_router().unwrap();
        assert!(
            body.links
                .iter()
                .any(|link| link.link_type == LsaRouterLinkType::PointToPoint)
        );
    }

    // Both routing tables contain one intra-area entry for the link
    // network with cost 10.
    for router in &net.routers {
        let routes = router.ospf.routes();
        let route = routes
            .iter()
            .find(|route| route.prefix == prefix("10.0.0.0/30"))
            .expect("missing route for the link network");
        assert_eq!(route.metric, 10);
    }
}

#[test]
fn broadcast_dr_election() {
    let mut net = Net::new();
    let r1 = net.add_router("1.1.1.1");
    let r2 = net.add_router("2.2.2.2");
    let r3 = net.add_router("3.3.3.3");
    net.add_iface(r1, "10.0.1.1", 24, 1, InterfaceType::Broadcast, 10, 1);
    net.add_iface(r2, "10.0.1.2", 24, 1, InterfaceType::Broadcast, 10, 1);
    net.add_iface(r3, "10.0.1.3", 24, 1, InterfaceType::Broadcast, 10, 0);
    net.add_segment(&[(r1, 1), (r2, 1), (r3, 1)]);
    net.run(90);

    // Router 2 wins DR by Router ID; router 1 becomes Backup; router 3 is
    // ineligible.
    assert_eq!(
        net.routers[r1].ospf.interface_state(addr("10.0.1.1")),
        Some(ism::State::Backup)
    );
    assert_eq!(
        net.routers[r2].ospf.interface_state(addr("10.0.1.2")),
        Some(ism::State::Dr)
    );
    assert_eq!(
        net.routers[r3].ospf.interface_state(addr("10.0.1.3")),
        Some(ism::State::DrOther)
    );

    // The network-LSA is originated by router 2 and lists all three
    // routers.
    let lsas = net.routers[r1].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    let network_lsa = lsas
        .iter()
        .find(|lsa| {
            lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        })
        .expect("missing network-LSA");
    assert_eq!(network_lsa.hdr.adv_rtr, addr("2.2.2.2"));
    let body = network_lsa.body.as_network().unwrap();
    assert_eq!(
        body.attached_rtrs.iter().copied().collect::<Vec<_>>(),
        vec![addr("1.1.1.1"), addr("2.2.2.2"), addr("3.3.3.3")]
    );
}

#[test]
fn broadcast_no_dr_candidates() {
    // All priorities zero: nobody becomes DR and no network-LSA is
    // originated.
    let mut net = Net::new();
    let r1 = net.add_router("1.1.1.1");
    let r2 = net.add_router("2.2.2.2");
    net.add_iface(r1, "10.0.1.1", 24, 1, InterfaceType::Broadcast, 10, 0);
    net.add_iface(r2, "10.0.1.2", 24, 1, InterfaceType::Broadcast, 10, 0);
    net.add_segment(&[(r1, 1), (r2, 1)]);
    net.run(90);

    for router in &net.routers {
        let iface_addr = if router.ospf.router_id() == addr("1.1.1.1") {
            addr("10.0.1.1")
        } else {
            addr("10.0.1.2")
        };
        assert_eq!(
            router.ospf.interface_state(iface_addr),
            Some(ism::State::DrOther)
        );

        // Without a DR no adjacency forms past 2-Way.
        for (_, state) in router.ospf.neighbors() {
            assert_eq!(state, nsm::State::TwoWay);
        }

        // And no network-LSA exists.
        let lsas = router.ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
        assert!(
            !lsas.iter().any(|lsa| lsa.hdr.lsa_type.type_code()
                == Some(LsaTypeCode::Network))
        );
    }
}

#[test]
fn ring_flooding_convergence() {
    // Five routers in a ring, all link costs 1.
    let mut net = Net::new();
    let n = 5;
    for i in 0..n {
        net.add_router(&format!("{0}.{0}.{0}.{0}", i + 1));
    }
    for i in 0..n {
        let next = (i + 1) % n;
        net.add_iface(
            i,
            &format!("10.0.{i}.1"),
            30,
            2,
            InterfaceType::PointToPoint,
            1,
            1,
        );
        net.add_iface(
            next,
            &format!("10.0.{i}.2"),
            30,
            1,
            InterfaceType::PointToPoint,
            1,
            1,
        );
        net.add_segment(&[(i, 2), (next, 1)]);
    }
    net.run(60);

    for (i, router) in net.routers.iter().enumerate() {
        // Every router's LSDB contains all five router-LSAs.
        let lsas = router.ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
        let rtr_lsas = lsas
            .iter()
            .filter(|lsa| {
                lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Router)
            })
            .count();
        assert_eq!(rtr_lsas, n, "router {i} has an incomplete LSDB");

        // Every ring network is reachable; the opposite segment sits two
        // hops away on both sides.
        let routes = router.ospf.routes();
        for j in 0..n {
            let net_prefix = prefix(&format!("10.0.{j}.0/30"));
            let route = routes
                .iter()
                .find(|route| route.prefix == net_prefix)
                .expect("missing ring network route");
            // Distance around the ring to the nearer endpoint, plus the
            // link itself.
            let fwd = (j + n - i) % n;
            let back = (i + n - 1 - j) % n;
            let expected = fwd.min(back) as u32 + 1;
            assert_eq!(
                route.metric, expected,
                "router {i} wrong cost to segment {j}"
            );
        }
    }
}

#[test]
fn multipath_diamond() {
    // R1 reaches R4's stub network over two equal-cost branches.
    let mut net = Net::new();
    let r1 = net.add_router("1.1.1.1");
    let r2 = net.add_router("2.2.2.2");
    let r3 = net.add_router("3.3.3.3");
    let r4 = net.add_router("4.4.4.4");

    net.add_iface(r1, "10.0.12.1", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_iface(r2, "10.0.12.2", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_segment(&[(r1, 1), (r2, 1)]);

    net.add_iface(r1, "10.0.13.1", 30, 2, InterfaceType::PointToPoint, 10, 1);
    net.add_iface(r3, "10.0.13.2", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_segment(&[(r1, 2), (r3, 1)]);

    net.add_iface(r2, "10.0.24.1", 30, 2, InterfaceType::PointToPoint, 10, 1);
    net.add_iface(r4, "10.0.24.2", 30, 1, InterfaceType::PointToPoint, 10, 1);
    net.add_segment(&[(r2, 2), (r4, 1)]);

    net.add_iface(r3, "10.0.34.1", 30, 2, InterfaceType::PointToPoint, 10, 1);
    net.add_iface(r4, "10.0.34.2", 30, 2, InterfaceType::PointToPoint, 10, 1);
    net.add_segment(&[(r3, 2), (r4, 2)]);

    // R4's stub segment.
    net.add_iface(r4, "10.99.0.1", 24, 3, InterfaceType::Broadcast, 10, 1);
    net.add_segment(&[(r4, 3)]);

    net.run(90);

    // R1's route to the stub network uses both branches.
    let routes = net.routers[r1].ospf.routes();
    let route = routes
        .iter()
        .find(|route| route.prefix == prefix("10.99.0.0/24"))
        .expect("missing stub network route");
    assert_eq!(route.metric, 30);

    // The kernel got the route with both gateways in a single update.
    let sys = net.routers[r1].sys.0.borrow();
    let (_, nexthops, reject) = sys
        .route_adds
        .iter()
        .filter(|(p, _, _)| *p == prefix("10.99.0.0/24"))
        .next_back()
        .expect("missing kernel route");
    assert!(!reject);
    let mut gateways = nexthops
        .iter()
        .map(|nexthop| nexthop.addr.unwrap())
        .collect::<Vec<_>>();
    gateways.sort();
    assert_eq!(gateways, vec![addr("10.0.12.2"), addr("10.0.13.2")]);
}

#[test]
fn gr_helper() {
    let mut net = two_router_ptp();
    let r1 = 0;
    let r2 = 1;

    // R2 announces a graceful restart with a 60-second grace period.
    let grace_lsa = Lsa::new(
        0,
        Options::O | Options::E,
        OpaqueLsaId::new(LsaOpaqueType::Grace as u8, 0).into(),
        addr("2.2.2.2"),
        0x80000001,
        LsaBody::OpaqueLink(LsaOpaque::Grace(LsaGrace {
            grace_period: Some(GracePeriodTlv::new(60)),
            gr_reason: Some(GrReasonTlv::new(1)),
            addr: None,
            unknown_tlvs: vec![],
        })),
    );
    let packet = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr::new(
            PacketType::LsUpdate,
            addr("2.2.2.2"),
            Ipv4Addr::UNSPECIFIED,
        ),
        lsas: vec![grace_lsa],
    });
    let data = packet.encode(None);
    net.routers[r1].ospf.receive_ip_packet(
        1,
        ip_wrap(addr("10.0.0.2"), addr("224.0.0.5"), &data),
    );
    assert_eq!(net.routers[r1].ospf.gr_helper_count(), 1);

    // R2 goes silent; R1 keeps advertising the adjacency past the dead
    // interval.
    net.frozen.insert(r2);
    net.run(45);
    let lsas = net.routers[r1].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    let rtr_lsa = lsas
        .iter()
        .find(|lsa| lsa.hdr.adv_rtr == addr("1.1.1.1"))
        .unwrap();
    assert!(
        rtr_lsa
            .body
            .as_router()
            .unwrap()
            .links
            .iter()
            .any(|link| link.link_type == LsaRouterLinkType::PointToPoint
                && link.link_id == addr("2.2.2.2"))
    );

    // Once the grace period expires without the neighbor coming back, the
    // helper session ends and the adjacency is withdrawn.
    net.run(20);
    assert_eq!(net.routers[r1].ospf.gr_helper_count(), 0);
    assert!(net.routers[r1].ospf.neighbors().is_empty());
    let lsas = net.routers[r1].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    let rtr_lsa = lsas
        .iter()
        .find(|lsa| lsa.hdr.adv_rtr == addr("1.1.1.1"))
        .unwrap();
    assert!(
        !rtr_lsa
            .body
            .as_router()
            .unwrap()
            .links
            .iter()
            .any(|link| link.link_type == LsaRouterLinkType::PointToPoint)
    );
}

#[test]
fn shutdown_withdraws() {
    let mut net = two_router_ptp();
    let r1 = 0;

    net.routers[r1].ospf.shutdown(2);
    net.run(5);

    let sys = net.routers[r1].sys.0.borrow();
    assert_eq!(sys.halted, Some(HaltCode::Shutdown));
    drop(sys);

    // R2 sees R1's router-LSA flushed from the domain.
    let lsas = net.routers[1].ospf.area_lsas(Ipv4Addr::UNSPECIFIED);
    assert!(
        !lsas
            .iter()
            .any(|lsa| lsa.hdr.adv_rtr == addr("1.1.1.1")
                && !lsa.hdr.is_maxage())
    );
}
