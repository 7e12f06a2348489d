//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Shortest-path calculation.
//
// One Dijkstra run per actively attached area, with the candidate set held
// in the mergeable priority queue. The cost tuple biases ties so that
// network vertices are expanded before router vertices, which is required
// to find all equal-cost paths, and breaks remaining ties on the vertex
// address, descending.
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use derive_new::new;
use ipnetwork::Ipv4Network;

use crate::area::{self, Area};
use crate::collections::priq::{PriQ, PriqCost};
use crate::collections::{Arena, InterfaceIndex};
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::LsaEntry;
use crate::neighbor::Neighbor;
use crate::packet::lsa::{Lsa, LsaKey, LsaRouterFlags, LsaRouterLinkType, LsaTypeCode};
use crate::route::{self, Nexthop, NexthopKey, Nexthops, PathType, RouteRtr};

// Vertex identifier. Network vertices order before router vertices.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VertexId {
    Network { addr: Ipv4Addr },
    Router { router_id: Ipv4Addr },
}

// The LSA behind an SPF vertex.
#[derive(Clone, Debug)]
pub enum VertexLsa {
    Network(Arc<Lsa>),
    Router(Arc<Lsa>),
}

#[derive(Debug, new)]
pub struct Vertex {
    pub id: VertexId,
    pub lsa: VertexLsa,
    pub distance: u16,
    pub hops: u16,
    #[new(default)]
    pub nexthops: Nexthops,
}

// A link from an SPF vertex to one of its neighboring vertices.
#[derive(Debug)]
struct SpfLink {
    // The router link leading to the vertex, when the parent is a router.
    parent_link: Option<(Ipv4Addr, Ipv4Addr)>,
    id: VertexId,
    lsa: VertexLsa,
    cost: u16,
}

// An intra-area destination discovered by the SPF run.
#[derive(Debug)]
pub(crate) struct SpfIntraAreaNetwork<'a> {
    pub vertex: &'a Vertex,
    pub prefix: Ipv4Network,
    pub metric: u16,
}

// ===== impl VertexId =====

impl VertexId {
    fn addr(&self) -> Ipv4Addr {
        match self {
            VertexId::Network { addr } => *addr,
            VertexId::Router { router_id } => *router_id,
        }
    }
}

// ===== impl VertexLsa =====

impl VertexLsa {
    pub(crate) fn is_router(&self) -> bool {
        matches!(self, VertexLsa::Router(_))
    }

    pub(crate) fn router_id(&self) -> Ipv4Addr {
        match self {
            VertexLsa::Router(lsa) => lsa.hdr.adv_rtr,
            VertexLsa::Network(_) => unreachable!(),
        }
    }

    pub(crate) fn router_flags(&self) -> LsaRouterFlags {
        match self {
            VertexLsa::Router(lsa) => {
                lsa.body.as_router().map(|body| body.flags).unwrap_or_default()
            }
            VertexLsa::Network(_) => unreachable!(),
        }
    }

    pub(crate) fn origin(&self) -> LsaKey {
        match self {
            VertexLsa::Router(lsa) | VertexLsa::Network(lsa) => lsa.hdr.key(),
        }
    }
}

// ===== global functions =====

// Runs the full routing calculation or the AS-external incremental pass,
// depending on the pending flags.
pub(crate) fn run_calculation(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    if instance.state.full_sched {
        instance.state.full_sched = false;
        instance.state.ase_sched = false;

        // Calculate shortest-path trees.
        for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
            run_area(area_idx, instance, arenas);
        }

        // Resolve virtual links through their transit areas.
        update_virtual_links(instance, arenas);

        // Update routing table.
        route::update_rib_full(instance, arenas);

        // Update summary LSAs.
        area::update_summaries(
            instance,
            &mut arenas.areas,
            &arenas.interfaces,
            &arenas.lsa_entries,
        );
    } else if instance.state.ase_sched {
        instance.state.ase_sched = false;

        // Re-examine the AS-external LSAs only.
        route::update_rib_external_only(instance, arenas);
    }
}

// Runs SPF in the provided area.
fn run_area(
    area_idx: crate::collections::AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let area = &mut arenas.areas[area_idx];
    let interfaces = &arenas.interfaces;
    let neighbors = &arenas.neighbors;
    let lsa_entries = &arenas.lsa_entries;

    area.state.transit_capability = false;

    // Get root vertex.
    let root_vid = VertexId::Router {
        router_id: instance.state.router_id,
    };
    let root_vlsa = match vertex_lsa_find(root_vid, area, lsa_entries) {
        Some(vertex) => vertex,
        None => {
            Error::SpfRootNotFound(area.area_id).log();
            return;
        }
    };
    let root_v = Vertex::new(root_vid, root_vlsa, 0, 0);

    // Initialize SPT and candidate list.
    let mut spt = BTreeMap::new();
    let mut cand_list = PriQ::new();
    let mut cand_ids = HashMap::new();
    let id = cand_list.add(cand_cost(&root_v), root_v);
    cand_ids.insert(root_vid, id);

    // Clear router's routing table.
    area.state.routers.clear();

    // Main SPF loop.
    let mut last_distance = 0;
    while let Some((_, vertex)) = cand_list.remove_head() {
        cand_ids.remove(&vertex.id);
        let vertex_id = vertex.id;

        // Extracted costs must be non-decreasing; anything else means the
        // candidate list ordering has been corrupted.
        if vertex.distance < last_distance {
            instance.tx.halt(
                crate::sys::HaltCode::RtCost,
                "inconsistent cost during the routing calculation",
            );
            return;
        }
        last_distance = vertex.distance;

        // Add vertex to SPT.
        spt.insert(vertex_id, vertex);
        let vertex = &spt[&vertex_id];

        if vertex.lsa.is_router() {
            // Add "router" routing table entry.
            let route = RouteRtr::new(
                area.area_id,
                PathType::IntraArea,
                vertex.lsa.router_flags(),
                vertex.distance.into(),
                vertex.nexthops.clone(),
            );
            area.state.routers.insert(vertex.lsa.router_id(), route);

            // Set TransitCapability.
            if vertex.lsa.router_flags().contains(LsaRouterFlags::V) {
                area.state.transit_capability = true;
            }
        }

        // Iterate over all links described by the vertex's LSA.
        for link in vertex_lsa_links(&vertex.lsa, area, lsa_entries) {
            // Check if the LSAs are mutually linked.
            if !vertex_lsa_links(&link.lsa, area, lsa_entries)
                .iter()
                .any(|rlink| rlink.id == vertex.id)
            {
                continue;
            }

            // Check if the link's vertex is already on the shortest-path
            // tree.
            if spt.contains_key(&link.id) {
                continue;
            }

            // Calculate distance to the link's vertex.
            let distance = vertex.distance.saturating_add(link.cost);

            // Increment number of hops to the root.
            let mut hops = vertex.hops;
            if link.lsa.is_router() {
                hops = hops.saturating_add(1);
            }

            // Check if this vertex is already present on the candidate
            // list.
            if let Some(cand_id) = cand_ids.get(&link.id).copied() {
                let cand_distance = cand_list.cost(cand_id).cost0 as u16;
                match distance.cmp(&cand_distance) {
                    std::cmp::Ordering::Less => {
                        // Found a shorter path; re-add the candidate at the
                        // new distance below.
                        cand_list.delete(cand_id);
                        cand_ids.remove(&link.id);
                    }
                    std::cmp::Ordering::Equal => {}
                    std::cmp::Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }

            // Compute the nexthops through this link.
            let nexthops = match calc_nexthops(
                area,
                vertex,
                link.parent_link,
                link.id,
                &link.lsa,
                interfaces,
                neighbors,
            ) {
                Ok(nexthops) => nexthops,
                Err(()) => continue,
            };

            match cand_ids.get(&link.id).copied() {
                Some(cand_id) => {
                    // Equal-cost path: merge nexthops.
                    let cand_v = cand_list.value(cand_id);
                    let mut merged = cand_v.nexthops.clone();
                    merged.extend(nexthops);
                    let (cost, mut cand_v) =
                        cand_list.delete(cand_id).unwrap();
                    cand_v.nexthops = merged;
                    let cand_id = cand_list.add(cost, cand_v);
                    cand_ids.insert(link.id, cand_id);
                }
                None => {
                    let mut cand_v =
                        Vertex::new(link.id, link.lsa, distance, hops);
                    cand_v.nexthops = nexthops;
                    let cand_id = cand_list.add(cand_cost(&cand_v), cand_v);
                    cand_ids.insert(link.id, cand_id);
                }
            }
        }
    }

    // Update area's SPT.
    area.state.spt = spt;

    // Update statistics.
    area.state.spf_run_count += 1;
}

// Candidate ordering: cost ascending, network vertices before router
// vertices, then vertex address descending.
fn cand_cost(vertex: &Vertex) -> PriqCost {
    let kind = match vertex.id {
        VertexId::Network { .. } => 1,
        VertexId::Router { .. } => 0,
    };
    PriqCost::new(vertex.distance as u32, 0, kind, vertex.id.addr().into())
}

// Finds the LSA behind the given vertex ID.
fn vertex_lsa_find(
    id: VertexId,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> Option<VertexLsa> {
    match id {
        VertexId::Router { router_id } => {
            let lsa_key = LsaKey::new(
                LsaTypeCode::Router.into(),
                router_id,
                router_id,
            );
            area.state
                .lsdb
                .get(lsa_entries, &lsa_key)
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .map(|(_, lse)| VertexLsa::Router(lse.data.clone()))
        }
        VertexId::Network { addr } => area
            .state
            .lsdb
            .iter_by_type(lsa_entries, LsaTypeCode::Network.into())
            .find(|(_, lse)| lse.data.hdr.lsa_id == addr)
            .filter(|(_, lse)| !lse.data.hdr.is_maxage())
            .map(|(_, lse)| VertexLsa::Network(lse.data.clone())),
    }
}

// Returns the links of the provided SPF vertex.
fn vertex_lsa_links(
    vertex_lsa: &VertexLsa,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> Vec<SpfLink> {
    let mut links = vec![];

    match vertex_lsa {
        VertexLsa::Router(lsa) => {
            let Some(body) = lsa.body.as_router() else {
                return links;
            };
            for link in &body.links {
                match link.link_type {
                    LsaRouterLinkType::PointToPoint
                    | LsaRouterLinkType::VirtualLink => {
                        let id = VertexId::Router {
                            router_id: link.link_id,
                        };
                        if let Some(vlsa) =
                            vertex_lsa_find(id, area, lsa_entries)
                        {
                            links.push(SpfLink {
                                parent_link: Some((
                                    link.link_id,
                                    link.link_data,
                                )),
                                id,
                                lsa: vlsa,
                                cost: link.metric,
                            });
                        }
                    }
                    LsaRouterLinkType::TransitNetwork => {
                        let id = VertexId::Network { addr: link.link_id };
                        if let Some(vlsa) =
                            vertex_lsa_find(id, area, lsa_entries)
                        {
                            links.push(SpfLink {
                                parent_link: Some((
                                    link.link_id,
                                    link.link_data,
                                )),
                                id,
                                lsa: vlsa,
                                cost: link.metric,
                            });
                        }
                    }
                    // Stub links are examined when the routing table is
                    // built.
                    LsaRouterLinkType::StubNetwork => (),
                }
            }
        }
        VertexLsa::Network(lsa) => {
            let Some(body) = lsa.body.as_network() else {
                return links;
            };
            for rtr in &body.attached_rtrs {
                let id = VertexId::Router { router_id: *rtr };
                if let Some(vlsa) = vertex_lsa_find(id, area, lsa_entries) {
                    links.push(SpfLink {
                        parent_link: None,
                        id,
                        lsa: vlsa,
                        cost: 0,
                    });
                }
            }
        }
    }

    links
}

// Computes the set of nexthops that should be used to reach the given
// destination.
fn calc_nexthops(
    area: &Area,
    parent: &Vertex,
    _parent_link: Option<(Ipv4Addr, Ipv4Addr)>,
    dest_id: VertexId,
    dest_lsa: &VertexLsa,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) -> Result<Nexthops, ()> {
    let mut nexthops = Nexthops::new();

    if parent.hops != 0 {
        // If there is at least one intervening router in the current
        // shortest path between the destination and the root, the
        // destination simply inherits the set of next hops from the
        // parent.
        return Ok(parent.nexthops.clone());
    }

    match (&parent.id, dest_id) {
        // The parent vertex is the root.
        (VertexId::Router { .. }, VertexId::Router { router_id })
            if parent.distance == 0 =>
        {
            // Destination directly connected through a point-to-point or
            // virtual link.
            for iface_idx in area.interfaces.indexes() {
                let iface = &interfaces[iface_idx];
                if iface.is_down() {
                    continue;
                }
                if let Some((_, nbr)) = iface
                    .state
                    .neighbors
                    .get_by_router_id(neighbors, router_id)
                {
                    add_nexthop(
                        &mut nexthops,
                        iface_idx,
                        iface,
                        Some(nbr.src),
                        Some(router_id),
                    );
                }
            }
        }
        (VertexId::Router { .. }, VertexId::Network { addr })
            if parent.distance == 0 =>
        {
            // Destination is a network directly connected to the root.
            for iface_idx in area.interfaces.indexes() {
                let iface = &interfaces[iface_idx];
                if iface.is_down() {
                    continue;
                }
                if iface.network().contains(addr) {
                    add_nexthop(&mut nexthops, iface_idx, iface, None, None);
                }
            }
        }
        (VertexId::Network { addr }, VertexId::Router { router_id }) => {
            // The parent is a network that directly connects the
            // calculating router to the destination router. The nexthop
            // address is the destination's interface address on that
            // network, learned from its Router-LSA.
            let net_addr = *addr;
            let dest_addr = match dest_lsa {
                VertexLsa::Router(lsa) => {
                    lsa.body.as_router().and_then(|body| {
                        body.links
                            .iter()
                            .filter(|link| {
                                link.link_type
                                    == LsaRouterLinkType::TransitNetwork
                            })
                            .find(|link| link.link_id == net_addr)
                            .map(|link| link.link_data)
                    })
                }
                VertexLsa::Network(_) => None,
            };
            let Some(dest_addr) = dest_addr else {
                return Err(());
            };
            for iface_idx in area.interfaces.indexes() {
                let iface = &interfaces[iface_idx];
                if iface.is_down() {
                    continue;
                }
                if iface.network().contains(net_addr) {
                    add_nexthop(
                        &mut nexthops,
                        iface_idx,
                        iface,
                        Some(dest_addr),
                        Some(router_id),
                    );
                }
            }
        }
        _ => return Err(()),
    }

    if nexthops.is_empty() {
        return Err(());
    }
    Ok(nexthops)
}

fn add_nexthop(
    nexthops: &mut Nexthops,
    iface_idx: InterfaceIndex,
    iface: &Interface,
    addr: Option<Ipv4Addr>,
    nbr_router_id: Option<Ipv4Addr>,
) {
    let key = NexthopKey::new(iface_idx, addr);
    nexthops.insert(
        key,
        Nexthop {
            iface_idx,
            ifindex: iface.config.ifindex,
            iface_addr: iface.addr,
            addr,
            nbr_router_id,
        },
    );
}

// Returns all intra-area destinations discovered by the last SPF run: the
// transit networks on the tree plus the stub links of every router on the
// tree.
pub(crate) fn intra_area_networks<'a>(
    area: &'a Area,
) -> impl Iterator<Item = SpfIntraAreaNetwork<'a>> + 'a {
    area.state.spt.values().flat_map(|vertex| {
        let mut stubs = vec![];
        match &vertex.lsa {
            VertexLsa::Network(lsa) => {
                if let Some(body) = lsa.body.as_network() {
                    let prefix = Ipv4Network::with_netmask(
                        lsa.hdr.lsa_id,
                        body.mask,
                    )
                    .map(|prefix| {
                        Ipv4Network::new(prefix.network(), prefix.prefix())
                            .unwrap()
                    });
                    if let Ok(prefix) = prefix {
                        stubs.push(SpfIntraAreaNetwork {
                            vertex,
                            prefix,
                            metric: 0,
                        });
                    }
                }
            }
            VertexLsa::Router(lsa) => {
                if let Some(body) = lsa.body.as_router() {
                    for link in body
                        .links
                        .iter()
                        .filter(|link| {
                            link.link_type == LsaRouterLinkType::StubNetwork
                        })
                    {
                        if let Ok(prefix) = Ipv4Network::with_netmask(
                            link.link_id,
                            link.link_data,
                        ) {
                            stubs.push(SpfIntraAreaNetwork {
                                vertex,
                                prefix,
                                metric: link.metric,
                            });
                        }
                    }
                }
            }
        }
        stubs
    })
}

// Resolves the configured virtual links through their transit areas,
// updating their costs and endpoint addresses and bringing them up or
// down.
fn update_virtual_links(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];
            if iface.config.if_type != InterfaceType::VirtualLink {
                continue;
            }
            let Some(vlink) = iface.config.vlink else {
                continue;
            };

            // The virtual link endpoint must be reachable as an ABR within
            // the transit area.
            let endpoint = arenas
                .areas
                .get_by_area_id(vlink.transit_area)
                .and_then(|(transit_area_idx, transit_area)| {
                    transit_area
                        .state
                        .routers
                        .get(&vlink.nbr_router_id)
                        .filter(|route| route.flags.is_abr())
                        .filter(|route| route.metric < crate::lsdb::LSA_INFINITY)
                        .map(|route| (transit_area_idx, route.clone()))
                });

            match endpoint {
                Some((transit_area_idx, route)) => {
                    let transit_area = &arenas.areas[transit_area_idx];
                    let nbr_addr = area::vlink_neighbor_addr(
                        transit_area,
                        vlink.nbr_router_id,
                        &arenas.lsa_entries,
                    );
                    let src_addr =
                        area::vlink_source_addr(&route, &arenas.interfaces);

                    let iface = &mut arenas.interfaces[iface_idx];
                    iface.state.vlink_nbr_addr = nbr_addr;
                    iface.config.cost = route.metric as u16;
                    if let Some(src_addr) = src_addr {
                        iface.addr = src_addr;
                    }
                    if iface.is_down() && nbr_addr.is_some() {
                        instance.tx.protocol_input.ism_event(
                            area.id,
                            iface.id,
                            ism::Event::InterfaceUp,
                        );
                    }
                }
                None => {
                    let iface = &arenas.interfaces[iface_idx];
                    if !iface.is_down() {
                        instance.tx.protocol_input.ism_event(
                            area.id,
                            iface.id,
                            ism::Event::InterfaceDown(
                                crate::debug::InterfaceInactiveReason::OperationalDown,
                            ),
                        );
                    }
                }
            }
        }
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_ordering() {
        // Network vertices must be expanded before router vertices at the
        // same distance so that all equal-cost paths are found.
        let net = VertexId::Network {
            addr: Ipv4Addr::new(10, 0, 0, 1),
        };
        let rtr = VertexId::Router {
            router_id: Ipv4Addr::new(10, 0, 0, 1),
        };
        assert!(net < rtr);

        let net_v = Vertex::new(
            net,
            VertexLsa::Network(Arc::new(Lsa::new(
                0,
                crate::packet::Options::E,
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(1, 1, 1, 1),
                crate::lsdb::LSA_INIT_SEQ_NO,
                crate::packet::lsa::LsaBody::Network(
                    crate::packet::lsa::LsaNetwork {
                        mask: Ipv4Addr::new(255, 255, 255, 0),
                        attached_rtrs: Default::default(),
                    },
                ),
            ))),
            10,
            0,
        );
        let rtr_v = Vertex::new(
            rtr,
            VertexLsa::Router(Arc::new(Lsa::new(
                0,
                crate::packet::Options::E,
                Ipv4Addr::new(1, 1, 1, 1),
                Ipv4Addr::new(1, 1, 1, 1),
                crate::lsdb::LSA_INIT_SEQ_NO,
                crate::packet::lsa::LsaBody::Router(
                    crate::packet::lsa::LsaRouter {
                        flags: Default::default(),
                        links: vec![],
                    },
                ),
            ))),
            10,
            1,
        );
        assert!(cand_cost(&net_v).costs_less(&cand_cost(&rtr_v)));
    }
}
