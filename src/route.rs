//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Routing table and kernel route synchronization.
//
// The routing table is an ordered map keyed by (network, mask). Next-hop
// sets are interned in a Patricia trie keyed by their sorted byte image,
// so two routes share the same multipath object exactly when their
// next-hop sets are equal, and the kernel diff reduces to a pointer
// comparison.
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;

use crate::collections::avl::{AvlKey, AvlTree};
use crate::collections::ptree::PatTree;
use crate::collections::InterfaceIndex;
use crate::debug::Debug;
use crate::instance::{InstanceArenas, InstanceUpView, SouthboundMsg};
use crate::lsdb::{LSA_INFINITY, LsaEntryFlags};
use crate::packet::lsa::{LsaAsExternalFlags, LsaKey, LsaRouterFlags, LsaTypeCode};
use crate::spf;

// Maximum number of next hops in a multipath entry.
pub const MAX_PATHS: usize = 4;

// Network routing table entry.
#[derive(Clone, Debug)]
pub struct RouteNet {
    pub prefix: Ipv4Network,
    pub area_id: Option<Ipv4Addr>,
    pub origin: Option<LsaKey>,
    pub path_type: PathType,
    pub metric: u32,
    pub type2_metric: Option<u32>,
    pub tag: Option<u32>,
    pub nexthops: Nexthops,
    pub flags: RouteNetFlags,
    // Interned multipath currently installed in the kernel.
    pub last_mpath: Option<Arc<Mpath>>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RouteNetFlags: u8 {
        const CONNECTED = 0x01;
        const INSTALLED = 0x02;
        const SUMMARIZED = 0x04;
    }
}

// Router routing table entry.
#[derive(Clone, Debug, new)]
pub struct RouteRtr {
    pub area_id: Ipv4Addr,
    pub path_type: PathType,
    pub flags: LsaRouterFlags,
    pub metric: u32,
    pub nexthops: Nexthops,
}

// Locally originated inter-area "network" route.
#[derive(Clone, Debug, Eq, new, PartialEq)]
pub struct SummaryNet {
    pub metric: u32,
}

// Locally originated inter-area "router" route.
#[derive(Clone, Debug, Eq, new, PartialEq)]
pub struct SummaryRtr {
    pub metric: u32,
}

// OSPF path types in decreasing order of preference.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathType {
    IntraArea,
    InterArea,
    Type1External,
    Type2External,
}

// Route nexthop key.
#[derive(Clone, Copy, Debug, Eq, new, Ord, PartialEq, PartialOrd)]
pub struct NexthopKey {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
}

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Nexthop {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Physical interface of the outgoing interface.
    pub ifindex: u32,
    // Address of the outgoing interface.
    pub iface_addr: Ipv4Addr,
    // Gateway address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
    // Router-ID of the remote neighbor (`None` for connected routes).
    pub nbr_router_id: Option<Ipv4Addr>,
}

// Ordered list of nexthops.
pub type Nexthops = BTreeMap<NexthopKey, Nexthop>;

// Interned multipath: an immutable, deduplicated next-hop set.
#[derive(Debug, Eq, PartialEq)]
pub struct Mpath {
    pub nexthops: Vec<Nexthop>,
}

// Multipath intern table.
#[derive(Debug, Default)]
pub struct MpathDb(PatTree<Arc<Mpath>>);

// ===== impl RouteNet =====

impl RouteNet {
    pub(crate) fn metric(&self) -> u32 {
        match self.path_type {
            PathType::IntraArea | PathType::InterArea => self.metric,
            PathType::Type1External => self.metric,
            PathType::Type2External => self.type2_metric.unwrap_or(self.metric),
        }
    }
}

// ===== impl MpathDb =====

impl MpathDb {
    // Interns the given next-hop set, returning the canonical multipath
    // object. Reference equality of the result implies set equality.
    pub(crate) fn intern(&mut self, nexthops: &Nexthops) -> Option<Arc<Mpath>> {
        if nexthops.is_empty() {
            return None;
        }

        // Honor the maximum number of ECMP paths.
        let nexthops = nexthops
            .values()
            .copied()
            .take(MAX_PATHS)
            .collect::<Vec<_>>();

        let key = Self::key(&nexthops);
        if let Some(mpath) = self.0.find(&key) {
            return Some(mpath.clone());
        }
        let mpath = Arc::new(Mpath { nexthops });
        self.0.add(&key, mpath.clone());
        Some(mpath)
    }

    // The sorted byte image of a next-hop array.
    fn key(nexthops: &[Nexthop]) -> Vec<u8> {
        let mut key = Vec::with_capacity(nexthops.len() * 12);
        for nexthop in nexthops {
            key.extend_from_slice(&nexthop.iface_addr.octets());
            key.extend_from_slice(&nexthop.ifindex.to_be_bytes());
            let gw = nexthop.addr.unwrap_or(Ipv4Addr::UNSPECIFIED);
            key.extend_from_slice(&gw.octets());
        }
        key
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

// ===== global functions =====

// Maps a prefix to the ordered-map key used by the routing table.
pub(crate) fn route_avl_key(prefix: Ipv4Network) -> AvlKey {
    (u32::from(prefix.network()), u32::from(prefix.mask()))
}

// Updates the entire OSPF routing table.
pub(crate) fn update_rib_full(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let mut rib = AvlTree::new();
    let old_rib = std::mem::take(&mut instance.state.rib);

    // Compute intra-area routes.
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        update_rib_intra_area(&mut rib, area_idx, arenas);
    }

    // Compute inter-area routes.
    let active_areas = arenas.areas.active_count(&arenas.interfaces);
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        // If the router has active attachments to multiple areas, only
        // backbone summary-LSAs are examined.
        let area = &arenas.areas[area_idx];
        if active_areas > 1 && !area.is_backbone() {
            continue;
        }

        update_rib_inter_area_networks(&mut rib, area_idx, instance, arenas);
        update_rib_inter_area_routers(area_idx, instance, arenas);
    }

    // Compute external routes.
    update_rib_external(&mut rib, instance, arenas);

    // Update OSPF routes in the global RIB.
    update_global_rib(&mut rib, old_rib, instance);

    // Save updated RIB.
    instance.state.rib = rib;
}

// Re-examines the AS-external LSAs only.
pub(crate) fn update_rib_external_only(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let mut rib = std::mem::take(&mut instance.state.rib);

    // Remove the external routes from the RIB.
    let mut old_rib = AvlTree::new();
    let ext_keys = rib
        .iter()
        .filter(|(_, route)| {
            matches!(
                route.path_type,
                PathType::Type1External | PathType::Type2External
            )
        })
        .map(|(key, _)| key)
        .collect::<Vec<_>>();
    for key in ext_keys {
        if let Some(route) = rib.remove(key) {
            old_rib.insert(key, route);
        }
    }

    // Recompute the external routes.
    let mut partial = AvlTree::new();
    update_rib_external(&mut partial, instance, arenas);

    // Update OSPF routes in the global RIB.
    update_global_rib(&mut partial, old_rib, instance);

    // Merge the recomputed routes back.
    let keys = partial.iter().map(|(key, _)| key).collect::<Vec<_>>();
    for key in keys {
        if let Some(route) = partial.remove(key) {
            rib.insert(key, route);
        }
    }
    instance.state.rib = rib;
}

// ===== helper functions =====

// Computes intra-area routes.
fn update_rib_intra_area(
    rib: &mut AvlTree<RouteNet>,
    area_idx: crate::collections::AreaIndex,
    arenas: &InstanceArenas,
) {
    let area = &arenas.areas[area_idx];

    // Iterate over all stub networks and their corresponding vertices.
    for stub in spf::intra_area_networks(area) {
        // Calculate stub metric.
        let metric = stub.vertex.distance.saturating_add(stub.metric) as u32;
        let key = route_avl_key(stub.prefix);

        // Compare this distance to the current best cost to the stub
        // network. If the calculated distance is larger, go on to examine
        // the next stub network link.
        if let Some(best_route) = rib.get(key) {
            if metric > best_route.metric {
                continue;
            }
        }

        // Get LS Origin.
        let origin = stub.vertex.lsa.origin();

        // If multiple vertices map to the same IP network (e.g. while a
        // new Designated Router is being established), the entry with the
        // larger Link State Origin wins at equal cost.
        if !stub.vertex.lsa.is_router() {
            if let Some(curr_route) = rib.get(key) {
                if metric > curr_route.metric
                    || curr_route
                        .origin
                        .map(|curr| origin.lsa_id < curr.lsa_id)
                        .unwrap_or(false)
                {
                    continue;
                }
                rib.remove(key);
            }
        }

        // Create new intra-area route.
        let mut flags = RouteNetFlags::empty();
        if stub.vertex.hops == 0 {
            flags.insert(RouteNetFlags::CONNECTED);
        }
        let new_route = RouteNet {
            prefix: stub.prefix,
            area_id: Some(area.area_id),
            path_type: PathType::IntraArea,
            origin: Some(origin),
            metric,
            type2_metric: None,
            tag: None,
            nexthops: stub.vertex.nexthops.clone(),
            flags,
            last_mpath: None,
        };

        // Try to add or update stub route in the RIB.
        route_update(rib, new_route);
    }
}

// Computes inter-area "network" routes.
fn update_rib_inter_area_networks(
    rib: &mut AvlTree<RouteNet>,
    area_idx: crate::collections::AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let area = &arenas.areas[area_idx];
    let router_id = instance.state.router_id;

    // Examine all Type-3 Summary-LSAs.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type(&arenas.lsa_entries, LsaTypeCode::SummaryNetwork.into())
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        // Filter out LSAs originated by the calculating router itself.
        .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
    {
        let Some(summary) = lse.data.body.as_summary() else {
            continue;
        };
        // Filter out unreachable LSAs.
        if summary.metric >= LSA_INFINITY {
            continue;
        }
        let Ok(prefix) =
            Ipv4Network::with_netmask(lse.data.hdr.lsa_id, summary.mask)
        else {
            continue;
        };
        let adv_rtr = lse.data.hdr.adv_rtr;

        // Look up the routing table entry for the advertising border
        // router.
        let route_br = match area
            .state
            .routers
            .get(&adv_rtr)
            .filter(|route| route.flags.is_abr())
        {
            Some(route_br) => route_br,
            None => {
                // If no such entry exists, do nothing with this LSA and
                // consider the next in the list.
                Debug::SpfNetworkUnreachableAbr(&lse.data.hdr.lsa_id, adv_rtr)
                    .log();
                continue;
            }
        };

        // The inter-area path cost is the distance to the border router
        // plus the cost specified in the LSA.
        let metric = route_br.metric + summary.metric;

        // Inter-area routes never preempt an existing intra-area route.
        let key = route_avl_key(prefix);
        if let Some(curr_route) = rib.get(key) {
            if curr_route.path_type == PathType::IntraArea {
                continue;
            }
        }

        // Create new inter-area route.
        let new_route = RouteNet {
            prefix,
            area_id: Some(area.area_id),
            path_type: PathType::InterArea,
            origin: None,
            metric,
            type2_metric: None,
            tag: None,
            nexthops: route_br.nexthops.clone(),
            flags: RouteNetFlags::empty(),
            last_mpath: None,
        };

        // Try to add or update summary route in the RIB.
        route_update(rib, new_route);
    }
}

// Computes inter-area "router" routes.
fn update_rib_inter_area_routers(
    area_idx: crate::collections::AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let area = &arenas.areas[area_idx];
    let router_id = instance.state.router_id;
    let mut new_routes = vec![];

    // Examine all Type-4 Summary-LSAs.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type(&arenas.lsa_entries, LsaTypeCode::SummaryRouter.into())
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
    {
        let Some(summary) = lse.data.body.as_summary() else {
            continue;
        };
        if summary.metric >= LSA_INFINITY {
            continue;
        }
        let adv_rtr = lse.data.hdr.adv_rtr;
        let asbr_id = lse.data.hdr.lsa_id;

        // Look up the routing table entry for the advertising border
        // router.
        let route_br = match area
            .state
            .routers
            .get(&adv_rtr)
            .filter(|route| route.flags.is_abr())
        {
            Some(route_br) => route_br,
            None => {
                Debug::SpfRouterUnreachableAbr(&asbr_id, adv_rtr).log();
                continue;
            }
        };

        // The inter-area path cost is the distance to the border router
        // plus the cost specified in the LSA.
        let metric = route_br.metric + summary.metric;

        // Intra-area routes to the ASBR are preferred.
        if let Some(curr_route) = area.state.routers.get(&asbr_id) {
            if curr_route.path_type == PathType::IntraArea
                || curr_route.metric <= metric
            {
                continue;
            }
        }

        let new_route = RouteRtr {
            area_id: area.area_id,
            path_type: PathType::InterArea,
            flags: LsaRouterFlags::E,
            metric,
            nexthops: route_br.nexthops.clone(),
        };
        new_routes.push((asbr_id, new_route));
    }

    let area = &mut arenas.areas[area_idx];
    for (asbr_id, new_route) in new_routes {
        area.state.routers.insert(asbr_id, new_route);
    }
}

// Computes AS external routes.
fn update_rib_external(
    rib: &mut AvlTree<RouteNet>,
    instance: &mut InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let router_id = instance.state.router_id;

    // Examine all AS-external-LSAs.
    for (_, lse) in instance
        .state
        .lsdb
        .iter_by_type(&arenas.lsa_entries, LsaTypeCode::AsExternal.into())
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        // Filter out LSAs originated by the calculating router itself.
        .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
        .filter(|(_, lse)| !lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED))
    {
        let Some(external) = lse.data.body.as_as_external() else {
            continue;
        };
        // Filter out unreachable LSAs.
        if external.metric >= LSA_INFINITY {
            continue;
        }
        let Ok(prefix) =
            Ipv4Network::with_netmask(lse.data.hdr.lsa_id, external.mask)
        else {
            continue;
        };
        let adv_rtr = lse.data.hdr.adv_rtr;

        // Resolve the advertised forwarding address: 0.0.0.0 means routing
        // towards the advertising router itself.
        let (metric_to_asbr, nexthops) = match external.fwd_addr {
            None => {
                // Look up the ASBR routes (potentially one per attached
                // area), preferring the least cost and breaking ties by the
                // largest area ID.
                let route_asbr = arenas
                    .areas
                    .iter()
                    .filter_map(|area| area.state.routers.get(&adv_rtr))
                    .filter(|route| route.flags.is_asbr())
                    .reduce(|best, route| {
                        match route.metric.cmp(&best.metric) {
                            Ordering::Less => route,
                            Ordering::Equal => {
                                if route.area_id > best.area_id {
                                    route
                                } else {
                                    best
                                }
                            }
                            Ordering::Greater => best,
                        }
                    });
                match route_asbr {
                    Some(route) => (route.metric, route.nexthops.clone()),
                    None => {
                        Debug::SpfUnreachableAsbr(
                            &lse.data.hdr.lsa_id,
                            adv_rtr,
                        )
                        .log();
                        continue;
                    }
                }
            }
            Some(fwd_addr) => {
                // The forwarding address must resolve to an intra-AS
                // route.
                match rib_lookup(rib, fwd_addr) {
                    Some(route) => (route.metric, route.nexthops.clone()),
                    None => {
                        Debug::SpfUnreachableAsbr(
                            &lse.data.hdr.lsa_id,
                            adv_rtr,
                        )
                        .log();
                        continue;
                    }
                }
            }
        };

        // Get path type and metric. Type-2 metrics only break ties through
        // the distance to the ASBR.
        let (path_type, metric, type2_metric) =
            if external.flags.contains(LsaAsExternalFlags::E) {
                (PathType::Type2External, metric_to_asbr, Some(external.metric))
            } else {
                (
                    PathType::Type1External,
                    metric_to_asbr + external.metric,
                    None,
                )
            };

        // Create new external route.
        let new_route = RouteNet {
            prefix,
            area_id: None,
            path_type,
            origin: Some(lse.data.hdr.key()),
            metric,
            type2_metric,
            tag: Some(external.tag),
            nexthops,
            flags: RouteNetFlags::empty(),
            last_mpath: None,
        };

        // Try to add or update external route in the RIB.
        route_update(rib, new_route);
    }
}

// Finds the best-matching intra-AS route for the given address.
fn rib_lookup(rib: &AvlTree<RouteNet>, addr: Ipv4Addr) -> Option<&RouteNet> {
    rib.iter()
        .map(|(_, route)| route)
        .filter(|route| {
            matches!(
                route.path_type,
                PathType::IntraArea | PathType::InterArea
            )
        })
        .filter(|route| route.prefix.contains(addr))
        .max_by_key(|route| route.prefix.prefix())
}

// Updates OSPF routes in the global RIB.
//
// This step is done at the end of the routing table calculation to prevent
// transient states from affecting the forwarding plane.
fn update_global_rib(
    rib: &mut AvlTree<RouteNet>,
    mut old_rib: AvlTree<RouteNet>,
    instance: &mut InstanceUpView<'_>,
) {
    // Install new routes or routes that have changed.
    let keys = rib.iter().map(|(key, _)| key).collect::<Vec<_>>();
    for key in keys {
        let route = rib.get_mut(key).unwrap();

        // Intern the route's multipath.
        let mpath = instance.state.mpath_db.intern(&route.nexthops);

        // Remove route from the old RIB if it's present.
        if let Some(old_route) = old_rib.remove(key) {
            // Skip reinstalling the route if it hasn't changed. Multipath
            // identity makes this a pointer comparison.
            let mpath_unchanged = match (&old_route.last_mpath, &mpath) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if old_route.metric() == route.metric()
                && old_route.tag == route.tag
                && mpath_unchanged
            {
                route.last_mpath = old_route.last_mpath;
                if old_route.flags.contains(RouteNetFlags::INSTALLED) {
                    route.flags.insert(RouteNetFlags::INSTALLED);
                }
                continue;
            }
        }

        // The list of nexthops might be empty in the case of nexthop
        // computation errors. When that happens, ensure the route is
        // removed from the RIB.
        if !route.flags.contains(RouteNetFlags::CONNECTED)
            && mpath.is_some()
        {
            let mpath = mpath.unwrap();
            instance.tx.sb_send(SouthboundMsg::RouteAdd {
                prefix: route.prefix,
                nexthops: mpath.nexthops.clone(),
                reject: false,
            });
            route.last_mpath = Some(mpath);
            route.flags.insert(RouteNetFlags::INSTALLED);
        } else if route.flags.contains(RouteNetFlags::INSTALLED) {
            instance.tx.sb_send(SouthboundMsg::RouteDelete {
                prefix: route.prefix,
            });
            route.flags.remove(RouteNetFlags::INSTALLED);
            route.last_mpath = None;
        }
    }

    // Uninstall routes that are no longer available.
    let old_keys = old_rib.iter().map(|(key, _)| key).collect::<Vec<_>>();
    for key in old_keys {
        let route = old_rib.remove(key).unwrap();
        if route.flags.contains(RouteNetFlags::INSTALLED) {
            instance.tx.sb_send(SouthboundMsg::RouteDelete {
                prefix: route.prefix,
            });
        }
    }
}

fn route_update(rib: &mut AvlTree<RouteNet>, route: RouteNet) {
    let key = route_avl_key(route.prefix);
    match rib.get_mut(key) {
        Some(curr_route) => {
            match route_compare(&route, curr_route) {
                Ordering::Less => {
                    // Overwrite the current routing table entry, but
                    // preserve the flag indicating whether the route is
                    // installed or not.
                    let installed =
                        curr_route.flags.contains(RouteNetFlags::INSTALLED);
                    let last_mpath = curr_route.last_mpath.take();
                    *curr_route = route;
                    curr_route.last_mpath = last_mpath;
                    if installed {
                        curr_route.flags.insert(RouteNetFlags::INSTALLED);
                    }
                }
                Ordering::Equal => {
                    // Merge nexthops.
                    curr_route.nexthops.extend(route.nexthops);
                }
                Ordering::Greater => {
                    // Ignore less preferred route.
                }
            }
        }
        None => {
            rib.insert(key, route);
        }
    }
}

fn route_compare(a: &RouteNet, b: &RouteNet) -> Ordering {
    let cmp = a.path_type.cmp(&b.path_type);
    if cmp != Ordering::Equal {
        return cmp;
    }

    match a.path_type {
        PathType::IntraArea | PathType::InterArea => a.metric.cmp(&b.metric),
        PathType::Type1External => a.metric.cmp(&b.metric),
        PathType::Type2External => {
            let cmp = a.type2_metric.cmp(&b.type2_metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            a.metric.cmp(&b.metric)
        }
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use generational_arena::Arena;

    use super::*;

    fn nexthop(ifindex: u32, gw: [u8; 4]) -> (NexthopKey, Nexthop) {
        let mut arena = Arena::new();
        let iface_idx = arena.insert(ifindex);
        let nexthop = Nexthop {
            iface_idx,
            ifindex,
            iface_addr: Ipv4Addr::new(192, 0, 2, 100 + ifindex as u8),
            addr: Some(Ipv4Addr::from(gw)),
            nbr_router_id: None,
        };
        (NexthopKey::new(iface_idx, nexthop.addr), nexthop)
    }

    #[test]
    fn multipath_interning() {
        let mut db = MpathDb::default();

        let mut a = Nexthops::new();
        let (key1, nh1) = nexthop(1, [192, 0, 2, 1]);
        let (key2, nh2) = nexthop(2, [192, 0, 2, 5]);
        a.insert(key1, nh1);
        a.insert(key2, nh2);

        // Equal next-hop sets intern to the same object.
        let m1 = db.intern(&a).unwrap();
        let m2 = db.intern(&a).unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(m1.nexthops.len(), 2);

        // A different set gets a different object.
        let mut b = a.clone();
        let (key3, nh3) = nexthop(3, [192, 0, 2, 9]);
        b.insert(key3, nh3);
        let m3 = db.intern(&b).unwrap();
        assert!(!Arc::ptr_eq(&m1, &m3));

        // The empty set is not interned.
        assert!(db.intern(&Nexthops::new()).is_none());
    }

    #[test]
    fn multipath_cap() {
        let mut db = MpathDb::default();
        let mut set = Nexthops::new();
        for n in 0..8 {
            let (key, nh) = nexthop(n, [10, 0, 0, n as u8 + 1]);
            set.insert(key, nh);
        }
        let mpath = db.intern(&set).unwrap();
        assert_eq!(mpath.nexthops.len(), MAX_PATHS);
    }

    #[test]
    fn path_type_preference() {
        assert!(PathType::IntraArea < PathType::InterArea);
        assert!(PathType::InterArea < PathType::Type1External);
        assert!(PathType::Type1External < PathType::Type2External);
    }
}
