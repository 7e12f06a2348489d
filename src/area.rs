//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// OSPF areas.
//
// An area owns its interfaces, its area-scope LSDB, the configured
// address ranges and host routes, and the per-area results of the routing
// calculation. Area border routers additionally keep, per area, the table
// of summary-LSAs they currently originate into it.
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use derive_new::new;
use ipnetwork::Ipv4Network;

use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, Interfaces, Lsdb, LsdbId,
};
use crate::config::{AreaCfg, HostCfg, RangeCfg};
use crate::debug::LsaFlushReason;
use crate::instance::{InstanceUpView, SouthboundMsg};
use crate::interface::Interface;
use crate::lsdb::{self, LSA_INFINITY, LsaEntry, LsaEntryFlags};
use crate::packet::lsa::{LsaKey, LsaRouterLinkType, LsaTypeCode};
use crate::packet::{Options, PacketType};
use crate::route::{
    Nexthops, PathType, RouteNetFlags, RouteRtr, SummaryNet, SummaryRtr,
};
use crate::spf::Vertex;

// OSPF area.
#[derive(Debug)]
pub struct Area {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area configuration data.
    pub config: AreaCfg,
    // Area state data.
    pub state: AreaState,
    // Configured area ranges.
    pub ranges: BTreeMap<Ipv4Network, Range>,
    // Configured host addresses.
    pub hosts: Vec<HostCfg>,
    // Area interfaces.
    pub interfaces: Interfaces,
}

// OSPF area state.
#[derive(Debug, Default)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
    // Set when the area carries full virtual-link transit traffic.
    pub transit_capability: bool,
    // Shortest-path tree of the last calculation.
    pub spt: BTreeMap<crate::spf::VertexId, Vertex>,
    // Routes to the area's routers (ABRs and ASBRs matter downstream).
    pub routers: BTreeMap<Ipv4Addr, RouteRtr>,
    // Summary-LSAs currently originated into this area, by content.
    pub net_summaries: BTreeMap<Ipv4Network, (u32, SummaryNet)>,
    pub rtr_summaries: BTreeMap<Ipv4Addr, (u32, SummaryRtr)>,
    // Statistics.
    pub spf_run_count: u32,
}

// OSPF area type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AreaType {
    #[default]
    Normal,
    Stub,
}

// A configured address range and its aggregation state.
#[derive(Debug, Default)]
pub struct Range {
    pub config: RangeCfg,
    // Largest cost among the range's active intra-area components; zero
    // while no component is reachable.
    pub cost: u32,
    // Whether the covering black-hole route is installed.
    pub installed: bool,
}

// Where an Options field is about to be used.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
pub enum OptionsLocation {
    Packet { pkt_type: PacketType },
    Lsa,
}

// ===== impl Area =====

impl Area {
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Self {
        Self {
            id,
            area_id,
            config: Default::default(),
            state: Default::default(),
            ranges: Default::default(),
            hosts: Default::default(),
            interfaces: Default::default(),
        }
    }

    // An area counts as actively attached while any of its interfaces is
    // up.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }
}

// ===== global functions =====

// The Options advertised on this area's packets and LSAs: E tracks the
// area's external routing capability, and O announces opaque support in
// Database Description packets.
pub(crate) fn area_options(area: &Area, location: OptionsLocation) -> Options {
    let mut options = Options::empty();

    if area.config.area_type == AreaType::Normal {
        options.insert(Options::E);
    }

    if let OptionsLocation::Packet {
        pkt_type: PacketType::DbDesc,
    } = location
    {
        options.insert(Options::O);
    }

    options
}

// The local endpoint address of a virtual link is borrowed from whichever
// interface currently reaches the far endpoint.
pub(crate) fn vlink_source_addr(
    route_br: &RouteRtr,
    interfaces: &Arena<Interface>,
) -> Option<Ipv4Addr> {
    for nexthop in route_br.nexthops.values() {
        let iface = &interfaces[nexthop.iface_idx];
        if !iface.is_down() {
            return Some(iface.addr);
        }
    }

    None
}

// The far endpoint's address on the transit area, dug out of its
// Router-LSA there.
pub(crate) fn vlink_neighbor_addr(
    area: &Area,
    router_id: Ipv4Addr,
    lsa_entries: &Arena<LsaEntry>,
) -> Option<Ipv4Addr> {
    let lsa_key =
        LsaKey::new(LsaTypeCode::Router.into(), router_id, router_id);
    let (_, lse) = area
        .state
        .lsdb
        .get(lsa_entries, &lsa_key)
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())?;
    let lsa_body = lse.data.body.as_router()?;
    lsa_body.links.iter().find_map(|link| match link.link_type {
        LsaRouterLinkType::PointToPoint
        | LsaRouterLinkType::TransitNetwork => Some(link.link_data),
        _ => None,
    })
}

// ===== summary maintenance =====

// After the routing table changed: refold the configured ranges and bring
// the summary-LSAs this router originates in line with the new routes.
pub(crate) fn update_summaries(
    instance: &mut InstanceUpView<'_>,
    areas: &mut Areas,
    interfaces: &Arena<Interface>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let is_abr = areas.is_abr(interfaces);

    for (_, route) in instance.state.rib.iter_mut() {
        route.flags.remove(RouteNetFlags::SUMMARIZED);
    }
    for area in areas.iter_mut() {
        aggregate_ranges(area, is_abr, instance);
    }

    for area_idx in areas.indexes().collect::<Vec<_>>() {
        refresh_net_summaries(area_idx, is_abr, instance, areas, lsa_entries);
        refresh_rtr_summaries(area_idx, is_abr, instance, areas, lsa_entries);
    }
}

// Folds the area's intra-area routes into its configured ranges. A route
// covered by a range is marked so it isn't summarized individually; the
// range itself advertises the costliest component. Active ranges also
// install a covering black-hole route, so traffic to an unreachable
// component isn't handed to the default route.
fn aggregate_ranges(
    area: &mut Area,
    is_abr: bool,
    instance: &mut InstanceUpView<'_>,
) {
    for range in area.ranges.values_mut() {
        range.cost = 0;
    }

    if is_abr {
        for (_, route) in instance.state.rib.iter_mut() {
            if route.path_type != PathType::IntraArea
                || route.area_id != Some(area.area_id)
                || route.metric >= LSA_INFINITY
            {
                continue;
            }

            let covering = area
                .ranges
                .iter_mut()
                .find(|(prefix, _)| prefix.is_supernet_of(route.prefix));
            if let Some((_, range)) = covering {
                route.flags.insert(RouteNetFlags::SUMMARIZED);
                range.cost = range.cost.max(route.metric);
            }
        }
    }

    for (prefix, range) in area.ranges.iter_mut() {
        let active = range.cost != 0;
        if active && !range.installed {
            instance.tx.sb_send(SouthboundMsg::RouteAdd {
                prefix: *prefix,
                nexthops: vec![],
                reject: true,
            });
            range.installed = true;
        } else if !active && range.installed {
            instance.tx.sb_send(SouthboundMsg::RouteDelete {
                prefix: *prefix,
            });
            range.installed = false;
        }
    }
}

// Recomputes the network summaries originated into one area and
// originates or flushes the difference against the advertised set.
fn refresh_net_summaries(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &mut InstanceUpView<'_>,
    areas: &mut Areas,
    lsa_entries: &Arena<LsaEntry>,
) {
    let area = &areas[area_idx];

    // The set this area should be hearing about from us.
    let mut desired: BTreeMap<Ipv4Network, SummaryNet> = BTreeMap::new();
    if is_abr && area.config.summary {
        // Routes learned elsewhere, one summary each.
        for (_, route) in instance.state.rib.iter() {
            if matches!(
                route.path_type,
                PathType::Type1External | PathType::Type2External
            ) {
                continue;
            }
            if route.metric >= LSA_INFINITY {
                continue;
            }
            // The area has first-hand knowledge of its own routes.
            if route.area_id == Some(area.area_id) {
                continue;
            }
            // The backbone only takes intra-area routes.
            if area.is_backbone() && route.path_type != PathType::IntraArea {
                continue;
            }
            // Split horizon: a route pointing back into this area teaches
            // it nothing.
            if nexthops_point_into(area, &route.nexthops) {
                continue;
            }
            // Range components stay hidden, except that a transit area
            // sees through the backbone's ranges.
            if route.flags.contains(RouteNetFlags::SUMMARIZED)
                && !(route.area_id == Some(Ipv4Addr::UNSPECIFIED)
                    && area.state.transit_capability)
            {
                continue;
            }

            desired.insert(route.prefix, SummaryNet::new(route.metric));
        }

        // The other areas' active ranges, condensed.
        for other in areas.iter() {
            if other.area_id == area.area_id {
                continue;
            }
            if other.is_backbone() && area.state.transit_capability {
                continue;
            }
            for (prefix, range) in other.ranges.iter() {
                if range.cost == 0 || !range.config.advertise {
                    continue;
                }
                let metric = range.config.cost.unwrap_or(range.cost);
                desired.insert(*prefix, SummaryNet::new(metric));
            }
        }
    }

    // A stub area lives off the default route its border routers inject.
    if is_abr && area.config.area_type == AreaType::Stub {
        let prefix = Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap();
        desired.insert(prefix, SummaryNet::new(area.config.default_cost));
    }

    // Diff against what is already out there.
    let mut previous =
        std::mem::take(&mut areas[area_idx].state.net_summaries);
    let area = &areas[area_idx];
    let mut advertised = BTreeMap::new();
    for (prefix, summary) in desired {
        let lsa_id = match previous.remove(&prefix) {
            Some((lsa_id, old)) => {
                if old != summary {
                    lsdb::lsa_orig_inter_area_network(
                        area,
                        instance,
                        prefix,
                        summary.metric,
                    );
                }
                lsa_id
            }
            None => lsdb::lsa_orig_inter_area_network(
                area,
                instance,
                prefix,
                summary.metric,
            ),
        };
        advertised.insert(prefix, (lsa_id, summary));
    }

    // Whatever remains of the previous set has been withdrawn.
    flush_summaries(
        LsaTypeCode::SummaryNetwork,
        previous.into_values().map(|(lsa_id, _)| lsa_id),
        area,
        instance,
        lsa_entries,
    );

    areas[area_idx].state.net_summaries = advertised;
}

// Same, for the ASBR-reachability (type 4) summaries.
fn refresh_rtr_summaries(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &mut InstanceUpView<'_>,
    areas: &mut Areas,
    lsa_entries: &Arena<LsaEntry>,
) {
    let area = &areas[area_idx];

    // Stub areas take no external routes, so ASBR reachability would be
    // useless there.
    let mut desired: BTreeMap<Ipv4Addr, SummaryRtr> = BTreeMap::new();
    if is_abr && area.config.area_type == AreaType::Normal {
        for other in areas.iter() {
            if other.id == area.id {
                continue;
            }
            for (router_id, route) in other.state.routers.iter() {
                if !route.flags.is_asbr() {
                    continue;
                }
                if route.metric >= LSA_INFINITY {
                    continue;
                }
                if area.is_backbone()
                    && route.path_type != PathType::IntraArea
                {
                    continue;
                }
                if nexthops_point_into(area, &route.nexthops) {
                    continue;
                }

                desired.insert(*router_id, SummaryRtr::new(route.metric));
            }
        }
    }

    let mut previous =
        std::mem::take(&mut areas[area_idx].state.rtr_summaries);
    let area = &areas[area_idx];
    let mut advertised = BTreeMap::new();
    for (router_id, summary) in desired {
        let lsa_id = match previous.remove(&router_id) {
            Some((lsa_id, old)) => {
                if old != summary {
                    lsdb::lsa_orig_inter_area_router(
                        area,
                        instance,
                        router_id,
                        summary.metric,
                    );
                }
                lsa_id
            }
            None => lsdb::lsa_orig_inter_area_router(
                area,
                instance,
                router_id,
                summary.metric,
            ),
        };
        advertised.insert(router_id, (lsa_id, summary));
    }

    flush_summaries(
        LsaTypeCode::SummaryRouter,
        previous.into_values().map(|(lsa_id, _)| lsa_id),
        area,
        instance,
        lsa_entries,
    );

    areas[area_idx].state.rtr_summaries = advertised;
}

// Whether any of the route's next hops leaves through the given area.
fn nexthops_point_into(area: &Area, nexthops: &Nexthops) -> bool {
    nexthops.values().any(|nexthop| {
        area.interfaces
            .indexes()
            .any(|iface_idx| nexthop.iface_idx == iface_idx)
    })
}

// Flushes summaries that fell out of the advertised set, including
// received leftovers of our own earlier incarnations.
fn flush_summaries(
    type_code: LsaTypeCode,
    withdrawn: impl Iterator<Item = u32>,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let lsa_type = type_code.into();
    let adv_rtr = instance.state.router_id;

    for lsa_id in withdrawn {
        let lsa_key = LsaKey::new(lsa_type, adv_rtr, lsa_id.into());
        if let Some((_, lse)) = area.state.lsdb.get(lsa_entries, &lsa_key) {
            instance.tx.protocol_input.lsa_flush(
                lsdb_id,
                lse.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }

    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, lsa_type, adv_rtr)
        .filter(|(_, lse)| lse.flags.contains(LsaEntryFlags::RECEIVED))
    {
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            lse.id,
            LsaFlushReason::PrematureAging,
        );
    }
}
