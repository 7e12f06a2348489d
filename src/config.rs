//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Configuration data.
//
// Configuration enters through transactional deltas: `cfg_start` opens a
// transaction, `cfg_update` refreshes individual items, and `cfg_done`
// commits it, deleting every previously configured item that was not
// refreshed in between.
//

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

use crate::area::AreaType;
use crate::interface::InterfaceType;
use crate::packet::auth::AuthMethod;

// Global configuration.
#[derive(Debug)]
pub struct InstanceCfg {
    // Maximum number of simultaneous database exchanges.
    pub max_dds: u16,
    // Maximum number of new AS-external-LSAs originated per second.
    pub new_flood_rate: u32,
    // Maximum number of non-default AS-external-LSAs admitted before the
    // database enters overflow state. Zero disables the limit.
    pub lsdb_limit: u32,
    // Seconds spent in overflow state before attempting to leave it.
    pub ovfl_int: u16,
    // Spread LSA refreshes over the whole refresh interval.
    pub random_refresh: bool,
    // Graceful restart helper policy.
    pub gr_helper_enabled: bool,
    pub gr_helper_strict_lsa_checking: bool,
    // Imported external routes.
    pub external_routes: BTreeMap<Ipv4Network, ExternalRouteCfg>,
}

// Per-area configuration.
#[derive(Debug)]
pub struct AreaCfg {
    pub area_type: AreaType,
    // Cost of the default summary route advertised into a stub area.
    pub default_cost: u32,
    // Whether summary LSAs are imported into this (stub) area.
    pub summary: bool,
}

// Configured area address range.
#[derive(Debug)]
pub struct RangeCfg {
    pub advertise: bool,
    // Overrides the aggregated cost when set.
    pub cost: Option<u32>,
}

// Host route attached to an area.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostCfg {
    pub addr: Ipv4Addr,
    pub cost: u16,
}

// Per-interface configuration.
#[derive(Debug)]
pub struct InterfaceCfg {
    pub ifindex: u32,
    pub if_type: InterfaceType,
    pub prefixlen: u8,
    pub mtu: u16,
    pub cost: u16,
    pub priority: u8,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub rxmt_interval: u16,
    pub transmit_delay: u16,
    pub enabled: bool,
    pub passive: bool,
    pub auth: Option<AuthMethod>,
    // Statically configured neighbors (NBMA and point-to-multipoint).
    pub static_nbrs: BTreeMap<Ipv4Addr, StaticNbr>,
    // Virtual link parameters.
    pub vlink: Option<VlinkCfg>,
}

// Statically configured neighbor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StaticNbr {
    pub priority: u8,
    pub poll_interval: u16,
}

// Virtual link endpoints.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VlinkCfg {
    pub transit_area: Ipv4Addr,
    pub nbr_router_id: Ipv4Addr,
}

// Imported external route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalRouteCfg {
    pub prefix: Ipv4Network,
    // Type-2 metrics only break ties through the distance to the ASBR.
    pub type2: bool,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: u32,
}

// One item of a configuration transaction.
#[derive(Debug)]
pub enum ConfigItem {
    Global {
        max_dds: u16,
        new_flood_rate: u32,
        lsdb_limit: u32,
        ovfl_int: u16,
        random_refresh: bool,
        gr_helper_enabled: bool,
    },
    Area {
        area_id: Ipv4Addr,
        stub: bool,
        default_cost: u32,
        import_summaries: bool,
    },
    Range {
        area_id: Ipv4Addr,
        prefix: Ipv4Network,
        advertise: bool,
        cost: Option<u32>,
    },
    Host {
        area_id: Ipv4Addr,
        addr: Ipv4Addr,
        cost: u16,
    },
    Interface {
        addr: Ipv4Addr,
        area_id: Ipv4Addr,
        ifindex: u32,
        if_type: InterfaceType,
        prefixlen: u8,
        mtu: u16,
        cost: u16,
        priority: u8,
        hello_interval: u16,
        dead_interval: u16,
        rxmt_interval: u16,
        transmit_delay: u16,
        enabled: bool,
        passive: bool,
        auth: Option<AuthMethod>,
    },
    VirtualLink {
        transit_area: Ipv4Addr,
        nbr_router_id: Ipv4Addr,
        hello_interval: u16,
        dead_interval: u16,
        rxmt_interval: u16,
        auth: Option<AuthMethod>,
    },
    Neighbor {
        iface_addr: Ipv4Addr,
        addr: Ipv4Addr,
        priority: u8,
        poll_interval: u16,
    },
    ExternalRoute(ExternalRouteCfg),
}

// Items touched by the in-progress configuration transaction. Whatever is
// not refreshed before `cfg_done` reverts to default or is deleted.
#[derive(Debug, Default)]
pub struct CfgTransaction {
    pub areas: HashSet<Ipv4Addr>,
    pub ranges: HashSet<(Ipv4Addr, Ipv4Network)>,
    pub hosts: HashSet<(Ipv4Addr, Ipv4Addr)>,
    pub interfaces: HashSet<Ipv4Addr>,
    pub vlinks: HashSet<(Ipv4Addr, Ipv4Addr)>,
    pub static_nbrs: HashSet<(Ipv4Addr, Ipv4Addr)>,
    pub external_routes: HashSet<Ipv4Network>,
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            max_dds: 4,
            new_flood_rate: 100,
            lsdb_limit: 0,
            ovfl_int: 300,
            random_refresh: false,
            gr_helper_enabled: true,
            gr_helper_strict_lsa_checking: true,
            external_routes: Default::default(),
        }
    }
}

// ===== impl AreaCfg =====

impl Default for AreaCfg {
    fn default() -> AreaCfg {
        AreaCfg {
            area_type: AreaType::Normal,
            default_cost: 1,
            summary: true,
        }
    }
}

// ===== impl RangeCfg =====

impl Default for RangeCfg {
    fn default() -> RangeCfg {
        RangeCfg {
            advertise: true,
            cost: None,
        }
    }
}

// ===== impl InterfaceCfg =====

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            ifindex: 0,
            if_type: InterfaceType::Broadcast,
            prefixlen: 24,
            mtu: 1500,
            cost: 10,
            priority: 1,
            hello_interval: 10,
            dead_interval: 40,
            rxmt_interval: 5,
            transmit_delay: 1,
            enabled: true,
            passive: false,
            auth: None,
            static_nbrs: Default::default(),
            vlink: None,
        }
    }
}
