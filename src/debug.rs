//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Debug message catalogue, logged through the `tracing` API.
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::gr::GrExitReason;
use crate::interface::ism;
use crate::neighbor::{NeighborNetId, nsm};
use crate::packet::Packet;
use crate::packet::error::LsaValidationError;
use crate::packet::lsa::LsaHdr;
use crate::packet::tlv::GrReason;

// OSPF debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Instance
    InstanceCreate,
    InstanceShutdown(u16),
    // Interfaces
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    IsmEvent(&'a str, &'a ism::State, &'a ism::Event),
    IsmTransition(&'a str, &'a ism::State, &'a ism::State),
    IsmDrElection(
        &'a str,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
    ),
    // Neighbors
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    // Network
    PacketRx(&'a str, &'a Ipv4Addr, &'a Ipv4Addr, &'a Packet),
    PacketTx(u32, &'a Ipv4Addr, &'a Packet),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    // Flooding
    QuestionableAck(Ipv4Addr, &'a LsaHdr),
    LsaDiscard(Ipv4Addr, &'a LsaHdr, &'a LsaValidationError),
    LsaMinArrivalDiscard(Ipv4Addr, &'a LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a LsaHdr),
    // LSDB maintenance
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaOriginateMinInterval(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    LsaRefresh(&'a LsaHdr),
    DbOverflowEnter,
    DbOverflowExit,
    // SPF
    SpfScheduled(SpfReason),
    SpfNetworkUnreachableAbr(&'a Ipv4Addr, Ipv4Addr),
    SpfRouterUnreachableAbr(&'a Ipv4Addr, Ipv4Addr),
    SpfUnreachableAsbr(&'a Ipv4Addr, Ipv4Addr),
    // Graceful Restart
    GrHelperReject(Ipv4Addr, GrRejectReason),
    GrHelperEnter(Ipv4Addr, GrReason, u32),
    GrHelperExit(Ipv4Addr, GrExitReason),
}

// Reason why OSPF is inactive on an interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceInactiveReason {
    AdminDown,
    OperationalDown,
    MissingIfindex,
    MissingAddress,
    Resetting,
    Shutdown,
}

// Reason why a SeqNumberMismatch event was generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    UnexpectedDbDesc,
    InvalidLsaType,
}

// Reason why an LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
}

// Reason why a routing calculation was scheduled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SpfReason {
    Full,
    External,
}

// Reason why the router failed to enter the helper mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GrRejectReason {
    NeighborNotFull,
    TopologyChange,
    GracePeriodExpired,
    HelperDisabled,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate => {
                debug!("{}", self);
            }
            Debug::InstanceShutdown(seconds) => {
                debug!(%seconds, "{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::InterfaceStop(name, reason) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!(?reason, "{}", self);
                })
            }
            Debug::IsmEvent(name, state, event) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::IsmTransition(name, old_state, new_state) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::IsmDrElection(name, old_dr, new_dr, old_bdr, new_bdr) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(
                            ?old_dr,
                            ?new_dr,
                            ?old_bdr,
                            ?new_bdr,
                            "{}",
                            self
                        );
                    })
                })
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NsmEvent(router_id, state, event) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::PacketRx(ifname, src, dst, packet) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&packet).unwrap();
                        debug!(interface = %ifname, %src, %dst, %data, "{}", self);
                    })
                })
            }
            Debug::PacketTx(ifindex, addr, packet) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&packet).unwrap();
                        debug!(%ifindex, %addr, %data, "{}", self);
                    })
                })
            }
            Debug::PacketRxIgnore(router_id, state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?state, "{}", self);
                })
            }
            Debug::QuestionableAck(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaDiscard(router_id, lsa_hdr, error) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?lsa_hdr, %error, "{}", self);
                })
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr) => {
                debug!(?lsa_hdr, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(?lsa_hdr, ?reason, "{}", self);
            }
            Debug::DbOverflowEnter | Debug::DbOverflowExit => {
                debug!("{}", self);
            }
            Debug::SpfScheduled(reason) => {
                debug!(?reason, "{}", self);
            }
            Debug::SpfNetworkUnreachableAbr(lsa_id, adv_rtr)
            | Debug::SpfRouterUnreachableAbr(lsa_id, adv_rtr)
            | Debug::SpfUnreachableAsbr(lsa_id, adv_rtr) => {
                debug!(%lsa_id, %adv_rtr, "{}", self);
            }
            Debug::GrHelperReject(router_id, reason) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?reason, "{}", self);
                })
            }
            Debug::GrHelperEnter(router_id, reason, grace_period) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?reason, %grace_period, "{}", self);
                })
            }
            Debug::GrHelperExit(router_id, reason) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(%reason, "{}", self);
                })
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InstanceShutdown(..) => {
                write!(f, "instance shutting down")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::InterfaceStop(..) => {
                write!(f, "stopping interface")
            }
            Debug::IsmEvent(..) => {
                write!(f, "event")
            }
            Debug::IsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::IsmDrElection(..) => {
                write!(f, "DR election")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::NsmEvent(..) => {
                write!(f, "event")
            }
            Debug::NsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::PacketRx(..) => {
                write!(f, "packet receive")
            }
            Debug::PacketTx(..) => {
                write!(f, "packet transmit")
            }
            Debug::PacketRxIgnore(..) => {
                write!(f, "ignoring packet due to neighbor state")
            }
            Debug::QuestionableAck(..) => {
                write!(f, "questionable acknowledgment")
            }
            Debug::LsaDiscard(..) => {
                write!(f, "discarding LSA")
            }
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA received too frequently")
            }
            Debug::LsaSelfOriginated(..) => {
                write!(f, "received self-originated LSA")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaOriginateMinInterval(..) => {
                write!(f, "postponing LSA origination")
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaRefresh(..) => {
                write!(f, "refreshing LSA")
            }
            Debug::DbOverflowEnter => {
                write!(f, "entering database overflow state")
            }
            Debug::DbOverflowExit => {
                write!(f, "leaving database overflow state")
            }
            Debug::SpfScheduled(..) => {
                write!(f, "routing calculation scheduled")
            }
            Debug::SpfNetworkUnreachableAbr(..) => {
                write!(f, "summary network from unreachable ABR")
            }
            Debug::SpfRouterUnreachableAbr(..) => {
                write!(f, "summary router from unreachable ABR")
            }
            Debug::SpfUnreachableAsbr(..) => {
                write!(f, "external route from unreachable ASBR")
            }
            Debug::GrHelperReject(..) => {
                write!(f, "failed to enter helper mode")
            }
            Debug::GrHelperEnter(..) => {
                write!(f, "entering helper mode")
            }
            Debug::GrHelperExit(..) => {
                write!(f, "exiting helper mode")
            }
        }
    }
}
