//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod area;
pub mod collections;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod flood;
pub mod fsm;
pub mod gr;
pub mod instance;
pub mod interface;
pub mod lsdb;
pub mod neighbor;
pub mod network;
pub mod output;
pub mod packet;
pub mod route;
pub mod spf;
pub mod sys;
pub mod tasks;
pub mod util;

pub use crate::config::ConfigItem;
pub use crate::instance::Ospf;
pub use crate::sys::{HaltCode, SysCalls};
