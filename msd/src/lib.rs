// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Register-level driver for Marvell-style managed Ethernet switches.
//!
//! A [`Device`] is created with [`Device::load`] from a [`SysConfig`] and the
//! board's bus callbacks ([`Bsp`]).  Feature APIs live in their own modules
//! and take `&Device`.

pub mod atu;
pub mod bus;
pub mod common;
pub mod config;
pub mod device;
pub mod error;
pub mod family;
mod indirect;
pub mod macsec;
pub mod mdio;
pub mod policy;
pub mod ptp;
pub mod rmu;
mod sem;
pub mod sim;

pub use bus::{Bsp, RmuLink, SmiBus};
pub use config::{Channel, SysConfig};
pub use device::Device;
pub use error::{MsdError, Result, Status};
pub use family::Family;
