// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MsdError, Result};

/// Register holding the product number and revision in every port block
pub const PORT_SWITCH_ID: u8 = 0x03;

/// Marker used in destination-port fields for "no port"
pub const NO_PORT: u8 = 0x1f;

/// The switch families this driver knows how to talk to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Peridot,
    Amethyst,
    Bonsai,
    BonsaiZ1,
    Fir,
    Spruce,
}

/// Static description of a family's port layout and optional blocks
#[derive(Debug)]
pub struct FamilyInfo {
    pub family: Family,
    pub name: &'static str,
    /// Product numbers (Switch ID bits 15:4) belonging to this family
    pub product_nums: &'static [u16],
    /// SMI address of physical port 0
    pub port_base: u8,
    /// Logical port N lives at physical port `port_map[N]`
    pub port_map: &'static [u8],
    pub fid_bits: u8,
    pub has_macsec: bool,
}

const IDENTITY_11: [u8; 11] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

static FAMILIES: [FamilyInfo; 6] = [
    FamilyInfo {
        family: Family::Peridot,
        name: "Peridot",
        product_nums: &[0x390, 0x190, 0x290],
        port_base: 0x00,
        port_map: &IDENTITY_11,
        fid_bits: 12,
        has_macsec: false,
    },
    FamilyInfo {
        family: Family::Amethyst,
        name: "Amethyst",
        product_nums: &[0x393, 0x193, 0x191],
        port_base: 0x00,
        port_map: &IDENTITY_11,
        fid_bits: 12,
        has_macsec: false,
    },
    FamilyInfo {
        family: Family::Bonsai,
        name: "Bonsai",
        product_nums: &[0xa72],
        port_base: 0x10,
        port_map: &IDENTITY_11,
        fid_bits: 12,
        has_macsec: false,
    },
    FamilyInfo {
        family: Family::BonsaiZ1,
        name: "BonsaiZ1",
        product_nums: &[0xa72],
        port_base: 0x10,
        port_map: &IDENTITY_11,
        fid_bits: 12,
        has_macsec: false,
    },
    FamilyInfo {
        family: Family::Fir,
        name: "Fir",
        product_nums: &[0xc11],
        port_base: 0x00,
        port_map: &IDENTITY_11,
        fid_bits: 12,
        has_macsec: true,
    },
    // Physical ports 7 and 8 aren't bonded out; the CPU port sits at 9.
    FamilyInfo {
        family: Family::Spruce,
        name: "Spruce",
        product_nums: &[0xc12],
        port_base: 0x00,
        port_map: &[0, 1, 2, 3, 4, 5, 6, 9],
        fid_bits: 8,
        has_macsec: true,
    },
];

impl Family {
    pub fn info(self) -> &'static FamilyInfo {
        FAMILIES
            .iter()
            .find(|f| f.family == self)
            .unwrap_or(&FAMILIES[0])
    }

    /// Map the contents of the Switch ID register to a family.  Bonsai and
    /// BonsaiZ1 share a product number; revision 0 is the Z1 silicon.
    pub fn detect(id: SwitchId) -> Result<Family> {
        let family = FAMILIES
            .iter()
            .find(|f| f.product_nums.contains(&id.product))
            .map(|f| f.family)
            .ok_or_else(|| {
                MsdError::no_such(format!(
                    "switch family for product 0x{:03x}",
                    id.product
                ))
            })?;

        Ok(match family {
            Family::Bonsai | Family::BonsaiZ1 if id.revision == 0 => {
                Family::BonsaiZ1
            }
            Family::Bonsai | Family::BonsaiZ1 => Family::Bonsai,
            f => f,
        })
    }
}

impl std::str::FromStr for Family {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        FAMILIES
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(s))
            .map(|f| f.family)
            .ok_or_else(|| MsdError::bad_param(format!("switch family {s}")))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info().name)
    }
}

impl FamilyInfo {
    pub fn num_ports(&self) -> u8 {
        self.port_map.len() as u8
    }

    pub fn max_fid(&self) -> u16 {
        ((1u32 << self.fid_bits) - 1) as u16
    }

    /// Translate a logical port to its physical port number.
    pub fn physical_port(&self, lport: u8) -> Result<u8> {
        self.port_map
            .get(lport as usize)
            .copied()
            .ok_or_else(|| {
                MsdError::bad_param(format!(
                    "port {lport} (the {} has {} ports)",
                    self.name,
                    self.num_ports()
                ))
            })
    }

    /// Translate a physical port back to its logical number, if it has one.
    pub fn logical_port(&self, phys: u8) -> Option<u8> {
        self.port_map
            .iter()
            .position(|p| *p == phys)
            .map(|l| l as u8)
    }

    /// Convert a bitmap of logical ports into a bitmap of physical ports.
    pub fn to_physical_vec(&self, lvec: u32) -> Result<u32> {
        let mut pvec = 0;
        for lport in 0..32u8 {
            if lvec & (1 << lport) != 0 {
                pvec |= 1 << self.physical_port(lport)?;
            }
        }
        Ok(pvec)
    }

    /// Convert a bitmap of physical ports into a bitmap of logical ports.
    /// Physical ports with no logical number are dropped.
    pub fn to_logical_vec(&self, pvec: u32) -> u32 {
        self.port_map
            .iter()
            .enumerate()
            .filter(|(_, p)| pvec & (1 << **p) != 0)
            .fold(0, |acc, (l, _)| acc | 1 << l)
    }
}

/// Parsed contents of the Switch ID register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchId {
    pub product: u16,
    pub revision: u8,
}

impl From<u16> for SwitchId {
    fn from(raw: u16) -> Self {
        SwitchId {
            product: raw >> 4,
            revision: (raw & 0xf) as u8,
        }
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product 0x{:03x} rev {}", self.product, self.revision)
    }
}

#[test]
fn test_detect() {
    let detect = |id: u16| Family::detect(SwitchId::from(id)).unwrap();
    assert_eq!(detect(0x3931), Family::Amethyst);
    assert_eq!(detect(0x3900), Family::Peridot);
    assert_eq!(detect(0xa720), Family::BonsaiZ1);
    assert_eq!(detect(0xa721), Family::Bonsai);
    assert!(matches!(
        Family::detect(SwitchId::from(0x1234)),
        Err(MsdError::NoSuch(_))
    ));
}

#[test]
fn test_port_map() {
    let spruce = Family::Spruce.info();
    assert_eq!(spruce.num_ports(), 8);
    assert_eq!(spruce.physical_port(7).unwrap(), 9);
    assert!(spruce.physical_port(8).is_err());
    assert_eq!(spruce.logical_port(9), Some(7));
    assert_eq!(spruce.logical_port(8), None);
    assert_eq!(spruce.to_physical_vec(0x81).unwrap(), 0x201);
    assert_eq!(spruce.to_logical_vec(0x301), 0x81);
    assert_eq!(spruce.max_fid(), 0xff);
}

#[test]
fn test_family_names() {
    assert_eq!("bonsaiz1".parse::<Family>().unwrap(), Family::BonsaiZ1);
    assert_eq!("Fir".parse::<Family>().unwrap(), Family::Fir);
    assert!("oak".parse::<Family>().is_err());
}
