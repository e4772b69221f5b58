// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use serde::{Deserialize, Serialize};

use crate::error::{MsdError, Result};
use crate::family::Family;

/// Default number of polls of a busy bit before an operation gives up
pub const DEFAULT_POLL_LIMIT: u32 = 0x1000;

/// How register accesses reach the switch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// The switch owns the whole SMI bus and each block answers on its own
    /// address.
    #[default]
    Smi,
    /// The switch answers on a single SMI address and the other blocks are
    /// reached through its SMI command/data registers.
    SmiMultiChip,
    /// Register accesses are carried in Ethernet frames to the Remote
    /// Management Unit.
    Rmu,
}

/// Bring-up configuration for one switch
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SysConfig {
    pub channel: Channel,
    /// Device number used in RMU frames and multi-device setups
    pub dev_num: u8,
    /// SMI address of the switch when in multi-chip mode
    pub base_addr: u8,
    /// Skip auto-detection and assume this family
    pub family: Option<Family>,
    /// Maximum polls of a busy bit.  0 polls forever.
    pub poll_limit: u32,
    /// Network interface whose MDIO bus the switch hangs off
    pub interface: Option<String>,
    /// Source MAC address for RMU request frames
    pub rmu_src_mac: [u8; 6],
}

impl Default for SysConfig {
    fn default() -> Self {
        SysConfig {
            channel: Channel::Smi,
            dev_num: 0,
            base_addr: 0,
            family: None,
            poll_limit: DEFAULT_POLL_LIMIT,
            interface: None,
            rmu_src_mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
        }
    }
}

impl SysConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: SysConfig = toml::from_str(text)
            .map_err(|e| MsdError::bad_param(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dev_num > 0x1f {
            return Err(MsdError::bad_param(format!(
                "dev_num {} exceeds 31",
                self.dev_num
            )));
        }
        if self.base_addr > 0x1f {
            return Err(MsdError::bad_param(format!(
                "base_addr 0x{:x} is not an SMI address",
                self.base_addr
            )));
        }
        // Address 0 can't be used in multi-chip mode: the switch would
        // answer to every broadcast on the bus.
        if self.channel == Channel::SmiMultiChip && self.base_addr == 0 {
            return Err(MsdError::bad_param(
                "multi-chip mode needs a non-zero base_addr",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let cfg = SysConfig::from_toml(
            r#"
            channel = "smi-multi-chip"
            base_addr = 0x4
            family = "peridot"
            poll_limit = 0
            interface = "eth1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.channel, Channel::SmiMultiChip);
        assert_eq!(cfg.base_addr, 4);
        assert_eq!(cfg.family, Some(Family::Peridot));
        assert_eq!(cfg.poll_limit, 0);
        assert_eq!(cfg.interface.as_deref(), Some("eth1"));
    }

    #[test]
    fn defaults_apply() {
        let cfg = SysConfig::from_toml("").unwrap();
        assert_eq!(cfg.channel, Channel::Smi);
        assert_eq!(cfg.poll_limit, DEFAULT_POLL_LIMIT);
        assert_eq!(cfg.family, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SysConfig::from_toml("channel = \"smi-multi-chip\"").is_err());
        assert!(SysConfig::from_toml("base_addr = 40").is_err());
        assert!(SysConfig::from_toml("bogus = 1").is_err());
    }
}
