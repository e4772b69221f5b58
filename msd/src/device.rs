// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use log::{debug, info};

use crate::bus::{Bsp, HwAccess, Poller};
use crate::common::{get_field, set_field};
use crate::config::SysConfig;
use crate::error::{MsdError, Result};
use crate::family::{Family, FamilyInfo, PORT_SWITCH_ID, SwitchId};
use crate::indirect::WordReg;
use crate::sem::Semaphores;

/// SMI address of the Global 1 register block
pub const GLOBAL1: u8 = 0x1b;
/// SMI address of the Global 2 register block
pub const GLOBAL2: u8 = 0x1c;
/// SMI address of the MACSec APB window
pub const APB_WINDOW: u8 = 0x1d;

/// Port-block addresses probed during family detection
const PROBE_BASES: [u8; 2] = [0x00, 0x10];

/// What an SMI read returns while the switch is still held in reset
const NOT_READY: u16 = 0xffff;

/// A loaded switch.  All API calls take `&Device`; the semaphores inside
/// serialize access to each indirect register block, so a `Device` can be
/// shared between threads.
pub struct Device {
    config: SysConfig,
    info: &'static FamilyInfo,
    id: SwitchId,
    hw: HwAccess,
    pub(crate) sems: Semaphores,
}

impl Device {
    /// Bring up the driver for one switch: set up the transport, then
    /// identify the chip.
    pub fn load(config: SysConfig, bsp: Bsp) -> Result<Device> {
        config.validate()?;
        let hw = HwAccess::new(&config, bsp)?;

        let (info, id) = match config.family {
            Some(family) => {
                let info = family.info();
                let raw = hw.read(info.port_base, PORT_SWITCH_ID)?;
                if raw == NOT_READY {
                    return Err(MsdError::busy(
                        "switch is not answering on SMI",
                    ));
                }
                (info, SwitchId::from(raw))
            }
            None => Self::detect(&hw)?,
        };
        info!(
            "loaded {} switch ({id}) on {:?}, device {}",
            info.name, config.channel, config.dev_num
        );

        Ok(Device {
            config,
            info,
            id,
            hw,
            sems: Semaphores::default(),
        })
    }

    fn detect(hw: &HwAccess) -> Result<(&'static FamilyInfo, SwitchId)> {
        let mut not_ready = false;
        for base in PROBE_BASES {
            let raw = hw.read(base, PORT_SWITCH_ID)?;
            not_ready |= raw == NOT_READY;
            let id = SwitchId::from(raw);
            debug!("probe at {base:#04x}: {id}");
            if let Ok(family) = Family::detect(id) {
                if family.info().port_base == base {
                    return Ok((family.info(), id));
                }
            }
        }
        if not_ready {
            return Err(MsdError::busy("switch is not answering on SMI"));
        }
        Err(MsdError::no_such("supported switch on this bus"))
    }

    pub fn family(&self) -> Family {
        self.info.family
    }

    pub fn info(&self) -> &'static FamilyInfo {
        self.info
    }

    pub fn switch_id(&self) -> SwitchId {
        self.id
    }

    pub fn config(&self) -> &SysConfig {
        &self.config
    }

    pub fn num_ports(&self) -> u8 {
        self.info.num_ports()
    }

    pub(crate) fn poller(&self) -> Poller {
        self.hw.poller()
    }

    /// Translate a logical port to the SMI address of its port block.
    pub fn port_addr(&self, lport: u8) -> Result<u8> {
        Ok(self.info.port_base + self.info.physical_port(lport)?)
    }

    pub fn physical_port(&self, lport: u8) -> Result<u8> {
        self.info.physical_port(lport)
    }

    /// Map a physical port reported by the hardware back to a logical port.
    pub fn logical_port(&self, phys: u8) -> Result<u8> {
        self.info.logical_port(phys).ok_or_else(|| {
            MsdError::fail(format!("physical port {phys} has no logical port"))
        })
    }

    pub fn get_any_reg(&self, dev_addr: u8, reg: u8) -> Result<u16> {
        check_addr(dev_addr, reg)?;
        self.hw.read(dev_addr, reg)
    }

    pub fn set_any_reg(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()> {
        check_addr(dev_addr, reg)?;
        self.hw.write(dev_addr, reg, value)
    }

    pub fn get_any_reg_field(
        &self,
        dev_addr: u8,
        reg: u8,
        offset: u8,
        size: u8,
    ) -> Result<u16> {
        check_field(offset, size, 0)?;
        Ok(get_field(self.get_any_reg(dev_addr, reg)?, offset, size))
    }

    /// Read-modify-write of one field.  Not atomic with respect to other
    /// writers of the same register; callers hold the block's semaphore.
    pub fn set_any_reg_field(
        &self,
        dev_addr: u8,
        reg: u8,
        offset: u8,
        size: u8,
        value: u16,
    ) -> Result<()> {
        check_field(offset, size, value)?;
        let old = self.get_any_reg(dev_addr, reg)?;
        self.set_any_reg(dev_addr, reg, set_field(old, offset, size, value))
    }

    pub fn get_port_reg(&self, lport: u8, reg: u8) -> Result<u16> {
        self.get_any_reg(self.port_addr(lport)?, reg)
    }

    pub fn set_port_reg(&self, lport: u8, reg: u8, value: u16) -> Result<()> {
        self.set_any_reg(self.port_addr(lport)?, reg, value)
    }

    pub fn get_port_reg_field(
        &self,
        lport: u8,
        reg: u8,
        offset: u8,
        size: u8,
    ) -> Result<u16> {
        self.get_any_reg_field(self.port_addr(lport)?, reg, offset, size)
    }

    pub fn set_port_reg_field(
        &self,
        lport: u8,
        reg: u8,
        offset: u8,
        size: u8,
        value: u16,
    ) -> Result<()> {
        self.set_any_reg_field(self.port_addr(lport)?, reg, offset, size, value)
    }

    /// Poll until bit `bit` of a register reads as `value`.
    pub(crate) fn wait_bit(
        &self,
        dev_addr: u8,
        reg: u8,
        bit: u8,
        value: bool,
    ) -> Result<()> {
        let what = format!("bit {bit} of {dev_addr:#04x}/{reg:#04x}");
        self.poller().until(&what, || {
            Ok((self.get_any_reg(dev_addr, reg)? >> bit) & 1 == value as u16)
        })
    }

    pub(crate) fn smi_reg(&self, dev_addr: u8, reg: u8) -> SmiReg<'_> {
        SmiReg {
            dev: self,
            dev_addr,
            reg,
        }
    }
}

fn check_addr(dev_addr: u8, reg: u8) -> Result<()> {
    if dev_addr > 0x1f || reg > 0x1f {
        return Err(MsdError::bad_param(format!(
            "SMI address {dev_addr:#x}/{reg:#x} out of range"
        )));
    }
    Ok(())
}

fn check_field(offset: u8, size: u8, value: u16) -> Result<()> {
    if size == 0 || offset as u32 + size as u32 > 16 {
        return Err(MsdError::bad_param(format!(
            "field offset {offset} size {size} doesn't fit a 16-bit register"
        )));
    }
    if !crate::common::fits(value as u64, size) {
        return Err(MsdError::bad_param(format!(
            "value {value:#x} doesn't fit in {size} bits"
        )));
    }
    Ok(())
}

/// A directly addressed SMI register
pub(crate) struct SmiReg<'a> {
    dev: &'a Device,
    dev_addr: u8,
    reg: u8,
}

impl WordReg for SmiReg<'_> {
    fn read(&self) -> Result<u16> {
        self.dev.get_any_reg(self.dev_addr, self.reg)
    }

    fn write(&self, value: u16) -> Result<()> {
        self.dev.set_any_reg(self.dev_addr, self.reg, value)
    }

    fn poller(&self) -> Poller {
        self.dev.poller()
    }
}
