// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Pointer/data registers.
//!
//! A number of 16-bit registers front a small array of bytes: bit 15 is an
//! Update flag (which doubles as busy), the pointer sits at bit 8 and the
//! data byte in bits 7:0.  Writing with Update set stores the byte at the
//! pointer; writing without it selects the pointer, after which a read
//! returns that byte.

use log::debug;

use crate::bus::Poller;
use crate::error::{MsdError, Result};

const UPDATE: u16 = 1 << 15;

/// One 16-bit register, however it happens to be reached
pub(crate) trait WordReg {
    fn read(&self) -> Result<u16>;
    fn write(&self, value: u16) -> Result<()>;
    fn poller(&self) -> Poller;
}

pub(crate) struct PointerReg<R> {
    reg: R,
    ptr_bits: u8,
}

impl<R: WordReg> PointerReg<R> {
    pub fn new(reg: R, ptr_bits: u8) -> Self {
        PointerReg { reg, ptr_bits }
    }

    fn check(&self, ptr: u8) -> Result<()> {
        if ptr as u32 >= 1 << self.ptr_bits {
            return Err(MsdError::bad_param(format!(
                "pointer {ptr:#x} exceeds {} bits",
                self.ptr_bits
            )));
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.reg.poller().until("pointer register update", || {
            Ok(self.reg.read()? & UPDATE == 0)
        })
    }

    pub fn read(&self, ptr: u8) -> Result<u8> {
        self.check(ptr)?;
        self.wait_idle()?;
        self.reg.write((ptr as u16) << 8)?;
        let data = (self.reg.read()? & 0xff) as u8;
        debug!("pointer {ptr:#04x} -> {data:#04x}");
        Ok(data)
    }

    pub fn write(&self, ptr: u8, data: u8) -> Result<()> {
        self.check(ptr)?;
        self.wait_idle()?;
        debug!("pointer {ptr:#04x} <- {data:#04x}");
        self.reg.write(UPDATE | (ptr as u16) << 8 | data as u16)
    }

    /// Replace the bits of the byte at `ptr` selected by `mask`.
    pub fn update(&self, ptr: u8, mask: u8, data: u8) -> Result<()> {
        let old = self.read(ptr)?;
        self.write(ptr, (old & !mask) | (data & mask))
    }
}
