// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A register-level model of a switch, usable as either an SMI bus or an
//! RMU link.
//!
//! The model implements the handshakes the driver relies on: pointer/data
//! byte registers, the ATU and AVB command engines with their busy bits,
//! time-of-day arrays and the MACSec APB window.  Plain registers simply
//! hold what was last written.  It is used by the unit tests and by
//! `msdtool --sim`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::atu::MacAddr;
use crate::bus::{RmuLink, SmiBus};
use crate::device::{APB_WINDOW, GLOBAL1, GLOBAL2};
use crate::error::Result;
use crate::family::{Family, FamilyInfo, PORT_SWITCH_ID};
use crate::rmu::{RmuCmd, RmuFrame};

const BUSY: u16 = 1 << 15;

// Pointer registers
const MONITOR_MGMT_CTRL: u8 = 0x1a;
const PORT_POLICY_MGMT_CTRL: u8 = 0x0e;

// ATU
const ATU_FID: u8 = 0x01;
const ATU_OP: u8 = 0x0b;
const ATU_DATA: u8 = 0x0c;
const ATU_MAC: u8 = 0x0d;

// AVB
const AVB_CMD: u8 = 0x16;
const AVB_DATA: u8 = 0x17;
const PTP_GLOBAL: u8 = 0x1f;
const TAI_GLOBAL: u8 = 0x1e;
const PTP_MODE: u8 = 0x07;
const TOD_FIRST: u8 = 0x10;
const TOD_CTRL: u8 = 0x12;
const TOD_COMP: u8 = 0x1c;
const TOD_WORDS: usize = 14;
const TAI_TIME: u8 = 0x0e;

// Multi-chip command/data registers
const SMI_CMD: u8 = 0x00;
const SMI_DATA: u8 = 0x01;

const SIM_MAC: [u8; 6] = [0x00, 0x50, 0x43, 0x00, 0x00, 0x01];

#[derive(Clone, Copy)]
struct Pointer {
    bits: u8,
    cur: u8,
    bytes: [u8; 128],
}

impl Pointer {
    fn new(bits: u8) -> Self {
        Pointer {
            bits,
            cur: 0,
            bytes: [0; 128],
        }
    }

    fn read(&self) -> u16 {
        (self.cur as u16) << 8 | self.bytes[self.cur as usize] as u16
    }

    fn write(&mut self, value: u16) {
        self.cur = ((value >> 8) as u8) & ((1 << self.bits) - 1);
        if value & BUSY != 0 {
            self.bytes[self.cur as usize] = value as u8;
        }
    }
}

#[derive(Clone, Copy)]
struct AtuRow {
    data: u16,
    priority: u16,
}

#[derive(Clone, Copy)]
struct Violation {
    bits: u8,
    mac: MacAddr,
    fid: u16,
    spid: u8,
}

#[derive(Clone, Copy, Default)]
struct TodArray {
    words: [u16; TOD_WORDS],
    ctrl_low: u16,
}

#[derive(Clone, Copy)]
struct Cursor {
    port: u8,
    block: u8,
    addr: u8,
    incr: bool,
}

struct State {
    info: &'static FamilyInfo,
    /// Address the chip answers on in multi-chip mode
    multi_chip: Option<u8>,
    smi_cmd: u16,
    smi_data: u16,
    regs: HashMap<(u8, u8), u16>,
    stalled: HashSet<(u8, u8)>,
    pointers: HashMap<(u8, u8), Pointer>,

    atu: BTreeMap<(u16, u64), AtuRow>,
    atu_data_writes: Vec<u16>,
    violation: Option<Violation>,

    avb: HashMap<(u8, u8, u8), u16>,
    mode: Pointer,
    cursor: Option<Cursor>,
    tod: [TodArray; 4],
    tod_ops: Vec<u8>,

    apb: BTreeMap<u32, u32>,
}

/// A simulated switch.  Clones share the same state.
#[derive(Clone)]
pub struct SimSwitch {
    state: Arc<Mutex<State>>,
}

impl SimSwitch {
    /// A switch of `family` on a dedicated SMI bus.
    pub fn new(family: Family) -> Self {
        let info = family.info();
        let revision = if family == Family::BonsaiZ1 { 0 } else { 1 };
        let mut regs = HashMap::new();
        regs.insert(
            (info.port_base, PORT_SWITCH_ID),
            info.product_nums[0] << 4 | revision,
        );

        let mut pointers = HashMap::new();
        pointers.insert((GLOBAL1, MONITOR_MGMT_CTRL), Pointer::new(6));
        for phys in info.port_map {
            let key = (info.port_base + phys, PORT_POLICY_MGMT_CTRL);
            pointers.insert(key, Pointer::new(6));
        }

        SimSwitch {
            state: Arc::new(Mutex::new(State {
                info,
                multi_chip: None,
                smi_cmd: 0,
                smi_data: 0,
                regs,
                stalled: HashSet::new(),
                pointers,
                atu: BTreeMap::new(),
                atu_data_writes: Vec::new(),
                violation: None,
                avb: HashMap::new(),
                mode: Pointer::new(7),
                cursor: None,
                tod: [TodArray::default(); 4],
                tod_ops: Vec::new(),
                apb: BTreeMap::new(),
            })),
        }
    }

    /// A switch strapped for multi-chip addressing at `base`.
    pub fn multi_chip(family: Family, base: u8) -> Self {
        let sim = Self::new(family);
        sim.state().multi_chip = Some(base);
        sim
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a register behind the driver's back.
    pub fn poke(&self, dev_addr: u8, reg: u8, value: u16) {
        self.state().regs.insert((dev_addr, reg), value);
    }

    /// The raw contents of a plain register.
    pub fn peek(&self, dev_addr: u8, reg: u8) -> u16 {
        self.state().regs.get(&(dev_addr, reg)).copied().unwrap_or(0)
    }

    /// Make a register report busy forever.
    pub fn stall(&self, dev_addr: u8, reg: u8) {
        self.state().stalled.insert((dev_addr, reg));
    }

    /// A byte behind the Global 1 monitor/management pointer register.
    pub fn monitor_byte(&self, ptr: u8) -> u8 {
        self.state()
            .pointers
            .get(&(GLOBAL1, MONITOR_MGMT_CTRL))
            .map_or(0, |p| p.bytes[ptr as usize])
    }

    /// A byte behind a physical port's policy pointer register.
    pub fn policy_byte(&self, phys: u8, ptr: u8) -> u8 {
        let s = self.state();
        s.pointers
            .get(&(s.info.port_base + phys, PORT_POLICY_MGMT_CTRL))
            .map_or(0, |p| p.bytes[ptr as usize])
    }

    /// Every value written to the ATU data register, oldest first.
    pub fn atu_data_writes(&self) -> Vec<u16> {
        self.state().atu_data_writes.clone()
    }

    /// Latch an ATU violation for the next GetClrViolation.  `bits` is the
    /// 4-bit violation field; `spid` the physical source port.
    pub fn inject_atu_violation(
        &self,
        bits: u8,
        mac: MacAddr,
        fid: u16,
        spid: u8,
    ) {
        self.state().violation = Some(Violation {
            bits,
            mac,
            fid,
            spid,
        });
    }

    /// A register behind the AVB window, block 0.
    pub fn avb_peek(&self, port: u8, addr: u8) -> u16 {
        self.state().avb.get(&(port, 0, addr)).copied().unwrap_or(0)
    }

    pub fn avb_poke(&self, port: u8, addr: u8, value: u16) {
        self.state().avb.insert((port, 0, addr), value);
    }

    pub fn set_global_time(&self, time: u32) {
        let mut s = self.state();
        s.avb.insert((TAI_GLOBAL, 0, TAI_TIME), time as u16);
        s.avb.insert((TAI_GLOBAL, 0, TAI_TIME + 1), (time >> 16) as u16);
    }

    /// Opcodes of the time-of-day operations run so far.
    pub fn tod_ops(&self) -> Vec<u8> {
        self.state().tod_ops.clone()
    }

    /// A word of MACSec address space.
    pub fn apb_peek(&self, addr: u32) -> u32 {
        self.state().apb.get(&addr).copied().unwrap_or(0)
    }

    pub fn apb_poke(&self, addr: u32, value: u32) {
        self.state().apb.insert(addr, value);
    }
}

impl State {
    fn reg(&self, dev_addr: u8, reg: u8) -> u16 {
        self.regs.get(&(dev_addr, reg)).copied().unwrap_or(0)
    }

    fn read(&mut self, dev_addr: u8, reg: u8) -> u16 {
        let val = if let Some(p) = self.pointers.get(&(dev_addr, reg)) {
            p.read()
        } else if (dev_addr, reg) == (GLOBAL2, AVB_DATA) {
            self.avb_data()
        } else {
            self.reg(dev_addr, reg)
        };
        if self.stalled.contains(&(dev_addr, reg)) {
            val | BUSY
        } else {
            val
        }
    }

    fn write(&mut self, dev_addr: u8, reg: u8, value: u16) {
        if let Some(p) = self.pointers.get_mut(&(dev_addr, reg)) {
            p.write(value);
            return;
        }
        match (dev_addr, reg) {
            (GLOBAL1, ATU_DATA) => {
                self.atu_data_writes.push(value);
                self.regs.insert((dev_addr, reg), value);
            }
            (GLOBAL1, ATU_OP) if value & BUSY != 0 => {
                self.regs.insert((dev_addr, reg), value & !BUSY);
                self.atu_op(value);
            }
            (GLOBAL2, AVB_CMD) if value & BUSY != 0 => {
                self.regs.insert((dev_addr, reg), value & !BUSY);
                self.avb_op(value);
            }
            (APB_WINDOW, 0x00) if value & BUSY != 0 => {
                self.regs.insert((dev_addr, reg), value & !BUSY);
                self.apb_op(value);
            }
            _ => {
                self.regs.insert((dev_addr, reg), value);
            }
        }
    }

    fn read_mac(&self) -> MacAddr {
        let w = [
            self.reg(GLOBAL1, ATU_MAC),
            self.reg(GLOBAL1, ATU_MAC + 1),
            self.reg(GLOBAL1, ATU_MAC + 2),
        ];
        MacAddr::from_words(w)
    }

    fn write_mac(&mut self, mac: MacAddr) {
        for (i, w) in mac.words().into_iter().enumerate() {
            self.regs.insert((GLOBAL1, ATU_MAC + i as u8), w);
        }
    }

    fn set_op_field(&mut self, shift: u8, size: u8, value: u16) {
        let m = ((1u16 << size) - 1) << shift;
        let op = self.reg(GLOBAL1, ATU_OP);
        self.regs
            .insert((GLOBAL1, ATU_OP), (op & !m) | (value << shift & m));
    }

    fn atu_op(&mut self, cmd: u16) {
        let op = (cmd >> 12) & 0x7;
        let fid = self.reg(GLOBAL1, ATU_FID) & 0xfff;
        let data = self.reg(GLOBAL1, ATU_DATA);
        trace!("sim: ATU op {op} fid {fid}");
        match op {
            // flush/move, all or non-static, everywhere or in one FID
            1 | 2 => self.atu_flush(None, op == 2, data),
            5 | 6 => self.atu_flush(Some(fid), op == 6, data),
            3 => {
                let key = (fid, self.read_mac().to_u64());
                if data & 0xf == 0 {
                    self.atu.remove(&key);
                } else {
                    self.atu.insert(
                        key,
                        AtuRow {
                            data,
                            priority: (cmd >> 8) & 0x7,
                        },
                    );
                }
            }
            4 => {
                let after = self.read_mac();
                let lo = if after == MacAddr::BROADCAST {
                    (fid, 0)
                } else {
                    (fid, after.to_u64() + 1)
                };
                let found = self
                    .atu
                    .range(lo..=(fid, MacAddr::BROADCAST.to_u64()))
                    .next()
                    .map(|(k, v)| (*k, *v));
                match found {
                    Some(((_, mac), row)) => {
                        self.write_mac(MacAddr::from_u64(mac));
                        self.regs.insert((GLOBAL1, ATU_DATA), row.data);
                        self.set_op_field(8, 3, row.priority);
                    }
                    None => {
                        self.write_mac(MacAddr::BROADCAST);
                        self.regs.insert((GLOBAL1, ATU_DATA), 0);
                    }
                }
            }
            7 => match self.violation.take() {
                Some(v) => {
                    self.set_op_field(4, 4, v.bits as u16);
                    self.write_mac(v.mac);
                    self.regs.insert((GLOBAL1, ATU_DATA), (v.spid as u16) << 4);
                    self.regs.insert((GLOBAL1, ATU_FID), v.fid);
                }
                None => self.set_op_field(4, 4, 0),
            },
            _ => {}
        }
    }

    fn atu_flush(&mut self, fid: Option<u16>, non_static: bool, data: u16) {
        let is_move = data & 0xf == 0xf;
        let vec = (data >> 4) & 0x7ff;
        let (from, to) = (vec & 0xf, (vec >> 4) & 0xf);

        let keys: Vec<(u16, u64)> = self
            .atu
            .iter()
            .filter(|((f, mac), row)| {
                let state = row.data & 0xf;
                let multicast = MacAddr::from_u64(*mac).is_multicast();
                fid.is_none_or(|fid| fid == *f)
                    && (!non_static || (!multicast && (1..=7).contains(&state)))
            })
            .map(|(k, _)| *k)
            .collect();

        for key in keys {
            if !is_move {
                self.atu.remove(&key);
                continue;
            }
            let Some(row) = self.atu.get_mut(&key) else {
                continue;
            };
            let mut pvec = (row.data >> 4) & 0x7ff;
            if pvec & (1 << from) == 0 {
                continue;
            }
            pvec &= !(1 << from);
            if to != 0xf {
                pvec |= 1 << to;
            }
            if pvec == 0 {
                self.atu.remove(&key);
            } else {
                row.data = (row.data & !(0x7ff << 4)) | pvec << 4;
            }
        }
    }

    fn avb_op(&mut self, cmd: u16) {
        let op = (cmd >> 13) & 0x3;
        let port = ((cmd >> 8) & 0x1f) as u8;
        let block = ((cmd >> 5) & 0x7) as u8;
        let addr = (cmd & 0x1f) as u8;
        match op {
            0b01 => {
                let value = self.reg(GLOBAL2, AVB_DATA);
                match (port, block, addr) {
                    (PTP_GLOBAL, 0, PTP_MODE) => self.mode.write(value),
                    (PTP_GLOBAL, 0, TOD_CTRL) if value & BUSY != 0 => {
                        self.tod_op(value)
                    }
                    key => {
                        self.avb.insert(key, value);
                    }
                }
            }
            0b10 | 0b11 => {
                self.cursor = Some(Cursor {
                    port,
                    block,
                    addr,
                    incr: op == 0b11,
                })
            }
            _ => {}
        }
    }

    fn avb_data(&mut self) -> u16 {
        let Some(c) = self.cursor else {
            return 0;
        };
        let val = if (c.port, c.block, c.addr) == (PTP_GLOBAL, 0, PTP_MODE) {
            self.mode.read()
        } else {
            self.avb.get(&(c.port, c.block, c.addr)).copied().unwrap_or(0)
        };
        if c.incr {
            self.cursor = Some(Cursor {
                addr: c.addr.wrapping_add(1) & 0x1f,
                ..c
            });
        }
        val
    }

    fn tod_word(&self, addr: u8) -> u16 {
        self.avb.get(&(PTP_GLOBAL, 0, addr)).copied().unwrap_or(0)
    }

    fn tod_op(&mut self, ctrl: u16) {
        let op = ((ctrl >> 12) & 0x7) as u8;
        let index = ((ctrl >> 9) & 0x3) as usize;
        self.tod_ops.push(op);
        let mut stored = ctrl & !BUSY;
        match op {
            3 => {
                let mut words = [0u16; TOD_WORDS];
                for (i, w) in words.iter_mut().enumerate() {
                    *w = self.tod_word(TOD_FIRST + i as u8);
                }
                self.tod[index] = TodArray {
                    words,
                    ctrl_low: ctrl & 0x1ff,
                };
            }
            2 => {
                for a in [TOD_COMP, TOD_COMP + 1] {
                    let word = self.tod_word(a);
                    self.tod[index].words[(a - TOD_FIRST) as usize] = word;
                }
            }
            4 => {
                let ta = self.tod[index];
                for (i, w) in ta.words.iter().enumerate() {
                    let addr = TOD_FIRST + i as u8;
                    if addr != TOD_CTRL {
                        self.avb.insert((PTP_GLOBAL, 0, addr), *w);
                    }
                }
                stored = (stored & !0x1ff) | ta.ctrl_low;
            }
            _ => {}
        }
        self.avb.insert((PTP_GLOBAL, 0, TOD_CTRL), stored);
    }

    fn apb_op(&mut self, ctrl: u16) {
        let word = |hi, lo| {
            (self.reg(APB_WINDOW, hi) as u32) << 16
                | self.reg(APB_WINDOW, lo) as u32
        };
        let addr = word(0x01, 0x02);
        if ctrl & (1 << 14) != 0 {
            let value = word(0x03, 0x04);
            self.apb.insert(addr, value);
        } else {
            let value = self.apb.get(&addr).copied().unwrap_or(0);
            self.regs.insert((APB_WINDOW, 0x03), (value >> 16) as u16);
            self.regs.insert((APB_WINDOW, 0x04), value as u16);
        }
    }

    // Multi-chip mode: only the command and data registers at the strap
    // address are visible.
    fn multi_read(&mut self, base: u8, dev_addr: u8, reg: u8) -> u16 {
        match (dev_addr == base, reg) {
            (true, SMI_CMD) => self.smi_cmd,
            (true, SMI_DATA) => self.smi_data,
            _ => 0xffff,
        }
    }

    fn multi_write(&mut self, base: u8, dev_addr: u8, reg: u8, value: u16) {
        if dev_addr != base {
            return;
        }
        match reg {
            SMI_CMD if value & BUSY != 0 => {
                let inner_dev = ((value >> 5) & 0x1f) as u8;
                let inner_reg = (value & 0x1f) as u8;
                match (value >> 10) & 0x3 {
                    0b01 => self.write(inner_dev, inner_reg, self.smi_data),
                    0b10 => self.smi_data = self.read(inner_dev, inner_reg),
                    _ => {}
                }
                self.smi_cmd = value & !BUSY;
            }
            SMI_CMD => self.smi_cmd = value,
            SMI_DATA => self.smi_data = value,
            _ => {}
        }
    }
}

impl SmiBus for SimSwitch {
    fn read(&self, dev_addr: u8, reg: u8) -> Result<u16> {
        let mut s = self.state();
        Ok(match s.multi_chip {
            Some(base) => s.multi_read(base, dev_addr, reg),
            None => s.read(dev_addr, reg),
        })
    }

    fn write(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()> {
        let mut s = self.state();
        match s.multi_chip {
            Some(base) => s.multi_write(base, dev_addr, reg, value),
            None => s.write(dev_addr, reg, value),
        }
        Ok(())
    }
}

impl RmuLink for SimSwitch {
    fn tx_rx(&self, request: &[u8]) -> Result<Vec<u8>> {
        let req = RmuFrame::parse(request)?;
        let mut s = self.state();
        let cmds = req
            .cmds
            .iter()
            .map(|cmd| match *cmd {
                RmuCmd::Read { dev_addr, reg, .. } => RmuCmd::Read {
                    dev_addr,
                    reg,
                    data: s.read(dev_addr, reg),
                },
                RmuCmd::Write {
                    dev_addr,
                    reg,
                    data,
                } => {
                    s.write(dev_addr, reg, data);
                    *cmd
                }
            })
            .collect();
        Ok(req.reply(SIM_MAC, cmds).to_bytes())
    }
}
