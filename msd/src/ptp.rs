// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Precision Time Protocol support.
//!
//! The PTP, TAI and per-port timestamping registers are not on the SMI bus
//! directly; they are reached through the AVB command/data pair in Global 2.
//! A command names the target (port, block, register) and an opcode; a
//! read-increment command lets a whole record be read back with successive
//! reads of the data register.

use log::debug;

use crate::bus::Poller;
use crate::common::{join_words, split_words};
use crate::device::{Device, GLOBAL2};
use crate::error::{MsdError, Result};
use crate::indirect::{PointerReg, WordReg};
use crate::sem::lock;

const AVB_CMD: u8 = 0x16;
const AVB_DATA: u8 = 0x17;
const AVB_BUSY_BIT: u8 = 15;
const AVB_BUSY: u16 = 1 << 15;
const AVB_OP_READ: u16 = 0x4000;
const AVB_OP_READ_INCR: u16 = 0x6000;
const AVB_OP_WRITE: u16 = 0x2000;

/// Port field value addressing the PTP global registers
pub const PORT_PTP_GLOBAL: u8 = 0x1f;
/// Port field value addressing the TAI global registers
pub const PORT_TAI_GLOBAL: u8 = 0x1e;
const BLOCK_PTP: u8 = 0;

// Per-port registers
const PORT_CONFIG0: u8 = 0x00;
const PORT_CONFIG2: u8 = 0x02;
const PORT_ARR0_STATUS: u8 = 0x08;
const PORT_ARR1_STATUS: u8 = 0x0c;
const PORT_DEP_STATUS: u8 = 0x10;
const PORT_MEAN_PATH_DELAY: u8 = 0x1c;
const PORT_IGR_ASYM: u8 = 0x1d;
const PORT_EGR_ASYM: u8 = 0x1e;

const CONFIG0_DISABLE: u16 = 1 << 0;
const CONFIG0_TSPEC_SHIFT: u8 = 12;
const CONFIG2_ARR_INT: u16 = 1 << 0;
const CONFIG2_DEP_INT: u16 = 1 << 1;

// PTP global registers
const GLOBAL_ETYPE: u8 = 0x00;
const GLOBAL_MSG_TYPES: u8 = 0x01;
const GLOBAL_TS_ARR_PTR: u8 = 0x02;
const GLOBAL_MODE: u8 = 0x07;
const TOD_LOAD_POINT: u8 = 0x10;
const TOD_CTRL: u8 = 0x12;
const TOD_NANOS: u8 = 0x13;
const TOD_SECS: u8 = 0x15;
const TOD_1722: u8 = 0x18;
const TOD_COMP: u8 = 0x1c;
/// Number of words from TOD_LOAD_POINT through the end of the compensation
const TOD_ARRAY_WORDS: usize = 14;

const TOD_BUSY: u16 = 1 << 15;
const TOD_OP_SHIFT: u8 = 12;
const TOD_INDEX_SHIFT: u8 = 9;
const TOD_CLK_VALID: u16 = 1 << 8;

// TAI global registers
const TAI_TIME_LO: u8 = 0x0e;

const MODE_PTR: u8 = 0x00;
const MODE_GM: u8 = 1 << 0;
const MODE_ONE_STEP: u8 = 1 << 1;
const MODE_KIND_SHIFT: u8 = 2;

/// Number of time arrays in the ToD block
pub const TIME_ARRAYS: u8 = 4;
const MAX_SECS: u64 = (1 << 48) - 1;
const NANOS_PER_SEC: u32 = 1_000_000_000;

fn wait_avb(dev: &Device) -> Result<()> {
    dev.wait_bit(GLOBAL2, AVB_CMD, AVB_BUSY_BIT, false)
}

fn avb_cmd(op: u16, port: u8, block: u8, addr: u8) -> u16 {
    AVB_BUSY
        | op
        | (port as u16 & 0x1f) << 8
        | (block as u16 & 0x7) << 5
        | (addr as u16 & 0x1f)
}

/// Read `out.len()` consecutive registers.  Caller holds the PTP register
/// semaphore for the whole record.
fn avb_read(dev: &Device, port: u8, addr: u8, out: &mut [u16]) -> Result<()> {
    let op = if out.len() > 1 { AVB_OP_READ_INCR } else { AVB_OP_READ };
    wait_avb(dev)?;
    dev.set_any_reg(GLOBAL2, AVB_CMD, avb_cmd(op, port, BLOCK_PTP, addr))?;
    wait_avb(dev)?;
    for word in out.iter_mut() {
        *word = dev.get_any_reg(GLOBAL2, AVB_DATA)?;
    }
    Ok(())
}

fn avb_write(dev: &Device, port: u8, addr: u8, data: u16) -> Result<()> {
    wait_avb(dev)?;
    dev.set_any_reg(GLOBAL2, AVB_DATA, data)?;
    let cmd = avb_cmd(AVB_OP_WRITE, port, BLOCK_PTP, addr);
    dev.set_any_reg(GLOBAL2, AVB_CMD, cmd)?;
    wait_avb(dev)
}

/// Write consecutive registers, one command per word.
fn avb_write_all(
    dev: &Device,
    port: u8,
    addr: u8,
    words: &[u16],
) -> Result<()> {
    for (i, w) in words.iter().enumerate() {
        avb_write(dev, port, addr + i as u8, *w)?;
    }
    Ok(())
}

fn avb_read1(dev: &Device, port: u8, addr: u8) -> Result<u16> {
    let mut w = [0u16];
    avb_read(dev, port, addr, &mut w)?;
    Ok(w[0])
}

/// A register behind the AVB window, for use with `PointerReg`
struct AvbReg<'a> {
    dev: &'a Device,
    port: u8,
    addr: u8,
}

impl WordReg for AvbReg<'_> {
    fn read(&self) -> Result<u16> {
        avb_read1(self.dev, self.port, self.addr)
    }

    fn write(&self, value: u16) -> Result<()> {
        avb_write(self.dev, self.port, self.addr, value)
    }

    fn poller(&self) -> Poller {
        self.dev.poller()
    }
}

fn port_field(dev: &Device, port: u8) -> Result<u8> {
    dev.physical_port(port)
}

// Read-modify-write of one per-port register under the PTP semaphore.
fn update_port_reg(
    dev: &Device,
    port: u8,
    addr: u8,
    f: impl FnOnce(u16) -> u16,
) -> Result<()> {
    let pf = port_field(dev, port)?;
    let _guard = lock(&dev.sems.ptp_regs);
    let old = avb_read1(dev, pf, addr)?;
    avb_write(dev, pf, addr, f(old))
}

fn read_port_reg(dev: &Device, port: u8, addr: u8) -> Result<u16> {
    let pf = port_field(dev, port)?;
    let _guard = lock(&dev.sems.ptp_regs);
    avb_read1(dev, pf, addr)
}

fn write_port_reg(dev: &Device, port: u8, addr: u8, value: u16) -> Result<()> {
    let pf = port_field(dev, port)?;
    let _guard = lock(&dev.sems.ptp_regs);
    avb_write(dev, pf, addr, value)
}

fn read_global(dev: &Device, addr: u8) -> Result<u16> {
    let _guard = lock(&dev.sems.ptp_regs);
    avb_read1(dev, PORT_PTP_GLOBAL, addr)
}

fn write_global(dev: &Device, addr: u8, value: u16) -> Result<()> {
    let _guard = lock(&dev.sems.ptp_regs);
    avb_write(dev, PORT_PTP_GLOBAL, addr, value)
}

pub fn set_port_enable(dev: &Device, port: u8, enable: bool) -> Result<()> {
    update_port_reg(dev, port, PORT_CONFIG0, |v| {
        if enable { v & !CONFIG0_DISABLE } else { v | CONFIG0_DISABLE }
    })
}

pub fn get_port_enable(dev: &Device, port: u8) -> Result<bool> {
    Ok(read_port_reg(dev, port, PORT_CONFIG0)? & CONFIG0_DISABLE == 0)
}

/// The 4-bit transportSpecific value PTP frames must carry to be
/// timestamped on this port.
pub fn set_transport_specific(dev: &Device, port: u8, tspec: u8) -> Result<()> {
    if tspec > 0xf {
        return Err(MsdError::bad_param(format!("transportSpecific {tspec}")));
    }
    update_port_reg(dev, port, PORT_CONFIG0, |v| {
        (v & 0x0fff) | (tspec as u16) << CONFIG0_TSPEC_SHIFT
    })
}

pub fn get_transport_specific(dev: &Device, port: u8) -> Result<u8> {
    Ok((read_port_reg(dev, port, PORT_CONFIG0)? >> CONFIG0_TSPEC_SHIFT) as u8)
}

/// Timestamp interrupt enables for one port
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortInterrupts {
    pub arrival: bool,
    pub departure: bool,
}

pub fn set_interrupts(
    dev: &Device,
    port: u8,
    ints: PortInterrupts,
) -> Result<()> {
    update_port_reg(dev, port, PORT_CONFIG2, |v| {
        let mut v = v & !(CONFIG2_ARR_INT | CONFIG2_DEP_INT);
        if ints.arrival {
            v |= CONFIG2_ARR_INT;
        }
        if ints.departure {
            v |= CONFIG2_DEP_INT;
        }
        v
    })
}

pub fn get_interrupts(dev: &Device, port: u8) -> Result<PortInterrupts> {
    let v = read_port_reg(dev, port, PORT_CONFIG2)?;
    Ok(PortInterrupts {
        arrival: v & CONFIG2_ARR_INT != 0,
        departure: v & CONFIG2_DEP_INT != 0,
    })
}

/// Which of a port's three timestamp slots to read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampKind {
    Arrival0,
    Arrival1,
    Departure,
}

impl TimestampKind {
    fn base(self) -> u8 {
        match self {
            TimestampKind::Arrival0 => PORT_ARR0_STATUS,
            TimestampKind::Arrival1 => PORT_ARR1_STATUS,
            TimestampKind::Departure => PORT_DEP_STATUS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampStatus {
    Normal,
    Overwritten,
    Discarded,
}

/// A captured frame timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub time: u32,
    pub seq_id: u16,
    pub status: TimestampStatus,
}

/// Read a timestamp slot.  Returns `None` when the slot holds nothing.
pub fn get_timestamp(
    dev: &Device,
    port: u8,
    kind: TimestampKind,
) -> Result<Option<Timestamp>> {
    let pf = port_field(dev, port)?;
    let mut w = [0u16; 4];
    {
        let _guard = lock(&dev.sems.ptp_regs);
        avb_read(dev, pf, kind.base(), &mut w)?;
    }
    if w[0] & 1 == 0 {
        return Ok(None);
    }
    let status = match (w[0] >> 1) & 0x3 {
        0 => TimestampStatus::Normal,
        1 => TimestampStatus::Overwritten,
        2 => TimestampStatus::Discarded,
        s => {
            return Err(MsdError::fail(format!(
                "reserved timestamp status {s}"
            )));
        }
    };
    Ok(Some(Timestamp {
        time: join_words(&w[1..3]) as u32,
        seq_id: w[3],
        status,
    }))
}

/// Release a timestamp slot so the hardware can capture into it again.
pub fn clear_timestamp(
    dev: &Device,
    port: u8,
    kind: TimestampKind,
) -> Result<()> {
    write_port_reg(dev, port, kind.base(), 0)
}

/// Mean link delay to the peer, in nanoseconds.
pub fn set_mean_path_delay(dev: &Device, port: u8, ns: u16) -> Result<()> {
    write_port_reg(dev, port, PORT_MEAN_PATH_DELAY, ns)
}

pub fn get_mean_path_delay(dev: &Device, port: u8) -> Result<u16> {
    read_port_reg(dev, port, PORT_MEAN_PATH_DELAY)
}

pub fn set_ingress_path_delay_asym(
    dev: &Device,
    port: u8,
    ns: u16,
) -> Result<()> {
    write_port_reg(dev, port, PORT_IGR_ASYM, ns)
}

pub fn get_ingress_path_delay_asym(dev: &Device, port: u8) -> Result<u16> {
    read_port_reg(dev, port, PORT_IGR_ASYM)
}

pub fn set_egress_path_delay_asym(
    dev: &Device,
    port: u8,
    ns: u16,
) -> Result<()> {
    write_port_reg(dev, port, PORT_EGR_ASYM, ns)
}

pub fn get_egress_path_delay_asym(dev: &Device, port: u8) -> Result<u16> {
    read_port_reg(dev, port, PORT_EGR_ASYM)
}

pub fn set_ether_type(dev: &Device, etype: u16) -> Result<()> {
    write_global(dev, GLOBAL_ETYPE, etype)
}

pub fn get_ether_type(dev: &Device) -> Result<u16> {
    read_global(dev, GLOBAL_ETYPE)
}

/// Bitmask of PTP messageType values that get timestamped.
pub fn set_msg_types(dev: &Device, mask: u16) -> Result<()> {
    write_global(dev, GLOBAL_MSG_TYPES, mask)
}

pub fn get_msg_types(dev: &Device) -> Result<u16> {
    read_global(dev, GLOBAL_MSG_TYPES)
}

/// Bitmask of messageType values captured into arrival slot 1 instead of 0.
pub fn set_arrival1_msg_types(dev: &Device, mask: u16) -> Result<()> {
    write_global(dev, GLOBAL_TS_ARR_PTR, mask)
}

pub fn get_arrival1_msg_types(dev: &Device) -> Result<u16> {
    read_global(dev, GLOBAL_TS_ARR_PTR)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockKind {
    Boundary = 0,
    PeerToPeerTransparent = 1,
    EndToEndTransparent = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PtpMode {
    pub grandmaster: bool,
    pub one_step: bool,
    pub kind: ClockKind,
}

fn mode_reg(dev: &Device) -> PointerReg<AvbReg<'_>> {
    PointerReg::new(
        AvbReg {
            dev,
            port: PORT_PTP_GLOBAL,
            addr: GLOBAL_MODE,
        },
        7,
    )
}

pub fn set_mode(dev: &Device, mode: PtpMode) -> Result<()> {
    let mut raw = (mode.kind as u8) << MODE_KIND_SHIFT;
    if mode.grandmaster {
        raw |= MODE_GM;
    }
    if mode.one_step {
        raw |= MODE_ONE_STEP;
    }
    let _mode = lock(&dev.sems.ptp_mode);
    let _regs = lock(&dev.sems.ptp_regs);
    mode_reg(dev).update(MODE_PTR, 0x0f, raw)
}

pub fn get_mode(dev: &Device) -> Result<PtpMode> {
    let raw = {
        let _mode = lock(&dev.sems.ptp_mode);
        let _regs = lock(&dev.sems.ptp_regs);
        mode_reg(dev).read(MODE_PTR)?
    };
    let kind = match (raw >> MODE_KIND_SHIFT) & 0x3 {
        0 => ClockKind::Boundary,
        1 => ClockKind::PeerToPeerTransparent,
        2 => ClockKind::EndToEndTransparent,
        k => return Err(MsdError::fail(format!("reserved PTP mode {k}"))),
    };
    Ok(PtpMode {
        grandmaster: raw & MODE_GM != 0,
        one_step: raw & MODE_ONE_STEP != 0,
        kind,
    })
}

/// Contents of one time-of-day array
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeArray {
    /// Global time at which a stored array takes effect
    pub load_point: u32,
    pub tod_nanos: u32,
    /// 48-bit seconds
    pub tod_secs: u64,
    /// 802.1AS / IEEE 1722 time in nanoseconds
    pub ts_1722: u64,
    /// Frequency compensation, in hardware units
    pub compensation: u32,
    pub domain: u8,
    pub clock_valid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TodOp {
    StoreCompensation = 2,
    StoreAll = 3,
    Capture = 4,
}

fn check_index(index: u8) -> Result<()> {
    if index >= TIME_ARRAYS {
        return Err(MsdError::bad_param(format!("time array {index}")));
    }
    Ok(())
}

fn wait_tod(dev: &Device) -> Result<()> {
    dev.poller().until("ToD operation", || {
        Ok(avb_read1(dev, PORT_PTP_GLOBAL, TOD_CTRL)? & TOD_BUSY == 0)
    })
}

// Kick a ToD operation and wait for it.  Caller holds both ToD and PTP
// register semaphores.
fn tod_op(dev: &Device, op: TodOp, index: u8, low: u16) -> Result<()> {
    let ctrl = TOD_BUSY
        | (op as u16) << TOD_OP_SHIFT
        | (index as u16) << TOD_INDEX_SHIFT
        | low;
    debug!("ToD op {op:?} on array {index}");
    avb_write(dev, PORT_PTP_GLOBAL, TOD_CTRL, ctrl)?;
    wait_tod(dev)
}

/// Load every field of a time array.
pub fn store_all(dev: &Device, index: u8, ta: &TimeArray) -> Result<()> {
    check_index(index)?;
    if ta.tod_secs > MAX_SECS {
        return Err(MsdError::bad_param(format!(
            "ToD seconds {:#x} exceed 48 bits",
            ta.tod_secs
        )));
    }
    if ta.tod_nanos >= NANOS_PER_SEC {
        return Err(MsdError::bad_param(format!(
            "ToD nanoseconds {}",
            ta.tod_nanos
        )));
    }

    let _tod = lock(&dev.sems.ptp_tod);
    let _regs = lock(&dev.sems.ptp_regs);
    wait_tod(dev)?;
    let tod = |addr, words: &[u16]| {
        avb_write_all(dev, PORT_PTP_GLOBAL, addr, words)
    };
    tod(TOD_LOAD_POINT, &split_words::<2>(ta.load_point as u64))?;
    tod(TOD_NANOS, &split_words::<2>(ta.tod_nanos as u64))?;
    tod(TOD_SECS, &split_words::<3>(ta.tod_secs))?;
    tod(TOD_1722, &split_words::<4>(ta.ts_1722))?;
    tod(TOD_COMP, &split_words::<2>(ta.compensation as u64))?;
    let low = if ta.clock_valid { TOD_CLK_VALID } else { 0 } | ta.domain as u16;
    tod_op(dev, TodOp::StoreAll, index, low)
}

/// Update only the frequency compensation of a time array.
pub fn store_compensation(
    dev: &Device,
    index: u8,
    compensation: u32,
) -> Result<()> {
    check_index(index)?;
    let _tod = lock(&dev.sems.ptp_tod);
    let _regs = lock(&dev.sems.ptp_regs);
    wait_tod(dev)?;
    let words = split_words::<2>(compensation as u64);
    avb_write_all(dev, PORT_PTP_GLOBAL, TOD_COMP, &words)?;
    tod_op(dev, TodOp::StoreCompensation, index, 0)
}

/// Capture a time array and read it back as one record.
pub fn capture_all(dev: &Device, index: u8) -> Result<TimeArray> {
    check_index(index)?;
    let _tod = lock(&dev.sems.ptp_tod);
    let _regs = lock(&dev.sems.ptp_regs);
    wait_tod(dev)?;
    tod_op(dev, TodOp::Capture, index, 0)?;

    let mut w = [0u16; TOD_ARRAY_WORDS];
    avb_read(dev, PORT_PTP_GLOBAL, TOD_LOAD_POINT, &mut w)?;
    let ctrl = avb_read1(dev, PORT_PTP_GLOBAL, TOD_CTRL)?;

    // offsets within `w`, relative to TOD_LOAD_POINT
    let at = |reg: u8| (reg - TOD_LOAD_POINT) as usize;
    Ok(TimeArray {
        load_point: join_words(&w[0..2]) as u32,
        tod_nanos: join_words(&w[at(TOD_NANOS)..at(TOD_NANOS) + 2]) as u32,
        tod_secs: join_words(&w[at(TOD_SECS)..at(TOD_SECS) + 3]),
        ts_1722: join_words(&w[at(TOD_1722)..at(TOD_1722) + 4]),
        compensation: join_words(&w[at(TOD_COMP)..at(TOD_COMP) + 2]) as u32,
        domain: ctrl as u8,
        clock_valid: ctrl & TOD_CLK_VALID != 0,
    })
}

/// The free-running PTP global time counter.
pub fn get_global_time(dev: &Device) -> Result<u32> {
    let mut w = [0u16; 2];
    let _guard = lock(&dev.sems.ptp_regs);
    avb_read(dev, PORT_TAI_GLOBAL, TAI_TIME_LO, &mut w)?;
    Ok(join_words(&w) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Family;
    use crate::sim::SimSwitch;
    use crate::{Bsp, SysConfig};

    fn setup(family: Family) -> (SimSwitch, Device) {
        let sim = SimSwitch::new(family);
        let dev =
            Device::load(SysConfig::default(), Bsp::smi(sim.clone())).unwrap();
        (sim, dev)
    }

    #[test]
    fn command_encoding() {
        assert_eq!(avb_cmd(AVB_OP_READ, 0x1f, 0, 0x12), 0xdf12);
        assert_eq!(avb_cmd(AVB_OP_WRITE, 3, 0, 0x1c), 0xa31c);
        assert_eq!(avb_cmd(AVB_OP_READ_INCR, 0x1e, 0, 0x0e), 0xfe0e);
    }

    #[test]
    fn port_config() {
        let (sim, dev) = setup(Family::Peridot);
        set_port_enable(&dev, 2, false).unwrap();
        set_transport_specific(&dev, 2, 1).unwrap();
        assert!(!get_port_enable(&dev, 2).unwrap());
        assert_eq!(get_transport_specific(&dev, 2).unwrap(), 1);
        assert_eq!(sim.avb_peek(2, PORT_CONFIG0), 0x1001);
        set_port_enable(&dev, 2, true).unwrap();
        assert_eq!(sim.avb_peek(2, PORT_CONFIG0), 0x1000);
        assert!(set_transport_specific(&dev, 2, 16).is_err());

        let ints = PortInterrupts {
            arrival: true,
            departure: false,
        };
        set_interrupts(&dev, 2, ints).unwrap();
        assert_eq!(get_interrupts(&dev, 2).unwrap(), ints);
    }

    #[test]
    fn path_delays() {
        let (sim, dev) = setup(Family::Spruce);
        set_mean_path_delay(&dev, 7, 420).unwrap();
        set_ingress_path_delay_asym(&dev, 7, 12).unwrap();
        set_egress_path_delay_asym(&dev, 7, 34).unwrap();
        assert_eq!(sim.avb_peek(9, PORT_MEAN_PATH_DELAY), 420);
        assert_eq!(get_mean_path_delay(&dev, 7).unwrap(), 420);
        assert_eq!(get_ingress_path_delay_asym(&dev, 7).unwrap(), 12);
        assert_eq!(get_egress_path_delay_asym(&dev, 7).unwrap(), 34);
        assert!(set_mean_path_delay(&dev, 8, 1).is_err());
    }

    #[test]
    fn timestamps() {
        let (sim, dev) = setup(Family::Amethyst);
        let departure = || get_timestamp(&dev, 1, TimestampKind::Departure);
        assert_eq!(departure().unwrap(), None);
        sim.avb_poke(1, PORT_DEP_STATUS, 0x0003);
        sim.avb_poke(1, PORT_DEP_STATUS + 1, 0x5678);
        sim.avb_poke(1, PORT_DEP_STATUS + 2, 0x1234);
        sim.avb_poke(1, PORT_DEP_STATUS + 3, 0x0042);
        let ts = departure().unwrap().unwrap();
        assert_eq!(ts.time, 0x1234_5678);
        assert_eq!(ts.seq_id, 0x42);
        assert_eq!(ts.status, TimestampStatus::Overwritten);

        clear_timestamp(&dev, 1, TimestampKind::Departure).unwrap();
        assert_eq!(departure().unwrap(), None);
    }

    #[test]
    fn globals_and_mode() {
        let (_sim, dev) = setup(Family::Amethyst);
        set_ether_type(&dev, 0x88f7).unwrap();
        set_msg_types(&dev, 0x000f).unwrap();
        set_arrival1_msg_types(&dev, 0x0008).unwrap();
        assert_eq!(get_ether_type(&dev).unwrap(), 0x88f7);
        assert_eq!(get_msg_types(&dev).unwrap(), 0x000f);
        assert_eq!(get_arrival1_msg_types(&dev).unwrap(), 0x0008);

        let mode = PtpMode {
            grandmaster: true,
            one_step: false,
            kind: ClockKind::PeerToPeerTransparent,
        };
        set_mode(&dev, mode).unwrap();
        assert_eq!(get_mode(&dev).unwrap(), mode);
    }

    #[test]
    fn time_array_round_trip() {
        let (sim, dev) = setup(Family::Peridot);
        let ta = TimeArray {
            load_point: 0x0bad_cafe,
            tod_nanos: 999_999_999,
            tod_secs: 0x0000_1234_5678_9abc,
            ts_1722: 0x0123_4567_89ab_cdef,
            compensation: 0x8000_0001,
            domain: 24,
            clock_valid: true,
        };
        store_all(&dev, 2, &ta).unwrap();
        assert_eq!(capture_all(&dev, 2).unwrap(), ta);
        assert_eq!(capture_all(&dev, 1).unwrap(), TimeArray::default());

        store_compensation(&dev, 2, 7).unwrap();
        assert_eq!(capture_all(&dev, 2).unwrap().compensation, 7);
        assert_eq!(sim.tod_ops(), vec![3, 4, 4, 2, 4]);
    }

    #[test]
    fn time_array_validation() {
        let (_sim, dev) = setup(Family::Peridot);
        let mut ta = TimeArray::default();
        assert!(store_all(&dev, 4, &ta).is_err());
        ta.tod_nanos = NANOS_PER_SEC;
        assert!(store_all(&dev, 0, &ta).is_err());
        ta.tod_nanos = 0;
        ta.tod_secs = 1 << 48;
        assert!(store_all(&dev, 0, &ta).is_err());
        assert!(capture_all(&dev, 7).is_err());
    }

    #[test]
    fn global_time() {
        let (sim, dev) = setup(Family::Peridot);
        sim.set_global_time(0xdead_beef);
        assert_eq!(get_global_time(&dev).unwrap(), 0xdead_beef);
    }
}
