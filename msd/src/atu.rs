// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Address translation unit (the forwarding database).
//!
//! Every operation stages its arguments in the Global 1 FID, data and MAC
//! registers, then kicks the ATU operation register and waits for its busy
//! bit to clear.  The whole sequence runs under the ATU semaphore.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::common::{get_field, set_field};
use crate::device::{Device, GLOBAL1};
use crate::error::{MsdError, Result};
use crate::sem::lock;

const ATU_FID: u8 = 0x01;
const ATU_CTRL: u8 = 0x0a;
const ATU_OP: u8 = 0x0b;
const ATU_DATA: u8 = 0x0c;
const ATU_MAC_01: u8 = 0x0d;

const OP_BUSY: u16 = 1 << 15;
const OP_BUSY_BIT: u8 = 15;
const OP_SHIFT: u8 = 12;
const PRI_SHIFT: u8 = 8;
const VIOLATION_SHIFT: u8 = 4;

const DATA_TRUNK: u16 = 1 << 15;
const PORTVEC_SHIFT: u8 = 4;
const PORTVEC_SIZE: u8 = 11;

const AGE_SHIFT: u8 = 4;
const AGE_SIZE: u8 = 8;
/// Age time granularity in seconds
pub const AGE_UNIT: u32 = 15;

/// Port number meaning "nowhere" in a move operation
const MOVE_REMOVE: u8 = 0xf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
enum AtuOp {
    FlushAll = 1,
    FlushNonStatic = 2,
    LoadPurge = 3,
    GetNext = 4,
    FlushAllFid = 5,
    FlushNonStaticFid = 6,
    GetClrViolation = 7,
}

/// A 48-bit Ethernet address
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 1 != 0
    }

    pub fn to_u64(self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| acc << 8 | *b as u64)
    }

    pub fn from_u64(v: u64) -> Self {
        let b = v.to_be_bytes();
        MacAddr([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    /// The address just below this one, wrapping to broadcast.
    pub(crate) fn pred(self) -> Self {
        MacAddr::from_u64(self.to_u64().wrapping_sub(1) & 0xffff_ffff_ffff)
    }

    pub(crate) fn words(self) -> [u16; 3] {
        let b = self.0;
        [
            u16::from_be_bytes([b[0], b[1]]),
            u16::from_be_bytes([b[2], b[3]]),
            u16::from_be_bytes([b[4], b[5]]),
        ]
    }

    pub(crate) fn from_words(w: [u16; 3]) -> Self {
        let [a, b] = w[0].to_be_bytes();
        let [c, d] = w[1].to_be_bytes();
        let [e, f] = w[2].to_be_bytes();
        MacAddr([a, b, c, d, e, f])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        let mut mac = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for byte in mac.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| {
                    MsdError::bad_param(format!("short MAC address {s}"))
                })?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| {
                MsdError::bad_param(format!("bad MAC address {s}"))
            })?;
        }
        if parts.next().is_some() {
            return Err(MsdError::bad_param(format!("long MAC address {s}")));
        }
        Ok(MacAddr(mac))
    }
}

/// The 4-bit lifecycle tag of an ATU entry.  For unicast addresses 1-7 is
/// the remaining age of a learned entry and 8-15 are static flavors; every
/// non-zero multicast state is static.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryState(u8);

impl EntryState {
    pub const UNUSED: EntryState = EntryState(0);
    pub const AGE_NEWEST: EntryState = EntryState(7);
    pub const MC_STATIC: EntryState = EntryState(0x7);
    pub const UC_STATIC: EntryState = EntryState(0xf);

    pub fn new(raw: u8) -> Result<Self> {
        if raw > 0xf {
            return Err(MsdError::bad_param(format!("entry state {raw:#x}")));
        }
        Ok(EntryState(raw))
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn is_static(self, mac: &MacAddr) -> bool {
        if mac.is_multicast() {
            self.0 != 0
        } else {
            self.0 >= 8
        }
    }
}

/// One forwarding database entry.  `port_vec` is a bitmap of logical ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtuEntry {
    pub mac: MacAddr,
    pub fid: u16,
    pub port_vec: u32,
    pub trunk: bool,
    pub state: EntryState,
    pub priority: u8,
}

impl AtuEntry {
    pub fn is_static(&self) -> bool {
        self.state.is_static(&self.mac)
    }
}

/// Which entries a flush or move touches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushScope {
    All,
    NonStatic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    AgeOut,
    Member,
    Miss,
    Full,
}

/// A latched ATU violation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtuViolation {
    pub kind: ViolationKind,
    pub mac: MacAddr,
    pub fid: u16,
    /// Logical port the offending frame arrived on, if it maps to one
    pub port: Option<u8>,
}

fn check_fid(dev: &Device, fid: u16) -> Result<()> {
    if fid > dev.info().max_fid() {
        return Err(MsdError::bad_param(format!(
            "FID {fid} exceeds {}",
            dev.info().max_fid()
        )));
    }
    Ok(())
}

fn wait_ready(dev: &Device) -> Result<()> {
    dev.wait_bit(GLOBAL1, ATU_OP, OP_BUSY_BIT, false)
}

// Caller holds the ATU semaphore.
fn run_op(dev: &Device, op: AtuOp, fid: u16, priority: u8) -> Result<()> {
    wait_ready(dev)?;
    dev.set_any_reg(GLOBAL1, ATU_FID, fid)?;
    let cmd = OP_BUSY
        | (op as u16) << OP_SHIFT
        | (priority as u16 & 0x7) << PRI_SHIFT;
    debug!("ATU op {op:?} fid {fid}");
    dev.set_any_reg(GLOBAL1, ATU_OP, cmd)?;
    wait_ready(dev)
}

fn write_mac(dev: &Device, mac: MacAddr) -> Result<()> {
    for (i, w) in mac.words().into_iter().enumerate() {
        dev.set_any_reg(GLOBAL1, ATU_MAC_01 + i as u8, w)?;
    }
    Ok(())
}

fn read_mac(dev: &Device) -> Result<MacAddr> {
    let mut w = [0u16; 3];
    for (i, word) in w.iter_mut().enumerate() {
        *word = dev.get_any_reg(GLOBAL1, ATU_MAC_01 + i as u8)?;
    }
    Ok(MacAddr::from_words(w))
}

fn encode_data(dev: &Device, entry: &AtuEntry) -> Result<u16> {
    let pvec = dev.info().to_physical_vec(entry.port_vec)?;
    let mut data = set_field(0, PORTVEC_SHIFT, PORTVEC_SIZE, pvec as u16);
    data |= entry.state.raw() as u16;
    if entry.trunk {
        data |= DATA_TRUNK;
    }
    Ok(data)
}

// Decode the staged registers after a GetNext.  Caller holds the semaphore.
fn read_entry(dev: &Device) -> Result<AtuEntry> {
    let data = dev.get_any_reg(GLOBAL1, ATU_DATA)?;
    let op = dev.get_any_reg(GLOBAL1, ATU_OP)?;
    let pvec = get_field(data, PORTVEC_SHIFT, PORTVEC_SIZE) as u32;
    Ok(AtuEntry {
        mac: read_mac(dev)?,
        fid: dev.get_any_reg_field(GLOBAL1, ATU_FID, 0, 12)?,
        port_vec: dev.info().to_logical_vec(pvec),
        trunk: data & DATA_TRUNK != 0,
        state: EntryState((data & 0xf) as u8),
        priority: get_field(op, PRI_SHIFT, 3) as u8,
    })
}

/// Add or replace an entry.
pub fn load_entry(dev: &Device, entry: &AtuEntry) -> Result<()> {
    check_fid(dev, entry.fid)?;
    if entry.state == EntryState::UNUSED {
        return Err(MsdError::bad_param(
            "loading an entry with state 0 would purge it",
        ));
    }
    if entry.priority > 7 {
        return Err(MsdError::bad_param(format!(
            "ATU priority {}",
            entry.priority
        )));
    }
    let data = encode_data(dev, entry)?;

    let _guard = lock(&dev.sems.atu_regs);
    write_mac(dev, entry.mac)?;
    dev.set_any_reg(GLOBAL1, ATU_DATA, data)?;
    run_op(dev, AtuOp::LoadPurge, entry.fid, entry.priority)
}

/// Remove the entry for `mac` in `fid`.  Purging an absent entry is not an
/// error.
pub fn delete_entry(dev: &Device, mac: MacAddr, fid: u16) -> Result<()> {
    check_fid(dev, fid)?;
    let _guard = lock(&dev.sems.atu_regs);
    write_mac(dev, mac)?;
    dev.set_any_reg(GLOBAL1, ATU_DATA, 0)?;
    run_op(dev, AtuOp::LoadPurge, fid, 0)
}

// GetNext starting after `after`.  Caller holds the semaphore.
fn next_locked(
    dev: &Device,
    fid: u16,
    after: MacAddr,
) -> Result<Option<AtuEntry>> {
    write_mac(dev, after)?;
    run_op(dev, AtuOp::GetNext, fid, 0)?;
    let entry = read_entry(dev)?;
    if entry.state == EntryState::UNUSED {
        Ok(None)
    } else {
        Ok(Some(entry))
    }
}

/// The first valid entry in `fid` with an address above `after`.  Starting
/// from broadcast begins at the lowest address.
pub fn get_next(
    dev: &Device,
    fid: u16,
    after: MacAddr,
) -> Result<Option<AtuEntry>> {
    check_fid(dev, fid)?;
    let _guard = lock(&dev.sems.atu_regs);
    next_locked(dev, fid, after)
}

/// Look up a single address.
pub fn find_entry(
    dev: &Device,
    mac: MacAddr,
    fid: u16,
) -> Result<Option<AtuEntry>> {
    check_fid(dev, fid)?;
    let _guard = lock(&dev.sems.atu_regs);
    Ok(next_locked(dev, fid, mac.pred())?.filter(|e| e.mac == mac))
}

/// Every valid entry in `fid`, in address order.
pub fn entries(dev: &Device, fid: u16) -> Result<Vec<AtuEntry>> {
    check_fid(dev, fid)?;
    let _guard = lock(&dev.sems.atu_regs);
    let mut all = Vec::new();
    let mut cursor = MacAddr::BROADCAST;
    while let Some(e) = next_locked(dev, fid, cursor)? {
        all.push(e);
        // The broadcast entry is always last; searching past it would
        // start over from the bottom.
        if e.mac == MacAddr::BROADCAST {
            break;
        }
        cursor = e.mac;
    }
    Ok(all)
}

pub fn count_entries(dev: &Device, fid: u16) -> Result<usize> {
    Ok(entries(dev, fid)?.len())
}

/// Flush entries, optionally only those in one FID.
pub fn flush(dev: &Device, scope: FlushScope, fid: Option<u16>) -> Result<()> {
    flush_move(dev, scope, fid, 0)
}

/// Move every entry pointing at `from` so that it points at `to` instead.
pub fn move_port(
    dev: &Device,
    scope: FlushScope,
    fid: Option<u16>,
    from: u8,
    to: u8,
) -> Result<()> {
    let from = dev.physical_port(from)?;
    let to = dev.physical_port(to)?;
    flush_move(dev, scope, fid, move_data(from, to))
}

/// Take `port` out of every entry's port vector.
pub fn remove_port(
    dev: &Device,
    scope: FlushScope,
    fid: Option<u16>,
    port: u8,
) -> Result<()> {
    let from = dev.physical_port(port)?;
    flush_move(dev, scope, fid, move_data(from, MOVE_REMOVE))
}

// A state of 0xf in a flush operation turns it into a move; the port vector
// field then carries the destination in bits 7:4 and the source in 3:0.
fn move_data(from: u8, to: u8) -> u16 {
    let vec = ((to as u16 & 0xf) << 4) | (from as u16 & 0xf);
    set_field(0xf, PORTVEC_SHIFT, PORTVEC_SIZE, vec)
}

fn flush_move(
    dev: &Device,
    scope: FlushScope,
    fid: Option<u16>,
    data: u16,
) -> Result<()> {
    let op = match (scope, fid) {
        (FlushScope::All, None) => AtuOp::FlushAll,
        (FlushScope::NonStatic, None) => AtuOp::FlushNonStatic,
        (FlushScope::All, Some(_)) => AtuOp::FlushAllFid,
        (FlushScope::NonStatic, Some(_)) => AtuOp::FlushNonStaticFid,
    };
    let fid = fid.unwrap_or(0);
    check_fid(dev, fid)?;

    let _guard = lock(&dev.sems.atu_regs);
    dev.set_any_reg(GLOBAL1, ATU_DATA, data)?;
    run_op(dev, op, fid, 0)
}

/// Fetch and clear the oldest latched violation.
pub fn get_violation(dev: &Device) -> Result<Option<AtuViolation>> {
    let _guard = lock(&dev.sems.atu_regs);
    run_op(dev, AtuOp::GetClrViolation, 0, 0)?;
    let op = dev.get_any_reg(GLOBAL1, ATU_OP)?;
    let kind = match get_field(op, VIOLATION_SHIFT, 4) {
        0 => return Ok(None),
        v if v & 0x8 != 0 => ViolationKind::AgeOut,
        v if v & 0x4 != 0 => ViolationKind::Member,
        v if v & 0x2 != 0 => ViolationKind::Miss,
        _ => ViolationKind::Full,
    };
    let data = dev.get_any_reg(GLOBAL1, ATU_DATA)?;
    let spid = get_field(data, PORTVEC_SHIFT, 4) as u8;
    Ok(Some(AtuViolation {
        kind,
        mac: read_mac(dev)?,
        fid: dev.get_any_reg_field(GLOBAL1, ATU_FID, 0, 12)?,
        port: dev.info().logical_port(spid),
    }))
}

/// Aging time in seconds; 0 means aging is disabled.
pub fn get_age_time(dev: &Device) -> Result<u32> {
    let _guard = lock(&dev.sems.atu_regs);
    let units = dev.get_any_reg_field(GLOBAL1, ATU_CTRL, AGE_SHIFT, AGE_SIZE)?;
    Ok(units as u32 * AGE_UNIT)
}

/// Set the aging time: 0 disables aging, otherwise a multiple of 15 s up to
/// 3825 s.
pub fn set_age_time(dev: &Device, secs: u32) -> Result<()> {
    if secs % AGE_UNIT != 0 || secs / AGE_UNIT > 0xff {
        return Err(MsdError::bad_param(format!(
            "age time {secs}s must be 0 (off) or a multiple of {AGE_UNIT}s \
             up to {}s",
            0xff * AGE_UNIT
        )));
    }
    let _guard = lock(&dev.sems.atu_regs);
    dev.set_any_reg_field(
        GLOBAL1,
        ATU_CTRL,
        AGE_SHIFT,
        AGE_SIZE,
        (secs / AGE_UNIT) as u16,
    )
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

    fn entry(
        mac: &str,
        fid: u16,
        port_vec: u32,
        state: EntryState,
    ) -> AtuEntry {
        AtuEntry {
            mac: mac.parse().unwrap(),
            fid,
            port_vec,
            trunk: false,
            state,
            priority: 0,
        }
    }

    #[test]
    fn mac_parsing() {
        let m: MacAddr = "00:11:22:aa:bb:cc".parse().unwrap();
        assert_eq!(m.to_string(), "00:11:22:aa:bb:cc");
        assert_eq!("00-11-22-aa-bb-cc".parse::<MacAddr>().unwrap(), m);
        assert!("00:11:22".parse::<MacAddr>().is_err());
        assert!("00:11:22:aa:bb:cc:dd".parse::<MacAddr>().is_err());
        assert_eq!(MacAddr([0; 6]).pred(), MacAddr::BROADCAST);
        assert_eq!(
            MacAddr([0, 0, 0, 0, 1, 0]).pred(),
            MacAddr([0, 0, 0, 0, 0, 0xff])
        );
    }

    #[test]
    fn load_find_delete() {
        let (_sim, dev) = setup(Family::Peridot);
        let e = AtuEntry {
            priority: 5,
            ..entry("00:11:22:33:44:55", 1, 0b1010, EntryState::UC_STATIC)
        };
        load_entry(&dev, &e).unwrap();
        assert_eq!(find_entry(&dev, e.mac, 1).unwrap(), Some(e));
        assert_eq!(find_entry(&dev, e.mac, 2).unwrap(), None);
        assert!(e.is_static());

        delete_entry(&dev, e.mac, 1).unwrap();
        assert_eq!(find_entry(&dev, e.mac, 1).unwrap(), None);
    }

    #[test]
    fn rejects_bad_entries() {
        let (_sim, dev) = setup(Family::Spruce);
        let e = entry("00:00:00:00:00:01", 0x100, 1, EntryState::UC_STATIC);
        assert!(matches!(load_entry(&dev, &e), Err(MsdError::BadParam(_))));
        let e = entry("00:00:00:00:00:01", 1, 1 << 8, EntryState::UC_STATIC);
        assert!(matches!(load_entry(&dev, &e), Err(MsdError::BadParam(_))));
        let e = entry("00:00:00:00:00:01", 1, 1, EntryState::UNUSED);
        assert!(matches!(load_entry(&dev, &e), Err(MsdError::BadParam(_))));
    }

    #[test]
    fn walk_in_order() {
        let (_sim, dev) = setup(Family::Amethyst);
        let fid3 = [
            "00:00:00:00:00:03",
            "ff:ff:ff:ff:ff:ff",
            "00:00:00:00:00:01",
        ];
        for mac in fid3 {
            load_entry(&dev, &entry(mac, 3, 1, EntryState::UC_STATIC)).unwrap();
        }
        let other = entry("00:00:00:00:00:02", 4, 1, EntryState::AGE_NEWEST);
        load_entry(&dev, &other).unwrap();
        let macs: Vec<String> = entries(&dev, 3)
            .unwrap()
            .iter()
            .map(|e| e.mac.to_string())
            .collect();
        assert_eq!(
            macs,
            ["00:00:00:00:00:01", "00:00:00:00:00:03", "ff:ff:ff:ff:ff:ff"]
        );
        assert_eq!(count_entries(&dev, 4).unwrap(), 1);
        assert_eq!(count_entries(&dev, 5).unwrap(), 0);

        let after: MacAddr = "00:00:00:00:00:01".parse().unwrap();
        let next = get_next(&dev, 3, after).unwrap().unwrap();
        assert_eq!(next.mac.to_string(), "00:00:00:00:00:03");
        assert_eq!(get_next(&dev, 5, after).unwrap(), None);
    }

    #[test]
    fn flush_scopes() {
        let (_sim, dev) = setup(Family::Amethyst);
        for (mac, fid, state) in [
            ("00:00:00:00:00:01", 1, EntryState::UC_STATIC),
            ("00:00:00:00:00:02", 1, EntryState::AGE_NEWEST),
            ("00:00:00:00:00:03", 2, EntryState::AGE_NEWEST),
        ] {
            load_entry(&dev, &entry(mac, fid, 1, state)).unwrap();
        }

        flush(&dev, FlushScope::NonStatic, Some(1)).unwrap();
        assert_eq!(count_entries(&dev, 1).unwrap(), 1);
        assert_eq!(count_entries(&dev, 2).unwrap(), 1);

        flush(&dev, FlushScope::All, None).unwrap();
        assert_eq!(count_entries(&dev, 1).unwrap(), 0);
        assert_eq!(count_entries(&dev, 2).unwrap(), 0);
    }

    #[test]
    fn move_and_remove() {
        let (sim, dev) = setup(Family::Spruce);
        let mac: MacAddr = "00:00:00:00:00:01".parse().unwrap();
        let pinned = entry("00:00:00:00:00:01", 1, 0b11, EntryState::UC_STATIC);
        let learned =
            entry("00:00:00:00:00:02", 1, 0b10, EntryState::AGE_NEWEST);
        load_entry(&dev, &pinned).unwrap();
        load_entry(&dev, &learned).unwrap();

        move_port(&dev, FlushScope::All, None, 1, 7).unwrap();
        assert_eq!(sim.atu_data_writes().last(), Some(&0x091f));
        let e = find_entry(&dev, mac, 1).unwrap().unwrap();
        assert_eq!(e.port_vec, 0b1000_0001);

        remove_port(&dev, FlushScope::All, Some(1), 7).unwrap();
        let e = find_entry(&dev, mac, 1).unwrap().unwrap();
        assert_eq!(e.port_vec, 0b0000_0001);
        // the dynamic entry lost its only port
        assert_eq!(count_entries(&dev, 1).unwrap(), 1);
    }

    #[test]
    fn violations() {
        let (sim, dev) = setup(Family::Peridot);
        assert_eq!(get_violation(&dev).unwrap(), None);
        let mac: MacAddr = "00:aa:00:00:00:01".parse().unwrap();
        sim.inject_atu_violation(0x2, mac, 9, 4);
        let v = get_violation(&dev).unwrap().unwrap();
        assert_eq!(v.kind, ViolationKind::Miss);
        assert_eq!(v.mac, mac);
        assert_eq!(v.fid, 9);
        assert_eq!(v.port, Some(4));
        assert_eq!(get_violation(&dev).unwrap(), None);
    }

    #[test]
    fn age_time() {
        let (_sim, dev) = setup(Family::Peridot);
        set_age_time(&dev, 300).unwrap();
        assert_eq!(get_age_time(&dev).unwrap(), 300);
        assert!(set_age_time(&dev, 301).is_err());
        assert!(matches!(
            set_age_time(&dev, 14),
            Err(MsdError::BadParam(_))
        ));
        assert!(set_age_time(&dev, 256 * 15).is_err());
        set_age_time(&dev, 3825).unwrap();
        assert_eq!(get_age_time(&dev).unwrap(), 3825);

        // zero turns aging off
        set_age_time(&dev, 0).unwrap();
        assert_eq!(get_age_time(&dev).unwrap(), 0);
    }

    #[test]
    fn busy_hardware_fails_bounded() {
        let sim = SimSwitch::new(Family::Peridot);
        let cfg = SysConfig {
            poll_limit: 16,
            ..Default::default()
        };
        let dev = Device::load(cfg, Bsp::smi(sim.clone())).unwrap();
        sim.stall(GLOBAL1, ATU_OP);
        let e = entry("00:00:00:00:00:01", 0, 1, EntryState::UC_STATIC);
        assert!(matches!(load_entry(&dev, &e), Err(MsdError::Fail(_))));
    }
}
