// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! IEEE 802.1AE MACSec engine.
//!
//! The MACSec block has its own 32-bit address space, reached through an
//! APB-style window of 16-bit SMI registers: address and data halves plus a
//! control register whose busy bit starts the access.  Rules, SecYs, secure
//! channels and security associations are fixed-size records in that space.
//! A record only exists while its valid bit is set; deleting one zeroes the
//! whole record.

use log::debug;

use crate::atu::MacAddr;
use crate::common::{get_bits, set_bits};
use crate::device::{APB_WINDOW, Device};
use crate::error::{MsdError, Result};
use crate::sem::lock;

const APB_CTRL: u8 = 0x00;
const APB_ADDR_HI: u8 = 0x01;
const APB_ADDR_LO: u8 = 0x02;
const APB_DATA_HI: u8 = 0x03;
const APB_DATA_LO: u8 = 0x04;
const APB_BUSY_BIT: u8 = 15;
const APB_BUSY: u16 = 1 << 15;
const APB_WRITE: u16 = 1 << 14;

const GLOBAL_CTRL: u32 = 0x0000;
const GLOBAL_ENABLE: u32 = 1 << 0;
const GLOBAL_BYPASS_MISS: u32 = 1 << 1;

const RULE_BASE: u32 = 0x1000;
const RULE_STRIDE: u32 = 0x20;
const RULE_WORDS: usize = 8;
pub const NUM_RULES: u8 = 8;

const SECY_BASE: u32 = 0x2000;
const SECY_STRIDE: u32 = 0x10;
const SECY_WORDS: usize = 2;
pub const NUM_SECY: u8 = 8;

const SC_BASE: u32 = 0x3000;
const SC_STRIDE: u32 = 0x10;
const SC_WORDS: usize = 4;
pub const NUM_SC: u8 = 8;

const SA_BASE: u32 = 0x4000;
const SA_STRIDE: u32 = 0x40;
const SA_WORDS: usize = 16;
const SA_PN: usize = 12;
pub const NUM_SA: u8 = 16;

const COUNTER_BASE: u32 = 0x8000;
const COUNTER_STRIDE: u32 = 0x40;
const COUNTER_WORDS: usize = 12;

const VALID: u32 = 1 << 31;

/// Offset between egress and ingress copies of SecY and SC records
const INGRESS_SECY_SC: u32 = 0x800;
/// Offset between egress and ingress copies of SA records
const INGRESS_SA: u32 = 0x2000;
/// Offset between egress and ingress counter blocks
const INGRESS_COUNTERS: u32 = 0x1000;

/// Which side of the MAC a record belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Egress,
    Ingress,
}

fn check_supported(dev: &Device) -> Result<()> {
    if !dev.info().has_macsec {
        return Err(MsdError::not_supported(format!(
            "MACSec on {}",
            dev.family()
        )));
    }
    Ok(())
}

fn check_index(what: &str, idx: u8, max: u8) -> Result<()> {
    if idx >= max {
        return Err(MsdError::bad_param(format!(
            "{what} index {idx} (max {})",
            max - 1
        )));
    }
    Ok(())
}

fn wait_apb(dev: &Device) -> Result<()> {
    dev.wait_bit(APB_WINDOW, APB_CTRL, APB_BUSY_BIT, false)
}

fn set_apb_addr(dev: &Device, addr: u32) -> Result<()> {
    dev.set_any_reg(APB_WINDOW, APB_ADDR_HI, (addr >> 16) as u16)?;
    dev.set_any_reg(APB_WINDOW, APB_ADDR_LO, addr as u16)
}

// Single-word accesses.  Caller holds the APB semaphore.
fn apb_read(dev: &Device, addr: u32) -> Result<u32> {
    wait_apb(dev)?;
    set_apb_addr(dev, addr)?;
    dev.set_any_reg(APB_WINDOW, APB_CTRL, APB_BUSY)?;
    wait_apb(dev)?;
    let hi = dev.get_any_reg(APB_WINDOW, APB_DATA_HI)? as u32;
    let lo = dev.get_any_reg(APB_WINDOW, APB_DATA_LO)? as u32;
    Ok(hi << 16 | lo)
}

fn apb_write(dev: &Device, addr: u32, value: u32) -> Result<()> {
    wait_apb(dev)?;
    set_apb_addr(dev, addr)?;
    dev.set_any_reg(APB_WINDOW, APB_DATA_HI, (value >> 16) as u16)?;
    dev.set_any_reg(APB_WINDOW, APB_DATA_LO, value as u16)?;
    dev.set_any_reg(APB_WINDOW, APB_CTRL, APB_BUSY | APB_WRITE)
}

// Record accesses.  The `_locked` forms expect the caller to hold the APB
// semaphore, so a validity check and the write that depends on it can share
// one hold.
fn read_record_locked<const N: usize>(
    dev: &Device,
    addr: u32,
) -> Result<[u32; N]> {
    let mut words = [0u32; N];
    for (i, w) in words.iter_mut().enumerate() {
        *w = apb_read(dev, addr + 4 * i as u32)?;
    }
    Ok(words)
}

fn write_record_locked(dev: &Device, addr: u32, words: &[u32]) -> Result<()> {
    debug!("MACSec record at {addr:#06x}, {} words", words.len());
    for (i, w) in words.iter().enumerate() {
        apb_write(dev, addr + 4 * i as u32, *w)?;
    }
    wait_apb(dev)
}

fn read_record<const N: usize>(dev: &Device, addr: u32) -> Result<[u32; N]> {
    let _guard = lock(&dev.sems.apb_regs);
    read_record_locked(dev, addr)
}

fn write_record(dev: &Device, addr: u32, words: &[u32]) -> Result<()> {
    let _guard = lock(&dev.sems.apb_regs);
    write_record_locked(dev, addr, words)
}

/// Engine-wide settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    pub enable: bool,
    /// Let frames that match no rule through unprotected
    pub bypass_on_miss: bool,
}

pub fn set_global_config(dev: &Device, cfg: GlobalConfig) -> Result<()> {
    check_supported(dev)?;
    let mut w = 0;
    if cfg.enable {
        w |= GLOBAL_ENABLE;
    }
    if cfg.bypass_on_miss {
        w |= GLOBAL_BYPASS_MISS;
    }
    write_record(dev, GLOBAL_CTRL, &[w])
}

pub fn get_global_config(dev: &Device) -> Result<GlobalConfig> {
    check_supported(dev)?;
    let [w] = read_record::<1>(dev, GLOBAL_CTRL)?;
    Ok(GlobalConfig {
        enable: w & GLOBAL_ENABLE != 0,
        bypass_on_miss: w & GLOBAL_BYPASS_MISS != 0,
    })
}

/// What a matching rule does with the frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleAction {
    /// Hand the frame to this SecY
    Protect(u8),
    Bypass,
    Drop,
}

/// A TCAM-style classification rule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    pub da: MacAddr,
    pub da_mask: MacAddr,
    pub ethertype: u16,
    pub ethertype_mask: u16,
    /// Match only frames on this logical port
    pub port: Option<u8>,
    /// Match only frames tagged with this VID
    pub vlan: Option<u16>,
    pub action: RuleAction,
}

// Rule word layout
const R_ETYPE: usize = 4;
const R_PORTVLAN_KEY: usize = 5;
const R_PORTVLAN_MASK: usize = 6;
const R_ACTION: usize = 7;
const PV_VLAN: u32 = 1 << 31;
const PV_PORT: u32 = 1 << 30;
const ACT_DROP: u32 = 1 << 30;
const ACT_BYPASS: u32 = 1 << 29;

fn encode_rule(dev: &Device, rule: &Rule) -> Result<[u32; RULE_WORDS]> {
    let mut w = [0u32; RULE_WORDS];
    set_bits(&mut w, 0, 47, rule.da.to_u64());
    set_bits(&mut w, 64, 111, rule.da_mask.to_u64());
    w[R_ETYPE] = (rule.ethertype as u32) << 16 | rule.ethertype_mask as u32;
    if let Some(p) = rule.port {
        w[R_PORTVLAN_KEY] |= (dev.physical_port(p)? as u32 & 0xf) << 24;
        w[R_PORTVLAN_MASK] |= PV_PORT;
    }
    if let Some(vid) = rule.vlan {
        if vid > 0xfff {
            return Err(MsdError::bad_param(format!("VID {vid}")));
        }
        w[R_PORTVLAN_KEY] |= PV_VLAN | vid as u32;
        w[R_PORTVLAN_MASK] |= PV_VLAN;
    }
    w[R_ACTION] = VALID
        | match rule.action {
            RuleAction::Protect(secy) => {
                check_index("SecY", secy, NUM_SECY)?;
                secy as u32
            }
            RuleAction::Bypass => ACT_BYPASS,
            RuleAction::Drop => ACT_DROP,
        };
    Ok(w)
}

fn decode_rule(dev: &Device, w: &[u32; RULE_WORDS]) -> Result<Rule> {
    let port = if w[R_PORTVLAN_MASK] & PV_PORT != 0 {
        Some(dev.logical_port(((w[R_PORTVLAN_KEY] >> 24) & 0xf) as u8)?)
    } else {
        None
    };
    let vlan = (w[R_PORTVLAN_MASK] & PV_VLAN != 0)
        .then_some((w[R_PORTVLAN_KEY] & 0xfff) as u16);
    let action = if w[R_ACTION] & ACT_DROP != 0 {
        RuleAction::Drop
    } else if w[R_ACTION] & ACT_BYPASS != 0 {
        RuleAction::Bypass
    } else {
        RuleAction::Protect((w[R_ACTION] & 0xf) as u8)
    };
    Ok(Rule {
        da: MacAddr::from_u64(get_bits(w, 0, 47)),
        da_mask: MacAddr::from_u64(get_bits(w, 64, 111)),
        ethertype: (w[R_ETYPE] >> 16) as u16,
        ethertype_mask: w[R_ETYPE] as u16,
        port,
        vlan,
        action,
    })
}

fn rule_addr(idx: u8) -> u32 {
    RULE_BASE + idx as u32 * RULE_STRIDE
}

pub fn create_rule(dev: &Device, idx: u8, rule: &Rule) -> Result<()> {
    check_supported(dev)?;
    check_index("rule", idx, NUM_RULES)?;
    let w = encode_rule(dev, rule)?;
    let _guard = lock(&dev.sems.apb_regs);
    if let RuleAction::Protect(secy) = rule.action {
        if !secy_present_locked(dev, Direction::Egress, secy)? {
            return Err(MsdError::no_such(format!("egress SecY {secy}")));
        }
    }
    write_record_locked(dev, rule_addr(idx), &w)
}

pub fn get_rule(dev: &Device, idx: u8) -> Result<Option<Rule>> {
    check_supported(dev)?;
    check_index("rule", idx, NUM_RULES)?;
    let w = read_record::<RULE_WORDS>(dev, rule_addr(idx))?;
    if w[R_ACTION] & VALID == 0 {
        return Ok(None);
    }
    decode_rule(dev, &w).map(Some)
}

pub fn delete_rule(dev: &Device, idx: u8) -> Result<()> {
    check_supported(dev)?;
    check_index("rule", idx, NUM_RULES)?;
    write_record(dev, rule_addr(idx), &[0; RULE_WORDS])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherSuite {
    GcmAes128 = 0,
    GcmAes256 = 1,
    GcmAesXpn128 = 2,
    GcmAesXpn256 = 3,
}

impl CipherSuite {
    pub fn key_len(self) -> usize {
        match self {
            CipherSuite::GcmAes128 | CipherSuite::GcmAesXpn128 => 16,
            CipherSuite::GcmAes256 | CipherSuite::GcmAesXpn256 => 32,
        }
    }

    pub fn is_xpn(self) -> bool {
        matches!(self, CipherSuite::GcmAesXpn128 | CipherSuite::GcmAesXpn256)
    }

    fn from_raw(raw: u32) -> Self {
        match raw & 0x3 {
            0 => CipherSuite::GcmAes128,
            1 => CipherSuite::GcmAes256,
            2 => CipherSuite::GcmAesXpn128,
            _ => CipherSuite::GcmAesXpn256,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateFrames {
    Disabled = 0,
    Check = 1,
    Strict = 2,
}

/// A security entity: the per-direction protection policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecY {
    pub cipher: CipherSuite,
    pub protect_frames: bool,
    pub sci_insert: bool,
    pub replay_protect: bool,
    pub replay_window: u32,
    pub validate: ValidateFrames,
    /// Bytes after the SecTAG left unencrypted (0, 30 or 50)
    pub conf_offset: u8,
}

const SY_PROTECT: u32 = 1 << 30;
const SY_SCI_INSERT: u32 = 1 << 29;
const SY_REPLAY: u32 = 1 << 28;
const SY_VALIDATE_SHIFT: u32 = 26;
const SY_CIPHER_SHIFT: u32 = 24;
const SY_OFFSET_SHIFT: u32 = 16;

fn secy_addr(dir: Direction, idx: u8) -> u32 {
    let base = match dir {
        Direction::Egress => SECY_BASE,
        Direction::Ingress => SECY_BASE + INGRESS_SECY_SC,
    };
    base + idx as u32 * SECY_STRIDE
}

// Caller holds the APB semaphore.
fn secy_present_locked(dev: &Device, dir: Direction, idx: u8) -> Result<bool> {
    check_index("SecY", idx, NUM_SECY)?;
    let [cfg] = read_record_locked::<1>(dev, secy_addr(dir, idx))?;
    Ok(cfg & VALID != 0)
}

pub fn create_secy(
    dev: &Device,
    dir: Direction,
    idx: u8,
    secy: &SecY,
) -> Result<()> {
    check_supported(dev)?;
    check_index("SecY", idx, NUM_SECY)?;
    if ![0, 30, 50].contains(&secy.conf_offset) {
        return Err(MsdError::bad_param(format!(
            "confidentiality offset {}",
            secy.conf_offset
        )));
    }
    let mut cfg = VALID
        | (secy.validate as u32) << SY_VALIDATE_SHIFT
        | (secy.cipher as u32) << SY_CIPHER_SHIFT
        | (secy.conf_offset as u32) << SY_OFFSET_SHIFT;
    if secy.protect_frames {
        cfg |= SY_PROTECT;
    }
    if secy.sci_insert {
        cfg |= SY_SCI_INSERT;
    }
    if secy.replay_protect {
        cfg |= SY_REPLAY;
    }
    write_record(dev, secy_addr(dir, idx), &[cfg, secy.replay_window])
}

pub fn get_secy(dev: &Device, dir: Direction, idx: u8) -> Result<Option<SecY>> {
    check_supported(dev)?;
    check_index("SecY", idx, NUM_SECY)?;
    let [cfg, replay_window] =
        read_record::<SECY_WORDS>(dev, secy_addr(dir, idx))?;
    if cfg & VALID == 0 {
        return Ok(None);
    }
    let validate = match (cfg >> SY_VALIDATE_SHIFT) & 0x3 {
        0 => ValidateFrames::Disabled,
        1 => ValidateFrames::Check,
        2 => ValidateFrames::Strict,
        v => return Err(MsdError::fail(format!("reserved validateFrames {v}"))),
    };
    Ok(Some(SecY {
        cipher: CipherSuite::from_raw(cfg >> SY_CIPHER_SHIFT),
        protect_frames: cfg & SY_PROTECT != 0,
        sci_insert: cfg & SY_SCI_INSERT != 0,
        replay_protect: cfg & SY_REPLAY != 0,
        replay_window,
        validate,
        conf_offset: (cfg >> SY_OFFSET_SHIFT) as u8,
    }))
}

pub fn delete_secy(dev: &Device, dir: Direction, idx: u8) -> Result<()> {
    check_supported(dev)?;
    check_index("SecY", idx, NUM_SECY)?;
    write_record(dev, secy_addr(dir, idx), &[0; SECY_WORDS])
}

/// A secure channel: one sender's stream of SAs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecureChannel {
    pub sci: u64,
    pub secy: u8,
    /// Association number currently used for transmit
    pub encoding_an: u8,
    /// SA index installed for each association number
    pub sa: [Option<u8>; 4],
}

const SC_SECY_SHIFT: u32 = 28;
const SC_AN_SHIFT: u32 = 4;

fn sc_addr(dir: Direction, idx: u8) -> u32 {
    let base = match dir {
        Direction::Egress => SC_BASE,
        Direction::Ingress => SC_BASE + INGRESS_SECY_SC,
    };
    base + idx as u32 * SC_STRIDE
}

pub fn create_sc(
    dev: &Device,
    dir: Direction,
    idx: u8,
    sc: &SecureChannel,
) -> Result<()> {
    check_supported(dev)?;
    check_index("SC", idx, NUM_SC)?;
    if sc.encoding_an > 3 {
        return Err(MsdError::bad_param(format!(
            "association number {}",
            sc.encoding_an
        )));
    }

    let mut w = [0u32; SC_WORDS];
    set_bits(&mut w, 0, 63, sc.sci);
    w[2] = VALID
        | (sc.secy as u32) << SC_SECY_SHIFT
        | (sc.encoding_an as u32) << SC_AN_SHIFT;
    for (an, sa) in sc.sa.iter().enumerate() {
        if let Some(sa) = *sa {
            check_index("SA", sa, NUM_SA)?;
            w[2] |= 1 << an;
            w[3] |= (sa as u32) << (8 * an);
        }
    }

    let _guard = lock(&dev.sems.apb_regs);
    if !secy_present_locked(dev, dir, sc.secy)? {
        return Err(MsdError::no_such(format!("{dir:?} SecY {}", sc.secy)));
    }
    write_record_locked(dev, sc_addr(dir, idx), &w)
}

pub fn get_sc(
    dev: &Device,
    dir: Direction,
    idx: u8,
) -> Result<Option<SecureChannel>> {
    check_supported(dev)?;
    check_index("SC", idx, NUM_SC)?;
    let w = read_record::<SC_WORDS>(dev, sc_addr(dir, idx))?;
    if w[2] & VALID == 0 {
        return Ok(None);
    }
    let mut sa = [None; 4];
    for (an, slot) in sa.iter_mut().enumerate() {
        if w[2] & (1 << an) != 0 {
            *slot = Some((w[3] >> (8 * an)) as u8);
        }
    }
    Ok(Some(SecureChannel {
        sci: get_bits(&w, 0, 63),
        secy: ((w[2] >> SC_SECY_SHIFT) & 0x7) as u8,
        encoding_an: ((w[2] >> SC_AN_SHIFT) & 0x3) as u8,
        sa,
    }))
}

pub fn delete_sc(dev: &Device, dir: Direction, idx: u8) -> Result<()> {
    check_supported(dev)?;
    check_index("SC", idx, NUM_SC)?;
    write_record(dev, sc_addr(dir, idx), &[0; SC_WORDS])
}

/// A security association: key material and packet number state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityAssociation {
    /// 16 or 32 bytes
    pub key: Vec<u8>,
    /// Present for the extended packet number cipher suites only
    pub salt: Option<[u8; 12]>,
    pub ssci: u32,
    pub next_pn: u64,
}

const SA_KEY: usize = 0;
const SA_SALT: usize = 8;
const SA_SSCI: usize = 11;
const SA_CTRL: usize = 14;
const SA_XPN: u32 = 1 << 30;
const SA_KEY256: u32 = 1 << 29;

fn sa_addr(dir: Direction, idx: u8) -> u32 {
    let base = match dir {
        Direction::Egress => SA_BASE,
        Direction::Ingress => SA_BASE + INGRESS_SA,
    };
    base + idx as u32 * SA_STRIDE
}

fn be_words(bytes: &[u8], out: &mut [u32]) {
    for (chunk, w) in bytes.chunks(4).zip(out.iter_mut()) {
        let mut b = [0u8; 4];
        b[..chunk.len()].copy_from_slice(chunk);
        *w = u32::from_be_bytes(b);
    }
}

fn be_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn check_pn(pn: u64, xpn: bool) -> Result<()> {
    if pn == 0 || (!xpn && pn > u32::MAX as u64) {
        return Err(MsdError::bad_param(format!(
            "packet number {pn:#x} for a {} SA",
            if xpn { "64-bit" } else { "32-bit" }
        )));
    }
    Ok(())
}

pub fn create_sa(
    dev: &Device,
    dir: Direction,
    idx: u8,
    sa: &SecurityAssociation,
) -> Result<()> {
    check_supported(dev)?;
    check_index("SA", idx, NUM_SA)?;
    if sa.key.len() != 16 && sa.key.len() != 32 {
        return Err(MsdError::bad_param(format!("{}-byte SAK", sa.key.len())));
    }
    check_pn(sa.next_pn, sa.salt.is_some())?;

    let mut w = [0u32; SA_WORDS];
    be_words(&sa.key, &mut w[SA_KEY..SA_SALT]);
    w[SA_CTRL] = VALID;
    if let Some(salt) = sa.salt {
        be_words(&salt, &mut w[SA_SALT..SA_SSCI]);
        w[SA_CTRL] |= SA_XPN;
    }
    if sa.key.len() == 32 {
        w[SA_CTRL] |= SA_KEY256;
    }
    w[SA_SSCI] = sa.ssci;
    set_bits(&mut w[SA_PN..SA_PN + 2], 0, 63, sa.next_pn);
    write_record(dev, sa_addr(dir, idx), &w)
}

pub fn get_sa(
    dev: &Device,
    dir: Direction,
    idx: u8,
) -> Result<Option<SecurityAssociation>> {
    check_supported(dev)?;
    check_index("SA", idx, NUM_SA)?;
    let w = read_record::<SA_WORDS>(dev, sa_addr(dir, idx))?;
    if w[SA_CTRL] & VALID == 0 {
        return Ok(None);
    }
    let key_words = if w[SA_CTRL] & SA_KEY256 != 0 { 8 } else { 4 };
    let salt = (w[SA_CTRL] & SA_XPN != 0).then(|| {
        let mut salt = [0u8; 12];
        salt.copy_from_slice(&be_bytes(&w[SA_SALT..SA_SSCI]));
        salt
    });
    Ok(Some(SecurityAssociation {
        key: be_bytes(&w[SA_KEY..SA_KEY + key_words]),
        salt,
        ssci: w[SA_SSCI],
        next_pn: get_bits(&w[SA_PN..SA_PN + 2], 0, 63),
    }))
}

pub fn delete_sa(dev: &Device, dir: Direction, idx: u8) -> Result<()> {
    check_supported(dev)?;
    check_index("SA", idx, NUM_SA)?;
    write_record(dev, sa_addr(dir, idx), &[0; SA_WORDS])
}

/// The packet number the SA will use (egress) or expects (ingress) next.
pub fn get_next_pn(dev: &Device, dir: Direction, idx: u8) -> Result<u64> {
    check_supported(dev)?;
    check_index("SA", idx, NUM_SA)?;
    let w = read_record::<2>(dev, sa_addr(dir, idx) + 4 * SA_PN as u32)?;
    Ok(get_bits(&w, 0, 63))
}

pub fn set_next_pn(
    dev: &Device,
    dir: Direction,
    idx: u8,
    pn: u64,
) -> Result<()> {
    check_supported(dev)?;
    check_index("SA", idx, NUM_SA)?;
    let base = sa_addr(dir, idx);
    let _guard = lock(&dev.sems.apb_regs);
    let [ctrl] = read_record_locked::<1>(dev, base + 4 * SA_CTRL as u32)?;
    if ctrl & VALID == 0 {
        return Err(MsdError::no_such(format!("{dir:?} SA {idx}")));
    }
    check_pn(pn, ctrl & SA_XPN != 0)?;
    let mut w = [0u32; 2];
    set_bits(&mut w, 0, 63, pn);
    write_record_locked(dev, base + 4 * SA_PN as u32, &w)
}

/// Per-SecY frame counters.  Egress SecYs count protected and encrypted
/// frames; ingress SecYs the validation outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecYCounters {
    pub protected: u64,
    pub encrypted: u64,
    pub ok: u64,
    pub invalid: u64,
    pub not_valid: u64,
    pub late: u64,
}

pub fn get_counters(
    dev: &Device,
    dir: Direction,
    secy: u8,
) -> Result<SecYCounters> {
    check_supported(dev)?;
    check_index("SecY", secy, NUM_SECY)?;
    let base = match dir {
        Direction::Egress => COUNTER_BASE,
        Direction::Ingress => COUNTER_BASE + INGRESS_COUNTERS,
    };
    let addr = base + secy as u32 * COUNTER_STRIDE;
    let w = read_record::<COUNTER_WORDS>(dev, addr)?;
    let c = |i: u16| get_bits(&w, 64 * i, 64 * i + 63);
    Ok(SecYCounters {
        protected: c(0),
        encrypted: c(1),
        ok: c(2),
        invalid: c(3),
        not_valid: c(4),
        late: c(5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SmiBus;
    use crate::family::Family;
    use crate::sim::SimSwitch;
    use crate::{Bsp, SysConfig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    fn setup(family: Family) -> (SimSwitch, Device) {
        let sim = SimSwitch::new(family);
        let dev =
            Device::load(SysConfig::default(), Bsp::smi(sim.clone())).unwrap();
        (sim, dev)
    }

    fn secy() -> SecY {
        SecY {
            cipher: CipherSuite::GcmAesXpn256,
            protect_frames: true,
            sci_insert: true,
            replay_protect: false,
            replay_window: 64,
            validate: ValidateFrames::Strict,
            conf_offset: 30,
        }
    }

    #[test]
    fn not_on_every_family() {
        let (_sim, dev) = setup(Family::Amethyst);
        assert!(matches!(
            get_global_config(&dev),
            Err(MsdError::NotSupported(_))
        ));
    }

    #[test]
    fn global_config() {
        let (sim, dev) = setup(Family::Fir);
        let cfg = GlobalConfig {
            enable: true,
            bypass_on_miss: true,
        };
        set_global_config(&dev, cfg).unwrap();
        assert_eq!(sim.apb_peek(GLOBAL_CTRL), 0x3);
        assert_eq!(get_global_config(&dev).unwrap(), cfg);
    }

    #[test]
    fn secy_lifecycle() {
        let (sim, dev) = setup(Family::Fir);
        assert_eq!(get_secy(&dev, Direction::Ingress, 2).unwrap(), None);
        create_secy(&dev, Direction::Ingress, 2, &secy()).unwrap();
        assert_eq!(sim.apb_peek(0x2820), 0xeb1e_0000);
        assert_eq!(
            get_secy(&dev, Direction::Ingress, 2).unwrap(),
            Some(secy())
        );
        assert_eq!(get_secy(&dev, Direction::Egress, 2).unwrap(), None);
        delete_secy(&dev, Direction::Ingress, 2).unwrap();
        assert_eq!(get_secy(&dev, Direction::Ingress, 2).unwrap(), None);

        let bad = SecY {
            conf_offset: 12,
            ..secy()
        };
        assert!(create_secy(&dev, Direction::Egress, 0, &bad).is_err());
        assert!(create_secy(&dev, Direction::Egress, 8, &secy()).is_err());
    }

    #[test]
    fn rules_need_a_secy() {
        let (_sim, dev) = setup(Family::Spruce);
        let rule = Rule {
            da: "01:80:c2:00:00:03".parse().unwrap(),
            da_mask: MacAddr([0xff; 6]),
            ethertype: 0x888e,
            ethertype_mask: 0xffff,
            port: Some(7),
            vlan: Some(100),
            action: RuleAction::Protect(1),
        };
        assert!(matches!(
            create_rule(&dev, 0, &rule),
            Err(MsdError::NoSuch(_))
        ));
        create_secy(&dev, Direction::Egress, 1, &secy()).unwrap();
        create_rule(&dev, 0, &rule).unwrap();
        assert_eq!(get_rule(&dev, 0).unwrap(), Some(rule));

        let drop = Rule {
            port: None,
            vlan: None,
            action: RuleAction::Drop,
            ..rule
        };
        create_rule(&dev, 7, &drop).unwrap();
        assert_eq!(get_rule(&dev, 7).unwrap(), Some(drop));
        delete_rule(&dev, 0).unwrap();
        assert_eq!(get_rule(&dev, 0).unwrap(), None);
        assert!(get_rule(&dev, 8).is_err());
    }

    #[test]
    fn channels() {
        let (_sim, dev) = setup(Family::Fir);
        let sc = SecureChannel {
            sci: 0x0011_2233_4455_0001,
            secy: 3,
            encoding_an: 1,
            sa: [Some(4), Some(5), None, None],
        };
        assert!(matches!(
            create_sc(&dev, Direction::Egress, 0, &sc),
            Err(MsdError::NoSuch(_))
        ));
        create_secy(&dev, Direction::Egress, 3, &secy()).unwrap();
        create_sc(&dev, Direction::Egress, 0, &sc).unwrap();
        assert_eq!(get_sc(&dev, Direction::Egress, 0).unwrap(), Some(sc));
        delete_sc(&dev, Direction::Egress, 0).unwrap();
        assert_eq!(get_sc(&dev, Direction::Egress, 0).unwrap(), None);

        let bad = SecureChannel { encoding_an: 4, ..sc };
        assert!(create_sc(&dev, Direction::Egress, 0, &bad).is_err());
    }

    #[test]
    fn associations() {
        let (sim, dev) = setup(Family::Fir);
        let sa = SecurityAssociation {
            key: (0u8..32).collect(),
            salt: Some([0xa5; 12]),
            ssci: 0x0000_0002,
            next_pn: 0x1_0000_0000,
        };
        create_sa(&dev, Direction::Ingress, 15, &sa).unwrap();
        let base = sa_addr(Direction::Ingress, 15);
        assert_eq!(base, 0x63c0);
        assert_eq!(sim.apb_peek(base), 0x0001_0203);
        assert_eq!(sim.apb_peek(base + 4 * SA_PN as u32 + 4), 1);
        let dir = Direction::Ingress;
        assert_eq!(get_sa(&dev, dir, 15).unwrap(), Some(sa.clone()));

        assert_eq!(get_next_pn(&dev, dir, 15).unwrap(), 0x1_0000_0000);
        set_next_pn(&dev, dir, 15, 0x1_0000_0100).unwrap();
        assert_eq!(get_next_pn(&dev, dir, 15).unwrap(), 0x1_0000_0100);

        delete_sa(&dev, Direction::Ingress, 15).unwrap();
        assert_eq!(get_sa(&dev, Direction::Ingress, 15).unwrap(), None);
        assert!(matches!(
            set_next_pn(&dev, Direction::Ingress, 15, 1),
            Err(MsdError::NoSuch(_))
        ));
    }

    #[test]
    fn association_limits() {
        let (_sim, dev) = setup(Family::Fir);
        let mut sa = SecurityAssociation {
            key: vec![0x11; 16],
            salt: None,
            ssci: 0,
            next_pn: 1,
        };
        create_sa(&dev, Direction::Egress, 0, &sa).unwrap();
        let stored = get_sa(&dev, Direction::Egress, 0).unwrap();
        assert_eq!(stored, Some(sa.clone()));
        assert!(set_next_pn(&dev, Direction::Egress, 0, 1 << 32).is_err());

        sa.next_pn = 0;
        assert!(create_sa(&dev, Direction::Egress, 1, &sa).is_err());
        sa.next_pn = 1;
        sa.key = vec![0; 24];
        assert!(create_sa(&dev, Direction::Egress, 1, &sa).is_err());
    }

    #[test]
    fn counters() {
        let (sim, dev) = setup(Family::Fir);
        let base = COUNTER_BASE + INGRESS_COUNTERS + 2 * COUNTER_STRIDE;
        sim.apb_poke(base + 8 * 2, 0x10);
        sim.apb_poke(base + 8 * 5 + 4, 0x1);
        let c = get_counters(&dev, Direction::Ingress, 2).unwrap();
        assert_eq!(c.ok, 0x10);
        assert_eq!(c.late, 1 << 32);
        assert_eq!(c.protected, 0);
    }

    type Hook = Box<dyn FnOnce() + Send>;
    type Hooks = Arc<Mutex<Vec<(u16, Hook)>>>;
    type Racer = Arc<Mutex<Option<JoinHandle<Result<()>>>>>;

    // Runs a one-shot hook the first time the APB window is pointed at a
    // given record address, then passes the access on to the switch.
    struct Interposer {
        sim: SimSwitch,
        hooks: Hooks,
    }

    impl SmiBus for Interposer {
        fn read(&self, dev_addr: u8, reg: u8) -> Result<u16> {
            self.sim.read(dev_addr, reg)
        }

        fn write(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()> {
            if dev_addr == APB_WINDOW && reg == APB_ADDR_LO {
                let hook = {
                    let mut hooks = self.hooks.lock().unwrap();
                    hooks
                        .iter()
                        .position(|(addr, _)| *addr == value)
                        .map(|i| hooks.remove(i).1)
                };
                if let Some(hook) = hook {
                    hook();
                }
            }
            self.sim.write(dev_addr, reg, value)
        }
    }

    fn interposed() -> (SimSwitch, Hooks, Arc<Device>) {
        let sim = SimSwitch::new(Family::Fir);
        let hooks = Hooks::default();
        let bus = Interposer {
            sim: sim.clone(),
            hooks: Arc::clone(&hooks),
        };
        let dev = Device::load(SysConfig::default(), Bsp::smi(bus)).unwrap();
        (sim, hooks, Arc::new(dev))
    }

    // A hook that starts `op` on another thread and stalls long enough for
    // it to reach the APB semaphore.
    fn race<F>(dev: &Arc<Device>, op: F) -> (Hook, Racer)
    where
        F: FnOnce(&Device) -> Result<()> + Send + 'static,
    {
        let racer = Racer::default();
        let slot = Arc::clone(&racer);
        let dev = Arc::clone(dev);
        let hook: Hook = Box::new(move || {
            let t = thread::spawn(move || op(&dev));
            *slot.lock().unwrap() = Some(t);
            thread::sleep(Duration::from_millis(50));
        });
        (hook, racer)
    }

    fn finish(racer: &Racer) -> Result<()> {
        let t = racer.lock().unwrap().take().expect("hook never ran");
        t.join().unwrap()
    }

    // Records whether the SecY was still valid when a dependent record
    // started to be written.
    fn secy_valid_at(
        sim: &SimSwitch,
        dir: Direction,
        idx: u8,
    ) -> (Hook, Arc<AtomicBool>) {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let sim = sim.clone();
        let hook: Hook = Box::new(move || {
            let valid = sim.apb_peek(secy_addr(dir, idx)) & VALID != 0;
            flag.store(valid, Ordering::SeqCst);
        });
        (hook, seen)
    }

    #[test]
    fn next_pn_races_delete() {
        let (sim, hooks, dev) = interposed();
        let sa = SecurityAssociation {
            key: vec![0x22; 16],
            salt: None,
            ssci: 0,
            next_pn: 1,
        };
        create_sa(&dev, Direction::Egress, 3, &sa).unwrap();
        let base = sa_addr(Direction::Egress, 3);
        let (hook, racer) =
            race(&dev, |dev| delete_sa(dev, Direction::Egress, 3));
        hooks
            .lock()
            .unwrap()
            .push(((base + 4 * SA_CTRL as u32) as u16, hook));

        // The SA was valid when checked, so the delete has to wait for the
        // new PN and then clear it along with everything else.
        set_next_pn(&dev, Direction::Egress, 3, 5).unwrap();
        finish(&racer).unwrap();
        assert_eq!(get_sa(&dev, Direction::Egress, 3).unwrap(), None);
        for i in 0..SA_WORDS as u32 {
            assert_eq!(sim.apb_peek(base + 4 * i), 0);
        }
    }

    #[test]
    fn channel_create_races_secy_delete() {
        let (sim, hooks, dev) = interposed();
        create_secy(&dev, Direction::Ingress, 1, &secy()).unwrap();
        let (deleter, racer) =
            race(&dev, |dev| delete_secy(dev, Direction::Ingress, 1));
        let (check, valid) = secy_valid_at(&sim, Direction::Ingress, 1);
        hooks.lock().unwrap().extend([
            (secy_addr(Direction::Ingress, 1) as u16, deleter),
            (sc_addr(Direction::Ingress, 4) as u16, check),
        ]);

        let sc = SecureChannel {
            sci: 0x0010_1800_0000_0001,
            secy: 1,
            encoding_an: 0,
            sa: [Some(0), None, None, None],
        };
        create_sc(&dev, Direction::Ingress, 4, &sc).unwrap();
        assert!(valid.load(Ordering::SeqCst));
        finish(&racer).unwrap();
        assert_eq!(get_secy(&dev, Direction::Ingress, 1).unwrap(), None);
        assert_eq!(get_sc(&dev, Direction::Ingress, 4).unwrap(), Some(sc));
    }

    #[test]
    fn rule_create_races_secy_delete() {
        let (sim, hooks, dev) = interposed();
        create_secy(&dev, Direction::Egress, 2, &secy()).unwrap();
        let (deleter, racer) =
            race(&dev, |dev| delete_secy(dev, Direction::Egress, 2));
        let (check, valid) = secy_valid_at(&sim, Direction::Egress, 2);
        hooks.lock().unwrap().extend([
            (secy_addr(Direction::Egress, 2) as u16, deleter),
            (rule_addr(5) as u16, check),
        ]);

        let rule = Rule {
            da: MacAddr([0x01, 0x80, 0xc2, 0, 0, 0x03]),
            da_mask: MacAddr([0xff; 6]),
            ethertype: 0x888e,
            ethertype_mask: 0xffff,
            port: None,
            vlan: None,
            action: RuleAction::Protect(2),
        };
        create_rule(&dev, 5, &rule).unwrap();
        assert!(valid.load(Ordering::SeqCst));
        finish(&racer).unwrap();
        assert_eq!(get_secy(&dev, Direction::Egress, 2).unwrap(), None);
    }
}
