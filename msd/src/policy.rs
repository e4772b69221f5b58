// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Frame policy, management destinations and DoS checks.
//!
//! The switch-wide settings live behind the Monitor & Management Control
//! register in Global 1; the per-port settings behind each port's Policy
//! Management Control register.  Both are pointer/data registers, and both
//! are guarded by the table-registers semaphore.

use crate::device::{Device, GLOBAL1};
use crate::error::{MsdError, Result};
use crate::family::NO_PORT;
use crate::indirect::PointerReg;
use crate::sem::lock;

const MONITOR_MGMT_CTRL: u8 = 0x1a;
const PORT_POLICY_MGMT_CTRL: u8 = 0x0e;
const PTR_BITS: u8 = 6;

// Global pointers
const PTR_RSVD2CPU: u8 = 0x00;
const PTR_INGRESS_MONITOR_DEST: u8 = 0x20;
const PTR_EGRESS_MONITOR_DEST: u8 = 0x21;
const PTR_CPU_DEST: u8 = 0x30;
const PTR_MIRROR_DEST: u8 = 0x32;
const PTR_ROUTE_DEST: u8 = 0x38;

const DEST_MASK: u8 = 0x1f;
const MGMT_PRI_SHIFT: u8 = 5;
const MGMT_PRI_MASK: u8 = 0xe0;

// Per-port pointers
const PTR_FRAME_ACTION: u8 = 0x00;
const PTR_DOS_A: u8 = 0x10;
const PTR_DOS_B: u8 = 0x11;
const PTR_TCP_MIN_HDR: u8 = 0x12;
const PTR_ICMP_MAX_LO: u8 = 0x13;
const PTR_ICMP_MAX_HI: u8 = 0x14;
const PTR_TTL_THRESHOLD: u8 = 0x15;

fn global_reg(dev: &Device) -> PointerReg<crate::device::SmiReg<'_>> {
    PointerReg::new(dev.smi_reg(GLOBAL1, MONITOR_MGMT_CTRL), PTR_BITS)
}

fn port_reg(
    dev: &Device,
    port: u8,
) -> Result<PointerReg<crate::device::SmiReg<'_>>> {
    Ok(PointerReg::new(
        dev.smi_reg(dev.port_addr(port)?, PORT_POLICY_MGMT_CTRL),
        PTR_BITS,
    ))
}

fn encode_dest(dev: &Device, port: Option<u8>) -> Result<u8> {
    match port {
        None => Ok(NO_PORT),
        Some(p) => dev.physical_port(p),
    }
}

fn decode_dest(dev: &Device, raw: u8) -> Result<Option<u8>> {
    match raw & DEST_MASK {
        NO_PORT => Ok(None),
        phys => dev.logical_port(phys).map(Some),
    }
}

fn get_dest(dev: &Device, ptr: u8) -> Result<Option<u8>> {
    let _guard = lock(&dev.sems.tbl_regs);
    decode_dest(dev, global_reg(dev).read(ptr)?)
}

fn set_dest(dev: &Device, ptr: u8, port: Option<u8>) -> Result<()> {
    let raw = encode_dest(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    global_reg(dev).update(ptr, DEST_MASK, raw)
}

macro_rules! dest_port {
    ($name:ident, $ptr:expr, $what:literal) => {
        paste::paste! {
            #[doc = concat!(
                "The port ", $what, " are sent to, or `None` when disabled."
            )]
            pub fn [<get_ $name _dest>](dev: &Device) -> Result<Option<u8>> {
                get_dest(dev, $ptr)
            }

            #[doc = concat!("Set the port ", $what, " are sent to.")]
            pub fn [<set_ $name _dest>](
                dev: &Device,
                port: Option<u8>,
            ) -> Result<()> {
                set_dest(dev, $ptr, port)
            }
        }
    };
}

dest_port!(cpu, PTR_CPU_DEST, "management frames");
dest_port!(
    ingress_monitor,
    PTR_INGRESS_MONITOR_DEST,
    "ingress-monitored frames"
);
dest_port!(egress_monitor, PTR_EGRESS_MONITOR_DEST, "egress-monitored frames");
dest_port!(mirror, PTR_MIRROR_DEST, "policy-mirrored frames");
dest_port!(route, PTR_ROUTE_DEST, "frames needing routing");

/// Priority given to management frames sent to the CPU port.
pub fn get_mgmt_pri(dev: &Device) -> Result<u8> {
    let _guard = lock(&dev.sems.tbl_regs);
    Ok(global_reg(dev).read(PTR_CPU_DEST)? >> MGMT_PRI_SHIFT)
}

pub fn set_mgmt_pri(dev: &Device, pri: u8) -> Result<()> {
    if pri > 7 {
        return Err(MsdError::bad_param(format!("management priority {pri}")));
    }
    let _guard = lock(&dev.sems.tbl_regs);
    global_reg(dev).update(PTR_CPU_DEST, MGMT_PRI_MASK, pri << MGMT_PRI_SHIFT)
}

/// Which of the reserved multicast addresses 01:80:C2:00:00:00 through
/// 01:80:C2:00:00:1F are trapped to the CPU, one bit per last address byte.
pub fn get_rsvd2cpu(dev: &Device) -> Result<u32> {
    let _guard = lock(&dev.sems.tbl_regs);
    let reg = global_reg(dev);
    let mut enables = 0u32;
    for i in 0..4u8 {
        enables |= (reg.read(PTR_RSVD2CPU + i)? as u32) << (8 * i);
    }
    Ok(enables)
}

pub fn set_rsvd2cpu(dev: &Device, enables: u32) -> Result<()> {
    let _guard = lock(&dev.sems.tbl_regs);
    let reg = global_reg(dev);
    for i in 0..4u8 {
        reg.write(PTR_RSVD2CPU + i, (enables >> (8 * i)) as u8)?;
    }
    Ok(())
}

/// Enable or disable trapping for one reserved address, given its last byte.
pub fn set_rsvd2cpu_addr(
    dev: &Device,
    last_byte: u8,
    enable: bool,
) -> Result<()> {
    if last_byte > 0x1f {
        return Err(MsdError::bad_param(format!(
            "01:80:c2:00:00:{last_byte:02x} is not a reserved address"
        )));
    }
    let bit = 1u8 << (last_byte % 8);
    let _guard = lock(&dev.sems.tbl_regs);
    global_reg(dev).update(
        PTR_RSVD2CPU + last_byte / 8,
        bit,
        if enable { bit } else { 0 },
    )
}

/// Frame classes with a selectable per-port policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKey {
    Da,
    Sa,
    Vtu,
    Etype,
    Pppoe,
    Vbas,
    Opt82,
    Udp,
}

impl FrameKey {
    pub const ALL: [FrameKey; 8] = [
        FrameKey::Da,
        FrameKey::Sa,
        FrameKey::Vtu,
        FrameKey::Etype,
        FrameKey::Pppoe,
        FrameKey::Vbas,
        FrameKey::Opt82,
        FrameKey::Udp,
    ];
}

impl std::str::FromStr for FrameKey {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        FrameKey::ALL
            .into_iter()
            .find(|k| format!("{k:?}").eq_ignore_ascii_case(s))
            .ok_or_else(|| MsdError::bad_param(format!("frame key {s}")))
    }
}

/// What happens to frames matching a policy key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Normal = 0,
    Mirror = 1,
    Trap = 2,
    Discard = 3,
}

impl From<u8> for Action {
    fn from(raw: u8) -> Self {
        match raw & 0x3 {
            0 => Action::Normal,
            1 => Action::Mirror,
            2 => Action::Trap,
            _ => Action::Discard,
        }
    }
}

impl std::str::FromStr for Action {
    type Err = MsdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Action::Normal),
            "mirror" => Ok(Action::Mirror),
            "trap" => Ok(Action::Trap),
            "discard" => Ok(Action::Discard),
            _ => Err(MsdError::bad_param(format!("policy action {s}"))),
        }
    }
}

pub fn get_frame_action(
    dev: &Device,
    port: u8,
    key: FrameKey,
) -> Result<Action> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    Ok(Action::from(reg.read(PTR_FRAME_ACTION + key as u8)?))
}

pub fn set_frame_action(
    dev: &Device,
    port: u8,
    key: FrameKey,
    action: Action,
) -> Result<()> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.update(PTR_FRAME_ACTION + key as u8, 0x3, action as u8)
}

/// The individually switchable DoS checks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DosCheck {
    DipDaMismatch,
    ZeroSip,
    IllegalIpAddr,
    IpHdrErr,
    TcpFinUrgPsh,
    TcpFlagsSeqZero,
    TcpSynSport,
    TcpHSize,
    UdpPort,
    TcpPort,
    IcmpSize,
    UcTtlExceeded,
    McTtlExceeded,
}

impl DosCheck {
    pub const ALL: [DosCheck; 13] = [
        DosCheck::DipDaMismatch,
        DosCheck::ZeroSip,
        DosCheck::IllegalIpAddr,
        DosCheck::IpHdrErr,
        DosCheck::TcpFinUrgPsh,
        DosCheck::TcpFlagsSeqZero,
        DosCheck::TcpSynSport,
        DosCheck::TcpHSize,
        DosCheck::UdpPort,
        DosCheck::TcpPort,
        DosCheck::IcmpSize,
        DosCheck::UcTtlExceeded,
        DosCheck::McTtlExceeded,
    ];

    // (pointer, bit) of the enable flag
    fn location(self) -> (u8, u8) {
        let idx = self as u8;
        if idx < 8 {
            (PTR_DOS_A, idx)
        } else {
            (PTR_DOS_B, idx - 8)
        }
    }
}

pub fn get_dos_check(dev: &Device, port: u8, check: DosCheck) -> Result<bool> {
    let reg = port_reg(dev, port)?;
    let (ptr, bit) = check.location();
    let _guard = lock(&dev.sems.tbl_regs);
    Ok(reg.read(ptr)? & (1 << bit) != 0)
}

pub fn set_dos_check(
    dev: &Device,
    port: u8,
    check: DosCheck,
    enable: bool,
) -> Result<()> {
    let reg = port_reg(dev, port)?;
    let (ptr, bit) = check.location();
    let _guard = lock(&dev.sems.tbl_regs);
    reg.update(ptr, 1 << bit, if enable { 1 << bit } else { 0 })
}

/// Minimum TCP header size, in bytes, below which the TcpHSize check fires.
pub fn get_tcp_min_hdr_size(dev: &Device, port: u8) -> Result<u8> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.read(PTR_TCP_MIN_HDR)
}

pub fn set_tcp_min_hdr_size(dev: &Device, port: u8, size: u8) -> Result<()> {
    if size == 0 {
        return Err(MsdError::bad_param("TCP minimum header size of 0"));
    }
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.write(PTR_TCP_MIN_HDR, size)
}

/// Largest ICMP frame, in bytes, allowed by the IcmpSize check.
pub fn get_icmp_max_size(dev: &Device, port: u8) -> Result<u16> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    let lo = reg.read(PTR_ICMP_MAX_LO)? as u16;
    let hi = reg.read(PTR_ICMP_MAX_HI)? as u16;
    Ok(hi << 8 | lo)
}

pub fn set_icmp_max_size(dev: &Device, port: u8, size: u16) -> Result<()> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.write(PTR_ICMP_MAX_LO, size as u8)?;
    reg.write(PTR_ICMP_MAX_HI, (size >> 8) as u8)
}

pub fn get_port_ttl_threshold(dev: &Device, port: u8) -> Result<u8> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.read(PTR_TTL_THRESHOLD)
}

pub fn set_port_ttl_threshold(dev: &Device, port: u8, ttl: u8) -> Result<()> {
    let reg = port_reg(dev, port)?;
    let _guard = lock(&dev.sems.tbl_regs);
    reg.write(PTR_TTL_THRESHOLD, ttl)
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
    fn destinations() {
        let (sim, dev) = setup(Family::Amethyst);
        set_cpu_dest(&dev, Some(10)).unwrap();
        set_mgmt_pri(&dev, 7).unwrap();
        assert_eq!(get_cpu_dest(&dev).unwrap(), Some(10));
        assert_eq!(get_mgmt_pri(&dev).unwrap(), 7);
        assert_eq!(sim.monitor_byte(PTR_CPU_DEST), 0xea);

        set_mirror_dest(&dev, None).unwrap();
        assert_eq!(get_mirror_dest(&dev).unwrap(), None);
        set_route_dest(&dev, Some(3)).unwrap();
        assert_eq!(get_route_dest(&dev).unwrap(), Some(3));
        assert!(matches!(
            set_ingress_monitor_dest(&dev, Some(11)),
            Err(MsdError::BadParam(_))
        ));
    }

    #[test]
    fn destinations_use_physical_ports() {
        let (sim, dev) = setup(Family::Spruce);
        set_egress_monitor_dest(&dev, Some(7)).unwrap();
        assert_eq!(sim.monitor_byte(PTR_EGRESS_MONITOR_DEST), 9);
        assert_eq!(get_egress_monitor_dest(&dev).unwrap(), Some(7));
    }

    #[test]
    fn reserved_multicast() {
        let (_sim, dev) = setup(Family::Peridot);
        set_rsvd2cpu(&dev, 0x0000_ffff).unwrap();
        set_rsvd2cpu_addr(&dev, 0x0e, false).unwrap();
        set_rsvd2cpu_addr(&dev, 0x1f, true).unwrap();
        assert_eq!(get_rsvd2cpu(&dev).unwrap(), 0x8000_bfff);
        assert!(set_rsvd2cpu_addr(&dev, 0x20, true).is_err());
    }

    #[test]
    fn frame_actions_per_port() {
        let (sim, dev) = setup(Family::Amethyst);
        set_frame_action(&dev, 4, FrameKey::Etype, Action::Trap).unwrap();
        set_frame_action(&dev, 4, FrameKey::Udp, Action::Discard).unwrap();
        let action = |port, key| get_frame_action(&dev, port, key).unwrap();
        assert_eq!(action(4, FrameKey::Etype), Action::Trap);
        assert_eq!(action(4, FrameKey::Da), Action::Normal);
        assert_eq!(action(5, FrameKey::Etype), Action::Normal);
        assert_eq!(sim.policy_byte(4, 3), 2);
        assert_eq!(sim.policy_byte(4, 7), 3);
        assert_eq!("opt82".parse::<FrameKey>().unwrap(), FrameKey::Opt82);
    }

    #[test]
    fn dos_checks() {
        let (sim, dev) = setup(Family::Amethyst);
        set_dos_check(&dev, 1, DosCheck::TcpHSize, true).unwrap();
        set_dos_check(&dev, 1, DosCheck::IcmpSize, true).unwrap();
        set_dos_check(&dev, 1, DosCheck::ZeroSip, true).unwrap();
        set_dos_check(&dev, 1, DosCheck::ZeroSip, false).unwrap();
        assert_eq!(sim.policy_byte(1, PTR_DOS_A), 0x80);
        assert_eq!(sim.policy_byte(1, PTR_DOS_B), 0x04);
        assert!(get_dos_check(&dev, 1, DosCheck::IcmpSize).unwrap());
        assert!(!get_dos_check(&dev, 1, DosCheck::ZeroSip).unwrap());

        set_tcp_min_hdr_size(&dev, 1, 20).unwrap();
        assert_eq!(get_tcp_min_hdr_size(&dev, 1).unwrap(), 20);
        assert!(set_tcp_min_hdr_size(&dev, 1, 0).is_err());

        set_icmp_max_size(&dev, 1, 1500).unwrap();
        assert_eq!(get_icmp_max_size(&dev, 1).unwrap(), 1500);
        assert_eq!(sim.policy_byte(1, PTR_ICMP_MAX_LO), 0xdc);
        assert_eq!(sim.policy_byte(1, PTR_ICMP_MAX_HI), 0x05);

        set_port_ttl_threshold(&dev, 1, 2).unwrap();
        assert_eq!(get_port_ttl_threshold(&dev, 1).unwrap(), 2);
    }
}
