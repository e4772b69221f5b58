// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The platform-facing side of the driver: the traits a board support
//! package implements, and the three ways a register access can reach the
//! switch.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use log::{trace, warn};

use crate::config::{Channel, SysConfig};
use crate::error::{MsdError, Result};
use crate::rmu::{RmuCmd, RmuFrame};
use crate::sem::lock;

/// Raw MII management access, as provided by the platform.
pub trait SmiBus: Send + Sync {
    fn read(&self, dev_addr: u8, reg: u8) -> Result<u16>;
    fn write(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()>;
}

/// Sends one RMU request frame and returns the switch's response frame.
pub trait RmuLink: Send + Sync {
    fn tx_rx(&self, request: &[u8]) -> Result<Vec<u8>>;
}

/// Board support callbacks handed to `Device::load`
#[derive(Default)]
pub struct Bsp {
    pub smi: Option<Box<dyn SmiBus>>,
    pub rmu: Option<Box<dyn RmuLink>>,
}

impl Bsp {
    pub fn smi(bus: impl SmiBus + 'static) -> Self {
        Bsp {
            smi: Some(Box::new(bus)),
            rmu: None,
        }
    }

    pub fn with_rmu(mut self, link: impl RmuLink + 'static) -> Self {
        self.rmu = Some(Box::new(link));
        self
    }
}

/// Bounded (or unbounded, for a limit of 0) polling of a hardware condition.
#[derive(Clone, Copy, Debug)]
pub struct Poller {
    limit: u32,
}

impl Poller {
    pub fn new(limit: u32) -> Self {
        Poller { limit }
    }

    /// Call `done` until it returns true.  Running out of polls is a `Fail`.
    pub fn until(
        &self,
        what: &str,
        mut done: impl FnMut() -> Result<bool>,
    ) -> Result<()> {
        let mut polls = 0u32;
        loop {
            if done()? {
                return Ok(());
            }
            polls = polls.saturating_add(1);
            if self.limit != 0 && polls >= self.limit {
                warn!("gave up waiting for {what} after {polls} polls");
                return Err(MsdError::fail(format!(
                    "timed out waiting for {what}"
                )));
            }
        }
    }
}

// SMI command/data registers used in multi-chip addressing mode
const SMI_CMD: u8 = 0x00;
const SMI_DATA: u8 = 0x01;
const SMI_BUSY: u16 = 1 << 15;
const SMI_MODE_22: u16 = 1 << 12;
const SMI_OP_WRITE: u16 = 0b01 << 10;
const SMI_OP_READ: u16 = 0b10 << 10;

fn smi_cmd(op: u16, dev_addr: u8, reg: u8) -> u16 {
    SMI_BUSY
        | SMI_MODE_22
        | op
        | ((dev_addr as u16 & 0x1f) << 5)
        | (reg as u16 & 0x1f)
}

struct RmuChannel {
    link: Box<dyn RmuLink>,
    src: [u8; 6],
    dev_num: u8,
    seq: AtomicU8,
}

impl RmuChannel {
    fn exchange(&self, cmd: RmuCmd) -> Result<RmuCmd> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let req = RmuFrame::request(self.src, self.dev_num, seq, vec![cmd]);
        let rsp = RmuFrame::parse(&self.link.tx_rx(&req.to_bytes())?)?;
        if !rsp.response || rsp.seq != seq {
            return Err(MsdError::fail(format!(
                "RMU response out of sequence: sent {seq}, got {}",
                rsp.seq
            )));
        }
        match rsp.cmds.as_slice() {
            [one] => Ok(*one),
            other => Err(MsdError::fail(format!(
                "RMU response carried {} commands, expected 1",
                other.len()
            ))),
        }
    }
}

enum Path {
    Single(Box<dyn SmiBus>),
    MultiChip {
        bus: Box<dyn SmiBus>,
        base: u8,
        sem: Mutex<()>,
    },
    Rmu(RmuChannel),
}

/// The register transport selected by the configured channel
pub struct HwAccess {
    path: Path,
    poller: Poller,
}

impl HwAccess {
    pub fn new(config: &SysConfig, bsp: Bsp) -> Result<Self> {
        let poller = Poller::new(config.poll_limit);
        let path = match config.channel {
            Channel::Smi => Path::Single(bsp.smi.ok_or_else(|| {
                MsdError::bad_param("smi channel without an SMI bus")
            })?),
            Channel::SmiMultiChip => Path::MultiChip {
                bus: bsp.smi.ok_or_else(|| {
                    MsdError::bad_param("multi-chip channel without an SMI bus")
                })?,
                base: config.base_addr,
                sem: Mutex::new(()),
            },
            Channel::Rmu => Path::Rmu(RmuChannel {
                link: bsp.rmu.ok_or_else(|| {
                    MsdError::bad_param("rmu channel without an RMU link")
                })?,
                src: config.rmu_src_mac,
                dev_num: config.dev_num,
                seq: AtomicU8::new(0),
            }),
        };
        Ok(HwAccess { path, poller })
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    pub fn read(&self, dev_addr: u8, reg: u8) -> Result<u16> {
        let val = match &self.path {
            Path::Single(bus) => bus.read(dev_addr, reg)?,
            Path::MultiChip { bus, base, sem } => {
                let _guard = lock(sem);
                self.multi_wait(bus.as_ref(), *base)?;
                bus.write(*base, SMI_CMD, smi_cmd(SMI_OP_READ, dev_addr, reg))?;
                self.multi_wait(bus.as_ref(), *base)?;
                bus.read(*base, SMI_DATA)?
            }
            Path::Rmu(rmu) => rmu.exchange(RmuCmd::read(dev_addr, reg))?.data(),
        };
        trace!("read  {dev_addr:#04x}/{reg:#04x} -> {val:#06x}");
        Ok(val)
    }

    pub fn write(&self, dev_addr: u8, reg: u8, value: u16) -> Result<()> {
        trace!("write {dev_addr:#04x}/{reg:#04x} <- {value:#06x}");
        match &self.path {
            Path::Single(bus) => bus.write(dev_addr, reg, value),
            Path::MultiChip { bus, base, sem } => {
                let _guard = lock(sem);
                self.multi_wait(bus.as_ref(), *base)?;
                bus.write(*base, SMI_DATA, value)?;
                let cmd = smi_cmd(SMI_OP_WRITE, dev_addr, reg);
                bus.write(*base, SMI_CMD, cmd)?;
                self.multi_wait(bus.as_ref(), *base)
            }
            Path::Rmu(rmu) => rmu
                .exchange(RmuCmd::write(dev_addr, reg, value))
                .map(|_| ()),
        }
    }

    fn multi_wait(&self, bus: &dyn SmiBus, base: u8) -> Result<()> {
        self.poller.until("SMI command register", || {
            Ok(bus.read(base, SMI_CMD)? & SMI_BUSY == 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    // How a scripted switch mangles its RMU replies
    #[derive(Clone, Copy)]
    enum Reply {
        Faithful,
        NextSeq,
        TwoCmds,
        Echo,
    }

    struct ScriptedRmu(Reply);

    impl RmuLink for ScriptedRmu {
        fn tx_rx(&self, request: &[u8]) -> Result<Vec<u8>> {
            let req = RmuFrame::parse(request)?;
            let answer = req
                .cmds
                .iter()
                .map(|cmd| match *cmd {
                    RmuCmd::Read { dev_addr, reg, .. } => RmuCmd::Read {
                        dev_addr,
                        reg,
                        data: 0x1234,
                    },
                    other => other,
                })
                .collect::<Vec<_>>();
            let mut rsp = req.reply([0x00, 0x50, 0x43, 0, 0, 1], answer);
            match self.0 {
                Reply::Faithful => {}
                Reply::NextSeq => rsp.seq = rsp.seq.wrapping_add(1),
                Reply::TwoCmds => rsp.cmds.push(RmuCmd::read(0x1b, 0x00)),
                Reply::Echo => rsp = req,
            }
            Ok(rsp.to_bytes())
        }
    }

    fn over_rmu(reply: Reply) -> HwAccess {
        let cfg = SysConfig {
            channel: Channel::Rmu,
            ..Default::default()
        };
        HwAccess::new(&cfg, Bsp::default().with_rmu(ScriptedRmu(reply)))
            .unwrap()
    }

    #[test]
    fn smi_command_encoding() {
        assert_eq!(smi_cmd(SMI_OP_READ, 0x1b, 0x0b), 0x9b6b);
        assert_eq!(smi_cmd(SMI_OP_WRITE, 0x00, 0x03), 0x9403);
    }

    #[test]
    fn poller_limits() {
        let n = Cell::new(0);
        let p = Poller::new(3);
        let r = p.until("never", || {
            n.set(n.get() + 1);
            Ok(false)
        });
        assert!(matches!(r, Err(MsdError::Fail(_))));
        assert_eq!(n.get(), 3);

        let n = Cell::new(0);
        Poller::new(0)
            .until("eventually", || {
                n.set(n.get() + 1);
                Ok(n.get() == 50)
            })
            .unwrap();
        assert_eq!(n.get(), 50);
    }

    #[test]
    fn channel_needs_matching_bsp() {
        let cfg = SysConfig {
            channel: Channel::Rmu,
            ..Default::default()
        };
        assert!(matches!(
            HwAccess::new(&cfg, Bsp::default()),
            Err(MsdError::BadParam(_))
        ));
    }

    #[test]
    fn rmu_replies_must_match() {
        let hw = over_rmu(Reply::Faithful);
        assert_eq!(hw.read(0x1b, 0x03).unwrap(), 0x1234);
        hw.write(0x1b, 0x04, 0x0001).unwrap();
        for reply in [Reply::NextSeq, Reply::TwoCmds, Reply::Echo] {
            let hw = over_rmu(reply);
            assert!(matches!(hw.read(0x1b, 0x03), Err(MsdError::Fail(_))));
            assert!(matches!(
                hw.write(0x1b, 0x04, 0x0001),
                Err(MsdError::Fail(_))
            ));
        }
    }
}
