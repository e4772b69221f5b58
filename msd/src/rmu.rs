// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Framing for register requests carried over the Remote Management Unit.
//!
//! A request frame is addressed to the switch's management MAC and carries a
//! From_CPU DSA tag, the request format and code, then a list of 32-bit
//! register commands ending in `CMD_END`.  The switch answers with the same
//! layout, with read commands carrying the register contents in their data
//! field.

use crate::error::{MsdError, Result};

pub const RMU_DA: [u8; 6] = [0x01, 0x50, 0x43, 0x00, 0x00, 0x00];

const FORMAT_SOHO: u16 = 0x0001;
const CODE_REG_RW: u16 = 0x2000;
const CMD_END: u32 = 0xffff_ffff;
const HDR_LEN: usize = 22;
const MIN_FRAME: usize = 60;

const TAG_FROM_CPU: u8 = 0x40;
const TAG_TO_CPU: u8 = 0x00;

/// One register access within an RMU frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RmuCmd {
    Read { dev_addr: u8, reg: u8, data: u16 },
    Write { dev_addr: u8, reg: u8, data: u16 },
}

impl RmuCmd {
    const OP_WRITE: u32 = 0b000001;
    const OP_READ: u32 = 0b000010;

    pub fn read(dev_addr: u8, reg: u8) -> Self {
        RmuCmd::Read {
            dev_addr,
            reg,
            data: 0,
        }
    }

    pub fn write(dev_addr: u8, reg: u8, data: u16) -> Self {
        RmuCmd::Write {
            dev_addr,
            reg,
            data,
        }
    }

    pub fn data(&self) -> u16 {
        match self {
            RmuCmd::Read { data, .. } | RmuCmd::Write { data, .. } => *data,
        }
    }

    fn encode(&self) -> u32 {
        let (op, dev_addr, reg, data) = match *self {
            RmuCmd::Read {
                dev_addr,
                reg,
                data,
            } => (Self::OP_READ, dev_addr, reg, data),
            RmuCmd::Write {
                dev_addr,
                reg,
                data,
            } => (Self::OP_WRITE, dev_addr, reg, data),
        };
        op << 26
            | (dev_addr as u32 & 0x1f) << 21
            | (reg as u32 & 0x1f) << 16
            | data as u32
    }

    fn decode(word: u32) -> Result<Self> {
        let dev_addr = ((word >> 21) & 0x1f) as u8;
        let reg = ((word >> 16) & 0x1f) as u8;
        let data = word as u16;
        match word >> 26 {
            Self::OP_READ => Ok(RmuCmd::Read {
                dev_addr,
                reg,
                data,
            }),
            Self::OP_WRITE => Ok(RmuCmd::Write {
                dev_addr,
                reg,
                data,
            }),
            op => Err(MsdError::fail(format!("unknown RMU opcode {op:#x}"))),
        }
    }
}

/// A decoded RMU register request or response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RmuFrame {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub dev_num: u8,
    pub seq: u8,
    pub response: bool,
    pub cmds: Vec<RmuCmd>,
}

impl RmuFrame {
    pub fn request(
        src: [u8; 6],
        dev_num: u8,
        seq: u8,
        cmds: Vec<RmuCmd>,
    ) -> Self {
        RmuFrame {
            dst: RMU_DA,
            src,
            dev_num,
            seq,
            response: false,
            cmds,
        }
    }

    /// Build the answer to this request, addressed back to the requester.
    pub fn reply(&self, src: [u8; 6], cmds: Vec<RmuCmd>) -> Self {
        RmuFrame {
            dst: self.src,
            src,
            dev_num: self.dev_num,
            seq: self.seq,
            response: true,
            cmds,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let len = HDR_LEN + 4 * (self.cmds.len() + 1);
        let mut buf = Vec::with_capacity(MIN_FRAME.max(len));
        buf.extend_from_slice(&self.dst);
        buf.extend_from_slice(&self.src);
        let tag = if self.response { TAG_TO_CPU } else { TAG_FROM_CPU };
        let dev_num = self.dev_num & 0x1f;
        buf.extend_from_slice(&[tag | dev_num, 0xf8, 0x00, self.seq]);
        buf.extend_from_slice(&FORMAT_SOHO.to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&CODE_REG_RW.to_be_bytes());
        for cmd in &self.cmds {
            buf.extend_from_slice(&cmd.encode().to_be_bytes());
        }
        buf.extend_from_slice(&CMD_END.to_be_bytes());
        if buf.len() < MIN_FRAME {
            buf.resize(MIN_FRAME, 0);
        }
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HDR_LEN + 4 {
            return Err(MsdError::fail(format!(
                "RMU frame too short: {} bytes",
                buf.len()
            )));
        }
        let format = u16::from_be_bytes([buf[16], buf[17]]);
        let code = u16::from_be_bytes([buf[20], buf[21]]);
        if format != FORMAT_SOHO || code != CODE_REG_RW {
            return Err(MsdError::fail(format!(
                "unexpected RMU format {format:#06x} code {code:#06x}"
            )));
        }

        let mut cmds = Vec::new();
        let mut terminated = false;
        for chunk in buf[HDR_LEN..].chunks_exact(4) {
            let word =
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if word == CMD_END {
                terminated = true;
                break;
            }
            cmds.push(RmuCmd::decode(word)?);
        }
        if !terminated {
            return Err(MsdError::fail("RMU command list is not terminated"));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&buf[0..6]);
        src.copy_from_slice(&buf[6..12]);
        Ok(RmuFrame {
            dst,
            src,
            dev_num: buf[12] & 0x1f,
            seq: buf[15],
            response: buf[12] & 0xc0 == TAG_TO_CPU,
            cmds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let f = RmuFrame::request(
            [2, 0, 0, 0, 0, 1],
            3,
            0x7e,
            vec![RmuCmd::read(0x1b, 0x0b), RmuCmd::write(0x1c, 0x16, 0x8000)],
        );
        let b = f.to_bytes();
        assert_eq!(b.len(), 60);
        assert_eq!(&b[0..6], &RMU_DA);
        assert_eq!(b[12], 0x43);
        assert_eq!(b[15], 0x7e);
        assert_eq!(&b[22..26], &[0x0b, 0x6b, 0x00, 0x00]);
        assert_eq!(&b[26..30], &[0x07, 0x96, 0x80, 0x00]);
        assert_eq!(&b[30..34], &[0xff; 4]);
        assert_eq!(RmuFrame::parse(&b).unwrap(), f);
    }

    #[test]
    fn rejects_garbage() {
        assert!(RmuFrame::parse(&[0u8; 10]).is_err());
        let mut b = RmuFrame::request([0; 6], 0, 0, vec![]).to_bytes();
        b[21] = 0x01;
        assert!(RmuFrame::parse(&b).is_err());
    }
}
