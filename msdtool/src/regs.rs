// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use msd::Device;
use msd::device::{APB_WINDOW, GLOBAL1, GLOBAL2};

use crate::MsdTool;
use crate::common::parse_val;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Block {
    Global1,
    Global2,
    Port(u8),
    Raw(u8),
}

fn parse_block(dev: &str) -> Result<Block> {
    let lower = dev.to_ascii_lowercase();
    match lower.as_str() {
        "global1" | "g1" => Ok(Block::Global1),
        "global2" | "g2" => Ok(Block::Global2),
        _ => {
            if let Some(p) = lower.strip_prefix("port") {
                let p = p
                    .parse::<u8>()
                    .map_err(|_| anyhow!("bad port block: {dev}"))?;
                Ok(Block::Port(p))
            } else {
                let addr = parse_val(dev)?;
                if addr > 0x1f {
                    return Err(anyhow!("bad SMI address: {dev}"));
                }
                Ok(Block::Raw(addr as u8))
            }
        }
    }
}

// Register names, by block.  Only the registers this tool (and the driver)
// cares about are named; anything else can be addressed by number.
fn get_regs(block: Block) -> BTreeMap<&'static str, u8> {
    let mut m = BTreeMap::new();
    match block {
        Block::Global1 => {
            m.insert("status", 0x00);
            m.insert("atu_fid", 0x01);
            m.insert("vtu_fid", 0x02);
            m.insert("vtu_sid", 0x03);
            m.insert("control", 0x04);
            m.insert("vtu_op", 0x05);
            m.insert("vtu_vid", 0x06);
            m.insert("vtu_data0", 0x07);
            m.insert("vtu_data1", 0x08);
            m.insert("vtu_data2", 0x09);
            m.insert("atu_ctrl", 0x0a);
            m.insert("atu_op", 0x0b);
            m.insert("atu_data", 0x0c);
            m.insert("atu_mac01", 0x0d);
            m.insert("atu_mac23", 0x0e);
            m.insert("atu_mac45", 0x0f);
            m.insert("monitor_mgmt_ctrl", 0x1a);
            m.insert("control2", 0x1c);
            m.insert("stats_op", 0x1d);
            m.insert("stats_counter32", 0x1e);
            m.insert("stats_counter10", 0x1f);
        }
        Block::Global2 => {
            m.insert("int_source", 0x00);
            m.insert("int_mask", 0x01);
            m.insert("mgmt_enable_2x", 0x02);
            m.insert("mgmt_enable_0x", 0x03);
            m.insert("flow_ctrl_delay", 0x04);
            m.insert("switch_mgmt", 0x05);
            m.insert("device_mapping", 0x06);
            m.insert("trunk_mask", 0x07);
            m.insert("trunk_members", 0x08);
            m.insert("ingress_rate_cmd", 0x09);
            m.insert("ingress_rate_data", 0x0a);
            m.insert("cross_chip_port_vlan", 0x0b);
            m.insert("cross_chip_port_vlan_data", 0x0c);
            m.insert("switch_mac", 0x0d);
            m.insert("atu_stats", 0x0e);
            m.insert("priority_override", 0x0f);
            m.insert("eeprom_cmd", 0x14);
            m.insert("eeprom_data", 0x15);
            m.insert("avb_cmd", 0x16);
            m.insert("avb_data", 0x17);
            m.insert("smi_phy_cmd", 0x18);
            m.insert("smi_phy_data", 0x19);
            m.insert("scratch_misc", 0x1a);
            m.insert("watchdog", 0x1b);
            m.insert("qos_weights", 0x1c);
            m.insert("misc", 0x1d);
        }
        Block::Port(_) => {
            m.insert("status", 0x00);
            m.insert("phys_ctrl", 0x01);
            m.insert("flow_ctrl", 0x02);
            m.insert("switch_id", 0x03);
            m.insert("port_ctrl0", 0x04);
            m.insert("port_ctrl1", 0x05);
            m.insert("vlan_map", 0x06);
            m.insert("vid_pri", 0x07);
            m.insert("port_ctrl2", 0x08);
            m.insert("egress_rate0", 0x09);
            m.insert("egress_rate1", 0x0a);
            m.insert("assoc_vector", 0x0b);
            m.insert("atu_ctrl", 0x0c);
            m.insert("override", 0x0d);
            m.insert("policy_mgmt_ctrl", 0x0e);
            m.insert("etype", 0x0f);
            m.insert("led_ctrl", 0x16);
            m.insert("ip_pri_map", 0x17);
            m.insert("ieee_pri_map", 0x18);
            m.insert("port_ctrl3", 0x19);
            m.insert("queue_counter", 0x1b);
            m.insert("queue_ctrl", 0x1c);
            m.insert("cut_through", 0x1f);
        }
        Block::Raw(APB_WINDOW) => {
            m.insert("apb_ctrl", 0x00);
            m.insert("apb_addr_hi", 0x01);
            m.insert("apb_addr_lo", 0x02);
            m.insert("apb_data_hi", 0x03);
            m.insert("apb_data_lo", 0x04);
        }
        Block::Raw(_) => {}
    }
    m
}

/// Resolve a block argument to an SMI address.
pub fn parse_dev(dev: &Device, name: &str) -> Result<u8> {
    Ok(match parse_block(name)? {
        Block::Global1 => GLOBAL1,
        Block::Global2 => GLOBAL2,
        Block::Port(p) => dev.port_addr(p)?,
        Block::Raw(addr) => addr,
    })
}

/// Resolve a register argument, by name within the block or by number.
pub fn parse_reg(dev: &str, reg: &str) -> Result<u8> {
    if let Ok(r) = parse_val(reg) {
        return u8::try_from(r)
            .ok()
            .filter(|r| *r <= 0x1f)
            .ok_or_else(|| anyhow!("bad register: {reg}"));
    }
    get_regs(parse_block(dev)?)
        .get(reg)
        .copied()
        .ok_or_else(|| anyhow!("no register {reg} in {dev}"))
}

pub fn list(dev: &str) -> Result<()> {
    println!("{:26} {:6}", "NAME", "REG");
    for (name, reg) in get_regs(parse_block(dev)?) {
        println!("{:26} 0x{:02x}", name, reg);
    }
    Ok(())
}

pub fn dump(ctx: &MsdTool, dev: &str) -> Result<()> {
    let addr = parse_dev(&ctx.dev, dev)?;
    let regs = get_regs(parse_block(dev)?);
    if regs.is_empty() {
        // nothing named here, so show the whole block
        for reg in 0..32u8 {
            println!("0x{:02x}: {:04x}", reg, ctx.dev.get_any_reg(addr, reg)?);
        }
        return Ok(());
    }
    println!("{:26} {:4} {:6}", "NAME", "REG", "VALUE");
    for (name, reg) in regs {
        let val = ctx.dev.get_any_reg(addr, reg)?;
        println!("{:26} 0x{:02x} {:04x}", name, reg, val);
    }
    Ok(())
}

#[test]
fn test_parse_block() {
    assert_eq!(parse_block("global1").unwrap(), Block::Global1);
    assert_eq!(parse_block("G2").unwrap(), Block::Global2);
    assert_eq!(parse_block("port10").unwrap(), Block::Port(10));
    assert_eq!(parse_block("0x1d").unwrap(), Block::Raw(0x1d));
    assert!(parse_block("0x20").is_err());
    assert!(parse_block("portx").is_err());
    assert_eq!(parse_reg("global1", "atu_op").unwrap(), 0x0b);
    assert_eq!(parse_reg("port3", "0x0e").unwrap(), 0x0e);
    assert!(parse_reg("port3", "atu_op").is_err());
}
