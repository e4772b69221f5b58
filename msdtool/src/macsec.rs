// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Result;

use msd::macsec::{self, Direction};

use crate::common::print_field;
use crate::{MacsecCommands, MsdTool};

const DIRECTIONS: [Direction; 2] = [Direction::Egress, Direction::Ingress];

fn status(ctx: &MsdTool) -> Result<()> {
    let dev = &ctx.dev;
    let g = macsec::get_global_config(dev)?;
    print_field("enabled", g.enable);
    print_field("bypass on miss", g.bypass_on_miss);

    println!();
    println!(
        "{:4} {:17} {:17} {:>6} {:>4} {:>5} {:10}",
        "RULE", "DA", "MASK", "ETYPE", "PORT", "VID", "ACTION"
    );
    for idx in 0..macsec::NUM_RULES {
        if let Some(r) = macsec::get_rule(dev, idx)? {
            println!(
                "{:4} {:17} {:17} {:>6x} {:>4} {:>5} {:10}",
                idx,
                r.da.to_string(),
                r.da_mask.to_string(),
                r.ethertype,
                r.port.map_or("*".to_string(), |p| p.to_string()),
                r.vlan.map_or("*".to_string(), |v| v.to_string()),
                format!("{:?}", r.action)
            );
        }
    }

    println!();
    println!(
        "{:8} {:4} {:12} {:7} {:6} {:>6}",
        "DIR", "SECY", "CIPHER", "PROTECT", "VALID", "OFFSET"
    );
    for dir in DIRECTIONS {
        for idx in 0..macsec::NUM_SECY {
            if let Some(s) = macsec::get_secy(dev, dir, idx)? {
                println!(
                    "{:8} {:4} {:12} {:7} {:6} {:>6}",
                    format!("{dir:?}"),
                    idx,
                    format!("{:?}", s.cipher),
                    s.protect_frames,
                    format!("{:?}", s.validate),
                    s.conf_offset
                );
            }
        }
    }

    println!();
    println!(
        "{:8} {:3} {:16} {:4} {:2} {:16}",
        "DIR", "SC", "SCI", "SECY", "AN", "SAS"
    );
    for dir in DIRECTIONS {
        for idx in 0..macsec::NUM_SC {
            if let Some(sc) = macsec::get_sc(dev, dir, idx)? {
                let sas: Vec<String> = sc
                    .sa
                    .iter()
                    .map(|sa| sa.map_or("-".to_string(), |s| s.to_string()))
                    .collect();
                println!(
                    "{:8} {:3} {:016x} {:4} {:2} {:16}",
                    format!("{dir:?}"),
                    idx,
                    sc.sci,
                    sc.secy,
                    sc.encoding_an,
                    sas.join(",")
                );
            }
        }
    }

    println!();
    println!("{:8} {:3} {:>16} {:>8}", "DIR", "SA", "NEXT PN", "KEY BITS");
    for dir in DIRECTIONS {
        for idx in 0..macsec::NUM_SA {
            if let Some(sa) = macsec::get_sa(dev, dir, idx)? {
                println!(
                    "{:8} {:3} {:>16x} {:>8}",
                    format!("{dir:?}"),
                    idx,
                    sa.next_pn,
                    sa.key.len() * 8
                );
            }
        }
    }
    Ok(())
}

fn counters(ctx: &MsdTool, secy: u8) -> Result<()> {
    println!("{:10} {:>16} {:>16}", "", "EGRESS", "INGRESS");
    let e = macsec::get_counters(&ctx.dev, Direction::Egress, secy)?;
    let i = macsec::get_counters(&ctx.dev, Direction::Ingress, secy)?;
    for (name, eg, ig) in [
        ("protected", e.protected, i.protected),
        ("encrypted", e.encrypted, i.encrypted),
        ("ok", e.ok, i.ok),
        ("invalid", e.invalid, i.invalid),
        ("not valid", e.not_valid, i.not_valid),
        ("late", e.late, i.late),
    ] {
        println!("{:10} {:>16} {:>16}", name, eg, ig);
    }
    Ok(())
}

pub fn macsec_command(ctx: &MsdTool, cmd: MacsecCommands) -> Result<()> {
    match cmd {
        MacsecCommands::Status => status(ctx),
        MacsecCommands::Counters { secy } => counters(ctx, secy),
    }
}
