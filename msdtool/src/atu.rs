// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Result;

use msd::atu::{self, AtuEntry, EntryState, FlushScope};

use crate::common::{parse_port_list, port_list, print_field};
use crate::{AtuCommands, MsdTool};

fn dump(ctx: &MsdTool, fid: u16) -> Result<()> {
    let entries = atu::entries(&ctx.dev, fid)?;
    println!(
        "{:17} {:>4} {:>5} {:>3} {:5} {:24}",
        "MAC", "FID", "STATE", "PRI", "TRUNK", "PORTS"
    );
    for e in &entries {
        println!(
            "{:17} {:>4} {:>5x} {:>3} {:5} {:24}",
            e.mac.to_string(),
            e.fid,
            e.state.raw(),
            e.priority,
            if e.trunk { "yes" } else { "no" },
            port_list(e.port_vec)
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

pub fn atu_command(ctx: &MsdTool, cmd: AtuCommands) -> Result<()> {
    let dev = &ctx.dev;
    match cmd {
        AtuCommands::Dump { fid } => dump(ctx, fid),
        AtuCommands::Add {
            mac,
            ports,
            fid,
            priority,
        } => {
            let state = if mac.is_multicast() {
                EntryState::MC_STATIC
            } else {
                EntryState::UC_STATIC
            };
            let entry = AtuEntry {
                mac,
                fid,
                port_vec: parse_port_list(&ports)?,
                trunk: false,
                state,
                priority,
            };
            Ok(atu::load_entry(dev, &entry)?)
        }
        AtuCommands::Del { mac, fid } => Ok(atu::delete_entry(dev, mac, fid)?),
        AtuCommands::Flush { fid, all } => {
            let scope = if all {
                FlushScope::All
            } else {
                FlushScope::NonStatic
            };
            Ok(atu::flush(dev, scope, fid)?)
        }
        AtuCommands::Move { from, to, fid } => {
            Ok(atu::move_port(dev, FlushScope::All, fid, from, to)?)
        }
        AtuCommands::Age { secs: Some(secs) } => {
            Ok(atu::set_age_time(dev, secs)?)
        }
        AtuCommands::Age { secs: None } => {
            print_field("age time (s)", atu::get_age_time(dev)?);
            Ok(())
        }
        AtuCommands::Violation => {
            match atu::get_violation(dev)? {
                Some(v) => {
                    print_field("kind", format!("{:?}", v.kind));
                    print_field("mac", v.mac);
                    print_field("fid", v.fid);
                    print_field(
                        "port",
                        v.port.map_or("unknown".to_string(), |p| p.to_string()),
                    );
                }
                None => println!("no violation pending"),
            }
            Ok(())
        }
    }
}
