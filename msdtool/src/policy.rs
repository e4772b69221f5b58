// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Result;

use msd::policy::{self, DosCheck, FrameKey};

use crate::common::{parse_port, print_field};
use crate::{MsdTool, PolicyCommands};

fn dest(port: Option<u8>) -> String {
    match port {
        Some(p) => p.to_string(),
        None => "none".to_string(),
    }
}

fn show_global(ctx: &MsdTool) -> Result<()> {
    let dev = &ctx.dev;
    print_field("cpu dest", dest(policy::get_cpu_dest(dev)?));
    print_field("mgmt priority", policy::get_mgmt_pri(dev)?);
    let ingress = policy::get_ingress_monitor_dest(dev)?;
    print_field("ingress monitor dest", dest(ingress));
    let egress = policy::get_egress_monitor_dest(dev)?;
    print_field("egress monitor dest", dest(egress));
    print_field("mirror dest", dest(policy::get_mirror_dest(dev)?));
    print_field("route dest", dest(policy::get_route_dest(dev)?));
    print_field("rsvd2cpu", format!("0x{:08x}", policy::get_rsvd2cpu(dev)?));
    Ok(())
}

fn show_port(ctx: &MsdTool, port: u8) -> Result<()> {
    let dev = &ctx.dev;
    for key in FrameKey::ALL {
        print_field(
            &format!("{key:?} action"),
            format!("{:?}", policy::get_frame_action(dev, port, key)?),
        );
    }
    let enabled: Vec<String> = DosCheck::ALL
        .into_iter()
        .filter_map(|c| match policy::get_dos_check(dev, port, c) {
            Ok(true) => Some(Ok(format!("{c:?}"))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        })
        .collect::<msd::Result<_>>()?;
    print_field("dos checks", enabled.join(","));
    print_field("tcp min header", policy::get_tcp_min_hdr_size(dev, port)?);
    print_field("icmp max size", policy::get_icmp_max_size(dev, port)?);
    print_field("ttl threshold", policy::get_port_ttl_threshold(dev, port)?);
    Ok(())
}

pub fn policy_command(ctx: &MsdTool, cmd: PolicyCommands) -> Result<()> {
    match cmd {
        PolicyCommands::Show { port: None } => show_global(ctx),
        PolicyCommands::Show { port: Some(p) } => show_port(ctx, p),
        PolicyCommands::CpuDest { port } => {
            Ok(policy::set_cpu_dest(&ctx.dev, parse_port(&port)?)?)
        }
        PolicyCommands::MirrorDest { port } => {
            Ok(policy::set_mirror_dest(&ctx.dev, parse_port(&port)?)?)
        }
        PolicyCommands::Action { port, key, action } => {
            Ok(policy::set_frame_action(&ctx.dev, port, key, action)?)
        }
    }
}
