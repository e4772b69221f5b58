// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Result;

use crate::MsdTool;
use crate::common::{port_list, print_field};

pub fn show(ctx: &MsdTool) -> Result<()> {
    let dev = &ctx.dev;
    let info = dev.info();
    let id = dev.switch_id();
    let cfg = dev.config();

    print_field("family", dev.family());
    print_field("product", format!("0x{:03x}", id.product));
    print_field("revision", id.revision);
    print_field("channel", format!("{:?}", cfg.channel));
    print_field("device number", cfg.dev_num);
    print_field("ports", dev.num_ports());
    print_field("port block base", format!("0x{:02x}", info.port_base));
    print_field("max fid", info.max_fid());
    print_field("macsec", info.has_macsec);

    println!();
    println!("{:>5} {:>5} {:>5}", "port", "phys", "smi");
    for lport in 0..dev.num_ports() {
        println!(
            "{:>5} {:>5} {:>#5x}",
            lport,
            dev.physical_port(lport)?,
            dev.port_addr(lport)?
        );
    }
    let top = info.port_map.iter().copied().max().unwrap_or(0);
    let unbonded: u32 = (0..=top)
        .filter(|p| info.logical_port(*p).is_none())
        .fold(0, |acc, p| acc | 1 << p);
    if unbonded != 0 {
        print_field("unbonded physical ports", port_list(unbonded));
    }
    Ok(())
}
