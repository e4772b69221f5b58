// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::Result;
use chrono::{DateTime, Utc};

use msd::ptp::{self, TimestampKind};

use crate::common::print_field;
use crate::{MsdTool, PtpCommands};

// The ToD seconds count from the PTP epoch, which shares 1970-01-01 with
// Unix time but runs on TAI.
fn render(secs: u64, nanos: u32) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, nanos))
        .map_or_else(|| "out of range".to_string(), |t| t.to_rfc3339())
}

fn show_time(ctx: &MsdTool, array: u8) -> Result<()> {
    let ta = ptp::capture_all(&ctx.dev, array)?;
    let global = ptp::get_global_time(&ctx.dev)?;
    print_field("global time", format!("0x{global:08x}"));
    print_field("load point", format!("0x{:08x}", ta.load_point));
    print_field("tod", format!("{}.{:09}", ta.tod_secs, ta.tod_nanos));
    print_field("tod (tai)", render(ta.tod_secs, ta.tod_nanos));
    print_field("1722 time", ta.ts_1722);
    print_field("compensation", format!("0x{:08x}", ta.compensation));
    print_field("domain", ta.domain);
    print_field("clock valid", ta.clock_valid);
    Ok(())
}

fn show_port(ctx: &MsdTool, port: u8) -> Result<()> {
    let dev = &ctx.dev;
    print_field("enabled", ptp::get_port_enable(dev, port)?);
    print_field("transport specific", ptp::get_transport_specific(dev, port)?);
    let ints = ptp::get_interrupts(dev, port)?;
    print_field("arrival interrupt", ints.arrival);
    print_field("departure interrupt", ints.departure);
    print_field("mean path delay", ptp::get_mean_path_delay(dev, port)?);
    let ingress = ptp::get_ingress_path_delay_asym(dev, port)?;
    print_field("ingress asymmetry", ingress);
    let egress = ptp::get_egress_path_delay_asym(dev, port)?;
    print_field("egress asymmetry", egress);

    println!();
    println!("{:10} {:>10} {:>6} {:12}", "SLOT", "TIME", "SEQ", "STATUS");
    for kind in [
        TimestampKind::Arrival0,
        TimestampKind::Arrival1,
        TimestampKind::Departure,
    ] {
        match ptp::get_timestamp(dev, port, kind)? {
            Some(ts) => println!(
                "{:10} {:>10x} {:>6} {:12}",
                format!("{kind:?}"),
                ts.time,
                ts.seq_id,
                format!("{:?}", ts.status)
            ),
            None => println!("{:10} {:>10}", format!("{kind:?}"), "-"),
        }
    }
    Ok(())
}

pub fn ptp_command(ctx: &MsdTool, cmd: PtpCommands) -> Result<()> {
    match cmd {
        PtpCommands::Time { array } => show_time(ctx, array),
        PtpCommands::Port { port } => show_port(ctx, port),
        PtpCommands::Delay { port, ns } => {
            Ok(ptp::set_mean_path_delay(&ctx.dev, port, ns)?)
        }
    }
}

#[test]
fn test_render() {
    assert_eq!(render(0, 0), "1970-01-01T00:00:00+00:00");
    assert_eq!(render(86_400, 500_000_000), "1970-01-02T00:00:00.500+00:00");
    assert_eq!(render(u64::MAX, 0), "out of range");
}
