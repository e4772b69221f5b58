// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use log::debug;

use msd::mdio::MdioIoctl;
use msd::sim::SimSwitch;
use msd::{Bsp, Channel, Device, Family, SysConfig};

mod atu;
mod common;
mod info;
mod macsec;
mod policy;
mod ptp;
mod regs;

use common::parse_val;

#[derive(Debug, Parser)]
#[command(about = "inspect and configure a Marvell-style switch")]
struct Args {
    /// Switch configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Talk to a simulated switch instead of hardware
    #[arg(long)]
    sim: bool,
    /// Family of the simulated switch
    #[arg(long, default_value = "peridot")]
    sim_family: Family,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the switch family, product and port layout
    Info,
    /// Operate on switch registers
    #[command(subcommand)]
    Reg(RegCommands),
    /// Frame policy and management destinations
    #[command(subcommand)]
    Policy(PolicyCommands),
    /// The address translation unit
    #[command(subcommand)]
    Atu(AtuCommands),
    /// PTP time and per-port timestamping
    #[command(subcommand)]
    Ptp(PtpCommands),
    /// The MACSec engine
    #[command(subcommand)]
    Macsec(MacsecCommands),
}

#[derive(Debug, Subcommand)]
pub enum RegCommands {
    /// Read a register.  <dev> is a block name (global1, global2, portN)
    /// or an SMI address; <reg> a register name or number.
    Read { dev: String, reg: String },
    /// Modify the contents of a register
    Write { dev: String, reg: String, val: String },
    /// List the named registers of a block
    List {
        #[arg(default_value = "global1")]
        dev: String,
    },
    /// Read every named register of a block
    Dump {
        #[arg(default_value = "global1")]
        dev: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommands {
    /// Show the switch-wide destinations, or one port's policy
    Show { port: Option<u8> },
    /// Set the port management frames go to ("none" disables)
    CpuDest { port: String },
    /// Set the port policy-mirrored frames go to ("none" disables)
    MirrorDest { port: String },
    /// Set the action for one frame class on a port
    Action {
        port: u8,
        key: msd::policy::FrameKey,
        action: msd::policy::Action,
    },
}

#[derive(Debug, Subcommand)]
pub enum AtuCommands {
    /// List the entries of a FID
    Dump {
        #[arg(long, default_value_t = 0)]
        fid: u16,
    },
    /// Add a static entry
    Add {
        mac: msd::atu::MacAddr,
        /// Comma-separated list of logical ports
        ports: String,
        #[arg(long, default_value_t = 0)]
        fid: u16,
        #[arg(long, default_value_t = 0)]
        priority: u8,
    },
    /// Remove an entry
    Del {
        mac: msd::atu::MacAddr,
        #[arg(long, default_value_t = 0)]
        fid: u16,
    },
    /// Flush learned entries (or all entries with --all)
    Flush {
        #[arg(long)]
        fid: Option<u16>,
        #[arg(long)]
        all: bool,
    },
    /// Move entries from one port to another
    Move {
        from: u8,
        to: u8,
        #[arg(long)]
        fid: Option<u16>,
    },
    /// Show the aging time, or set it in seconds
    Age { secs: Option<u32> },
    /// Fetch and clear the oldest violation
    Violation,
}

#[derive(Debug, Subcommand)]
pub enum PtpCommands {
    /// Capture a time array and print it
    Time {
        #[arg(default_value_t = 0)]
        array: u8,
    },
    /// Show a port's PTP configuration and timestamps
    Port { port: u8 },
    /// Set a port's mean path delay in nanoseconds
    Delay { port: u8, ns: u16 },
}

#[derive(Debug, Subcommand)]
pub enum MacsecCommands {
    /// Show the engine state and every valid record
    Status,
    /// Show the frame counters of a SecY
    Counters { secy: u8 },
}

/// The command context: one loaded switch
pub struct MsdTool {
    dev: Device,
}

impl MsdTool {
    pub fn new(config: SysConfig, sim: Option<Family>) -> Result<Self> {
        let bsp = match sim {
            Some(family) => {
                let sim = match config.channel {
                    Channel::SmiMultiChip => {
                        SimSwitch::multi_chip(family, config.base_addr)
                    }
                    _ => SimSwitch::new(family),
                };
                Bsp::smi(sim.clone()).with_rmu(sim)
            }
            None => {
                if config.channel == Channel::Rmu {
                    bail!("no RMU link is available outside the simulator");
                }
                let ifname = config
                    .interface
                    .as_deref()
                    .ok_or_else(|| anyhow!("config names no MDIO interface"))?;
                Bsp::smi(
                    MdioIoctl::open(ifname)
                        .with_context(|| format!("opening MDIO on {ifname}"))?,
                )
            }
        };
        let dev = Device::load(config, bsp).context("loading switch")?;
        Ok(MsdTool { dev })
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SysConfig> {
    let Some(path) = path else {
        return Ok(SysConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    SysConfig::from_toml(&text)
        .with_context(|| format!("parsing {}", path.display()))
}

fn cmd_read(ctx: &MsdTool, dev: &str, reg: &str) -> Result<()> {
    let addr = regs::parse_dev(&ctx.dev, dev)?;
    let reg = regs::parse_reg(dev, reg)?;
    let val = ctx.dev.get_any_reg(addr, reg)?;
    println!("{val:04x}");
    Ok(())
}

fn cmd_write(ctx: &MsdTool, dev: &str, reg: &str, val: &str) -> Result<()> {
    let addr = regs::parse_dev(&ctx.dev, dev)?;
    let reg = regs::parse_reg(dev, reg)?;
    let val = parse_val(val)?;
    let val = u16::try_from(val)
        .map_err(|_| anyhow!("{val:#x} doesn't fit in a 16-bit register"))?;
    ctx.dev.set_any_reg(addr, reg, val)?;
    Ok(())
}

fn reg_command(ctx: &MsdTool, cmd: RegCommands) -> Result<()> {
    match cmd {
        RegCommands::Read { dev, reg } => cmd_read(ctx, &dev, &reg),
        RegCommands::Write { dev, reg, val } => {
            cmd_write(ctx, &dev, &reg, &val)
        }
        RegCommands::List { dev } => regs::list(&dev),
        RegCommands::Dump { dev } => regs::dump(ctx, &dev),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .init();

    let args = Args::parse();
    let config = load_config(args.config)?;
    debug!("configuration: {config:?}");
    let ctx = MsdTool::new(config, args.sim.then_some(args.sim_family))?;

    match args.cmd {
        Commands::Info => info::show(&ctx),
        Commands::Reg(cmd) => reg_command(&ctx, cmd),
        Commands::Policy(cmd) => policy::policy_command(&ctx, cmd),
        Commands::Atu(cmd) => atu::atu_command(&ctx, cmd),
        Commands::Ptp(cmd) => ptp::ptp_command(&ctx, cmd),
        Commands::Macsec(cmd) => macsec::macsec_command(&ctx, cmd),
    }
}
