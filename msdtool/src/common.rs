// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use anyhow::{Result, anyhow};

pub fn parse_val(v: &str) -> Result<u32> {
    if let Some(x) = v.strip_prefix("0x") {
        u32::from_str_radix(x, 16)
            .map_err(|e| anyhow!("invalid hex word: {:?}", e))
    } else {
        v.parse::<u32>()
            .map_err(|e| anyhow!("invalid value: {:?}", e))
    }
}

/// Parse a port argument, where "none" means no port.
pub fn parse_port(v: &str) -> Result<Option<u8>> {
    if v.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let p = parse_val(v)?;
    u8::try_from(p)
        .map(Some)
        .map_err(|_| anyhow!("invalid port: {p}"))
}

/// Parse a comma-separated port list into a logical port vector.
pub fn parse_port_list(v: &str) -> Result<u32> {
    let mut vec = 0u32;
    for p in v.split(',').filter(|p| !p.is_empty()) {
        let p = parse_val(p.trim())?;
        if p >= 32 {
            return Err(anyhow!("invalid port: {p}"));
        }
        vec |= 1 << p;
    }
    Ok(vec)
}

pub fn port_list(vec: u32) -> String {
    (0..32)
        .filter(|p| vec & (1 << p) != 0)
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn print_field(name: &str, val: impl std::fmt::Display) {
    println!("{:24}: {}", name, val);
}

#[test]
fn test_parse() {
    assert_eq!(parse_val("0x1b").unwrap(), 0x1b);
    assert_eq!(parse_val("27").unwrap(), 27);
    assert!(parse_val("0xzz").is_err());
    assert_eq!(parse_port("none").unwrap(), None);
    assert_eq!(parse_port("9").unwrap(), Some(9));
    assert_eq!(parse_port_list("0,3, 7").unwrap(), 0x89);
    assert_eq!(port_list(0x89), "0,3,7");
}
