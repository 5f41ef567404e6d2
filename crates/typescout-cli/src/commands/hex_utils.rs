//! Hex address parsing for command arguments

use anyhow::{Result, anyhow};

/// Parse a hex value with or without a `0x` prefix
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s
        .trim()
        .strip_prefix("0x")
        .or_else(|| s.trim().strip_prefix("0X"))
        .unwrap_or(s.trim());
    u64::from_str_radix(digits, 16).map_err(|e| anyhow!("Invalid hex address '{}': {}", s, e))
}

/// Parse `ADDRESS:SIZE`, both hex
pub fn parse_region(s: &str) -> Result<(u64, usize)> {
    let (address, size) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Region '{}' must be ADDRESS:SIZE", s))?;
    let address = parse_hex_address(address)?;
    let size = usize::try_from(parse_hex_address(size)?)?;
    if size == 0 {
        return Err(anyhow!("Region '{}' is empty", s));
    }
    Ok((address, size))
}

pub fn format_hex_address(addr: u64) -> String {
    format!("0x{:X}", addr)
}
