//! Property layout of one struct or class after a discovery run

use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use tracing::info;
use typescout_core::{DiscoveryConfig, DiscoverySession, PropertyLayout, capture_sections};

use super::hex_utils::format_hex_address;
use crate::target::Target;

pub fn run(target: &Target, name: &str, config: DiscoveryConfig) -> Result<()> {
    let sections = capture_sections(target, target.module_base, target.module_size)?;
    let mut session = DiscoverySession::new(target, sections, config);
    let report = session.run()?;
    if !report.usable {
        bail!("Offset table is not usable; run `discover` for details");
    }

    let Some(record) = session
        .find_object(name, "Class")
        .or_else(|| session.find_struct(name))
    else {
        bail!("No class or struct named {}", name);
    };
    info!("{} at {}", name, format_hex_address(record));

    let layout = session.property_layout(record);
    println!("{} ({} properties)", name.bold(), layout.len());
    for property in &layout {
        println!("  {}", layout_line(property));
    }
    Ok(())
}

fn layout_line(property: &PropertyLayout) -> String {
    let offset = property
        .offset
        .map_or_else(|| "-".to_string(), |o| format!("0x{:04X}", o));
    let size = property
        .size
        .map_or_else(|| "-".to_string(), |s| format!("0x{:X}", s));
    format!(
        "{:<8} {:<6} {:<36} {}",
        offset, size, property.type_name, property.name
    )
}
