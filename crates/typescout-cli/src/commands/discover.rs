//! Full discovery run against the selected target

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::{info, warn};
use typescout_core::{
    DiscoveryConfig, DiscoveryReport, DiscoverySession, OffsetReport, OffsetTable, StageOutcome,
    StageStatus, capture_sections,
};

use super::hex_utils::format_hex_address;
use crate::target::Target;

pub fn run(target: &Target, config: DiscoveryConfig, output: Option<&Path>) -> Result<()> {
    info!("Discovering against {}", target.describe());
    let sections = capture_sections(target, target.module_base, target.module_size)?;
    info!("Captured {} sections", sections.len());

    let mut session = DiscoverySession::new(target, sections, config);
    let report = session.run()?;

    print_stages(&report);
    print_anchors(&report.table);
    print_fields(&report.table);

    if report.usable {
        println!("\n{}", "Offset table is usable".green());
    } else {
        println!("\n{}", "Offset table is NOT usable".red().bold());
    }

    if let Some(path) = output {
        let export = OffsetReport::from_discovery(&report, target.module_base, target);
        export.save(path)?;
        info!("Report saved to {}", path.display());
    }

    let failed = report.failed().count();
    if failed > 0 {
        warn!("{} stage(s) failed", failed);
    }
    Ok(())
}

fn print_stages(report: &DiscoveryReport) {
    println!("Stages:");
    for outcome in &report.stages {
        let line = stage_line(outcome);
        match outcome.status {
            StageStatus::Done => println!("  {}", line.green()),
            StageStatus::Failed(_) => println!("  {}", line.red()),
            StageStatus::Skipped(_) => println!("  {}", line.dimmed()),
        }
    }
    println!();
}

fn stage_line(outcome: &StageOutcome) -> String {
    match &outcome.status {
        StageStatus::Done => format!("{:<28} done", outcome.name),
        StageStatus::Failed(reason) => format!("{:<28} failed: {}", outcome.name, reason),
        StageStatus::Skipped(reason) => format!("{:<28} skipped: {}", outcome.name, reason),
    }
}

fn print_anchors(table: &OffsetTable) {
    println!("Anchors:");
    match table.object_array {
        Some(objects) => println!(
            "  object array   {} ({}, stride 0x{:X})",
            format_hex_address(objects.address),
            objects.layout,
            objects.stride
        ),
        None => println!("  object array   {}", "not found".red()),
    }
    match table.name_pool {
        Some(pool) => println!(
            "  name pool      {} ({})",
            format_hex_address(pool.address),
            pool.layout
        ),
        None => println!("  name pool      {}", "not found".red()),
    }
    println!("  world          {}", optional_address(table.world));
    println!(
        "  dispatch       {}",
        optional_address(table.event_dispatch.map(|l| l.rva))
    );
    println!(
        "  formatter      {}",
        optional_address(table.string_formatter.map(|l| l.rva))
    );
    println!("  precision      {}", table.precision);
    println!();
}

fn optional_address(address: Option<u64>) -> String {
    address.map_or_else(|| "-".to_string(), format_hex_address)
}

fn print_fields(table: &OffsetTable) {
    println!(
        "Fields ({} discovered, descriptors {}):",
        table.discovered_count(),
        if table.field_descriptors { "on" } else { "off" }
    );
    for (field, offset) in table.iter() {
        if table.is_set(field) {
            println!("  {:<36} 0x{:X}", field.to_string(), offset);
        } else {
            println!("  {:<36} {}", field.to_string(), "-".dimmed());
        }
    }
}
