use anyhow::Result;
use owo_colors::OwoColorize;
use typescout_core::capture_sections;

use crate::target::Target;

/// List the module's sections
pub fn run(target: &Target) -> Result<()> {
    let sections = capture_sections(target, target.module_base, target.module_size)?;

    println!(
        "Module 0x{:X} (0x{:X} bytes, {}), {} sections",
        sections.module_base(),
        sections.module_size(),
        target.describe(),
        sections.len()
    );
    println!();
    println!("  {:<10} {:>18} {:>10} {:>12}", "Name", "Address", "RVA", "Size");
    for section in sections.iter() {
        println!(
            "  {:<10} {:>18} {:>10} {:>12}",
            section.name.bold(),
            format!("0x{:X}", section.address),
            format!("0x{:X}", section.address - sections.module_base()),
            format!("0x{:X}", section.size())
        );
    }
    Ok(())
}
