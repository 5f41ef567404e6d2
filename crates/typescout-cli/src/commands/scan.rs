//! Signature search over one module section

use anyhow::Result;
use owo_colors::OwoColorize;
use typescout_core::memory::ByteView;
use typescout_core::{SectionSnapshot, Signature, capture_sections};

use crate::target::Target;

pub fn run(target: &Target, pattern: &str, section: &str, limit: usize) -> Result<()> {
    let signature = Signature::parse(pattern)?;
    let sections = capture_sections(target, target.module_base, target.module_size)?;
    let snapshot = sections.require(section)?;

    let hits = find_matches(snapshot, &signature);
    println!(
        "Pattern {} in {} ({} matches)",
        signature.to_string().cyan(),
        section,
        hits.len()
    );
    println!();

    for &address in hits.iter().take(limit) {
        let rva = address - sections.module_base();
        println!("  0x{:X}  (rva 0x{:X})", address, rva);
    }
    if hits.len() > limit {
        println!("  ... {} more", (hits.len() - limit).dimmed());
    }
    Ok(())
}

/// Absolute addresses of every match inside the section
pub fn find_matches(section: &SectionSnapshot, signature: &Signature) -> Vec<u64> {
    signature
        .find_all(section.bytes(), 0, section.size())
        .into_iter()
        .map(|offset| section.address_of(offset))
        .collect()
}
