//! Name-to-string formatter lookup
//!
//! The formatter is called right after a well-known string literal is loaded. Find
//! the literal, then the `LEA` referencing it, then the nearest call template
//! around that reference.

use std::sync::LazyLock;

use tracing::{debug, info, warn};

use super::xref::{find_rip_reference, resolve_call};
use crate::memory::ByteView;
use crate::offset::{CallTemplate, CodeLocation};
use crate::sections::{SectionCache, SectionSnapshot};

pub const PRIMARY_LITERAL: &str = "ForwardShadingQuality_";
pub const BACKUP_LITERAL: &str = " Bone: ";

/// Bytes after the primary reference searched for a call template
pub const PRIMARY_WINDOW: usize = 0x50;
/// Bytes before the backup reference searched for a call template
pub const BACKUP_WINDOW: usize = 0xB0;

const PRIMARY_PATTERNS: [(&str, usize); 6] = [
    ("48 8D ? ? 48 8D ? ? E8", 8),
    ("48 8D ? ? ? 48 8D ? ? E8", 9),
    ("48 8D ? ? 49 8B ? E8", 7),
    ("48 8D ? ? ? 49 8B ? E8", 8),
    ("48 8D ? ? 48 8B ? E8", 7),
    ("48 8D ? ? ? 48 8B ? E8", 8),
];

const BACKUP_PATTERNS: [(&str, usize); 3] = [
    ("48 8B ? 48 8B ? ? E8", 7),
    ("48 8B ? ? 48 89 ? ? E8", 8),
    ("48 8B ? 48 89 ? ? ? E8", 8),
];

static PRIMARY_TEMPLATES: LazyLock<Vec<CallTemplate>> = LazyLock::new(|| compile(&PRIMARY_PATTERNS));
static BACKUP_TEMPLATES: LazyLock<Vec<CallTemplate>> = LazyLock::new(|| compile(&BACKUP_PATTERNS));

fn compile(patterns: &[(&str, usize)]) -> Vec<CallTemplate> {
    patterns
        .iter()
        .filter_map(|(pattern, call)| CallTemplate::new(pattern, *call).ok())
        .collect()
}

/// Locate the formatter through the primary literal, then the backup literal.
pub fn find_string_formatter(sections: &SectionCache, code_section: &str) -> Option<CodeLocation> {
    let Some(code) = sections.get(code_section) else {
        warn!("String formatter scan skipped: section {} missing", code_section);
        return None;
    };

    if let Some(lea) = literal_reference(sections, code, PRIMARY_LITERAL) {
        let end = lea.saturating_add(PRIMARY_WINDOW);
        if let Some(target) = first_call(code, &PRIMARY_TEMPLATES, lea, end) {
            return Some(located(sections, target, "primary"));
        }
        debug!("  No call template after {} reference", PRIMARY_LITERAL);
    }

    if let Some(lea) = literal_reference(sections, code, BACKUP_LITERAL) {
        let start = lea.saturating_sub(BACKUP_WINDOW);
        if let Some(target) = first_call(code, &BACKUP_TEMPLATES, start, lea) {
            warn!("String formatter found through backup literal");
            return Some(located(sections, target, "backup"));
        }
    }

    debug!("String formatter not found");
    None
}

fn literal_reference(sections: &SectionCache, code: &SectionSnapshot, literal: &str) -> Option<usize> {
    let Some(address) = sections.find_literal(literal.as_bytes()) else {
        debug!("  Literal {:?} not found", literal);
        return None;
    };
    let lea = find_rip_reference(code, address);
    if lea.is_none() {
        debug!("  Literal {:?} at 0x{:X} has no code reference", literal, address);
    }
    lea
}

/// Try each template in order; a template matches when its start lies in `start..=end`
/// and its trailing call lands inside the code section.
fn first_call(code: &SectionSnapshot, templates: &[CallTemplate], start: usize, end: usize) -> Option<u64> {
    let bytes = code.bytes();
    templates.iter().find_map(|template| {
        let pos = template.signature.find(bytes, start, end.saturating_add(1))?;
        resolve_call(code, pos + template.call_offset)
    })
}

fn located(sections: &SectionCache, target: u64, via: &str) -> CodeLocation {
    let rva = sections.rva(target).unwrap_or(target);
    info!("  String formatter ({}): RVA 0x{:X}", via, rva);
    CodeLocation {
        vtable_index: None,
        rva,
    }
}
