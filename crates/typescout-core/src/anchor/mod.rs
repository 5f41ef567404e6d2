//! Root anchor locators
//!
//! The object array and the name pool are found by scanning a writable data section
//! for a header whose pointed-to memory has the expected shape. The world pointer is
//! found afterwards by scanning for references to a known world record.

pub mod name_pool;
pub mod object_array;
pub mod world;

use crate::sections::{SectionCache, SectionSnapshot};

/// `preferred` first, then the remaining sections in header order
pub(crate) fn sections_in_order<'c>(
    sections: &'c SectionCache,
    preferred: &'c str,
) -> impl Iterator<Item = &'c SectionSnapshot> + 'c {
    sections
        .get(preferred)
        .into_iter()
        .chain(sections.iter().filter(move |s| s.name != preferred))
}
