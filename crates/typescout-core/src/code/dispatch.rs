//! Event dispatch routine lookup
//!
//! The dispatcher is a virtual method on every object. It tests the function flags
//! field against the native bit and the net bit, so both `test [reg+flags], imm32`
//! encodings must appear near the start of the candidate.

use tracing::{debug, info};

use crate::memory::ReadMemory;
use crate::memory::layout::function_flags::{DISPATCH_CHECK_NATIVE, DISPATCH_CHECK_NET};
use crate::memory::validate::is_plausible_ptr;
use crate::memory::ByteView;
use crate::offset::{CodeLocation, Signature};
use crate::sections::SectionSnapshot;

/// Virtual table slots inspected
pub const MAX_VTABLE_SLOTS: u32 = 200;
/// Bytes from the routine start searched for the native-bit test
pub const NATIVE_CHECK_WINDOW: usize = 0x400;
/// Bytes from the routine start searched for the net-bit test
pub const NET_CHECK_WINDOW: usize = 0xF00;

/// `test dword ptr [reg+flags_offset], imm32`
pub fn flag_test_signature(flags_offset: i32, imm: u32) -> Signature {
    let disp = (flags_offset as u32).to_le_bytes();
    let mut bytes = vec![Some(0xF7), None, Some(disp[0]), Some(disp[1]), Some(0), Some(0)];
    bytes.extend(imm.to_le_bytes().into_iter().map(Some));
    Signature::from_bytes(bytes)
}

/// Walk the virtual table at `vtable` looking for the event dispatcher.
///
/// Stops at the first slot that is not a plausible pointer; slots outside the code
/// section are skipped.
pub fn find_event_dispatch<R: ReadMemory + ?Sized>(
    reader: &R,
    code: &SectionSnapshot,
    module_base: u64,
    vtable: u64,
    flags_offset: i32,
) -> Option<CodeLocation> {
    let native = flag_test_signature(flags_offset, DISPATCH_CHECK_NATIVE);
    let net = flag_test_signature(flags_offset, DISPATCH_CHECK_NET);
    debug!("  Dispatch patterns: [{}] [{}]", native, net);

    for index in 0..MAX_VTABLE_SLOTS {
        let Ok(slot) = reader.read_ptr(vtable + index as u64 * 8) else {
            break;
        };
        if !is_plausible_ptr(slot) {
            break;
        }
        let Some(start) = code.offset_of(slot) else {
            continue;
        };

        if contains_within(code.bytes(), start, NATIVE_CHECK_WINDOW, &native)
            && contains_within(code.bytes(), start, NET_CHECK_WINDOW, &net)
        {
            let rva = slot - module_base;
            info!("  Event dispatch: vtable[{}] RVA 0x{:X}", index, rva);
            return Some(CodeLocation {
                vtable_index: Some(index),
                rva,
            });
        }
    }
    None
}

/// Does `signature` occur entirely inside `code[start..start + len]`?
fn contains_within(code: &[u8], start: usize, len: usize, signature: &Signature) -> bool {
    let end = start.saturating_add(len).min(code.len());
    code.get(start..end)
        .is_some_and(|window| signature.find(window, 0, window.len()).is_some())
}
