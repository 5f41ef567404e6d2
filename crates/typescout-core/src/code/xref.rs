//! Relative displacement helpers for x64 code

use crate::memory::ByteView;
use crate::sections::SectionSnapshot;

/// Length of `LEA r64, [rip+disp32]`
const RIP_LEA_LEN: usize = 7;
/// Length of `CALL rel32`
const CALL_LEN: usize = 5;
const CALL_OPCODE: u8 = 0xE8;

/// Resolve a rel32 operand to an absolute address inside `section`.
///
/// `instr_off` is the instruction's offset in the section, `disp_off` the
/// displacement's offset inside the instruction. Targets outside the section are
/// rejected.
pub fn resolve_relative(
    section: &SectionSnapshot,
    instr_off: usize,
    disp_off: usize,
    instr_len: usize,
) -> Option<u64> {
    let disp = section.i32_at(instr_off.checked_add(disp_off)?)?;
    let next_ip = section.address_of(instr_off.checked_add(instr_len)?);
    let target = next_ip.wrapping_add_signed(disp as i64);
    section.contains(target).then_some(target)
}

/// Resolve the `E8 rel32` at `call_off`
pub fn resolve_call(section: &SectionSnapshot, call_off: usize) -> Option<u64> {
    if section.bytes().get(call_off) != Some(&CALL_OPCODE) {
        return None;
    }
    resolve_relative(section, call_off, 1, CALL_LEN)
}

/// First RIP-relative `LEA` (REX.W or REX.WR) in `section` that resolves to `target`
pub fn find_rip_reference(section: &SectionSnapshot, target: u64) -> Option<usize> {
    let code = section.bytes();
    if code.len() < RIP_LEA_LEN {
        return None;
    }

    (0..=code.len() - RIP_LEA_LEN).find(|&pos| {
        let rex = code[pos];
        if (rex != 0x48 && rex != 0x4C) || code[pos + 1] != 0x8D {
            return false;
        }
        // mod=00, rm=101
        if code[pos + 2] & 0xC7 != 0x05 {
            return false;
        }
        let Some(disp) = code.i32_at(pos + 3) else {
            return false;
        };
        let next_ip = section.address_of(pos + RIP_LEA_LEN);
        next_ip.wrapping_add_signed(disp as i64) == target
    })
}
