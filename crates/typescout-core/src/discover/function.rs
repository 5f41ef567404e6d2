//! Function records: flags and native entry point

use tracing::debug;

use super::agreement::{first_agreeing, window_after};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::memory::layout::function_flags::{NATIVE, PUBLIC};
use crate::memory::validate::{align_up, is_plausible_ptr};
use crate::offset::FieldId;
use crate::session::DiscoverySession;

const FLAGS_WINDOW: i32 = 0x80;
const EXEC_WINDOW: i32 = 0x20;

const VALID_WEIGHT: usize = 3;
const NATIVE_WEIGHT: usize = 5;
const PUBLIC_WEIGHT: usize = 2;

/// Tally of flag bits observed at one candidate offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FlagScore {
    pub offset: i32,
    pub valid: usize,
    pub native: usize,
    pub public: usize,
}

impl FlagScore {
    pub(crate) fn tally(offset: i32, values: impl IntoIterator<Item = u32>) -> Self {
        let mut score = Self {
            offset,
            ..Self::default()
        };
        for value in values {
            if value & 0xFFFF != 0 {
                score.valid += 1;
            }
            if value & NATIVE != 0 {
                score.native += 1;
            }
            if value & PUBLIC != 0 {
                score.public += 1;
            }
        }
        score
    }

    pub(crate) fn weight(&self) -> usize {
        VALID_WEIGHT * self.valid + NATIVE_WEIGHT * self.native + PUBLIC_WEIGHT * self.public
    }
}

/// Highest-weighted candidate whose valid ratio passes `threshold` and which shows
/// at least one native or public bit. Ties keep the earlier offset.
pub(crate) fn best_flag_score(
    scores: &[FlagScore],
    total: usize,
    threshold: super::Threshold,
) -> Option<FlagScore> {
    scores
        .iter()
        .filter(|s| threshold.accepts(s.valid, total) && (s.native > 0 || s.public > 0))
        .fold(None, |best: Option<FlagScore>, s| match best {
            Some(b) if b.weight() >= s.weight() => Some(b),
            _ => Some(*s),
        })
}

impl<'a, R: ReadMemory + ?Sized> DiscoverySession<'a, R> {
    pub(crate) fn discover_function_flags(&mut self) -> Result<()> {
        let size = self.table.require(FieldId::FunctionFlags, FieldId::StructSize)?;
        self.table.require(FieldId::FunctionFlags, FieldId::ObjectClass)?;
        let limits = &self.config.samples;
        let samples = self
            .objects()?
            .sample(limits.function_records, limits.function_scan, |a| {
                self.is_instance_of(a, &["Function"])
            })
            .require(FieldId::FunctionFlags, limits.function_minimum)?;

        let scores: Vec<FlagScore> = window_after(size + 4, FLAGS_WINDOW, 4)
            .map(|off| {
                FlagScore::tally(
                    off,
                    samples.iter().filter_map(|s| self.read_u32_at(s.address, off)),
                )
            })
            .collect();

        let best = best_flag_score(&scores, samples.len(), self.config.thresholds.function_flags)
            .ok_or_else(|| Error::not_found(FieldId::FunctionFlags, "no flag field scored"))?;
        debug!(
            "  Flags at 0x{:X}: valid {} native {} public {} (score {})",
            best.offset,
            best.valid,
            best.native,
            best.public,
            best.weight()
        );

        self.table.set(FieldId::FunctionFlags, best.offset);
        Ok(())
    }

    pub(crate) fn discover_function_exec(&mut self) -> Result<()> {
        let flags = self.table.require(FieldId::FunctionExec, FieldId::FunctionFlags)?;
        let limits = &self.config.samples;
        let samples = self
            .objects()?
            .sample(limits.native_records, limits.function_scan, |a| {
                self.is_instance_of(a, &["Function"])
                    && self.read_u32_at(a, flags).is_some_and(|f| f & NATIVE != 0)
            })
            .require(FieldId::FunctionExec, limits.native_minimum)?;

        let found = first_agreeing(
            window_after(align_up(flags + 4, 8), EXEC_WINDOW, 8),
            samples.as_slice(),
            self.config.thresholds.function_exec,
            |s, off| self.read_u64_at(s.address, off).is_some_and(is_plausible_ptr),
        )
        .ok_or_else(|| Error::not_found(FieldId::FunctionExec, "no entry point agreement"))?;

        debug!("  Native entry agreement {}/{}", found.hits, found.total);
        self.table.set(FieldId::FunctionExec, found.offset);
        Ok(())
    }
}
