//! Agreement scoring shared by the discoverers
//!
//! A candidate offset is scored by how many sampled records satisfy a predicate when
//! read at that offset. Acceptance is strict: the hit ratio must exceed the threshold.

use serde::{Deserialize, Serialize};

/// Percentage a candidate's hit ratio must strictly exceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(u32);

impl Threshold {
    pub const fn percent(value: u32) -> Self {
        Self(if value > 100 { 100 } else { value })
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn accepts(self, hits: usize, total: usize) -> bool {
        total > 0 && hits * 100 > total * self.0 as usize
    }
}

/// Score of one candidate offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agreement {
    pub offset: i32,
    pub hits: usize,
    pub total: usize,
}

impl Agreement {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

/// Count samples satisfying `predicate` at `offset`
pub fn score<T, F>(samples: &[T], offset: i32, predicate: F) -> Agreement
where
    F: Fn(&T, i32) -> bool,
{
    let hits = samples.iter().filter(|s| predicate(s, offset)).count();
    Agreement {
        offset,
        hits,
        total: samples.len(),
    }
}

/// First candidate (in the given order) whose agreement passes `threshold`
pub fn first_agreeing<T, I, F>(
    candidates: I,
    samples: &[T],
    threshold: Threshold,
    predicate: F,
) -> Option<Agreement>
where
    I: IntoIterator<Item = i32>,
    F: Fn(&T, i32) -> bool,
{
    candidates
        .into_iter()
        .map(|offset| score(samples, offset, &predicate))
        .find(|a| threshold.accepts(a.hits, a.total))
}

/// Inclusive stepped window `start..=end`
pub fn window(start: i32, end: i32, step: i32) -> impl Iterator<Item = i32> {
    (start..=end).step_by(step.max(1) as usize)
}

/// Inclusive window of `len` bytes after `start`
pub fn window_after(start: i32, len: i32, step: i32) -> impl Iterator<Item = i32> {
    window(start, start + len, step)
}
