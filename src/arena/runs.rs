//! Free-run table - sorted, coalesced list of free page ranges
//!
//! Design: A flat `Vec` scanned linearly. A cache of few, large, similarly-sized
//! buffers keeps the run count small, so a scan beats a tree here. The table is
//! only reached through `take`/`give`/`stats`, so the representation can change
//! (ordered map keyed by length, interval tree) without touching the arena.
//!
//! Invariants, checked by [`FreeRunTable::check_invariants`]:
//! 1. runs sorted ascending by `start`
//! 2. runs do not overlap
//! 3. no two runs touch (adjacent runs are merged)
//! 4. no empty runs
//! 5. every page lies in `[0, num_pages)`

use std::collections::TryReserveError;

use thiserror::Error;

use crate::error::ArenaError;

#[cfg(test)]
thread_local! {
    /// Makes `try_new` fail on this thread
    pub(crate) static FAIL_TABLE_STORAGE: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}

#[cfg(test)]
fn storage_failure_injected() -> bool {
    FAIL_TABLE_STORAGE.with(|fail| fail.get())
}

#[cfg(not(test))]
#[inline(always)]
const fn storage_failure_injected() -> bool {
    false
}

/// Contiguous range of free pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRun {
    /// First free page
    pub start: u32,
    /// Number of free pages
    pub length: u32,
}

impl FreeRun {
    /// One past the last page of the run
    #[inline]
    pub const fn end(&self) -> u32 {
        // start + length <= num_pages <= u32::MAX
        self.start + self.length
    }
}

/// Broken free-run table invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunInvariant {
    #[error("run {index} is empty")]
    Empty { index: usize },
    #[error("run {index} ends past page {num_pages}")]
    OutOfBounds { index: usize, num_pages: u32 },
    #[error("run {index} is not after run {}", .index - 1)]
    Unordered { index: usize },
    #[error("run {index} overlaps run {}", .index - 1)]
    Overlapping { index: usize },
    #[error("run {index} touches run {} and should have been merged", .index - 1)]
    Uncoalesced { index: usize },
}

/// Ordered table of free runs over `num_pages` pages
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FreeRunTable {
    runs: Vec<FreeRun>,
    num_pages: u32,
}

impl FreeRunTable {
    const INITIAL_CAPACITY: usize = 16;

    /// Table with every page free
    pub fn new(num_pages: u32) -> Self {
        let mut runs = Vec::with_capacity(Self::INITIAL_CAPACITY);
        if num_pages > 0 {
            runs.push(FreeRun {
                start: 0,
                length: num_pages,
            });
        }
        Self { runs, num_pages }
    }

    /// Like [`FreeRunTable::new`], reporting allocation failure instead of aborting
    pub fn try_new(num_pages: u32) -> Result<Self, TryReserveError> {
        let mut runs = Vec::new();
        if storage_failure_injected() {
            runs.try_reserve(usize::MAX)?;
        }
        runs.try_reserve(Self::INITIAL_CAPACITY)?;
        if num_pages > 0 {
            runs.push(FreeRun {
                start: 0,
                length: num_pages,
            });
        }
        Ok(Self { runs, num_pages })
    }

    /// Remove `pages` pages using best fit, returning the first page
    ///
    /// Picks the shortest run that can hold the request; on equal lengths the
    /// first one found wins. Pages come off the front of the run, so the run
    /// keeps its place in the ordering.
    pub fn take(&mut self, pages: u32) -> Option<u32> {
        if pages == 0 {
            return None;
        }

        let index = self.best_fit(pages)?;
        let run = &mut self.runs[index];
        let first = run.start;

        run.start += pages;
        run.length -= pages;
        if run.length == 0 {
            self.runs.remove(index);
        }

        self.debug_check();
        Some(first)
    }

    fn best_fit(&self, pages: u32) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;

        for (index, run) in self.runs.iter().enumerate() {
            if run.length < pages {
                continue;
            }
            if best.map_or(true, |(_, length)| run.length < length) {
                best = Some((index, run.length));
                if run.length == pages {
                    break; // exact fit
                }
            }
        }

        best.map(|(index, _)| index)
    }

    /// Return `[start, start + pages)` to the table
    ///
    /// Rejects, without modifying the table, ranges past the last page and
    /// ranges overlapping a run that is already free (double free).
    pub fn give(&mut self, start: u32, pages: u32) -> Result<(), ArenaError> {
        if pages == 0 {
            return Ok(());
        }

        let end = match start.checked_add(pages) {
            Some(end) if end <= self.num_pages => end,
            _ => {
                return Err(ArenaError::RangeOutOfBounds {
                    first: start,
                    pages,
                    num_pages: self.num_pages,
                })
            }
        };

        let index = self.runs.partition_point(|run| run.start < start);

        let overlap = |run: &FreeRun| ArenaError::Overlap {
            first: start,
            pages,
            run_start: run.start,
            run_len: run.length,
        };
        if index > 0 {
            let prev = &self.runs[index - 1];
            if prev.end() > start {
                return Err(overlap(prev));
            }
        }
        if let Some(next) = self.runs.get(index) {
            if end > next.start {
                return Err(overlap(next));
            }
        }

        let joins_prev = index > 0 && self.runs[index - 1].end() == start;
        let joins_next = self.runs.get(index).map_or(false, |next| next.start == end);

        match (joins_prev, joins_next) {
            (true, true) => {
                let next_len = self.runs[index].length;
                self.runs[index - 1].length += pages + next_len;
                self.runs.remove(index);
            }
            (true, false) => self.runs[index - 1].length += pages,
            (false, true) => {
                let next = &mut self.runs[index];
                next.start = start;
                next.length += pages;
            }
            (false, false) => self.runs.insert(index, FreeRun { start, length: pages }),
        }

        self.debug_check();
        Ok(())
    }

    /// `(total_free_pages, largest_free_run_pages)`
    pub fn stats(&self) -> (u32, u32) {
        self.runs.iter().fold((0, 0), |(total, largest), run| {
            (total + run.length, largest.max(run.length))
        })
    }

    #[inline]
    pub fn runs(&self) -> &[FreeRun] {
        &self.runs
    }

    /// Number of free runs (fragmentation)
    #[inline]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// True when no page is free
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    #[inline]
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Verify all table invariants, reporting the first violation
    pub fn check_invariants(&self) -> Result<(), RunInvariant> {
        for (index, run) in self.runs.iter().enumerate() {
            if run.length == 0 {
                return Err(RunInvariant::Empty { index });
            }
            if run.start.checked_add(run.length).map_or(true, |end| end > self.num_pages) {
                return Err(RunInvariant::OutOfBounds {
                    index,
                    num_pages: self.num_pages,
                });
            }
            if index == 0 {
                continue;
            }

            let prev = &self.runs[index - 1];
            if run.start <= prev.start {
                return Err(RunInvariant::Unordered { index });
            }
            if prev.end() > run.start {
                return Err(RunInvariant::Overlapping { index });
            }
            if prev.end() == run.start {
                return Err(RunInvariant::Uncoalesced { index });
            }
        }
        Ok(())
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert_eq!(self.check_invariants(), Ok(()), "free-run table corrupted: {:?}", self.runs);
    }

    #[cfg(test)]
    pub(crate) fn from_runs(num_pages: u32, runs: Vec<FreeRun>) -> Self {
        Self { runs, num_pages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(start: u32, length: u32) -> FreeRun {
        FreeRun { start, length }
    }

    #[test]
    fn starts_fully_free() {
        let table = FreeRunTable::new(16);
        assert_eq!(table.runs(), &[run(0, 16)]);
        assert_eq!(table.stats(), (16, 16));
    }

    #[test]
    fn take_consumes_from_front() {
        let mut table = FreeRunTable::new(16);
        assert_eq!(table.take(2), Some(0));
        assert_eq!(table.runs(), &[run(2, 14)]);
        assert_eq!(table.take(14), Some(2));
        assert!(table.is_empty());
        assert_eq!(table.take(1), None);
    }

    #[test]
    fn best_fit_prefers_smallest_sufficient_run() {
        let mut table = FreeRunTable::from_runs(32, vec![run(0, 8), run(10, 3), run(20, 5)]);
        assert_eq!(table.take(3), Some(10));
        assert_eq!(table.runs(), &[run(0, 8), run(20, 5)]);

        assert_eq!(table.take(4), Some(20));
        assert_eq!(table.runs(), &[run(0, 8), run(24, 1)]);
    }

    #[test]
    fn best_fit_ties_go_to_first_found() {
        let mut table = FreeRunTable::from_runs(32, vec![run(0, 4), run(10, 4), run(20, 4)]);
        assert_eq!(table.take(2), Some(0));
        assert_eq!(table.runs(), &[run(2, 2), run(10, 4), run(20, 4)]);
    }

    #[test]
    fn exact_fit_after_smaller_runs() {
        let mut table = FreeRunTable::from_runs(32, vec![run(0, 1), run(5, 6), run(15, 3), run(25, 3)]);
        assert_eq!(table.take(3), Some(15));
        assert_eq!(table.runs(), &[run(0, 1), run(5, 6), run(25, 3)]);
    }

    #[test]
    fn give_coalesces_both_sides() {
        let mut table = FreeRunTable::from_runs(16, vec![run(0, 2), run(5, 11)]);
        table.give(2, 3).unwrap();
        assert_eq!(table.runs(), &[run(0, 16)]);
    }

    #[test]
    fn give_coalesces_one_side() {
        let mut table = FreeRunTable::from_runs(16, vec![run(0, 2), run(10, 2)]);
        table.give(2, 1).unwrap();
        assert_eq!(table.runs(), &[run(0, 3), run(10, 2)]);

        table.give(8, 2).unwrap();
        assert_eq!(table.runs(), &[run(0, 3), run(8, 4)]);
    }

    #[test]
    fn give_inserts_isolated_run_in_order() {
        let mut table = FreeRunTable::from_runs(16, vec![run(0, 1), run(12, 4)]);
        table.give(5, 2).unwrap();
        assert_eq!(table.runs(), &[run(0, 1), run(5, 2), run(12, 4)]);

        let mut empty = FreeRunTable::from_runs(16, vec![]);
        empty.give(3, 1).unwrap();
        assert_eq!(empty.runs(), &[run(3, 1)]);
    }

    #[test]
    fn give_rejects_overlap_without_mutation() {
        let mut table = FreeRunTable::from_runs(16, vec![run(0, 4), run(8, 4)]);
        let before = table.clone();

        for (start, pages) in [(3, 1), (2, 4), (6, 3), (8, 1), (9, 7), (0, 16)] {
            let err = table.give(start, pages).unwrap_err();
            assert!(matches!(err, ArenaError::Overlap { .. }), "{start}+{pages}: {err}");
            assert_eq!(table, before);
        }
    }

    #[test]
    fn give_rejects_out_of_bounds() {
        let mut table = FreeRunTable::from_runs(16, vec![run(0, 4)]);
        assert!(matches!(table.give(15, 2), Err(ArenaError::RangeOutOfBounds { .. })));
        assert!(matches!(table.give(u32::MAX, 2), Err(ArenaError::RangeOutOfBounds { .. })));
        assert_eq!(table.runs(), &[run(0, 4)]);
    }

    #[test]
    fn stats_sum_and_max() {
        let table = FreeRunTable::from_runs(32, vec![run(0, 3), run(5, 7), run(20, 2)]);
        assert_eq!(table.stats(), (12, 7));
        assert_eq!(FreeRunTable::from_runs(8, vec![]).stats(), (0, 0));
    }

    #[test]
    fn invariant_checker_flags_each_violation() {
        let check = |runs| FreeRunTable::from_runs(16, runs).check_invariants();

        assert_eq!(check(vec![run(0, 2), run(4, 2)]), Ok(()));
        assert_eq!(check(vec![run(0, 0)]), Err(RunInvariant::Empty { index: 0 }));
        assert_eq!(
            check(vec![run(10, 7)]),
            Err(RunInvariant::OutOfBounds { index: 0, num_pages: 16 })
        );
        assert_eq!(check(vec![run(8, 1), run(2, 1)]), Err(RunInvariant::Unordered { index: 1 }));
        assert_eq!(check(vec![run(0, 4), run(3, 1)]), Err(RunInvariant::Overlapping { index: 1 }));
        assert_eq!(check(vec![run(0, 4), run(4, 1)]), Err(RunInvariant::Uncoalesced { index: 1 }));
    }
}
