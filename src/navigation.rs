//! Chapter navigation queries.
//!
//! Everything here is a pure function of a chapter sequence (and, for
//! seeks, a segment stream). Chapter searches return index 0 when nothing
//! matches; index 0 always exists and is the replay's first marker, so the
//! answer is always a valid index.

use crate::chapters::{ChapterArray, ChapterType};
use crate::segment::{DataSegment, SegmentStream};

/// Pulls shorter than this are not counted by [`PullStatistics`].
pub const PULL_MIN_DURATION_MS: u32 = 30_000;

/// Time trimmed from the end of a [`PullWindow`]; seeking into the last
/// stretch before a restart lands after the restart has already happened.
pub const RESTART_DELAY_MS: u32 = 12_000;

impl ChapterArray {
    /// Returns the highest index strictly before `from` whose type is
    /// `kind`, or 0 if none.
    ///
    /// `from` itself is excluded even when it matches, so that stepping
    /// back from any chapter in a run of one type and then forward with
    /// [`ChapterArray::find_next_of_type`] returns to that chapter. Use
    /// [`ChapterArray::start_at_or_before`] for the inclusive Start lookup.
    ///
    /// Index 0 is never reported as a match; it is the sentinel.
    #[must_use]
    pub fn find_previous_of_type(&self, from: usize, kind: ChapterType) -> usize {
        let chapters = self.as_slice();
        (1..from.min(chapters.len()))
            .rev()
            .find(|&i| chapters[i].kind == kind)
            .unwrap_or(0)
    }

    /// Returns the lowest index after `from` whose type is `kind`, or 0 if none.
    #[must_use]
    pub fn find_next_of_type(&self, from: usize, kind: ChapterType) -> usize {
        let chapters = self.as_slice();
        (from.saturating_add(1)..chapters.len())
            .find(|&i| chapters[i].kind == kind)
            .unwrap_or(0)
    }

    /// Returns the second-to-last Start chapter at or before `from`.
    ///
    /// The nearest Start is skipped: when `from` is a target
    /// chapter, the result is the start of the pull before the one the
    /// target belongs to. Returns 0 if fewer than two Starts precede.
    #[must_use]
    pub fn previous_start_boundary(&self, from: usize) -> usize {
        let chapters = self.as_slice();
        let last = from.min(chapters.len() - 1);
        (1..=last)
            .rev()
            .filter(|&i| chapters[i].kind == ChapterType::Start)
            .nth(1)
            .unwrap_or(0)
    }

    /// Returns the highest index whose timestamp is at or before `ms`, or 0.
    ///
    /// Monotonic non-decreasing in `ms` because chapter timestamps are.
    #[must_use]
    pub fn chapter_containing(&self, ms: u32) -> usize {
        let chapters = self.as_slice();
        (1..chapters.len())
            .rev()
            .find(|&i| chapters[i].ms <= ms)
            .unwrap_or(0)
    }

    /// Returns the closest Start chapter at or before `index`, or 0.
    #[must_use]
    pub fn start_at_or_before(&self, index: usize) -> usize {
        match self.get(index) {
            Some(chapter) if index > 0 && chapter.kind == ChapterType::Start => index,
            _ => self.find_previous_of_type(index, ChapterType::Start),
        }
    }
}

impl<'a> SegmentStream<'a> {
    /// Scans from the start of the stream for the first segment whose
    /// timestamp is at or after `ms`, returning its offset.
    ///
    /// This is a linear scan. It runs on explicit seeks only.
    #[must_use]
    pub fn next_segment_at_or_after(&self, ms: u32) -> Option<(usize, DataSegment<'a>)> {
        self.iter().find(|(_, segment)| segment.ms >= ms)
    }
}

/// Pull counts derived from a chapter sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullStatistics {
    /// Pulls longer than [`PULL_MIN_DURATION_MS`].
    pub pulls: usize,
    /// Duration of the longest pull in milliseconds.
    pub longest_pull_ms: u32,
}

impl PullStatistics {
    /// Computes pull statistics for a replay lasting `duration_ms`.
    ///
    /// A pull runs from a Start chapter (or the Countdown directly after
    /// it) to the next Start, or to `duration_ms` for the last pull.
    #[must_use]
    pub fn compute(chapters: &ChapterArray, duration_ms: u32) -> Self {
        let list = chapters.as_slice();
        let mut stats = PullStatistics::default();

        let mut j = 0;
        while j < list.len() {
            if list[j].kind != ChapterType::Start {
                j += 1;
                continue;
            }

            let mut begin = list[j];
            if list.get(j + 1).is_some_and(|c| c.kind == ChapterType::Countdown) {
                begin = list[j + 1];
                j += 1;
            }

            let end = list[j + 1..]
                .iter()
                .find(|c| c.kind == ChapterType::Start)
                .map_or(duration_ms, |c| c.ms);

            let length = end.saturating_sub(begin.ms);
            if length > PULL_MIN_DURATION_MS {
                stats.pulls += 1;
            }
            stats.longest_pull_ms = stats.longest_pull_ms.max(length);

            j += 1;
        }

        stats
    }
}

/// The seekable span of the pull around a playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullWindow {
    /// Timestamp of the Start chapter the position belongs to.
    pub start_ms: u32,
    /// Timestamp of the next Start, or the end of the recording.
    pub end_ms: u32,
}

impl PullWindow {
    /// Computes the window around `position_ms` for a replay lasting
    /// `duration_ms`.
    #[must_use]
    pub fn around(chapters: &ChapterArray, duration_ms: u32, position_ms: u32) -> Self {
        let first_ms = chapters.first().ms;
        let current = chapters.chapter_containing(position_ms.max(first_ms));

        let start_index = chapters.start_at_or_before(current);
        let next_index = chapters.find_next_of_type(current, ChapterType::Start);

        let start_ms = chapters.get(start_index).map_or(first_ms, |c| c.ms);
        let mut end_ms = chapters.get(next_index).map_or(first_ms, |c| c.ms);
        if start_ms >= end_ms {
            end_ms = duration_ms.saturating_add(first_ms);
        }
        // A header duration can fall short of the last Start.
        end_ms = end_ms.max(start_ms);

        PullWindow { start_ms, end_ms }
    }

    /// Returns the last timestamp worth seeking to within the window.
    #[must_use]
    pub fn seekable_end_ms(&self) -> u32 {
        self.end_ms.saturating_sub(RESTART_DELAY_MS).max(self.start_ms)
    }

    /// Maps a fraction of the seekable span (0.0 to 1.0) to a timestamp.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn time_at_fraction(&self, fraction: f32) -> u32 {
        let span = self.seekable_end_ms().saturating_sub(self.start_ms);
        let offset = (span as f32 * fraction.clamp(0.0, 1.0)) as u32;
        self.start_ms + offset.min(self.end_ms.saturating_sub(self.start_ms))
    }
}
