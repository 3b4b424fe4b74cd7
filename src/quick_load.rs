//! Quick-load: skipping uninteresting stretches on the way to a chapter.
//!
//! When the user picks a chapter, playback does not simply jump there: the
//! host needs to replay enough of the recording to rebuild the duty state.
//! The scheduler walks forward in hops instead. It plays the opening
//! section, then each intermediate wipe (with its countdown, if one follows
//! closely), and finally the whole pull that precedes the target.
//!
//! Each hop is a [`SectionRequest`]. The host plays it and keeps calling
//! [`QuickLoadScheduler::on_frame_update`]; once playback passes the end of
//! the section, the next hop is planned.

use serde::Serialize;
use tracing::debug;

use crate::chapters::{ChapterArray, ChapterType};

/// How far past an intermediate event a countdown may sit and still be
/// played as part of that event's section.
pub const COUNTDOWN_SEARCH_WINDOW: usize = 2;

/// A request to play chapters `from..to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionRequest {
    /// First chapter of the section.
    pub from: usize,
    /// Chapter at which the section ends (exclusive).
    pub to: usize,
}

impl SectionRequest {
    /// Creates a section request.
    #[must_use]
    pub const fn new(from: usize, to: usize) -> Self {
        SectionRequest { from, to }
    }
}

/// Quick-load state for one playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuickLoadScheduler {
    target: Option<usize>,
    pending_end: Option<usize>,
}

impl QuickLoadScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub const fn new() -> Self {
        QuickLoadScheduler {
            target: None,
            pending_end: None,
        }
    }

    /// Returns the chapter being quick-loaded towards.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    /// Returns the end chapter of the section currently playing.
    #[must_use]
    pub fn pending_end(&self) -> Option<usize> {
        self.pending_end
    }

    /// Returns whether a quick-load is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Abandons any quick-load in progress.
    pub fn reset(&mut self) {
        self.target = None;
        self.pending_end = None;
    }

    /// Starts quick-loading towards `chapter`.
    ///
    /// Does nothing unless `enabled`, `chapter` is past the first chapter,
    /// and the replay has at least two chapters. Any quick-load already in
    /// progress is replaced.
    pub fn on_chapter_changed(
        &mut self,
        chapters: &ChapterArray,
        chapter: usize,
        enabled: bool,
    ) -> Option<SectionRequest> {
        if !enabled || chapter == 0 || chapters.len() < 2 || chapter >= chapters.len() {
            return None;
        }

        self.target = Some(chapter);
        self.pending_end = None;
        Some(self.plan(chapters))
    }

    /// Plans the next hop once playback reaches the end of the pending
    /// section.
    ///
    /// A no-op while no quick-load is in progress or the pending section
    /// is still playing, so calling it more than once per frame is harmless.
    pub fn on_frame_update(
        &mut self,
        chapters: &ChapterArray,
        position_ms: u32,
    ) -> Option<SectionRequest> {
        self.target?;
        let end = chapters.get(self.pending_end?)?;
        if end.ms > position_ms {
            return None;
        }
        Some(self.plan(chapters))
    }

    fn plan(&mut self, chapters: &ChapterArray) -> SectionRequest {
        let target = self.target.unwrap_or(0);

        let request = match self.pending_end {
            None => SectionRequest::new(0, 1),
            Some(pending) => {
                let event = chapters.find_next_of_type(pending, ChapterType::Event);
                if event != 0 && event + 1 < target {
                    let countdown = chapters.find_next_of_type(event, ChapterType::Countdown);
                    let end = if countdown == 0 || countdown > event + COUNTDOWN_SEARCH_WINDOW {
                        event + 1
                    } else {
                        countdown
                    };
                    SectionRequest::new(event, end)
                } else {
                    SectionRequest::new(chapters.previous_start_boundary(target), target)
                }
            }
        };

        debug!(
            from = request.from,
            to = request.to,
            target,
            "quick-load section"
        );

        self.pending_end = Some(request.to);
        if request.to >= target {
            self.reset();
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::Chapter;

    fn long_duty() -> ChapterArray {
        use ChapterType::*;
        ChapterArray::new(vec![
            Chapter::new(Barrier, 0, 0),          // 0
            Chapter::new(Start, 10_000, 100),     // 1
            Chapter::new(Countdown, 12_000, 200), // 2
            Chapter::new(Event, 70_000, 300),     // 3
            Chapter::new(Start, 90_000, 400),     // 4
            Chapter::new(Countdown, 95_000, 500), // 5
            Chapter::new(Event, 150_000, 600),    // 6
            Chapter::new(Start, 170_000, 700),    // 7
            Chapter::new(Event, 240_000, 800),    // 8
        ])
        .unwrap()
    }

    #[test]
    fn test_first_hop_is_opening_section() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();

        let request = scheduler.on_chapter_changed(&chapters, 8, true);
        assert_eq!(request, Some(SectionRequest::new(0, 1)));
        assert_eq!(scheduler.target(), Some(8));
        assert_eq!(scheduler.pending_end(), Some(1));
    }

    #[test]
    fn test_full_hop_sequence() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();
        scheduler.on_chapter_changed(&chapters, 8, true);

        // Opening section still playing.
        assert_eq!(scheduler.on_frame_update(&chapters, 5_000), None);

        // First wipe, with the countdown two chapters later.
        assert_eq!(
            scheduler.on_frame_update(&chapters, 10_000),
            Some(SectionRequest::new(3, 5))
        );
        assert_eq!(scheduler.on_frame_update(&chapters, 80_000), None);

        // Second wipe has no countdown after it; play just the event.
        assert_eq!(
            scheduler.on_frame_update(&chapters, 95_000),
            Some(SectionRequest::new(6, 7))
        );
        assert!(scheduler.is_active());

        // No event left before the target: play the preceding pull and stop.
        assert_eq!(
            scheduler.on_frame_update(&chapters, 170_000),
            Some(SectionRequest::new(4, 8))
        );
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.on_frame_update(&chapters, 300_000), None);
    }

    #[test]
    fn test_frame_update_is_idempotent_before_section_end() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();
        scheduler.on_chapter_changed(&chapters, 8, true);

        let before = scheduler;
        for _ in 0..3 {
            assert_eq!(scheduler.on_frame_update(&chapters, 9_999), None);
        }
        assert_eq!(scheduler, before);
    }

    #[test]
    fn test_target_one_finishes_immediately() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();
        assert_eq!(
            scheduler.on_chapter_changed(&chapters, 1, true),
            Some(SectionRequest::new(0, 1))
        );
        assert!(!scheduler.is_active());
    }

    #[test]
    fn test_ignored_chapter_changes() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();

        assert_eq!(scheduler.on_chapter_changed(&chapters, 5, false), None);
        assert_eq!(scheduler.on_chapter_changed(&chapters, 0, true), None);
        assert_eq!(scheduler.on_chapter_changed(&chapters, 99, true), None);

        let single = ChapterArray::new(vec![Chapter::new(ChapterType::Start, 0, 0)]).unwrap();
        assert_eq!(scheduler.on_chapter_changed(&single, 1, true), None);
        assert!(!scheduler.is_active());
    }

    #[test]
    fn test_new_target_replaces_old() {
        let chapters = long_duty();
        let mut scheduler = QuickLoadScheduler::new();
        scheduler.on_chapter_changed(&chapters, 8, true);
        scheduler.on_frame_update(&chapters, 10_000);

        let request = scheduler.on_chapter_changed(&chapters, 4, true);
        assert_eq!(request, Some(SectionRequest::new(0, 1)));
        assert_eq!(scheduler.target(), Some(4));
    }

    #[test]
    fn test_event_next_to_target_is_not_a_hop() {
        use ChapterType::*;
        let chapters = ChapterArray::new(vec![
            Chapter::new(Start, 0, 0),
            Chapter::new(Countdown, 1_000, 10),
            Chapter::new(Event, 50_000, 20),
            Chapter::new(Start, 60_000, 30),
        ])
        .unwrap();
        let mut scheduler = QuickLoadScheduler::new();
        scheduler.on_chapter_changed(&chapters, 3, true);

        // Event 2 is directly before target 3, so go straight to the pull.
        assert_eq!(
            scheduler.on_frame_update(&chapters, 1_000),
            Some(SectionRequest::new(0, 3))
        );
        assert!(!scheduler.is_active());
    }
}
