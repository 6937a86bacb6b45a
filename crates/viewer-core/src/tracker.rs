//! Current-page detection from viewport intersections.
//!
//! The tracker is deliberately separate from [`crate::LazyPage`]: pages stop
//! watching the viewport once painted, while the tracker keeps watching for
//! as long as the viewer is open.

use crate::config::ViewerConfig;
use crate::layout::Intersection;
use crate::lazy_page::Placeholder;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub page: u32,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    page: u32,
    due: Instant,
}

#[derive(Debug, Clone, Copy)]
struct JumpLock {
    target: u32,
    until: Instant,
}

#[derive(Debug)]
pub struct ViewportTracker {
    id: u64,
    threshold: f32,
    debounce: Duration,
    jump_settle: Duration,
    attached: bool,
    observed: BTreeSet<u32>,
    last_reported: Option<u32>,
    pending: Option<PendingWrite>,
    lock: Option<JumpLock>,
}

impl ViewportTracker {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
            threshold: config.visibility_threshold,
            debounce: config.debounce,
            jump_settle: config.jump_settle,
            attached: false,
            observed: BTreeSet::new(),
            last_reported: None,
            pending: None,
            lock: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn observed_pages(&self) -> usize {
        self.observed.len()
    }

    pub fn last_reported(&self) -> Option<u32> {
        self.last_reported
    }

    /// Starts watching every placeholder not already claimed by another
    /// tracker. `initial_page` is treated as already reported, so landing on
    /// it does not produce a change or a write.
    pub fn attach(&mut self, placeholders: &mut [Placeholder], initial_page: u32) -> usize {
        let mut claimed = 0;
        for placeholder in placeholders.iter_mut() {
            match placeholder.tracked_by {
                Some(owner) if owner != self.id => {
                    log::warn!("page {} already tracked by tracker {owner}", placeholder.page());
                }
                _ => {
                    placeholder.tracked_by = Some(self.id);
                    self.observed.insert(placeholder.page());
                    claimed += 1;
                }
            }
        }

        self.attached = true;
        self.last_reported = Some(initial_page);
        claimed
    }

    /// Stops all observation, releases claims and drops any pending write.
    pub fn detach(&mut self, placeholders: &mut [Placeholder]) {
        for placeholder in placeholders.iter_mut() {
            if placeholder.tracked_by == Some(self.id) {
                placeholder.tracked_by = None;
            }
        }

        self.attached = false;
        self.observed.clear();
        self.pending = None;
        self.lock = None;
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.lock.is_some_and(|lock| now < lock.until)
    }

    /// Handles one batch of visibility changes.
    pub fn observe(&mut self, batch: &[Intersection], now: Instant) -> Option<PageChange> {
        if !self.attached {
            return None;
        }
        self.release_lock_if_due(now);
        if self.lock.is_some() {
            return None;
        }

        let winner = self.winner(batch)?;
        if self.last_reported == Some(winner) {
            return None;
        }

        self.last_reported = Some(winner);
        self.pending = Some(PendingWrite { page: winner, due: now + self.debounce });
        Some(PageChange { page: winner })
    }

    /// Takes the winner of `batch` as already reported without scheduling a
    /// write. A restore scroll can land where the restored page cannot win
    /// (clamped at the end, or tied with an earlier page); that landing is not
    /// a page change.
    pub fn rebase(&mut self, batch: &[Intersection]) -> Option<u32> {
        if !self.attached {
            return None;
        }

        let winner = self.winner(batch)?;
        if self.last_reported != Some(winner) {
            log::debug!("tracker {} rebased to page {winner}", self.id);
            self.last_reported = Some(winner);
        }
        Some(winner)
    }

    fn winner(&self, batch: &[Intersection]) -> Option<u32> {
        batch
            .iter()
            .filter(|entry| self.observed.contains(&entry.page) && entry.ratio >= self.threshold)
            .fold(None::<&Intersection>, |best, entry| match best {
                Some(current)
                    if current.ratio > entry.ratio
                        || (current.ratio == entry.ratio && current.page < entry.page) =>
                {
                    Some(current)
                }
                _ => Some(entry),
            })
            .map(|entry| entry.page)
    }

    /// Suppresses reports while a programmatic scroll to `target` settles,
    /// then persists `target`.
    pub fn lock_for_jump(&mut self, target: u32, now: Instant) {
        if !self.attached {
            return;
        }

        let until = now + self.jump_settle;
        self.lock = Some(JumpLock { target, until });
        self.last_reported = Some(target);
        self.pending = Some(PendingWrite { page: target, due: until });
    }

    /// Scroll-end signal; releases the jump lock early.
    pub fn scroll_settled(&mut self, now: Instant) {
        if let Some(lock) = self.lock.take() {
            if let Some(pending) = self.pending.as_mut().filter(|p| p.page == lock.target) {
                pending.due = pending.due.min(now);
            }
        }
    }

    /// Returns the page to persist once its debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        if !self.attached {
            return None;
        }
        self.release_lock_if_due(now);

        let pending = self.pending?;
        if now < pending.due {
            return None;
        }

        self.pending = None;
        Some(pending.page)
    }

    pub fn pending_page(&self) -> Option<u32> {
        self.pending.map(|pending| pending.page)
    }

    fn release_lock_if_due(&mut self, now: Instant) {
        if self.lock.is_some_and(|lock| now >= lock.until) {
            self.lock = None;
        }
    }
}
