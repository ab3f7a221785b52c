//! Admission control: bounded active slots plus a FIFO wait queue

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::state::SessionId;

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub session: SessionId,
    pub enqueued_at: DateTime<Utc>,
}

/// Tracks `activeCount` and the wait queue
#[derive(Debug)]
pub struct AdmissionQueue {
    max_active: usize,
    active: usize,
    waiting: VecDeque<QueueEntry>,
}

impl AdmissionQueue {
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active,
            active: 0,
            waiting: VecDeque::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn queue_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.active < self.max_active
    }

    /// Take an active slot if one is free
    pub fn try_start_now(&mut self) -> bool {
        if !self.has_capacity() {
            return false;
        }
        self.active += 1;
        true
    }

    /// Append to the wait queue; returns the 1-based position
    pub fn enqueue(&mut self, session: SessionId) -> usize {
        self.waiting.push_back(QueueEntry {
            session,
            enqueued_at: Utc::now(),
        });
        self.waiting.len()
    }

    /// Pop the oldest waiter into a free slot
    pub fn promote_next(&mut self) -> Option<SessionId> {
        if !self.has_capacity() {
            return None;
        }
        let entry = self.waiting.pop_front()?;
        self.active += 1;
        Some(entry.session)
    }

    /// Give back a slot taken by `try_start_now` or `promote_next`
    pub fn release_active(&mut self) {
        debug_assert!(self.active > 0, "released more slots than were taken");
        self.active = self.active.saturating_sub(1);
    }

    /// Drop a waiter that left before promotion
    pub fn remove_queued(&mut self, session: SessionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|entry| entry.session != session);
        self.waiting.len() != before
    }

    /// 1-based queue position
    pub fn position(&self, session: SessionId) -> Option<usize> {
        self.waiting
            .iter()
            .position(|entry| entry.session == session)
            .map(|index| index + 1)
    }

    /// Waiters in queue order
    pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
        self.waiting.iter()
    }
}
