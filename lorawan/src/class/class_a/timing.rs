//! Deadline queue driving the receive windows and deferred transmissions
//!
//! The MAC never sleeps on its own. Every future action is stored here with
//! its deadline and the owner of the MAC calls `handle_timers` once the
//! earliest deadline has passed.

use core::time::Duration;

use heapless::Vec;

/// Handle to a scheduled timer, used to cancel it or to ask whether it is
/// still pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(u32);

/// Action to run when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// Open the first receive window
    OpenRx1,
    /// Close the first receive window
    CloseRx1,
    /// Open the second receive window
    OpenRx2,
    /// Close the second receive window
    CloseRx2,
    /// Run a postponed transmission
    Transmit,
}

/// Timer that has reached its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    /// Handle the timer was scheduled with
    pub id: TimerId,
    /// Time the timer was due, not the time it was noticed
    pub deadline: Duration,
    /// Action to run
    pub event: TimerEvent,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Duration,
    seq: u32,
    event: TimerEvent,
}

/// Bounded timer queue
///
/// Timers sharing a deadline fire in the order they were scheduled.
#[derive(Debug)]
pub struct Scheduler<const N: usize> {
    entries: Vec<Entry, N>,
    next_seq: u32,
}

impl<const N: usize> Default for Scheduler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Scheduler<N> {
    /// Empty queue
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedule `event` at `deadline`, `None` when the queue is full
    pub fn schedule(&mut self, deadline: Duration, event: TimerEvent) -> Option<TimerId> {
        let seq = self.next_seq;
        self.entries
            .push(Entry {
                deadline,
                seq,
                event,
            })
            .ok()?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Some(TimerId(seq))
    }

    /// Drop a timer, returns whether it was still pending
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the timer has neither fired nor been cancelled
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.position(id).is_some()
    }

    /// Deadline of a pending timer
    pub fn deadline(&self, id: TimerId) -> Option<Duration> {
        self.position(id).map(|index| self.entries[index].deadline)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }

    /// Remove and return the earliest timer due at `now`
    pub fn pop_due(&mut self, now: Duration) -> Option<Expired> {
        let (index, entry) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.deadline <= now)
            .min_by_key(|(_, entry)| (entry.deadline, entry.seq))
            .map(|(index, entry)| (index, *entry))?;
        self.entries.swap_remove(index);
        Some(Expired {
            id: TimerId(entry.seq),
            deadline: entry.deadline,
            event: entry.event,
        })
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timer is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: TimerId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.seq == id.0)
    }
}
