//! # Vertical-blank bookkeeping
//!
//! State shared between the commit path and the interrupt handler: the frame
//! counter, notifications armed against the next end-of-frame, completed
//! notifications not yet collected and whether a modeset is still waiting
//! for its frame boundary. It lives behind a critical section and is never
//! touched while registers are being programmed.

use heapless::{Deque, Vec};

const MAX_ARMED: usize = 4;
const MAX_COMPLETED: usize = 16;

/// A completion notification requested by a transaction.
///
/// The token is chosen by the submitter and handed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Notification(pub u32);

/// A delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    /// The notification that completed.
    pub notification: Notification,
    /// Frame counter value at delivery.
    pub frame: u64,
}

/// What happened to a transaction's notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventStatus {
    /// The transaction did not ask for one.
    None,
    /// Armed against the next end-of-frame interrupt.
    Armed,
    /// Delivered right away, no end-of-frame interrupt will follow.
    Delivered,
}

#[derive(Debug)]
pub(crate) struct VblankState {
    enabled: bool,
    frame: u64,
    armed: Vec<Notification, MAX_ARMED>,
    completed: Deque<Completion, MAX_COMPLETED>,
    awaiting_frame: bool,
}

impl VblankState {
    pub(crate) const fn new() -> Self {
        Self {
            enabled: false,
            frame: 0,
            armed: Vec::new(),
            completed: Deque::new(),
            awaiting_frame: false,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn frame(&self) -> u64 {
        self.frame
    }

    pub(crate) fn awaiting_frame(&self) -> bool {
        self.awaiting_frame
    }

    /// Whether one more notification can be registered without dropping a
    /// completion. Armed notifications count, they end up in the queue.
    pub(crate) fn has_completion_room(&self) -> bool {
        self.armed.len() + self.completed.len() < MAX_COMPLETED
    }

    /// Switches end-of-frame delivery on or off. Turning it off delivers
    /// everything still armed, since no frame boundary will be signalled.
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.awaiting_frame = false;
            self.flush_armed();
        }
    }

    /// Registers a transaction's completion.
    ///
    /// `frame_expected` is false when the transaction leaves every plane
    /// without a buffer, in which case the hardware raises no end-of-frame
    /// interrupt.
    pub(crate) fn commit(
        &mut self,
        notification: Option<Notification>,
        frame_expected: bool,
        modeset: bool,
    ) -> EventStatus {
        let wait = frame_expected && self.enabled;
        self.awaiting_frame = wait && modeset;

        let Some(notification) = notification else {
            return EventStatus::None;
        };

        if wait {
            match self.armed.push(notification) {
                Ok(()) => return EventStatus::Armed,
                Err(notification) => {
                    warn!("too many armed notifications, delivering {:?} now", notification);
                    self.deliver(notification);
                }
            }
        } else {
            self.deliver(notification);
        }
        EventStatus::Delivered
    }

    /// Accounts for one end-of-frame interrupt.
    pub(crate) fn end_of_frame(&mut self) -> u64 {
        self.frame = self.frame.wrapping_add(1);
        self.awaiting_frame = false;
        self.flush_armed();
        self.frame
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completed.pop_front()
    }

    fn flush_armed(&mut self) {
        let armed = core::mem::take(&mut self.armed);
        for notification in armed {
            self.deliver(notification);
        }
    }

    fn deliver(&mut self, notification: Notification) {
        let completion = Completion {
            notification,
            frame: self.frame,
        };
        if let Err(completion) = self.completed.push_back(completion) {
            if let Some(dropped) = self.completed.pop_front() {
                warn!("completion queue full, dropping {:?}", dropped.notification);
            }
            // Cannot fail, one slot was just freed.
            let _ = self.completed.push_back(completion);
        }
    }
}
