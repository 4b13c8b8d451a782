use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::types::{SyncRequest, TargetApp};

/// Outcome of offering a request to the [`DedupeWindow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// First request for the target in this window. The caller schedules a
    /// dispatch and redeems the ticket with [`DedupeWindow::take`].
    Admit(Ticket),
    /// An admitted request had not been sent yet; this request replaced it.
    Coalesce { superseded: SyncRequest },
    /// A trigger for the target is in flight or finished inside the window;
    /// this request is dropped.
    Supersede {
        request: SyncRequest,
        dispatched: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub target: TargetApp,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    /// Last admission or dispatch completion, whichever is later.
    admitted_at: Instant,
    touched_at: Instant,
    pending: Option<SyncRequest>,
    dispatched: Option<String>,
    /// Set between [`DedupeWindow::take`] and [`DedupeWindow::complete`].
    dispatching: bool,
    generation: u64,
}

/// Per-target debounce state.
///
/// All decisions happen under one lock that is never held across an await, so
/// two concurrent offers for the same target can never both be admitted.
pub struct DedupeWindow {
    debounce: Duration,
    idle_ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<TargetApp, Slot>>,
}

impl DedupeWindow {
    pub fn new(debounce: Duration, idle_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            debounce,
            idle_ttl: idle_ttl.max(debounce),
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn offer(&self, request: SyncRequest) -> GateDecision {
        let now = self.clock.now();
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.get_mut(&request.target) {
            slot.touched_at = now;

            if let Some(pending) = slot.pending.as_mut() {
                let superseded = std::mem::replace(pending, request);
                return GateDecision::Coalesce { superseded };
            }
            if slot.dispatching
                || now.saturating_duration_since(slot.admitted_at) < self.debounce
            {
                return GateDecision::Supersede {
                    request,
                    dispatched: slot.dispatched.clone(),
                };
            }

            slot.generation += 1;
            slot.admitted_at = now;
            let ticket = Ticket {
                target: request.target.clone(),
                generation: slot.generation,
            };
            slot.pending = Some(request);
            return GateDecision::Admit(ticket);
        }

        let ticket = Ticket {
            target: request.target.clone(),
            generation: 1,
        };
        slots.insert(
            request.target.clone(),
            Slot {
                admitted_at: now,
                touched_at: now,
                pending: Some(request),
                dispatched: None,
                dispatching: false,
                generation: 1,
            },
        );
        GateDecision::Admit(ticket)
    }

    /// Claims the newest request behind `ticket` and marks the target busy
    /// until [`DedupeWindow::complete`] is called for the same ticket.
    ///
    /// Returns `None` if the ticket was already redeemed.
    pub fn take(&self, ticket: &Ticket) -> Option<SyncRequest> {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&ticket.target)?;
        if slot.generation != ticket.generation {
            return None;
        }

        let request = slot.pending.take()?;
        slot.admitted_at = now;
        slot.touched_at = now;
        slot.dispatched = Some(request.delivery_id.clone());
        slot.dispatching = true;
        Some(request)
    }

    /// Ends the dispatch started by `take` and restarts the debounce window
    /// from now.
    pub fn complete(&self, ticket: &Ticket) {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&ticket.target)
            && slot.generation == ticket.generation
        {
            slot.dispatching = false;
            slot.admitted_at = now;
            slot.touched_at = now;
        }
    }

    /// Drops entries that are idle past the TTL and outside their debounce window.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.pending.is_some()
                || slot.dispatching
                || now.saturating_duration_since(slot.touched_at) < self.idle_ttl
                || now.saturating_duration_since(slot.admitted_at) < self.debounce
        });
        before - slots.len()
    }

    /// Number of targets with debounce state.
    pub fn tracked_targets(&self) -> usize {
        self.slots.lock().len()
    }
}
