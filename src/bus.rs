//! The interconnect bus. A single-slot broadcast medium: one coherence
//! message is in flight at a time, and every non-origin core must observe it
//! before the next broadcast is accepted.
//!
//! The original C simulator this crate descends from polled a shared
//! `bus_signal` array in a tight loop to detect quiescence (and had a
//! dangling `continue` bug where the inner loop never actually waited for
//! anything). Here the same rendezvous is built on a `Mutex` plus three
//! `Condvar`s, one per distinct class of waiter.

use std::sync::{Condvar, Mutex};

use crate::memory_cache::CoreId;

/// The kind of coherence request carried by a bus message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMessageKind {
    /// A load miss: request a shared copy of the addressed line.
    BusRead,
    /// A store miss, or an upgrade from Shared: request exclusive
    /// ownership, invalidating every other copy.
    BusReadX,
}

/// A single in-flight coherence message.
#[derive(Clone, Copy, Debug)]
pub struct BusMessage {
    /// The kind of request.
    pub kind: BusMessageKind,
    /// The address the request concerns.
    pub address: u8,
    /// Which core issued the request.
    pub origin: CoreId,
}

struct Slot {
    /// The current in-flight message, if the bus is not idle.
    message: Option<BusMessage>,
    /// Per-core observation flags for `message`.
    observed: Vec<bool>,
    /// Per-core "my driver has exhausted its trace" flags, so a snoop
    /// responder knows it is safe to stop waiting once the bus also goes
    /// idle.
    finished: Vec<bool>,
}

impl Slot {
    fn quiescent(&self) -> bool {
        self.observed.iter().all(|&o| o)
    }
}

/// The bus connecting every core's cache controller and snoop responder.
/// Broadcasts are totally ordered: the bus accepts at most one message at a
/// time, and every non-origin core observes every message before the next
/// is broadcast.
pub struct Bus {
    slot: Mutex<Slot>,
    /// Signaled when the slot becomes free for a new broadcast.
    slot_free: Condvar,
    /// Signaled when a new message is installed, or a `finished` flag
    /// changes (wakes snoop responders).
    new_message: Condvar,
    /// Signaled when every non-origin core has observed the current
    /// message (wakes the broadcaster waiting in `await_quiescence`).
    became_quiescent: Condvar,
}

impl Bus {
    /// Create a bus sized for `num_cores` cores.
    pub fn new(num_cores: usize) -> Bus {
        Bus {
            slot: Mutex::new(Slot {
                message: None,
                observed: vec![true; num_cores],
                finished: vec![false; num_cores],
            }),
            slot_free: Condvar::new(),
            new_message: Condvar::new(),
            became_quiescent: Condvar::new(),
        }
    }

    /// Broadcast a coherence message. Blocks until the bus is idle, then
    /// installs the message and marks `origin` as having observed it (an
    /// issuer does not snoop its own request). Returns once the message is
    /// visible to every other core; callers that need to know the message
    /// has been fully processed should follow up with `await_quiescence`.
    pub fn broadcast(&self, kind: BusMessageKind, address: u8, origin: CoreId) {
        let mut slot = self.slot.lock().unwrap();
        while slot.message.is_some() {
            slot = self.slot_free.wait(slot).unwrap();
        }

        let num_cores = slot.observed.len();
        let mut observed = vec![false; num_cores];
        observed[origin as usize] = true;

        slot.message = Some(BusMessage {
            kind,
            address,
            origin,
        });
        slot.observed = observed;

        self.new_message.notify_all();
    }

    /// Block until every non-origin core has observed the current message,
    /// then free the slot for the next broadcast.
    pub fn await_quiescence(&self) {
        let mut slot = self.slot.lock().unwrap();
        while !slot.quiescent() {
            slot = self.became_quiescent.wait(slot).unwrap();
        }

        slot.message = None;
        self.slot_free.notify_all();
    }

    /// Block until a message this core has not yet observed appears, or
    /// until this core's driver has finished and the bus has gone idle (in
    /// which case `None` is returned and the caller should stop snooping).
    pub fn snoop(&self, core_id: CoreId) -> Option<BusMessage> {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(message) = slot.message {
                if !slot.observed[core_id as usize] {
                    return Some(message);
                }
            }

            if slot.finished[core_id as usize] && slot.message.is_none() {
                return None;
            }

            slot = self.new_message.wait(slot).unwrap();
        }
    }

    /// Acknowledge that `core_id` has processed the current message.
    pub fn ack(&self, core_id: CoreId) {
        let mut slot = self.slot.lock().unwrap();
        slot.observed[core_id as usize] = true;
        if slot.quiescent() {
            self.became_quiescent.notify_all();
        }
    }

    /// Mark that `core_id`'s driver has exhausted its trace. Wakes this
    /// core's snoop responder so it can notice once the bus is also idle.
    pub fn mark_driver_finished(&self, core_id: CoreId) {
        let mut slot = self.slot.lock().unwrap();
        slot.finished[core_id as usize] = true;
        self.new_message.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn broadcast_is_observed_by_every_other_core() {
        let bus = Bus::new(3);

        bus.broadcast(BusMessageKind::BusRead, 5, 0);

        assert!(bus.snoop(1).is_some());
        assert!(bus.snoop(2).is_some());

        bus.ack(1);
        bus.ack(2);

        bus.await_quiescence();
    }

    #[test]
    fn origin_does_not_see_its_own_broadcast() {
        let bus = Bus::new(2);
        bus.broadcast(BusMessageKind::BusReadX, 1, 0);
        // Core 0 is the origin; it was marked observed at broadcast time,
        // so only core 1 should ever be handed this message to snoop.
        let msg = bus.snoop(1);
        assert!(msg.is_some());
        bus.ack(1);
        bus.await_quiescence();
    }

    #[test]
    fn second_broadcast_waits_for_quiescence_of_the_first() {
        let bus = Arc::new(Bus::new(2));
        bus.broadcast(BusMessageKind::BusRead, 0, 0);

        let bus2 = bus.clone();
        let handle = thread::spawn(move || {
            // This broadcast must block until core 1 acks the first message
            // and the originator calls await_quiescence.
            bus2.broadcast(BusMessageKind::BusReadX, 9, 1);
        });

        thread::sleep(Duration::from_millis(20));
        let first = bus.snoop(1).unwrap();
        assert_eq!(first.address, 0);
        bus.ack(1);
        bus.await_quiescence();

        handle.join().unwrap();

        let second = bus.snoop(0).unwrap();
        assert_eq!(second.address, 9);
    }
}
