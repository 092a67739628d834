//! The snoop responder: a per-core thread that observes every bus
//! transaction not initiated by its own core and keeps the local cache in
//! lockstep with the protocol.

use std::sync::Arc;

use crate::bus::Bus;
use crate::memory_cache::{CacheController, CoreId};

/// Run one core's snoop responder until its driver has finished and the bus
/// has gone idle.
pub fn run(id: CoreId, bus: Arc<Bus>, cache: Arc<CacheController>) {
    while let Some(message) = bus.snoop(id) {
        cache.handle_snoop(message);
    }
}
