//! The core driver: pulls decoded operations from a core's trace and drives
//! its cache controller one operation at a time, in trace order.

use std::sync::Arc;

use crate::bus::Bus;
use crate::memory_cache::{CacheController, CoreId};
use crate::trace::{Operation, TraceReader};

/// Run one core's driver to completion: read `input_<id>.txt` and execute
/// every decoded operation against `cache`, printing the specified console
/// line for each. On EOF, or on the first input error, mark the bus's
/// per-core `finished` flag so this core's snoop responder can stop once
/// the bus also goes idle.
pub fn run(id: CoreId, bus: Arc<Bus>, cache: Arc<CacheController>) {
    match TraceReader::open(id) {
        Ok(reader) => {
            for decoded in reader {
                match decoded {
                    Ok(op) => {
                        let value = cache.execute(op);
                        print_operation(id, op, value);
                    }
                    Err(e) => {
                        eprintln!("Thread {}: {}", id, e);
                        break;
                    }
                }
            }
        }
        Err(e) => eprintln!("Thread {}: {}", id, e),
    }

    bus.mark_driver_finished(id);
}

fn print_operation(id: CoreId, op: Operation, value: u8) {
    match op {
        Operation::Load { address } => {
            println!("Thread {}: RD {}: {}", id, address, value);
        }
        Operation::Store { address, .. } => {
            println!("Thread {}: WR {}: {}", id, address, value);
        }
    }
}
