//! Simulator top-level: instantiates main memory, the bus, and N cores,
//! starts them, and flushes every modified line at shutdown.

use std::sync::Arc;
use std::thread;

use crate::bus::Bus;
use crate::core_driver;
use crate::main_memory::MainMemory;
use crate::memory_cache::{CacheController, CoreId};
use crate::snoop;

/// Run the simulator with `num_cores` cores. Each core reads
/// `input_<k>.txt`, executes its trace against a shared main memory through
/// per-core MESI caches coordinated over one snoopy bus, and the simulator
/// prints a memory dump before and after the run.
pub fn run(num_cores: usize) {
    let memory = Arc::new(MainMemory::new());
    memory.print_dump();

    let bus = Arc::new(Bus::new(num_cores));

    let controllers: Vec<Arc<CacheController>> = (0..num_cores)
        .map(|id| {
            Arc::new(CacheController::new(
                id as CoreId,
                bus.clone(),
                memory.clone(),
            ))
        })
        .collect();

    let mut driver_handles = Vec::with_capacity(num_cores);
    let mut snoop_handles = Vec::with_capacity(num_cores);

    for (id, cache) in controllers.iter().enumerate() {
        let id = id as CoreId;

        let driver_bus = bus.clone();
        let driver_cache = cache.clone();
        driver_handles.push(thread::spawn(move || {
            core_driver::run(id, driver_bus, driver_cache);
        }));

        let snoop_bus = bus.clone();
        let snoop_cache = cache.clone();
        snoop_handles.push(thread::spawn(move || {
            snoop::run(id, snoop_bus, snoop_cache);
        }));
    }

    for handle in driver_handles {
        handle.join().expect("core driver thread panicked");
    }
    for handle in snoop_handles {
        handle.join().expect("snoop responder thread panicked");
    }

    for cache in &controllers {
        cache.flush();
    }

    println!();
    memory.print_dump();
}
