//! Memory cache implementation: a per-core direct-mapped cache driven
//! through the MESI state machine by local operations and remote bus
//! traffic.

use std::sync::{Arc, Mutex};

use crate::bus::{Bus, BusMessage, BusMessageKind};
use crate::main_memory::MainMemory;
use crate::trace::Operation;

/// The number of lines a cache can hold. Direct-mapped: address `a` always
/// lives at index `a % NUM_CACHE_LINES`.
pub const NUM_CACHE_LINES: usize = 2;

/// The id of a core (and of its cache controller / snoop responder pair).
pub type CoreId = u8;

/// The current MESI state of a cache line.
///
/// Descriptions of individual states quoted [from
/// Wikipedia](https://en.wikipedia.org/wiki/MESI_protocol).
///
/// <pre>
///   M E S I
/// M ✗ ✗ ✗ ✓
/// E ✗ ✗ ✗ ✓
/// S ✗ ✗ ✓ ✓
/// I ✓ ✓ ✓ ✓
/// </pre>
///
/// The baseline protocol implemented here never installs a line as
/// Exclusive: every fetch is treated as though some other core might also
/// be reading it, collapsing it straight to Shared (an MSI protocol with E
/// reserved). `Exclusive`'s snoop and store transitions are still
/// implemented below, should a future controller want to promote a solo
/// fetch to it when no snooper answers the BusRead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MesiState {
    /// Present only in this cache, and dirty: must be written back before
    /// any other core may read the address.
    Modified,
    /// Present only in this cache, and clean.
    Exclusive,
    /// May also be present in other caches; clean.
    Shared,
    /// Unused; tag and value are meaningless.
    Invalid,
}

/// A cache line: a tag/value pair and its MESI state. `tag` and `value` are
/// only meaningful when `state != Invalid`.
#[derive(Clone, Copy, Debug)]
struct CacheLine {
    tag: u8,
    value: u8,
    state: MesiState,
}

impl CacheLine {
    const INVALID: CacheLine = CacheLine {
        tag: 0,
        value: 0,
        state: MesiState::Invalid,
    };

    fn matches(&self, address: u8) -> bool {
        self.state != MesiState::Invalid && self.tag == address
    }
}

fn index_for(address: u8) -> usize {
    address as usize % NUM_CACHE_LINES
}

type Lines = [CacheLine; NUM_CACHE_LINES];

/// A core's cache controller: owns the `NUM_CACHE_LINES` direct-mapped
/// lines, and is shared between this core's driver thread (local
/// operations, via `execute`) and its snoop responder thread (remote bus
/// traffic, via `handle_snoop`). The two access paths are serialized by
/// `lines`'s mutex, which is the concrete form of the "local cache mutual
/// exclusion" the simulator's concurrency model requires between a core's
/// two threads.
pub struct CacheController {
    id: CoreId,
    bus: Arc<Bus>,
    memory: Arc<MainMemory>,
    lines: Mutex<Lines>,
}

impl CacheController {
    /// Create a cache controller for core `id`, all lines initially
    /// Invalid.
    pub fn new(id: CoreId, bus: Arc<Bus>, memory: Arc<MainMemory>) -> CacheController {
        CacheController {
            id,
            bus,
            memory,
            lines: Mutex::new([CacheLine::INVALID; NUM_CACHE_LINES]),
        }
    }

    /// This controller's core id.
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// The MESI state this core currently holds `address` in: `Invalid` if
    /// the line at `address`'s index either doesn't hold `address`'s tag or
    /// was never installed. Exposed for tests that check the coherence
    /// invariant across cores; not used by the coherence engine itself.
    pub fn state_of(&self, address: u8) -> MesiState {
        let lines = self.lines.lock().unwrap();
        let line = &lines[index_for(address)];
        if line.matches(address) {
            line.state
        } else {
            MesiState::Invalid
        }
    }

    /// Whether any line in this cache is currently Modified. Exposed for
    /// tests that check writeback completeness after shutdown.
    pub fn has_modified_line(&self) -> bool {
        let lines = self.lines.lock().unwrap();
        lines.iter().any(|line| line.state == MesiState::Modified)
    }

    /// Execute one decoded operation against this core's cache, issuing
    /// whatever bus traffic the MESI state machine requires, and return the
    /// value to report for it (the byte read, for a load; the byte stored,
    /// for a store).
    pub fn execute(&self, op: Operation) -> u8 {
        match op {
            Operation::Load { address } => self.load(address),
            Operation::Store { address, value } => self.store(address, value),
        }
    }

    fn load(&self, address: u8) -> u8 {
        let index = index_for(address);

        {
            let lines = self.lines.lock().unwrap();
            if lines[index].matches(address) {
                return lines[index].value;
            }
        }

        {
            let mut lines = self.lines.lock().unwrap();
            self.evict_if_conflicting(&mut lines, index, address);
        }

        self.bus.broadcast(BusMessageKind::BusRead, address, self.id);
        self.bus.await_quiescence();
        let value = self.memory.fetch(address);

        let mut lines = self.lines.lock().unwrap();
        lines[index] = CacheLine {
            tag: address,
            value,
            state: MesiState::Shared,
        };
        value
    }

    fn store(&self, address: u8, value: u8) -> u8 {
        let index = index_for(address);

        {
            let mut lines = self.lines.lock().unwrap();
            if lines[index].matches(address) {
                match lines[index].state {
                    MesiState::Modified | MesiState::Exclusive => {
                        lines[index].state = MesiState::Modified;
                        lines[index].value = value;
                        return value;
                    }
                    MesiState::Shared => {
                        // A store hitting a Shared line must invalidate
                        // every other copy via BusReadX before becoming
                        // Modified.
                        drop(lines);
                        self.bus
                            .broadcast(BusMessageKind::BusReadX, address, self.id);
                        self.bus.await_quiescence();

                        let mut lines = self.lines.lock().unwrap();
                        lines[index].state = MesiState::Modified;
                        lines[index].value = value;
                        return value;
                    }
                    MesiState::Invalid => unreachable!("matches() implies state != Invalid"),
                }
            }

            self.evict_if_conflicting(&mut lines, index, address);
        }

        self.bus
            .broadcast(BusMessageKind::BusReadX, address, self.id);
        self.bus.await_quiescence();
        // A store miss still fetches the current memory value before
        // overwriting it, matching the specified miss-handling sequence,
        // even though the fetched byte is replaced immediately below.
        let _ = self.memory.fetch(address);

        let mut lines = self.lines.lock().unwrap();
        lines[index] = CacheLine {
            tag: address,
            value,
            state: MesiState::Modified,
        };
        value
    }

    /// If the line at `index` holds a tag other than `address`, copy back
    /// its value when dirty and invalidate it: the conflict-miss path.
    /// No-op if the line already matches `address`.
    fn evict_if_conflicting(&self, lines: &mut Lines, index: usize, address: u8) {
        if lines[index].matches(address) {
            return;
        }
        if lines[index].state == MesiState::Modified {
            self.memory.store(lines[index].tag, lines[index].value);
        }
        lines[index] = CacheLine::INVALID;
    }

    /// Process one bus message as this core's snoop responder: update the
    /// local line in lockstep with the protocol if it holds the addressed
    /// tag, then acknowledge observation.
    pub fn handle_snoop(&self, message: BusMessage) {
        debug_assert_ne!(
            message.origin, self.id,
            "a core never snoops its own broadcast"
        );

        let index = index_for(message.address);
        {
            let mut lines = self.lines.lock().unwrap();
            if lines[index].matches(message.address) {
                lines[index].state = match (lines[index].state, message.kind) {
                    (MesiState::Modified, BusMessageKind::BusRead) => {
                        self.memory.store(message.address, lines[index].value);
                        MesiState::Shared
                    }
                    (MesiState::Modified, BusMessageKind::BusReadX) => {
                        self.memory.store(message.address, lines[index].value);
                        MesiState::Invalid
                    }
                    (MesiState::Shared, BusMessageKind::BusRead) => MesiState::Shared,
                    (MesiState::Shared, BusMessageKind::BusReadX) => MesiState::Invalid,
                    (MesiState::Exclusive, BusMessageKind::BusRead) => MesiState::Shared,
                    (MesiState::Exclusive, BusMessageKind::BusReadX) => MesiState::Invalid,
                    (MesiState::Invalid, _) => unreachable!("matches() implies state != Invalid"),
                };
            }
        }

        self.bus.ack(self.id);
    }

    /// Write back any line left in Modified state. Called once at
    /// simulator shutdown, after every driver and snoop thread has joined.
    pub fn flush(&self) {
        let mut lines = self.lines.lock().unwrap();
        for line in lines.iter_mut() {
            if line.state == MesiState::Modified {
                self.memory.store(line.tag, line.value);
                line.state = MesiState::Invalid;
            }
        }
    }
}
