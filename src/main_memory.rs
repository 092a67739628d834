//! Main memory implementation: a byte-addressable backing store shared by
//! every core, serializing fetches and stores behind a single mutex.

use std::sync::Mutex;

/// The size of main memory, in bytes.
pub const MAIN_MEMORY_SIZE: usize = 24;

/// The shared main memory. `fetch` and `store` are linearizable with
/// respect to each other: both take the same mutex.
pub struct MainMemory {
    data: Mutex<[u8; MAIN_MEMORY_SIZE]>,
}

impl MainMemory {
    /// Create a zeroed main memory.
    pub fn new() -> MainMemory {
        MainMemory {
            data: Mutex::new([0; MAIN_MEMORY_SIZE]),
        }
    }

    /// Read the byte at `addr`.
    pub fn fetch(&self, addr: u8) -> u8 {
        self.data.lock().unwrap()[addr as usize]
    }

    /// Write `val` to `addr`.
    pub fn store(&self, addr: u8, val: u8) {
        self.data.lock().unwrap()[addr as usize] = val;
    }

    /// Print the `Memory:` dump specified for the simulator's console
    /// output: a header row of byte indices, then a row of byte values.
    pub fn print_dump(&self) {
        let data = self.data.lock().unwrap();

        println!("Memory:");

        let mut header = String::new();
        for i in 0..MAIN_MEMORY_SIZE {
            header.push_str(&format!("{:02} ", i));
        }
        println!("{}", header.trim_end());

        let mut row = String::new();
        for byte in data.iter() {
            row.push_str(&format!("{:02} ", byte));
        }
        println!("{}", row.trim_end());
    }
}

impl Default for MainMemory {
    fn default() -> MainMemory {
        MainMemory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_read_returns_zero() {
        let memory = MainMemory::new();
        assert_eq!(memory.fetch(10), 0);
    }

    #[test]
    fn store_then_fetch_round_trips() {
        let memory = MainMemory::new();
        memory.store(4, 7);
        assert_eq!(memory.fetch(4), 7);
    }
}
