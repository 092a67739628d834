//! CLI entry point: parses the core-count argument and runs the simulator.

use std::process;

use mesi_emu::simulator;

/// Default number of cores when none is given on the command line.
const DEFAULT_NUM_CORES: usize = 2;

fn main() {
    let num_cores = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("invalid core count {:?}", arg);
                process::exit(1);
            }
        },
        None => DEFAULT_NUM_CORES,
    };

    simulator::run(num_cores);
}
