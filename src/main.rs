//! Trace-driven simulator CLI.
//!
//! Usage: `nvsim CONFIG_FILE TRACE_FILE [CYCLES]`.
//!
//! Replays a memory access trace against the configured memory system.
//! `CYCLES` caps the run in CPU-reference cycles (scaled internally to
//! memory cycles); 0 or absent runs to the end of the trace, draining
//! whatever is still in flight. Exits 0 on normal termination, 1 on a
//! usage error or a fatal scheduling deadlock.

use clap::Parser;
use std::process;

use nvsim::config::Config;
use nvsim::error::SimError;
use nvsim::mem::request::{DeviceAddr, Request};
use nvsim::mem::system::MemorySystem;
use nvsim::trace::create_trace_reader;

#[derive(Parser, Debug)]
#[command(
    name = "nvsim",
    version,
    about = "Cycle-accurate main memory timing simulator"
)]
struct Args {
    /// Configuration file (line-oriented `key value` text).
    config: String,

    /// Memory access trace to replay.
    trace: String,

    /// Cap on CPU-reference cycles; 0 means run to trace end.
    cycles: Option<u64>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    if let Err(e) = run(&args) {
        eprintln!("[!] FATAL: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), SimError> {
    let config = Config::read(&args.config)?;
    let mut system = MemorySystem::new(&config)?;

    let ratio = system.params().cpu_cycle_ratio();
    let ignore_trace_cycle = system.params().ignore_trace_cycle;
    let reader_name = system.params().trace_reader.clone();

    print_banner(&system);

    let mut reader = create_trace_reader(&reader_name, &args.trace)?;
    let simulate_cycles = args.cycles.unwrap_or(0) * ratio;

    let mut current: u64 = 0;

    'driver: loop {
        let Some(mut access) = reader.next_access() else {
            println!("[Driver] reached end of trace");
            break;
        };

        if ignore_trace_cycle {
            access.cycle = 0;
        }

        // The rest of the trace is past the cap; ride out below.
        if simulate_cycles != 0 && access.cycle > simulate_cycles {
            break;
        }

        // Traces from inaccurate frontends may carry past cycles; those
        // issue immediately.
        while current < access.cycle {
            if simulate_cycles != 0 && current >= simulate_cycles {
                break 'driver;
            }
            step(&mut system, &mut current)?;
        }

        let addr = DeviceAddr {
            physical: access.address,
            ..DeviceAddr::default()
        };
        let mut req = Request::new(access.op, addr);
        req.data = Some(access.data);
        req.thread_id = access.thread_id;

        // Stall the frontend until the controller accepts the request.
        let mut pending = req;
        loop {
            match system.issue_command(pending) {
                Ok(()) => break,
                Err(back) => {
                    if simulate_cycles != 0 && current >= simulate_cycles {
                        break 'driver;
                    }
                    step(&mut system, &mut current)?;
                    pending = back;
                }
            }
        }
    }

    if simulate_cycles != 0 {
        while current < simulate_cycles {
            step(&mut system, &mut current)?;
        }
    } else {
        while !system.is_idle() {
            step(&mut system, &mut current)?;
        }
    }

    system.print_stats();
    println!(
        "[Driver] exiting at cycle {} (cycle cap {})",
        current, simulate_cycles
    );
    Ok(())
}

fn step(system: &mut MemorySystem, current: &mut u64) -> Result<(), SimError> {
    system.cycle(1)?;
    *current += 1;
    // The trace driver has no further use for completed requests.
    system.drain_completed();
    Ok(())
}

fn print_banner(system: &MemorySystem) {
    let p = system.params();
    println!("Memory System Configuration");
    println!("---------------------------");
    println!("  Channels:            {}", p.channels);
    println!("  Ranks:               {}", p.ranks);
    println!("  Banks:               {}", p.banks);
    println!("  Rows:                {}", p.rows);
    println!("  Cols:                {}", p.cols);
    println!("  Controller:          {}", p.controller);
    println!("  Queue size:          {}", p.queue_size);
    println!("  Starvation limit:    {}", p.starvation_threshold);
    println!("  Close page:          {:?}", p.close_page);
    println!("  Address mapping:     {}", p.address_mapping);
    println!(
        "  Refresh:             {}",
        if p.use_refresh { "enabled" } else { "disabled" }
    );
    println!("---------------------------");
}
