//! Simulation statistics reporting.
//!
//! Every component prints its counters as `i<interval>.<component>.<metric>
//! <value>` lines on stdout, where the interval index counts how many
//! times stats have been printed. Latency averages are kept as integer
//! sums and sample counts and only divided here, so long runs do not
//! accumulate floating-point error.

use std::fmt::Display;

/// Emits one stat line.
pub fn stat(interval: u64, component: &str, metric: &str, value: impl Display) {
    println!("i{}.{}.{} {}", interval, component, metric, value);
}

/// Emits an average from an integer sum and sample count.
pub fn stat_average(interval: u64, component: &str, metric: &str, sum: u64, samples: u64) {
    let avg = if samples == 0 {
        0.0
    } else {
        sum as f64 / samples as f64
    };
    println!("i{}.{}.{} {}", interval, component, metric, avg);
}
