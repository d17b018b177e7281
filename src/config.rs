//! Configuration loading and parameter resolution.
//!
//! Configuration files are line-oriented `key value` text. Comment lines
//! start with `;` or `#`, blank lines are ignored, and everything after
//! the first whitespace on a line is the value. The raw store is kept in
//! `Config`; the core consumes a typed, validated snapshot in `Params`.

use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

use crate::error::SimError;

/// Raw key to value store populated once from a config file.
#[derive(Debug, Default, Clone)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Reads and parses a config file from disk.
    pub fn read(path: &str) -> Result<Config, SimError> {
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("could not read '{}': {}", path, e)))?;
        Config::parse(&text)
    }

    /// Parses config text. Later occurrences of a key override earlier ones.
    pub fn parse(text: &str) -> Result<Config, SimError> {
        let mut values = HashMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            match line.split_once(char::is_whitespace) {
                Some((key, value)) => {
                    values.insert(key.to_string(), value.trim().to_string());
                }
                None => {
                    return Err(SimError::Config(format!(
                        "malformed config line '{}': expected 'key value'",
                        line
                    )));
                }
            }
        }

        Ok(Config { values })
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Returns the value of an integer key, or `default` when absent.
    pub fn get_value(&self, key: &str, default: u64) -> Result<u64, SimError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.parse::<u64>().map_err(|_| {
                SimError::Config(format!("key '{}' has non-numeric value '{}'", key, v))
            }),
        }
    }

    /// Returns the value of an integer key, failing when absent.
    pub fn get_required(&self, key: &str) -> Result<u64, SimError> {
        match self.values.get(key) {
            None => Err(SimError::Config(format!("missing required key '{}'", key))),
            Some(v) => v.parse::<u64>().map_err(|_| {
                SimError::Config(format!("key '{}' has non-numeric value '{}'", key, v))
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, SimError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(SimError::Config(format!(
                    "key '{}' must be a boolean but was '{}'",
                    key, other
                ))),
            },
        }
    }

    /// Hook names listed under the `Hooks` key, whitespace separated.
    pub fn hooks(&self) -> Vec<String> {
        self.values
            .get("Hooks")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Row-buffer management policy after a column operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePagePolicy {
    /// Leave the row open.
    Open,
    /// Close the row when no more queued requests target it.
    Relaxed,
    /// Always close; every column op carries an implicit precharge.
    Restricted,
}

/// Command-queue scan order across (rank, bank) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleScheme {
    /// Always scan from (0, 0).
    Fixed,
    /// Round-robin advancing the rank index first.
    RankFirst,
    /// Round-robin advancing the bank index first.
    BankFirst,
}

/// Typed, validated snapshot of every key the core consumes.
///
/// Constructed once at setup and shared read-only by all components.
#[derive(Debug, Clone)]
pub struct Params {
    pub ranks: u64,
    pub banks: u64,
    pub rows: u64,
    pub cols: u64,
    pub channels: u64,
    pub line_size: u64,

    pub cpu_freq: u64,
    pub clk: u64,

    pub t_rcd: u64,
    pub t_rp: u64,
    pub t_ras: u64,
    pub t_rc: u64,
    pub t_cas: u64,
    pub t_ccd: u64,
    pub t_burst: u64,
    pub t_cwd: u64,
    pub t_wr: u64,
    pub t_rtp: u64,
    pub t_wtr: u64,
    pub t_rfc: u64,
    pub t_rfi: u64,
    pub t_rrdr: u64,
    pub t_rrdw: u64,
    pub t_faw: u64,
    pub al: u64,

    pub use_refresh: bool,
    pub refresh_rows: u64,
    pub banks_per_refresh: u64,
    pub delayed_refresh_threshold: u64,

    pub queue_size: usize,
    pub starvation_threshold: u32,
    pub close_page: ClosePagePolicy,
    pub schedule_scheme: ScheduleScheme,
    pub address_mapping: String,
    pub controller: String,
    pub trace_reader: String,
    pub ignore_trace_cycle: bool,

    pub mat_width: u64,
    pub mat_height: u64,

    pub endurance_model: String,
    pub write_limit: u64,
}

impl Params {
    /// Resolves and validates all parameters from the raw store.
    ///
    /// Topology keys (RANKS, BANKS, ROWS, COLS, CHANNELS) are required;
    /// everything else carries a default. Nonsensical combinations abort
    /// here rather than surfacing as mid-simulation surprises.
    pub fn from_config(config: &Config) -> Result<Params, SimError> {
        let ranks = config.get_required("RANKS")?;
        let banks = config.get_required("BANKS")?;
        let rows = config.get_required("ROWS")?;
        let cols = config.get_required("COLS")?;
        let channels = config.get_required("CHANNELS")?;

        for (name, v) in [
            ("RANKS", ranks),
            ("BANKS", banks),
            ("ROWS", rows),
            ("COLS", cols),
            ("CHANNELS", channels),
        ] {
            if v == 0 {
                return Err(SimError::Config(format!("{} must be non-zero", name)));
            }
        }

        let banks_per_refresh = config.get_value("BanksPerRefresh", banks)?;
        let use_refresh = config.get_bool("UseRefresh", true)?;

        if use_refresh {
            if banks_per_refresh == 0 {
                return Err(SimError::Config("BanksPerRefresh must be non-zero".into()));
            }
            if banks_per_refresh > banks {
                return Err(SimError::Config(format!(
                    "BanksPerRefresh ({}) exceeds BANKS ({})",
                    banks_per_refresh, banks
                )));
            }
            if banks % banks_per_refresh != 0 {
                return Err(SimError::Config(format!(
                    "BanksPerRefresh ({}) must divide BANKS ({})",
                    banks_per_refresh, banks
                )));
            }
        }

        let refresh_rows = config.get_value("RefreshRows", 4)?;
        if use_refresh && (refresh_rows == 0 || refresh_rows > rows) {
            return Err(SimError::Config(format!(
                "RefreshRows ({}) must be in 1..=ROWS ({})",
                refresh_rows, rows
            )));
        }

        let t_rfi = config.get_value("tRFI", 42_666_666)?;
        if use_refresh && t_rfi / (rows / refresh_rows) == 0 {
            return Err(SimError::Config(format!(
                "tRFI ({}) is too small for {} refreshes per retention window",
                t_rfi,
                rows / refresh_rows
            )));
        }

        let close_page = match config.get_value("ClosePage", 0)? {
            0 => ClosePagePolicy::Open,
            1 => ClosePagePolicy::Relaxed,
            2 => ClosePagePolicy::Restricted,
            other => {
                return Err(SimError::Config(format!(
                    "ClosePage must be 0, 1, or 2 but was {}",
                    other
                )))
            }
        };

        let schedule_scheme = match config.get_value("ScheduleScheme", 1)? {
            0 => ScheduleScheme::Fixed,
            1 => ScheduleScheme::RankFirst,
            2 => ScheduleScheme::BankFirst,
            other => {
                return Err(SimError::Config(format!(
                    "ScheduleScheme must be 0, 1, or 2 but was {}",
                    other
                )))
            }
        };

        let queue_size = config.get_value("QueueSize", 32)? as usize;
        if queue_size == 0 {
            return Err(SimError::Config("QueueSize must be non-zero".into()));
        }

        let clk = config.get_value("CLK", 666)?;
        let cpu_freq = config.get_value("CPUFreq", 2000)?;
        if clk == 0 {
            return Err(SimError::Config("CLK must be non-zero".into()));
        }

        let mat_height = config.get_value("MATHeight", rows)?;
        let mat_width = config.get_value("MATWidth", cols)?;
        if mat_height == 0 || mat_width == 0 {
            return Err(SimError::Config(
                "MATHeight and MATWidth must be non-zero".into(),
            ));
        }

        Ok(Params {
            ranks,
            banks,
            rows,
            cols,
            channels,
            line_size: config.get_value("LineSize", 64)?,
            cpu_freq,
            clk,
            t_rcd: config.get_value("tRCD", 10)?,
            t_rp: config.get_value("tRP", 10)?,
            t_ras: config.get_value("tRAS", 24)?,
            t_rc: config.get_value("tRC", 34)?,
            t_cas: config.get_value("tCAS", 10)?,
            t_ccd: config.get_value("tCCD", 4)?,
            t_burst: config.get_value("tBURST", 4)?,
            t_cwd: config.get_value("tCWD", 7)?,
            t_wr: config.get_value("tWR", 10)?,
            t_rtp: config.get_value("tRTP", 5)?,
            t_wtr: config.get_value("tWTR", 5)?,
            t_rfc: config.get_value("tRFC", 100)?,
            t_rfi,
            t_rrdr: config.get_value("tRRDR", 5)?,
            t_rrdw: config.get_value("tRRDW", 5)?,
            t_faw: config.get_value("tFAW", 20)?,
            al: config.get_value("AL", 0)?,
            use_refresh,
            refresh_rows,
            banks_per_refresh,
            delayed_refresh_threshold: config.get_value("DelayedRefreshThreshold", 1)?,
            queue_size,
            starvation_threshold: config.get_value("StarvationThreshold", 4)? as u32,
            close_page,
            schedule_scheme,
            address_mapping: config
                .get_string("AddressMappingScheme")
                .unwrap_or("R:RK:BK:CH:C")
                .to_string(),
            controller: config.get_string("MEM_CTL").unwrap_or("FRFCFS").to_string(),
            trace_reader: config
                .get_string("TraceReader")
                .unwrap_or("Standard")
                .to_string(),
            ignore_trace_cycle: config.get_bool("IgnoreTraceCycle", false)?,
            mat_width,
            mat_height,
            endurance_model: config
                .get_string("EnduranceModel")
                .unwrap_or("None")
                .to_string(),
            write_limit: config.get_value("WriteLimit", u64::MAX)?,
        })
    }

    /// Number of bank groups refreshed together.
    pub fn refresh_groups(&self) -> u64 {
        self.banks / self.banks_per_refresh
    }

    /// Memory cycles per CPU reference cycle, rounded up.
    pub fn cpu_cycle_ratio(&self) -> u64 {
        self.cpu_freq.div_ceil(self.clk)
    }
}

/// Shared read-only handle to the resolved parameters.
pub type SharedParams = Rc<Params>;
