//! Integration tests for configuration parsing and validation.

use std::io::Write;

use nvsim::config::{ClosePagePolicy, Config, Params, ScheduleScheme};

const MINIMAL: &str = "RANKS 1\nBANKS 2\nROWS 1024\nCOLS 64\nCHANNELS 1\n";

/// Tests parsing of comments, blank lines, and key overrides.
#[test]
fn test_config_parse_basics() {
    let text = "\
; semicolon comment
# hash comment

RANKS 2
tRCD 12
tRCD 14
";
    let config = Config::parse(text).unwrap();
    assert!(config.key_exists("RANKS"));
    assert_eq!(config.get_value("RANKS", 0).unwrap(), 2);
    // Later occurrences win.
    assert_eq!(config.get_value("tRCD", 0).unwrap(), 14);
    assert!(!config.key_exists("tRP"));
}

/// Tests reading a config file from disk.
#[test]
fn test_config_read_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}tRAS 20\n", MINIMAL).unwrap();

    let config = Config::read(file.path().to_str().unwrap()).unwrap();
    let params = Params::from_config(&config).unwrap();
    assert_eq!(params.t_ras, 20);
    assert_eq!(params.banks, 2);
}

/// Tests that missing topology keys are reported by name.
#[test]
fn test_config_missing_required_key() {
    let config = Config::parse("RANKS 1\nBANKS 2\nROWS 1024\nCOLS 64\n").unwrap();
    let err = Params::from_config(&config).unwrap_err();
    assert!(err.to_string().contains("CHANNELS"));
}

/// Tests the refresh topology sanity checks.
#[test]
fn test_config_refresh_validation() {
    let text = format!("{}UseRefresh true\nBanksPerRefresh 4\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    assert!(Params::from_config(&config).is_err());

    // 4 does not divide BANKS=6.
    let text = "RANKS 1\nBANKS 6\nROWS 1024\nCOLS 64\nCHANNELS 1\nBanksPerRefresh 4\n";
    let config = Config::parse(text).unwrap();
    assert!(Params::from_config(&config).is_err());

    // Disabled refresh skips the group checks.
    let text = format!("{}UseRefresh false\nBanksPerRefresh 4\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    assert!(Params::from_config(&config).is_ok());
}

/// Tests enum-valued keys and their range checks.
#[test]
fn test_config_policy_keys() {
    let text = format!("{}ClosePage 2\nScheduleScheme 0\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    let params = Params::from_config(&config).unwrap();
    assert_eq!(params.close_page, ClosePagePolicy::Restricted);
    assert_eq!(params.schedule_scheme, ScheduleScheme::Fixed);

    let text = format!("{}ClosePage 3\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    assert!(Params::from_config(&config).is_err());
}

/// Tests defaults for keys the file does not set.
#[test]
fn test_config_defaults() {
    let config = Config::parse(MINIMAL).unwrap();
    let params = Params::from_config(&config).unwrap();
    assert_eq!(params.queue_size, 32);
    assert_eq!(params.starvation_threshold, 4);
    assert_eq!(params.controller, "FRFCFS");
    assert_eq!(params.address_mapping, "R:RK:BK:CH:C");
    assert!(params.use_refresh);
    assert_eq!(params.banks_per_refresh, params.banks);
}

/// Tests the CPU to memory clock ratio used for cycle caps.
#[test]
fn test_config_cycle_ratio() {
    let text = format!("{}CPUFreq 2000\nCLK 666\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    let params = Params::from_config(&config).unwrap();
    assert_eq!(params.cpu_cycle_ratio(), 4);
}

/// Tests the hook name list.
#[test]
fn test_config_hooks_list() {
    let text = format!("{}Hooks RequestTracer Visualizer\n", MINIMAL);
    let config = Config::parse(&text).unwrap();
    assert_eq!(config.hooks(), vec!["RequestTracer", "Visualizer"]);
}

/// Tests that malformed lines are rejected.
#[test]
fn test_config_malformed_line() {
    assert!(Config::parse("RANKS\n").is_err());
}
