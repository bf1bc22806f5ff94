use std::{path::PathBuf, time::Duration};

pub const BAUDRATE: u32 = 9600;

/// Rates offered by the baud selector. Applied on the next reconnect only.
pub const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Runtime settings for the console. Built once in `main` and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub baud_rate: u32,
    /// Read timeout for a single `receive` call.
    pub read_timeout: Duration,
    /// Pause after each write so the rig can latch the line.
    pub settle_delay: Duration,
    pub system_log_dir: PathBuf,
    pub data_dir: PathBuf,
    pub diag_log_dir: PathBuf,
    /// Substring the first enumerated port's description must contain.
    pub expected_device: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: BAUDRATE,
            read_timeout: Duration::from_millis(50),
            settle_delay: Duration::from_millis(2),
            system_log_dir: PathBuf::from("log/system"),
            data_dir: PathBuf::from("log/data"),
            diag_log_dir: PathBuf::from("logs"),
            expected_device: "CH340".to_string(),
        }
    }
}

/// Next entry in [`BAUD_RATES`] after `current`, wrapping around.
pub fn next_baud_rate(current: u32) -> u32 {
    match BAUD_RATES.iter().position(|&b| b == current) {
        Some(i) => BAUD_RATES[(i + 1) % BAUD_RATES.len()],
        None => BAUD_RATES[0],
    }
}
