//! Errors, logging and small formatting helpers

pub mod error;
pub mod logging;

use std::time::Duration;

pub use error::{ClassifierError, Result};
pub use logging::{init_logging, LogConfig};

/// `42.3s`, `7m 05s` or `2h 13m`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let whole = duration.as_secs();
    match whole {
        0..=59 => format!("{:.1}s", secs),
        60..=3599 => format!("{}m {:02}s", whole / 60, whole % 60),
        _ => format!("{}h {:02}m", whole / 3600, (whole % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42_300)), "42.3s");
        assert_eq!(format_duration(Duration::from_secs(425)), "7m 05s");
        assert_eq!(format_duration(Duration::from_secs(7980)), "2h 13m");
    }
}
