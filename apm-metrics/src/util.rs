use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Parse a timestamp parameter that can be either RFC3339 or Unix timestamp (float seconds).
pub fn parse_timestamp(s: &str) -> Result<SystemTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.into());
    }

    match s.parse::<f64>() {
        Ok(secs) => {
            if secs < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "Invalid timestamp: negative value {}",
                    secs
                )));
            }
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::InvalidInput(format!("Invalid timestamp: {}", e)))
                .and_then(|duration| {
                    UNIX_EPOCH.checked_add(duration).ok_or_else(|| {
                        Error::InvalidInput("Invalid timestamp: overflow".to_string())
                    })
                })
        }
        Err(e) => Err(Error::InvalidInput(format!(
            "Could not parse timestamp '{}': not RFC3339 or float ({})",
            s, e
        ))),
    }
}

/// Unix seconds as a float, negative before the epoch.
pub fn unix_secs_f64(t: SystemTime) -> f64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
