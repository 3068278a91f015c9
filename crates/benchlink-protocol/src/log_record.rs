//! Log entries on the data plane.
//!
//! A log payload is the JSON array
//! `["YYYY-MM-DD HH:MM:SS", levelname, logger_name, text]`.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// `(asctime, level, logger, text)`; serializes as a 4-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord(pub String, pub String, pub String, pub String);

impl LogRecord {
    /// A record stamped with the current local time.
    pub fn now(level: &str, logger: &str, text: &str) -> Self {
        LogRecord(
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level.to_owned(),
            logger.to_owned(),
            text.to_owned(),
        )
    }

    pub fn asctime(&self) -> &str {
        &self.0
    }

    pub fn level(&self) -> &str {
        &self.1
    }

    pub fn logger(&self) -> &str {
        &self.2
    }

    pub fn text(&self) -> &str {
        &self.3
    }
}
