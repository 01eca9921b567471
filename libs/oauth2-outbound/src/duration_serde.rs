//! `humantime` (de)serialization for [`Duration`] config fields.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Policy {
//!     #[serde(with = "oauth2_outbound::duration_serde")]
//!     refresh_offset: Duration, // "30m", "10s", "1h 30m"
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de};

/// # Errors
///
/// Returns the serializer's error if writing the string fails.
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

/// # Errors
///
/// Returns a deserialization error if the value is not a string accepted by
/// [`humantime::parse_duration`].
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
