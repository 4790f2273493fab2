use chrono::{SecondsFormat, Utc};
use psd2img_application::Clock;

/// RFC 3339 timestamps in UTC.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_timestamp_string(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
