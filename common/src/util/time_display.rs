//
//  Copyright 2024 Google, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at:
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! # Time Display

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Seconds and nanoseconds since `UNIX_EPOCH`, rendered for log lines.
pub struct TimeDisplay {
    secs: i64,
    nsecs: u32,
}

impl TimeDisplay {
    /// Creates a new TimeDisplay with given secs and nsecs
    ///
    /// # Arguments
    ///
    /// * `secs` - seconds since std::time::UNIX_EPOCH
    /// * `nsecs` - nano sub seconds since std::time::UNIX_EPOCH
    pub fn new(secs: i64, nsecs: u32) -> TimeDisplay {
        TimeDisplay { secs, nsecs }
    }

    fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.secs, self.nsecs)
    }

    /// Displays time in UTC for logs with a format MM-DD HH:MM:SS.mmm
    pub fn utc_display_log(&self) -> String {
        match self.datetime() {
            Some(dt) => format!(
                "{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.timestamp_subsec_millis(),
            ),
            None => "INVALID-TIMESTAMP".to_string(),
        }
    }
}

fn get_current_time() -> TimeDisplay {
    // A clock set before the epoch is displayed as the epoch.
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    TimeDisplay::new(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
}

/// Return the timestamp of the current time for logs
pub fn log_current_time() -> String {
    get_current_time().utc_display_log()
}

#[cfg(test)]
mod tests {

    use super::TimeDisplay;

    #[test]
    fn test_utc_display_log() {
        let epoch_time = TimeDisplay::new(0, 0);
        assert_eq!(epoch_time.utc_display_log(), "01-01 00:00:00.000");
        let twok_time = TimeDisplay::new(946684900, 200_000_000);
        assert_eq!(twok_time.utc_display_log(), "01-01 00:01:40.200");
    }

    #[test]
    fn test_utc_display_err() {
        let max_seconds = TimeDisplay::new(i64::MAX, 0);
        assert_eq!("INVALID-TIMESTAMP", max_seconds.utc_display_log());
        let max_nanos = TimeDisplay::new(0, 2_000_000_000);
        assert_eq!("INVALID-TIMESTAMP", max_nanos.utc_display_log());
    }
}
