//! Timezone-aware clock.
//!
//! Every "what day is it" and "what minute of the day is it" comparison in the
//! crate goes through one `Clock` so schedule resolution, generation checks
//! and retention cleanup all agree on the same notion of "today".

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Clock {
    tz: Option<Tz>,
}

impl Clock {
    /// Resolve a timezone identifier, falling back to the system-local clock
    /// when it does not parse.
    pub fn new(timezone: &str) -> Self {
        match timezone.parse::<Tz>() {
            Ok(tz) => Self { tz: Some(tz) },
            Err(_) => {
                warn!(timezone, "Unknown timezone identifier, using system time");
                Self { tz: None }
            }
        }
    }

    pub fn system() -> Self {
        Self { tz: None }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Current calendar date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => Local::now().date_naive(),
        }
    }

    /// Current minute of day (0-1439) in the configured timezone.
    pub fn minute_of_day(&self) -> u32 {
        let (hour, minute) = match self.tz {
            Some(tz) => {
                let now = Utc::now().with_timezone(&tz);
                (now.hour(), now.minute())
            }
            None => {
                let now = Local::now();
                (now.hour(), now.minute())
            }
        };
        hour * 60 + minute
    }

    /// Calendar date of a UTC timestamp, viewed in the configured timezone.
    pub fn date_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self.tz {
            Some(tz) => ts.with_timezone(&tz).date_naive(),
            None => ts.with_timezone(&Local).date_naive(),
        }
    }

    /// Compact YYYYMMDD key for cache partitioning.
    pub fn day_key(&self) -> u32 {
        let d = self.today();
        d.year() as u32 * 10_000 + d.month() * 100 + d.day()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
