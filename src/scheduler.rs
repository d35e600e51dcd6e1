//! Cron-driven loop for the daily and weekly jobs.
//!
//! Expressions use the five-field crontab form and are evaluated in the
//! configured timezone. Jobs run one at a time; a failing job is logged and
//! the loop moves on to the next tick.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Daily,
    Weekly,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Daily => "daily",
            JobKind::Weekly => "weekly",
        }
    }
}

#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, kind: JobKind, today: NaiveDate) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct ScheduledJob {
    kind: JobKind,
    schedule: Schedule,
}

pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    tz: Tz,
}

/// Parses a five-field crontab expression (minute precision).
pub fn parse_cron(expr: &str) -> anyhow::Result<Schedule> {
    let full_expr = format!("0 {}", expr.trim());
    Schedule::from_str(&full_expr).with_context(|| format!("invalid cron expression '{expr}'"))
}

impl Scheduler {
    pub fn new(tz: Tz, daily_cron: &str, weekly_cron: &str) -> anyhow::Result<Self> {
        Ok(Self {
            jobs: vec![
                ScheduledJob {
                    kind: JobKind::Daily,
                    schedule: parse_cron(daily_cron)?,
                },
                ScheduledJob {
                    kind: JobKind::Weekly,
                    schedule: parse_cron(weekly_cron)?,
                },
            ],
            tz,
        })
    }

    /// Jobs whose next firing strictly after `now` is the earliest, in
    /// declaration order, with that instant. Jobs sharing a minute all run.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<(Vec<JobKind>, DateTime<Utc>)> {
        let now_local = now.with_timezone(&self.tz);
        let upcoming: Vec<(JobKind, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter_map(|job| {
                job.schedule
                    .after(&now_local)
                    .next()
                    .map(|at| (job.kind, at.with_timezone(&Utc)))
            })
            .collect();

        let earliest = upcoming.iter().map(|(_, at)| *at).min()?;
        let due = upcoming
            .into_iter()
            .filter(|(_, at)| *at == earliest)
            .map(|(kind, _)| kind)
            .collect();
        Some((due, earliest))
    }

    pub async fn run(&self, runner: &dyn JobRunner) {
        info!(timezone = %self.tz, "scheduler started");

        loop {
            let now = Utc::now();
            let Some((due, at)) = self.next_due(now) else {
                warn!("no upcoming scheduled jobs, stopping scheduler");
                return;
            };

            for kind in &due {
                info!(job = kind.name(), at = %at.with_timezone(&self.tz), "next job scheduled");
            }
            let wait = (at - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let today = at.with_timezone(&self.tz).date_naive();
            for kind in due {
                info!(job = kind.name(), "starting job");
                match runner.run_job(kind, today).await {
                    Ok(()) => info!(job = kind.name(), "job finished"),
                    Err(err) => error!(job = kind.name(), error = %format!("{err:#}"), "job failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler() -> Scheduler {
        Scheduler::new(chrono_tz::Asia::Kolkata, "35 14 * * *", "25 17 * * Sun").unwrap()
    }

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_cron("35 14 * * *").is_ok());
        assert!(parse_cron("0 8 * * 1-5").is_ok());
        assert!(parse_cron("25 17 * * Sun").is_ok());
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn daily_job_is_next_on_a_weekday_morning() {
        // Friday 10 Jan 2025, 09:00 IST
        let now = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2025, 1, 10, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let (due, at) = scheduler().next_due(now).unwrap();
        assert_eq!(due, vec![JobKind::Daily]);
        let local = at.with_timezone(&chrono_tz::Asia::Kolkata);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2025-01-10 14:35");
    }

    #[test]
    fn weekly_job_wins_when_it_comes_first() {
        // Sunday 12 Jan 2025, 15:00 IST: daily already fired, weekly at 17:25
        let now = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2025, 1, 12, 15, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let (due, at) = scheduler().next_due(now).unwrap();
        assert_eq!(due, vec![JobKind::Weekly]);
        let local = at.with_timezone(&chrono_tz::Asia::Kolkata);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2025-01-12 17:25");
    }

    #[test]
    fn jobs_sharing_a_minute_are_both_due() {
        let scheduler =
            Scheduler::new(chrono_tz::Asia::Kolkata, "25 17 * * *", "25 17 * * Sun").unwrap();
        // Sunday 12 Jan 2025, 15:00 IST
        let now = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2025, 1, 12, 15, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let (due, at) = scheduler.next_due(now).unwrap();
        assert_eq!(due, vec![JobKind::Daily, JobKind::Weekly]);

        // Monday 17:25 IST
        let (due, _) = scheduler.next_due(at).unwrap();
        assert_eq!(due, vec![JobKind::Daily]);
    }

    #[test]
    fn bad_expressions_fail_at_construction() {
        assert!(Scheduler::new(chrono_tz::UTC, "99 99 * * *", "0 9 * * Mon").is_err());
    }
}
