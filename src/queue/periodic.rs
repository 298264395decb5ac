//! Periodic triggers.
//!
//! Each definition is enqueued once per interval with a uniqueness window of
//! the same length, so restarts and overlapping schedulers never double up.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::Config;
use crate::queue::{InsertOpts, JobArgs, JobQueue};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicJob {
    pub args: JobArgs,
    pub interval: Duration,
    pub run_on_start: bool,
}

impl PeriodicJob {
    fn new(args: JobArgs, interval: Duration) -> Self {
        Self {
            args,
            interval,
            run_on_start: true,
        }
    }

    fn not_on_start(mut self) -> Self {
        self.run_on_start = false;
        self
    }
}

/// Periodic definitions for the sources enabled in `config`.
pub fn periodic_jobs(config: &Config) -> Vec<PeriodicJob> {
    let mut jobs = vec![
        PeriodicJob::new(JobArgs::Serveme, 12 * HOUR),
        PeriodicJob::new(JobArgs::SteamSummary, 2 * MINUTE),
        PeriodicJob::new(JobArgs::SteamServers, 5 * MINUTE),
        PeriodicJob::new(JobArgs::BdLists, MINUTE),
    ];
    if config.rgl_scraper_enabled {
        jobs.push(PeriodicJob::new(JobArgs::RglBans, 12 * HOUR));
        jobs.push(PeriodicJob::new(JobArgs::RglSeason { start: 1 }, 24 * HOUR));
    }
    if config.etf2l_scraper_enabled {
        jobs.push(PeriodicJob::new(JobArgs::Etf2lBans, 12 * HOUR));
    }
    if config.sourcebans_scraper_enabled {
        jobs.push(PeriodicJob::new(JobArgs::SourceBans, 24 * HOUR).not_on_start());
    }
    if config.logstf_scraper_enabled {
        jobs.push(PeriodicJob::new(JobArgs::LogsTf, HOUR));
    }
    jobs
}

/// Next due time of every definition.
#[derive(Debug)]
pub struct Schedule {
    entries: Vec<(PeriodicJob, Instant)>,
}

impl Schedule {
    pub fn new(jobs: Vec<PeriodicJob>, start: Instant) -> Self {
        let entries = jobs
            .into_iter()
            .map(|job| {
                let first = if job.run_on_start {
                    start
                } else {
                    start + job.interval
                };
                (job, first)
            })
            .collect();
        Self { entries }
    }

    /// Earliest upcoming run, if there is anything scheduled at all.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.entries.iter().map(|(_, at)| *at).min()
    }

    /// Take every definition due at `now` and push its next run forward.
    /// Missed runs collapse into one.
    pub fn due(&mut self, now: Instant) -> Vec<PeriodicJob> {
        let mut due = Vec::new();
        for (job, at) in &mut self.entries {
            if *at <= now {
                due.push(job.clone());
                while *at <= now {
                    *at += job.interval.max(Duration::from_secs(1));
                }
            }
        }
        due
    }
}

/// Enqueue periodic jobs until `cancel` fires.
pub async fn run_periodic(queue: JobQueue, jobs: Vec<PeriodicJob>, cancel: CancellationToken) {
    let mut schedule = Schedule::new(jobs, Instant::now());
    log::info!("Periodic scheduler started with {} jobs", schedule.entries.len());

    while let Some(wakeup) = schedule.next_wakeup() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(wakeup) => {}
        }

        for job in schedule.due(Instant::now()) {
            let opts = InsertOpts {
                unique_period: Some(job.interval),
                ..Default::default()
            };
            match queue.enqueue(&job.args, opts).await {
                Ok(Some(id)) => log::debug!("Enqueued periodic {} as job {id}", job.args.kind()),
                Ok(None) => {}
                Err(e) => log::error!("Failed to enqueue periodic {}: {e}", job.args.kind()),
            }
        }
    }
    log::info!("Periodic scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            rgl_scraper_enabled: true,
            sourcebans_scraper_enabled: true,
            ..Config::default()
        }
    }

    #[test]
    fn definitions_follow_enable_flags() {
        let base = periodic_jobs(&Config::default());
        assert_eq!(base.len(), 4);

        let jobs = periodic_jobs(&config());
        assert!(jobs.iter().any(|j| j.args == JobArgs::RglSeason { start: 1 }));
        assert!(!jobs.iter().any(|j| j.args == JobArgs::LogsTf));

        let sourcebans = jobs.iter().find(|j| j.args == JobArgs::SourceBans).unwrap();
        assert!(!sourcebans.run_on_start);
        assert_eq!(sourcebans.interval, 24 * HOUR);
    }

    #[test]
    fn schedule_fires_on_start_then_each_interval() {
        let start = Instant::now();
        let mut schedule = Schedule::new(periodic_jobs(&config()), start);

        let first: Vec<JobArgs> = schedule.due(start).into_iter().map(|j| j.args).collect();
        assert!(first.contains(&JobArgs::BdLists));
        assert!(!first.contains(&JobArgs::SourceBans));
        assert_eq!(schedule.next_wakeup(), Some(start + MINUTE));

        // Two minutes in: BD lists (missed once, fires once) and the steam refresh.
        let due: Vec<JobArgs> = schedule
            .due(start + 2 * MINUTE)
            .into_iter()
            .map(|j| j.args)
            .collect();
        assert_eq!(due, vec![JobArgs::SteamSummary, JobArgs::BdLists]);
        assert!(schedule.due(start + 2 * MINUTE).is_empty());

        let day: Vec<JobArgs> = schedule
            .due(start + 24 * HOUR)
            .into_iter()
            .map(|j| j.args)
            .collect();
        assert!(day.contains(&JobArgs::SourceBans));
    }
}
