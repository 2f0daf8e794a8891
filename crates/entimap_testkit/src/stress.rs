//! Stress tests for sessions.
//!
//! These helpers drive many sessions against one repository, sequentially
//! and from several threads.

use crate::fixtures::Note;
use entimap_core::Repository;
use std::ops::AddAssign;
use std::thread;
use std::time::{Duration, Instant};

/// How one session of a stress run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Committed { entities: usize },
    RolledBack,
    Failed,
}

/// Session counts of a stress run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTally {
    /// Sessions whose commit succeeded.
    pub committed: usize,
    /// Sessions that rolled back on purpose.
    pub rolled_back: usize,
    /// Sessions where an insert or the commit failed.
    pub failed: usize,
    /// Entities written by the committed sessions.
    pub entities_written: usize,
}

impl SessionTally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Committed { entities } => {
                self.committed += 1;
                self.entities_written += entities;
            }
            Outcome::RolledBack => self.rolled_back += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Returns the number of sessions opened.
    pub fn sessions(&self) -> usize {
        self.committed + self.rolled_back + self.failed
    }
}

impl AddAssign for SessionTally {
    fn add_assign(&mut self, other: Self) {
        self.committed += other.committed;
        self.rolled_back += other.rolled_back;
        self.failed += other.failed;
        self.entities_written += other.entities_written;
    }
}

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressReport {
    /// What the sessions did.
    pub tally: SessionTally,
    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl StressReport {
    fn finish(tally: SessionTally, start: Instant) -> Self {
        Self {
            tally,
            duration: start.elapsed(),
        }
    }

    /// Returns successful commits per second.
    pub fn commits_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.tally.committed as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        let tally = &self.tally;
        println!("\n=== {name} ===");
        println!(
            "Sessions: {} ({} committed, {} rolled back, {} failed)",
            tally.sessions(),
            tally.committed,
            tally.rolled_back,
            tally.failed
        );
        println!("Entities written: {}", tally.entities_written);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} commits/sec", self.commits_per_second());
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of sessions to open.
    pub sessions: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Notes added per session.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            sessions: 1_000,
            threads: 4,
            batch_size: 8,
        }
    }
}

/// Adds a batch of notes in a fresh session, then commits or rolls back.
fn run_session(
    repo: &Repository,
    prefix: &str,
    run: usize,
    batch: usize,
    commit: bool,
) -> Outcome {
    let mut session = repo.session();
    let added = (0..batch).try_for_each(|i| {
        session
            .insert(Note::with_slug(&format!("{prefix}-{run}-{i}")))
            .map(|_| ())
    });
    if !commit {
        session.rollback();
        return if added.is_ok() {
            Outcome::RolledBack
        } else {
            Outcome::Failed
        };
    }
    match added.and_then(|()| session.commit()) {
        Ok(()) => Outcome::Committed { entities: batch },
        Err(_) => Outcome::Failed,
    }
}

fn commit_batches(repo: &Repository, prefix: &str, config: &StressConfig) -> SessionTally {
    let mut tally = SessionTally::default();
    for run in 0..config.sessions {
        tally.record(run_session(repo, prefix, run, config.batch_size, true));
    }
    tally
}

/// Opens one session after the other, each committing a batch of notes.
pub fn stress_sequential_commits(repo: &Repository, config: &StressConfig) -> StressReport {
    let start = Instant::now();
    let tally = commit_batches(repo, "seq", config);
    StressReport::finish(tally, start)
}

/// Splits the sessions over several threads, each committing its own
/// batches.
pub fn stress_concurrent_sessions(repo: &Repository, config: &StressConfig) -> StressReport {
    let per_thread = StressConfig {
        sessions: config.sessions / config.threads.max(1),
        ..config.clone()
    };

    let start = Instant::now();
    let tally = thread::scope(|scope| {
        let workers: Vec<_> = (0..config.threads)
            .map(|t| {
                let per_thread = &per_thread;
                scope.spawn(move || commit_batches(repo, &format!("t{t}"), per_thread))
            })
            .collect();

        let mut tally = SessionTally::default();
        for worker in workers {
            match worker.join() {
                Ok(part) => tally += part,
                Err(_) => tally.failed += per_thread.sessions,
            }
        }
        tally
    });

    StressReport::finish(tally, start)
}

/// Every second session rolls back instead of committing.
pub fn stress_rollbacks(repo: &Repository, config: &StressConfig) -> StressReport {
    let start = Instant::now();
    let mut tally = SessionTally::default();
    for run in 0..config.sessions {
        tally.record(run_session(repo, "rb", run, config.batch_size, run % 2 == 0));
    }
    StressReport::finish(tally, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> StressConfig {
        StressConfig {
            sessions: 40,
            threads: 4,
            batch_size: 3,
        }
    }

    #[test]
    fn test_sequential_commits() {
        let repo = Repository::in_memory();
        let config = small_config();
        let report = stress_sequential_commits(&repo, &config);

        assert_eq!(report.tally.failed, 0);
        assert_eq!(report.tally.entities_written, repo.count::<Note>());
        assert_eq!(repo.count::<Note>(), config.sessions * config.batch_size);
    }

    #[test]
    fn test_concurrent_sessions() {
        let repo = Repository::in_memory();
        let config = small_config();
        let report = stress_concurrent_sessions(&repo, &config);

        assert_eq!(report.tally.failed, 0);
        assert_eq!(report.tally.committed, config.sessions);
        assert_eq!(repo.count::<Note>(), config.sessions * config.batch_size);
    }

    #[test]
    fn test_rollbacks() {
        let repo = Repository::in_memory();
        let config = small_config();
        let report = stress_rollbacks(&repo, &config);

        assert_eq!(report.tally.failed, 0);
        assert_eq!(report.tally.rolled_back, config.sessions / 2);
        assert_eq!(report.tally.sessions(), config.sessions);
        assert_eq!(repo.count::<Note>(), config.sessions / 2 * config.batch_size);
    }

    #[test]
    fn failed_sessions_are_counted() {
        let repo = Repository::in_memory();
        let config = StressConfig {
            sessions: 2,
            threads: 1,
            batch_size: 2,
        };
        stress_sequential_commits(&repo, &config);

        // Same slugs again: every session collides with committed notes.
        let report = stress_sequential_commits(&repo, &config);
        assert_eq!(report.tally.failed, 2);
        assert_eq!(report.tally.committed, 0);
        assert_eq!(report.tally.entities_written, 0);
    }
}
