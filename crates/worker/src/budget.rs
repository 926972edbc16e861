use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Platform free-tier write cap per rolling day.
pub const DEFAULT_POST_LIMIT: usize = 17;

const WINDOW_HOURS: i64 = 24;
const PRUNE_HORIZON_HOURS: i64 = 48;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("post budget exhausted until {resets_at}")]
    Exhausted { resets_at: DateTime<Utc> },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    posts: Vec<DateTime<Utc>>,
}

/// Rolling-window cap on platform posts. Invocations are ephemeral, so the
/// window lives in a small JSON ledger next to the catalog document.
pub struct PostBudget {
    path: PathBuf,
    limit: usize,
}

impl PostBudget {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how many posts remain in the current window, or
    /// [`BudgetError::Exhausted`] with the instant the window reopens.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<usize, BudgetError> {
        let ledger = self.read_ledger().await?;
        let window_start = now - Duration::hours(WINDOW_HOURS);
        let in_window: Vec<DateTime<Utc>> = ledger
            .posts
            .iter()
            .copied()
            .filter(|posted_at| *posted_at > window_start)
            .collect();

        if in_window.len() >= self.limit {
            let resets_at = in_window
                .iter()
                .min()
                .map_or(now, |oldest| *oldest + Duration::hours(WINDOW_HOURS));
            return Err(BudgetError::Exhausted { resets_at });
        }

        Ok(self.limit - in_window.len())
    }

    /// Appends one post to the ledger and drops entries past the prune
    /// horizon so the file never grows without bound.
    pub async fn record(&self, posted_at: DateTime<Utc>) -> Result<(), BudgetError> {
        let mut ledger = self.read_ledger().await?;
        ledger.posts.push(posted_at);
        let horizon = posted_at - Duration::hours(PRUNE_HORIZON_HOURS);
        ledger.posts.retain(|entry| *entry > horizon);
        ledger.posts.sort();
        self.write_ledger(&ledger).await
    }

    async fn read_ledger(&self) -> Result<Ledger, BudgetError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Ledger::default())
            }
            Err(error) => return Err(error.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(ledger) => Ok(ledger),
            Err(error) => {
                // The budget is advisory; a rotten ledger must not block
                // publishing forever.
                warn!(
                    path = %self.path.display(),
                    %error,
                    "budget: ledger unreadable, starting a fresh window"
                );
                Ok(Ledger::default())
            }
        }
    }

    async fn write_ledger(&self, ledger: &Ledger) -> Result<(), BudgetError> {
        let encoded = serde_json::to_vec_pretty(ledger)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut work_path = self.path.as_os_str().to_owned();
        work_path.push(".tmp");
        let work_path = PathBuf::from(work_path);

        fs::write(&work_path, &encoded).await?;
        fs::rename(&work_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn budget_in(dir: &TempDir, limit: usize) -> PostBudget {
        PostBudget::new(dir.path().join("post_budget.json"), limit)
    }

    #[tokio::test]
    async fn fresh_budget_has_the_full_allowance() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 17);

        let remaining = budget.check(Utc::now()).await.expect("check");
        assert_eq!(remaining, 17);
    }

    #[tokio::test]
    async fn recording_posts_consumes_the_window() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 3);
        let now = Utc::now();

        budget.record(now - Duration::hours(2)).await.expect("record");
        budget.record(now - Duration::hours(1)).await.expect("record");

        let remaining = budget.check(now).await.expect("check");
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_when_the_window_reopens() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 2);
        let now = Utc::now();
        let oldest = now - Duration::hours(20);

        budget.record(oldest).await.expect("record");
        budget.record(now - Duration::hours(1)).await.expect("record");

        match budget.check(now).await {
            Err(BudgetError::Exhausted { resets_at }) => {
                assert_eq!(resets_at, oldest + Duration::hours(24));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn posts_outside_the_window_do_not_count() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 2);
        let now = Utc::now();

        budget.record(now - Duration::hours(30)).await.expect("record");
        budget.record(now - Duration::hours(25)).await.expect("record");

        let remaining = budget.check(now).await.expect("check");
        assert_eq!(remaining, 2);
    }

    #[tokio::test]
    async fn ledger_prunes_entries_past_the_horizon() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 17);
        let now = Utc::now();

        budget.record(now - Duration::hours(49)).await.expect("record");
        budget.record(now).await.expect("record");

        let raw = std::fs::read(budget.path()).expect("ledger bytes");
        let ledger: Ledger = serde_json::from_slice(&raw).expect("ledger json");
        assert_eq!(ledger.posts, vec![now]);
    }

    #[tokio::test]
    async fn garbage_ledger_resets_instead_of_wedging() {
        let dir = TempDir::new().expect("tempdir");
        let budget = budget_in(&dir, 5);
        std::fs::write(budget.path(), b"not a ledger").expect("seed garbage");

        let remaining = budget.check(Utc::now()).await.expect("check");
        assert_eq!(remaining, 5);

        budget.record(Utc::now()).await.expect("record");
        let remaining = budget.check(Utc::now()).await.expect("check");
        assert_eq!(remaining, 4);
    }
}
