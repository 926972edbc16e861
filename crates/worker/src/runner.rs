use std::{sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use shared::{
    domain::{CatalogItem, ItemId, ItemStatus},
    error::TransitionError,
};
use storage::{CatalogStore, StoreError};

use crate::{
    budget::{BudgetError, PostBudget},
    ports::{Platform, PlatformError, PostConfirmation, RenderError, Renderer},
};

/// How many times a catalog write is attempted before the invocation gives
/// up. Conflicts reload and re-apply; the delays double up to a cap.
pub const SAVE_RETRY_ATTEMPTS: u32 = 5;
const SAVE_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const SAVE_RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// What one invocation did with its item. Every variant is a clean exit;
/// skips are successes so redelivered triggers stay harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Published { post_ids: Vec<String> },
    /// The item already carries a publish outcome from an earlier run.
    SkippedAlreadyPublished,
    /// Another invocation holds the claim right now.
    SkippedInFlight,
    /// The item is failed and the trigger did not ask for a retry; acting on
    /// it anyway would turn a stale redelivery into a duplicate post.
    SkippedNeedsRetry,
    Failed { reason: String },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("item {0} is not in the catalog")]
    ItemNotFound(ItemId),
    #[error("could not claim item {0}: the catalog kept changing underneath the worker")]
    ClaimExhausted(ItemId),
    /// The thread went out but the catalog never recorded it. The next
    /// operator action must start from the platform, not the document.
    #[error("item {item_id} was posted (ids {post_ids:?}) but the outcome write never landed; reconcile manually")]
    StoreWriteExhausted {
        item_id: ItemId,
        post_ids: Vec<String>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

enum ClaimOutcome {
    Claimed(CatalogItem),
    Settled(RunOutcome),
}

/// One-shot publisher for a single catalog item: claim it via a guarded
/// write, render, post, then record the outcome. Every catalog write is a
/// compare-and-swap against the revision it loaded; conflicts reload and
/// re-validate rather than overwrite.
pub struct PublishWorker {
    store: Arc<dyn CatalogStore>,
    renderer: Arc<dyn Renderer>,
    platform: Arc<dyn Platform>,
    budget: PostBudget,
}

impl PublishWorker {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        renderer: Arc<dyn Renderer>,
        platform: Arc<dyn Platform>,
        budget: PostBudget,
    ) -> Self {
        Self {
            store,
            renderer,
            platform,
            budget,
        }
    }

    pub async fn run(&self, item_id: &ItemId, retry: bool) -> Result<RunOutcome, WorkerError> {
        let item = match self.claim(item_id, retry).await? {
            ClaimOutcome::Claimed(item) => item,
            ClaimOutcome::Settled(outcome) => return Ok(outcome),
        };

        match self.budget.check(Utc::now()).await {
            Ok(remaining) => info!(item_id = %item_id, remaining, "publish: post budget ok"),
            Err(BudgetError::Exhausted { resets_at }) => {
                let reason = format!("post budget exhausted until {}", resets_at.to_rfc3339());
                self.fail_item(item_id, &reason).await;
                return Ok(RunOutcome::Failed { reason });
            }
            Err(BudgetError::Io(error)) => {
                // The cap is advisory; a broken ledger must not strand the item.
                warn!(item_id = %item_id, %error, "publish: budget ledger unavailable, continuing");
            }
        }

        let thread = match self.renderer.render(item_id, &item.payload).await {
            Ok(thread) => thread,
            Err(RenderError(detail)) => {
                let reason = format!("render failed: {detail}");
                self.fail_item(item_id, &reason).await;
                return Ok(RunOutcome::Failed { reason });
            }
        };

        let confirmation = match self.platform.post_thread(&thread).await {
            Ok(confirmation) => confirmation,
            Err(PlatformError::Rejected { reason }) => {
                let reason = format!("platform post failed: {reason}");
                self.fail_item(item_id, &reason).await;
                return Ok(RunOutcome::Failed { reason });
            }
            Err(PlatformError::Ambiguous { reason }) => {
                // The thread may exist remotely; retrying here could post it
                // twice. Only an operator can clear this state.
                let reason = format!(
                    "platform outcome unknown: {reason}; verify the thread manually before retrying"
                );
                self.fail_item(item_id, &reason).await;
                return Ok(RunOutcome::Failed { reason });
            }
        };

        if let Err(error) = self.budget.record(confirmation.posted_at).await {
            warn!(item_id = %item_id, %error, "publish: post went out but the budget ledger write failed");
        }

        self.record_published(item_id, &confirmation).await?;
        info!(item_id = %item_id, post_ids = ?confirmation.post_ids, "publish: item published");
        Ok(RunOutcome::Published {
            post_ids: confirmation.post_ids,
        })
    }

    /// Loads, validates, and flips the item to publishing in one guarded
    /// write. Reloading on conflict re-runs validation from scratch, so a
    /// race lost to another invocation resolves into a skip, not a
    /// duplicate claim.
    async fn claim(&self, item_id: &ItemId, retry: bool) -> Result<ClaimOutcome, WorkerError> {
        for attempt in 1..=SAVE_RETRY_ATTEMPTS {
            let (mut catalog, revision) = match self.store.load().await {
                Ok(loaded) => loaded,
                // No document at all: the trigger outlived its catalog.
                Err(StoreError::NotFound) => {
                    return Err(WorkerError::ItemNotFound(item_id.clone()))
                }
                Err(error) => return Err(error.into()),
            };
            let item = catalog
                .item_mut(item_id)
                .ok_or_else(|| WorkerError::ItemNotFound(item_id.clone()))?;

            match item.status {
                ItemStatus::Published => {
                    info!(item_id = %item_id, "publish: item already published, nothing to do");
                    return Ok(ClaimOutcome::Settled(RunOutcome::SkippedAlreadyPublished));
                }
                ItemStatus::Publishing => {
                    info!(item_id = %item_id, "publish: another invocation holds the item");
                    return Ok(ClaimOutcome::Settled(RunOutcome::SkippedInFlight));
                }
                ItemStatus::Failed if !retry => {
                    info!(item_id = %item_id, "publish: item is failed and the trigger did not ask for a retry");
                    return Ok(ClaimOutcome::Settled(RunOutcome::SkippedNeedsRetry));
                }
                ItemStatus::Failed => {
                    item.reset_for_retry()?;
                    item.begin_publishing()?;
                }
                ItemStatus::Pending => item.begin_publishing()?,
            }

            let claimed = item.clone();
            match self.store.save(&catalog, &revision).await {
                Ok(_) => {
                    info!(item_id = %item_id, attempt, "publish: claimed item");
                    return Ok(ClaimOutcome::Claimed(claimed));
                }
                Err(StoreError::Conflict) => {
                    warn!(item_id = %item_id, attempt, "publish: claim lost a write race, reloading");
                    sleep(save_retry_delay(attempt)).await;
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(WorkerError::ClaimExhausted(item_id.clone()))
    }

    /// Persists the publish outcome. The post already happened, so this
    /// retries through transport errors as well as conflicts, and escalates
    /// to [`WorkerError::StoreWriteExhausted`] instead of dropping the fact.
    async fn record_published(
        &self,
        item_id: &ItemId,
        confirmation: &PostConfirmation,
    ) -> Result<(), WorkerError> {
        for attempt in 1..=SAVE_RETRY_ATTEMPTS {
            let (mut catalog, revision) = match self.store.load().await {
                Ok(loaded) => loaded,
                Err(error) => {
                    warn!(item_id = %item_id, attempt, %error, "publish: could not reload catalog to record the post");
                    sleep(save_retry_delay(attempt)).await;
                    continue;
                }
            };

            let Some(item) = catalog.item_mut(item_id) else {
                // The catalog was replaced out from under the claim.
                break;
            };
            match item.status {
                ItemStatus::Publishing => item.record_published(confirmation.posted_at)?,
                ItemStatus::Published => return Ok(()),
                ItemStatus::Pending | ItemStatus::Failed => break,
            }

            match self.store.save(&catalog, &revision).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict) => {
                    warn!(item_id = %item_id, attempt, "publish: outcome write lost a race, reloading");
                    sleep(save_retry_delay(attempt)).await;
                }
                Err(error) => {
                    warn!(item_id = %item_id, attempt, %error, "publish: outcome write failed");
                    sleep(save_retry_delay(attempt)).await;
                }
            }
        }

        error!(
            item_id = %item_id,
            post_ids = ?confirmation.post_ids,
            "publish: the thread went out but its outcome could not be recorded; reconcile the catalog manually"
        );
        Err(WorkerError::StoreWriteExhausted {
            item_id: item_id.clone(),
            post_ids: confirmation.post_ids.clone(),
        })
    }

    /// Best-effort failure write. Nothing was posted on these paths, so when
    /// the claim has moved on or the writes keep failing it logs and stops
    /// rather than escalating.
    async fn fail_item(&self, item_id: &ItemId, reason: &str) {
        for attempt in 1..=SAVE_RETRY_ATTEMPTS {
            let (mut catalog, revision) = match self.store.load().await {
                Ok(loaded) => loaded,
                Err(error) => {
                    warn!(item_id = %item_id, attempt, %error, "publish: could not reload catalog to record the failure");
                    sleep(save_retry_delay(attempt)).await;
                    continue;
                }
            };

            let Some(item) = catalog.item_mut(item_id) else {
                warn!(item_id = %item_id, "publish: item disappeared before its failure was recorded");
                return;
            };
            if item.status != ItemStatus::Publishing {
                warn!(item_id = %item_id, status = ?item.status, "publish: item changed hands before its failure was recorded");
                return;
            }
            if let Err(error) = item.record_failed(reason) {
                warn!(item_id = %item_id, %error, "publish: failure transition refused");
                return;
            }

            match self.store.save(&catalog, &revision).await {
                Ok(_) => {
                    info!(item_id = %item_id, reason, "publish: item marked failed");
                    return;
                }
                Err(StoreError::Conflict) => {
                    warn!(item_id = %item_id, attempt, "publish: failure write lost a race, reloading");
                    sleep(save_retry_delay(attempt)).await;
                }
                Err(error) => {
                    warn!(item_id = %item_id, attempt, %error, "publish: failure write failed");
                    sleep(save_retry_delay(attempt)).await;
                }
            }
        }

        warn!(item_id = %item_id, reason, "publish: gave up recording the failure; the item stays publishing until an operator intervenes");
    }
}

fn save_retry_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(4);
    (SAVE_RETRY_BASE_DELAY * factor).min(SAVE_RETRY_MAX_DELAY)
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
