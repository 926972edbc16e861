use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use shared::{
    domain::{Catalog, ItemId, ItemStatus, Revision},
    protocol::TriggerRequest,
};
use storage::{CatalogStore, StoreError};

pub mod gateway;
pub mod view;

pub use gateway::{GatewayError, HttpTriggerGateway, MissingTriggerGateway, TriggerGateway};
pub use view::{ControlState, ItemView};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Poll cadence after an accepted dispatch. The worker runs on a job runner
/// that needs a minute or three to spin up, so the delays stretch out
/// instead of hammering the store.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: f64,
    pub max_attempts: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff: 1.5,
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    CatalogRefreshed {
        date: NaiveDate,
        revision: Revision,
    },
    ControlChanged {
        item_id: ItemId,
        control: ControlState,
    },
    DispatchRejected {
        item_id: ItemId,
        reason: String,
    },
    PollTimedOut {
        item_id: ItemId,
    },
}

/// How a single `request_publish` ended from the operator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The gateway refused or could not be reached; nothing was started and
    /// the control reverted to its pre-click state.
    Rejected { reason: String },
    /// The worker recorded success in the catalog.
    Published,
    /// The worker recorded a failure; the reason is the document's.
    Failed { reason: String },
    /// Accepted, but no terminal status appeared within the polling window.
    /// The view keeps showing in-progress until a later refresh reconciles.
    TimedOut,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("item {0} is not in the catalog")]
    UnknownItem(ItemId),
    #[error("item {0} is {1:?} and cannot be dispatched")]
    NotDispatchable(ItemId, ItemStatus),
    #[error("a dispatch for item {0} is already in flight")]
    AlreadyInFlight(ItemId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-side client for the publish page. Loads the catalog, renders item
/// views with an optimistic overlay, dispatches triggers through the
/// gateway, and polls the store for the authoritative outcome. It never
/// writes the catalog; the worker owns every status byte.
pub struct DispatchClient {
    store: Arc<dyn CatalogStore>,
    gateway: Arc<dyn TriggerGateway>,
    poll: PollConfig,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
}

struct ClientState {
    catalog: Option<(Catalog, Revision)>,
    overlays: HashMap<ItemId, ControlState>,
    inflight: HashSet<ItemId>,
}

impl DispatchClient {
    pub fn new(store: Arc<dyn CatalogStore>) -> Arc<Self> {
        Self::with_gateway(store, Arc::new(MissingTriggerGateway))
    }

    pub fn with_gateway(
        store: Arc<dyn CatalogStore>,
        gateway: Arc<dyn TriggerGateway>,
    ) -> Arc<Self> {
        Self::with_poll_config(store, gateway, PollConfig::default())
    }

    pub fn with_poll_config(
        store: Arc<dyn CatalogStore>,
        gateway: Arc<dyn TriggerGateway>,
        poll: PollConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            gateway,
            poll,
            inner: Mutex::new(ClientState {
                catalog: None,
                overlays: HashMap::new(),
                inflight: HashSet::new(),
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Reloads the catalog and drops optimistic overlays for everything
    /// that is not actually in flight; the store wins every disagreement.
    pub async fn refresh(&self) -> Result<(), DispatchError> {
        let (catalog, revision) = self.store.load().await?;
        let date = catalog.date;
        let event_revision = revision.clone();
        {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.overlays.retain(|id, _| state.inflight.contains(id));
            state.catalog = Some((catalog, revision));
        }
        let _ = self.events.send(ClientEvent::CatalogRefreshed {
            date,
            revision: event_revision,
        });
        Ok(())
    }

    /// Item views in catalog order, with the optimistic overlay applied on
    /// top of the last loaded document. Loads the catalog first if nothing
    /// has been fetched yet.
    pub async fn item_views(&self) -> Result<Vec<ItemView>, DispatchError> {
        {
            let guard = self.inner.lock().await;
            if guard.catalog.is_none() {
                drop(guard);
                self.refresh().await?;
            }
        }
        let guard = self.inner.lock().await;
        let (catalog, _) = guard
            .catalog
            .as_ref()
            .ok_or(DispatchError::Store(StoreError::NotFound))?;
        Ok(catalog
            .items
            .iter()
            .map(|item| {
                let mut view = ItemView::from_item(item);
                if let Some(overlay) = guard.overlays.get(&item.id) {
                    view.control = overlay.clone();
                }
                view
            })
            .collect())
    }

    /// Dispatches a publish for one item and follows it to a terminal
    /// status, or to the end of the polling window. Duplicate clicks while
    /// a dispatch is in flight are refused locally without touching the
    /// gateway.
    pub async fn request_publish(
        &self,
        item_id: &ItemId,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (catalog, revision) = self.store.load().await?;

        let (was_failed, payload, previous_control) = {
            let mut guard = self.inner.lock().await;
            let item = catalog
                .item(item_id)
                .ok_or_else(|| DispatchError::UnknownItem(item_id.clone()))?;
            if guard.inflight.contains(item_id) {
                return Err(DispatchError::AlreadyInFlight(item_id.clone()));
            }
            if !item.status.is_dispatchable() {
                return Err(DispatchError::NotDispatchable(item_id.clone(), item.status));
            }
            let previous_control = ItemView::from_item(item).control;
            let was_failed = item.status == ItemStatus::Failed;
            let payload = item.payload.clone();
            guard.inflight.insert(item_id.clone());
            guard
                .overlays
                .insert(item_id.clone(), ControlState::InProgress);
            guard.catalog = Some((catalog.clone(), revision));
            (was_failed, payload, previous_control)
        };
        let _ = self.events.send(ClientEvent::ControlChanged {
            item_id: item_id.clone(),
            control: ControlState::InProgress,
        });

        let request = TriggerRequest::new(item_id.clone(), was_failed, payload);
        info!(
            item_id = %item_id,
            delivery_id = %request.delivery_id,
            retry = request.retry,
            "dispatch: publish requested"
        );

        if let Err(err) = self.gateway.dispatch(&request).await {
            let reason = match err {
                GatewayError::Rejected(reason) => reason.to_string(),
                GatewayError::Unreachable(detail) => {
                    format!("gateway unreachable: {detail}")
                }
            };
            warn!(item_id = %item_id, "dispatch: refused: {reason}");
            {
                let mut guard = self.inner.lock().await;
                guard.inflight.remove(item_id);
                guard.overlays.remove(item_id);
            }
            let _ = self.events.send(ClientEvent::ControlChanged {
                item_id: item_id.clone(),
                control: previous_control,
            });
            let _ = self.events.send(ClientEvent::DispatchRejected {
                item_id: item_id.clone(),
                reason: reason.clone(),
            });
            return Ok(DispatchOutcome::Rejected { reason });
        }

        let outcome = self.poll_for_outcome(item_id).await;

        {
            let mut guard = self.inner.lock().await;
            guard.inflight.remove(item_id);
            if !matches!(outcome, DispatchOutcome::TimedOut) {
                guard.overlays.remove(item_id);
            }
        }
        match &outcome {
            DispatchOutcome::Published => {
                let _ = self.events.send(ClientEvent::ControlChanged {
                    item_id: item_id.clone(),
                    control: ControlState::Done,
                });
            }
            DispatchOutcome::Failed { reason } => {
                let _ = self.events.send(ClientEvent::ControlChanged {
                    item_id: item_id.clone(),
                    control: ControlState::Failed(reason.clone()),
                });
            }
            DispatchOutcome::TimedOut => {
                let _ = self.events.send(ClientEvent::PollTimedOut {
                    item_id: item_id.clone(),
                });
            }
            DispatchOutcome::Rejected { .. } => {}
        }
        Ok(outcome)
    }

    /// Watches the catalog until the item reaches a terminal status.
    /// Observing `pending` here is normal; the worker may not have started
    /// yet. Transient load failures do not abort the wait.
    async fn poll_for_outcome(&self, item_id: &ItemId) -> DispatchOutcome {
        let mut delay = self.poll.initial_delay;
        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(delay).await;
            match self.store.load().await {
                Ok((catalog, revision)) => {
                    let observed = catalog
                        .item(item_id)
                        .map(|item| (item.status, item.last_error.clone()));
                    {
                        let mut guard = self.inner.lock().await;
                        guard.catalog = Some((catalog, revision));
                    }
                    match observed {
                        Some((ItemStatus::Published, _)) => {
                            info!(item_id = %item_id, attempt, "dispatch: publish confirmed");
                            return DispatchOutcome::Published;
                        }
                        Some((ItemStatus::Failed, last_error)) => {
                            let reason = last_error
                                .unwrap_or_else(|| "unknown failure".to_string());
                            info!(item_id = %item_id, attempt, "dispatch: publish failed: {reason}");
                            return DispatchOutcome::Failed { reason };
                        }
                        Some((ItemStatus::Pending | ItemStatus::Publishing, _)) => {
                            info!(
                                item_id = %item_id,
                                attempt,
                                max_attempts = self.poll.max_attempts,
                                "dispatch: publish still in flight"
                            );
                        }
                        None => {
                            warn!(
                                item_id = %item_id,
                                "dispatch: item disappeared from catalog while polling"
                            );
                            return DispatchOutcome::TimedOut;
                        }
                    }
                }
                Err(err) => {
                    warn!(item_id = %item_id, attempt, "dispatch: catalog poll failed: {err}");
                }
            }
            delay = next_delay(delay, &self.poll);
        }
        DispatchOutcome::TimedOut
    }
}

fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let scaled = current.as_secs_f64() * config.backoff;
    Duration::from_secs_f64(scaled.min(config.max_delay.as_secs_f64()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
