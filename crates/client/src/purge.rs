//! Bulk message deletion.
//!
//! Messages older than two weeks cannot go through the bulk endpoint and are
//! deleted one by one; the rest are deleted in chunks. Both lists run as
//! supervised background tasks that report every outcome on a channel.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use distodo_shared::{ApiError, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api_client::ApiClient;

/// Age past which the bulk endpoint rejects a message.
pub const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// Messages per bulk-delete call.
pub const BULK_CHUNK_SIZE: usize = 99;

/// How a set of messages will be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgePlan {
    pub single: Vec<String>,
    pub bulk: Vec<Vec<String>>,
}

impl PurgePlan {
    /// Split messages by age. A message without a timestamp is treated as
    /// too old for bulk deletion.
    pub fn new(messages: &[Message], now: DateTime<Utc>) -> Self {
        let max_age = TimeDelta::days(BULK_DELETE_MAX_AGE_DAYS);
        let mut single = Vec::new();
        let mut recent = Vec::new();
        for message in messages {
            match message.timestamp {
                Some(ts) if now - ts < max_age => recent.push(message.id.clone()),
                _ => single.push(message.id.clone()),
            }
        }

        let mut bulk = Vec::new();
        for chunk in recent.chunks(BULK_CHUNK_SIZE) {
            // The bulk endpoint needs at least two ids
            if chunk.len() == 1 {
                single.extend_from_slice(chunk);
            } else {
                bulk.push(chunk.to_vec());
            }
        }
        Self { single, bulk }
    }

    pub fn is_empty(&self) -> bool {
        self.single.is_empty() && self.bulk.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.single.len() + self.bulk.iter().map(Vec::len).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurgeEvent {
    Deleted { message_id: String },
    BulkDeleted { count: usize },
    Failed { message_ids: Vec<String>, error: ApiError },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurgeSummary {
    pub deleted: usize,
    pub failures: Vec<(Vec<String>, ApiError)>,
}

/// Receiving end of a running purge.
pub struct PurgeHandle {
    events: mpsc::UnboundedReceiver<PurgeEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl PurgeHandle {
    /// Next outcome, or `None` once every task has finished.
    pub async fn next_event(&mut self) -> Option<PurgeEvent> {
        self.events.recv().await
    }

    /// Drain all outcomes and wait for the tasks.
    pub async fn wait(mut self) -> PurgeSummary {
        let mut summary = PurgeSummary::default();
        while let Some(event) = self.events.recv().await {
            match event {
                PurgeEvent::Deleted { .. } => summary.deleted += 1,
                PurgeEvent::BulkDeleted { count } => summary.deleted += count,
                PurgeEvent::Failed { message_ids, error } => {
                    summary.failures.push((message_ids, error))
                }
            }
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Purge task aborted");
            }
        }
        summary
    }
}

/// Start deleting `messages` from `channel_id` in the background.
pub fn spawn_purge(api: Arc<ApiClient>, channel_id: String, messages: &[Message]) -> PurgeHandle {
    let plan = PurgePlan::new(messages, Utc::now());
    info!(
        channel_id = %channel_id,
        single = plan.single.len(),
        bulk_chunks = plan.bulk.len(),
        "Starting purge"
    );

    let (tx, events) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();

    if !plan.single.is_empty() {
        let (api, channel_id, tx) = (api.clone(), channel_id.clone(), tx.clone());
        let ids = plan.single;
        tasks.push(tokio::spawn(async move {
            for id in ids {
                let event = match api.delete_message(&channel_id, &id).await {
                    Ok(()) => PurgeEvent::Deleted { message_id: id },
                    Err(error) => {
                        warn!(message_id = %id, error = %error, "Delete failed");
                        PurgeEvent::Failed {
                            message_ids: vec![id],
                            error,
                        }
                    }
                };
                let _ = tx.send(event);
            }
            debug!("Single deletes finished");
        }));
    }

    if !plan.bulk.is_empty() {
        let chunks = plan.bulk;
        tasks.push(tokio::spawn(async move {
            for ids in chunks {
                let event = match api.bulk_delete_messages(&channel_id, &ids).await {
                    Ok(()) => PurgeEvent::BulkDeleted { count: ids.len() },
                    Err(error) => {
                        warn!(count = ids.len(), error = %error, "Bulk delete failed");
                        PurgeEvent::Failed {
                            message_ids: ids,
                            error,
                        }
                    }
                };
                let _ = tx.send(event);
            }
            debug!("Bulk deletes finished");
        }));
    }

    PurgeHandle { events, tasks }
}
