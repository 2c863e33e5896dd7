//! Sequential batch driver: classify, extract and reconcile one message at
//! a time. Nothing a single message does can abort the batch.

use ordertrail_core::{CanonicalOrder, LifecycleStage, RawMessage};
use ordertrail_extract::extract_message;
use ordertrail_storage::{
    InMemoryOrderStore, MessageStore, OrderRepository, ReturnPolicyLookup, StorageError,
};
use serde::Serialize;
use tracing::{debug, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::merge::{OrderMerger, ReconcileOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Created { order: Uuid },
    Updated { order: Uuid },
    /// A message id seen before. It was re-run against the stored copy and
    /// changed nothing the order did not already have.
    SkippedDuplicateInput { order: Option<Uuid> },
    Skipped { reason: String },
    Error {
        message_id: String,
        field: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    pub stage: Option<LifecycleStage>,
    pub extractor: Option<&'static str>,
    pub confidence: Option<f64>,
    pub fell_back: bool,
    pub outcome: MessageOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub user_id: String,
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.messages.iter().filter(|m| pred(&m.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Created { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                MessageOutcome::Skipped { .. } | MessageOutcome::SkippedDuplicateInput { .. }
            )
        })
    }

    pub fn errors(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Error { .. }))
    }

    pub fn outcome_for(&self, message_id: &str) -> Option<&MessageOutcome> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.message_id == message_id)
            .map(|m| &m.outcome)
    }
}

pub struct IngestPipeline {
    confidence_threshold: f64,
    messages: MessageStore,
    merger: OrderMerger,
}

impl IngestPipeline {
    /// Pipeline backed by an in-memory order store.
    pub fn new(config: &PipelineConfig, policies: Box<dyn ReturnPolicyLookup>) -> Self {
        Self::with_repository(config, Box::new(InMemoryOrderStore::new()), policies)
    }

    pub fn with_repository(
        config: &PipelineConfig,
        repository: Box<dyn OrderRepository>,
        policies: Box<dyn ReturnPolicyLookup>,
    ) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            messages: MessageStore::new(),
            merger: OrderMerger::new(repository, policies)
                .with_default_window_days(config.default_return_days),
        }
    }

    pub fn orders(&self, user_id: &str) -> Vec<CanonicalOrder> {
        self.merger.repository().list(user_id)
    }

    pub fn process_batch(
        &mut self,
        user_id: &str,
        messages: impl IntoIterator<Item = RawMessage>,
    ) -> BatchReport {
        let mut report = BatchReport {
            user_id: user_id.to_string(),
            messages: Vec::new(),
        };
        for message in messages {
            report.messages.push(self.process_message(user_id, message));
        }
        report
    }

    pub fn process_message(&mut self, user_id: &str, message: RawMessage) -> MessageReport {
        let span = info_span!("message", message_id = %message.id, user_id);
        let _guard = span.enter();

        let ingested = self.messages.ingest(user_id, message);
        let is_new = ingested.is_new();
        let message = ingested.into_message();

        let extraction = match extract_message(&message, self.confidence_threshold) {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(field = err.field(), %err, "extraction failed");
                return MessageReport {
                    message_id: message.id.clone(),
                    stage: None,
                    extractor: None,
                    confidence: None,
                    fell_back: false,
                    outcome: MessageOutcome::Error {
                        message_id: message.id,
                        field: err.field().to_string(),
                        reason: err.to_string(),
                    },
                };
            }
        };

        let outcome = match self.merger.reconcile(user_id, &extraction.record, &message) {
            Ok(ReconcileOutcome::Created(order)) => MessageOutcome::Created { order: order.id },
            Ok(ReconcileOutcome::Updated(order)) => MessageOutcome::Updated { order: order.id },
            Ok(ReconcileOutcome::Reapplied(order)) => MessageOutcome::SkippedDuplicateInput {
                order: Some(order.id),
            },
            Ok(ReconcileOutcome::Abstained(_)) if !is_new => {
                MessageOutcome::SkippedDuplicateInput { order: None }
            }
            Ok(ReconcileOutcome::Abstained(reason)) => {
                debug!(%reason, "merger abstained");
                MessageOutcome::Skipped {
                    reason: reason.to_string(),
                }
            }
            Err(err) => {
                warn!(%err, "order could not be saved");
                MessageOutcome::Error {
                    message_id: message.id.clone(),
                    field: storage_field(&err).to_string(),
                    reason: err.to_string(),
                }
            }
        };

        MessageReport {
            message_id: message.id,
            stage: Some(extraction.stage),
            extractor: Some(extraction.extractor),
            confidence: Some(extraction.record.confidence),
            fell_back: extraction.fell_back,
            outcome,
        }
    }
}

fn storage_field(err: &StorageError) -> &'static str {
    match err {
        StorageError::DuplicateIdentity { .. } => "order_id",
        StorageError::InvalidPolicy { .. } => "return_policy",
    }
}
