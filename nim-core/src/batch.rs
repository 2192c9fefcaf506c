//! Batch Executor
//!
//! Runs items strictly in input order, one outbound call at a time, and
//! isolates failures according to a batch-wide [`FailurePolicy`]. The
//! isolation decision lives in [`BatchReducer`], which does no I/O.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FailureKind, NimError, Result};
use crate::request::{raw_model_hint, RequestKind};
use crate::transport::{Credentials, Transport};

// ---------------------------------------------------------------------------
// Policy and results
// ---------------------------------------------------------------------------

/// What happens when an item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the batch.
    #[default]
    Abort,
    /// Record the failure in place and move on.
    Continue,
}

impl FailurePolicy {
    pub fn from_continue_on_failure(continue_on_failure: bool) -> Self {
        if continue_on_failure {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        }
    }
}

/// Per-item failure, emitted in place of a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(rename = "item")]
    pub item_index: usize,
    #[serde(rename = "model", skip_serializing_if = "Option::is_none")]
    pub model_attempted: Option<String>,
    pub kind: FailureKind,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(item_index: usize, model_attempted: Option<String>, err: &NimError) -> Self {
        Self {
            message: err.to_string(),
            item_index,
            model_attempted,
            kind: err.kind(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one item, paired with its input index.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub item_index: usize,
    pub outcome: std::result::Result<Value, ErrorRecord>,
}

impl ExecutionResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// `{"json": payload, "paired_item": {"item": i}}`. Error payloads
    /// carry an `error` field, success payloads are the raw response.
    pub fn to_json(&self) -> Value {
        let payload = match &self.outcome {
            Ok(value) => value.clone(),
            Err(record) => serde_json::to_value(record).unwrap_or_else(|_| {
                json!({ "error": record.message, "item": record.item_index })
            }),
        };
        json!({ "json": payload, "paired_item": { "item": self.item_index } })
    }
}

pub fn results_to_json(results: &[ExecutionResult]) -> Value {
    Value::Array(results.iter().map(ExecutionResult::to_json).collect())
}

/// The batch stopped at `item_index`.
#[derive(Debug, Error)]
#[error("failed to process item {item_index}: {source}")]
pub struct BatchAbort {
    pub item_index: usize,
    pub source: NimError,
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Folds item outcomes into ordered results, short-circuiting under
/// [`FailurePolicy::Abort`].
#[derive(Debug)]
pub struct BatchReducer {
    policy: FailurePolicy,
    results: Vec<ExecutionResult>,
}

impl BatchReducer {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            results: Vec::new(),
        }
    }

    pub fn with_capacity(policy: FailurePolicy, capacity: usize) -> Self {
        Self {
            policy,
            results: Vec::with_capacity(capacity),
        }
    }

    /// Record one outcome. `Err` means the batch must stop.
    pub fn record(
        &mut self,
        item_index: usize,
        model_attempted: Option<String>,
        outcome: Result<Value>,
    ) -> std::result::Result<(), BatchAbort> {
        match outcome {
            Ok(payload) => {
                self.results.push(ExecutionResult {
                    item_index,
                    outcome: Ok(payload),
                });
                Ok(())
            }
            Err(source) => match self.policy {
                FailurePolicy::Abort => Err(BatchAbort { item_index, source }),
                FailurePolicy::Continue => {
                    let record = ErrorRecord::new(item_index, model_attempted, &source);
                    warn!(item = item_index, kind = ?record.kind, err = %record.message, "item failed, continuing");
                    self.results.push(ExecutionResult {
                        item_index,
                        outcome: Err(record),
                    });
                    Ok(())
                }
            },
        }
    }

    pub fn finish(self) -> Vec<ExecutionResult> {
        self.results
    }
}

/// Reduce already-computed outcomes `(index, model, outcome)` under `policy`.
pub fn reduce_outcomes<I>(
    policy: FailurePolicy,
    outcomes: I,
) -> std::result::Result<Vec<ExecutionResult>, BatchAbort>
where
    I: IntoIterator<Item = (usize, Option<String>, Result<Value>)>,
{
    let mut reducer = BatchReducer::new(policy);
    for (index, model, outcome) in outcomes {
        reducer.record(index, model, outcome)?;
    }
    Ok(reducer.finish())
}

// ---------------------------------------------------------------------------
// Sequential execution
// ---------------------------------------------------------------------------

/// Run `handler` over `items` in order, one at a time. Under `Abort` no item
/// after the first failure is started.
pub async fn execute_sequential<'a, T, M, F, Fut>(
    policy: FailurePolicy,
    items: &'a [T],
    model_of: M,
    mut handler: F,
) -> std::result::Result<Vec<ExecutionResult>, BatchAbort>
where
    M: Fn(&T) -> Option<String>,
    F: FnMut(usize, &'a T) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let span = info_span!("batch", run_id = %Uuid::new_v4(), items = items.len(), ?policy);

    async move {
        info!("batch started");
        let mut reducer = BatchReducer::with_capacity(policy, items.len());
        for (index, item) in items.iter().enumerate() {
            debug!(item = index, "processing item");
            let outcome = handler(index, item).await;
            if let Err(ref err) = outcome {
                debug!(item = index, err = %err, "item failed");
            }
            if let Err(abort) = reducer.record(index, model_of(item), outcome) {
                warn!(item = index, err = %abort.source, "batch aborted");
                return Err(abort);
            }
        }
        let results = reducer.finish();
        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(succeeded = results.len() - failed, failed, "batch finished");
        Ok(results)
    }
    .instrument(span)
    .await
}

/// Executes [`RequestKind`] items against one transport and credential set.
pub struct BatchExecutor {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    policy: FailurePolicy,
}

impl BatchExecutor {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, policy: FailurePolicy) -> Self {
        Self {
            transport,
            credentials,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run raw JSON items. Each item is parsed into a [`RequestKind`] in its
    /// own slot, so a malformed item fails alone.
    pub async fn run(
        &self,
        items: &[Value],
    ) -> std::result::Result<Vec<ExecutionResult>, BatchAbort> {
        let transport = self.transport.as_ref();
        let credentials = &self.credentials;
        execute_sequential(self.policy, items, raw_model_hint, move |_, raw| async move {
            let item = RequestKind::from_value(raw)?;
            item.execute(transport, credentials).await
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn chat_item(model: &str, text: &str) -> Value {
        json!({
            "kind": "chat",
            "model": model,
            "messages": [{"role": "user", "content": text}]
        })
    }

    /// Echoes the request body back; counts calls.
    struct EchoTransport {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn get_json(&self, _: &Credentials, _: &str) -> anyhow::Result<Value> {
            anyhow::bail!("not used")
        }
        async fn post_json(&self, _: &Credentials, _: &str, body: &Value) -> anyhow::Result<Value> {
            *self.calls.lock().unwrap() += 1;
            if body["messages"][0]["content"] == "boom" {
                anyhow::bail!("HTTP 500: upstream error");
            }
            Ok(json!({ "echo": body["messages"][0]["content"] }))
        }
    }

    fn executor(policy: FailurePolicy) -> (Arc<EchoTransport>, BatchExecutor) {
        let transport = Arc::new(EchoTransport {
            calls: Mutex::new(0),
        });
        let exec = BatchExecutor::new(
            transport.clone(),
            Credentials::new("k", "http://localhost"),
            policy,
        );
        (transport, exec)
    }

    #[test]
    fn reducer_continue_keeps_every_item_in_order() {
        let outcomes = vec![
            (0, None, Ok(json!({"n": 0}))),
            (1, Some("m/x".to_string()), Err(NimError::validation("bad"))),
            (2, None, Ok(json!({"n": 2}))),
        ];
        let results = reduce_outcomes(FailurePolicy::Continue, outcomes).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.item_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        let record = results[1].outcome.as_ref().unwrap_err();
        assert_eq!(record.message, "bad");
        assert_eq!(record.model_attempted.as_deref(), Some("m/x"));
        assert_eq!(record.kind, FailureKind::Validation);
    }

    #[test]
    fn reducer_abort_short_circuits() {
        let outcomes = vec![
            (0, None, Ok(json!(1))),
            (1, None, Err(NimError::validation("bad"))),
            (2, None, Ok(json!(3))),
        ];
        let abort = reduce_outcomes(FailurePolicy::Abort, outcomes).unwrap_err();
        assert_eq!(abort.item_index, 1);
        assert_eq!(abort.to_string(), "failed to process item 1: bad");
    }

    #[test]
    fn error_item_json_shape() {
        let result = ExecutionResult {
            item_index: 4,
            outcome: Err(ErrorRecord::new(
                4,
                Some("meta/llama-3.1-8b-instruct".into()),
                &NimError::validation("at least one message is required"),
            )),
        };
        let out = result.to_json();
        assert_eq!(out["paired_item"]["item"], 4);
        assert_eq!(out["json"]["error"], "at least one message is required");
        assert_eq!(out["json"]["item"], 4);
        assert_eq!(out["json"]["model"], "meta/llama-3.1-8b-instruct");
        assert_eq!(out["json"]["kind"], "validation");
        assert!(out["json"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn continue_policy_isolates_middle_failure() {
        let (transport, exec) = executor(FailurePolicy::Continue);
        let items = vec![
            chat_item("meta/llama-3.1-8b-instruct", "one"),
            chat_item("meta/llama-3.1-8b-instruct", "boom"),
            chat_item("meta/llama-3.1-8b-instruct", "three"),
        ];

        let results = exec.run(&items).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome.as_ref().unwrap()["echo"], "one");
        assert!(results[1].is_error());
        assert_eq!(results[1].item_index, 1);
        assert_eq!(results[2].outcome.as_ref().unwrap()["echo"], "three");
        assert_eq!(*transport.calls.lock().unwrap(), 3);

        let err = results[1].outcome.as_ref().unwrap_err();
        assert_eq!(err.kind, FailureKind::Transport);
        assert!(err.message.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn validation_failure_is_item_local() {
        let (transport, exec) = executor(FailurePolicy::Continue);
        let items = vec![
            chat_item("not-a-model-id", "one"),
            chat_item("meta/llama-3.1-8b-instruct", "two"),
        ];

        let results = exec.run(&items).await.unwrap();
        let err = results[0].outcome.as_ref().unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(err.model_attempted.as_deref(), Some("not-a-model-id"));
        assert!(results[1].outcome.is_ok());
        assert_eq!(*transport.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_failure() {
        let (transport, exec) = executor(FailurePolicy::Abort);
        let items = vec![
            chat_item("meta/llama-3.1-8b-instruct", "one"),
            chat_item("meta/llama-3.1-8b-instruct", "boom"),
            chat_item("meta/llama-3.1-8b-instruct", "three"),
        ];

        let abort = exec.run(&items).await.unwrap_err();
        assert_eq!(abort.item_index, 1);
        assert_eq!(abort.source.kind(), FailureKind::Transport);
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn abort_policy_well_formed_batch_preserves_order() {
        let (_, exec) = executor(FailurePolicy::Abort);
        let items: Vec<Value> = (0..5)
            .map(|i| chat_item("meta/llama-3.1-8b-instruct", &format!("item {}", i)))
            .collect();

        let results = exec.run(&items).await.unwrap();
        assert_eq!(results.len(), 5);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.item_index, i);
            assert_eq!(r.outcome.as_ref().unwrap()["echo"], format!("item {}", i));
        }
    }

    #[tokio::test]
    async fn malformed_item_fails_alone() {
        let (transport, exec) = executor(FailurePolicy::Continue);
        let items = vec![
            json!({"kind": "chat", "model": "meta/llama-3.1-8b-instruct",
                   "messages": [{"role": "user", "content": "one"}]}),
            json!({"kind": "completion", "model": "meta/llama-3.1-8b-instruct"}),
            json!({"kind": "chat", "model": "meta/llama-3.1-8b-instruct",
                   "messages": [{"role": "user", "content": "three"}]}),
        ];

        let results = exec.run(&items).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome.as_ref().unwrap()["echo"], "one");
        let err = results[1].outcome.as_ref().unwrap_err();
        assert_eq!(err.item_index, 1);
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(err.model_attempted.as_deref(), Some("meta/llama-3.1-8b-instruct"));
        assert!(err.message.contains("prompt"));
        assert_eq!(results[2].outcome.as_ref().unwrap()["echo"], "three");
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_item_aborts_under_abort_policy() {
        let (transport, exec) = executor(FailurePolicy::Abort);
        let items = vec![
            json!({"kind": "rerank"}),
            json!({"kind": "chat", "model": "meta/llama-3.1-8b-instruct",
                   "messages": [{"role": "user", "content": "two"}]}),
        ];

        let abort = exec.run(&items).await.unwrap_err();
        assert_eq!(abort.item_index, 0);
        assert_eq!(abort.source.kind(), FailureKind::Validation);
        assert_eq!(*transport.calls.lock().unwrap(), 0);
    }
}
