//! Agentic Tool Loop
//!
//! Core loop: prompt → LLM → if tool calls, execute tools → feed results
//! back → repeat until the model answers without tool calls or the
//! iteration cap is reached.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::batch::{execute_sequential, BatchAbort, ExecutionResult, FailurePolicy};
use crate::error::{AgentError, NimError, Result};
use crate::memory::ChatMemory;
use crate::provider::{LlmProvider, TokenUsage};
use crate::tool::ToolBox;
use crate::types::{Message, MessageContent, Role, ToolCallRequest, ToolCallResult};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful AI assistant powered by NVIDIA NIM. Use available tools when needed to provide accurate answers.";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const MAX_ITERATIONS_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Maximum prompting cycles before the run fails (1..=50, default 10).
    pub max_iterations: usize,
    /// Return the tool-call trace with the output.
    pub return_intermediate_steps: bool,
    pub system_message: String,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            return_intermediate_steps: false,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }
}

impl AgentLoopConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITERATIONS_LIMIT).contains(&self.max_iterations) {
            return Err(NimError::validation(format!(
                "max_iterations must be between 1 and {}, got {}",
                MAX_ITERATIONS_LIMIT, self.max_iterations
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run state and output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Prompting,
    ToolCallRequested,
    ToolExecuting,
    Done,
    Failed,
}

fn transition(state: &mut LoopState, next: LoopState, iteration: usize) {
    debug!(from = ?*state, to = ?next, iteration, "agent state transition");
    *state = next;
}

/// One tool call and its observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(rename = "action")]
    pub tool_name: String,
    #[serde(rename = "input")]
    pub tool_input: Value,
    #[serde(rename = "output")]
    pub observation: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetadata {
    pub model: String,
    #[serde(rename = "memoryUsed")]
    pub memory_used: bool,
    #[serde(rename = "toolsAvailable")]
    pub tools_available: Vec<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutput {
    pub output: String,
    pub iterations: usize,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    #[serde(rename = "intermediateSteps", skip_serializing_if = "Option::is_none")]
    pub intermediate_steps: Option<Vec<AgentStep>>,
    pub metadata: AgentMetadata,
    #[serde(skip)]
    pub usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// Agent loop
// ---------------------------------------------------------------------------

/// Run the agentic tool loop for one input.
///
/// The conversation starts as `[system, ...history, user]`. Each prompting
/// cycle sends the conversation and tool descriptors to the provider. A
/// request for an unknown tool is answered with an error observation and
/// the loop continues; a tool that fails ends the run.
pub async fn run_agent_loop(
    provider: Arc<dyn LlmProvider>,
    tools: &ToolBox,
    memory: Option<&dyn ChatMemory>,
    input: &str,
    config: &AgentLoopConfig,
) -> Result<AgentOutput> {
    config.validate()?;
    if input.trim().is_empty() {
        return Err(NimError::validation(
            "text is required and must be a non-empty string",
        ));
    }

    let started = Instant::now();
    let model = provider.model_info().name;
    let definitions = tools.definitions();

    let history = match memory {
        Some(mem) => match mem.history().await {
            Ok(history) => history,
            Err(e) => {
                warn!(err = %e, "failed to load memory, continuing without history");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let mut conversation = Vec::with_capacity(history.len() + 2);
    conversation.push(Message::system(config.system_message.clone()));
    conversation.extend(history);
    conversation.push(Message::user(input));

    let mut steps: Vec<AgentStep> = Vec::new();
    let mut usage = TokenUsage::default();
    let mut state = LoopState::Prompting;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;
        info!(
            iteration = iterations,
            tool_count = definitions.len(),
            message_count = conversation.len(),
            "calling LLM provider"
        );

        let response = match provider.complete(&conversation, &definitions).await {
            Ok(r) => r,
            Err(e) => {
                transition(&mut state, LoopState::Failed, iterations);
                return Err(NimError::Transport(e));
            }
        };
        usage.accumulate(&response.usage);

        if response.tool_calls.is_empty() {
            transition(&mut state, LoopState::Done, iterations);
            let output = response.content;
            if let Some(mem) = memory {
                if let Err(e) = mem.append_turn(input, &output).await {
                    warn!(err = %e, "failed to save memory turn");
                }
            }
            info!(iterations, steps = steps.len(), "agent run finished");
            return Ok(AgentOutput {
                output,
                iterations,
                execution_time_ms: started.elapsed().as_millis() as u64,
                intermediate_steps: config.return_intermediate_steps.then_some(steps),
                metadata: AgentMetadata {
                    model,
                    memory_used: memory.is_some(),
                    tools_available: tools.names(),
                },
                usage,
            });
        }

        transition(&mut state, LoopState::ToolCallRequested, iterations);

        // Providers reject null arguments on replay
        let calls: Vec<ToolCallRequest> = response
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                arguments: if call.arguments.is_null() {
                    json!({})
                } else {
                    call.arguments
                },
                ..call
            })
            .collect();

        conversation.push(Message {
            role: Role::Assistant,
            content: MessageContent::ToolCalls {
                text: (!response.content.is_empty()).then(|| response.content.clone()),
                calls: calls.clone(),
            },
        });

        transition(&mut state, LoopState::ToolExecuting, iterations);
        for call in calls {
            let (observation, is_error) = match tools.get(&call.name) {
                None => {
                    let err = AgentError::ToolNotFound {
                        name: call.name.clone(),
                    };
                    warn!(tool = %call.name, "model requested unknown tool");
                    (Value::String(err.to_string()), true)
                }
                Some(tool) => {
                    info!(tool = %call.name, id = %call.id, "executing tool call");
                    match tool.invoke(call.arguments.clone()).await {
                        Ok(value) => (value, false),
                        Err(e) => {
                            transition(&mut state, LoopState::Failed, iterations);
                            return Err(AgentError::ToolFailed {
                                name: call.name,
                                message: format!("{:#}", e),
                            }
                            .into());
                        }
                    }
                }
            };

            let content = match &observation {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            conversation.push(Message::tool_result(ToolCallResult {
                tool_call_id: call.id.clone(),
                tool_name: Some(call.name.clone()),
                content,
                is_error,
            }));
            steps.push(AgentStep {
                tool_name: call.name,
                tool_input: call.arguments,
                observation,
            });
        }

        transition(&mut state, LoopState::Prompting, iterations);
    }

    transition(&mut state, LoopState::Failed, iterations);
    warn!(
        iterations,
        max = config.max_iterations,
        "agent loop hit iteration limit"
    );
    Err(AgentError::IterationLimit {
        max_iterations: config.max_iterations,
    }
    .into())
}

// ---------------------------------------------------------------------------
// Agent batch
// ---------------------------------------------------------------------------

/// One agent work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBatchItem {
    pub text: String,
}

impl AgentBatchItem {
    pub fn from_value(raw: &Value) -> Result<Self> {
        AgentBatchItem::deserialize(raw)
            .map_err(|e| NimError::validation(format!("invalid agent item: {}", e)))
    }
}

/// Run the agent once per raw item, isolating failures like any other batch.
/// Items are parsed in their own slot.
pub async fn run_agent_batch(
    provider: Arc<dyn LlmProvider>,
    tools: &ToolBox,
    memory: Option<&dyn ChatMemory>,
    items: &[Value],
    config: &AgentLoopConfig,
    policy: FailurePolicy,
) -> std::result::Result<Vec<ExecutionResult>, BatchAbort> {
    let model = provider.model_info().name;
    execute_sequential(
        policy,
        items,
        |_| Some(model.clone()),
        |_, item| {
            let provider = provider.clone();
            async move {
                let item = AgentBatchItem::from_value(item)?;
                let out = run_agent_loop(provider, tools, memory, &item.text, config).await?;
                serde_json::to_value(&out).map_err(|e| NimError::Transport(e.into()))
            }
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::memory::BufferMemory;
    use crate::provider::{LlmResponse, ModelInfo, StopReason};
    use crate::tool::FnTool;
    use crate::types::ToolDefinition;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::Mutex;

    struct MockProvider {
        responses: Mutex<Vec<LlmResponse>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl MockProvider {
        fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> anyhow::Result<LlmResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(text("done"))
            } else {
                Ok(responses.remove(0))
            }
        }
        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "mock/model".into(),
                provider_name: "mock".into(),
            }
        }
    }

    fn text(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.into(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
        }
    }

    fn tool_call(name: &str, arguments: Value) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "tc1".into(),
                name: name.into(),
                arguments,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }

    fn calculator() -> ToolBox {
        ToolBox::new().with(Arc::new(FnTool::new(
            ToolDefinition {
                name: "calculator".into(),
                description: "Adds numbers".into(),
                parameters: json!({"type": "object"}),
            },
            Arc::new(|input: Value| {
                async move {
                    let a = input["a"].as_i64().unwrap_or(0);
                    let b = input["b"].as_i64().unwrap_or(0);
                    Ok::<_, anyhow::Error>(json!(a + b))
                }
                .boxed()
            }),
        )))
    }

    fn failing_tool() -> ToolBox {
        ToolBox::new().with(Arc::new(FnTool::new(
            ToolDefinition {
                name: "flaky".into(),
                description: "Always fails".into(),
                parameters: json!({"type": "object"}),
            },
            Arc::new(|_: Value| async { Err::<Value, _>(anyhow::anyhow!("disk full")) }.boxed()),
        )))
    }

    #[tokio::test]
    async fn single_turn_no_tools() {
        let provider = MockProvider::new(vec![text("Hello!")]);
        let out = run_agent_loop(
            provider.clone(),
            &ToolBox::new(),
            None,
            "Hi",
            &AgentLoopConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.output, "Hello!");
        assert_eq!(out.iterations, 1);
        assert!(out.intermediate_steps.is_none());
        assert_eq!(out.usage.total_tokens, 15);
        assert_eq!(out.metadata.model, "mock/model");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0][0].content.as_text(), Some(DEFAULT_SYSTEM_MESSAGE));
        assert_eq!(seen[0][1].content.as_text(), Some("Hi"));
    }

    #[tokio::test]
    async fn tool_round_trip_with_steps() {
        let provider = MockProvider::new(vec![
            tool_call("calculator", json!({"a": 2, "b": 3})),
            text("The answer is 5"),
        ]);
        let config = AgentLoopConfig {
            return_intermediate_steps: true,
            ..Default::default()
        };

        let out = run_agent_loop(provider.clone(), &calculator(), None, "2+3?", &config)
            .await
            .unwrap();

        assert_eq!(out.output, "The answer is 5");
        assert_eq!(out.iterations, 2);
        let steps = out.intermediate_steps.clone().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool_name, "calculator");
        assert_eq!(steps[0].observation, json!(5));

        let seen = provider.seen.lock().unwrap();
        let last = seen[1].last().unwrap();
        assert_eq!(last.role, Role::Tool);
        match &last.content {
            MessageContent::ToolResult(r) => {
                assert_eq!(r.tool_call_id, "tc1");
                assert_eq!(r.content, "5");
                assert!(!r.is_error);
            }
            other => panic!("expected tool result, got {:?}", other),
        }

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["intermediateSteps"][0]["action"], "calculator");
        assert_eq!(json["intermediateSteps"][0]["input"], json!({"a": 2, "b": 3}));
        assert_eq!(json["intermediateSteps"][0]["output"], json!(5));
        assert!(json["executionTime"].is_u64());
        assert_eq!(json["metadata"]["toolsAvailable"], json!(["calculator"]));
        assert_eq!(json["metadata"]["memoryUsed"], false);
        assert!(json["metadata"].get("tools_available").is_none());
    }

    #[tokio::test]
    async fn text_alongside_tool_calls_stays_in_one_turn() {
        let mut with_text = tool_call("calculator", json!({"a": 1, "b": 1}));
        with_text.content = "Let me add those.".into();
        let provider = MockProvider::new(vec![with_text, text("2")]);

        run_agent_loop(provider.clone(), &calculator(), None, "1+1?", &AgentLoopConfig::default())
            .await
            .unwrap();

        let seen = provider.seen.lock().unwrap();
        // system, user, assistant(text + calls), tool
        assert_eq!(seen[1].len(), 4);
        let assistant_turns: Vec<_> = seen[1].iter().filter(|m| m.role == Role::Assistant).collect();
        assert_eq!(assistant_turns.len(), 1);
        match &assistant_turns[0].content {
            MessageContent::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me add those."));
                assert_eq!(calls[0].name, "calculator");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_observation() {
        let provider = MockProvider::new(vec![tool_call("nope", Value::Null), text("sorry")]);
        let out = run_agent_loop(
            provider.clone(),
            &calculator(),
            None,
            "go",
            &AgentLoopConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.output, "sorry");
        let seen = provider.seen.lock().unwrap();
        let calls_msg = &seen[1][seen[1].len() - 2];
        match &calls_msg.content {
            MessageContent::ToolCalls { calls, .. } => assert_eq!(calls[0].arguments, json!({})),
            other => panic!("expected tool calls, got {:?}", other),
        }
        match &seen[1].last().unwrap().content {
            MessageContent::ToolResult(r) => {
                assert!(r.is_error);
                assert!(r.content.contains("'nope' is not available"));
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn iteration_cap_is_never_exceeded() {
        let provider = MockProvider::new(
            (0..5).map(|_| tool_call("calculator", json!({}))).collect(),
        );
        let config = AgentLoopConfig {
            max_iterations: 2,
            ..Default::default()
        };

        let err = run_agent_loop(provider.clone(), &calculator(), None, "loop", &config)
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 2);
        assert!(matches!(
            err,
            NimError::Agent(AgentError::IterationLimit { max_iterations: 2 })
        ));
    }

    #[tokio::test]
    async fn tool_failure_is_terminal() {
        let provider = MockProvider::new(vec![tool_call("flaky", json!({}))]);
        let err = run_agent_loop(
            provider.clone(),
            &failing_tool(),
            None,
            "go",
            &AgentLoopConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "tool 'flaky' failed: disk full");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn rejects_blank_input_and_bad_config() {
        let provider = MockProvider::new(vec![]);
        let err = run_agent_loop(
            provider.clone(),
            &ToolBox::new(),
            None,
            "  ",
            &AgentLoopConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "text is required and must be a non-empty string");

        let config = AgentLoopConfig {
            max_iterations: 51,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = AgentLoopConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(run_agent_loop(provider.clone(), &ToolBox::new(), None, "hi", &config)
            .await
            .is_err());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn memory_is_read_then_updated() {
        let memory = BufferMemory::new(5);
        memory.append_turn("earlier", "noted").await.unwrap();

        let provider = MockProvider::new(vec![text("now")]);
        let out = run_agent_loop(
            provider.clone(),
            &ToolBox::new(),
            Some(&memory),
            "again",
            &AgentLoopConfig::default(),
        )
        .await
        .unwrap();

        assert!(out.metadata.memory_used);
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 4);
        assert_eq!(seen[0][1].content.as_text(), Some("earlier"));
        assert_eq!(seen[0][2].content.as_text(), Some("noted"));

        let history = memory.history().await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].content.as_text(), Some("now"));
    }

    #[tokio::test]
    async fn agent_batch_isolates_failed_items() {
        let provider = MockProvider::new(vec![text("first")]);
        let items = vec![
            json!({"text": "a"}),
            json!({"text": " "}),
            json!({"text": "c"}),
        ];

        let results = run_agent_batch(
            provider,
            &ToolBox::new(),
            None,
            &items,
            &AgentLoopConfig::default(),
            FailurePolicy::Continue,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome.as_ref().unwrap()["output"], "first");
        let err = results[1].outcome.as_ref().unwrap_err();
        assert_eq!(err.model_attempted.as_deref(), Some("mock/model"));
        assert_eq!(results[2].outcome.as_ref().unwrap()["output"], "done");
    }

    #[tokio::test]
    async fn agent_batch_malformed_item_fails_alone() {
        let provider = MockProvider::new(vec![text("first"), text("third")]);
        let items = vec![json!({"text": "a"}), json!({"prompt": "b"}), json!({"text": "c"})];

        let results = run_agent_batch(
            provider.clone(),
            &ToolBox::new(),
            None,
            &items,
            &AgentLoopConfig::default(),
            FailurePolicy::Continue,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        let err = results[1].outcome.as_ref().unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert!(err.message.contains("text"));
        assert_eq!(results[2].outcome.as_ref().unwrap()["output"], "third");
        assert_eq!(provider.calls(), 2);
    }
}
