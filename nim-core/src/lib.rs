//! # NIM Relay Core
//!
//! Request normalization, sequential batch execution with per-item failure
//! isolation, and a bounded tool-calling agent loop for OpenAI-compatible
//! NVIDIA NIM endpoints. HTTP lives behind the [`Transport`] trait.

pub mod agent_loop;
pub mod batch;
pub mod config;
pub mod error;
pub mod memory;
pub mod messages;
pub mod model_resolver;
pub mod options;
pub mod provider;
pub mod request;
pub mod retry;
pub mod tool;
pub mod tool_schema;
pub mod transport;
pub mod types;

// Re-export key types
pub use agent_loop::{run_agent_batch, run_agent_loop, AgentBatchItem, AgentLoopConfig, AgentOutput, AgentStep};
pub use batch::{BatchAbort, BatchExecutor, ErrorRecord, ExecutionResult, FailurePolicy};
pub use config::NimConfig;
pub use error::{AgentError, FailureKind, NimError};
pub use memory::{BufferMemory, ChatMemory};
pub use model_resolver::{list_models, resolve_model, CatalogVariant, ModelList, ModelOption, ModelRef};
pub use provider::{LlmProvider, LlmResponse, ModelInfo, StopReason, TokenUsage};
pub use request::{PreparedRequest, RequestKind};
pub use tool::{FnTool, Tool, ToolBox};
pub use transport::{Credentials, Endpoint, Transport};
pub use types::{Message, MessageContent, Role, ToolCallRequest, ToolCallResult, ToolDefinition};
