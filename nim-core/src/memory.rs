//! Conversation memory contract.
//!
//! The agent loop reads prior turns once at start and appends the final
//! input/output pair when a run completes. Storage is the implementor's
//! concern; [`BufferMemory`] keeps a bounded window in process.

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::Message;

#[async_trait]
pub trait ChatMemory: Send + Sync {
    /// Prior turns, oldest first.
    async fn history(&self) -> Result<Vec<Message>>;

    /// Record one completed exchange.
    async fn append_turn(&self, input: &str, output: &str) -> Result<()>;
}

/// In-process memory holding the last `window` exchanges.
pub struct BufferMemory {
    window: usize,
    turns: Mutex<VecDeque<(String, String)>>,
}

impl BufferMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            turns: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn clear(&self) {
        self.turns.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.len()
    }
}

impl Default for BufferMemory {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl ChatMemory for BufferMemory {
    async fn history(&self) -> Result<Vec<Message>> {
        let turns = self.turns.lock().await;
        Ok(turns
            .iter()
            .flat_map(|(input, output)| [Message::user(input.clone()), Message::assistant(output.clone())])
            .collect())
    }

    async fn append_turn(&self, input: &str, output: &str) -> Result<()> {
        let mut turns = self.turns.lock().await;
        turns.push_back((input.to_string(), output.to_string()));
        while turns.len() > self.window {
            turns.pop_front();
        }
        Ok(())
    }
}
