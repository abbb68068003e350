//! Shared test helpers for controller tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use stepwise_core::agent::HumanInput;
use stepwise_core::error::{Error, ProviderError};
use stepwise_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, Usage};
use tokio::sync::mpsc;

/// One scripted model reply.
pub enum Reply {
    /// Stream these fragments, then the usage chunk (if any), then done
    Text {
        fragments: Vec<String>,
        usage: Option<Usage>,
    },
    /// Fail before any stream is returned
    Fail(ProviderError),
    /// Return a stream that never produces anything
    Stall,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Text {
            fragments: vec![text.to_string()],
            usage: None,
        }
    }

    pub fn fragments(parts: &[&str]) -> Self {
        Self::Text {
            fragments: parts.iter().map(|p| p.to_string()).collect(),
            usage: None,
        }
    }

    pub fn with_usage(self, total_tokens: u32) -> Self {
        match self {
            Self::Text { fragments, .. } => Self::Text {
                fragments,
                usage: Some(sample_usage(total_tokens)),
            },
            other => other,
        }
    }
}

pub fn sample_usage(total_tokens: u32) -> Usage {
    Usage {
        prompt_tokens: total_tokens.saturating_sub(5),
        completion_tokens: 5.min(total_tokens),
        total_tokens,
    }
}

/// A provider that plays back scripted replies in order and records every request.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
    stalled: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            stalled: Mutex::new(Vec::new()),
        }
    }

    /// One single-fragment reply per string.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::text(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            Some(Reply::Text { fragments, usage }) => {
                let (tx, rx) = mpsc::channel(fragments.len() + 2);
                for fragment in fragments {
                    tx.send(Ok(StreamChunk::text(fragment))).await.unwrap();
                }
                if let Some(usage) = usage {
                    tx.send(Ok(StreamChunk::usage(usage))).await.unwrap();
                }
                tx.send(Ok(StreamChunk::done())).await.unwrap();
                Ok(rx)
            }
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Stall) => {
                let (tx, rx) = mpsc::channel(1);
                self.stalled.lock().unwrap().push(tx);
                Ok(rx)
            }
            None => panic!(
                "ScriptedProvider: no more replies (call #{})",
                self.call_count()
            ),
        }
    }
}

/// Human input that plays back lines, then reports end of input.
pub struct ScriptedHuman {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedHuman {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
        }
    }
}

#[async_trait]
impl HumanInput for ScriptedHuman {
    async fn next_input(&self) -> Result<Option<String>, Error> {
        Ok(self.lines.lock().unwrap().pop_front())
    }
}
