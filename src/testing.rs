//! In-memory collaborators for exercising the pipeline without network,
//! database, or timers.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::completion::{Completion, CompletionError};
use crate::dispatch::{ChatSink, DispatchError, MailSink};
use crate::models::{ChatMessage, Newsletter, WorkLogRow};
use crate::store::{RowStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tabs: Arc<Mutex<BTreeMap<String, Vec<WorkLogRow>>>>,
    broken: HashSet<String>,
}

impl MemoryStore {
    pub fn with_rows(self, member: &str, rows: Vec<WorkLogRow>) -> Self {
        self.tabs.lock().unwrap().insert(member.to_string(), rows);
        self
    }

    /// Reads of this member fail with an I/O error.
    pub fn with_broken(mut self, member: &str) -> Self {
        self.broken.insert(member.to_string());
        self
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch(&self, member: &str) -> Result<Vec<WorkLogRow>, StoreError> {
        if self.broken.contains(member) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "backend unavailable",
            )));
        }
        self.tabs
            .lock()
            .unwrap()
            .get(member)
            .cloned()
            .ok_or_else(|| StoreError::TabNotFound(member.to_string()))
    }

    async fn create_tab(&self, member: &str) -> Result<(), StoreError> {
        self.tabs
            .lock()
            .unwrap()
            .entry(member.to_string())
            .or_default();
        Ok(())
    }

    async fn append_row(&self, member: &str, row: &WorkLogRow) -> Result<(), StoreError> {
        match self.tabs.lock().unwrap().get_mut(member) {
            Some(rows) => {
                rows.push(row.clone());
                Ok(())
            }
            None => Err(StoreError::TabNotFound(member.to_string())),
        }
    }
}

type Responder = dyn Fn(&str) -> Result<String, CompletionError> + Send + Sync;

/// Completion fake that answers through a closure and records prompts.
#[derive(Clone)]
pub struct ScriptedCompletion {
    responder: Arc<Responder>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedCompletion {
    pub fn replying(
        responder: impl Fn(&str) -> Result<String, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            prompts: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self::replying(|_| Err(CompletionError::Api("service unavailable".to_string())))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _temperature: Option<f64>,
    ) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.responder)(prompt)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingChat {
    posted: Arc<Mutex<Vec<ChatMessage>>>,
    fail: bool,
}

impl RecordingChat {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Messages that were accepted.
    pub fn posted(&self) -> Vec<ChatMessage> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn post(&self, message: &ChatMessage) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Status {
                status: 500,
                body: "webhook down".to_string(),
            });
        }
        self.posted.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingMail {
    sent: Arc<Mutex<Vec<Newsletter>>>,
    fail: bool,
}

impl RecordingMail {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Newsletter> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSink for RecordingMail {
    async fn send(&self, newsletter: &Newsletter) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::NoRecipients);
        }
        self.sent.lock().unwrap().push(newsletter.clone());
        Ok(())
    }
}
