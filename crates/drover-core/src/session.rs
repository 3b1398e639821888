//! Multi-turn sessions over spawn-per-turn CLIs.
//!
//! Conversational context lives entirely in the vendor CLI's own persisted
//! session store; a [`Session`] only threads the opaque session id through
//! resume flags on each message. The id is learned from the first response
//! (or pinned at creation) and never changes afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::agents::Adapter;
use crate::error::{Error, Result};
use crate::events::StreamEvent;
use crate::options::ExecutionOptions;
use crate::response::ExecutionResponse;

pub(crate) type SessionRegistry = Mutex<HashMap<String, Arc<Session>>>;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Point-in-time view of a session's progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub message_count: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Progress {
    session_id: Option<String>,
    message_count: u64,
    started_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
}

/// One logical conversation across repeated CLI invocations.
pub struct Session {
    adapter: Arc<Adapter>,
    registry: Weak<SessionRegistry>,
    me: Weak<Session>,
    aborted: AtomicBool,
    progress: Mutex<Progress>,
    /// Every canonical event from every send is forwarded here.
    events: broadcast::Sender<StreamEvent>,
}

impl Session {
    pub(crate) fn create(
        adapter: Arc<Adapter>,
        registry: Weak<SessionRegistry>,
        pinned_id: Option<String>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|me| Self {
            adapter,
            registry,
            me: me.clone(),
            aborted: AtomicBool::new(false),
            progress: Mutex::new(Progress {
                session_id: pinned_id,
                message_count: 0,
                started_at: Utc::now(),
                last_message_at: None,
            }),
            events,
        })
    }

    /// The vendor-assigned session id, once known.
    pub fn session_id(&self) -> Option<String> {
        self.lock_progress().session_id.clone()
    }

    /// Number of messages successfully sent so far.
    pub fn message_count(&self) -> u64 {
        self.lock_progress().message_count
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Snapshot of the session's progress.
    pub fn info(&self) -> SessionInfo {
        let progress = self.lock_progress();
        SessionInfo {
            session_id: progress.session_id.clone(),
            message_count: progress.message_count,
            started_at: progress.started_at,
            last_message_at: progress.last_message_at,
        }
    }

    /// Subscribe to every canonical event from every subsequent send.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Flag the session aborted. Cooperative: an in-flight send completes
    /// and delivers its result; later sends reject without spawning.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Send one message, threading session continuity through resume flags.
    pub async fn send(
        &self,
        prompt: &str,
        mut options: ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        if self.is_aborted() {
            return Err(Error::Session(
                "session is aborted; send() is no longer allowed".to_string(),
            ));
        }

        let (known_id, first_send) = {
            let progress = self.lock_progress();
            (progress.session_id.clone(), progress.message_count == 0)
        };
        options.session_id = known_id.clone();
        options.resume = !first_send && known_id.is_some();
        options.continue_conversation = false;

        // every event also goes to broadcast subscribers
        let mut caller_sink = options.on_event.take();
        let tx = self.events.clone();
        options.on_event = Some(Box::new(move |event: &StreamEvent| {
            let _ = tx.send(event.clone());
            if let Some(sink) = caller_sink.as_mut() {
                sink(event);
            }
        }));

        let response = self.adapter.execute(prompt, options).await?;

        // a resumed turn must keep reporting the id it was sent with
        if let (Some(expected), Some(reported)) = (&known_id, &response.session_id) {
            if expected != reported {
                return Err(Error::Session(format!(
                    "session id changed across resume: sent {expected}, got {reported}"
                )));
            }
        }

        let registered_id = {
            let mut progress = self.lock_progress();
            progress.message_count += 1;
            progress.last_message_at = Some(Utc::now());
            if progress.session_id.is_none() {
                progress.session_id = response.session_id.clone();
            }
            (first_send).then(|| progress.session_id.clone()).flatten()
        };

        // retrievable by id only after the first successful send
        if let Some(id) = registered_id {
            if let (Some(registry), Some(me)) = (self.registry.upgrade(), self.me.upgrade()) {
                if let Ok(mut sessions) = registry.lock() {
                    sessions.insert(id, me);
                }
            }
        }

        Ok(response)
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
