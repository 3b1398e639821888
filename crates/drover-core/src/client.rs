//! Client facade: one vendor CLI, client-level defaults, session registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::agents::{Adapter, AgentKind, Capabilities};
use crate::error::{Error, Result};
use crate::options::ExecutionOptions;
use crate::response::ExecutionResponse;
use crate::session::{Session, SessionInfo, SessionRegistry};

/// Entry point for callers: stateless `execute()` plus session management.
///
/// Client-level defaults (working directory, verbosity, audit directory) are
/// merged beneath call-level options; the call always wins.
pub struct AgentClient {
    adapter: Arc<Adapter>,
    working_dir: Option<PathBuf>,
    verbose: bool,
    log_dir: Option<PathBuf>,
    sessions: Arc<SessionRegistry>,
}

impl AgentClient {
    /// Build a client for `kind`, resolving its binary on PATH.
    pub fn new(kind: AgentKind) -> Result<Self> {
        Ok(Self::from_adapter(Adapter::new(kind)?))
    }

    /// Build a client around an already-constructed adapter.
    pub fn from_adapter(adapter: Adapter) -> Self {
        Self {
            adapter: Arc::new(adapter),
            working_dir: None,
            verbose: false,
            log_dir: None,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.adapter.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    /// Stateless single-shot execution with defaults applied.
    pub async fn execute(
        &self,
        prompt: &str,
        mut options: ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        self.apply_defaults(&mut options);
        self.adapter.execute(prompt, options).await
    }

    /// Start a fresh session. The session becomes retrievable by id only
    /// after its first successful send, since the id is unknown before then.
    pub fn create_session(&self) -> Result<Arc<Session>> {
        self.create_session_inner(None)
    }

    /// Start a session pinned to a caller-chosen id.
    pub fn create_session_with_id(&self, id: impl Into<String>) -> Result<Arc<Session>> {
        self.create_session_inner(Some(id.into()))
    }

    fn create_session_inner(&self, pinned_id: Option<String>) -> Result<Arc<Session>> {
        if !self.capabilities().session_management {
            return Err(Error::Validation(format!(
                "{} does not support session management",
                self.kind().binary_name()
            )));
        }
        Ok(Session::create(
            Arc::clone(&self.adapter),
            Arc::downgrade(&self.sessions),
            pinned_id,
        ))
    }

    /// Look up a registered session by id.
    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.lock_sessions().get(id).cloned()
    }

    /// Flag the session aborted and evict it from the registry.
    /// Returns false when no session with that id is registered.
    pub fn abort_session(&self, id: &str) -> bool {
        let removed = self.lock_sessions().remove(id);
        match removed {
            Some(session) => {
                session.abort();
                true
            }
            None => false,
        }
    }

    /// Point-in-time snapshot of all registered sessions.
    pub fn list_active_sessions(&self) -> Vec<SessionInfo> {
        self.lock_sessions()
            .values()
            .map(|session| session.info())
            .collect()
    }

    fn apply_defaults(&self, options: &mut ExecutionOptions) {
        if options.working_dir.is_none() {
            options.working_dir = self.working_dir.clone();
        }
        if options.log_dir.is_none() {
            options.log_dir = self.log_dir.clone();
        }
        options.verbose |= self.verbose;
    }

    fn lock_sessions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
