// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Session Registry.
//!
//! Live session-affine sessions keyed by server-minted id. Lookup, minting
//! and insertion happen under one registry-wide mutex, so two requests
//! carrying the same id always land on the same session and two requests
//! carrying none never share one. The lock is never held across `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::SessionId;
use crate::engine_core::session::Session;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    draining: bool,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    created: AtomicU64,
    closed: AtomicU64,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.len())
            .field("created", &self.created_total())
            .field("closed", &self.closed_total())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere must not wedge every later request.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `requested` to a live session, or open and register a new one.
    ///
    /// `open` receives the freshly minted id and runs under the registry
    /// lock, so it must not block. Returns the session and whether it was
    /// created by this call.
    pub fn get_or_create<F>(
        &self,
        requested: Option<&str>,
        open: F,
    ) -> Result<(Arc<Session>, bool), GatewayError>
    where
        F: FnOnce(SessionId) -> Result<Session, GatewayError>,
    {
        let mut inner = self.lock();

        if let Some(id) = requested.and_then(|raw| raw.parse::<SessionId>().ok()) {
            if let Some(existing) = inner.sessions.get(&id) {
                if existing.is_active() {
                    return Ok((existing.clone(), false));
                }
                // Worker died underneath us; retire the entry.
                if let Some(stale) = inner.sessions.remove(&id) {
                    if stale.close() {
                        self.closed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        if inner.draining {
            return Err(GatewayError::ShuttingDown);
        }

        let mut id = SessionId::generate();
        while inner.sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        let session = Arc::new(open(id)?);
        inner.sessions.insert(id, session.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        info!(session_id = %id, active = inner.sessions.len(), "Session created");
        Ok((session, true))
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.lock().sessions.get(id).cloned()
    }

    /// Remove `id` and move it to `Closing`. Idempotent: only the first
    /// caller gets the session back.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut inner = self.lock();
        let session = inner.sessions.remove(id)?;
        if session.close() {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
        info!(session_id = %id, active = inner.sessions.len(), "Session removed");
        Some(session)
    }

    /// Snapshot of live sessions.
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    pub fn created_total(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn closed_total(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Stop accepting sessions, then close and await every live one.
    /// Returns how many this call closed.
    pub async fn drain(&self) -> usize {
        self.lock().draining = true;
        info!(active = self.len(), "Draining sessions");

        let mut drained = 0;
        while let Some(session) = self.take_one() {
            let reason = session.wait_closed().await;
            debug!(session_id = ?session.id(), reason = ?reason, "Session drained");
            drained += 1;
        }

        info!(drained, "Drain complete");
        drained
    }

    fn take_one(&self) -> Option<Arc<Session>> {
        let mut inner = self.lock();
        let id = inner.sessions.keys().next().copied()?;
        let session = inner.sessions.remove(&id)?;
        if session.close() {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
        Some(session)
    }
}
