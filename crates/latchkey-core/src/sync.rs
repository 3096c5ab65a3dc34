//! Cross-tab synchronization.
//!
//! Subscribes to the store's change notifications, keeps only those
//! originating in *other* browsing contexts (local writes never loop
//! back), and republishes the full durable snapshot as one atomic event,
//! so sibling tabs converge without ever observing a torn state.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::engine::SessionEngine;
use crate::service::AuthService;
use crate::store::{Origin, Scope};

/// Background task keeping this tab consistent with its siblings.
pub struct CrossTabSync {
    handle: JoinHandle<()>,
}

impl CrossTabSync {
    /// Spawns the synchronizer for `engine`. Dropping the returned handle
    /// stops it.
    pub fn spawn<S: AuthService + 'static>(engine: Arc<SessionEngine<S>>) -> Self {
        let mut rx = engine.store().subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if change.origin != Origin::External {
                            continue;
                        }
                        if !change.slots.iter().any(|slot| slot.scope() == Scope::Durable) {
                            continue;
                        }
                        let snapshot = engine.store().durable_snapshot();
                        tracing::debug!("cross-tab change; republishing durable snapshot");
                        engine.apply_external(snapshot).await;
                    }
                    // Missed notifications collapse into one snapshot
                    // re-read; the snapshot is always current.
                    Err(RecvError::Lagged(_)) => {
                        let snapshot = engine.store().durable_snapshot();
                        engine.apply_external(snapshot).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }
}

impl Drop for CrossTabSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
