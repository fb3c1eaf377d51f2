//! Racing dispatch of one request across several endpoints.
//!
//! An attempt spawns up to `min(endpoints, max_workers)` workers. Each worker
//! picks an endpoint from the registry and issues one call; the first
//! successful response is handed over through a one-shot slot and cancels the
//! siblings. Attempts run sequentially up to `max_attempts`.

use crate::config::DispatchConfig;
use crate::registry::{Endpoint, Registry};
use crate::translate::{Backend, TranslateRequest, TranslateResponse};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "balancer::dispatch";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no endpoint produced a translation after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Single-use handoff for the winning response.
type ResultSlot = Arc<Mutex<Option<oneshot::Sender<Winner>>>>;

#[derive(Debug)]
struct Winner {
    endpoint: Arc<Endpoint>,
    response: TranslateResponse,
}

pub struct Dispatcher<B> {
    registry: Arc<Registry>,
    backend: Arc<B>,
    config: DispatchConfig,
}

impl<B> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            config: self.config,
        }
    }
}

impl<B> Dispatcher<B>
where
    B: Backend + 'static,
{
    pub fn new(registry: Arc<Registry>, backend: Arc<B>, config: DispatchConfig) -> Self {
        Self {
            registry,
            backend,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Sends one segment, retrying whole races until one succeeds or the
    /// attempt budget runs out.
    pub async fn send(&self, request: &TranslateRequest) -> Result<TranslateResponse, DispatchError> {
        let request = Arc::new(request.clone());
        for attempt in 1..=self.config.max_attempts {
            if let Some(winner) = self.race(&request, attempt).await {
                if attempt > 1 {
                    tracing::debug!(target: LOG_TARGET, attempt, "request succeeded after retry");
                }
                tracing::trace!(target: LOG_TARGET, endpoint = %winner.endpoint.address(), "race won");
                return Ok(winner.response);
            }
            tracing::debug!(
                target: LOG_TARGET,
                attempt,
                max_attempts = self.config.max_attempts,
                "attempt produced no translation"
            );
        }
        tracing::warn!(
            target: LOG_TARGET,
            attempts = self.config.max_attempts,
            "all attempts failed"
        );
        Err(DispatchError::Exhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Same as [`send`](Self::send) but folds exhaustion into the zero response.
    pub async fn send_or_empty(&self, request: &TranslateRequest) -> TranslateResponse {
        self.send(request).await.unwrap_or_default()
    }

    /// One attempt. Resolves with the first success, or `None` when the
    /// deadline passes or every worker has finished without one.
    async fn race(&self, request: &Arc<TranslateRequest>, attempt: u32) -> Option<Winner> {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(tx)));

        let workers = self.registry.len().min(self.config.max_workers);
        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            tasks.spawn(run_worker(
                Arc::clone(&self.registry),
                Arc::clone(&self.backend),
                Arc::clone(request),
                Arc::clone(&slot),
                cancel.clone(),
                attempt,
            ));
        }
        // Only workers hold the sender now, so `rx` errors once all of them are done.
        drop(slot);

        let outcome = tokio::select! {
            res = rx => res.ok(),
            _ = tokio::time::sleep(self.config.attempt_timeout) => {
                tracing::debug!(target: LOG_TARGET, attempt, "attempt deadline elapsed");
                None
            }
        };

        cancel.cancel();
        tasks.detach_all();
        outcome
    }
}

async fn run_worker<B: Backend>(
    registry: Arc<Registry>,
    backend: Arc<B>,
    request: Arc<TranslateRequest>,
    slot: ResultSlot,
    cancel: CancellationToken,
    attempt: u32,
) {
    let endpoint = match registry.select_available() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::debug!(target: LOG_TARGET, attempt, error = %e, "worker found no endpoint");
            return;
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = backend.translate(endpoint.address(), &request) => result,
    };

    match result {
        Ok(response) if response.is_success() => {
            let sender = slot.lock().take();
            match sender {
                Some(tx) if !cancel.is_cancelled() => {
                    if tx.send(Winner { endpoint, response }).is_ok() {
                        cancel.cancel();
                    }
                }
                _ => {
                    tracing::trace!(target: LOG_TARGET, endpoint = %endpoint.address(), "late success discarded");
                }
            }
        }
        Ok(response) => {
            tracing::warn!(
                target: LOG_TARGET,
                endpoint = %endpoint.address(),
                code = response.code,
                attempt,
                "backend returned an unusable result, marking endpoint unavailable"
            );
            registry.mark_unavailable(&endpoint);
        }
        Err(e) => {
            tracing::debug!(
                target: LOG_TARGET,
                endpoint = %endpoint.address(),
                attempt,
                error = %e,
                "backend request failed"
            );
        }
    }
}
