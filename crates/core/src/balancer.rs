//! Start/stop wrapper that wires registry, dispatch, facade and health monitor.

use crate::config::BalancerConfig;
use crate::dispatch::Dispatcher;
use crate::health::{HealthMonitor, HttpProber, ProbeError, Prober};
use crate::registry::{Registry, RegistryError, RegistrySnapshot};
use crate::service::{TranslateError, TranslateService};
use crate::translate::{Backend, BackendError, HttpBackend, TranslateRequest, TranslateResponse};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "balancer::lifecycle";

#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to build backend client: {0}")]
    Backend(#[from] BackendError),

    #[error("failed to build health probe client: {0}")]
    Probe(#[from] ProbeError),
}

pub struct Balancer<B> {
    registry: Arc<Registry>,
    service: TranslateService<B>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Balancer<HttpBackend> {
    /// Builds the HTTP backend and prober from `config` and starts the health monitor.
    /// Must be called inside a Tokio runtime.
    pub fn start(config: BalancerConfig) -> Result<Self, StartError> {
        let backend = HttpBackend::new(config.request_timeout)?;
        let prober = HttpProber::new(config.health.probe_timeout)?;
        Self::start_with(config, backend, prober)
    }
}

impl<B> Balancer<B>
where
    B: Backend + 'static,
{
    pub fn start_with<P>(config: BalancerConfig, backend: B, prober: P) -> Result<Self, StartError>
    where
        P: Prober + 'static,
    {
        let registry = Arc::new(Registry::new(config.endpoints.into_inner())?);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::new(backend), config.dispatch);
        let service = TranslateService::new(dispatcher, config.max_segment_len);

        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&registry), prober, config.health)
            .spawn(cancel.child_token());

        tracing::info!(
            target: LOG_TARGET,
            endpoints = registry.len(),
            max_segment_len = config.max_segment_len,
            "balancer started"
        );

        Ok(Self {
            registry,
            service,
            cancel,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    pub async fn translate(&self, request: &TranslateRequest) -> TranslateResponse {
        self.service.translate(request).await
    }

    pub async fn try_translate(
        &self,
        request: &TranslateRequest,
    ) -> Result<TranslateResponse, TranslateError> {
        self.service.try_translate(request).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn status(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops the health monitor and waits for it to exit. Safe to call twice.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.monitor.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(target: LOG_TARGET, error = %e, "health monitor task ended abnormally");
            }
            tracing::info!(target: LOG_TARGET, "balancer stopped");
        }
    }
}

impl<B> Drop for Balancer<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
