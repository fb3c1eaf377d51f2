use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unhealthy status {0}")]
    Status(u16),
}

/// Lightweight reachability check against an endpoint address.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<(), ProbeError>>;
}

impl<P: Prober + ?Sized> Prober for Arc<P> {
    fn probe<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<(), ProbeError>> {
        (**self).probe(endpoint)
    }
}

/// Issues a `GET` against the endpoint. Any answer below 500 means the server is up,
/// since translate endpoints commonly reject `GET` with 404/405.
#[derive(Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<(), ProbeError>> {
        async move {
            let response = self.client.get(endpoint).send().await?;
            let status = response.status();
            if status.is_server_error() {
                return Err(ProbeError::Status(status.as_u16()));
            }
            Ok(())
        }
        .boxed()
    }
}
