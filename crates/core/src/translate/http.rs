use crate::translate::{Backend, BackendError, TranslateRequest, TranslateResponse};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use std::time::Duration;

/// Posts translate requests as JSON to backend endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Backend for HttpBackend {
    fn translate<'a>(
        &'a self,
        endpoint: &'a str,
        request: &'a TranslateRequest,
    ) -> BoxFuture<'a, Result<TranslateResponse, BackendError>> {
        async move {
            let response = self.client.post(endpoint).json(request).send().await?;

            // The endpoint answered; a non-2xx status is a failed result, not a transport error.
            let status = response.status();
            if !status.is_success() {
                return Ok(TranslateResponse {
                    code: i64::from(status.as_u16()),
                    data: String::new(),
                });
            }

            let body = response.bytes().await?;
            serde_json::from_slice::<TranslateResponse>(&body)
                .map_err(|e| BackendError::InvalidResponse(format!("failed to parse JSON: {e}")))
        }
        .boxed()
    }
}
