//! Public translate entry point: chunk, fan out, reassemble.

use crate::dispatch::{DispatchError, Dispatcher};
use crate::segment::{char_len, split_text};
use crate::translate::{Backend, TranslateRequest, TranslateResponse};
use futures::future::join_all;

const LOG_TARGET: &str = "balancer::service";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Some segments came back empty. `response` still holds the reassembled text.
    #[error("{failed} of {total} segments failed")]
    PartialFailure {
        failed: usize,
        total: usize,
        response: TranslateResponse,
    },
}

pub struct TranslateService<B> {
    dispatcher: Dispatcher<B>,
    max_segment_len: usize,
}

impl<B> TranslateService<B>
where
    B: Backend + 'static,
{
    pub fn new(dispatcher: Dispatcher<B>, max_segment_len: usize) -> Self {
        Self {
            dispatcher,
            max_segment_len,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    /// Never fails outright: exhaustion yields the zero response and failed
    /// segments contribute empty text at their position.
    pub async fn translate(&self, request: &TranslateRequest) -> TranslateResponse {
        match self.try_translate(request).await {
            Ok(response) => response,
            Err(TranslateError::PartialFailure { response, .. }) => response,
            Err(TranslateError::Dispatch(_)) => TranslateResponse::default(),
        }
    }

    pub async fn try_translate(
        &self,
        request: &TranslateRequest,
    ) -> Result<TranslateResponse, TranslateError> {
        if char_len(&request.text) <= self.max_segment_len {
            return Ok(self.dispatcher.send(request).await?);
        }

        let parts = split_text(&request.text, self.max_segment_len);
        let total = parts.len();
        tracing::debug!(target: LOG_TARGET, segments = total, "dispatching segmented request");

        let segments: Vec<TranslateRequest> = parts.into_iter().map(|p| request.with_text(p)).collect();
        let results = join_all(segments.iter().map(|s| self.dispatcher.send(s))).await;

        let mut data = String::new();
        let mut failed = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(response) => data.push_str(&response.data),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(target: LOG_TARGET, segment = index, total, error = %e, "segment translation failed");
                }
            }
        }

        let response = TranslateResponse::ok(data);
        if failed > 0 {
            return Err(TranslateError::PartialFailure {
                failed,
                total,
                response,
            });
        }
        Ok(response)
    }
}
