use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use translate_balancer_core::logsink::LogBuffer;
use translate_balancer_core::translate::Backend;
use translate_balancer_core::{Balancer, TranslateRequest};

pub struct AppState<B> {
    balancer: Arc<Balancer<B>>,
    logs: LogBuffer,
}

impl<B> AppState<B> {
    pub fn new(balancer: Arc<Balancer<B>>, logs: LogBuffer) -> Self {
        Self { balancer, logs }
    }
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            balancer: Arc::clone(&self.balancer),
            logs: self.logs.clone(),
        }
    }
}

pub fn router<B>(state: AppState<B>) -> Router
where
    B: Backend + 'static,
{
    Router::new()
        .route("/translate", post(translate_handler::<B>))
        .route("/status", get(status_handler::<B>))
        .route("/logs", get(logs_handler::<B>))
        .with_state(state)
}

/// A zero response (every attempt failed) maps to 503 so HTTP callers can tell.
async fn translate_handler<B>(
    State(state): State<AppState<B>>,
    Json(request): Json<TranslateRequest>,
) -> impl IntoResponse
where
    B: Backend + 'static,
{
    let response = state.balancer.translate(&request).await;
    let status = if response.code == 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

async fn status_handler<B>(State(state): State<AppState<B>>) -> impl IntoResponse
where
    B: Backend + 'static,
{
    Json(state.balancer.status())
}

async fn logs_handler<B>(State(state): State<AppState<B>>) -> impl IntoResponse
where
    B: Backend + 'static,
{
    state.logs.contents()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::time::Duration;
    use tower::ServiceExt;
    use translate_balancer_core::config::{BalancerConfig, DispatchConfig, EndpointList};
    use translate_balancer_core::health::{ProbeError, Prober};
    use translate_balancer_core::translate::BackendError;
    use translate_balancer_core::TranslateResponse;

    struct ReverseBackend;

    impl Backend for ReverseBackend {
        fn translate<'a>(
            &'a self,
            _endpoint: &'a str,
            request: &'a TranslateRequest,
        ) -> BoxFuture<'a, Result<TranslateResponse, BackendError>> {
            async move {
                if request.text == "fail" {
                    return Ok(TranslateResponse::default());
                }
                Ok(TranslateResponse::ok(request.text.chars().rev().collect::<String>()))
            }
            .boxed()
        }
    }

    struct DownProber;

    impl Prober for DownProber {
        fn probe<'a>(&'a self, _endpoint: &'a str) -> BoxFuture<'a, Result<(), ProbeError>> {
            async { Err(ProbeError::Status(503)) }.boxed()
        }
    }

    fn app() -> (Router, LogBuffer) {
        let mut cfg = BalancerConfig::new(EndpointList::parse("http://a:1,http://b:2").unwrap());
        cfg.dispatch = DispatchConfig::new(Duration::from_millis(200), 1, 5).unwrap();
        let balancer = Arc::new(Balancer::start_with(cfg, ReverseBackend, DownProber).unwrap());
        let logs = LogBuffer::new(16);
        (router(AppState::new(balancer, logs.clone())), logs)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn translate_route_returns_backend_result() {
        let (app, _) = app();
        let request = Request::post("/translate")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"text":"abc","source_lang":"EN","target_lang":"DE"}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], 200);
        assert_eq!(body["data"], "cba");
    }

    #[tokio::test]
    async fn exhausted_translation_is_503_with_zero_body() {
        let (app, _) = app();
        let request = Request::post("/translate")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"text":"fail","sourceLang":"EN","targetLang":"DE"}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"], "");
    }

    #[tokio::test]
    async fn status_route_lists_endpoints() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["endpoints"].as_array().unwrap().len(), 2);
        assert_eq!(body["endpoints"][0]["address"], "http://a:1");
    }

    #[tokio::test]
    async fn logs_route_replays_buffer() {
        let (app, logs) = app();
        {
            use std::io::Write;
            use tracing_subscriber::fmt::MakeWriter;
            writeln!(logs.make_writer(), "endpoint http://a:1 is available again").unwrap();
        }
        let response = app
            .oneshot(Request::get("/logs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "endpoint http://a:1 is available again\n");
    }
}
