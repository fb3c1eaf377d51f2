mod http;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use http::HttpBackend;

pub const SUCCESS_CODE: i64 = 200;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(alias = "sourceLang")]
    pub source_lang: String,
    #[serde(alias = "targetLang")]
    pub target_lang: String,
}

impl TranslateRequest {
    pub fn new<T, S, D>(text: T, source_lang: S, target_lang: D) -> Self
    where
        T: Into<String>,
        S: Into<String>,
        D: Into<String>,
    {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    /// Copy of this request carrying a different text; used for segments.
    pub fn with_text<T: Into<String>>(&self, text: T) -> Self {
        Self {
            text: text.into(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        }
    }
}

/// Response shape shared by the backends and the facade.
///
/// `Default` is the zero value (`code` 0, empty `data`) returned when every attempt failed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslateResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: String,
}

impl TranslateResponse {
    pub fn ok<S: Into<String>>(data: S) -> Self {
        Self {
            code: SUCCESS_CODE,
            data: data.into(),
        }
    }

    /// A 200 code alone is not enough: empty `data` counts as a failed translation.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE && !self.data.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One remote translate call against a specific endpoint.
///
/// `Err` is a transport-level failure. An `Ok` response that is not
/// [`TranslateResponse::is_success`] means the endpoint answered but failed.
pub trait Backend: Send + Sync {
    fn translate<'a>(
        &'a self,
        endpoint: &'a str,
        request: &'a TranslateRequest,
    ) -> BoxFuture<'a, Result<TranslateResponse, BackendError>>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn translate<'a>(
        &'a self,
        endpoint: &'a str,
        request: &'a TranslateRequest,
    ) -> BoxFuture<'a, Result<TranslateResponse, BackendError>> {
        (**self).translate(endpoint, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_code_and_data() {
        assert!(TranslateResponse::ok("hola").is_success());
        assert!(!TranslateResponse::ok("").is_success());
        assert!(!TranslateResponse {
            code: 500,
            data: "hola".to_owned()
        }
        .is_success());
        assert!(!TranslateResponse::default().is_success());
    }

    #[test]
    fn request_accepts_both_field_spellings() {
        let snake: TranslateRequest = serde_json::from_str(
            r#"{"text":"hi","source_lang":"EN","target_lang":"DE"}"#,
        )
        .unwrap();
        let camel: TranslateRequest =
            serde_json::from_str(r#"{"text":"hi","sourceLang":"EN","targetLang":"DE"}"#).unwrap();
        assert_eq!(snake, camel);
        assert_eq!(snake, TranslateRequest::new("hi", "EN", "DE"));
    }

    #[test]
    fn response_tolerates_missing_and_extra_fields() {
        let resp: TranslateResponse =
            serde_json::from_str(r#"{"code":200,"data":"hallo","id":7,"alternatives":[]}"#)
                .unwrap();
        assert_eq!(resp, TranslateResponse::ok("hallo"));

        let resp: TranslateResponse = serde_json::from_str(r#"{"code":429}"#).unwrap();
        assert_eq!(resp.data, "");
    }

    #[test]
    fn segment_copies_keep_languages() {
        let req = TranslateRequest::new("long text", "EN", "JA");
        let part = req.with_text("part");
        assert_eq!(part.text, "part");
        assert_eq!(part.source_lang, "EN");
        assert_eq!(part.target_lang, "JA");
    }
}
