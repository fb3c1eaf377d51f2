pub mod balancer;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod logsink;
pub mod registry;
pub mod segment;
pub mod service;
pub mod translate;

pub use balancer::{Balancer, StartError};
pub use service::{TranslateError, TranslateService};
pub use translate::{TranslateRequest, TranslateResponse};
