//! Image upload gallery with Gemini-generated captions, backed by Google
//! Cloud Storage.

use std::sync::Arc;

pub mod captioner;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod secrets;
pub mod storage;
pub mod templates;

pub use routes::create_router;

use captioner::Captioner;
use config::Config;
use storage::ObjectStoreGateway;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when no bucket is configured.
    pub storage: Option<ObjectStoreGateway>,
    pub captioner: Arc<dyn Captioner>,
}
