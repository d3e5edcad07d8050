//! HTTP surface of the gateway

pub mod error;
pub mod forms;
pub mod routes;

pub use error::{ApiError, FieldError, Location};
pub use forms::{FormOrJson, TransferForm};
pub use routes::api_routes;

use std::sync::Arc;

use crate::qr::{ImageQrDecoder, QrDecoder};
use crate::session::Session;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub qr_decoder: Arc<dyn QrDecoder>,
}

impl AppState {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            qr_decoder: Arc::new(ImageQrDecoder),
        }
    }

    pub fn with_qr_decoder(mut self, decoder: Arc<dyn QrDecoder>) -> Self {
        self.qr_decoder = decoder;
        self
    }
}
