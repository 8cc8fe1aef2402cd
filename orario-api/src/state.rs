use std::sync::Arc;

use orario_booking::BookingEngine;
use orario_store::EventProducer;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub events: Arc<EventProducer>,
    pub auth: AuthConfig,
}
