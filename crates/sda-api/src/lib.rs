//! Admin API (C4): the stateless HTTP surface in front of the File Store
//! and Broker Adapter (§4.4).
//!
//! All mutating endpoints publish a control message and let the worker
//! that consumes it perform the state transition (§9 "dual-write
//! coordination") — the API itself never writes a `FileEvent`.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

use std::sync::Arc;

use sda_broker::BrokerTransport;
use sda_core::{config::ApiConfig, traits::FileStore};

use auth::JwtVerifier;

/// Everything a handler needs, constructed once at startup and passed by
/// reference into every request (§9: "pass an explicit context... into
/// every handler; tests become straightforward").
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn FileStore>,
    pub broker: Arc<dyn BrokerTransport>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn FileStore>,
        broker: Arc<dyn BrokerTransport>,
        verifier: JwtVerifier,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            broker,
            verifier: Arc::new(verifier),
        }
    }

    pub fn is_admin(&self, sub: &str) -> bool {
        self.config.admins.iter().any(|admin| admin == sub)
    }
}
