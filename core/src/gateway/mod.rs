//! TLS gateway in front of a local generation backend.
//!
//! `GET /health` reports the configured model, `POST /translate` turns a
//! `{ text, target? }` request into a generation prompt and returns the
//! backend's answer as `{ ok, translated }`.

mod handlers;

pub use handlers::build_prompt;

use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use log::info;
use reqwest::Client;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::GatewaySettings;
use crate::substitution::{SubstitutionError, SubstitutionTable};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot read TLS material {path}: {source}")]
    Certificate {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TLS certificate or key: {0}")]
    Tls(String),
    #[error(transparent)]
    Substitutions(#[from] SubstitutionError),
    #[error("failed to build backend client: {0}")]
    Client(String),
    #[error("cannot resolve listen address {0}")]
    Address(String),
    #[error("gateway on {addr} stopped: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Shared by every request handler.
#[derive(Debug)]
pub struct GatewayState {
    client: Client,
    generate_url: String,
    model: String,
    substitutions: Option<SubstitutionTable>,
}

impl GatewayState {
    pub fn new(
        backend_url: &str,
        model: impl Into<String>,
        substitutions: Option<SubstitutionTable>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .build()
            .map_err(|err| GatewayError::Client(err.to_string()))?;
        Ok(Self {
            client,
            generate_url: format!("{}/api/generate", backend_url.trim_end_matches('/')),
            model: model.into(),
            substitutions,
        })
    }

    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, GatewayError> {
        let substitutions = match &settings.substitutions_file {
            Some(path) => {
                let table = SubstitutionTable::load(path)?;
                info!(
                    "loaded {} substitutions from {}",
                    table.len(),
                    path.to_string_lossy()
                );
                Some(table)
            }
            None => None,
        };
        Self::new(&settings.backend_url, settings.model.clone(), substitutions)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/translate", post(handlers::translate))
        .with_state(state)
}

fn ensure_readable(path: &Path) -> Result<(), GatewayError> {
    fs::read(path).map(|_| ()).map_err(|source| GatewayError::Certificate {
        path: path.to_string_lossy().into_owned(),
        source,
    })
}

/// Serves the gateway until the listener fails. Refuses to start without a
/// readable certificate and key.
pub async fn run_gateway(settings: &GatewaySettings) -> Result<(), GatewayError> {
    let (cert, key) = settings.tls_paths();
    ensure_readable(&cert)?;
    ensure_readable(&key)?;

    let state = Arc::new(GatewayState::from_settings(settings)?);

    // Fails only when a provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let tls = RustlsConfig::from_pem_file(&cert, &key)
        .await
        .map_err(|err| GatewayError::Tls(err.to_string()))?;

    let listen = format!("{}:{}", settings.host, settings.port);
    let addr = tokio::net::lookup_host(listen.as_str())
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| GatewayError::Address(listen.clone()))?;

    info!(
        "gateway listening on https://{} (model {}, backend {})",
        addr, settings.model, settings.backend_url
    );

    axum_server::bind_rustls(addr, tls)
        .serve(router(state).into_make_service())
        .await
        .map_err(|source| GatewayError::Bind { addr, source })
}
