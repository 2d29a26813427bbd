pub mod admission;
mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod errors;
pub mod mutation;
pub mod patch;
pub mod tracing;

use std::{net::SocketAddr, sync::Arc};

use ::tracing::{info, warn};
use anyhow::{Result, anyhow};
use axum::{
    Router,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::trace::{self, TraceLayer};

use crate::api::{
    handlers::{mutate_handler, not_found_handler, readiness_handler, root_handler},
    state::ApiServerState,
};
use crate::certs::create_tls_config_and_watch_certificate_changes;
use crate::config::{ClusterCredentials, Config};
use crate::mutation::MutationHandler;

pub struct WebhookServer {
    router: Router,
    addr: SocketAddr,
    tls_config: Option<RustlsConfig>,
}

impl WebhookServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        match &config.cluster_credentials {
            ClusterCredentials::InCluster => {
                info!("cluster credentials: in-cluster service account")
            }
            ClusterCredentials::Kubeconfig(path) => {
                info!(kubeconfig = %path.display(), "cluster credentials: kubeconfig file")
            }
        }

        let mutation_handler = Arc::new(MutationHandler::new(config.mutation_settings()));
        info!(
            mutation_timeout_seconds = ?config.mutation_timeout_seconds,
            "mutation handler ready"
        );

        let tls_config = match config.tls_config {
            Some(tls_config) => {
                Some(create_tls_config_and_watch_certificate_changes(tls_config).await?)
            }
            None => {
                warn!("no TLS certificate provided, serving plain HTTP");
                None
            }
        };

        Ok(Self {
            router: router(mutation_handler),
            addr: config.addr,
            tls_config,
        })
    }

    pub async fn run(self) -> Result<()> {
        info!(address = %self.addr, tls = self.tls_config.is_some(), "started webhook server");

        let service = self.router.into_make_service();
        let served = match self.tls_config {
            Some(tls_config) => {
                axum_server::bind_rustls(self.addr, tls_config)
                    .serve(service)
                    .await
            }
            None => axum_server::bind(self.addr).serve(service).await,
        };

        served.map_err(|e| anyhow!("webhook server failed on {}: {e}", self.addr))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Routes exposed by the webhook.
pub fn router(mutation_handler: Arc<MutationHandler>) -> Router {
    let state = Arc::new(ApiServerState { mutation_handler });

    Router::new()
        .route("/", get(root_handler).post(root_handler))
        .route("/readiness", get(readiness_handler))
        .route("/mutate", post(mutate_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(::tracing::Level::DEBUG))
                .on_response(trace::DefaultOnResponse::new().level(::tracing::Level::DEBUG)),
        )
}
