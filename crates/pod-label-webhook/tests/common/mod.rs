use std::net::SocketAddr;

use axum::Router;
use pod_label_webhook::{
    WebhookServer,
    config::{ClusterCredentials, Config},
};

pub(crate) fn default_test_config() -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 8443)),
        tls_config: None,
        mutation_timeout_seconds: Some(2),
        cluster_credentials: ClusterCredentials::InCluster,
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) async fn app(config: Config) -> Router {
    let server = WebhookServer::new_from_config(config).await.unwrap();

    server.router()
}
