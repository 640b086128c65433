//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use resolver_gateway::config::GatewayConfig;
use resolver_gateway::currency::ConfigCurrency;
use resolver_gateway::engine::{InMemoryEngine, ResolutionEngine};
use resolver_gateway::http::HttpServer;
use resolver_gateway::lifecycle::{startup, Shutdown};
use resolver_gateway::store::{ConfigBlob, ConfigId, ConfigStore, StoreClient};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Wire the currency subsystem over `store` and `engine` with default settings.
pub async fn currency_over(store: Arc<dyn ConfigStore>, engine: Arc<dyn ResolutionEngine>) -> ConfigCurrency {
    let client = StoreClient::new(store, Duration::from_secs(2));
    ConfigCurrency::bootstrap(client, engine, &Default::default())
        .await
        .unwrap()
}

/// Publish a configuration adding `code`, as another gateway instance would.
pub async fn publish_data_source(store: &dyn ConfigStore, code: &str) -> ConfigId {
    let base = store.current_identifier().await.unwrap();
    let mut document = store.fetch_blob(base).await.unwrap().parse().unwrap();
    document.add_data_source(code).unwrap();
    store
        .publish_new_blob(base, ConfigBlob::from_document(&document).unwrap())
        .await
        .unwrap()
}

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub currency: ConfigCurrency,
    pub engine: Arc<InMemoryEngine>,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("gateway did not stop")
            .unwrap();
    }
}

/// Config for tests: no polling, no metrics listener.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.currency.refresh_interval_secs = 0;
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = "test-admin-key".to_string();
    config
}

/// Start a gateway over `store` on 127.0.0.1:0.
pub async fn start_gateway(store: Arc<dyn ConfigStore>, config: GatewayConfig) -> TestGateway {
    let engine = Arc::new(InMemoryEngine::new());
    let gateway = startup::build_with(config, store, engine.clone()).await.unwrap();
    serve(gateway, engine).await
}

/// Start an assembled gateway on 127.0.0.1:0.
pub async fn serve(gateway: startup::Gateway, engine: Arc<InMemoryEngine>) -> TestGateway {
    let currency = gateway.currency.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(gateway);
    let stop = shutdown.clone();
    let task = tokio::spawn(async move {
        server.run(listener, stop).await.unwrap();
    });

    TestGateway {
        addr,
        currency,
        engine,
        shutdown,
        task,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
