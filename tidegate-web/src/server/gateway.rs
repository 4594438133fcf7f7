//! Gateway lifecycle: engine, authenticator and HTTP listener as one unit.
//!
//! A gateway starts closed. [`Gateway::open`] builds the engine, prepares the
//! authenticator and binds the listener, then serves in the background.
//! [`Gateway::close`] drains the listener within a deadline and then closes
//! the engine. [`Gateway::wait`] reports listener failures.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tidegate_core::config::GatewayConfig;
use tidegate_core::torrent::pick_free_port;
use tidegate_core::{
    AuthError, Authenticator, EngineBuilder, EngineError, EngineSettings, ProgressCallback,
    TorrentEngine, TorrentResolver,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AppState, router};

/// Errors raised by the gateway lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway is already open")]
    AlreadyOpen,

    #[error("Torrent engine failed")]
    Engine(#[from] EngineError),

    #[error("Authentication backend failed")]
    Auth(#[from] AuthError),

    #[error("Could not listen on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed")]
    Serve(#[source] std::io::Error),

    #[error("HTTP server task failed: {reason}")]
    ServerTask { reason: String },

    #[error("Timed out after {0:?} waiting for open connections to finish")]
    ShutdownTimeout(Duration),
}

struct Running {
    engine: Arc<dyn TorrentEngine>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// An HTTP gateway over a torrent engine.
///
/// All methods take `&self` so one task can [`wait`](Self::wait) while
/// another closes the gateway.
pub struct Gateway {
    config: GatewayConfig,
    builder: Arc<dyn EngineBuilder>,
    on_progress: ProgressCallback,
    running: Mutex<Option<Running>>,
    errors: tokio::sync::Mutex<Option<mpsc::Receiver<GatewayError>>>,
}

impl Gateway {
    /// Creates a closed gateway.
    ///
    /// `on_progress` receives download progress of every streamed file.
    pub fn new(
        config: GatewayConfig,
        builder: Arc<dyn EngineBuilder>,
        on_progress: ProgressCallback,
    ) -> Self {
        Self {
            config,
            builder,
            on_progress,
            running: Mutex::new(None),
            errors: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts the engine and the listener.
    ///
    /// Nothing is left running when this fails.
    ///
    /// # Errors
    /// - `GatewayError::AlreadyOpen` - Gateway is open
    /// - `GatewayError::Engine` - No free peer port or engine construction failed
    /// - `GatewayError::Auth` - Authentication backend could not be prepared
    /// - `GatewayError::Bind` - Listen address unavailable
    pub async fn open(&self) -> Result<(), GatewayError> {
        if self.running.lock().is_some() {
            return Err(GatewayError::AlreadyOpen);
        }

        let listen_port = pick_free_port()?;
        let engine = self
            .builder
            .build(EngineSettings {
                storage_dir: self.config.torrent.storage_dir.clone(),
                debug: self.config.torrent.debug,
                listen_port,
            })
            .await?;

        let prepared = self.prepare(Arc::clone(&engine)).await;
        let (listener, state) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                for close_error in engine.close().await {
                    warn!(error = %close_error, "Could not close engine after failed open");
                }
                return Err(e);
            }
        };

        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            address: self.config.server.bind_address(),
            source,
        })?;

        let (error_tx, error_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        let server = tokio::spawn(async move {
            info!(address = %local_addr, "Listening");
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                let _ = error_tx.send(GatewayError::Serve(e)).await;
            }
            debug!(address = %local_addr, "Listener stopped");
        });

        let opened = Running {
            engine,
            shutdown: shutdown_tx,
            server,
            local_addr,
        };
        let rejected = {
            let mut running = self.running.lock();
            if running.is_some() {
                Some(opened)
            } else {
                *running = Some(opened);
                None
            }
        };
        if let Some(rejected) = rejected {
            // Lost a race against a concurrent open
            rejected.server.abort();
            rejected.engine.close().await;
            return Err(GatewayError::AlreadyOpen);
        }

        *self.errors.lock().await = Some(error_rx);
        Ok(())
    }

    async fn prepare(
        &self,
        engine: Arc<dyn TorrentEngine>,
    ) -> Result<(TcpListener, AppState), GatewayError> {
        let auth = Authenticator::open(&self.config.auth).await?;

        let address = self.config.server.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| GatewayError::Bind { address, source })?;

        let resolver = TorrentResolver::new(engine, self.config.torrent.metadata_timeout);
        let state = AppState::new(
            resolver,
            auth,
            Arc::clone(&self.on_progress),
            self.config.streaming.clone(),
        );
        Ok((listener, state))
    }

    /// Address the listener is bound to while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// Engine of the open gateway.
    pub fn engine(&self) -> Option<Arc<dyn TorrentEngine>> {
        self.running.lock().as_ref().map(|r| Arc::clone(&r.engine))
    }

    /// Stops accepting requests, waits up to `timeout` for open connections,
    /// then closes the engine. Closing a closed gateway does nothing.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned.
    ///
    /// # Errors
    /// - `GatewayError::ShutdownTimeout` - Connections were still open at the deadline
    /// - `GatewayError::ServerTask` - Listener task panicked
    /// - `GatewayError::Engine` - Engine reported an error while closing
    pub async fn close(&self, timeout: Duration) -> Result<(), GatewayError> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        info!(address = %running.local_addr, "Closing gateway");

        let _ = running.shutdown.send(());
        let mut server = running.server;
        let mut result = match tokio::time::timeout(timeout, &mut server).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(GatewayError::ServerTask {
                reason: e.to_string(),
            }),
            Err(_) => {
                server.abort();
                Err(GatewayError::ShutdownTimeout(timeout))
            }
        };

        for e in running.engine.close().await {
            warn!(error = %e, "Error while closing engine");
            if result.is_ok() {
                result = Err(GatewayError::Engine(e));
            }
        }

        result
    }

    /// Suspends until the listener stops. Returns the listener's error, if
    /// it failed, and `Ok` after a clean shutdown or when never opened.
    ///
    /// # Errors
    /// - `GatewayError::Serve` - The listener failed while serving
    pub async fn wait(&self) -> Result<(), GatewayError> {
        let mut errors = self.errors.lock().await;
        let Some(receiver) = errors.as_mut() else {
            return Ok(());
        };
        match receiver.recv().await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use tidegate_core::{AuthConfig, FileMetrics, InfoHash, MagnetLink, TorrentMetrics};
    use tidegate_sim::{SeedCatalog, SimulatedEngineBuilder, SimulationConfig};

    use super::*;

    fn config(storage: &Path) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.server.listen_address = "127.0.0.1:0".to_string();
        config.torrent.storage_dir = storage.to_path_buf();
        config.auth = AuthConfig::Static {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        config
    }

    fn no_progress() -> ProgressCallback {
        Arc::new(|_: &TorrentMetrics, _: &FileMetrics| {})
    }

    fn sim_builder() -> Arc<SimulatedEngineBuilder> {
        Arc::new(SimulatedEngineBuilder::new(
            SeedCatalog::new(),
            SimulationConfig::instant(),
        ))
    }

    async fn assert_engine_closed(builder: &SimulatedEngineBuilder) {
        let engine = builder.engine().unwrap();
        let magnet = MagnetLink::new(InfoHash::new([1u8; 20]));
        assert!(matches!(
            engine.add_magnet(&magnet).await,
            Err(EngineError::EngineShutdown)
        ));
    }

    struct FailingBuilder;

    #[async_trait]
    impl EngineBuilder for FailingBuilder {
        async fn build(
            &self,
            _settings: EngineSettings,
        ) -> Result<Arc<dyn TorrentEngine>, EngineError> {
            Err(EngineError::Io(std::io::Error::other("disk full")))
        }
    }

    #[tokio::test]
    async fn test_open_close_wait() {
        let storage = tempfile::tempdir().unwrap();
        let builder = sim_builder();
        let gateway = Gateway::new(config(storage.path()), builder.clone(), no_progress());

        gateway.open().await.unwrap();
        let addr = gateway.local_addr().unwrap();
        assert!(gateway.engine().is_some());
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());
        assert!(matches!(gateway.open().await, Err(GatewayError::AlreadyOpen)));

        gateway.close(Duration::from_secs(5)).await.unwrap();
        assert!(gateway.local_addr().is_none());
        gateway.wait().await.unwrap();
        assert_engine_closed(&builder).await;
    }

    #[tokio::test]
    async fn test_wait_returns_after_close_from_other_task() {
        let storage = tempfile::tempdir().unwrap();
        let gateway = Arc::new(Gateway::new(
            config(storage.path()),
            sim_builder(),
            no_progress(),
        ));
        gateway.open().await.unwrap();

        let waiter = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            async move { gateway.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gateway.close(Duration::from_secs(5)).await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_and_wait_without_open() {
        let storage = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(config(storage.path()), sim_builder(), no_progress());
        gateway.close(Duration::from_secs(1)).await.unwrap();
        gateway.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_failure_aborts_open() {
        let storage = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(
            config(storage.path()),
            Arc::new(FailingBuilder),
            no_progress(),
        );
        assert!(matches!(gateway.open().await, Err(GatewayError::Engine(_))));
        assert!(gateway.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_open_and_closes_engine() {
        let storage = tempfile::tempdir().unwrap();
        let mut config = config(storage.path());
        config.auth = AuthConfig::Oidc {
            issuer: "http://127.0.0.1:9".to_string(),
            client_id: "tidegate".to_string(),
        };
        let builder = sim_builder();
        let gateway = Gateway::new(config, builder.clone(), no_progress());

        assert!(matches!(gateway.open().await, Err(GatewayError::Auth(_))));
        assert!(gateway.local_addr().is_none());
        assert_engine_closed(&builder).await;
    }

    #[tokio::test]
    async fn test_bind_failure_aborts_open() {
        let storage = tempfile::tempdir().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config(storage.path());
        config.server.listen_address = occupied.local_addr().unwrap().to_string();
        let builder = sim_builder();
        let gateway = Gateway::new(config, builder.clone(), no_progress());

        assert!(matches!(
            gateway.open().await,
            Err(GatewayError::Bind { .. })
        ));
        assert_engine_closed(&builder).await;
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let storage = tempfile::tempdir().unwrap();
        let gateway = Gateway::new(config(storage.path()), sim_builder(), no_progress());

        gateway.open().await.unwrap();
        gateway.close(Duration::from_secs(5)).await.unwrap();
        gateway.open().await.unwrap();
        assert!(gateway.local_addr().is_some());
        gateway.close(Duration::from_secs(5)).await.unwrap();
    }
}
