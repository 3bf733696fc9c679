//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{serve_connection, HandlerContext};
use socksync_engine::ConnectionHooks;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// The sync server.
///
/// Accepts TCP connections, wraps each in a [`socksync_engine::Socket`]
/// and feeds it one message per line. Application groups are attached
/// through [`SyncServer::hooks`].
///
/// # Example
///
/// ```rust,ignore
/// let server = Arc::new(SyncServer::bind(ServerConfig::default()).await?);
/// let handle = tokio::spawn(Arc::clone(&server).run());
/// // ...
/// server.shutdown();
/// handle.await??;
/// ```
pub struct SyncServer {
    listener: TcpListener,
    context: Arc<HandlerContext>,
    shutdown: watch::Sender<bool>,
}

impl SyncServer {
    /// Binds the listener. Connections are accepted once [`SyncServer::run`] is called.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (shutdown, _) = watch::channel(false);
        info!(addr = %listener.local_addr()?, "sync server bound");
        Ok(Self {
            listener,
            context: Arc::new(HandlerContext::new(config)),
            shutdown,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the hooks run for every new connection.
    pub fn hooks(&self) -> &Arc<ConnectionHooks> {
        &self.context.hooks
    }

    /// Returns the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.context.connections.load(Ordering::SeqCst)
    }

    /// Stops accepting and closes every open connection.
    pub fn shutdown(&self) {
        info!("sync server shutting down");
        self.shutdown.send_replace(true);
    }

    /// Accepts connections until [`SyncServer::shutdown`] is called.
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        let mut stop = self.shutdown.subscribe();
        if *stop.borrow() {
            return Ok(());
        }
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!("accept failed: {err}");
                            continue;
                        }
                    };
                    if let Err(err) = self.admit() {
                        warn!(%peer, "rejected connection: {err}");
                        continue;
                    }
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&self.context),
                        self.shutdown.subscribe(),
                    ));
                }
            }
        }
        info!("sync server stopped");
        Ok(())
    }

    fn admit(&self) -> ServerResult<()> {
        let max = self.context.config.max_connections;
        self.context
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < max).then_some(open + 1)
            })
            .map(|_| ())
            .map_err(|_| ServerError::ConnectionLimit { max })
    }
}
