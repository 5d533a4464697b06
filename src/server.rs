use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{line::LineReader, registry::Registry, session::ClientSession};

/// Accepts connections forever and spawns a read loop per client.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl RelayServer {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared registry driving the fan-out. Tests use this to observe
    /// session membership without racing the accept loop.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts forever. Terminal only on a fatal accept error.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts until `shutdown` completes, then closes every live writer
    /// on the way out. An accept error is fatal to the whole service;
    /// per-session failures never reach this loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let RelayServer { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    registry.close_all().await;
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    accept_session(stream, peer, &registry).await;
                }
            }
        }
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Registers the new connection's write half, then spawns its read loop.
/// Registration happens before the spawn, so a fan-out started after this
/// call already reaches the new session.
async fn accept_session(stream: TcpStream, peer: SocketAddr, registry: &Arc<Registry>) {
    let id = registry.next_id();
    info!(session = id, %peer, "accepted connection");

    let (read_half, write_half) = stream.into_split();
    registry.register(id, write_half).await;

    let session = ClientSession::new(
        id,
        peer,
        LineReader::new(BufReader::new(read_half)),
        Arc::clone(registry),
    );
    tokio::spawn(session.run());
}
