use std::{net::SocketAddr, sync::Arc};

use tokio::io::{self, AsyncBufRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::{
    line::LineReader,
    registry::{Registry, SessionId},
};

/// The inbound side of one accepted connection.
///
/// The outbound write half lives in the [`Registry`]; a session owns only
/// its id, its reader, and a reference to the shared registry. A session
/// never outlives its connection: when the read loop ends, the session
/// unregisters itself and closes its writer.
pub struct ClientSession<R> {
    id: SessionId,
    peer: SocketAddr,
    reader: LineReader<R>,
    registry: Arc<Registry>,
}

impl<R> ClientSession<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        reader: LineReader<R>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            id,
            peer,
            reader,
            registry,
        }
    }

    /// Runs the read loop to completion, then tears the session down. A
    /// broken inbound stream is terminal for this session only; other
    /// sessions and the listener never see it.
    pub async fn run(mut self) {
        match self.read_loop().await {
            Ok(()) => info!(session = self.id, peer = %self.peer, "session closed"),
            Err(error) => {
                warn!(session = self.id, peer = %self.peer, %error, "session closed with error");
            }
        }

        // Best effort: fan-out stays correct through per-write failure
        // isolation even if this entry were to linger.
        if let Some(handle) = self.registry.unregister(self.id).await {
            if let Err(error) = handle.lock().await.shutdown().await {
                debug!(session = self.id, %error, "writer shutdown failed");
            }
        }
    }

    async fn read_loop(&mut self) -> io::Result<()> {
        while let Some(line) = self.reader.read_line().await? {
            self.registry.fan_out(&line, self.id).await;
            echo_to_console(&line).await?;
        }
        Ok(())
    }
}

/// Operator-facing echo of every relayed line.
async fn echo_to_console(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
