use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use chat_relay::{registry::Registry, server::RelayServer};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn lines_reach_every_other_client_but_never_the_sender() -> Result<()> {
    let (addr, registry, shutdown_tx, server) = start_relay().await?;

    let mut alice = Client::connect(addr).await?;
    let mut bob = Client::connect(addr).await?;
    let mut carol = Client::connect(addr).await?;
    wait_for_sessions(&registry, 3).await?;

    // Bob and Carol have not sent anything; registration alone entitles
    // them to broadcasts.
    alice.send("hello").await?;
    assert_eq!(bob.recv().await?, "hello");
    assert_eq!(carol.recv().await?, "hello");
    alice.expect_silence().await?;

    // Disconnecting one client must not disturb delivery among the rest.
    drop(bob);
    wait_for_sessions(&registry, 2).await?;

    carol.send("still here").await?;
    assert_eq!(alice.recv().await?, "still here");
    carol.expect_silence().await?;

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn per_sender_order_is_preserved() -> Result<()> {
    let (addr, registry, shutdown_tx, server) = start_relay().await?;

    let mut sender = Client::connect(addr).await?;
    let mut receiver = Client::connect(addr).await?;
    wait_for_sessions(&registry, 2).await?;

    for n in 0..20 {
        sender.send(&format!("message {n}")).await?;
    }
    for n in 0..20 {
        assert_eq!(receiver.recv().await?, format!("message {n}"));
    }

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn relayed_text_is_byte_identical() -> Result<()> {
    let (addr, registry, shutdown_tx, server) = start_relay().await?;

    let mut sender = Client::connect(addr).await?;
    let mut receiver = Client::connect(addr).await?;
    wait_for_sessions(&registry, 2).await?;

    let text = "  padded\ttext with ünïcode ✓ and trailing spaces   ";
    sender.send(text).await?;
    assert_eq!(receiver.recv().await?, text);

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn abrupt_disconnect_mid_conversation_is_survivable() -> Result<()> {
    let (addr, registry, shutdown_tx, server) = start_relay().await?;

    let mut alice = Client::connect(addr).await?;
    let mut bob = Client::connect(addr).await?;
    wait_for_sessions(&registry, 2).await?;

    alice.send("first").await?;
    assert_eq!(bob.recv().await?, "first");

    // Bob vanishes without reading; Alice keeps talking into a registry
    // that may still hold Bob's stale writer for a moment.
    drop(bob);
    alice.send("second").await?;
    alice.send("third").await?;
    wait_for_sessions(&registry, 1).await?;

    // The server is still accepting and still relaying.
    let mut carol = Client::connect(addr).await?;
    wait_for_sessions(&registry, 2).await?;
    alice.send("fourth").await?;
    assert_eq!(carol.recv().await?, "fourth");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

async fn start_relay() -> Result<(SocketAddr, Arc<Registry>, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server = RelayServer::new(listener);
    let addr = server.local_addr()?;
    let registry = server.registry();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    Ok((addr, registry, shutdown_tx, handle))
}

/// Blocks until the accept loop has registered exactly `count` sessions.
/// Registration is asynchronous with respect to `connect` returning, so
/// tests synchronize on the registry instead of sleeping blindly.
async fn wait_for_sessions(registry: &Registry, count: usize) -> Result<()> {
    timeout(RECV_TIMEOUT, async {
        while registry.len().await != count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("registry never reached {count} sessions"))
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        let mut line = String::new();
        let bytes = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("timed out waiting for a line"))??;
        anyhow::ensure!(bytes > 0, "relay closed the stream");
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Asserts that nothing arrives for a short window. Used to show a
    /// sender never hears its own line back.
    async fn expect_silence(&mut self) -> Result<()> {
        let mut line = String::new();
        match timeout(Duration::from_millis(200), self.reader.read_line(&mut line)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => Err(anyhow!("relay closed the stream")),
            Ok(Ok(_)) => Err(anyhow!("unexpected line: {line:?}")),
            Ok(Err(error)) => Err(error.into()),
        }
    }
}
