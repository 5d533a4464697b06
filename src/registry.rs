use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{io::AsyncWrite, sync::Mutex};
use tracing::{debug, warn};

use crate::line::LineWriter;

/// Identity of one accepted connection.
pub type SessionId = u64;

type Outbound = LineWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Shared handle to one session's outbound writer. The per-handle lock
/// keeps concurrent fan-outs from interleaving partial lines on one peer.
pub type WriterHandle = Arc<Mutex<Outbound>>;

/// Live map from session id to outbound writer.
///
/// The accept loop inserts, session teardown removes, and every inbound
/// line iterates a snapshot taken under the map lock. The map lock is
/// never held across a socket write, so one slow peer cannot stall
/// registration or other sessions' fan-outs.
#[derive(Default)]
pub struct Registry {
    writers: Mutex<HashMap<SessionId, WriterHandle>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id for a newly accepted connection.
    pub fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `writer` under `id`. Fan-outs that start after this call see
    /// the new writer; fan-outs already iterating their snapshot need not.
    pub async fn register<W>(&self, id: SessionId, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let handle = Arc::new(Mutex::new(LineWriter::new(boxed)));
        self.writers.lock().await.insert(id, handle);
    }

    /// Removes `id`, handing the writer back so the caller can shut the
    /// stream down. Absent ids are tolerated. A fan-out already holding
    /// the old snapshot may still write once to the removed handle and
    /// swallow the failure.
    pub async fn unregister(&self, id: SessionId) -> Option<WriterHandle> {
        self.writers.lock().await.remove(&id)
    }

    /// Number of currently registered writers.
    pub async fn len(&self) -> usize {
        self.writers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.writers.lock().await.is_empty()
    }

    /// Sends `line` to every registered session except `exclude` and
    /// returns how many deliveries succeeded.
    ///
    /// A dead or broken target is logged and skipped; it never aborts
    /// delivery to the rest. Delivery order across targets within one call
    /// is unspecified. Callers provide per-source FIFO by awaiting this
    /// call before reading their next line.
    pub async fn fan_out(&self, line: &str, exclude: SessionId) -> usize {
        let targets: Vec<(SessionId, WriterHandle)> = {
            let writers = self.writers.lock().await;
            writers
                .iter()
                .filter(|(id, _)| **id != exclude)
                .map(|(id, handle)| (*id, Arc::clone(handle)))
                .collect()
        };

        let mut delivered = 0;
        for (id, handle) in targets {
            match handle.lock().await.write_line(line).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(session = id, %error, "failed to deliver line");
                }
            }
        }
        debug!(from = exclude, delivered, "fan-out complete");
        delivered
    }

    /// Drains the registry and closes every writer. Used when the whole
    /// server shuts down.
    pub async fn close_all(&self) {
        let drained: Vec<(SessionId, WriterHandle)> = {
            let mut writers = self.writers.lock().await;
            writers.drain().collect()
        };

        for (id, handle) in drained {
            if let Err(error) = handle.lock().await.shutdown().await {
                debug!(session = id, %error, "writer did not shut down cleanly");
            }
        }
    }
}
