//! Component D: drains the write queue in batches and flushes them to the
//! transport. Grounded on `riverdb::pg::connection::Connection::write_backlog`'s
//! drain-while-writable loop, adapted to pull from `WriteQueue::accumulate`
//! instead of a raw `VecDeque<Bytes>` backlog the same task also produced.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::queue::WriteQueue;
use crate::transport::Transport;

const MAX_BATCH_MESSAGES: usize = 1024;

/// Runs until the transport returns an I/O error, at which point the caller
/// (the connection supervisor) treats that as a reconnect signal.
/// `max_batch_bytes` is `Options::buffer_size` — the flush cap SPEC_FULL.md
/// §4.D step 3 describes and §6 documents as "max serialized batch bytes
/// before flushing."
pub async fn run(mut write_half: tokio::io::WriteHalf<Transport>, queue: Arc<WriteQueue>, max_batch_bytes: usize) -> Result<()> {
    let mut scratch = BytesMut::with_capacity(max_batch_bytes);
    loop {
        let batch = queue.accumulate(MAX_BATCH_MESSAGES, max_batch_bytes).await;
        scratch.clear();
        for msg in &batch {
            msg.write_into(&mut scratch);
        }
        debug!(messages = batch.len(), bytes = scratch.len(), "flushing write batch");
        if let Err(e) = write_half.write_all(&scratch).await {
            warn!(?e, "transport write failed");
            return Err(e.into());
        }
    }
}
