//! Drives the Line Reader (Component B) over the transport's read half,
//! forwarding each parsed `ServerOp` to the connection supervisor. Runs
//! until the transport errors or is closed, at which point the caller
//! treats that as a reconnect signal — mirroring how the Writer's `run`
//! reports failure by returning `Err` rather than panicking or retrying
//! itself.

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{LineReader, ServerOp};
use crate::transport::Transport;

const READ_BUF_SIZE: usize = 64 * 1024;

pub async fn run(
    mut read_half: tokio::io::ReadHalf<Transport>,
    mut line_reader: LineReader,
    ops: mpsc::Sender<ServerOp>,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        while let Some(op) = line_reader.next_op()? {
            if ops.send(op).await.is_err() {
                // supervisor has gone away; nothing left to do.
                return Ok(());
            }
        }
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::disconnected());
        }
        line_reader.feed(&buf[..n]);
    }
}
