// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use awesant_core::{ShipError, ShipResult};

/// A plain or TLS-wrapped connection.
pub trait AsyncConn: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> AsyncConn for T {}

pub type Conn = Box<dyn AsyncConn>;

/// Largest single write issued to a connection.
pub const WRITE_CHUNK: usize = 16 * 1024;

/// Write `data` in chunks of at most [`WRITE_CHUNK`] bytes, each under
/// `per_write` deadline.
pub async fn write_chunked(
    conn: &mut Conn,
    data: &[u8],
    per_write: Duration,
) -> ShipResult<()> {
    for chunk in data.chunks(WRITE_CHUNK) {
        timeout(per_write, conn.write_all(chunk))
            .await
            .map_err(|_| ShipError::timeout("write"))?
            .map_err(|e| ShipError::communication(format!("write failed: {}", e)))?;
    }
    timeout(per_write, conn.flush())
        .await
        .map_err(|_| ShipError::timeout("flush"))?
        .map_err(|e| ShipError::communication(format!("flush failed: {}", e)))?;
    Ok(())
}
