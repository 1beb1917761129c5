// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Plain-socket output: JSON lines over TCP with host failover.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use awesant_core::{ShipError, ShipResult};

use crate::config::OutputConfig;
use crate::net::{write_chunked, Conn};
use crate::outputs::Output;

pub struct SocketOutput {
    endpoints: VecDeque<String>,
    connect_timeout: Duration,
    timeout: Duration,
    persistent: bool,
    stream: Option<Conn>,
}

impl SocketOutput {
    pub fn new(cfg: &OutputConfig) -> Self {
        Self {
            endpoints: cfg.endpoints().into(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout),
            timeout: Duration::from_secs(cfg.timeout),
            persistent: cfg.persistent,
            stream: None,
        }
    }

    async fn ensure_connected(&mut self) -> ShipResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        for _ in 0..self.endpoints.len() {
            let addr = self.endpoints[0].clone();
            match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    debug!("socket output connected to {}", addr);
                    self.stream = Some(Box::new(stream));
                    return Ok(());
                }
                Ok(Err(e)) => warn!("socket connect to {} failed: {}", addr, e),
                Err(_) => warn!(
                    "socket connect to {} timed out after {:?}",
                    addr, self.connect_timeout
                ),
            }
            self.endpoints.rotate_left(1);
        }
        Err(ShipError::communication("no socket endpoint reachable"))
    }
}

#[async_trait]
impl Output for SocketOutput {
    fn name(&self) -> String {
        format!("socket({})", self.endpoints.front().cloned().unwrap_or_default())
    }

    async fn push_line(&mut self, line: &str) -> ShipResult<()> {
        self.ensure_connected().await?;
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');

        // The connection is present after ensure_connected.
        let result = match self.stream.as_mut() {
            Some(conn) => write_chunked(conn, &payload, self.timeout).await,
            None => Err(ShipError::communication("socket not connected")),
        };

        match result {
            Ok(()) => {
                if !self.persistent {
                    self.stream = None;
                }
                Ok(())
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OneOrMany;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn sends_json_lines_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            let mut got = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                got.push(line);
                if got.len() == 2 {
                    break;
                }
            }
            got
        });

        let cfg = OutputConfig {
            kind: "socket".to_string(),
            types: OneOrMany::One("*".to_string()),
            host: OneOrMany::One(addr.ip().to_string()),
            port: Some(addr.port()),
            ..OutputConfig::default()
        };
        let mut out = SocketOutput::new(&cfg);
        out.push_line("{\"n\":1}").await.unwrap();
        out.push_line("{\"n\":2}").await.unwrap();

        assert_eq!(server.await.unwrap(), vec!["{\"n\":1}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transient_error() {
        let cfg = OutputConfig {
            kind: "socket".to_string(),
            types: OneOrMany::One("*".to_string()),
            host: OneOrMany::One("127.0.0.1".to_string()),
            port: Some(1),
            connect_timeout: 1,
            ..OutputConfig::default()
        };
        let mut out = SocketOutput::new(&cfg);
        let err = out.push_line("{}").await.unwrap_err();
        assert!(err.is_transient());
    }
}
