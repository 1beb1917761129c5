// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Lumberjack client output: TLS dial with failover hosts, retry
//! throttling, windowed sends and ack reconciliation.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use awesant_core::{Event, ShipError, ShipResult};
use awesant_protocol::{
    seq_distance, BatchEncoder, Frame, FrameDecoder, SendWindow,
};

use crate::config::OutputConfig;
use crate::net::{write_chunked, Conn};
use crate::outputs::Output;
use crate::tls;

/// Consecutive connect failures before retries slow to one per minute.
const THROTTLE_SOFT: u32 = 10;
/// Consecutive connect failures before retries slow to one per 10 minutes.
const THROTTLE_HARD: u32 = 50;

const THROTTLE_SOFT_PAUSE: Duration = Duration::from_secs(60);
const THROTTLE_HARD_PAUSE: Duration = Duration::from_secs(600);

pub struct LumberjackOutput {
    endpoints: VecDeque<String>,
    connect_timeout: Duration,
    timeout: Duration,
    persistent: bool,
    max_window: usize,
    window: SendWindow,
    encoder: BatchEncoder,
    tls: Option<TlsConnector>,
    stream: Option<Conn>,
    decoder: FrameDecoder,
    failures: u32,
}

impl LumberjackOutput {
    pub fn new(cfg: &OutputConfig) -> Result<Self, String> {
        let tls = if cfg.tls_enabled() {
            let config = tls::client_config(
                cfg.ssl_ca_file.as_deref().map(Path::new),
                cfg.ssl_cert_file.as_deref().map(Path::new),
                cfg.ssl_key_file.as_deref().map(Path::new),
            )
            .map_err(|e| format!("lumberjack TLS setup: {}", e))?;
            Some(TlsConnector::from(config))
        } else {
            None
        };

        Ok(Self {
            endpoints: cfg.endpoints().into(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout),
            timeout: Duration::from_secs(cfg.timeout),
            persistent: cfg.persistent,
            max_window: cfg.max_window_size,
            window: SendWindow::new(cfg.window_size),
            encoder: BatchEncoder::new(cfg.protocol, cfg.compression),
            tls,
            stream: None,
            decoder: FrameDecoder::new(cfg.compression),
            failures: 0,
        })
    }

    async fn throttle(&self) {
        if self.failures > THROTTLE_HARD {
            warn!(
                "{} consecutive connect failures, pausing {:?}",
                self.failures, THROTTLE_HARD_PAUSE
            );
            tokio::time::sleep(THROTTLE_HARD_PAUSE).await;
        } else if self.failures > THROTTLE_SOFT {
            warn!(
                "{} consecutive connect failures, pausing {:?}",
                self.failures, THROTTLE_SOFT_PAUSE
            );
            tokio::time::sleep(THROTTLE_SOFT_PAUSE).await;
        }
    }

    async fn try_connect(&self, addr: &str) -> Result<Conn, String> {
        let tcp = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| format!("connect to {} timed out", addr))?
            .map_err(|e| format!("connect to {} failed: {}", addr, e))?;

        let Some(connector) = &self.tls else {
            return Ok(Box::new(tcp));
        };

        let host = addr.rsplit_once(':').map_or(addr, |(h, _)| h).to_string();
        let server_name = rustls::pki_types::ServerName::try_from(host)
            .map_err(|e| format!("invalid TLS server name for {}: {}", addr, e))?;
        let stream = timeout(self.connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| format!("TLS handshake with {} timed out", addr))?
            .map_err(|e| format!("TLS handshake with {} failed: {}", addr, e))?;
        Ok(Box::new(stream))
    }

    /// Reuse a live persistent connection or dial the host list in order,
    /// rotating it on each failed attempt.
    async fn ensure_connected(&mut self) -> ShipResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.throttle().await;

        for _ in 0..self.endpoints.len() {
            let addr = self.endpoints[0].clone();
            match self.try_connect(&addr).await {
                Ok(conn) => {
                    info!("lumberjack output connected to {}", addr);
                    self.stream = Some(conn);
                    self.decoder = FrameDecoder::new(self.encoder.compression);
                    self.failures = 0;
                    return Ok(());
                }
                Err(e) => {
                    warn!("{}", e);
                    self.endpoints.rotate_left(1);
                }
            }
        }
        self.failures += 1;
        Err(ShipError::communication("no lumberjack host reachable"))
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        self.window.reset_in_flight();
    }

    async fn write_all(&mut self, data: &[u8]) -> ShipResult<()> {
        match self.stream.as_mut() {
            Some(conn) => write_chunked(conn, data, self.timeout).await,
            None => Err(ShipError::communication("not connected")),
        }
    }

    /// Read ack frames until the expected sequence arrives. Stale acks of
    /// already-confirmed sequences are drained silently; anything else
    /// fails the send.
    async fn wait_ack(&mut self, expected: u32) -> ShipResult<()> {
        let mut buf = [0u8; 1024];
        loop {
            match self
                .decoder
                .next_frame()
                .map_err(|e| ShipError::communication(format!("ack decode failed: {}", e)))?
            {
                Some(Frame::Ack { seq }) if seq == expected => return Ok(()),
                Some(Frame::Ack { seq })
                    if seq_distance(seq, expected) <= self.window.window_size() =>
                {
                    debug!("draining stale ack {} (waiting for {})", seq, expected);
                }
                Some(Frame::Ack { seq }) => {
                    return Err(ShipError::communication(format!(
                        "ack sequence mismatch: expected {}, got {}",
                        expected, seq
                    )));
                }
                Some(other) => {
                    return Err(ShipError::communication(format!(
                        "unexpected frame while waiting for ack: {:?}",
                        other
                    )));
                }
                None => {
                    let conn = self
                        .stream
                        .as_mut()
                        .ok_or_else(|| ShipError::communication("not connected"))?;
                    let n = timeout(self.timeout, conn.read(&mut buf))
                        .await
                        .map_err(|_| ShipError::timeout("ack read"))?
                        .map_err(|e| {
                            ShipError::communication(format!("ack read failed: {}", e))
                        })?;
                    if n == 0 {
                        return Err(ShipError::communication(
                            "connection closed while waiting for ack",
                        ));
                    }
                    self.decoder.extend(&buf[..n]);
                }
            }
        }
    }

    fn finish_push(&mut self) {
        if !self.persistent {
            self.stream = None;
        }
    }
}

#[async_trait]
impl Output for LumberjackOutput {
    fn name(&self) -> String {
        format!(
            "lumberjack({})",
            self.endpoints.front().cloned().unwrap_or_default()
        )
    }

    fn max_window_size(&self) -> usize {
        self.max_window
    }

    async fn push_line(&mut self, line: &str) -> ShipResult<()> {
        self.ensure_connected().await?;
        let seq = self.window.assign();
        let bytes = self.encoder.encode_json_line(line, seq);

        let result: ShipResult<()> = async {
            self.write_all(&bytes).await?;
            if self.window.exhausted() {
                self.wait_ack(seq).await?;
                self.window.acked(seq);
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.finish_push();
                Ok(())
            }
            Err(e) => {
                self.drop_connection();
                Err(e)
            }
        }
    }

    async fn push_batch(&mut self, events: &[Event]) -> ShipResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.ensure_connected().await?;
        let first = self.window.assign_batch(events.len());
        let (bytes, last) = self
            .encoder
            .encode_batch(events, first)
            .map_err(|e| ShipError::communication(format!("batch encode failed: {}", e)))?;

        let result: ShipResult<()> = async {
            self.write_all(&bytes).await?;
            self.wait_ack(last).await?;
            self.window.acked(last);
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.finish_push();
                Ok(())
            }
            Err(e) => {
                self.drop_connection();
                Err(e)
            }
        }
    }
}
