// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Lumberjack network input: TLS accept, per-connection frame decode,
//! ack emission and gap detection.
//!
//! The listener is spawned once per configured input and shared by every
//! worker in the input's group; workers drain a common channel.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Duration};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use awesant_core::DynResult;
use awesant_protocol::{
    codec::encode_ack, next_seq, seq_distance, Compression, Frame, FrameDecoder, ProtocolVersion,
};

use crate::config::InputConfig;
use crate::inputs::{Input, RawRecord};
use crate::net::Conn;
use crate::tls;

/// Per-pass read deadline on an accepted connection.
pub const READ_DEADLINE: Duration = Duration::from_secs(30);

/// Decoded events queued between the listener and the pulling workers.
const QUEUE_DEPTH: usize = 4096;

/// Cloneable handle to a running listener; one per `[[inputs]]` entry,
/// shared by all workers of the input's group.
#[derive(Clone)]
pub struct LumberjackServerHandle {
    rx: Arc<Mutex<mpsc::Receiver<RawRecord>>>,
    local_port: u16,
}

impl LumberjackServerHandle {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

/// Bind the listener and spawn the accept loop.
pub async fn spawn_lumberjack_server(cfg: &InputConfig) -> DynResult<LumberjackServerHandle> {
    let port = cfg.port.unwrap_or(0);
    let listener = TcpListener::bind((cfg.host.as_str(), port)).await?;
    let local_port = listener.local_addr()?.port();

    let acceptor = match (&cfg.ssl_cert_file, &cfg.ssl_key_file) {
        (Some(cert), Some(key)) => {
            let config = tls::server_config(
                Path::new(cert),
                Path::new(key),
                cfg.ssl_ca_file.as_deref().map(Path::new),
            )?;
            Some(TlsAcceptor::from(config))
        }
        _ => None,
    };

    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let compression = cfg.compression;
    info!(
        "lumberjack input listening on {}:{} (tls: {})",
        cfg.host,
        local_port,
        acceptor.is_some()
    );

    tokio::spawn(accept_loop(listener, acceptor, compression, tx));

    Ok(LumberjackServerHandle {
        rx: Arc::new(Mutex::new(rx)),
        local_port,
    })
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    compression: Compression,
    tx: mpsc::Sender<RawRecord>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("lumberjack accept failed: {}", e);
                continue;
            }
        };
        debug!("lumberjack client connected: {}", peer);
        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, acceptor, compression, tx).await {
                warn!("lumberjack connection {} closed: {}", peer, e);
            } else {
                debug!("lumberjack client disconnected: {}", peer);
            }
        });
    }
}

struct ConnState {
    last_received: u32,
    last_ack: u32,
    window_size: u32,
}

impl ConnState {
    fn new() -> Self {
        Self {
            last_received: 0,
            last_ack: 0,
            window_size: 0,
        }
    }

    /// Effective ack window: a peer that never announces one is acked
    /// per frame.
    fn ack_window(&self) -> u32 {
        self.window_size.max(1)
    }
}

enum SeqDecision {
    Deliver,
    Duplicate,
    Gap,
}

fn judge_seq(state: &ConnState, seq: u32) -> SeqDecision {
    if state.last_received == 0 || seq == next_seq(state.last_received) {
        return SeqDecision::Deliver;
    }
    if seq <= state.last_received {
        return SeqDecision::Duplicate;
    }
    SeqDecision::Gap
}

async fn handle_connection(
    socket: TcpStream,
    acceptor: Option<TlsAcceptor>,
    compression: Compression,
    tx: mpsc::Sender<RawRecord>,
) -> DynResult<()> {
    use tokio::io::AsyncReadExt;

    let mut conn: Conn = match acceptor {
        Some(acceptor) => Box::new(acceptor.accept(socket).await?),
        None => Box::new(socket),
    };

    let mut decoder = FrameDecoder::new(compression);
    let mut state = ConnState::new();
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        let n = timeout(READ_DEADLINE, conn.read(&mut buf))
            .await
            .map_err(|_| "read deadline exceeded")??;
        if n == 0 {
            return Ok(());
        }
        decoder.extend(&buf[..n]);

        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Window { size } => state.window_size = size,
                Frame::Ack { .. } => {}
                Frame::Data { seq, pairs } => {
                    handle_data(&mut state, &mut conn, &tx, seq, record_from_pairs(pairs))
                        .await?;
                }
                Frame::Json { seq, payload } => match record_from_json(&payload) {
                    Some(record) => {
                        handle_data(&mut state, &mut conn, &tx, seq, Some(record)).await?;
                    }
                    None => {
                        warn!("dropping malformed JSON data frame (seq {})", seq);
                        handle_data(&mut state, &mut conn, &tx, seq, None).await?;
                    }
                },
            }
        }
    }
}

/// Sequence bookkeeping for one data frame; `record` is `None` when the
/// payload was malformed and only the sequence advances.
async fn handle_data(
    state: &mut ConnState,
    conn: &mut Conn,
    tx: &mpsc::Sender<RawRecord>,
    seq: u32,
    record: Option<RawRecord>,
) -> DynResult<()> {
    use tokio::io::AsyncWriteExt;

    match judge_seq(state, seq) {
        SeqDecision::Duplicate => {
            debug!("dropping duplicate frame seq {} (last {})", seq, state.last_received);
            return Ok(());
        }
        SeqDecision::Gap => {
            return Err(format!(
                "sequence gap: expected {}, got {}",
                next_seq(state.last_received),
                seq
            )
            .into());
        }
        SeqDecision::Deliver => {}
    }

    if let Some(record) = record {
        tx.send(record)
            .await
            .map_err(|_| "input queue closed, agent shutting down")?;
    }
    state.last_received = seq;

    if seq_distance(state.last_ack, state.last_received) >= state.ack_window() {
        let mut ack = BytesMut::new();
        encode_ack(ProtocolVersion::V1, state.last_received, &mut ack);
        conn.write_all(&ack).await?;
        conn.flush().await?;
        state.last_ack = state.last_received;
    }
    Ok(())
}

fn record_from_pairs(pairs: Vec<(String, String)>) -> Option<RawRecord> {
    let mut record = RawRecord::default();
    for (k, v) in pairs {
        if k == "line" {
            record.line = v.clone();
        }
        if k == "tags" {
            if let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(&v) {
                record.fields.push((k, Value::Array(arr)));
                continue;
            }
        }
        record.fields.push((k, Value::from(v)));
    }
    Some(record)
}

fn record_from_json(payload: &[u8]) -> Option<RawRecord> {
    let map: Map<String, Value> = serde_json::from_slice(payload).ok()?;
    let mut record = RawRecord::default();
    for (k, v) in map {
        if k == "line" {
            if let Some(s) = v.as_str() {
                record.line = s.to_string();
            }
        }
        record.fields.push((k, v));
    }
    Some(record)
}

/// The per-worker pull end of a lumberjack listener.
pub struct LumberjackInput {
    handle: LumberjackServerHandle,
}

impl LumberjackInput {
    pub fn new(handle: LumberjackServerHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Input for LumberjackInput {
    async fn pull(&mut self, max: usize) -> Option<Vec<RawRecord>> {
        let mut rx = self.handle.rx.lock().await;
        let mut out = Vec::new();
        while out.len() < max {
            match rx.try_recv() {
                Ok(record) => out.push(record),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if out.is_empty() {
                        return None;
                    }
                    break;
                }
            }
        }
        Some(out)
    }
}
