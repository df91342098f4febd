//! Pipelined request/response client over a single TCP connection.
//!
//! Replies carry no request id: they are matched to requests purely by order. Each
//! request pushes a one-shot waiter onto a FIFO queue and the reader task resolves the
//! oldest waiter every time a full reply has been decoded.

mod error;

pub use error::ClientError;

use crate::prelude::*;
use bytes::{Buf, BytesMut};
use resp_wire::{Argument, Decoded, ReplyError, Value, decode_one, encode_request};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const CLIENT_TARGET: &str = "procgraph::client";

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

type Waiter = oneshot::Sender<Result<Value, ClientError>>;

#[derive(Default)]
struct Pending {
    waiters: VecDeque<Waiter>,
    /// Set once the connection is unusable. Later requests fail with this error.
    failure: Option<ClientError>,
}

impl Pending {
    fn fail_all(&mut self, err: ClientError) {
        if self.failure.is_none() {
            self.failure = Some(err.clone());
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Maximum time to wait for a reply (and for the connection to open).
    /// Expiry poisons the connection.
    pub request_timeout: Option<Duration>,
}

/// A request that has been written to the socket and awaits its reply.
#[must_use = "the reply must be awaited to observe errors"]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Value, ClientError>>,
}

impl PendingReply {
    pub async fn wait(self) -> Result<Value, ClientError> {
        // The sender is only dropped without a value if the reader task was torn down.
        self.rx.await.unwrap_or(Err(ClientError::Closed))
    }
}

pub struct RespClient {
    writer: OwnedWriteHalf,
    pending: Arc<Mutex<Pending>>,
    reader: JoinHandle<()>,
    options: ClientOptions,
}

impl RespClient {
    pub async fn connect(host: &str, port: u16, options: ClientOptions) -> Result<Self, ClientError> {
        debug!(target: CLIENT_TARGET, "Connecting to {host}:{port}");
        let connect = TcpStream::connect((host, port));
        let stream = match options.request_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => connect.await,
        }
        .map_err(|err| ClientError::Transport(format!("Failed to connect to {host}:{port}: {err}")))?;

        if let Err(err) = stream.set_nodelay(true) {
            trace!(target: CLIENT_TARGET, "Could not disable Nagle's algorithm: {err}");
        }

        let (read_half, writer) = stream.into_split();
        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_replies(read_half, Arc::clone(&pending)));

        Ok(Self {
            writer,
            pending,
            reader,
            options,
        })
    }

    /// Write a request and register its waiter, without waiting for the reply.
    ///
    /// Several requests may be submitted before awaiting any of them: replies are
    /// delivered to the [`PendingReply`] handles in submission order.
    pub async fn submit<A: Argument>(&mut self, args: &[A]) -> Result<PendingReply, ClientError> {
        let frame = encode_request(args);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if let Some(failure) = &pending.failure {
                return Err(failure.clone());
            }
            pending.waiters.push_back(tx);
        }

        trace!(target: CLIENT_TARGET, "Sending {} bytes", frame.len());
        if let Err(err) = self.writer.write_all(&frame).await {
            let err = ClientError::Transport(err.to_string());
            self.poison(err.clone());
            return Err(err);
        }

        Ok(PendingReply { rx })
    }

    /// Send a request and wait for its reply.
    pub async fn send<A: Argument>(&mut self, args: &[A]) -> Result<Value, ClientError> {
        let reply = self.submit(args).await?;
        let Some(limit) = self.options.request_timeout else {
            return reply.wait().await;
        };

        match tokio::time::timeout(limit, reply.wait()).await {
            Ok(result) => result,
            Err(_) => {
                let err = ClientError::Timeout(limit);
                self.poison(err.clone());
                Err(err)
            }
        }
    }

    /// Gracefully shut down the write side of the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        debug!(target: CLIENT_TARGET, "Closing connection");
        self.writer
            .shutdown()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))
    }

    fn poison(&self, err: ClientError) {
        warn!(target: CLIENT_TARGET, "Connection is no longer usable: {err}");
        lock(&self.pending).fail_all(err);
        self.reader.abort();
    }
}

impl Drop for RespClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_replies(mut reader: OwnedReadHalf, pending: Arc<Mutex<Pending>>) {
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    loop {
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                debug!(target: CLIENT_TARGET, "Socket closed by peer");
                lock(&pending).fail_all(ClientError::Closed);
                return;
            }
            Ok(read) => trace!(target: CLIENT_TARGET, "Received {read} bytes"),
            Err(err) => {
                debug!(target: CLIENT_TARGET, "Socket error: {err}");
                lock(&pending).fail_all(ClientError::Transport(err.to_string()));
                return;
            }
        }

        let usable = {
            let mut pending = lock(&pending);
            dispatch_replies(&mut buffer, &mut pending)
        };
        if !usable {
            return;
        }
    }
}

/// Resolve waiters, oldest first, with every complete reply at the front of `buffer`.
///
/// Returns `false` once the stream turned out to be malformed.
fn dispatch_replies(buffer: &mut BytesMut, pending: &mut Pending) -> bool {
    while !pending.waiters.is_empty() {
        let Decoded::Complete { reply, consumed } = decode_one(&buffer[..]) else {
            break;
        };
        buffer.advance(consumed);

        let malformed = matches!(reply, Err(ReplyError::Protocol(_)));
        let reply = reply.map_err(ClientError::from);
        if let Some(waiter) = pending.waiters.pop_front() {
            let _ = waiter.send(reply.clone());
        }

        if malformed {
            if let Err(err) = reply {
                pending.fail_all(err);
            }
            return false;
        }
    }
    true
}
