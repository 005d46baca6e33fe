// src/connection/client.rs

//! An asynchronous client session to a RESP store.
//!
//! One TCP connection, one request/reply exchange at a time. Callers on
//! different tasks share the session through `&self`; exchanges are serialized
//! by an internal mutex so replies are never interleaved.

use crate::core::StoreError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

// Backoff between connect attempts.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(50);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Everything needed to open a session.
#[derive(Clone)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: Option<u32>,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    /// Additional connect attempts after the first one fails.
    pub retries: u32,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Condition attached to a `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    /// `NX`: write only if the key does not exist.
    IfNotExists,
}

/// An open session to the store.
pub struct StoreClient {
    framed: Mutex<Framed<TcpStream, RespFrameCodec>>,
    endpoint: String,
    response_timeout: Duration,
    // Raised while an exchange is in flight and left raised if it never completes;
    // the stream may then hold a stale reply.
    broken: AtomicBool,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("endpoint", &self.endpoint)
            .field("response_timeout", &self.response_timeout)
            .field("broken", &self.broken.load(Ordering::Relaxed))
            .finish()
    }
}

impl StoreClient {
    /// Connects with retries, then authenticates and selects the database.
    pub async fn connect(settings: &ClientSettings) -> Result<Self, StoreError> {
        let endpoint = format!("{}:{}", settings.host, settings.port);
        let stream = connect_with_retries(&endpoint, settings).await?;
        stream.set_nodelay(true)?;

        let client = Self {
            framed: Mutex::new(Framed::new(stream, RespFrameCodec)),
            endpoint,
            response_timeout: settings.response_timeout,
            broken: AtomicBool::new(false),
        };
        client.handshake(settings).await?;
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns false once an exchange failed or was abandoned and the session
    /// must be reopened. Also false for the duration of an exchange in flight.
    pub fn is_healthy(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }

    async fn handshake(&self, settings: &ClientSettings) -> Result<(), StoreError> {
        if let Some(password) = settings.password.as_deref() {
            self.execute(RespFrame::command([
                Bytes::from_static(b"AUTH"),
                Bytes::copy_from_slice(password.as_bytes()),
            ]))
            .await?
            .expect_ok("AUTH")?;
        }
        if let Some(db) = settings.database {
            self.execute(RespFrame::command([
                Bytes::from_static(b"SELECT"),
                Bytes::from(db.to_string()),
            ]))
            .await?
            .expect_ok("SELECT")?;
        }
        Ok(())
    }

    /// Sends one command and waits for its reply, bounded by the response timeout.
    /// Error replies are returned as `StoreError::Server`.
    pub async fn execute(&self, frame: RespFrame) -> Result<RespFrame, StoreError> {
        let mut framed = self.framed.lock().await;
        // Checked under the lock: the previous holder may have been cancelled mid-exchange.
        if !self.is_healthy() {
            return Err(StoreError::transport(
                ErrorKind::NotConnected,
                format!("session to {} is broken; reopen the component", self.endpoint),
            ));
        }

        // Cleared only once the reply is read in full. A caller dropping this
        // future between send and receive leaves the session poisoned.
        self.broken.store(true, Ordering::Release);

        let exchange = async {
            framed.send(frame).await?;
            framed.next().await.unwrap_or_else(|| {
                Err(StoreError::transport(
                    ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ))
            })
        };

        let reply = match tokio::time::timeout(self.response_timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(StoreError::transport(
                    ErrorKind::TimedOut,
                    format!(
                        "no reply from {} within {:?}",
                        self.endpoint, self.response_timeout
                    ),
                ));
            }
        };
        self.broken.store(false, Ordering::Release);
        reply.into_result()
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self
            .execute(RespFrame::command([Bytes::from_static(b"PING")]))
            .await?
        {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("PONG") => Ok(()),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to PING: {other:?}"
            ))),
        }
    }

    /// `GET key`. Returns `None` for a missing or expired key.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let reply = self
            .execute(RespFrame::command([
                Bytes::from_static(b"GET"),
                Bytes::copy_from_slice(key.as_bytes()),
            ]))
            .await?;
        match reply {
            RespFrame::BulkString(b) => Ok(Some(b)),
            RespFrame::Null => Ok(None),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to GET: {other:?}"
            ))),
        }
    }

    /// `SET key value [PX ttl] [NX]`. Returns whether the write applied.
    /// `ttl_ms` of `None` or `Some(0)` writes without expiry.
    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl_ms: Option<u64>,
        condition: SetCondition,
    ) -> Result<bool, StoreError> {
        let mut parts = vec![
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key.as_bytes()),
            value,
        ];
        if let Some(ttl) = ttl_ms.filter(|t| *t > 0) {
            parts.push(Bytes::from_static(b"PX"));
            parts.push(Bytes::from(ttl.to_string()));
        }
        if condition == SetCondition::IfNotExists {
            parts.push(Bytes::from_static(b"NX"));
        }

        match self.execute(RespFrame::command(parts)).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(true),
            RespFrame::Null => Ok(false),
            other => Err(StoreError::Protocol(format!(
                "unexpected reply to SET: {other:?}"
            ))),
        }
    }

    /// `DEL key`. Returns the number of keys removed.
    pub async fn del(&self, key: &str) -> Result<i64, StoreError> {
        let reply = self
            .execute(RespFrame::command([
                Bytes::from_static(b"DEL"),
                Bytes::copy_from_slice(key.as_bytes()),
            ]))
            .await?;
        reply.into_integer("DEL")
    }

    /// Runs a server-side script by digest, loading it with `EVAL` if the store
    /// does not have it cached yet.
    pub async fn eval_script(
        &self,
        sha1: &str,
        source: &str,
        keys: &[&str],
        args: &[&str],
    ) -> Result<RespFrame, StoreError> {
        let tail = || {
            let mut parts = vec![Bytes::from(keys.len().to_string())];
            parts.extend(keys.iter().map(|k| Bytes::copy_from_slice(k.as_bytes())));
            parts.extend(args.iter().map(|a| Bytes::copy_from_slice(a.as_bytes())));
            parts
        };

        let mut by_digest = vec![
            Bytes::from_static(b"EVALSHA"),
            Bytes::copy_from_slice(sha1.as_bytes()),
        ];
        by_digest.extend(tail());
        match self.execute(RespFrame::command(by_digest)).await {
            Err(StoreError::Server(msg)) if msg.starts_with("NOSCRIPT") => {
                debug!(sha1, "Script not cached on the store; sending source.");
                let mut by_source = vec![
                    Bytes::from_static(b"EVAL"),
                    Bytes::copy_from_slice(source.as_bytes()),
                ];
                by_source.extend(tail());
                self.execute(RespFrame::command(by_source)).await
            }
            other => other,
        }
    }

    /// Shuts the write half down so the peer sees a clean close.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let mut framed = self.framed.lock().await;
        framed.get_mut().shutdown().await?;
        Ok(())
    }
}

async fn connect_with_retries(
    endpoint: &str,
    settings: &ClientSettings,
) -> Result<TcpStream, StoreError> {
    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt: u32 = 0;

    loop {
        let err =
            match tokio::time::timeout(settings.connect_timeout, TcpStream::connect(endpoint))
                .await
            {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => StoreError::from(e),
                Err(_) => StoreError::transport(
                    ErrorKind::TimedOut,
                    format!(
                        "connect to {endpoint} timed out after {:?}",
                        settings.connect_timeout
                    ),
                ),
            };

        if attempt >= settings.retries {
            return Err(err);
        }
        attempt += 1;

        // Jitter keeps many clients from reconnecting in lockstep.
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..25));
        let wait = delay + jitter;
        warn!(
            "Connect to {} failed ({}); retry {}/{} in {:?}",
            endpoint, err, attempt, settings.retries, wait
        );
        tokio::time::sleep(wait).await;
        delay = (delay * 2).min(MAX_RETRY_DELAY);
    }
}
