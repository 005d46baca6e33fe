// tests/integration/test_helpers.rs

//! Test helpers: an in-process RESP store and component constructors.
//!
//! `FakeStore` speaks just enough of the protocol for the cache and lock:
//! PING, AUTH, SELECT, GET, SET [PX ms] [NX], DEL, EVAL / EVALSHA of the lock
//! release script, and QUIT. Keys expire on read once their deadline passes.
//! Two reserved keys misbehave on purpose: see `STALL_KEY` and `REJECT_KEY`.

#![allow(dead_code)]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use sha1::{Digest, Sha1};
use spinelkv::core::protocol::{RespFrame, RespFrameCodec};
use spinelkv::{ConfigParams, StoreCache, StoreLock};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;

/// A key whose `GET` is never answered, for exercising response timeouts.
pub const STALL_KEY: &str = "__stall__";

/// A key whose `SET` is refused with a null reply and writes nothing.
pub const REJECT_KEY: &str = "__reject__";

#[derive(Default)]
struct StoreData {
    entries: HashMap<Bytes, (Bytes, Option<Instant>)>,
    scripts: HashSet<String>,
    commands: Vec<String>,
}

impl StoreData {
    fn live_value(&mut self, key: &Bytes) -> Option<Bytes> {
        let expired = matches!(
            self.entries.get(key),
            Some((_, Some(deadline))) if *deadline <= Instant::now()
        );
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(value, _)| value.clone())
    }
}

/// An in-process RESP store bound to an ephemeral localhost port.
pub struct FakeStore {
    addr: SocketAddr,
    data: Arc<Mutex<StoreData>>,
    accept_task: JoinHandle<()>,
}

impl FakeStore {
    pub async fn start() -> Self {
        Self::start_with_password(None).await
    }

    pub async fn start_with_password(password: Option<&str>) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake store");
        let addr = listener.local_addr().expect("fake store address");
        let data = Arc::new(Mutex::new(StoreData::default()));
        let password = password.map(str::to_string);

        let shared = data.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let data = shared.clone();
                let password = password.clone();
                tokio::spawn(serve(socket, data, password));
            }
        });

        Self {
            addr,
            data,
            accept_task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Configuration pointing a component at this store.
    pub fn params(&self) -> ConfigParams {
        ConfigParams::from_tuples([
            ("connection.host", "127.0.0.1".to_string()),
            ("connection.port", self.port().to_string()),
            ("options.timeout", "500".to_string()),
            ("options.connect_timeout", "500".to_string()),
            ("options.retries", "0".to_string()),
        ])
    }

    /// The raw stored value, ignoring expiry bookkeeping done by reads.
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        let mut data = self.data.lock().unwrap();
        data.live_value(&Bytes::copy_from_slice(key.as_bytes()))
    }

    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        let mut data = self.data.lock().unwrap();
        data.entries.insert(
            Bytes::copy_from_slice(key.as_bytes()),
            (Bytes::copy_from_slice(value), None),
        );
    }

    /// Names of every command received so far, uppercased, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.data.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.data.lock().unwrap().commands.clear();
    }
}

impl Drop for FakeStore {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Opens a cache against `store`.
pub async fn open_cache(store: &FakeStore) -> StoreCache {
    use spinelkv::Openable;
    let cache = StoreCache::new();
    cache.configure(&store.params()).expect("configure cache");
    cache.open().await.expect("open cache");
    cache
}

/// Opens a lock against `store`.
pub async fn open_lock(store: &FakeStore) -> StoreLock {
    use spinelkv::Openable;
    let lock = StoreLock::new();
    lock.configure(&store.params()).expect("configure lock");
    lock.open().await.expect("open lock");
    lock
}

fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

async fn serve(socket: TcpStream, data: Arc<Mutex<StoreData>>, password: Option<String>) {
    let mut framed = Framed::new(socket, RespFrameCodec);
    let mut authenticated = password.is_none();

    while let Some(Ok(frame)) = framed.next().await {
        let args = match frame {
            RespFrame::Array(items) => items
                .into_iter()
                .filter_map(|f| match f {
                    RespFrame::BulkString(b) => Some(b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            _ => {
                let _ = framed
                    .send(RespFrame::Error("ERR protocol error".into()))
                    .await;
                continue;
            }
        };
        let Some(name) = args.first() else { continue };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        data.lock().unwrap().commands.push(name.clone());

        if name == "GET" && args.get(1).map(|k| &k[..]) == Some(STALL_KEY.as_bytes()) {
            // Never answer; the client must time out on its own.
            continue;
        }

        let reply = if name == "AUTH" {
            let given = args.last().cloned().unwrap_or_default();
            if password.as_deref().map(str::as_bytes) == Some(&given[..]) {
                authenticated = true;
                RespFrame::SimpleString("OK".into())
            } else {
                RespFrame::Error("WRONGPASS invalid username-password pair".into())
            }
        } else if !authenticated {
            RespFrame::Error("NOAUTH Authentication required.".into())
        } else {
            let mut data = data.lock().unwrap();
            execute(&mut data, &name, &args[1..])
        };

        if framed.send(reply).await.is_err() || name == "QUIT" {
            break;
        }
    }
}

fn execute(data: &mut StoreData, name: &str, args: &[Bytes]) -> RespFrame {
    match (name, args) {
        ("PING", _) => RespFrame::SimpleString("PONG".into()),
        ("QUIT", _) | ("SELECT", [_]) => RespFrame::SimpleString("OK".into()),
        ("GET", [key]) => match data.live_value(key) {
            Some(value) => RespFrame::BulkString(value),
            None => RespFrame::Null,
        },
        ("SET", [key, value, options @ ..]) => set(data, key, value, options),
        ("DEL", keys) if !keys.is_empty() => {
            let mut removed = 0;
            for key in keys {
                if data.live_value(key).is_some() {
                    data.entries.remove(key);
                    removed += 1;
                }
            }
            RespFrame::Integer(removed)
        }
        ("EVAL", [source, rest @ ..]) => {
            let sha1 = hex::encode(Sha1::digest(source));
            data.scripts.insert(sha1);
            compare_and_delete(data, rest)
        }
        ("EVALSHA", [sha1, rest @ ..]) => {
            if data.scripts.contains(&String::from_utf8_lossy(sha1).to_string()) {
                compare_and_delete(data, rest)
            } else {
                RespFrame::Error("NOSCRIPT No matching script. Please use EVAL.".into())
            }
        }
        _ => RespFrame::Error(format!("ERR unknown command or arguments for '{name}'")),
    }
}

fn set(data: &mut StoreData, key: &Bytes, value: &Bytes, options: &[Bytes]) -> RespFrame {
    let mut deadline = None;
    let mut only_if_absent = false;
    let mut i = 0;
    while i < options.len() {
        match String::from_utf8_lossy(&options[i]).to_ascii_uppercase().as_str() {
            "PX" => {
                let Some(ms) = options
                    .get(i + 1)
                    .and_then(|v| String::from_utf8_lossy(v).parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                else {
                    return RespFrame::Error("ERR invalid expire time in 'set' command".into());
                };
                deadline = Some(Instant::now() + Duration::from_millis(ms));
                i += 2;
            }
            "NX" => {
                only_if_absent = true;
                i += 1;
            }
            _ => return RespFrame::Error("ERR syntax error".into()),
        }
    }

    if &key[..] == REJECT_KEY.as_bytes() {
        return RespFrame::Null;
    }
    if only_if_absent && data.live_value(key).is_some() {
        return RespFrame::Null;
    }
    data.entries.insert(key.clone(), (value.clone(), deadline));
    RespFrame::SimpleString("OK".into())
}

// The only script the client sends: delete KEYS[1] if it equals ARGV[1].
fn compare_and_delete(data: &mut StoreData, rest: &[Bytes]) -> RespFrame {
    let [numkeys, key, token] = rest else {
        return RespFrame::Error("ERR wrong number of arguments for script".into());
    };
    if &numkeys[..] != b"1" {
        return RespFrame::Error("ERR unexpected number of keys".into());
    }
    if data.live_value(key).as_ref() == Some(token) {
        data.entries.remove(key);
        RespFrame::Integer(1)
    } else {
        RespFrame::Integer(0)
    }
}
