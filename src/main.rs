// src/main.rs

//! A small command-line driver for the cache and lock components.

use anyhow::{Context, Result, anyhow};
use spinelkv::{Cache, ConfigParams, Lock, Openable, StoreCache, StoreConfig, StoreLock};
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

const USAGE: &str = "Usage: spinelkv [--config path] <command>

Commands:
  ping
  get <key>
  set <key> <json> [ttl_ms]
  del <key>
  try-lock <key> <ttl_ms>";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("SPINELKV_BUILD_VERSION");

    let mut args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version") {
        println!("spinelkv version {VERSION}");
        return Ok(());
    }

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--config flag requires a value"))?;
            args.drain(i..=i + 1);
            StoreConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from '{path}'"))?
        }
        None => StoreConfig::from_params(&ConfigParams::from_tuples([(
            "connection.host",
            "localhost",
        )]))?,
    };

    if let Err(e) = run(config, &args).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

async fn run(config: StoreConfig, args: &[String]) -> Result<()> {
    let arg = |i: usize| {
        args.get(i)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing argument\n\n{USAGE}"))
    };

    match arg(0)? {
        "ping" => {
            let cache = StoreCache::with_config(config);
            cache.open().await?;
            let result = cache.connection().client()?.ping().await;
            cache.close().await?;
            result?;
            println!("PONG");
        }
        "get" => {
            let cache = StoreCache::with_config(config);
            cache.open().await?;
            let result = cache.retrieve::<serde_json::Value>(arg(1)?).await;
            cache.close().await?;
            match result? {
                Some(value) => println!("{value}"),
                None => println!("(nil)"),
            }
        }
        "set" => {
            let value: serde_json::Value =
                serde_json::from_str(arg(2)?).context("value must be valid JSON")?;
            let ttl_ms = match args.get(3) {
                Some(raw) => raw.parse().context("ttl_ms must be an integer")?,
                None => 0,
            };
            let cache = StoreCache::with_config(config);
            cache.open().await?;
            let result = cache.store(arg(1)?, value, ttl_ms).await;
            cache.close().await?;
            match result? {
                Some(_) => println!("OK"),
                None => println!("(not stored)"),
            }
        }
        "del" => {
            let cache = StoreCache::with_config(config);
            cache.open().await?;
            let result = cache.remove(arg(1)?).await;
            cache.close().await?;
            result?;
            println!("OK");
        }
        "try-lock" => {
            let ttl_ms: u64 = arg(2)?.parse().context("ttl_ms must be an integer")?;
            let lock = StoreLock::with_config(config);
            lock.open().await?;
            let result = lock.try_acquire(arg(1)?, ttl_ms).await;
            lock.close().await?;
            if result? {
                println!("acquired {}", lock.token());
            } else {
                println!("busy");
            }
        }
        other => return Err(anyhow!("unknown command '{other}'\n\n{USAGE}")),
    }
    Ok(())
}
