//! # Client Smoke Driver
//!
//! Purpose: Exercise a live server through the pooled client: store and
//! read back a value, push onto a list, and print what comes back.
//!
//! ## Usage
//!
//! ```text
//! cargo run -p lkv-client --features demo -- [HOST] [PORT] [DB] [MIN_CONNS]
//! lkv-demo [HOST] [PORT] [DB] [MIN_CONNS]
//! RUST_LOG=lkv_client=debug lkv-demo 127.0.0.1 6379 0 2
//! ```

use std::env;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lkv_client::{ClientTtl, KVClient, Pool, PoolConfig};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;

struct DemoConfig {
    host: String,
    port: u16,
    database: u32,
    min_conns: usize,
}

impl DemoConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        DemoConfig {
            host: args.next().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(args.next(), DEFAULT_PORT),
            database: parse_or(args.next(), 0),
            min_conns: parse_or(args.next(), PoolConfig::default().min_conns),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, fallback: T) -> T {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = DemoConfig::from_args();
    let pool = Pool::connect(&config.host, config.port, config.database, config.min_conns)
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;
    info!(status = ?pool.status(), "pool started");

    let client = KVClient::from_pool(pool.clone());
    client.set("key3", 34323523).context("SET key3")?;
    info!(value = %client.get_string_or_default("key3"), "GET key3");
    info!(value = client.get_int_or_default("key3"), "GET key3 as integer");

    match client.ttl("key3")? {
        ClientTtl::ExpiresIn(left) => info!(?left, "key3 expires"),
        ttl => info!(?ttl, "key3 ttl"),
    }

    let len = client
        .lpush("list5", [4, 5, 6, 6])
        .and_then(|_| client.lpush("list5", ["aaa"]))
        .context("LPUSH list5")?;
    let items = pool.execute("LRANGE list5 0 -1").context("LRANGE list5")?;
    info!(len, ?items, "list5");

    pool.close();
    Ok(())
}
