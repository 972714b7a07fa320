//! In-memory RESP store used by the integration tests.
//!
//! Supports just enough string, list, and set commands to exercise the pool
//! and the client helpers. Every connection runs on its own thread and keeps
//! its own selected database.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lkv_client::Reply;

enum Value {
    Str(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

type Store = Mutex<HashMap<(u32, Vec<u8>), Value>>;

#[derive(Default)]
struct Counters {
    accepted: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

pub struct TestServer {
    pub addr: String,
    counters: Arc<Counters>,
}

impl TestServer {
    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    /// Polls until `check` holds or a second passes.
    pub fn eventually(&self, check: impl Fn(&TestServer) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if check(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check(self)
    }
}

/// Starts a store that answers immediately.
pub fn spawn_store() -> TestServer {
    spawn_store_with_delay(Duration::ZERO)
}

/// Starts a store that sleeps `delay` before every reply.
pub fn spawn_store_with_delay(delay: Duration) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let counters = Arc::new(Counters::default());
    let store: Arc<Store> = Arc::new(Mutex::new(HashMap::new()));

    let accept_counters = counters.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let counters = accept_counters.clone();
            let store = store.clone();
            counters.accepted.fetch_add(1, Ordering::SeqCst);
            let live = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
            counters.max_live.fetch_max(live, Ordering::SeqCst);
            thread::spawn(move || {
                serve(stream, &store, delay);
                counters.live.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    TestServer { addr, counters }
}

fn serve(stream: TcpStream, store: &Store, delay: Duration) {
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    let mut db = 0u32;
    while let Some(args) = read_command(&mut reader) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let reply = dispatch(&args, &mut db, store);
        let mut out = Vec::new();
        reply.encode(&mut out);
        if writer.write_all(&out).is_err() {
            break;
        }
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<Vec<u8>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).ok()?;
        data.truncate(len);
        args.push(data);
    }
    Some(args)
}

fn ok() -> Reply {
    Reply::Simple(b"OK".to_vec())
}

fn err(message: &str) -> Reply {
    Reply::Error(message.to_string())
}

fn wrong_type() -> Reply {
    err("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn int(value: usize) -> Reply {
    Reply::Integer(value as i64)
}

fn parse<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn dispatch(args: &[Vec<u8>], db: &mut u32, store: &Store) -> Reply {
    let Some(verb) = args.first() else {
        return err("ERR empty command");
    };
    let verb = String::from_utf8_lossy(verb).to_ascii_uppercase();
    let mut data = store.lock().expect("store lock");
    let current_db = *db;
    let key = |idx: usize| (current_db, args[idx].clone());

    match (verb.as_str(), args.len()) {
        ("PING", 1) => Reply::Simple(b"PONG".to_vec()),
        ("PING", 2) => Reply::Bulk(args[1].clone()),
        ("SELECT", 2) => match parse::<u32>(&args[1]) {
            Some(index) if index < 16 => {
                *db = index;
                ok()
            }
            _ => err("ERR DB index is out of range"),
        },
        ("GET", 2) => match data.get(&key(1)) {
            Some(Value::Str(value)) => Reply::Bulk(value.clone()),
            Some(_) => wrong_type(),
            None => Reply::Nil,
        },
        ("SET", n) if n >= 3 => {
            let exists = data.contains_key(&key(1));
            let mut idx = 3;
            let mut allowed = true;
            while idx < n {
                match args[idx].to_ascii_uppercase().as_slice() {
                    b"EX" | b"PX" => idx += 1,
                    b"NX" => allowed &= !exists,
                    b"XX" => allowed &= exists,
                    _ => return err("ERR syntax error"),
                }
                idx += 1;
            }
            if !allowed {
                return Reply::Nil;
            }
            data.insert(key(1), Value::Str(args[2].clone()));
            ok()
        }
        ("INCRBY", 3) => {
            let Some(delta) = parse::<i64>(&args[2]) else {
                return err("ERR value is not an integer or out of range");
            };
            let current = match data.get(&key(1)) {
                Some(Value::Str(value)) => match parse::<i64>(value) {
                    Some(n) => n,
                    None => return err("ERR value is not an integer or out of range"),
                },
                Some(_) => return wrong_type(),
                None => 0,
            };
            let next = current + delta;
            data.insert(key(1), Value::Str(next.to_string().into_bytes()));
            Reply::Integer(next)
        }
        ("DEL", n) if n >= 2 => int((1..n).filter(|&i| data.remove(&key(i)).is_some()).count()),
        ("EXISTS", 2) => int(data.contains_key(&key(1)) as usize),
        ("EXPIRE", 3) => int(data.contains_key(&key(1)) as usize),
        ("TTL", 2) => Reply::Integer(if data.contains_key(&key(1)) { -1 } else { -2 }),
        ("LPUSH" | "RPUSH", n) if n >= 3 => {
            let entry = data
                .entry(key(1))
                .or_insert_with(|| Value::List(VecDeque::new()));
            let Value::List(list) = entry else {
                return wrong_type();
            };
            for value in &args[2..] {
                if verb == "LPUSH" {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            int(list.len())
        }
        ("LPOP" | "RPOP", 2) => match data.get_mut(&key(1)) {
            Some(Value::List(list)) => {
                let popped = if verb == "LPOP" {
                    list.pop_front()
                } else {
                    list.pop_back()
                };
                popped.map_or(Reply::Nil, Reply::Bulk)
            }
            Some(_) => wrong_type(),
            None => Reply::Nil,
        },
        ("LRANGE", 4) => {
            let (Some(start), Some(stop)) = (parse::<i64>(&args[2]), parse::<i64>(&args[3])) else {
                return err("ERR value is not an integer or out of range");
            };
            match data.get(&key(1)) {
                Some(Value::List(list)) => {
                    let len = list.len() as i64;
                    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
                    let (start, stop) = (norm(start), norm(stop).min(len - 1));
                    let items = if start > stop {
                        Vec::new()
                    } else {
                        list.iter()
                            .skip(start as usize)
                            .take((stop - start + 1) as usize)
                            .map(|v| Reply::Bulk(v.clone()))
                            .collect()
                    };
                    Reply::Array(items)
                }
                Some(_) => wrong_type(),
                None => Reply::Array(Vec::new()),
            }
        }
        ("LLEN", 2) => match data.get(&key(1)) {
            Some(Value::List(list)) => int(list.len()),
            Some(_) => wrong_type(),
            None => int(0),
        },
        ("SADD", n) if n >= 3 => {
            let entry = data
                .entry(key(1))
                .or_insert_with(|| Value::Set(BTreeSet::new()));
            let Value::Set(set) = entry else {
                return wrong_type();
            };
            int(args[2..].iter().filter(|m| set.insert((*m).clone())).count())
        }
        ("SREM", n) if n >= 3 => match data.get_mut(&key(1)) {
            Some(Value::Set(set)) => int(args[2..].iter().filter(|m| set.remove(*m)).count()),
            Some(_) => wrong_type(),
            None => int(0),
        },
        ("SMEMBERS", 2) => match data.get(&key(1)) {
            Some(Value::Set(set)) => Reply::Array(set.iter().map(|m| Reply::Bulk(m.clone())).collect()),
            Some(_) => wrong_type(),
            None => Reply::Array(Vec::new()),
        },
        ("SISMEMBER", 3) => match data.get(&key(1)) {
            Some(Value::Set(set)) => int(set.contains(&args[2]) as usize),
            Some(_) => wrong_type(),
            None => int(0),
        },
        _ => err("ERR unknown command"),
    }
}
