//! In-process RESP server for unit tests.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::resp::Reply;

type Handler = dyn Fn(&[Vec<u8>]) -> Reply + Send + Sync;

/// Connection counters shared with the accept loop.
#[derive(Default)]
pub(crate) struct Counters {
    pub accepted: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

pub(crate) struct MockServer {
    pub addr: String,
    pub counters: Arc<Counters>,
}

impl MockServer {
    /// Serves every connection on its own thread, answering each command
    /// with `handler`.
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let counters = Arc::new(Counters::default());
        let handler: Arc<Handler> = Arc::new(handler);

        let accept_counters = counters.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let counters = accept_counters.clone();
                let handler = handler.clone();
                counters.accepted.fetch_add(1, Ordering::SeqCst);
                let live = counters.live.fetch_add(1, Ordering::SeqCst) + 1;
                counters.max_live.fetch_max(live, Ordering::SeqCst);
                thread::spawn(move || {
                    serve(stream, handler.as_ref());
                    counters.live.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        MockServer { addr, counters }
    }

    /// Answers `+OK` to everything.
    pub fn ok() -> Self {
        MockServer::spawn(|_| Reply::Simple(b"OK".to_vec()))
    }

    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Waits up to a second for the accept loop to observe `expected`
    /// connections, then returns the count it saw.
    pub fn wait_accepted(&self, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(1);
        while self.accepted() < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.accepted()
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, handler: &Handler) {
    let Ok(write_half) = stream.try_clone() else { return };
    let mut writer = write_half;
    let mut reader = BufReader::new(stream);
    while let Some(args) = read_command(&mut reader) {
        let mut out = Vec::new();
        handler(&args).encode(&mut out);
        if writer.write_all(&out).is_err() {
            break;
        }
    }
}

pub(crate) fn read_command<R: BufRead>(reader: &mut R) -> Option<Vec<Vec<u8>>> {
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
