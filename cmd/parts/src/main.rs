//! Record splitting demo
//!
//! Splits a file into delimiter-separated records on a worker thread,
//! collects them in a memory-or-disk accumulator, and reports back to
//! the main thread's event loop through a trigger.
//!
//! # Usage
//!
//! ```text
//! parts <file> [delimiter]
//! ```
//!
//! # Environment Variables
//!
//! - `IOB_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `IOB_FLUSH_EPRINT=1` - Flush log output immediately
//! - `IOB_CHUNK_SIZE`, `IOB_MEMDISK_THRESHOLD`, `IOB_TMP_TEMPLATE` - see `RuntimeConfig`
//! - `IOB_PRINT_CONFIG=1` - Print the effective configuration first

use iobase::evloop::{Completion, SelfAlive};
use iobase::{env_get_bool, kdebug, kerror, kinfo};
use iobase::{Access, Blob, BlobSequence, EventLoop, File, MemDisk, PartIterator, RuntimeConfig};
use std::sync::mpsc;
use std::thread;

#[derive(Debug, Default)]
struct Summary {
    ok: bool,
    records: usize,
    longest: usize,
    bytes: usize,
    spilled: bool,
    preview: String,
}

const PREVIEW_RECORDS: usize = 3;

fn split(path: &str, delim: &[u8], config: &RuntimeConfig) -> Summary {
    let mut summary = Summary::default();

    let file = File::open_with_config(path, Access::RdOnly, config);
    if !file.is_ok() {
        kerror!("cannot open {}", path);
        return summary;
    }
    kdebug!("{} is {} bytes", path, file.len());

    let mut parts = PartIterator::new(&file, delim, config.chunk_size);
    let mut out = MemDisk::with_config(config);
    let mut preview = BlobSequence::new();

    while let Some(record) = parts.next() {
        if summary.records < PREVIEW_RECORDS {
            if !preview.is_empty() {
                preview.concat_slice(b" | ");
            }
            preview.concat_blob(Blob::copy_from(record));
        }
        summary.records += 1;
        summary.longest = summary.longest.max(record.len());
        out.append(record).append(b"\n");
    }

    summary.ok = out.finish() && out.is_ok();
    summary.bytes = out.len();
    summary.spilled = out.is_spilled();
    summary.preview = String::from_utf8_lossy(&preview.to_vec()).into_owned();
    summary
}

fn report(summary: &Summary) {
    println!("records:  {}", summary.records);
    println!("longest:  {}", summary.longest);
    println!("output:   {} bytes ({})", summary.bytes, if summary.spilled { "disk" } else { "memory" });
    println!("preview:  {}", summary.preview);
}

// IOB_LOG_LEVEL=debug cargo run -p iobase-parts -- /etc/passwd :
fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1).cloned() else {
        eprintln!("usage: parts <file> [delimiter]");
        std::process::exit(2);
    };
    let delim = args.get(2).map_or_else(|| b"\n".to_vec(), |d| d.as_bytes().to_vec());

    let config = RuntimeConfig::from_env();
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(2);
    }
    if env_get_bool("IOB_PRINT_CONFIG", false) {
        config.print();
    }

    let mut evloop = match EventLoop::with_config(config.clone()) {
        Ok(evloop) => evloop,
        Err(e) => {
            kerror!("event loop: {}", e);
            std::process::exit(1);
        }
    };

    let done = Completion::new();
    let (tx, rx) = mpsc::channel::<Summary>();

    let on_done = {
        let done = done.clone();
        move || {
            if let Ok(summary) = rx.try_recv() {
                report(&summary);
                if !summary.ok {
                    kerror!("splitting failed");
                }
                done.complete();
            }
        }
    };
    let (_token, trigger) = match evloop.new_trigger(on_done) {
        Ok(pair) => pair,
        Err(e) => {
            kerror!("trigger: {}", e);
            std::process::exit(1);
        }
    };

    let worker = thread::spawn(move || {
        let summary = split(&path, &delim, &config);
        let ok = summary.ok;
        let _ = tx.send(summary);
        trigger.trigger();
        ok
    });

    kinfo!("waiting for worker");
    let mut pending = vec![done];
    if !evloop.wait_until_complete::<_, SelfAlive>(&mut pending) {
        kerror!("event loop wait failed");
        std::process::exit(1);
    }

    match worker.join() {
        Ok(true) => {}
        _ => std::process::exit(1),
    }
}
