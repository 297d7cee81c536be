use std::io::Write;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use iobase_runtime::{
    Completion, DerefAlive, Event, EventLoop, Filter, FnNode, Node, RuntimeConfig, SelfAlive,
};

fn test_loop() -> EventLoop {
    let config = RuntimeConfig::new().wait_timeout(Duration::from_secs(10));
    EventLoop::with_config(config).unwrap()
}

/// Reads whatever is pending and counts dispatches.
struct Reader {
    sock: UnixStream,
    hits: Arc<AtomicUsize>,
    alive_for: usize,
}

impl Node for Reader {
    fn ident(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    fn interest(&self) -> Filter {
        Filter::READ
    }

    fn on_event(&mut self, event: Event) {
        assert!(event.is_readable());
        let mut buf = [0u8; 64];
        let _ = std::io::Read::read(&mut self.sock, &mut buf);
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.hits.load(Ordering::SeqCst) < self.alive_for
    }
}

#[test]
fn readable_socket_dispatches_once() {
    let mut evloop = test_loop();
    let (ours, mut peer) = UnixStream::pair().unwrap();
    ours.set_nonblocking(true).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let token = evloop.add_event(Box::new(Reader {
        sock: ours,
        hits: hits.clone(),
        alive_for: usize::MAX,
    }));

    peer.write_all(b"ping").unwrap();
    assert!(evloop.wait(16));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(evloop.contains(token));
}

#[test]
fn dead_node_is_removed_after_dispatch() {
    let mut evloop = test_loop();
    let (ours, mut peer) = UnixStream::pair().unwrap();
    ours.set_nonblocking(true).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let token = evloop.add_event(Box::new(Reader { sock: ours, hits: hits.clone(), alive_for: 1 }));
    assert_eq!(evloop.len(), 1);

    peer.write_all(b"x").unwrap();
    assert!(evloop.wait(16));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!evloop.contains(token));
    assert!(evloop.is_empty());
}

#[test]
fn cross_thread_wake_returns_promptly() {
    let mut evloop = test_loop();
    let waker = evloop.waker();

    let start = Instant::now();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        assert!(waker.wake());
    });

    assert!(evloop.wait(16));
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
}

#[test]
fn panicking_callback_does_not_stop_the_loop() {
    let mut evloop = test_loop();
    let (ours, mut peer) = UnixStream::pair().unwrap();

    let node = FnNode::new(ours.as_raw_fd(), Filter::READ, |_: Event, done: &Completion| {
        done.complete();
        panic!("callback blew up");
    });
    let token = evloop.add_event(Box::new(node));

    peer.write_all(b"x").unwrap();
    assert!(evloop.wait(16));
    // completed before panicking, so it is gone
    assert!(!evloop.contains(token));

    assert!(evloop.wake());
    assert!(evloop.wait(16));
    drop(ours);
}

#[test]
fn trigger_runs_callback_on_loop_thread() {
    let mut evloop = test_loop();
    let fired = Arc::new(AtomicUsize::new(0));
    let done = Completion::new();

    let (token, trigger) = {
        let fired = fired.clone();
        let done = done.clone();
        evloop
            .new_trigger(move || {
                if fired.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    done.complete();
                }
            })
            .unwrap()
    };

    let seen = fired.clone();
    let handle = thread::spawn(move || {
        assert!(trigger.trigger());
        // a second trigger before the first is drained would coalesce
        while seen.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(trigger.trigger());
        trigger
    });

    let mut pending = vec![done];
    assert!(evloop.wait_until_complete::<_, SelfAlive>(&mut pending));
    assert!(pending.is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    // last handle dropped: the trigger node sees EOF and goes away
    drop(handle.join().unwrap());
    assert!(evloop.contains(token));
    assert!(evloop.wait(16));
    assert!(!evloop.contains(token));
}

#[test]
fn wait_until_complete_with_shared_completions() {
    let mut evloop = test_loop();
    let mut peers = Vec::new();
    let mut pending = Vec::new();
    let mut socks = Vec::new();

    for _ in 0..3 {
        let (ours, peer) = UnixStream::pair().unwrap();
        let node = FnNode::new(ours.as_raw_fd(), Filter::READ, |_: Event, done: &Completion| {
            done.complete();
        });
        pending.push(Arc::new(node.completion()));
        evloop.add_event(Box::new(node));
        socks.push(ours);
        peers.push(peer);
    }

    for peer in &mut peers {
        peer.write_all(b"go").unwrap();
    }

    assert!(evloop.wait_until_complete::<_, DerefAlive>(&mut pending));
    assert!(evloop.is_empty());
}

#[test]
fn empty_container_returns_immediately() {
    let mut evloop = test_loop();
    let mut nothing: Vec<Completion> = Vec::new();
    assert!(evloop.wait_until_complete::<_, SelfAlive>(&mut nothing));
}
