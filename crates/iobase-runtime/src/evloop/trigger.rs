//! Cross-thread wake-up through a private socket pair
//!
//! The read end is registered with the loop; [`Trigger::trigger`] writes
//! one byte to the other end. Triggers coalesce: a full socket buffer
//! means a wake is already pending, which counts as success.

use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use iobase_core::{kerror, ktrace};
use nix::errno::Errno;

use super::node::{Event, Filter, Node};
use crate::sys;

// A trigger fired after the loop is gone must fail with EPIPE, not SIGPIPE.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "dragonfly", target_os = "openbsd"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "dragonfly", target_os = "openbsd")))]
const SEND_FLAGS: libc::c_int = 0;

/// Write side of a trigger pair. Cheap to clone; usable from any thread.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: Arc<OwnedFd>,
}

impl Trigger {
    /// Fire the trigger. Returns false only on an unexpected write error.
    pub fn trigger(&self) -> bool {
        let byte = 1u8;
        loop {
            let ret = unsafe {
                libc::send(
                    self.tx.as_raw_fd(),
                    &byte as *const u8 as *const libc::c_void,
                    1,
                    SEND_FLAGS,
                )
            };
            if ret == 1 {
                return true;
            }
            if ret == 0 {
                continue;
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::EAGAIN => return true,
                e => {
                    kerror!("trigger write fd {}: {}", self.tx.as_raw_fd(), e);
                    return false;
                }
            }
        }
    }
}

/// Wakes an [`super::EventLoop`] blocked in `wait` from another thread.
#[derive(Debug, Clone)]
pub struct Waker {
    trigger: Trigger,
}

impl Waker {
    pub(crate) fn new(trigger: Trigger) -> Self {
        Self { trigger }
    }

    pub fn wake(&self) -> bool {
        self.trigger.trigger()
    }
}

/// Non-blocking, close-on-exec `AF_UNIX` stream pair: `(read, write)`.
pub(crate) fn pair() -> Result<(OwnedFd, Trigger), Errno> {
    let mut fds = [-1 as RawFd; 2];
    if unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) } < 0 {
        return Err(Errno::last());
    }
    // Safety: socketpair just handed us both descriptors.
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    sys::set_nonblock_cloexec(rx.as_raw_fd())?;
    sys::set_nonblock_cloexec(tx.as_raw_fd())?;

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        let on: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                tx.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_NOSIGPIPE,
                &on as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Errno::last());
        }
    }

    Ok((rx, Trigger { tx: Arc::new(tx) }))
}

/// Read side of a trigger pair, as registered with the loop.
pub(crate) struct TriggerNode<F> {
    rx: OwnedFd,
    callback: F,
    alive: bool,
    /// the loop's own wake node; the loop holds a write side forever
    always_alive: bool,
}

impl<F: FnMut() + Send> TriggerNode<F> {
    pub(crate) fn new(rx: OwnedFd, callback: F, always_alive: bool) -> Self {
        Self { rx, callback, alive: true, always_alive }
    }

    /// Read until the pair is empty. Returns whether anything was pending.
    fn drain(&mut self) -> bool {
        let mut buf = [0u8; 64];
        let mut fired = false;
        loop {
            let ret = unsafe {
                libc::read(self.rx.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if ret > 0 {
                fired = true;
                continue;
            }
            if ret == 0 {
                ktrace!("trigger fd {} closed", self.rx.as_raw_fd());
                self.alive = self.always_alive;
                return fired;
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::EAGAIN => return fired,
                e => {
                    kerror!("trigger read fd {}: {}", self.rx.as_raw_fd(), e);
                    self.alive = self.always_alive;
                    return fired;
                }
            }
        }
    }
}

impl<F: FnMut() + Send> Node for TriggerNode<F> {
    fn ident(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    fn interest(&self) -> Filter {
        Filter::READ
    }

    fn on_event(&mut self, _event: Event) {
        if self.drain() {
            (self.callback)();
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn readable() -> Event {
        Event { filter: Filter::READ, ..Event::default() }
    }

    #[test]
    fn test_triggers_coalesce() {
        let (rx, trigger) = pair().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let bump = move || {
            h.fetch_add(1, Ordering::SeqCst);
        };
        let mut node = TriggerNode::new(rx, bump, false);

        for _ in 0..10 {
            assert!(trigger.trigger());
        }
        node.on_event(readable());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // nothing pending: spurious readiness does not call back
        node.on_event(readable());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(node.is_alive());
    }

    #[test]
    fn test_dropping_every_trigger_kills_node() {
        let (rx, trigger) = pair().unwrap();
        let mut node = TriggerNode::new(rx, || {}, false);
        let second = trigger.clone();
        drop(trigger);
        node.on_event(readable());
        assert!(node.is_alive());

        drop(second);
        node.on_event(readable());
        assert!(!node.is_alive());
    }

    #[test]
    fn test_always_alive_survives_close() {
        let (rx, trigger) = pair().unwrap();
        let mut node = TriggerNode::new(rx, || {}, true);
        drop(trigger);
        node.on_event(readable());
        assert!(node.is_alive());
    }

    #[test]
    fn test_trigger_after_reader_gone() {
        let (rx, trigger) = pair().unwrap();
        drop(rx);
        assert!(!trigger.trigger());
    }

    #[test]
    fn test_full_buffer_counts_as_success() {
        let (_rx, trigger) = pair().unwrap();
        // far more than any default AF_UNIX buffer
        for _ in 0..100_000 {
            if !trigger.trigger() {
                panic!("trigger failed");
            }
        }
    }
}
