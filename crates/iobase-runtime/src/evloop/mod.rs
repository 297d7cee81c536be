//! Readiness event loop
//!
//! One [`EventLoop`] wraps one kernel queue (epoll or kqueue, chosen at
//! build time) and a table of [`Node`]s. [`EventLoop::wait`] blocks until
//! something is ready, then calls back each ready node on the calling
//! thread, one after another.
//!
//! ```text
//!   add_event(node) ──► slot table ──► Poller::register(fd, token)
//!                                             │
//!   wait() ◄──── (token, Event) ◄──── epoll_wait / kevent
//!     │
//!     ├─ node alive?  ──► on_event(ev)   (panics caught and logged)
//!     └─ still alive? ──no──► remove_event(token)
//! ```
//!
//! The loop itself is single-threaded. The only cross-thread operation is
//! waking it: [`Waker::wake`] or a [`Trigger`] from
//! [`EventLoop::new_trigger`], both safe to use from any thread.
//!
//! Registrations are level-triggered. A node that stays alive stays
//! registered with the interest it had; change interest with
//! [`EventLoop::modify_event`].
//!
//! Registration failures other than the kernel's add/modify mismatch are
//! fatal: they are logged and the process aborts (see [`fatal`]).

mod node;
mod trigger;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod epoll;
        type Backend = epoll::Epoll;
    } else if #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "openbsd"
    ))] {
        mod kqueue;
        type Backend = kqueue::Kqueue;
    } else {
        compile_error!("iobase event loop needs epoll or kqueue");
    }
}

pub use node::{
    Alive, AliveCheck, Completion, DerefAlive, Event, Filter, Flags, FnNode, Node, SelfAlive,
    Token,
};
pub use trigger::{Trigger, Waker};

use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};

use iobase_core::error::{IobError, IobResult};
use iobase_core::{kdebug, kerror, kwarn};
use nix::errno::Errno;

use crate::config::RuntimeConfig;
use trigger::TriggerNode;

/// Kernel notification queue, one implementation per kernel family.
pub(crate) trait Poller: Sized + Send {
    fn new() -> Result<Self, Errno>;

    /// Watch `fd` for `interest`, reporting it as `token`. `prev` is the
    /// interest of an existing registration, `None` for a fresh one.
    /// An add that finds the fd already registered, or a modify that
    /// finds it missing, retries as the opposite operation.
    fn register(
        &mut self,
        fd: RawFd,
        token: usize,
        interest: Filter,
        prev: Option<Filter>,
    ) -> Result<(), Errno>;

    /// Stop watching `fd`. Not being registered is not an error.
    fn deregister(&mut self, fd: RawFd, interest: Filter) -> Result<(), Errno>;

    /// Block up to `timeout_ms` for at most `capacity` events, retrying
    /// on `EINTR`. `out` is replaced with `(token, event)` pairs.
    fn wait(
        &mut self,
        capacity: usize,
        timeout_ms: i32,
        out: &mut Vec<(usize, Event)>,
    ) -> Result<(), Errno>;
}

/// Log and abort. Used for registration failures the loop cannot
/// repair, such as running out of kernel memory or a closed descriptor.
#[cold]
pub fn fatal(op: &str, err: Errno) -> ! {
    kerror!("fatal: {}: {}", op, err);
    std::process::abort()
}

struct Slot {
    node: Box<dyn Node>,
    fd: RawFd,
    interest: Filter,
}

pub struct EventLoop {
    poller: Backend,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    ready: Vec<(usize, Event)>,
    wake: Trigger,
    wake_token: Token,
    config: RuntimeConfig,
}

impl EventLoop {
    /// Loop configured from the environment.
    pub fn new() -> IobResult<Self> {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> IobResult<Self> {
        let poller = Backend::new().map_err(|e| IobError::os("event queue", e as i32))?;
        let (rx, wake) = trigger::pair().map_err(|e| IobError::os("socketpair", e as i32))?;

        let mut evloop = Self {
            poller,
            slots: Vec::new(),
            free: Vec::new(),
            ready: Vec::with_capacity(config.wait_capacity),
            wake,
            wake_token: Token(0),
            config,
        };
        evloop.wake_token = evloop.add_event(Box::new(TriggerNode::new(rx, || {}, true)));
        Ok(evloop)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register `node` with the interest it reports now.
    ///
    /// Aborts the process if the kernel refuses the registration.
    pub fn add_event(&mut self, node: Box<dyn Node>) -> Token {
        let fd = node.ident();
        let interest = node.interest();

        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        if let Err(e) = self.poller.register(fd, idx, interest, None) {
            fatal("add_event", e);
        }
        kdebug!("add_event fd {} token {} interest {:?}", fd, idx, interest);

        self.slots[idx] = Some(Slot { node, fd, interest });
        Token(idx)
    }

    /// Re-read the node's interest and update the kernel registration.
    /// Returns false for an unknown token.
    pub fn modify_event(&mut self, token: Token) -> bool {
        let Some(slot) = self.slots.get_mut(token.0).and_then(Option::as_mut) else {
            return false;
        };

        let interest = slot.node.interest();
        if let Err(e) = self.poller.register(slot.fd, token.0, interest, Some(slot.interest)) {
            fatal("modify_event", e);
        }
        slot.interest = interest;
        true
    }

    /// Deregister and hand back the node. The loop's own wake node
    /// cannot be removed.
    pub fn remove_event(&mut self, token: Token) -> Option<Box<dyn Node>> {
        if token == self.wake_token {
            return None;
        }
        let slot = self.slots.get_mut(token.0)?.take()?;

        if let Err(e) = self.poller.deregister(slot.fd, slot.interest) {
            fatal("remove_event", e);
        }
        kdebug!("remove_event fd {} token {}", slot.fd, token.0);

        self.free.push(token.0);
        Some(slot.node)
    }

    pub fn contains(&self, token: Token) -> bool {
        token != self.wake_token && matches!(self.slots.get(token.0), Some(Some(_)))
    }

    /// Mutable access to a registered node, e.g. before `modify_event`.
    pub fn node_mut(&mut self, token: Token) -> Option<&mut (dyn Node + 'static)> {
        if token == self.wake_token {
            return None;
        }
        self.slots.get_mut(token.0)?.as_mut().map(|slot| &mut *slot.node)
    }

    /// Registered nodes, not counting the internal wake node.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interrupt a `wait` blocked on another thread.
    pub fn wake(&self) -> bool {
        self.wake.trigger()
    }

    /// Handle that wakes this loop from any thread.
    pub fn waker(&self) -> Waker {
        Waker::new(self.wake.clone())
    }

    /// Register a trigger pair whose node calls `callback` on the loop
    /// thread each time the trigger fires (coalesced). The node goes away
    /// once every clone of the returned [`Trigger`] is dropped.
    pub fn new_trigger<F>(&mut self, callback: F) -> IobResult<(Token, Trigger)>
    where
        F: FnMut() + Send + 'static,
    {
        let (rx, trigger) = trigger::pair().map_err(|e| IobError::os("socketpair", e as i32))?;
        let token = self.add_event(Box::new(TriggerNode::new(rx, callback, false)));
        Ok((token, trigger))
    }

    /// Wait once, using the configured batch size.
    pub fn poll(&mut self) -> bool {
        self.wait(self.config.wait_capacity)
    }

    /// Block until at least one registered descriptor is ready (or the
    /// configured ceiling passes), then dispatch up to `capacity` events.
    ///
    /// Returns false only if the kernel wait itself fails.
    pub fn wait(&mut self, capacity: usize) -> bool {
        let mut ready = std::mem::take(&mut self.ready);

        if let Err(e) = self.poller.wait(capacity, self.config.wait_timeout_ms(), &mut ready) {
            kerror!("wait: {}", e);
            self.ready = ready;
            return false;
        }

        for &(idx, event) in &ready {
            self.dispatch(idx, event);
        }

        self.ready = ready;
        true
    }

    fn dispatch(&mut self, idx: usize, event: Event) {
        // removed earlier in this batch
        let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) else {
            return;
        };

        if slot.node.is_alive() {
            let node = &mut slot.node;
            if panic::catch_unwind(AssertUnwindSafe(|| node.on_event(event))).is_err() {
                kwarn!("node fd {} panicked in on_event", slot.fd);
            }
        }

        if !slot.node.is_alive() {
            self.remove_event(Token(idx));
        }
    }

    /// Run the loop until every element of `items` reports itself done.
    ///
    /// Each round drops finished elements (as judged by `C`) and waits for
    /// up to as many events as elements remain. Returns false if a wait
    /// fails first.
    ///
    /// ```ignore
    /// let mut pending: Vec<Completion> = nodes.iter().map(|n| n.completion()).collect();
    /// evloop.wait_until_complete::<_, SelfAlive>(&mut pending);
    /// ```
    pub fn wait_until_complete<T, C>(&mut self, items: &mut Vec<T>) -> bool
    where
        C: AliveCheck<T>,
    {
        loop {
            items.retain(|item| C::check(item));
            if items.is_empty() {
                return true;
            }
            if !self.wait(items.len()) {
                return false;
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(Some(slot)) = self.slots.get(self.wake_token.0) {
            if let Err(e) = self.poller.deregister(slot.fd, slot.interest) {
                kwarn!("remove wake node: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("nodes", &self.len())
            .field("wait_capacity", &self.config.wait_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::{AsRawFd, OwnedFd};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn test_loop() -> EventLoop {
        EventLoop::with_config(RuntimeConfig::new().wait_timeout(Duration::from_secs(5))).unwrap()
    }

    #[test]
    fn test_new_loop_is_empty() {
        let evloop = test_loop();
        assert!(evloop.is_empty());
        assert!(!evloop.contains(Token(0)));
    }

    #[test]
    fn test_wake_node_is_protected() {
        let mut evloop = test_loop();
        let wake = evloop.wake_token;
        assert!(evloop.remove_event(wake).is_none());
        assert!(evloop.node_mut(wake).is_none());
    }

    #[test]
    fn test_token_reuse() {
        let mut evloop = test_loop();
        let (a, _pa) = UnixStream::pair().unwrap();
        let (b, _pb) = UnixStream::pair().unwrap();

        let ta = evloop.add_event(Box::new(FnNode::new(a.as_raw_fd(), Filter::READ, |_, _| {})));
        assert!(evloop.contains(ta));
        assert!(evloop.remove_event(ta).is_some());
        assert!(!evloop.contains(ta));
        assert!(evloop.remove_event(ta).is_none());

        let tb = evloop.add_event(Box::new(FnNode::new(b.as_raw_fd(), Filter::READ, |_, _| {})));
        assert_eq!(tb, ta);
        assert_eq!(evloop.len(), 1);
    }

    #[test]
    fn test_self_wake() {
        let mut evloop = test_loop();
        assert!(evloop.wake());
        assert!(evloop.wait(4));
        assert!(evloop.is_empty());
    }

    #[test]
    fn test_modify_to_write_interest() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Flip {
            fd: OwnedFd,
            want_write: Arc<AtomicBool>,
            writable: Arc<AtomicUsize>,
        }
        impl Node for Flip {
            fn ident(&self) -> RawFd {
                self.fd.as_raw_fd()
            }
            fn interest(&self) -> Filter {
                if self.want_write.load(Ordering::SeqCst) {
                    Filter::WRITE
                } else {
                    Filter::NONE
                }
            }
            fn on_event(&mut self, ev: Event) {
                if ev.is_writable() {
                    self.writable.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let mut evloop = test_loop();
        let (a, _peer) = UnixStream::pair().unwrap();
        let want_write = Arc::new(AtomicBool::new(false));
        let writable = Arc::new(AtomicUsize::new(0));
        let token = evloop.add_event(Box::new(Flip {
            fd: OwnedFd::from(a),
            want_write: want_write.clone(),
            writable: writable.clone(),
        }));

        // no interest yet: only a wake ends the wait
        assert!(evloop.wake());
        assert!(evloop.wait(4));
        assert_eq!(writable.load(Ordering::SeqCst), 0);

        want_write.store(true, Ordering::SeqCst);
        assert!(evloop.modify_event(token));
        assert_eq!(evloop.node_mut(token).map(|n| n.interest()), Some(Filter::WRITE));
        assert!(evloop.wait(4));
        assert_eq!(writable.load(Ordering::SeqCst), 1);

        want_write.store(false, Ordering::SeqCst);
        assert!(evloop.modify_event(token));
        assert!(evloop.wake());
        assert!(evloop.wait(4));
        assert_eq!(writable.load(Ordering::SeqCst), 1);

        assert!(!evloop.modify_event(Token(99)));
    }
}
