//! Event vocabulary shared by every backend, and the node contract

use std::ops::{BitOr, Deref};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Readiness a node asks for, or the kernel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Filter(u8);

impl Filter {
    pub const NONE: Filter = Filter(0);
    pub const READ: Filter = Filter(2);
    pub const WRITE: Filter = Filter(4);
    pub const READ_WRITE: Filter = Filter(2 | 4);

    #[inline]
    pub fn contains(self, other: Filter) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Filter {
    type Output = Filter;
    fn bitor(self, rhs: Filter) -> Filter {
        Filter(self.0 | rhs.0)
    }
}

/// Conditions observed alongside readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const ERROR: Flags = Flags(2);
    /// peer closed / end of stream
    pub const EOF: Flags = Flags(4);

    #[inline]
    pub fn contains(self, other: Flags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// One readiness report for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub filter: Filter,
    pub flags: Flags,
}

impl Event {
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.filter.contains(Filter::READ)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.filter.contains(Filter::WRITE)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags.contains(Flags::ERROR)
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.flags.contains(Flags::EOF)
    }
}

/// Handle to a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

/// Something the loop watches and calls back.
///
/// The loop calls `on_event` only while `is_alive` is true and drops the
/// node as soon as `is_alive` turns false after a dispatch.
pub trait Node: Send {
    /// Descriptor to watch.
    fn ident(&self) -> RawFd;

    fn interest(&self) -> Filter;

    fn on_event(&mut self, event: Event);

    fn is_alive(&self) -> bool {
        true
    }
}

/// Liveness as seen by [`super::EventLoop::wait_until_complete`].
pub trait Alive {
    fn is_alive(&self) -> bool;
}

/// How `wait_until_complete` asks an element of its container whether
/// it is still running.
pub trait AliveCheck<T: ?Sized> {
    fn check(item: &T) -> bool;
}

/// The element itself implements [`Alive`].
pub struct SelfAlive;

/// The element is a pointer (`Arc`, `Box`, `&`) to something [`Alive`].
pub struct DerefAlive;

impl<T: Alive + ?Sized> AliveCheck<T> for SelfAlive {
    #[inline]
    fn check(item: &T) -> bool {
        item.is_alive()
    }
}

impl<T> AliveCheck<T> for DerefAlive
where
    T: Deref + ?Sized,
    T::Target: Alive,
{
    #[inline]
    fn check(item: &T) -> bool {
        (**item).is_alive()
    }
}

/// Completion signal a callback sets when it is done.
///
/// Clones share the flag, so the thread driving the loop can keep one
/// and hand the other to a node.
#[derive(Debug, Clone, Default)]
pub struct Completion(Arc<AtomicBool>);

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Alive for Completion {
    fn is_alive(&self) -> bool {
        !self.is_complete()
    }
}

/// Closure-backed node that stays registered until its [`Completion`]
/// is set.
pub struct FnNode<F> {
    fd: RawFd,
    interest: Filter,
    done: Completion,
    callback: F,
}

impl<F> FnNode<F>
where
    F: FnMut(Event, &Completion) + Send,
{
    pub fn new(fd: RawFd, interest: Filter, callback: F) -> Self {
        Self { fd, interest, done: Completion::new(), callback }
    }

    /// Shared handle to this node's completion flag.
    pub fn completion(&self) -> Completion {
        self.done.clone()
    }
}

impl<F> Node for FnNode<F>
where
    F: FnMut(Event, &Completion) + Send,
{
    fn ident(&self) -> RawFd {
        self.fd
    }

    fn interest(&self) -> Filter {
        self.interest
    }

    fn on_event(&mut self, event: Event) {
        (self.callback)(event, &self.done);
    }

    fn is_alive(&self) -> bool {
        !self.done.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bits() {
        let rw = Filter::READ | Filter::WRITE;
        assert_eq!(rw, Filter::READ_WRITE);
        assert!(rw.contains(Filter::READ));
        assert!(!Filter::READ.contains(Filter::WRITE));
        assert!(!rw.contains(Filter::NONE));
        assert!(Filter::NONE.is_empty());
    }

    #[test]
    fn test_event_predicates() {
        let ev = Event { filter: Filter::READ, flags: Flags::EOF | Flags::ERROR };
        assert!(ev.is_readable());
        assert!(!ev.is_writable());
        assert!(ev.is_eof());
        assert!(ev.is_error());
    }

    #[test]
    fn test_fn_node_completion() {
        let mut node = FnNode::new(0, Filter::READ, |ev: Event, done: &Completion| {
            if ev.is_eof() {
                done.complete();
            }
        });
        let handle = node.completion();
        node.on_event(Event { filter: Filter::READ, flags: Flags::NONE });
        assert!(node.is_alive());
        node.on_event(Event { filter: Filter::READ, flags: Flags::EOF });
        assert!(!node.is_alive());
        assert!(handle.is_complete());
    }

    #[test]
    fn test_alive_strategies() {
        let c = Completion::new();
        assert!(SelfAlive::check(&c));
        let shared = Arc::new(c.clone());
        assert!(DerefAlive::check(&shared));
        c.complete();
        assert!(!SelfAlive::check(&c));
        assert!(!DerefAlive::check(&shared));
    }
}
