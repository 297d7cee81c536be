//! epoll backend (Linux, Android)

use std::os::unix::io::RawFd;

use nix::errno::Errno;

use super::node::{Event, Filter, Flags};
use super::Poller;
use crate::sys;

pub(crate) struct Epoll {
    epfd: RawFd,
    events: Vec<libc::epoll_event>,
}

fn epoll_bits(interest: Filter) -> u32 {
    let mut bits = libc::EPOLLRDHUP as u32;
    if interest.contains(Filter::READ) {
        bits |= libc::EPOLLIN as u32;
    }
    if interest.contains(Filter::WRITE) {
        bits |= libc::EPOLLOUT as u32;
    }
    bits
}

fn to_event(bits: u32) -> Event {
    let mut filter = Filter::NONE;
    let mut flags = Flags::NONE;

    if bits & libc::EPOLLIN as u32 != 0 {
        filter = filter | Filter::READ;
    }
    if bits & libc::EPOLLOUT as u32 != 0 {
        filter = filter | Filter::WRITE;
    }
    if bits & libc::EPOLLERR as u32 != 0 {
        flags = flags | Flags::ERROR;
    }
    if bits & (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32 != 0 {
        flags = flags | Flags::EOF;
    }
    Event { filter, flags }
}

impl Epoll {
    fn ctl(&self, op: libc::c_int, fd: RawFd, token: usize, interest: Filter) -> Result<(), Errno> {
        let mut ev = libc::epoll_event { events: epoll_bits(interest), u64: token as u64 };
        if unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) } < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }
}

impl Poller for Epoll {
    fn new() -> Result<Self, Errno> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(Errno::last());
        }
        Ok(Self { epfd, events: Vec::new() })
    }

    fn register(
        &mut self,
        fd: RawFd,
        token: usize,
        interest: Filter,
        prev: Option<Filter>,
    ) -> Result<(), Errno> {
        let (op, fallback, mismatch) = match prev {
            None => (libc::EPOLL_CTL_ADD, libc::EPOLL_CTL_MOD, Errno::EEXIST),
            Some(_) => (libc::EPOLL_CTL_MOD, libc::EPOLL_CTL_ADD, Errno::ENOENT),
        };
        match self.ctl(op, fd, token, interest) {
            Err(e) if e == mismatch => self.ctl(fallback, fd, token, interest),
            other => other,
        }
    }

    fn deregister(&mut self, fd: RawFd, _interest: Filter) -> Result<(), Errno> {
        // non-null event pointer for pre-2.6.9 kernels
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        if unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, &mut ev) } < 0 {
            return match Errno::last() {
                Errno::ENOENT => Ok(()),
                e => Err(e),
            };
        }
        Ok(())
    }

    fn wait(
        &mut self,
        capacity: usize,
        timeout_ms: i32,
        out: &mut Vec<(usize, Event)>,
    ) -> Result<(), Errno> {
        let capacity = capacity.clamp(1, i32::MAX as usize);
        self.events.clear();
        self.events.reserve(capacity);

        let epfd = self.epfd;
        let buf = self.events.as_mut_ptr();
        let n = sys::retry(|| unsafe {
            libc::epoll_wait(epfd, buf, capacity as libc::c_int, timeout_ms) as isize
        })?;
        // Safety: the kernel initialized the first `n` entries.
        unsafe { self.events.set_len(n) };

        out.clear();
        for ev in &self.events {
            let (bits, token) = (ev.events, ev.u64);
            out.push((token as usize, to_event(bits)));
        }
        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}
