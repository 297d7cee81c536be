//! kqueue backend (macOS, iOS, FreeBSD, DragonFly, OpenBSD)
//!
//! kqueue keys registrations by (ident, filter), so read and write
//! interest are two separate entries and a node interested in both can
//! be reported twice in one wait.

use std::os::unix::io::RawFd;

use nix::errno::Errno;

use super::node::{Event, Filter, Flags};
use super::Poller;
use crate::sys;

pub(crate) struct Kqueue {
    kq: RawFd,
    events: Vec<libc::kevent>,
}

// Safety: `udata` in the buffered kevents only ever carries a token
// number, never a pointer.
unsafe impl Send for Kqueue {}

fn kevent(fd: RawFd, filter: Filter, flags: u16, token: usize) -> libc::kevent {
    let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
    kev.ident = fd as _;
    let kfilter = if filter == Filter::WRITE {
        libc::EVFILT_WRITE
    } else {
        libc::EVFILT_READ
    };
    kev.filter = kfilter as _;
    kev.flags = flags as _;
    kev.udata = token as _;
    kev
}

fn to_event(kev: &libc::kevent) -> Event {
    let filter = if kev.filter == libc::EVFILT_WRITE as _ {
        Filter::WRITE
    } else {
        Filter::READ
    };

    let mut flags = Flags::NONE;
    if kev.flags & libc::EV_ERROR as u16 != 0 {
        flags = flags | Flags::ERROR;
    }
    if kev.flags & libc::EV_EOF as u16 != 0 {
        flags = flags | Flags::EOF;
    }
    Event { filter, flags }
}

impl Kqueue {
    fn apply(&self, change: &libc::kevent) -> Result<(), Errno> {
        let ret = unsafe {
            libc::kevent(self.kq, change, 1, std::ptr::null_mut(), 0, std::ptr::null())
        };
        if ret < 0 {
            return Err(Errno::last());
        }
        Ok(())
    }

    fn delete(&self, fd: RawFd, filter: Filter) -> Result<(), Errno> {
        match self.apply(&kevent(fd, filter, libc::EV_DELETE as u16, 0)) {
            Err(Errno::ENOENT) => Ok(()),
            other => other,
        }
    }
}

impl Poller for Kqueue {
    fn new() -> Result<Self, Errno> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(Errno::last());
        }
        sys::set_cloexec(kq)?;
        Ok(Self { kq, events: Vec::new() })
    }

    /// `EV_ADD` both adds and modifies, so there is no add/modify
    /// mismatch to recover from; filters dropped since `prev` are deleted.
    fn register(
        &mut self,
        fd: RawFd,
        token: usize,
        interest: Filter,
        prev: Option<Filter>,
    ) -> Result<(), Errno> {
        let prev = prev.unwrap_or(Filter::NONE);
        for filter in [Filter::READ, Filter::WRITE] {
            if interest.contains(filter) {
                self.apply(&kevent(fd, filter, libc::EV_ADD as u16, token))?;
            } else if prev.contains(filter) {
                self.delete(fd, filter)?;
            }
        }
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd, interest: Filter) -> Result<(), Errno> {
        for filter in [Filter::READ, Filter::WRITE] {
            if interest.contains(filter) {
                self.delete(fd, filter)?;
            }
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

        let timeout = libc::timespec {
            tv_sec: (timeout_ms / 1000) as _,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as _,
        };
        let kq = self.kq;
        let buf = self.events.as_mut_ptr();
        let n = sys::retry(|| unsafe {
            libc::kevent(kq, std::ptr::null(), 0, buf, capacity as _, &timeout) as isize
        })?;
        // Safety: the kernel filled the first `n` entries.
        unsafe { self.events.set_len(n) };

        out.clear();
        for kev in &self.events {
            out.push((kev.udata as usize, to_event(kev)));
        }
        Ok(())
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary() {
        let mut kev = kevent(3, Filter::WRITE, (libc::EV_EOF | libc::EV_ERROR) as u16, 9);
        let ev = to_event(&kev);
        assert!(ev.is_writable());
        assert!(ev.is_eof());
        assert!(ev.is_error());

        kev.flags = 0;
        kev.filter = libc::EVFILT_READ as _;
        assert_eq!(to_event(&kev), Event { filter: Filter::READ, flags: Flags::NONE });
        assert_eq!(kev.udata as usize, 9);
    }

    #[test]
    fn test_register_modify_delete() {
        let mut kq = Kqueue::new().unwrap();
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

        assert!(kq.register(fds[1], 1, Filter::WRITE, None).is_ok());
        assert!(kq.register(fds[1], 1, Filter::NONE, Some(Filter::WRITE)).is_ok());
        assert!(kq.deregister(fds[1], Filter::WRITE).is_ok());

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
