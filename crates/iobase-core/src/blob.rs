//! Byte buffer with explicit owned/borrowed state
//!
//! A [`Blob`] either owns a heap allocation or borrows someone else's
//! bytes for `'a`. Borrowed memory is never freed by the blob and the
//! borrow checker keeps the blob from outliving its owner.
//!
//! Blobs are move-only. There is no `Clone`; duplicating content is an
//! explicit [`Blob::copy_from`] / [`Blob::append`].
//!
//! Growth policy:
//! - [`Blob::reserve`] grows to exactly what was asked for.
//! - [`Blob::append`] allocates exactly on first use, then doubles
//!   (`(size + n) * 2`) whenever the owned storage runs out.
//!
//! Anything that may reallocate invalidates slices previously handed out
//! by [`Blob::data`]; the borrow checker enforces this for safe callers.

use std::borrow::Cow;
use core::cmp::Ordering;
use core::fmt;
use core::ops::Index;

enum Repr<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

/// Growable byte buffer, owning or borrowing.
pub struct Blob<'a> {
    repr: Repr<'a>,
}

impl<'a> Blob<'a> {
    /// Empty, owning, unallocated.
    pub const fn new() -> Self {
        Self { repr: Repr::Owned(Vec::new()) }
    }

    /// Borrow `bytes` without copying.
    pub const fn borrowed(bytes: &'a [u8]) -> Self {
        Self { repr: Repr::Borrowed(bytes) }
    }

    /// Own `bytes` as-is; capacity is whatever the vector had.
    pub fn owned(bytes: Vec<u8>) -> Self {
        Self { repr: Repr::Owned(bytes) }
    }

    /// Explicit duplication into a fresh exact-size allocation.
    pub fn copy_from(bytes: &[u8]) -> Self {
        let mut out = Self::new();
        out.append(bytes);
        out
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        match &self.repr {
            Repr::Owned(v) => v.as_slice(),
            Repr::Borrowed(b) => b,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated storage. For a borrowed blob this equals `len()`.
    #[inline]
    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Owned(v) => v.capacity(),
            Repr::Borrowed(b) => b.len(),
        }
    }

    #[inline]
    pub fn is_owning(&self) -> bool {
        matches!(self.repr, Repr::Owned(_))
    }

    /// Replace contents with a borrowed view. Previously owned memory is freed.
    pub fn wrap(&mut self, bytes: &'a [u8]) -> &mut Self {
        self.repr = Repr::Borrowed(bytes);
        self
    }

    /// Replace contents with an owned vector. Previously owned memory is freed.
    pub fn wrap_owned(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.repr = Repr::Owned(bytes);
        self
    }

    /// Make room for exactly `n` more bytes. A borrowed blob is copied
    /// into its own allocation first.
    pub fn reserve(&mut self, n: usize) -> &mut Self {
        self.make_owned().reserve_exact(n);
        self
    }

    /// Copy `bytes` onto the end.
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }

        let vec = self.make_owned();
        let needed = vec.len() + bytes.len();

        if vec.capacity() == 0 {
            vec.reserve_exact(bytes.len());
        } else if needed > vec.capacity() {
            vec.reserve_exact(needed * 2 - vec.len());
        }

        vec.extend_from_slice(bytes);
        self
    }

    /// Truncate the logical size to `n`.
    ///
    /// # Panics
    /// If `n > len()`.
    pub fn shrink(&mut self, n: usize) -> &mut Self {
        assert!(n <= self.len(), "shrink to {} past size {}", n, self.len());

        match &mut self.repr {
            Repr::Owned(v) => v.truncate(n),
            Repr::Borrowed(b) => *b = &b[..n],
        }
        self
    }

    /// Drop everything before `offset`, copying the remainder into a
    /// fresh owned allocation.
    ///
    /// # Panics
    /// If `offset > len()`.
    pub fn chop(&mut self, offset: usize) -> &mut Self {
        assert!(offset <= self.len(), "chop at {} past size {}", offset, self.len());

        let rest = &self.data()[offset..];
        let mut fresh = Vec::with_capacity(rest.len());
        fresh.extend_from_slice(rest);
        self.repr = Repr::Owned(fresh);
        self
    }

    /// Back to the empty owning state, freeing owned memory.
    pub fn reset(&mut self) {
        self.repr = Repr::Owned(Vec::new());
    }

    /// Move the contents out, leaving `self` empty.
    pub fn take(&mut self) -> Blob<'a> {
        core::mem::take(self)
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self.repr {
            Repr::Owned(v) => v,
            Repr::Borrowed(b) => b.to_vec(),
        }
    }

    /// Hand back the borrowed slice as-is, or the owned allocation.
    pub fn into_cow(self) -> Cow<'a, [u8]> {
        match self.repr {
            Repr::Owned(v) => Cow::Owned(v),
            Repr::Borrowed(b) => Cow::Borrowed(b),
        }
    }

    /// Detach from any borrow by copying if needed.
    pub fn into_owned(self) -> Blob<'static> {
        Blob::owned(self.into_vec())
    }

    /// Lexicographic comparison against `other`.
    #[inline]
    pub fn compare(&self, other: &[u8]) -> Ordering {
        self.data().cmp(other)
    }

    #[inline]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.data().starts_with(prefix)
    }

    /// Compare only the common prefix of both sides (strncmp-style):
    /// `Equal` means neither side disagrees within the shorter length.
    pub fn prefix_compare(&self, other: &[u8]) -> Ordering {
        let n = self.len().min(other.len());
        self.data()[..n].cmp(&other[..n])
    }

    /// First occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        let data = self.data();
        if from > data.len() {
            return None;
        }
        find(&data[from..], needle).map(|i| i + from)
    }

    fn make_owned(&mut self) -> &mut Vec<u8> {
        if let Repr::Borrowed(b) = self.repr {
            self.repr = Repr::Owned(b.to_vec());
        }
        match &mut self.repr {
            Repr::Owned(v) => v,
            Repr::Borrowed(_) => unreachable!(),
        }
    }
}

/// Scan for `needle` in `hay`.
///
/// Looks for the needle's first byte, then checks the full match;
/// a false match restarts one byte past where it began. Linear for
/// ordinary delimiters, quadratic for long self-similar needles.
pub fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    let Some(&first) = needle.first() else {
        return Some(0);
    };

    let mut pos = 0;
    while pos + needle.len() <= hay.len() {
        let last_start = hay.len() - needle.len();
        let at = pos + hay[pos..=last_start].iter().position(|&b| b == first)?;

        if &hay[at..at + needle.len()] == needle {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

impl Default for Blob<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for Blob<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl Index<usize> for Blob<'_> {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.data()[index]
    }
}

impl PartialEq<[u8]> for Blob<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.data() == other
    }
}

impl PartialEq<&[u8]> for Blob<'_> {
    fn eq(&self, other: &&[u8]) -> bool {
        self.data() == *other
    }
}

impl From<Vec<u8>> for Blob<'static> {
    fn from(v: Vec<u8>) -> Self {
        Blob::owned(v)
    }
}

impl<'a> From<&'a [u8]> for Blob<'a> {
    fn from(b: &'a [u8]) -> Self {
        Blob::borrowed(b)
    }
}

impl fmt::Debug for Blob<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 32;
        let data = self.data();
        let head = &data[..data.len().min(PREVIEW)];
        f.debug_struct("Blob")
            .field("len", &data.len())
            .field("cap", &self.capacity())
            .field("owning", &self.is_owning())
            .field("head", &String::from_utf8_lossy(head))
            .finish()
    }
}
