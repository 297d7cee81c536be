//! Non-contiguous byte sequence
//!
//! A [`BlobSequence`] is an ordered list of byte views that can be read
//! as if it were one buffer, without copying. Each view either borrows
//! data for `'a` or points into memory owned by the sequence's
//! [`TmpMem`] registry, so a view can never outlive what backs it.

use std::any::Any;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::blob::Blob;
use crate::tmpmem::TmpMem;

#[derive(Clone, Copy)]
struct View {
    ptr: *const u8,
    len: usize,
}

impl View {
    fn of(bytes: &[u8]) -> Self {
        Self { ptr: bytes.as_ptr(), len: bytes.len() }
    }
}

#[derive(Clone, Default)]
pub struct BlobSequence<'a> {
    views: Vec<View>,
    mem: TmpMem,
    _borrow: PhantomData<&'a [u8]>,
}

// Safety: every view points either at `&'a [u8]` data (shareable across
// threads) or into an allocation held by `mem`, whose entries are
// `Send + Sync` and never handed out mutably.
unsafe impl Send for BlobSequence<'_> {}
unsafe impl Sync for BlobSequence<'_> {}

impl<'a> BlobSequence<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blob(blob: Blob<'a>) -> Self {
        let mut out = Self::new();
        out.concat_blob(blob);
        out
    }

    pub fn from_slice(bytes: &'a [u8]) -> Self {
        let mut out = Self::new();
        out.concat_slice(bytes);
        out
    }

    /// Append a borrowed view. No ownership changes hands.
    pub fn concat_slice(&mut self, bytes: &'a [u8]) -> &mut Self {
        self.views.push(View::of(bytes));
        self
    }

    /// Append the bytes of a shared handle and keep the handle alive.
    pub fn concat_shared<T>(&mut self, handle: Arc<T>) -> &mut Self
    where
        T: AsRef<[u8]> + Any + Send + Sync,
    {
        self.views.push(View::of((*handle).as_ref()));
        self.mem.memorize(handle);
        self
    }

    /// Append a blob by value. Owned storage moves into the registry;
    /// a borrowed blob becomes a borrowed view.
    pub fn concat_blob(&mut self, blob: Blob<'a>) -> &mut Self {
        match blob.into_cow() {
            Cow::Borrowed(bytes) => {
                self.concat_slice(bytes);
            }
            Cow::Owned(bytes) => {
                let held = self.mem.memorize_vec(bytes);
                self.views.push(View::of(held.as_slice()));
            }
        }
        self
    }

    /// Append every view of `other`, sharing its registry.
    pub fn concat_seq(&mut self, other: &BlobSequence<'a>) -> &mut Self {
        self.mem.merge(&other.mem);
        self.views.extend_from_slice(&other.views);
        self
    }

    /// Registry backing this sequence, for attaching extra owners.
    pub fn tmpmem(&mut self) -> &mut TmpMem {
        &mut self.mem
    }

    /// Number of views.
    pub fn segment_count(&self) -> usize {
        self.views.len()
    }

    /// Total bytes across all views.
    pub fn len(&self) -> usize {
        self.views.iter().map(|v| v.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.views.iter().map(|v| self.slice(*v))
    }

    /// Contiguous bytes starting `offset` bytes into view `index`,
    /// walking forward across view boundaries. Returns the run up to
    /// the end of the view it lands in, plus that view's index.
    pub fn try_read(&self, index: usize, offset: usize) -> Option<(&[u8], usize)> {
        let mut index = index;
        let mut offset = offset;
        let mut view = *self.views.get(index)?;

        while offset >= view.len {
            offset -= view.len;
            index += 1;
            view = *self.views.get(index)?;
        }

        Some((&self.slice(view)[offset..], index))
    }

    /// [`try_read`](Self::try_read) for callers that have already
    /// checked the bounds.
    ///
    /// # Panics
    /// If `index`/`offset` point past the end of the sequence.
    pub fn read(&self, index: usize, offset: usize) -> (&[u8], usize) {
        match self.try_read(index, offset) {
            Some(found) => found,
            None => panic!(
                "reading past the end of blob sequence (index {}, offset {}, {} views)",
                index,
                offset,
                self.views.len()
            ),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for seg in self.segments() {
            out.extend_from_slice(seg);
        }
        out
    }

    #[inline]
    fn slice(&self, view: View) -> &[u8] {
        if view.len == 0 {
            return &[];
        }
        // Safety: the view was taken from a live `&'a [u8]` or from an
        // allocation kept alive by `self.mem` for as long as `self` exists.
        unsafe { std::slice::from_raw_parts(view.ptr, view.len) }
    }
}

impl std::fmt::Debug for BlobSequence<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobSequence")
            .field("segments", &self.views.len())
            .field("len", &self.len())
            .field("mem", &self.mem)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_concat() {
        let borrowed = b"head-".to_vec();
        let shared = Arc::new(b"shared-".to_vec());

        let mut seq = BlobSequence::new();
        seq.concat_slice(&borrowed)
            .concat_shared(shared.clone())
            .concat_blob(Blob::copy_from(b"owned"));

        assert_eq!(seq.segment_count(), 3);
        assert_eq!(seq.len(), 17);
        assert_eq!(seq.to_vec(), b"head-shared-owned");
        // shared handle + owned blob
        assert_eq!(Arc::strong_count(&shared), 2);
    }

    #[test]
    fn test_owned_blob_outlives_source_scope() {
        let seq = {
            let mut seq = BlobSequence::new();
            let mut blob = Blob::new();
            blob.append(b"kept ").append(b"alive");
            seq.concat_blob(blob);
            seq
        };
        assert_eq!(seq.to_vec(), b"kept alive");
    }

    #[test]
    fn test_concat_seq_merges_registry() {
        let tail = {
            let mut tail = BlobSequence::new();
            tail.concat_blob(Blob::copy_from(b"-tail"));
            tail
        };

        let mut seq = BlobSequence::from_blob(Blob::copy_from(b"front"));
        seq.concat_seq(&tail);
        drop(tail);

        assert_eq!(seq.segment_count(), 2);
        assert_eq!(seq.to_vec(), b"front-tail");
    }

    #[test]
    fn test_read_walks_boundaries() {
        let mut seq = BlobSequence::new();
        seq.concat_slice(b"abc").concat_slice(b"").concat_slice(b"defg");

        let (run, idx) = seq.read(0, 0);
        assert_eq!((run, idx), (&b"abc"[..], 0));

        let (run, idx) = seq.read(0, 2);
        assert_eq!((run, idx), (&b"c"[..], 0));

        // offset 3 lands past view 0, skips the empty view
        let (run, idx) = seq.read(0, 3);
        assert_eq!((run, idx), (&b"defg"[..], 2));

        let (run, idx) = seq.read(1, 1);
        assert_eq!((run, idx), (&b"efg"[..], 2));

        assert!(seq.try_read(0, 7).is_none());
        assert!(seq.try_read(3, 0).is_none());
    }

    #[test]
    #[should_panic(expected = "reading past the end")]
    fn test_read_past_end_panics() {
        let seq = BlobSequence::from_slice(b"xy");
        seq.read(0, 2);
    }

    #[test]
    fn test_tmpmem_keeps_extra_owner() {
        let side = Arc::new(b"side buffer".to_vec());
        let weak = Arc::downgrade(&side);

        let mut seq = BlobSequence::from_slice(b"view");
        seq.tmpmem().memorize(side);
        assert_eq!(seq.tmpmem().len(), 1);

        let copy = seq.clone();
        drop(seq);
        assert!(weak.upgrade().is_some());
        drop(copy);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_clone_shares_memory() {
        let mut seq = BlobSequence::new();
        seq.concat_blob(Blob::copy_from(b"cloned"));
        let copy = seq.clone();
        drop(seq);
        assert_eq!(copy.to_vec(), b"cloned");
    }
}
