/*!
A small buffer recycling capability.

The stream readers and writers in this crate work out of a handful of byte
buffers: an accumulation buffer and compression scratch on the write side, a
payload buffer and decompression buffer on the read side. Those buffers are
acquired from a [`BufferPool`](trait.BufferPool.html) at construction, owned
exclusively by one stream until it closes, and released back on close, so
short lived streams stop paying for their working memory.

The [default pool](fn.default_pool.html) caches one buffer per role per
thread. Substitute [`NoopPool`](struct.NoopPool.html) to opt out of
recycling entirely, or implement `BufferPool` for a size bucketed pool or an
arena of your own.
*/

use std::cell::RefCell;
use std::mem;
use std::sync::Arc;

use lazy_static::lazy_static;

/// The purpose a pooled buffer serves. Buffers are recycled within a role
/// only, since the typical sizes of the four roles differ widely.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BufferRole {
    /// Chunk payload bytes read from an underlying source.
    Input,
    /// Uncompressed bytes accumulated before a writer emits a block.
    Output,
    /// Compression scratch space for a writer.
    Encode,
    /// Decompressed bytes awaiting delivery to a reader's caller.
    Decode,
}

impl BufferRole {
    fn index(self) -> usize {
        match self {
            BufferRole::Input => 0,
            BufferRole::Output => 1,
            BufferRole::Encode => 2,
            BufferRole::Decode => 3,
        }
    }
}

/// A source of reusable byte buffers, shared by any number of streams.
///
/// Implementations must be callable from multiple threads at once; one pool
/// typically backs every stream in a process.
pub trait BufferPool: Send + Sync {
    /// Returns a buffer of length at least `min_len` for the given role.
    /// The buffer may be longer than requested, never shorter, and its
    /// contents are unspecified.
    fn acquire(&self, role: BufferRole, min_len: usize) -> Vec<u8>;

    /// Returns a buffer to the pool for reuse. The caller must not touch
    /// the buffer again. The pool is free to drop it instead of retaining
    /// it.
    fn release(&self, role: BufferRole, buf: Vec<u8>);
}

thread_local! {
    static CACHE: RefCell<[Vec<u8>; 4]> = RefCell::new(Default::default());
}

/// A pool that keeps the most recently released buffer of each role in
/// thread local storage.
///
/// A stream acquires at construction and releases at close, so one slot per
/// role lets successive streams on a thread hand their buffers along without
/// any cross-thread synchronization. All instances share the same
/// per-thread cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadLocalPool(());

impl ThreadLocalPool {
    /// Creates a handle to the thread local pool.
    pub fn new() -> ThreadLocalPool {
        ThreadLocalPool(())
    }
}

impl BufferPool for ThreadLocalPool {
    fn acquire(&self, role: BufferRole, min_len: usize) -> Vec<u8> {
        let mut buf = CACHE.with(|cache| {
            mem::replace(&mut cache.borrow_mut()[role.index()], Vec::new())
        });
        if buf.len() < min_len {
            buf.resize(min_len, 0);
        }
        buf
    }

    fn release(&self, role: BufferRole, buf: Vec<u8>) {
        CACHE.with(|cache| {
            cache.borrow_mut()[role.index()] = buf;
        });
    }
}

/// A pool that always allocates a fresh buffer and frees released ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPool(());

impl NoopPool {
    /// Creates a no-op pool.
    pub fn new() -> NoopPool {
        NoopPool(())
    }
}

impl BufferPool for NoopPool {
    fn acquire(&self, _role: BufferRole, min_len: usize) -> Vec<u8> {
        vec![0; min_len]
    }

    fn release(&self, _role: BufferRole, _buf: Vec<u8>) {}
}

lazy_static! {
    static ref DEFAULT_POOL: Arc<ThreadLocalPool> =
        Arc::new(ThreadLocalPool::new());
}

/// Returns the process wide pool backing the stream constructors that do
/// not take an explicit pool.
pub fn default_pool() -> Arc<dyn BufferPool> {
    DEFAULT_POOL.clone()
}
