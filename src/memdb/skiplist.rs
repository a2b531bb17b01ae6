//! Arena-backed skiplist — the storage behind [`MemDb`](super::MemDb).
//!
//! Key and value bytes live in a pre-allocated byte arena; nodes are
//! fixed-size records addressed by index, so inserting never allocates
//! per entry. The list is single-writer: no atomics, no interior
//! mutability. Capacity accounting charges each entry its payload plus
//! the node record, which keeps the `Full` signal consistent between a
//! source list and any list rebuilt from its entries.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{PutOutcome, ValueType};
use crate::keyspan;

/// Maximum tower height. With p = 1/4 this comfortably covers arenas
/// holding millions of entries.
const MAX_HEIGHT: usize = 12;

/// Probability denominator for growing a tower by one level.
const BRANCH: u32 = 4;

/// Node index of the head sentinel. Also doubles as the nil link,
/// since no successor pointer ever targets the head.
const NIL: u32 = 0;

/// Arena bytes charged per entry on top of its key and value payload.
const NODE_OVERHEAD: usize = std::mem::size_of::<Node>();

// ------------------------------------------------------------------------------------------------
// Arena
// ------------------------------------------------------------------------------------------------

/// Fixed-capacity byte region holding key and value payloads.
///
/// `charged` tracks payload bytes plus per-node overhead; an allocation
/// that would push `charged` past `cap` is refused before any mutation,
/// so a failed insert leaves the arena untouched.
#[derive(Clone, Debug)]
struct Arena {
    buf: Vec<u8>,
    cap: usize,
    charged: usize,
}

impl Arena {
    fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            cap,
            charged: 0,
        }
    }

    #[inline]
    fn can_fit(&self, extra: usize) -> bool {
        self.charged + extra <= self.cap
    }

    /// Copy `data` into the arena, returning its `(offset, len)` handle.
    fn alloc(&mut self, data: &[u8]) -> (u32, u32) {
        let off = self.buf.len() as u32;
        self.buf.extend_from_slice(data);
        (off, data.len() as u32)
    }

    #[inline]
    fn charge(&mut self, n: usize) {
        self.charged += n;
    }

    #[inline]
    fn slice(&self, off: u32, len: u32) -> &[u8] {
        &self.buf[off as usize..off as usize + len as usize]
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.charged = 0;
    }
}

// ------------------------------------------------------------------------------------------------
// Node
// ------------------------------------------------------------------------------------------------

/// One skiplist entry. Key and value are handles into the arena;
/// `next` holds successor node indices per level.
#[derive(Clone, Copy, Debug)]
struct Node {
    key_off: u32,
    key_len: u32,
    val_off: u32,
    val_len: u32,
    meta: ValueType,
    next: [u32; MAX_HEIGHT],
}

impl Node {
    fn head() -> Self {
        Self {
            key_off: 0,
            key_len: 0,
            val_off: 0,
            val_len: 0,
            meta: ValueType::Value,
            next: [NIL; MAX_HEIGHT],
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SkipList
// ------------------------------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub(super) struct SkipList {
    arena: Arena,
    nodes: Vec<Node>,
    height: usize,
    len: usize,
    tail: u32,
    rng: SmallRng,
}

impl SkipList {
    pub(super) fn with_capacity(cap: usize) -> Self {
        Self {
            arena: Arena::with_capacity(cap),
            nodes: vec![Node::head()],
            height: 1,
            len: 0,
            tail: NIL,
            rng: SmallRng::seed_from_u64(0x5374_7261_7475_6d00),
        }
    }

    #[inline]
    pub(super) fn capacity(&self) -> usize {
        self.arena.cap
    }

    #[inline]
    pub(super) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn key(&self, idx: u32) -> &[u8] {
        let n = &self.nodes[idx as usize];
        self.arena.slice(n.key_off, n.key_len)
    }

    /// Locate `key`, filling `prev` with the rightmost node strictly
    /// before it on every level. Returns the matching node, if any.
    fn find(&self, key: &[u8], prev: &mut [u32; MAX_HEIGHT]) -> Option<u32> {
        let mut x = NIL; // head
        for lvl in (0..self.height).rev() {
            loop {
                let nxt = self.nodes[x as usize].next[lvl];
                if nxt == NIL || !keyspan::less(self.key(nxt), key) {
                    break;
                }
                x = nxt;
            }
            prev[lvl] = x;
        }
        for p in prev.iter_mut().take(MAX_HEIGHT).skip(self.height) {
            *p = NIL;
        }

        let cand = self.nodes[prev[0] as usize].next[0];
        (cand != NIL && keyspan::equal(self.key(cand), key)).then_some(cand)
    }

    fn random_height(&mut self) -> usize {
        let mut h = 1;
        while h < MAX_HEIGHT && self.rng.random_ratio(1, BRANCH) {
            h += 1;
        }
        h
    }

    /// Insert or update. Existing keys are updated in place; the old
    /// value bytes stay behind in the arena, which the capacity charge
    /// already accounts for.
    pub(super) fn put(&mut self, key: &[u8], value: &[u8], meta: ValueType) -> PutOutcome {
        let mut prev = [NIL; MAX_HEIGHT];

        if let Some(idx) = self.find(key, &mut prev) {
            if !self.arena.can_fit(value.len()) {
                return PutOutcome::Full;
            }
            let (off, len) = self.arena.alloc(value);
            self.arena.charge(value.len());
            let node = &mut self.nodes[idx as usize];
            node.val_off = off;
            node.val_len = len;
            node.meta = meta;
            return PutOutcome::Inserted;
        }

        let need = key.len() + value.len() + NODE_OVERHEAD;
        if !self.arena.can_fit(need) {
            return PutOutcome::Full;
        }

        let height = self.random_height();
        if height > self.height {
            self.height = height;
        }

        let (key_off, key_len) = self.arena.alloc(key);
        let (val_off, val_len) = self.arena.alloc(value);
        self.arena.charge(need);

        let mut node = Node {
            key_off,
            key_len,
            val_off,
            val_len,
            meta,
            next: [NIL; MAX_HEIGHT],
        };
        for lvl in 0..height {
            node.next[lvl] = self.nodes[prev[lvl] as usize].next[lvl];
        }

        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        for lvl in 0..height {
            self.nodes[prev[lvl] as usize].next[lvl] = idx;
        }

        if self.nodes[idx as usize].next[0] == NIL {
            self.tail = idx;
        }
        self.len += 1;
        PutOutcome::Inserted
    }

    pub(super) fn get(&self, key: &[u8]) -> Option<(&[u8], ValueType)> {
        let mut prev = [NIL; MAX_HEIGHT];
        let idx = self.find(key, &mut prev)?;
        let n = &self.nodes[idx as usize];
        Some((self.arena.slice(n.val_off, n.val_len), n.meta))
    }

    pub(super) fn min_key(&self) -> Option<&[u8]> {
        let first = self.nodes[NIL as usize].next[0];
        (first != NIL).then(|| self.key(first))
    }

    pub(super) fn max_key(&self) -> Option<&[u8]> {
        (self.tail != NIL).then(|| self.key(self.tail))
    }

    /// Clear all entries, keeping the capacity and the arena's backing
    /// allocation.
    pub(super) fn reset(&mut self) {
        self.arena.reset();
        self.nodes.truncate(1);
        self.nodes[NIL as usize] = Node::head();
        self.height = 1;
        self.len = 0;
        self.tail = NIL;
    }

    pub(super) fn iter(&self) -> Iter<'_> {
        Iter {
            skl: self,
            node: self.nodes[NIL as usize].next[0],
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Iteration
// ------------------------------------------------------------------------------------------------

/// Lazy ascending cursor over the bottom level. Restartable: each call
/// to [`SkipList::iter`] starts a fresh traversal.
pub struct Iter<'a> {
    skl: &'a SkipList,
    node: u32,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8], ValueType);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node == NIL {
            return None;
        }
        let n = &self.skl.nodes[self.node as usize];
        let item = (
            self.skl.arena.slice(n.key_off, n.key_len),
            self.skl.arena.slice(n.val_off, n.val_len),
            n.meta,
        );
        self.node = n.next[0];
        Some(item)
    }
}
