//! Bit-pivoted binary trie over non-overlapping `[start, end)` ranges, keyed
//! on each range's upper endpoint.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::RangeTrieError;
use crate::range::{EMPTY, Range, cut, intersect};

/// Caller-visible sentinel returned by [`RangeTrieAllocator::allocate`] when no
/// stored range has span strictly greater than the request.
pub const INVALID: u64 = u64::MAX;

struct Node<V> {
    range: Range,
    value: V,
    pivot_bit: u8,
    children: [Option<Box<Node<V>>>; 2],
}

impl<V> Node<V> {
    fn leaf(range: Range, value: V) -> Box<Self> {
        Box::new(Self {
            range,
            value,
            pivot_bit: 0,
            children: [None, None],
        })
    }
}

/// The highest bit position at which `a` and `b` differ, or `None` if `a == b`.
fn msb(diff: u64) -> Option<u8> {
    if diff == 0 {
        None
    } else {
        Some(63 - diff.leading_zeros() as u8)
    }
}

fn bit_at(key: u64, bit: u8) -> usize {
    ((key >> bit) & 1) as usize
}

/// An ordered associative map from non-overlapping `[start, end)` ranges to
/// values of type `V`. See the crate-level docs for the invariants this type
/// upholds.
pub struct RangeTrie<V> {
    root: Option<Box<Node<V>>>,
}

impl<V> Default for RangeTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RangeTrie<V> {
    pub const fn new() -> Self {
        Self { root: None }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Stores `[start, start + length)` mapped to `value`.
    ///
    /// The caller must ensure the new range is disjoint from every range
    /// already stored; with the `debug-invariants` feature enabled this is
    /// checked with a `debug_assert!` over the whole trie.
    pub fn insert(&mut self, start: u64, length: u64, value: V) -> Result<(), RangeTrieError> {
        if length == 0 {
            return Err(RangeTrieError::EmptyRange);
        }
        let range = Range::new(start, start + length);

        #[cfg(feature = "debug-invariants")]
        assert_disjoint(&self.root, range);

        log::trace!("range-trie: insert {:#x}..{:#x}", range.start, range.end);
        insert_into(&mut self.root, Node::leaf(range, value));
        Ok(())
    }

    /// Returns the value of the unique stored range containing `point`, if any.
    pub fn lookup(&self, point: u64) -> Option<&V> {
        lookup_node(&self.root, point).map(|n| &n.value)
    }

    /// Calls `visitor(start, length)` once per stored range overlapping
    /// `[start, start + length)`, in ascending `end` order.
    pub fn range_lookup(&self, start: u64, length: u64, mut visitor: impl FnMut(u64, u64)) {
        for (start, end) in self.collect_overlaps(start, length) {
            visitor(start, end - start);
        }
    }

    /// Pull-based equivalent of [`RangeTrie::range_lookup`], yielding
    /// `(start, length)` pairs in the same ascending-`end` order.
    pub fn range_iter(&self, start: u64, length: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.collect_overlaps(start, length)
            .into_iter()
            .map(|(start, end)| (start, end - start))
    }

    fn collect_overlaps(&self, start: u64, length: u64) -> Vec<(u64, u64)> {
        let mut hits = Vec::new();
        if length != 0 {
            let q = Range::new(start, start + length);
            collect_overlaps(&self.root, q, &mut hits);
            hits.sort_unstable_by_key(|&(_, end)| end);
        }
        hits
    }

    /// Returns `(min_start, max_end)` across every stored range, or `(0, 0)`
    /// if the trie is empty.
    pub fn extent(&self) -> (u64, u64) {
        match (extent_min(&self.root), extent_max(&self.root)) {
            (Some(min), Some(max)) => (min, max),
            _ => (0, 0),
        }
    }
}

impl<V: Clone> RangeTrie<V> {
    /// Removes the portion of every stored range overlapping
    /// `[start, start + length)`. A range whose overlap is strictly interior
    /// is split into the two surviving pieces, each carrying a clone of the
    /// original value.
    pub fn remove(&mut self, start: u64, length: u64) -> Result<(), RangeTrieError> {
        if length == 0 {
            return Err(RangeTrieError::EmptyRange);
        }
        let k = Range::new(start, start + length);
        log::trace!("range-trie: remove {:#x}..{:#x}", k.start, k.end);

        let mut pending = Vec::new();
        remove_rec(&mut self.root, k, &mut pending);
        for (range, value) in pending {
            insert_into(&mut self.root, Node::leaf(range, value));
        }
        Ok(())
    }
}

/// A first-fit allocator facade over a borrowed [`RangeTrie`]. See the
/// crate docs for why this does not shrink the trie via `remove`.
pub struct RangeTrieAllocator<'a, V> {
    trie: &'a mut RangeTrie<V>,
}

impl<'a, V> RangeTrieAllocator<'a, V> {
    pub fn new(trie: &'a mut RangeTrie<V>) -> Self {
        Self { trie }
    }

    /// Depth-first first-fit: truncates the first stored range with
    /// `span > length` from its low end and returns its old start, or
    /// [`INVALID`] if no range fits.
    pub fn allocate(&mut self, length: u64) -> u64 {
        let result = alloc_rec(&mut self.trie.root, length);
        if result == INVALID {
            log::warn!("range-trie: allocate({length:#x}) found no fitting range");
        } else {
            log::trace!(
                "range-trie: allocate({length:#x}) -> {result:#x}..{:#x}",
                result + length
            );
        }
        result
    }
}

fn insert_into<V>(slot: &mut Option<Box<Node<V>>>, mut new_node: Box<Node<V>>) {
    match slot {
        None => *slot = Some(new_node),
        Some(existing) => {
            let m = msb(existing.range.end ^ new_node.range.end);
            // `existing` can only route `new_node` through its own child slots
            // if the two keys already agree above `existing.pivot_bit` — i.e.
            // the highest differing bit `m` is at or below it. Otherwise
            // `new_node` discriminates at a coarser bit than `existing` was
            // ever set up to test, so `new_node` must become the router here
            // and `existing` descends instead (DESIGN.md's resolution of the
            // reference's ambiguous branch direction).
            if m.is_some_and(|m| m <= existing.pivot_bit) {
                let idx = bit_at(new_node.range.end, existing.pivot_bit);
                insert_into(&mut existing.children[idx], new_node);
            } else {
                new_node.pivot_bit = m.unwrap_or(0);
                let old = slot.take().unwrap();
                let idx = bit_at(old.range.end, new_node.pivot_bit);
                new_node.children[idx] = Some(old);
                *slot = Some(new_node);
            }
        }
    }
}

/// A range's span can straddle the power-of-two boundary its own `pivot_bit`
/// sits on, so an interior point's bit at that position can disagree with
/// the stored key's (its `range.end`) bit there. Routing by the point's bit
/// alone is therefore only a hint, not a proof of absence: if the indicated
/// child comes up empty, the other child is still checked before giving up.
fn lookup_node<V>(slot: &Option<Box<Node<V>>>, point: u64) -> Option<&Node<V>> {
    let node = slot.as_ref()?;
    if node.range.contains(point) {
        return Some(node);
    }
    let primary = bit_at(point, node.pivot_bit);
    lookup_node(&node.children[primary], point).or_else(|| lookup_node(&node.children[1 - primary], point))
}

fn collect_overlaps<V>(slot: &Option<Box<Node<V>>>, q: Range, out: &mut Vec<(u64, u64)>) {
    let Some(node) = slot else { return };
    if !intersect(node.range, q).is_empty() {
        out.push((node.range.start, node.range.end));
    }
    collect_overlaps(&node.children[0], q, out);
    collect_overlaps(&node.children[1], q, out);
}

/// The trie is keyed on `end`, so the left spine does not generally hold the
/// smallest `start` once a node has been spliced in by a partial `remove`
/// (the same subtlety as [`lookup_node`]'s bit-hint): every reachable node
/// is considered rather than just the left-most path.
fn extent_min<V>(slot: &Option<Box<Node<V>>>) -> Option<u64> {
    let node = slot.as_ref()?;
    let mut min = node.range.start;
    if let Some(left) = extent_min(&node.children[0]) {
        min = min.min(left);
    }
    if let Some(right) = extent_min(&node.children[1]) {
        min = min.min(right);
    }
    Some(min)
}

fn extent_max<V>(slot: &Option<Box<Node<V>>>) -> Option<u64> {
    let node = slot.as_ref()?;
    let mut max = node.range.end;
    if let Some(left) = extent_max(&node.children[0]) {
        max = max.max(left);
    }
    if let Some(right) = extent_max(&node.children[1]) {
        max = max.max(right);
    }
    Some(max)
}

fn alloc_rec<V>(slot: &mut Option<Box<Node<V>>>, length: u64) -> u64 {
    let Some(node) = slot else { return INVALID };
    let hit = alloc_rec(&mut node.children[0], length);
    if hit != INVALID {
        return hit;
    }
    let hit = alloc_rec(&mut node.children[1], length);
    if hit != INVALID {
        return hit;
    }
    if node.range.span() > length {
        let result = node.range.start;
        node.range.start += length;
        return result;
    }
    INVALID
}

/// Detaches the node in `slot`, splicing a replacement in its place so every
/// range still reachable from `slot` before the call remains reachable after.
fn delete_node<V>(slot: &mut Option<Box<Node<V>>>) {
    let Some(removed) = slot.take() else { return };
    let Node {
        pivot_bit,
        children: [c0, c1],
        ..
    } = *removed;
    match (c0, c1) {
        (None, c1) => *slot = c1,
        (c0, None) => *slot = c0,
        (Some(mut c0), Some(c1)) => {
            // Minimum-surgery splice: promote the left child, carrying over
            // the deleted node's pivot bit, then fold the right subtree back
            // in through ordinary insertion.
            c0.pivot_bit = pivot_bit;
            *slot = Some(c0);
            graft(slot, *c1);
        }
    }
}

/// Re-inserts every `(range, value)` pair held by `node`'s subtree as fresh
/// leaves, used by [`delete_node`] to fold a displaced subtree back in
/// without disturbing the ranges it carries.
fn graft<V>(slot: &mut Option<Box<Node<V>>>, node: Node<V>) {
    let Node {
        range,
        value,
        children: [c0, c1],
        ..
    } = node;
    insert_into(slot, Node::leaf(range, value));
    if let Some(c0) = c0 {
        graft(slot, *c0);
    }
    if let Some(c1) = c1 {
        graft(slot, *c1);
    }
}

fn remove_rec<V: Clone>(slot: &mut Option<Box<Node<V>>>, k: Range, pending: &mut Vec<(Range, V)>) {
    let mut k = k;
    let mut extra_k = EMPTY;
    let mut spliced = false;

    if slot.is_some() {
        let node_range = slot.as_ref().unwrap().range;
        let i = intersect(node_range, k);
        if !i.is_empty() {
            let (new_k, new_extra_k) = cut(k, i);
            k = new_k;
            extra_k = new_extra_k;

            let (here, extra_here) = cut(node_range, i);
            if here.is_empty() || here.end != node_range.end {
                let value = slot.as_ref().unwrap().value.clone();
                log::trace!(
                    "range-trie: splitting stored range {:#x}..{:#x}",
                    node_range.start,
                    node_range.end
                );
                delete_node(slot);
                if !here.is_empty() {
                    pending.push((here, value.clone()));
                }
                if !extra_here.is_empty() {
                    pending.push((extra_here, value));
                }
                spliced = true;
            } else {
                slot.as_mut().unwrap().range = here;
                if !extra_here.is_empty() {
                    let value = slot.as_ref().unwrap().value.clone();
                    pending.push((extra_here, value));
                }
            }
        }
    }

    if spliced {
        // `delete_node` moved a different node into `slot` (a child or the
        // grafted remainder of one); that occupant itself may still overlap
        // the remaining pieces, not just its own children, so it has to be
        // checked again rather than skipped straight to its children.
        if !k.is_empty() {
            remove_rec(slot, k, pending);
        }
        if !extra_k.is_empty() {
            remove_rec(slot, extra_k, pending);
        }
        return;
    }

    // As in lookup, a query range's key bit at this node's pivot is only a
    // hint for which child holds overlapping ranges, not a guarantee — both
    // children are visited so a stored range whose span crosses the pivot's
    // boundary is never silently skipped.
    if !k.is_empty()
        && let Some(node) = slot.as_mut()
    {
        remove_rec(&mut node.children[0], k, pending);
        remove_rec(&mut node.children[1], k, pending);
    }
    if !extra_k.is_empty()
        && let Some(node) = slot.as_mut()
    {
        remove_rec(&mut node.children[0], extra_k, pending);
        remove_rec(&mut node.children[1], extra_k, pending);
    }
}

#[cfg(feature = "debug-invariants")]
fn assert_disjoint<V>(slot: &Option<Box<Node<V>>>, r: Range) {
    let Some(node) = slot else { return };
    debug_assert!(
        intersect(node.range, r).is_empty(),
        "range-trie: {:#x}..{:#x} overlaps existing range {:#x}..{:#x}",
        r.start,
        r.end,
        node.range.start,
        node.range.end
    );
    assert_disjoint(&node.children[0], r);
    assert_disjoint(&node.children[1], r);
}
