//! Property-based checks for the six invariants in the range trie's design
//! notes: non-overlap, coverage preservation under remove, lookup soundness,
//! range-lookup completeness/order, extent tightness, and allocator
//! disjointness.

use proptest::prelude::*;
use range_trie::{INVALID, RangeTrie, RangeTrieAllocator};

const SPACE: u64 = 0x10_000;

/// A reference model: a flat, sorted `Vec` of disjoint `(start, end)` ranges,
/// checked for agreement against the trie under test.
#[derive(Clone, Debug, Default)]
struct Model {
    ranges: Vec<(u64, u64)>,
}

impl Model {
    fn insert(&mut self, start: u64, end: u64) {
        self.ranges.push((start, end));
        self.ranges.sort_unstable();
    }

    fn remove(&mut self, start: u64, end: u64) {
        let mut next = Vec::new();
        for &(s, e) in &self.ranges {
            let i_start = s.max(start);
            let i_end = e.min(end);
            if i_start >= i_end {
                next.push((s, e));
                continue;
            }
            if s < i_start {
                next.push((s, i_start));
            }
            if i_end < e {
                next.push((i_end, e));
            }
        }
        next.sort_unstable();
        self.ranges = next;
    }

    fn lookup(&self, point: u64) -> Option<usize> {
        self.ranges
            .iter()
            .position(|&(s, e)| point >= s && point < e)
    }

    fn is_disjoint(&self) -> bool {
        self.ranges
            .windows(2)
            .all(|w| w[0].1 <= w[1].0)
    }

    fn extent(&self) -> (u64, u64) {
        match (
            self.ranges.iter().map(|&(s, _)| s).min(),
            self.ranges.iter().map(|&(_, e)| e).max(),
        ) {
            (Some(min), Some(max)) => (min, max),
            _ => (0, 0),
        }
    }
}

/// Builds a set of disjoint candidate ranges by laying out a permutation of
/// fixed-size slots, then picks a random sub-multiset of them to insert and
/// leaves the rest as "never inserted" so remove-ops have room to operate in
/// a space we can also independently validate against the model.
fn disjoint_ranges() -> impl Strategy<Value = Vec<(u64, u64)>> {
    let slot = SPACE / 64;
    Just((0u64..64).collect::<Vec<_>>()).prop_flat_map(move |slots| {
        proptest::sample::subsequence(slots, 0..=64).prop_map(move |chosen| {
            chosen
                .into_iter()
                .map(|i| (i * slot, i * slot + slot))
                .collect::<Vec<_>>()
        })
    })
}

#[derive(Clone, Debug)]
enum Op {
    Remove(u64, u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (0..SPACE, 1..(SPACE / 16)).prop_map(|(start, len)| Op::Remove(start, start + len))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn non_overlap_and_soundness_after_inserts(ranges in disjoint_ranges()) {
        let mut trie = RangeTrie::new();
        let mut model = Model::default();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            trie.insert(start, end - start, idx).unwrap();
            model.insert(start, end);
        }
        prop_assert!(model.is_disjoint());

        for point in (0..SPACE).step_by(37) {
            let want = model.lookup(point);
            let got = trie.lookup(point).copied();
            match want {
                Some(idx) => prop_assert_eq!(got, Some(ranges[idx].0).map(|_| idx)),
                None => prop_assert_eq!(got, None),
            }
        }
    }

    #[test]
    fn coverage_preserved_under_remove(ranges in disjoint_ranges(), ops in prop::collection::vec(op_strategy(), 0..8)) {
        let mut trie = RangeTrie::new();
        let mut model = Model::default();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            trie.insert(start, end - start, idx).unwrap();
            model.insert(start, end);
        }

        for op in ops {
            let Op::Remove(start, end) = op;
            trie.remove(start, end - start).unwrap();
            model.remove(start, end);
        }

        prop_assert!(model.is_disjoint());

        // Lookup soundness against the model for every point on a coarse grid,
        // doubling as coverage preservation: every point the model still
        // covers must be found in the trie, and vice versa.
        for point in (0..SPACE).step_by(23) {
            let model_hit = model.lookup(point).is_some();
            let trie_hit = trie.lookup(point).is_some();
            prop_assert_eq!(model_hit, trie_hit, "disagreement at point {:#x}", point);
        }

        prop_assert_eq!(trie.extent(), model.extent());
    }

    #[test]
    fn range_lookup_matches_model_order(ranges in disjoint_ranges(), query_start in 0..SPACE, query_len in 1..SPACE) {
        let mut trie = RangeTrie::new();
        let mut model = Model::default();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            trie.insert(start, end - start, idx).unwrap();
            model.insert(start, end);
        }

        let query_end = query_start.saturating_add(query_len);
        let mut expected: Vec<(u64, u64)> = model
            .ranges
            .iter()
            .copied()
            .filter(|&(s, e)| s.max(query_start) < e.min(query_end))
            .collect();
        expected.sort_unstable_by_key(|&(_, e)| e);

        let mut got = Vec::new();
        trie.range_lookup(query_start, query_len, |s, l| got.push((s, s + l)));

        prop_assert_eq!(got, expected);
    }

    #[test]
    fn allocator_never_overlaps(ranges in disjoint_ranges(), length in 1..2048u64) {
        let mut trie = RangeTrie::new();
        for (idx, &(start, end)) in ranges.iter().enumerate() {
            trie.insert(start, end - start, idx).unwrap();
        }

        let mut allocated = Vec::new();
        let mut allocator = RangeTrieAllocator::new(&mut trie);
        loop {
            let start = allocator.allocate(length);
            if start == INVALID {
                break;
            }
            allocated.push((start, start + length));
            if allocated.len() as u64 > SPACE {
                // Backstop: a correct first-fit allocator strictly shrinks
                // available span on every call, so this should never trip.
                prop_assert!(false, "allocator did not converge");
            }
        }

        allocated.sort_unstable();
        for w in allocated.windows(2) {
            prop_assert!(w[0].1 <= w[1].0, "allocated ranges overlap: {:?}", w);
        }
    }
}
