//! The bucket iterator: the component that streams sorted buckets out of the segments.
//!
//! Segment `s` is opened once, sorted in memory by signature, and consumed
//! left to right. A bucket is emitted as soon as its upper boundary can be
//! proven, which in general requires a small residual of already-sorted
//! records to be carried over into the next segment's sort.

use bitm::{n_lowest_bits, BitAccess};

use crate::bucket::BucketView;
use crate::codec::Hash128;
use crate::{Error, Result};

use super::Store;

/// Monotone fixed-point map from the high half of a signature to a bucket index.
///
/// `m` is the total bucket count; the map is onto `[0, m)`. Relies on `u128`
/// multiplication rather than a manual high/low decomposition, since Rust's
/// native 128-bit multiply already gives us the upper half directly.
#[inline]
fn bucket_of(h0: u64, m: u64) -> u64 {
    if m <= 1 {
        return 0;
    }
    let multiplier = 2 * m as u128;
    (((h0 >> 1) as u128 * multiplier) >> 64) as u64
}

/// Binary-searches `[lo, hi)` of an array sorted by `bucket_of` for the first
/// index whose bucket exceeds `bucket`.
fn partition_after_bucket(triples: &[(u64, u64, u64)], mut lo: usize, mut hi: usize, bucket: u64, m: u64) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if bucket_of(triples[mid].0, m) <= bucket {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Locates the end of `bucket`'s run starting at `start`, using a galloping
/// probe (doubling step sizes) to find a small bracket before refining it
/// with binary search. Returns `(end, needs_refill)`; `needs_refill` is true
/// when the probe ran off the end of the loaded window while still inside
/// the bucket, meaning more segment data might extend it further.
fn probe_bucket_end(triples: &[(u64, u64, u64)], start: usize, bucket: u64, m: u64) -> (usize, bool) {
    let len = triples.len();
    if start >= len {
        return (start, true);
    }
    if bucket_of(triples[start].0, m) > bucket {
        return (start, false);
    }
    let mut lo = start;
    let mut step = 1usize;
    loop {
        let probe = lo + step;
        if probe >= len {
            return (partition_after_bucket(triples, lo, len, bucket, m), true);
        }
        if bucket_of(triples[probe].0, m) > bucket {
            return (partition_after_bucket(triples, lo, probe, bucket, m), false);
        }
        lo = probe;
        step *= 2;
    }
}

/// Streaming cursor over a store's buckets. Obtained from [`Store::iterator`]
/// and driven with [`Store::next_bucket`] (a streaming iterator shape, since
/// each bucket borrows the cursor's own scratch buffer).
pub struct BucketIter {
    m: u64,
    bucket: u64,
    next_segment: usize,
    segment_count: usize,
    last: usize,
    triples: Vec<(u64, u64, u64)>,
    hash_mask: Option<u64>,
    skip_duplicate_check: bool,
    duplicate_free_so_far: bool,
}

impl<K: ?Sized, H: Hash128<K>> Store<K, H> {
    /// Prepares a fresh bucket iterator over the store's current contents.
    ///
    /// Flushes all pending writes and computes the bucket count from the
    /// (post-filter) size and the current `bucket_size`. May be called more
    /// than once; each call re-reads every segment from the beginning.
    pub fn iterator(&mut self) -> Result<BucketIter> {
        self.require_open()?;
        self.segments.flush_all()?;
        let n = self.size()?;
        let b = self.config.bucket_size.max(1) as u64;
        let m = 1 + n / b;
        let hash_mask = self.config.hash_mask();
        Ok(BucketIter {
            m,
            bucket: 0,
            next_segment: 0,
            segment_count: self.segments.len(),
            last: 0,
            triples: Vec::with_capacity((b as usize) * 2 + 16 * self.config.bucket_size as usize),
            hash_mask,
            skip_duplicate_check: self.checked_for_duplicates,
            duplicate_free_so_far: true,
        })
    }

    /// Advances `iter` and returns the next bucket, or `Ok(None)` once every
    /// bucket has been emitted.
    ///
    /// Fails with [`Error::Duplicate`] the first time two ingested keys are
    /// found to share a signature (unless the store has already confirmed
    /// the absence of duplicates via a prior full iteration).
    pub fn next_bucket<'it>(&mut self, iter: &'it mut BucketIter) -> Result<Option<BucketView<'it>>> {
        if iter.bucket >= iter.m {
            return Ok(None);
        }
        loop {
            let (end, needs_refill) = probe_bucket_end(&iter.triples, iter.last, iter.bucket, iter.m);
            if needs_refill && iter.next_segment < iter.segment_count {
                self.refill(iter)?;
                continue;
            }

            if !iter.skip_duplicate_check && end > iter.last + 1 {
                for i in iter.last + 1..end {
                    if iter.triples[i].0 == iter.triples[i - 1].0 && iter.triples[i].1 == iter.triples[i - 1].1 {
                        iter.duplicate_free_so_far = false;
                        return Err(Error::Duplicate { bucket: iter.bucket });
                    }
                }
            }

            let start = iter.last;
            let index = iter.bucket;
            iter.last = end;
            iter.bucket += 1;

            if iter.bucket == iter.m && iter.next_segment >= iter.segment_count && iter.duplicate_free_so_far {
                self.checked_for_duplicates = true;
            }

            return Ok(Some(BucketView::new(index, &iter.triples[start..end])));
        }
    }

    fn refill(&mut self, iter: &mut BucketIter) -> Result<()> {
        iter.triples.drain(0..iter.last);
        iter.last = 0;

        let segment_index = iter.next_segment;
        iter.next_segment += 1;
        let records = self.segments.segment_mut(segment_index).read_all()?;
        for record in records {
            if let Some(filter) = &self.filter {
                if !filter(record.h0, record.h1) {
                    continue;
                }
            }
            let data = match iter.hash_mask {
                Some(mask) => record.h0 & mask,
                None => record.payload,
            };
            iter.triples.push((record.h0, record.h1, data));
        }
        iter.triples[..].sort_unstable_by_key(|t| (t.0, t.1));
        Ok(())
    }

    /// Derived operation: builds a packed array whose `i`-th entry holds the
    /// low `width` bits of the signature of the key that was assigned rank
    /// `i` (the default payload when the store is used with `PayloadMode::Store`
    /// and no caller-supplied values).
    pub fn signatures_table(&mut self, width: u8) -> Result<Box<[u64]>> {
        let n = self.size()? as usize;
        let words = bitm::ceiling_div(n * width as usize, 64);
        let mut table = vec![0u64; words].into_boxed_slice();
        let mask = n_lowest_bits(width);

        let mut iter = self.iterator()?;
        while let Some(bucket) = self.next_bucket(&mut iter)? {
            for (h0, _h1, rank) in bucket.iter() {
                table.init_fragment(rank as usize, h0 & mask, width);
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Config;

    #[test]
    fn bucket_of_is_monotone() {
        let m = 37u64;
        let mut previous = 0u64;
        for h0 in (0..u64::MAX).step_by(u64::MAX as usize / 10_000) {
            let b = bucket_of(h0, m);
            assert!(b >= previous);
            assert!(b < m);
            previous = b;
        }
    }

    #[test]
    fn empty_store_yields_one_empty_bucket() {
        let mut store: Store<&str> = Store::new(Config::bucket_size(1)).unwrap();
        let mut iter = store.iterator().unwrap();
        let bucket = store.next_bucket(&mut iter).unwrap().unwrap();
        assert_eq!(bucket.index(), 0);
        assert!(bucket.is_empty());
        assert!(store.next_bucket(&mut iter).unwrap().is_none());
    }

    #[test]
    fn singleton_store_yields_one_bucket_one_entry() {
        let mut store: Store<&str> = Store::new(Config::bucket_size(1)).unwrap();
        store.add(&"x", None).unwrap();
        let mut iter = store.iterator().unwrap();
        let bucket = store.next_bucket(&mut iter).unwrap().unwrap();
        assert_eq!(bucket.size(), 1);
        assert_eq!(bucket.data(0), 0);
    }

    #[test]
    fn duplicate_key_is_detected() {
        let mut store: Store<&str> = Store::new(Config::bucket_size(1)).unwrap();
        store.add(&"x", None).unwrap();
        store.add(&"x", None).unwrap();
        let err = store.check().unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
    }

    #[test]
    fn buckets_are_emitted_in_strictly_increasing_order() {
        let mut store: Store<String> = Store::new(Config::bucket_size(4)).unwrap();
        let keys: Vec<String> = (0..500).map(|i| format!("key-{i}")).collect();
        store.add_all(keys.iter(), None::<Vec<u64>>).unwrap();
        store.check().unwrap();

        let mut iter = store.iterator().unwrap();
        let mut last_index: Option<u64> = None;
        let mut total = 0usize;
        while let Some(bucket) = store.next_bucket(&mut iter).unwrap() {
            if let Some(previous) = last_index {
                assert!(bucket.index() > previous);
            }
            last_index = Some(bucket.index());
            let mut prev_sig: Option<(u64, u64)> = None;
            for (h0, h1, _data) in bucket.iter() {
                if let Some(prev) = prev_sig {
                    assert!((h0, h1) > prev);
                }
                prev_sig = Some((h0, h1));
            }
            total += bucket.size();
        }
        assert_eq!(total, 500);
    }

    #[test]
    fn bucket_larger_than_segment_spans_segments_in_order() {
        let mut store: Store<String> = Store::new(Config { log2_segments: 3, bucket_size: 4_000, ..Config::default() }).unwrap();
        let keys: Vec<String> = (0..1000).map(|i| format!("wide-{i}")).collect();
        store.add_all(keys.iter(), None::<Vec<u64>>).unwrap();

        let mut iter = store.iterator().unwrap();
        let mut seen = 0usize;
        while let Some(bucket) = store.next_bucket(&mut iter).unwrap() {
            let mut prev: Option<(u64, u64)> = None;
            for (h0, h1, _) in bucket.iter() {
                if let Some(p) = prev {
                    assert!((h0, h1) > p);
                }
                prev = Some((h0, h1));
            }
            seen += bucket.size();
        }
        assert_eq!(seen, 1000);
    }

    #[test]
    fn signatures_table_matches_bucket_contents() {
        let mut store: Store<String> = Store::new(Config::bucket_size(8)).unwrap();
        let keys: Vec<String> = (0..50).map(|i| format!("tab-{i}")).collect();
        store.add_all(keys.iter(), None::<Vec<u64>>).unwrap();
        let table = store.signatures_table(16).unwrap();

        let mut iter = store.iterator().unwrap();
        while let Some(bucket) = store.next_bucket(&mut iter).unwrap() {
            for (h0, _h1, rank) in bucket.iter() {
                let stored = table.get_fragment(rank as usize, 16);
                assert_eq!(stored, h0 & n_lowest_bits(16));
            }
        }
    }
}
