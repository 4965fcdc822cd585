//! Bucket views: the unit of work handed to a downstream solver.

/// A borrowed view over one bucket's `(h0, h1, data)` triples, sorted by signature.
///
/// Becomes stale the moment the iterator that produced it is advanced again;
/// callers that need to retain a bucket past that point should call
/// [`BucketView::to_owned_bucket`].
pub struct BucketView<'a> {
    index: u64,
    triples: &'a [(u64, u64, u64)],
}

impl<'a> BucketView<'a> {
    pub(crate) fn new(index: u64, triples: &'a [(u64, u64, u64)]) -> Self {
        Self { index, triples }
    }

    /// Index of this bucket under the store's monotone signature-to-bucket mapping.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Number of signatures in this bucket.
    pub fn size(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// The `k`-th signature in the bucket, in emission order.
    pub fn signature(&self, k: usize) -> (u64, u64) {
        (self.triples[k].0, self.triples[k].1)
    }

    /// The `k`-th payload in the bucket.
    pub fn data(&self, k: usize) -> u64 {
        self.triples[k].2
    }

    /// Iterates over `(h0, h1, data)` triples in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, u64)> + '_ {
        self.triples.iter().copied()
    }

    /// Deep-copies this view into a standalone [`OwnedBucket`] safe to retain
    /// across further iterator calls.
    pub fn to_owned_bucket(&self) -> OwnedBucket {
        OwnedBucket { index: self.index, triples: self.triples.to_vec() }
    }
}

/// An owned, standalone copy of a bucket, safe to keep after the iterator advances.
#[derive(Clone, Debug)]
pub struct OwnedBucket {
    index: u64,
    triples: Vec<(u64, u64, u64)>,
}

impl OwnedBucket {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn signature(&self, k: usize) -> (u64, u64) {
        (self.triples[k].0, self.triples[k].1)
    }

    pub fn data(&self, k: usize) -> u64 {
        self.triples[k].2
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, u64)> + '_ {
        self.triples.iter().copied()
    }

    pub fn as_view(&self) -> BucketView<'_> {
        BucketView::new(self.index, &self.triples)
    }
}

impl dyn_size_of::GetSize for OwnedBucket {
    fn size_bytes_dyn(&self) -> usize {
        self.triples.capacity() * std::mem::size_of::<(u64, u64, u64)>()
    }

    const USES_DYN_MEM: bool = true;
}
