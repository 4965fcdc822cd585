//! The bucketed signature store itself: configuration, lifecycle, and state.

mod ingest;
mod reseed;
mod iter;

pub use iter::BucketIter;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;

use dyn_size_of::GetSize;

use crate::codec::{DefaultHash128, Hash128};
use crate::segment::SegmentRegistry;
use crate::Result;

/// Controls what, if anything, is stored alongside each signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadMode {
    /// Store the caller-supplied (or rank-derived) value verbatim.
    Store,
    /// Discard values; emit the low `width` bits of `h0` as the payload instead.
    RankOnly { width: u8 },
    /// Like [`PayloadMode::Store`], and additionally maintain a value → frequency histogram.
    StoreWithFrequency,
}

impl Default for PayloadMode {
    fn default() -> Self {
        PayloadMode::Store
    }
}

/// Construction-time and between-iteration configuration of a [`Store`].
///
/// Follows the same builder shape as most configuration structs in this
/// crate family: start from [`Config::default`] and override individual
/// fields with struct-update syntax, or use the short constructor methods
/// below.
#[derive(Clone, Debug)]
pub struct Config {
    /// `log2` of the number of on-disk segments. Fixed for the life of the store.
    pub log2_segments: u8,
    /// Per-segment write buffer size, in bytes.
    pub buffer_size: usize,
    /// Target mean number of signatures per emitted bucket.
    pub bucket_size: u32,
    /// Number of automatic reseed attempts `check_and_retry` performs before failing.
    pub retry_limit: u32,
    /// How payloads are derived and stored.
    pub payload_mode: PayloadMode,
    /// Directory segment files are created under; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log2_segments: 8,
            buffer_size: 16 * 1024,
            bucket_size: 256,
            retry_limit: 4,
            payload_mode: PayloadMode::Store,
            temp_dir: None,
        }
    }
}

impl Config {
    /// Overrides `bucket_size`.
    pub fn bucket_size(bucket_size: u32) -> Self {
        Self { bucket_size, ..Default::default() }
    }

    /// Overrides `log2_segments`.
    pub fn log2_segments(log2_segments: u8) -> Self {
        Self { log2_segments, ..Default::default() }
    }

    /// Overrides `payload_mode`.
    pub fn payload_mode(payload_mode: PayloadMode) -> Self {
        Self { payload_mode, ..Default::default() }
    }

    /// Overrides `temp_dir`.
    pub fn temp_dir(temp_dir: impl Into<PathBuf>) -> Self {
        Self { temp_dir: Some(temp_dir.into()), ..Default::default() }
    }

    fn segment_count(&self) -> usize {
        1usize << self.log2_segments
    }

    fn stores_payload(&self) -> bool {
        !matches!(self.payload_mode, PayloadMode::RankOnly { .. })
    }

    fn hash_mask(&self) -> Option<u64> {
        match self.payload_mode {
            PayloadMode::RankOnly { width } => Some(bitm::n_lowest_bits(width)),
            _ => None,
        }
    }
}

/// An external-memory bucketed signature store.
///
/// Accepts keys (optionally paired with values) through [`Store::add`] and
/// [`Store::add_all`], then streams them back out in bucket order through
/// [`Store::iterator`]. See the module documentation for the algorithm.
pub struct Store<K: ?Sized, H: Hash128<K> = DefaultHash128> {
    config: Config,
    hasher: H,
    seed: u64,
    segments: SegmentRegistry,
    count: Vec<u64>,
    size: u64,
    filtered_size: i64,
    filter: Option<Box<dyn Fn(u64, u64) -> bool>>,
    freq: Option<HashMap<u64, u64>>,
    checked_for_duplicates: bool,
    locked: bool,
    closed: bool,
    rng_state: u64,
    _key: PhantomData<fn(&K)>,
}

impl<K: crate::codec::ToBits + ?Sized> Store<K, DefaultHash128> {
    /// Creates a store using the default hash collaborator and seed `0`.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_hasher(config, DefaultHash128, 0)
    }
}

impl<K: ?Sized, H: Hash128<K>> Store<K, H> {
    /// Creates a store using a caller-supplied hash collaborator and initial seed.
    pub fn with_hasher(config: Config, hasher: H, seed: u64) -> Result<Self> {
        let segment_count = config.segment_count();
        let segments = SegmentRegistry::new(segment_count, config.buffer_size, config.stores_payload(), config.temp_dir.as_deref())?;
        let freq = matches!(config.payload_mode, PayloadMode::StoreWithFrequency).then(HashMap::new);
        Ok(Self {
            count: vec![0; segment_count],
            segments,
            hasher,
            seed,
            size: 0,
            filtered_size: 0,
            filter: None,
            freq,
            checked_for_duplicates: false,
            locked: false,
            closed: false,
            rng_state: seed ^ 0x9E3779B97F4A7C15,
            config,
            _key: PhantomData,
        })
    }

    /// `log2` of the segment count this store was built with.
    pub fn log2_segments(&self) -> u8 {
        self.config.log2_segments
    }

    /// Current target bucket size; may be changed between iterations.
    pub fn bucket_size(&self) -> u32 {
        self.config.bucket_size
    }

    /// Overrides the target bucket size for the next iteration.
    pub fn set_bucket_size(&mut self, bucket_size: u32) {
        self.config.bucket_size = bucket_size;
    }

    /// Total number of records ingested since the last reset, ignoring any filter.
    pub fn raw_size(&self) -> u64 {
        self.size
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            return Err(crate::Error::IllegalState("store is closed".into()));
        }
        Ok(())
    }

    /// Releases all segment files. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.segments.flush_all()?;
        self.closed = true;
        Ok(())
    }

    fn next_pseudo_random_seed(&mut self) -> u64 {
        // xorshift64: cheap, deterministic reseeding is all the retry controller needs.
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }
}

impl<K: ?Sized, H: Hash128<K>> Drop for Store<K, H> {
    fn drop(&mut self) {
        if !self.closed {
            eprintln!("store: dropped without calling close(); segment files were not explicitly released");
        }
    }
}

impl<K: ?Sized, H: Hash128<K>> GetSize for Store<K, H> {
    fn size_bytes_dyn(&self) -> usize {
        let mut bytes = self.count.capacity() * std::mem::size_of::<u64>();
        if let Some(freq) = &self.freq {
            bytes += freq.capacity() * (std::mem::size_of::<u64>() * 2);
        }
        bytes
    }

    const USES_DYN_MEM: bool = true;
}
