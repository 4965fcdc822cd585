#![doc = include_str!("../README.md")]

pub mod seedable_hash;
pub use seedable_hash::{BuildSeededHasher, Seedable, BuildDefaultSeededHasher};

mod error;
pub use error::Error;

pub mod codec;
pub use codec::{ToBits, Hash128, DefaultHash128};

mod segment;
pub use segment::{SegmentFile, SegmentRegistry};

pub mod bucket;
pub use bucket::{BucketView, OwnedBucket};

pub mod store;
pub use store::{Store, Config, PayloadMode, BucketIter};

pub use dyn_size_of::GetSize;

/// `Result` with [`Error`] as the default error type.
pub type Result<T> = std::result::Result<T, Error>;
