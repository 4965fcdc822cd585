//! Accepting keys (and optional values) into the store.

use crate::codec::Hash128;
use crate::segment::Record;
use crate::{Error, Result};

use super::Store;

impl<K: ?Sized, H: Hash128<K>> Store<K, H> {
    /// Ingests a single key, optionally paired with a value.
    ///
    /// If `value` is `None`, the implicit value is the current filtered rank
    /// (the number of previously-accepted records that pass the filter).
    pub fn add(&mut self, key: &K, value: Option<u64>) -> Result<()> {
        self.require_open()?;
        let (h0, h1) = self.hasher.hash128(key, self.seed);
        let segment = top_bits(h0, self.config.log2_segments) as usize;
        self.count[segment] += 1;

        let accepted_by_filter = self.filter.as_ref().map_or(true, |f| f(h0, h1));
        let rank = if self.filtered_size >= 0 { self.filtered_size as u64 } else { self.size };
        let payload = value.unwrap_or(rank);

        self.segments.segment_mut(segment).append(Record { h0, h1, payload })?;

        self.checked_for_duplicates = false;

        if self.filtered_size >= 0 {
            if accepted_by_filter {
                self.filtered_size += 1;
            }
        }

        if let Some(freq) = &mut self.freq {
            *freq.entry(payload).or_insert(0) += 1;
        }

        self.size += 1;
        Ok(())
    }

    /// Ingests keys from an iterator, pairing each with the matching element
    /// of `values` if supplied.
    pub fn add_all<'a, I, V>(&mut self, keys: I, values: Option<V>) -> Result<()>
    where
        K: 'a,
        I: IntoIterator<Item = &'a K>,
        V: IntoIterator<Item = u64>,
    {
        match values {
            None => {
                for key in keys {
                    self.add(key, None)?;
                }
            }
            Some(values) => {
                let mut values = values.into_iter();
                for key in keys {
                    let value = values.next().ok_or_else(|| Error::InvalidInput("fewer values than keys".into()))?;
                    self.add(key, Some(value))?;
                }
                if values.next().is_some() {
                    return Err(Error::InvalidInput("more values than keys".into()));
                }
            }
        }
        Ok(())
    }

    /// Replaces the active filter. Invalidates any cached filtered size.
    pub fn set_filter(&mut self, filter: Option<Box<dyn Fn(u64, u64) -> bool>>) {
        self.filter = filter;
        self.filtered_size = -1;
    }

    /// Number of records accepted by the current filter (or all records, if
    /// no filter is set). Triggers a full re-scan of every segment the first
    /// time it is called after a filter change.
    pub fn size(&mut self) -> Result<u64> {
        self.require_open()?;
        if self.filtered_size >= 0 {
            return Ok(self.filtered_size as u64);
        }
        self.segments.flush_all()?;
        let mut total = 0u64;
        for i in 0..self.segments.len() {
            let records = self.segments.segment_mut(i).read_all()?;
            if let Some(filter) = &self.filter {
                total += records.iter().filter(|r| filter(r.h0, r.h1)).count() as u64;
            } else {
                total += records.len() as u64;
            }
        }
        self.filtered_size = total as i64;
        Ok(total)
    }

    /// Returns the frequency of `value` among all ingested payloads.
    ///
    /// Fails with [`Error::IllegalState`] unless the store was configured
    /// with [`PayloadMode::StoreWithFrequency`].
    pub fn freq(&self, value: u64) -> Result<u64> {
        self.freq
            .as_ref()
            .map(|f| f.get(&value).copied().unwrap_or(0))
            .ok_or_else(|| Error::IllegalState("store was not configured to keep a frequency histogram".into()))
    }
}

#[inline]
fn top_bits(h0: u64, l: u8) -> u64 {
    if l == 0 { 0 } else { h0 >> (64 - l) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Config, PayloadMode};

    #[test]
    fn add_increments_raw_size() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.add(&"a", None).unwrap();
        store.add(&"b", None).unwrap();
        assert_eq!(store.raw_size(), 2);
    }

    #[test]
    fn add_all_rejects_length_mismatch() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        let keys = ["a", "b", "c"];
        let err = store.add_all(keys.iter(), Some(vec![1u64, 2u64])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn size_without_filter_matches_raw_size() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.add_all(["a", "b", "c"].iter(), None::<Vec<u64>>).unwrap();
        assert_eq!(store.size().unwrap(), 3);
    }

    #[test]
    fn filtered_size_is_cached_after_first_scan() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.add_all(["a", "b", "c", "d"].iter(), None::<Vec<u64>>).unwrap();
        store.set_filter(Some(Box::new(|h0, _h1| h0 % 2 == 0)));
        let first = store.size().unwrap();
        let second = store.size().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn freq_requires_configuration() {
        let store: Store<&str> = Store::new(Config::default()).unwrap();
        assert!(store.freq(0).is_err());
    }

    #[test]
    fn freq_counts_repeated_values() {
        let mut store: Store<&str> = Store::new(Config { payload_mode: PayloadMode::StoreWithFrequency, ..Config::default() }).unwrap();
        store.add(&"a", Some(7)).unwrap();
        store.add(&"b", Some(7)).unwrap();
        store.add(&"c", Some(9)).unwrap();
        assert_eq!(store.freq(7).unwrap(), 2);
        assert_eq!(store.freq(9).unwrap(), 1);
    }
}
