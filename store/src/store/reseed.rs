//! Resetting, locking, and the automatic reseed/retry controller.

use crate::codec::Hash128;
use crate::{Error, Result};

use super::Store;

impl<K: ?Sized, H: Hash128<K>> Store<K, H> {
    /// Resets the store to empty under a new seed.
    ///
    /// Fails with [`Error::IllegalState`] if the current seed has already
    /// been observed through [`Store::seed`].
    pub fn reset(&mut self, new_seed: u64) -> Result<()> {
        self.require_open()?;
        if self.locked {
            return Err(Error::IllegalState("seed is locked; call clear() first".into()));
        }
        self.seed = new_seed;
        self.filtered_size = 0;
        self.checked_for_duplicates = false;
        self.count.iter_mut().for_each(|c| *c = 0);
        self.size = 0;
        self.segments.truncate_all()?;
        Ok(())
    }

    /// Returns the store to its post-construction state: unlocked, seed `0`,
    /// frequency histogram cleared if present.
    pub fn clear(&mut self) -> Result<()> {
        self.locked = false;
        if let Some(freq) = &mut self.freq {
            freq.clear();
        }
        self.reset(0)
    }

    /// Returns the current seed and locks the store against further resets
    /// until [`Store::clear`] is called.
    pub fn seed(&mut self) -> u64 {
        self.locked = true;
        self.seed
    }

    /// Iterates the store to completion without exposing buckets, solely to
    /// let duplicate detection fire. Returns `Ok(())` if no duplicate
    /// signature was found.
    pub fn check(&mut self) -> Result<()> {
        let mut iter = self.iterator()?;
        while self.next_bucket(&mut iter)?.is_some() {}
        self.checked_for_duplicates = true;
        Ok(())
    }

    /// Runs [`Store::check`]; on [`Error::Duplicate`], reseeds with a fresh
    /// pseudo-random seed, re-ingests `keys`/`values`, and tries again, up to
    /// `retry_limit` times.
    pub fn check_and_retry<'a, I, V>(&mut self, keys: I, values: Option<V>) -> Result<()>
    where
        K: 'a,
        I: IntoIterator<Item = &'a K> + Clone,
        V: IntoIterator<Item = u64> + Clone,
    {
        for _ in 0..self.config.retry_limit {
            match self.check() {
                Ok(()) => return Ok(()),
                Err(Error::Duplicate { .. }) => {
                    let fresh_seed = self.next_pseudo_random_seed();
                    self.reset(fresh_seed)?;
                    self.add_all(keys.clone(), values.clone())?;
                }
                Err(other) => return Err(other),
            }
        }
        Err(Error::InvalidInput("duplicates".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Config;

    #[test]
    fn reset_clears_counts_and_size() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.add(&"a", None).unwrap();
        store.reset(42).unwrap();
        assert_eq!(store.raw_size(), 0);
    }

    #[test]
    fn reset_after_seed_lock_fails() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.seed();
        assert!(matches!(store.reset(1), Err(Error::IllegalState(_))));
    }

    #[test]
    fn clear_unlocks_and_resets() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.seed();
        store.clear().unwrap();
        store.reset(7).unwrap();
    }

    #[test]
    fn check_succeeds_without_duplicates() {
        let mut store: Store<&str> = Store::new(Config::default()).unwrap();
        store.add_all(["a", "b", "c"].iter(), None::<Vec<u64>>).unwrap();
        store.check().unwrap();
    }
}
