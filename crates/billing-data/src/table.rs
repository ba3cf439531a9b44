//! Fixed-size hash table with chained buckets.
//!
//! Each bucket is a chain of entries. New entries go to the head of their
//! chain, so iteration walks buckets in index order and each chain from the
//! most recent insert to the oldest. Reports depend on that order being
//! stable for a given input.

/// Maps a key onto one of `buckets` slots.
pub trait BucketKey: Eq {
    fn bucket(&self, buckets: usize) -> usize;
}

/// Subscriber ids hash by plain modulo.
impl BucketKey for u64 {
    fn bucket(&self, buckets: usize) -> usize {
        (*self % buckets as u64) as usize
    }
}

/// Operator ids hash with djb2, which stays stable across runs and builds.
impl BucketKey for String {
    fn bucket(&self, buckets: usize) -> usize {
        let hash = self
            .bytes()
            .fold(5381u64, |h, b| h.wrapping_mul(33).wrapping_add(u64::from(b)));
        (hash % buckets as u64) as usize
    }
}

/// Chained hash table owned by a single aggregation pass.
#[derive(Debug, Clone)]
pub struct ChainedTable<K, V> {
    // Chains are stored oldest-first; the head is the last element.
    buckets: Vec<Vec<(K, V)>>,
    len: usize,
}

impl<K: BucketKey, V> ChainedTable<K, V> {
    /// Create an empty table. A bucket count of zero is raised to one.
    pub fn new(bucket_count: usize) -> Self {
        let mut buckets = Vec::with_capacity(bucket_count.max(1));
        buckets.resize_with(bucket_count.max(1), Vec::new);
        Self { buckets, len: 0 }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of distinct keys stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the entry for `key`, inserting `make()` at the chain head on a
    /// miss.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let idx = key.bucket(self.buckets.len());
        let chain = &mut self.buckets[idx];

        let pos = match chain.iter().position(|(k, _)| *k == key) {
            Some(pos) => pos,
            None => {
                chain.push((key, make()));
                self.len += 1;
                chain.len() - 1
            }
        };
        &mut chain[pos].1
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = key.bucket(self.buckets.len());
        self.buckets[idx]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Values of one bucket, head first.
    pub fn chain(&self, idx: usize) -> impl Iterator<Item = &V> {
        self.buckets
            .get(idx)
            .into_iter()
            .flat_map(|chain| chain.iter().rev().map(|(_, v)| v))
    }

    /// All values in bucket order, each chain head first.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter().rev().map(|(_, v)| v))
    }
}
