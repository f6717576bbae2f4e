//! In-process partitioned keyed collection.
//!
//! [`Dataset`] is the distributed-collection runtime the pipeline is
//! written against: an unordered multiset of `(key, value)` records
//! split into partitions. One-to-one and one-to-many operators run
//! every partition in parallel on the current rayon pool; grouped
//! reduction combines values map-side, shuffles the partial results to
//! partitions by a keyed SipHash of the key, and finishes the fold on
//! the receiving partition.
//!
//! Nothing is shared between partitions while an operator runs. The
//! order in which values of one key are combined is unspecified, so
//! merge functions handed to [`Dataset::reduce_by_key`] must be
//! associative and commutative.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use rayon::prelude::*;
use siphasher::sip::SipHasher13;

/// A partitioned, unordered collection of keyed records.
#[derive(Debug, Clone)]
pub struct Dataset<K, V> {
    partitions: Vec<Vec<(K, V)>>,
}

impl<K: Send, V: Send> Dataset<K, V> {
    /// Load records into `partitions` partitions, dealing them out
    /// round-robin. A partition count of 0 is treated as 1.
    #[must_use]
    pub fn parallelize(records: impl IntoIterator<Item = (K, V)>, partitions: usize) -> Self {
        let n = partitions.max(1);
        let mut out: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
        for (i, record) in records.into_iter().enumerate() {
            out[i % n].push(record);
        }
        Self { partitions: out }
    }

    /// Number of partitions.
    #[must_use]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Returns `true` if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Vec::is_empty)
    }

    /// Record counts per partition.
    #[must_use]
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Vec::len).collect()
    }

    /// Transform every record into exactly one new record.
    #[must_use]
    pub fn map<K2, V2, F>(self, f: F) -> Dataset<K2, V2>
    where
        K2: Send,
        V2: Send,
        F: Fn((K, V)) -> (K2, V2) + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .map(|partition| partition.into_iter().map(&f).collect())
            .collect();
        Dataset { partitions }
    }

    /// Transform every record into zero or more new records.
    #[must_use]
    pub fn flat_map<K2, V2, I, F>(self, f: F) -> Dataset<K2, V2>
    where
        K2: Send,
        V2: Send,
        I: IntoIterator<Item = (K2, V2)>,
        F: Fn((K, V)) -> I + Sync + Send,
    {
        let partitions = self
            .partitions
            .into_par_iter()
            .map(|partition| partition.into_iter().flat_map(&f).collect())
            .collect();
        Dataset { partitions }
    }

    /// Like [`flat_map`](Self::flat_map), but records whose transform
    /// fails are set aside instead of aborting the job.
    ///
    /// Returns the successful output and every error, in no particular
    /// order.
    #[must_use]
    pub fn try_flat_map<K2, V2, E, I, F>(self, f: F) -> (Dataset<K2, V2>, Vec<E>)
    where
        K2: Send,
        V2: Send,
        E: Send,
        I: IntoIterator<Item = (K2, V2)>,
        F: Fn((K, V)) -> Result<I, E> + Sync + Send,
    {
        let (partitions, errors): (Vec<Vec<(K2, V2)>>, Vec<Vec<E>>) = self
            .partitions
            .into_par_iter()
            .map(|partition| {
                let mut records = Vec::new();
                let mut errors = Vec::new();
                for record in partition {
                    match f(record) {
                        Ok(out) => records.extend(out),
                        Err(e) => errors.push(e),
                    }
                }
                (records, errors)
            })
            .unzip();
        (Dataset { partitions }, errors.into_iter().flatten().collect())
    }

    /// Like [`map`](Self::map), but failed records are set aside.
    #[must_use]
    pub fn try_map<K2, V2, E, F>(self, f: F) -> (Dataset<K2, V2>, Vec<E>)
    where
        K2: Send,
        V2: Send,
        E: Send,
        F: Fn((K, V)) -> Result<(K2, V2), E> + Sync + Send,
    {
        self.try_flat_map(|record| f(record).map(std::iter::once))
    }

    /// Redistribute records round-robin over `partitions` partitions.
    #[must_use]
    pub fn repartition(self, partitions: usize) -> Self {
        Self::parallelize(self.partitions.into_iter().flatten(), partitions)
    }

    /// Materialize every record.
    #[must_use]
    pub fn collect(self) -> Vec<(K, V)> {
        self.partitions.into_iter().flatten().collect()
    }
}

impl<K, V> Dataset<K, V>
where
    K: Hash + Eq + Send,
    V: Send,
{
    /// Group records by key and fold each group with `merge`.
    ///
    /// Produces exactly one record per distinct key, placed in the
    /// partition chosen by [`partition_for`]. `merge` must be
    /// associative and commutative; values are combined in no
    /// particular order or grouping.
    #[must_use]
    pub fn reduce_by_key<F>(self, merge: F) -> Self
    where
        F: Fn(V, V) -> V + Sync + Send,
    {
        let n = self.partitions.len().max(1);

        // Map side: combine within each partition, then route by key.
        let routed: Vec<Vec<Vec<(K, V)>>> = self
            .partitions
            .into_par_iter()
            .map(|partition| {
                let mut buckets: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
                for (key, value) in combine(partition, &merge) {
                    let target = partition_for(&key, n);
                    buckets[target].push((key, value));
                }
                buckets
            })
            .collect();

        // Shuffle: gather every bucket bound for the same partition.
        let mut shuffled: Vec<Vec<(K, V)>> = (0..n).map(|_| Vec::new()).collect();
        for buckets in routed {
            for (target, bucket) in shuffled.iter_mut().zip(buckets) {
                target.extend(bucket);
            }
        }

        // Reduce side: finish each group.
        let partitions = shuffled
            .into_par_iter()
            .map(|partition| combine(partition, &merge))
            .collect();
        Self { partitions }
    }

    /// Like [`reduce_by_key`](Self::reduce_by_key) with a fallible merge.
    ///
    /// A key whose merge fails anywhere in its group is dropped from the
    /// output and reported once with one of its errors.
    #[must_use]
    pub fn try_reduce_by_key<E, F>(self, merge: F) -> (Self, Vec<(K, E)>)
    where
        E: Send,
        F: Fn(V, V) -> Result<V, E> + Sync + Send,
    {
        let reduced = self
            .map(|(key, value)| (key, Ok::<V, E>(value)))
            .reduce_by_key(|a, b| match (a, b) {
                (Ok(a), Ok(b)) => merge(a, b),
                (Err(e), _) | (_, Err(e)) => Err(e),
            });
        reduced.try_map(|(key, value)| match value {
            Ok(value) => Ok((key, value)),
            Err(e) => Err((key, e)),
        })
    }
}

/// Fold records with equal keys together.
fn combine<K, V, F>(records: Vec<(K, V)>, merge: &F) -> Vec<(K, V)>
where
    K: Hash + Eq,
    F: Fn(V, V) -> V,
{
    let mut groups: HashMap<K, V> = HashMap::with_capacity(records.len());
    for (key, value) in records {
        let value = match groups.remove(&key) {
            Some(existing) => merge(existing, value),
            None => value,
        };
        groups.insert(key, value);
    }
    groups.into_iter().collect()
}

/// Partition index for `key` among `partitions` partitions.
///
/// Uses SipHash-1-3 with fixed keys so placement is stable across runs
/// and processes.
#[must_use]
pub fn partition_for<K: Hash + ?Sized>(key: &K, partitions: usize) -> usize {
    let mut hasher = SipHasher13::new();
    key.hash(&mut hasher);
    let n = partitions.max(1) as u64;
    // The remainder is below `partitions`, so it always fits.
    usize::try_from(hasher.finish() % n).unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sorted<K: Ord, V: Ord>(mut records: Vec<(K, V)>) -> Vec<(K, V)> {
        records.sort();
        records
    }

    #[test]
    fn parallelize_deals_round_robin() {
        let ds = Dataset::parallelize((0..10).map(|i| (i, i)), 4);
        assert_eq!(ds.num_partitions(), 4);
        assert_eq!(ds.partition_sizes(), vec![3, 3, 2, 2]);
        assert_eq!(ds.len(), 10);
    }

    #[test]
    fn zero_partitions_becomes_one() {
        let ds = Dataset::parallelize(vec![(1, 'a')], 0);
        assert_eq!(ds.num_partitions(), 1);
    }

    #[test]
    fn empty_dataset() {
        let ds: Dataset<u32, u32> = Dataset::parallelize(Vec::new(), 3);
        assert!(ds.is_empty());
        let reduced = ds.reduce_by_key(|a, b| a + b);
        assert!(reduced.collect().is_empty());
    }

    #[test]
    fn map_transforms_every_record() {
        let ds = Dataset::parallelize((0..5).map(|i| (i, i * 10)), 2);
        let out = sorted(ds.map(|(k, v)| (v, k)).collect());
        assert_eq!(out, vec![(0, 0), (10, 1), (20, 2), (30, 3), (40, 4)]);
    }

    #[test]
    fn flat_map_fans_out_and_drops() {
        let ds = Dataset::parallelize((0..4).map(|i| (i, i)), 3);
        let out = ds.flat_map(|(k, n)| (0..n).map(move |j| (k, j)));
        assert_eq!(out.len(), 1 + 2 + 3);
        assert_eq!(out.num_partitions(), 3);
    }

    #[test]
    fn reduce_by_key_groups_every_value() {
        let records = (0..100).map(|i| (i % 7, 1u32));
        let ds = Dataset::parallelize(records, 5);
        let out = sorted(ds.reduce_by_key(|a, b| a + b).collect());
        let expected: Vec<(i32, u32)> = (0..7)
            .map(|k| (k, (0..100).filter(|i| i % 7 == k).count() as u32))
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn reduce_result_is_independent_of_partitioning() {
        let records: Vec<(u8, u64)> = (0..200u64).map(|i| ((i % 13) as u8, i * i)).collect();
        let baseline = sorted(
            Dataset::parallelize(records.clone(), 1)
                .reduce_by_key(|a, b| a + b)
                .collect(),
        );
        for partitions in [2, 3, 8, 32] {
            let out = sorted(
                Dataset::parallelize(records.clone(), partitions)
                    .reduce_by_key(|a, b| a + b)
                    .collect(),
            );
            assert_eq!(out, baseline, "{partitions} partitions");
        }
    }

    #[test]
    fn reduced_keys_live_in_their_hash_partition() {
        let ds = Dataset::parallelize((0..50).map(|i| (i % 11, 1)), 4);
        let reduced = ds.reduce_by_key(|a, b| a + b);
        for (index, partition) in reduced.partitions.iter().enumerate() {
            for (key, _) in partition {
                assert_eq!(partition_for(key, 4), index);
            }
        }
    }

    #[test]
    fn try_flat_map_sets_failures_aside() {
        let ds = Dataset::parallelize((0..10).map(|i| (i, i)), 3);
        let (ok, errors) = ds.try_flat_map(|(k, v)| {
            if k % 3 == 0 {
                Err(format!("bad {k}"))
            } else {
                Ok(vec![(k, v), (k, v)])
            }
        });
        assert_eq!(ok.len(), 12);
        let mut errors = errors;
        errors.sort();
        assert_eq!(errors, vec!["bad 0", "bad 3", "bad 6", "bad 9"]);
    }

    #[test]
    fn try_map_keeps_successes() {
        let ds = Dataset::parallelize((0..4).map(|i| (i, i)), 2);
        let (ok, errors) = ds.try_map(|(k, v)| if k == 2 { Err(k) } else { Ok((k, v + 1)) });
        assert_eq!(sorted(ok.collect()), vec![(0, 1), (1, 2), (3, 4)]);
        assert_eq!(errors, vec![2]);
    }

    #[test]
    fn try_reduce_by_key_isolates_failing_keys() {
        let records = vec![("a", 1), ("a", 2), ("b", 5), ("b", -1), ("c", 7)];
        let ds = Dataset::parallelize(records, 2);
        let (ok, errors) = ds.try_reduce_by_key(|a: i32, b: i32| {
            if a < 0 || b < 0 { Err("negative") } else { Ok(a + b) }
        });
        assert_eq!(sorted(ok.collect()), vec![("a", 3), ("c", 7)]);
        assert_eq!(errors, vec![("b", "negative")]);
    }

    #[test]
    fn repartition_preserves_records() {
        let ds = Dataset::parallelize((0..9).map(|i| (i, ())), 2).repartition(5);
        assert_eq!(ds.num_partitions(), 5);
        assert_eq!(ds.len(), 9);
    }

    #[test]
    fn partition_for_is_stable() {
        assert_eq!(partition_for("image-7", 16), partition_for("image-7", 16));
        assert!(partition_for(&42u64, 3) < 3);
        assert_eq!(partition_for(&42u64, 0), 0);
    }
}
