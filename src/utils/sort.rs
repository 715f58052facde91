use core::mem;

/// Stable LSD radix sort over a term-id key column with a parallel value column.
/// - Sorts by `ids` ascending
/// - Moves `vals` along with their ids
///
/// Complexity: 4 passes, each O(n + 256)
pub fn radix_sort_u32_soa<N: Copy + Default>(ids: &mut [u32], vals: &mut [N]) {
    assert_eq!(ids.len(), vals.len(), "id and value columns must have equal length");
    let n = ids.len();
    if n <= 1 {
        return;
    }
    if n <= 32 {
        insertion_sort_u32_soa(ids, vals);
        return;
    }

    let mut ids_tmp = vec![0u32; n];
    let mut vals_tmp = vec![N::default(); n];

    let mut src_ids: &mut [u32] = ids;
    let mut src_vals: &mut [N] = vals;
    let mut dst_ids: &mut [u32] = &mut ids_tmp;
    let mut dst_vals: &mut [N] = &mut vals_tmp;

    for shift in [0u32, 8, 16, 24] {
        let mut count = [0usize; 256];
        for &k in src_ids.iter() {
            count[((k >> shift) & 0xFF) as usize] += 1;
        }
        let mut sum = 0usize;
        for c in count.iter_mut() {
            let tmp = *c;
            *c = sum;
            sum += tmp;
        }
        for (k, v) in src_ids.iter().zip(src_vals.iter()) {
            let bucket = ((k >> shift) & 0xFF) as usize;
            let pos = count[bucket];
            count[bucket] = pos + 1;
            dst_ids[pos] = *k;
            dst_vals[pos] = *v;
        }
        mem::swap(&mut src_ids, &mut dst_ids);
        mem::swap(&mut src_vals, &mut dst_vals);
    }
    // even pass count: the sorted data is back in the caller's slices
}

fn insertion_sort_u32_soa<N: Copy>(ids: &mut [u32], vals: &mut [N]) {
    for i in 1..ids.len() {
        let mut j = i;
        while j > 0 && ids[j] < ids[j - 1] {
            ids.swap(j, j - 1);
            vals.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Sorts `(id, count)` columns and folds duplicate ids by summing their counts.
/// Zero counts are dropped.
pub fn sort_and_fold_counts(ids: &mut Vec<u32>, counts: &mut Vec<u32>) {
    radix_sort_u32_soa(ids, counts);
    let mut write = 0usize;
    for read in 0..ids.len() {
        if counts[read] == 0 {
            continue;
        }
        if write > 0 && ids[write - 1] == ids[read] {
            counts[write - 1] += counts[read];
        } else {
            ids[write] = ids[read];
            counts[write] = counts[read];
            write += 1;
        }
    }
    ids.truncate(write);
    counts.truncate(write);
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    /// sort by key, equal keys keep their original order
    fn baseline_stable_sort<N: Copy>(ids: &[u32], vals: &[N]) -> (Vec<u32>, Vec<N>) {
        let mut pairs: Vec<(u32, N)> = ids.iter().copied().zip(vals.iter().copied()).collect();
        pairs.sort_by_key(|p| p.0);
        pairs.into_iter().unzip()
    }

    fn assert_sorted(keys: &[u32]) {
        for i in 1..keys.len() {
            assert!(keys[i - 1] <= keys[i], "not sorted at {i}: {} > {}", keys[i - 1], keys[i]);
        }
    }

    #[test]
    fn handles_empty_and_single() {
        let mut ids: Vec<u32> = vec![];
        let mut vals: Vec<u32> = vec![];
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert!(ids.is_empty());

        let mut ids = vec![42u32];
        let mut vals = vec![7u32];
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert_eq!((ids, vals), (vec![42], vec![7]));
    }

    #[test]
    fn stable_on_duplicates() {
        let mut ids = vec![3u32, 1, 3, 2, 1, 3, 0];
        let mut vals: Vec<u32> = (0..ids.len() as u32).collect();
        let (base_k, base_v) = baseline_stable_sort(&ids, &vals);
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert_eq!(ids, base_k);
        assert_eq!(vals, base_v);
    }

    #[test]
    fn matches_baseline_across_sizes() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x1234_5678);
        for &n in &[2usize, 7, 31, 32, 33, 64, 129, 1024] {
            let mut ids: Vec<u32> = (0..n).map(|_| rng.gen::<u32>() & 0x00FF_FFFF).collect();
            let mut vals: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let (base_k, base_v) = baseline_stable_sort(&ids, &vals);
            radix_sort_u32_soa(&mut ids, &mut vals);
            assert_sorted(&ids);
            assert_eq!(ids, base_k, "keys mismatch at n={n}");
            assert_eq!(vals, base_v, "vals mismatch at n={n}");
        }
    }

    #[test]
    fn extreme_keys() {
        let mut ids = vec![0u32, u32::MAX, 1, u32::MAX - 1, 0, 2, u32::MAX];
        ids.extend((0..40).map(|i| i * 1_000_003));
        let mut vals: Vec<u32> = (0..ids.len() as u32).collect();
        let (base_k, base_v) = baseline_stable_sort(&ids, &vals);
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert_eq!(ids, base_k);
        assert_eq!(vals, base_v);
    }

    #[test]
    fn folds_duplicate_ids() {
        let mut ids = vec![5u32, 1, 5, 3, 1, 9];
        let mut counts = vec![1u32, 2, 3, 0, 1, 4];
        sort_and_fold_counts(&mut ids, &mut counts);
        assert_eq!(ids, vec![1, 5, 9]);
        assert_eq!(counts, vec![3, 4, 4]);
    }
}
