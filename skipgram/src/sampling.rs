//! Negative sampling and subsampling of frequent words.

use std::collections::HashSet;

use rand::Rng;

use crate::error::{Result, TrainError};

/// Exponent applied to word counts to flatten the unigram distribution.
pub const NOISE_POWER: f64 = 0.75;

/// Rejection-sampling budget: each phase of `negative_sample` makes at most
/// this many draws per negative requested.
pub const MAX_DRAWS_PER_NEGATIVE: usize = 64;

/// Flat table for O(1) sampling from the smoothed unigram distribution.
///
/// Word `i` occupies a contiguous run of `floor(count_i ^ power)` slots, so a
/// uniformly random slot yields `i` with probability proportional to
/// `count_i ^ power`. Words whose smoothed count floors to 0 never appear.
#[derive(Debug, Clone)]
pub struct NoiseTable {
    table: Vec<usize>,
}

impl NoiseTable {
    pub fn new(counts: &[u64]) -> Self {
        Self::with_power(counts, NOISE_POWER)
    }

    pub fn with_power(counts: &[u64], power: f64) -> Self {
        let mut table = Vec::with_capacity(
            counts
                .iter()
                .map(|&c| smoothed_count(c, power))
                .sum::<usize>(),
        );
        for (id, &count) in counts.iter().enumerate() {
            let n = smoothed_count(count, power);
            table.extend(std::iter::repeat(id).take(n));
        }
        NoiseTable { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.table
    }

    /// Draw one word id. Panics if the table is empty.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.table[rng.gen_range(0..self.table.len())]
    }
}

fn smoothed_count(count: u64, power: f64) -> usize {
    (count as f64).powf(power).floor() as usize
}

/// Per-word keep probabilities for stochastic down-sampling of frequent words.
#[derive(Debug, Clone)]
pub struct Subsampler {
    keep_prob: Vec<f32>,
}

impl Subsampler {
    /// `keep_prob[i] = (sqrt(f / k) + 1) * k / f` where `f = counts[i]` and
    /// `k = sample_rate * sum(counts)`. A rate of zero keeps every word.
    pub fn new(counts: &[u64], sample_rate: f32) -> Self {
        let total: u64 = counts.iter().sum();
        let k = sample_rate as f64 * total as f64;
        let keep_prob = counts
            .iter()
            .map(|&count| {
                if sample_rate <= 0.0 || count == 0 {
                    1.0
                } else {
                    let f = count as f64;
                    (((f / k).sqrt() + 1.0) * k / f) as f32
                }
            })
            .collect();
        Subsampler { keep_prob }
    }

    pub fn keep_prob(&self, id: usize) -> f32 {
        self.keep_prob[id]
    }

    pub fn keep_probs(&self) -> &[f32] {
        &self.keep_prob
    }

    /// Lazily drop words from a sentence. Each in-vocabulary token costs one
    /// fresh draw `r` in `[0, 1)` and survives iff `keep_prob >= r`. Unknown
    /// tokens are always dropped. Order is preserved.
    pub fn filter<'a, R: Rng + ?Sized>(
        &'a self,
        sentence: &'a [Option<usize>],
        rng: &'a mut R,
    ) -> impl Iterator<Item = usize> + 'a {
        sentence
            .iter()
            .filter_map(|&token| token)
            .filter(move |&id| self.keep_prob[id] >= rng.gen::<f32>())
    }
}

/// One skip-gram training example: an input word, the word ids whose output
/// vectors it is scored against, and a label for each of them.
///
/// `target_ids[0]` is always the positive context with label 1; the rest are
/// negatives labeled 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub input_id: usize,
    pub target_ids: Vec<usize>,
    pub labels: Vec<f32>,
}

impl TrainingExample {
    pub fn new(input_id: usize, positive: usize, negatives: &[usize]) -> Self {
        let mut target_ids = Vec::with_capacity(negatives.len() + 1);
        target_ids.push(positive);
        target_ids.extend_from_slice(negatives);
        let mut labels = vec![0.0; target_ids.len()];
        labels[0] = 1.0;
        TrainingExample {
            input_id,
            target_ids,
            labels,
        }
    }

    pub fn positive(&self) -> usize {
        self.target_ids[0]
    }

    pub fn negatives(&self) -> &[usize] {
        &self.target_ids[1..]
    }
}

/// Draw `k` distinct negatives for `(input_id, positive)`.
///
/// Draws that hit `excluded` (normally every surviving word of the current
/// sentence) are rejected. If that does not find `k` ids within the draw
/// budget, a second pass rejects only the positive id and ids already
/// chosen. If that fails too, the result is
/// `TrainError::NegativeSamplingExhausted`.
pub fn negative_sample<R: Rng + ?Sized>(
    input_id: usize,
    positive: usize,
    excluded: &HashSet<usize>,
    k: usize,
    table: &NoiseTable,
    rng: &mut R,
) -> Result<TrainingExample> {
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    if !table.is_empty() {
        draw_distinct(&mut chosen, k, table, rng, |id| excluded.contains(&id) || id == positive);
        if chosen.len() < k {
            tracing::trace!(
                positive,
                found = chosen.len(),
                "relaxing negative-sample exclusion to the positive id only"
            );
            draw_distinct(&mut chosen, k, table, rng, |id| id == positive);
        }
    }

    if chosen.len() < k {
        return Err(TrainError::NegativeSamplingExhausted {
            needed: k,
            found: chosen.len(),
        });
    }
    Ok(TrainingExample::new(input_id, positive, &chosen))
}

fn draw_distinct<R, F>(
    chosen: &mut Vec<usize>,
    k: usize,
    table: &NoiseTable,
    rng: &mut R,
    reject: F,
) where
    R: Rng + ?Sized,
    F: Fn(usize) -> bool,
{
    for _ in 0..k * MAX_DRAWS_PER_NEGATIVE {
        if chosen.len() == k {
            break;
        }
        let id = table.sample(rng);
        if !reject(id) && !chosen.contains(&id) {
            chosen.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn table_length_is_sum_of_smoothed_counts() {
        let counts = [10, 5, 5, 1, 0, 1000];
        let table = NoiseTable::new(&counts);
        let expected: usize = counts
            .iter()
            .map(|&c| (c as f64).powf(0.75).floor() as usize)
            .sum();
        assert_eq!(table.len(), expected);

        // Runs are contiguous and in id order.
        let slice = table.as_slice();
        assert!(slice.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(slice.iter().filter(|&&id| id == 0).count(), 5); // 10^0.75 = 5.62
        assert_eq!(slice.iter().filter(|&&id| id == 1).count(), 3); // 5^0.75 = 3.34
        assert_eq!(slice.iter().filter(|&&id| id == 3).count(), 1);
        assert!(!slice.contains(&4));
    }

    #[test]
    fn sampling_matches_smoothed_distribution() {
        let counts = [1000, 400, 100, 30, 7];
        let table = NoiseTable::new(&counts);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 200_000;
        let mut observed = [0usize; 5];
        for _ in 0..n {
            observed[table.sample(&mut rng)] += 1;
        }

        let smoothed: Vec<f64> = counts
            .iter()
            .map(|&c| (c as f64).powf(0.75).floor())
            .collect();
        let total: f64 = smoothed.iter().sum();
        let chi_square: f64 = observed
            .iter()
            .zip(&smoothed)
            .map(|(&o, &s)| {
                let e = n as f64 * s / total;
                (o as f64 - e).powi(2) / e
            })
            .sum();
        // 4 degrees of freedom; the 99.9th percentile is 18.47.
        assert!(chi_square < 18.47, "chi-square statistic too large: {chi_square}");
    }

    #[test]
    fn keep_prob_formula() {
        let sub = Subsampler::new(&[10, 5, 5], 1e-3);
        let k = 1e-3 * 20.0;
        let expected = ((10.0f64 / k).sqrt() + 1.0) * k / 10.0;
        assert!((sub.keep_prob(0) as f64 - expected).abs() < 1e-6);
    }

    #[test]
    fn keep_prob_is_non_increasing_in_frequency() {
        let counts: Vec<u64> = (1..=2000).rev().map(|i| i * 3).collect();
        let sub = Subsampler::new(&counts, 1e-4);
        let probs = sub.keep_probs();
        // counts are descending, so probabilities must be non-decreasing.
        assert!(probs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_rate_keeps_everything() {
        let sub = Subsampler::new(&[1_000_000, 3], 0.0);
        assert!(sub.keep_probs().iter().all(|&p| p == 1.0));

        let sentence = [Some(0), None, Some(1), Some(0)];
        let mut rng = StdRng::seed_from_u64(1);
        let kept: Vec<usize> = sub.filter(&sentence, &mut rng).collect();
        assert_eq!(kept, vec![0, 1, 0]);
    }

    #[test]
    fn filter_drops_frequent_words_and_keeps_order() {
        // Word 0 is overwhelmingly frequent and almost always dropped;
        // the rare words have keep_prob > 1 and always survive.
        let sub = Subsampler::new(&[1_000_000, 1, 1], 1e-6);
        assert!(sub.keep_prob(0) < 0.01);
        assert!(sub.keep_prob(1) > 1.0);

        let sentence = [Some(1), Some(0), Some(2), Some(0), None, Some(1)];
        let mut rng = StdRng::seed_from_u64(3);
        let mut total_zeros = 0;
        for _ in 0..100 {
            let kept: Vec<usize> = sub.filter(&sentence, &mut rng).collect();
            let rare: Vec<usize> = kept.iter().copied().filter(|&id| id != 0).collect();
            assert_eq!(rare, vec![1, 2, 1]);
            total_zeros += kept.len() - rare.len();
        }
        assert!(total_zeros < 10);
    }

    #[test]
    fn filter_is_deterministic_under_seed() {
        let sub = Subsampler::new(&[500, 300, 200], 1e-2);
        let sentence: Vec<Option<usize>> = (0..50).map(|i| Some(i % 3)).collect();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            sub.filter(&sentence, &mut rng).collect::<Vec<usize>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn negatives_are_distinct_and_avoid_excluded_ids() {
        let counts: Vec<u64> = (1..=20).rev().map(|c| c * 10).collect();
        let table = NoiseTable::new(&counts);
        let excluded: HashSet<usize> = [0, 3, 4, 7].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let example = negative_sample(3, 4, &excluded, 5, &table, &mut rng).unwrap();
            assert_eq!(example.input_id, 3);
            assert_eq!(example.positive(), 4);
            assert_eq!(example.labels, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
            let negatives = example.negatives();
            assert_eq!(negatives.len(), 5);
            let distinct: HashSet<usize> = negatives.iter().copied().collect();
            assert_eq!(distinct.len(), 5);
            assert!(distinct.is_disjoint(&excluded));
        }
    }

    #[test]
    fn exclusion_relaxes_when_sentence_covers_vocabulary() {
        let table = NoiseTable::new(&[10, 5, 5]);
        let excluded: HashSet<usize> = [0, 1, 2].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(9);
        let example = negative_sample(0, 1, &excluded, 2, &table, &mut rng).unwrap();
        let mut negatives = example.negatives().to_vec();
        negatives.sort();
        assert_eq!(negatives, vec![0, 2]);
    }

    #[test]
    fn too_many_negatives_is_an_error() {
        let table = NoiseTable::new(&[10, 5, 5]);
        let mut rng = StdRng::seed_from_u64(9);
        let err = negative_sample(0, 1, &HashSet::new(), 3, &table, &mut rng).unwrap_err();
        match err {
            TrainError::NegativeSamplingExhausted { needed, found } => {
                assert_eq!(needed, 3);
                assert_eq!(found, 2);
            }
            other => panic!("expected NegativeSamplingExhausted, got {other:?}"),
        }
    }

    #[test]
    fn empty_table_is_exhausted_immediately() {
        let table = NoiseTable::new(&[0, 0]);
        assert!(table.is_empty());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            negative_sample(0, 1, &HashSet::new(), 1, &table, &mut rng),
            Err(TrainError::NegativeSamplingExhausted { needed: 1, found: 0 })
        ));
    }
}
