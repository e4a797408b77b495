// Smoothed bigram language model.
//
// Each model is built once from a fixed corpus of tokenized contributions and
// never mutated afterwards. Scoring backs off from bigram counts to a
// discounted unigram estimate, so every (context, word) pair gets a strictly
// positive probability and log2 downstream is always defined.

use std::collections::{BTreeSet, HashMap};

// Shared sentence-boundary marker, padded onto both ends of every token
// sequence before bigram extraction. Cleaned tokens are lowercase words, so
// the marker cannot collide with real vocabulary.
pub const BOUNDARY_MARKER: &str = "<s>";

// Discount applied to the backed-off unigram estimate for unseen bigrams.
// Inherited from the tuning of the original experiments.
pub const DEFAULT_BACKOFF_DISCOUNT: f64 = 0.4;

// Additive smoothing constant.
pub const DEFAULT_SMOOTHING: f64 = 1.0;

// Bigram frequency table: outer key is the context token, inner key the token
// that followed it.
type CountTable = HashMap<String, HashMap<String, u64>>;

#[derive(Debug, Clone)]
pub struct BigramModel {
    counts: CountTable,
    // Sum of the inner map per context. Doubles as the unigram count of a
    // token in context position, which is what the backoff estimate uses.
    context_totals: HashMap<String, u64>,
    total_counts: u64,
    smoothing: f64,
    backoff_discount: f64,
}

/// Bigrams of `toks` padded with [`BOUNDARY_MARKER`] on both ends. An empty
/// sequence still yields one (marker, marker) bigram.
pub fn padded_bigrams(toks: &[String]) -> impl Iterator<Item = (&str, &str)> + '_ {
    let firsts = std::iter::once(BOUNDARY_MARKER).chain(toks.iter().map(String::as_str));
    let seconds = toks.iter().map(String::as_str).chain(std::iter::once(BOUNDARY_MARKER));
    firsts.zip(seconds)
}

impl BigramModel {
    /// Builds a model from tokenized contributions. Callers truncate each
    /// token sequence to the experiment's token limit before passing it in;
    /// the model itself never truncates.
    pub fn new<'a, I>(corpus: I, smoothing: f64, backoff_discount: f64) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut counts: CountTable = HashMap::new();
        let mut context_totals: HashMap<String, u64> = HashMap::new();
        let mut total_counts = 0u64;

        for toks in corpus {
            for (w1, w2) in padded_bigrams(toks) {
                *counts
                    .entry(w1.to_string())
                    .or_default()
                    .entry(w2.to_string())
                    .or_insert(0) += 1;
                *context_totals.entry(w1.to_string()).or_insert(0) += 1;
                total_counts += 1;
            }
        }

        BigramModel {
            counts,
            context_totals,
            total_counts,
            smoothing,
            backoff_discount,
        }
    }

    /// Conditional probability estimate of `word` following `context`.
    /// Always finite and > 0, including on a model built from nothing.
    pub fn score(&self, word: &str, context: &str) -> f64 {
        if let Some(following) = self.counts.get(context) {
            if let Some(&count) = following.get(word) {
                if count > 0 {
                    let context_total = self.context_totals[context];
                    return (count as f64 + self.smoothing) / (context_total as f64 + self.smoothing);
                }
            }
        }

        // Unseen bigram: smoothed frequency of `word` in context position,
        // scaled down by the backoff discount.
        let unigram = self.context_totals.get(word).copied().unwrap_or(0);
        let denom = self.total_counts as f64 + self.smoothing;
        if denom == 0.0 {
            // Empty model with zero smoothing. Keep the result positive
            // rather than dividing 0 by 0.
            return self.backoff_discount;
        }
        (unigram as f64 + self.smoothing) / denom * self.backoff_discount
    }

    /// Average surprisal (bits per bigram) of `toks` under this model.
    pub fn cross_entropy(&self, toks: &[String]) -> f64 {
        let mut log_sum = 0.0;
        let mut n = 0usize;
        for (w1, w2) in padded_bigrams(toks) {
            log_sum += self.score(w2, w1).log2();
            n += 1;
        }
        // Padding guarantees at least one bigram.
        -(log_sum / n as f64)
    }

    /// KL-divergence of `p_model` (P) from this model (Q), computed over the
    /// union of both models' observed bigrams. Both score vectors are
    /// normalized to sum 1 before taking sum(p * ln(p / q)), so the result is
    /// non-negative and exactly zero for identical models.
    pub fn kl_divergence(&self, p_model: &BigramModel) -> f64 {
        let mut keys: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (w1, following) in &self.counts {
            for w2 in following.keys() {
                keys.insert((w1, w2));
            }
        }
        for (w1, following) in &p_model.counts {
            for w2 in following.keys() {
                keys.insert((w1, w2));
            }
        }

        let mut p = Vec::with_capacity(keys.len());
        let mut q = Vec::with_capacity(keys.len());
        for (w1, w2) in &keys {
            p.push(p_model.score(w2, w1));
            q.push(self.score(w2, w1));
        }

        let p_sum: f64 = p.iter().sum();
        let q_sum: f64 = q.iter().sum();
        if p_sum == 0.0 || q_sum == 0.0 {
            // Both models are empty; there is nothing to diverge over.
            return 0.0;
        }

        p.iter()
            .zip(q.iter())
            .map(|(pi, qi)| {
                let pn = pi / p_sum;
                let qn = qi / q_sum;
                pn * (pn / qn).ln()
            })
            .sum()
    }

    /// Grand total of bigram observations in the training corpus.
    pub fn total_counts(&self) -> u64 {
        self.total_counts
    }

    /// True when the model was built from zero contributions. Scoring still
    /// works (see `score`), but callers should warn.
    pub fn is_degenerate(&self) -> bool {
        self.total_counts == 0
    }

    pub fn observed_bigram_count(&self) -> usize {
        self.counts.values().map(|m| m.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn model_from(corpus: &[Vec<String>]) -> BigramModel {
        BigramModel::new(
            corpus.iter().map(|c| c.as_slice()),
            DEFAULT_SMOOTHING,
            DEFAULT_BACKOFF_DISCOUNT,
        )
    }

    #[test]
    fn test_padded_bigrams_wrap_sequence() {
        let t = toks(&["a", "b"]);
        let pairs: Vec<(&str, &str)> = padded_bigrams(&t).collect();
        assert_eq!(
            pairs,
            vec![(BOUNDARY_MARKER, "a"), ("a", "b"), ("b", BOUNDARY_MARKER)]
        );

        let empty: Vec<String> = Vec::new();
        let pairs: Vec<(&str, &str)> = padded_bigrams(&empty).collect();
        assert_eq!(pairs, vec![(BOUNDARY_MARKER, BOUNDARY_MARKER)]);
    }

    #[test]
    fn test_equally_frequent_continuations_tie() {
        // "the" precedes "cat" once and "dog" once, so the scores must match.
        let corpus = vec![toks(&["the", "cat", "sat"]), toks(&["the", "dog", "ran"])];
        let model = model_from(&corpus);
        let cat = model.score("cat", "the");
        let dog = model.score("dog", "the");
        assert!((cat - dog).abs() < 1e-12);
        assert!(!(cat > dog));
        // (count + k) / (context_total + k) with count 1, total 2, k 1.
        assert!((cat - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_backoff_uses_context_position_unigram() {
        let corpus = vec![toks(&["the", "cat", "sat"])];
        let model = model_from(&corpus);
        // ("cat", "the") reversed was never observed. "the" appears once in
        // context position; 4 bigrams total (two of them padded).
        let expected = (1.0 + 1.0) / (4.0 + 1.0) * DEFAULT_BACKOFF_DISCOUNT;
        assert!((model.score("the", "cat") - expected).abs() < 1e-12);
    }

    #[test]
    fn test_scores_always_positive() {
        let corpus = vec![toks(&["one", "two", "three"])];
        let model = model_from(&corpus);
        for (word, context) in [
            ("two", "one"),
            ("one", "three"),
            ("unknown", "one"),
            ("unknown", "unknown"),
        ] {
            let s = model.score(word, context);
            assert!(s > 0.0 && s.is_finite(), "score({word}|{context}) = {s}");
        }
    }

    #[test]
    fn test_empty_model_scores_finite() {
        let model = model_from(&[]);
        assert!(model.is_degenerate());
        let s = model.score("anything", "anywhere");
        assert!(s > 0.0 && s.is_finite());
        let ce = model.cross_entropy(&toks(&["a", "b"]));
        assert!(ce.is_finite());
    }

    #[test]
    fn test_empty_model_zero_smoothing_still_positive() {
        let model = BigramModel::new(std::iter::empty(), 0.0, DEFAULT_BACKOFF_DISCOUNT);
        let s = model.score("a", "b");
        assert!(s > 0.0 && s.is_finite());
    }

    #[test]
    fn test_cross_entropy_prefers_own_corpus() {
        let corpus: Vec<Vec<String>> = (0..20)
            .map(|_| toks(&["the", "house", "will", "divide", "on", "the", "motion"]))
            .collect();
        let model = model_from(&corpus);
        let familiar = model.cross_entropy(&toks(&["the", "house", "will", "divide"]));
        let foreign = model.cross_entropy(&toks(&["zygote", "quasar", "umlaut", "fjord"]));
        assert!(familiar < foreign);
    }

    #[test]
    fn test_kl_divergence_of_identical_models_is_zero() {
        let corpus = vec![toks(&["a", "b", "c"]), toks(&["a", "b", "d"])];
        let m1 = model_from(&corpus);
        let m2 = model_from(&corpus);
        assert!(m1.kl_divergence(&m2).abs() < 1e-12);
    }

    #[test]
    fn test_kl_divergence_non_negative() {
        let m1 = model_from(&[toks(&["up", "down", "up"]), toks(&["down", "up"])]);
        let m2 = model_from(&[toks(&["left", "right"]), toks(&["right", "left", "left"])]);
        assert!(m1.kl_divergence(&m2) >= 0.0);
        assert!(m2.kl_divergence(&m1) >= 0.0);
        assert!(m1.kl_divergence(&m2) > 0.0);
    }

    #[test]
    fn test_kl_divergence_of_empty_models_is_zero() {
        let m1 = model_from(&[]);
        let m2 = model_from(&[]);
        assert_eq!(m1.kl_divergence(&m2), 0.0);
    }

    #[test]
    fn test_total_counts_matches_padded_bigrams() {
        let corpus = vec![toks(&["a", "b"]), toks(&["c"])];
        let model = model_from(&corpus);
        // 3 bigrams for ["a", "b"], 2 for ["c"].
        assert_eq!(model.total_counts(), 5);
        assert_eq!(model.observed_bigram_count(), 5);
    }
}
