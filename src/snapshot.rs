// Snapshot model sets: one bigram model per window, keyed by window start
// date, with the date-resolution and preset scoring paths the comparison
// methods are built from.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use chrono::{NaiveDate, NaiveDateTime};

use crate::corpus::Contribution;
use crate::model::BigramModel;
use crate::windows::{build_plan, window_label, WindowAssignment, WindowMode};

/// Window-key mismatch between two snapshot sets being compared. Fatal for
/// the comparison; carried inside `anyhow::Error` and recovered by
/// `downcast_ref` where the driver needs to tell it apart.
#[derive(Debug, Clone)]
pub struct AlignmentError {
    pub left: Vec<NaiveDate>,
    pub right: Vec<NaiveDate>,
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |keys: &[NaiveDate]| {
            keys.iter().map(window_label).collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "Window keys do not align: [{}] vs [{}]",
            join(&self.left),
            join(&self.right)
        )
    }
}

impl std::error::Error for AlignmentError {}

/// One scored contribution, tagged with the window that scored it.
#[derive(Debug, Clone)]
pub struct EntropyRow {
    pub date: NaiveDateTime,
    pub window: NaiveDate,
    pub contribution_id: i64,
    pub cross_entropy: f64,
}

/// Per-window cross-entropy leaves: `window -> {contribution_id -> ce}`.
pub type EntropyTable = BTreeMap<NaiveDate, BTreeMap<i64, f64>>;

/// Chronologically ordered bigram models, one per window.
#[derive(Debug, Clone)]
pub struct SnapshotModelSet {
    models: BTreeMap<NaiveDate, BigramModel>,
}

fn clip_tokens(tokens: &[String], limit: usize) -> &[String] {
    if limit > 0 && tokens.len() > limit {
        &tokens[..limit]
    } else {
        tokens
    }
}

impl SnapshotModelSet {
    /// Builds one model per window from pre-assigned membership. An empty
    /// window still gets a model; it scores on backoff alone and is flagged
    /// here once.
    pub fn from_assignment(
        assignment: &WindowAssignment,
        smoothing: f64,
        backoff_discount: f64,
    ) -> Self {
        let mut models = BTreeMap::new();
        for (key, members) in assignment {
            let model = BigramModel::new(
                members.iter().map(|c| c.tokens.as_slice()),
                smoothing,
                backoff_discount,
            );
            if model.is_degenerate() {
                eprintln!(
                    "Warning: no contributions in window {}; its model is degenerate",
                    window_label(key)
                );
            }
            models.insert(*key, model);
        }
        SnapshotModelSet { models }
    }

    /// Windows a corpus itself and builds one model per window.
    pub fn from_corpus(
        contributions: &[&Contribution],
        mode: WindowMode,
        size: usize,
        step: usize,
        smoothing: f64,
        backoff_discount: f64,
    ) -> Result<Self> {
        let plan = build_plan(contributions, mode, size, step)?;
        Ok(Self::from_assignment(
            &plan.assign(contributions),
            smoothing,
            backoff_discount,
        ))
    }

    pub fn keys(&self) -> Vec<NaiveDate> {
        self.models.keys().copied().collect()
    }

    pub fn num_windows(&self) -> usize {
        self.models.len()
    }

    pub fn model(&self, key: &NaiveDate) -> Option<&BigramModel> {
        self.models.get(key)
    }

    /// Resolves a timestamp to its containing windows. For adjacent keys
    /// `(key_i, key_{i+1})` the timestamp lands in window i when
    /// `key_i <= t < key_{i+1}` at day granularity; a timestamp at or past
    /// the final key lands in the final window. Before the first key is an
    /// error, never a silent empty result.
    pub fn models_for(&self, timestamp: NaiveDateTime) -> Result<Vec<(NaiveDate, &BigramModel)>> {
        let keys = self.keys();
        if keys.is_empty() {
            bail!("No windows to resolve {} against", timestamp);
        }
        let day = timestamp.date();
        if day < keys[0] {
            bail!(
                "Timestamp {} predates the first window {}",
                timestamp,
                window_label(&keys[0])
            );
        }
        let mut matched = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let in_window = if i + 1 < keys.len() {
                *key <= day && day < keys[i + 1]
            } else {
                day >= *key
            };
            if in_window {
                matched.push((*key, &self.models[key]));
            }
        }
        Ok(matched)
    }

    /// Same boundary walk as `models_for`, yielding the model of the window
    /// *before* each matched one. A match on the first window carries `None`.
    pub fn previous_models_for(
        &self,
        timestamp: NaiveDateTime,
    ) -> Result<Vec<(NaiveDate, Option<(NaiveDate, &BigramModel)>)>> {
        let keys = self.keys();
        let matched = self.models_for(timestamp)?;
        let mut out = Vec::new();
        for (key, _) in matched {
            let idx = keys.iter().position(|k| *k == key).unwrap();
            let prev = if idx == 0 {
                None
            } else {
                let prev_key = keys[idx - 1];
                Some((prev_key, &self.models[&prev_key]))
            };
            out.push((key, prev));
        }
        Ok(out)
    }

    /// Scores a flat table of contributions, resolving each row's window by
    /// date. One output row per (contribution, containing window).
    pub fn cross_entropies_for(&self, rows: &[&Contribution]) -> Result<Vec<EntropyRow>> {
        let mut out = Vec::new();
        for contribution in rows {
            for (window, model) in self.models_for(contribution.date)? {
                out.push(EntropyRow {
                    date: contribution.date,
                    window,
                    contribution_id: contribution.id,
                    cross_entropy: model.cross_entropy(&contribution.tokens),
                });
            }
        }
        Ok(out)
    }

    /// Fluctuation variant of `cross_entropies_for`: each row is scored
    /// against the window *before* its containing one, keyed by the
    /// containing window. Rows resolving only to the first window emit
    /// nothing.
    pub fn fluctuations_for(&self, rows: &[&Contribution]) -> Result<Vec<EntropyRow>> {
        let mut out = Vec::new();
        for contribution in rows {
            for (window, prev) in self.previous_models_for(contribution.date)? {
                if let Some((_, model)) = prev {
                    out.push(EntropyRow {
                        date: contribution.date,
                        window,
                        contribution_id: contribution.id,
                        cross_entropy: model.cross_entropy(&contribution.tokens),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Scores pre-assigned test membership window by window: window w's test
    /// contributions against window w's own model.
    pub fn cross_entropies_preset(
        &self,
        test_windows: &WindowAssignment,
        limit: usize,
    ) -> Result<EntropyTable> {
        let mut out = EntropyTable::new();
        for (key, model) in &self.models {
            let members = test_windows.get(key).ok_or_else(|| {
                anyhow!("No test partition for window {}", window_label(key))
            })?;
            let mut per_contribution = BTreeMap::new();
            for contribution in members {
                per_contribution.insert(
                    contribution.id,
                    model.cross_entropy(clip_tokens(&contribution.tokens, limit)),
                );
            }
            out.insert(*key, per_contribution);
        }
        Ok(out)
    }

    /// Fluctuation variant of the preset path: window w's test contributions
    /// scored against window w-1's model, keyed by w. The first window emits
    /// nothing.
    pub fn fluctuations_preset(
        &self,
        test_windows: &WindowAssignment,
        limit: usize,
    ) -> Result<EntropyTable> {
        let keys = self.keys();
        let mut out = EntropyTable::new();
        for i in 1..keys.len() {
            let prev_model = &self.models[&keys[i - 1]];
            let members = test_windows.get(&keys[i]).ok_or_else(|| {
                anyhow!("No test partition for window {}", window_label(&keys[i]))
            })?;
            let mut per_contribution = BTreeMap::new();
            for contribution in members {
                per_contribution.insert(
                    contribution.id,
                    prev_model.cross_entropy(clip_tokens(&contribution.tokens, limit)),
                );
            }
            out.insert(keys[i], per_contribution);
        }
        Ok(out)
    }

    /// Per-window KL of `other` (P) from self (Q). The two sets must carry
    /// identical window keys; anything else is an [`AlignmentError`].
    pub fn kl_divergence_to(&self, other: &SnapshotModelSet) -> Result<BTreeMap<NaiveDate, f64>> {
        self.check_alignment(other)?;
        let mut out = BTreeMap::new();
        for (key, model) in &self.models {
            out.insert(*key, model.kl_divergence(&other.models[key]));
        }
        Ok(out)
    }

    /// Window-over-window drift within one set: KL of window w's model (P)
    /// from window w-1's (Q), keyed by w.
    pub fn kl_fluctuation(&self) -> BTreeMap<NaiveDate, f64> {
        let keys = self.keys();
        let mut out = BTreeMap::new();
        for i in 1..keys.len() {
            let prev = &self.models[&keys[i - 1]];
            let curr = &self.models[&keys[i]];
            out.insert(keys[i], prev.kl_divergence(curr));
        }
        out
    }

    /// Cross-set fluctuation: KL of `other`'s window-w model (P) from self's
    /// window-(w-1) model (Q), keyed by w.
    pub fn kl_fluctuation_against(
        &self,
        other: &SnapshotModelSet,
    ) -> Result<BTreeMap<NaiveDate, f64>> {
        self.check_alignment(other)?;
        let keys = self.keys();
        let mut out = BTreeMap::new();
        for i in 1..keys.len() {
            let q = &self.models[&keys[i - 1]];
            let p = &other.models[&keys[i]];
            out.insert(keys[i], q.kl_divergence(p));
        }
        Ok(out)
    }

    fn check_alignment(&self, other: &SnapshotModelSet) -> Result<()> {
        let left = self.keys();
        let right = other.keys();
        if left != right {
            return Err(anyhow::Error::new(AlignmentError { left, right }));
        }
        Ok(())
    }
}
