// Cross-run significance testing. Per-run values arrive as windows x runs
// matrices; flagged windows come back with their p-values. All p-values are
// two-sided; untestable inputs (too few runs, zero variance around a zero
// mean) produce NaN, which never passes a significance threshold.

use anyhow::Result;
use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::snapshot::AlignmentError;

/// Windows x runs matrix of per-run scalars (per-window CE means, or KLD
/// values) for one group pair.
#[derive(Debug, Clone)]
pub struct RunMatrix {
    pub windows: Vec<NaiveDate>,
    // values[i][r]: window i, run r.
    pub values: Vec<Vec<f64>>,
}

impl RunMatrix {
    /// Cross-run mean and sample standard deviation per window. The
    /// deviation is 0 when there are fewer than two runs.
    pub fn mean_series(&self) -> Vec<(NaiveDate, f64, f64)> {
        self.windows
            .iter()
            .zip(self.values.iter())
            .map(|(window, runs)| {
                let (mean, std) = mean_and_std(runs);
                (*window, mean, std)
            })
            .collect()
    }
}

/// Windows x runs collection of raw per-contribution CE distributions for
/// one group, for the multi-sample test.
#[derive(Debug, Clone)]
pub struct DistributionMatrix {
    pub windows: Vec<NaiveDate>,
    // dists[i][r]: run r's CE values in window i.
    pub dists: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone)]
pub struct SignificantWindow {
    pub window: NaiveDate,
    pub p_value: f64,
}

#[derive(Debug, Clone)]
pub struct SignificantChange {
    // The later of the two compared windows.
    pub window: NaiveDate,
    pub previous: NaiveDate,
    pub p_value: f64,
}

#[derive(Debug, Clone)]
pub struct MultiSampleWindow {
    pub window: NaiveDate,
    pub significant_runs: usize,
    pub total_runs: usize,
}

pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Two-sided paired t-test p-value. NaN when fewer than two pairs, or when
/// the differences have zero variance around a zero mean; zero variance
/// around a nonzero mean is certain change (p = 0).
pub fn paired_t_test(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }
    let n = a.len() as f64;
    let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
    let mean = diffs.iter().sum::<f64>() / n;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let se = (var / n).sqrt();
    if se == 0.0 {
        return if mean == 0.0 { f64::NAN } else { 0.0 };
    }
    let t = mean / se;
    let dist = StudentsT::new(0.0, 1.0, n - 1.0).unwrap();
    2.0 * (1.0 - dist.cdf(t.abs()))
}

/// Two-sided Mann-Whitney U p-value via the tie-corrected normal
/// approximation with continuity correction. NaN for an empty side or a
/// pooled sample with no variation.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> f64 {
    let n1 = x.len();
    let n2 = y.len();
    if n1 == 0 || n2 == 0 {
        return f64::NAN;
    }
    let n = n1 + n2;

    // Pool and rank, averaging ranks across ties.
    let mut pooled: Vec<(f64, bool)> = x
        .iter()
        .map(|v| (*v, true))
        .chain(y.iter().map(|v| (*v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_x = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && pooled[j].0 == pooled[i].0 {
            j += 1;
        }
        let count = (j - i) as f64;
        let avg_rank = ((i + 1 + j) as f64) / 2.0;
        for item in &pooled[i..j] {
            if item.1 {
                rank_sum_x += avg_rank;
            }
        }
        tie_term += count.powi(3) - count;
        i = j;
    }

    let n1f = n1 as f64;
    let n2f = n2 as f64;
    let nf = n as f64;
    let u1 = rank_sum_x - n1f * (n1f + 1.0) / 2.0;
    let mu = n1f * n2f / 2.0;
    let sigma_sq = (n1f * n2f / 12.0) * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)));
    if sigma_sq <= 0.0 {
        return f64::NAN;
    }

    let mut numerator = u1 - mu;
    // Continuity correction: half a step toward the mean.
    if numerator > 0.0 {
        numerator -= 0.5;
    } else if numerator < 0.0 {
        numerator += 0.5;
    }
    let z = numerator / sigma_sq.sqrt();
    let normal = Normal::new(0.0, 1.0).unwrap();
    (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Windows where the two groups' per-run values differ significantly under a
/// paired t-test at the same window.
pub fn significant_windows(
    target: &RunMatrix,
    comparison: &RunMatrix,
    sig_level: f64,
) -> Result<Vec<SignificantWindow>> {
    if target.windows != comparison.windows {
        return Err(anyhow::Error::new(AlignmentError {
            left: target.windows.clone(),
            right: comparison.windows.clone(),
        }));
    }
    let mut out = Vec::new();
    for (i, window) in target.windows.iter().enumerate() {
        let p = paired_t_test(&target.values[i], &comparison.values[i]);
        if p < sig_level {
            out.push(SignificantWindow {
                window: *window,
                p_value: p,
            });
        }
    }
    Ok(out)
}

/// Changepoints within one group: each window's per-run values against the
/// previous window's, flagged on the later window.
pub fn significant_changes(matrix: &RunMatrix, sig_level: f64) -> Vec<SignificantChange> {
    let mut out = Vec::new();
    for i in 1..matrix.windows.len() {
        let p = paired_t_test(&matrix.values[i], &matrix.values[i - 1]);
        if p < sig_level {
            out.push(SignificantChange {
                window: matrix.windows[i],
                previous: matrix.windows[i - 1],
                p_value: p,
            });
        }
    }
    out
}

/// Multi-sample variant: per window, a Mann-Whitney U test between the two
/// groups' raw CE distributions in each run; the window counts as
/// significant when at least `fraction` of its runs test significant
/// individually.
pub fn multi_sample_significant_windows(
    a: &DistributionMatrix,
    b: &DistributionMatrix,
    sig_level: f64,
    fraction: f64,
) -> Result<Vec<MultiSampleWindow>> {
    if a.windows != b.windows {
        return Err(anyhow::Error::new(AlignmentError {
            left: a.windows.clone(),
            right: b.windows.clone(),
        }));
    }
    let mut out = Vec::new();
    for (i, window) in a.windows.iter().enumerate() {
        let runs = a.dists[i].len().min(b.dists[i].len());
        if runs == 0 {
            continue;
        }
        let significant = (0..runs)
            .filter(|r| mann_whitney_u(&a.dists[i][*r], &b.dists[i][*r]) < sig_level)
            .count();
        if (significant as f64) >= fraction * (runs as f64) {
            out.push(MultiSampleWindow {
                window: *window,
                significant_runs: significant,
                total_runs: runs,
            });
        }
    }
    Ok(out)
}
