// Speaker-disjoint samplers. Each run draws fresh snapshot/test partitions
// per group from an explicit seeded RNG; a speaker's contributions land on
// one side only, never both. Window keys always come from the plan built
// over the combined corpus, so every group shares the same key set.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::corpus::Contribution;
use crate::windows::{window_label, WindowAssignment, WindowPlan};

/// Group name given to the unioned reference partition.
pub const REFERENCE_GROUP: &str = "Reference";

/// Sampling underflow: a window cannot satisfy a requested quota. Carried
/// inside `anyhow::Error`; the batch driver downcasts to it to abort the
/// configuration without killing the batch.
#[derive(Debug, Clone)]
pub struct DataSufficiencyError {
    pub group: String,
    pub window: NaiveDate,
    pub requested: usize,
    pub available: usize,
}

impl fmt::Display for DataSufficiencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Group {:?}, window {}: requested {} but only {} available",
            self.group,
            window_label(&self.window),
            self.requested,
            self.available
        )
    }
}

impl std::error::Error for DataSufficiencyError {}

/// Test-side rows for one group: window-partitioned under the split sampler,
/// flat (scored later by date resolution) under the quota sampler.
#[derive(Debug, Clone)]
pub enum TestPartition<'a> {
    Windowed(WindowAssignment<'a>),
    Flat(Vec<&'a Contribution>),
}

impl<'a> TestPartition<'a> {
    pub fn windowed(&self) -> Option<&WindowAssignment<'a>> {
        match self {
            TestPartition::Windowed(assignment) => Some(assignment),
            TestPartition::Flat(_) => None,
        }
    }

    pub fn flat(&self) -> Option<&[&'a Contribution]> {
        match self {
            TestPartition::Windowed(_) => None,
            TestPartition::Flat(rows) => Some(rows),
        }
    }
}

/// One group's partitions for a single run.
#[derive(Debug, Clone)]
pub struct GroupSamples<'a> {
    pub snapshot: WindowAssignment<'a>,
    pub test: TestPartition<'a>,
}

/// Every group's samples for one run, in group order; the reference group,
/// when present, comes last.
pub type RunSamples<'a> = Vec<(String, GroupSamples<'a>)>;

/// Knobs for the speaker-split sampler.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    // Fraction of each group's speakers assigned to the snapshot side.
    pub percentage: f64,
    // Truncate every group's speaker lists to the smallest group's counts.
    pub balanced: bool,
    // Some(cap): per window, per speaker, keep at most this many rows.
    pub contribs_per_speaker: Option<usize>,
}

/// Knobs for the quota sampler.
#[derive(Debug, Clone)]
pub struct QuotaParams {
    pub num_speakers: usize,
    pub samples_per_speaker: usize,
    pub test_sample_size: usize,
    pub replace: bool,
}

/// Splits each group's speakers into snapshot/test sides, assigns rows to
/// windows, and optionally caps rows per speaker per window. Reference rows
/// are split with each group's speaker assignment and unioned (deduplicated
/// by contribution id) into the single trailing reference group.
pub fn split_sample<'a, R: Rng>(
    groups: &[(String, Vec<&'a Contribution>)],
    reference: Option<&[&'a Contribution]>,
    plan: &WindowPlan,
    options: &SplitOptions,
    rng: &mut R,
) -> RunSamples<'a> {
    let mut speaker_splits: Vec<(Vec<i64>, Vec<i64>)> = groups
        .iter()
        .map(|(_, rows)| split_speakers(rows, options.percentage, rng))
        .collect();

    if options.balanced {
        let min_snap = speaker_splits.iter().map(|(s, _)| s.len()).min().unwrap_or(0);
        let min_test = speaker_splits.iter().map(|(_, t)| t.len()).min().unwrap_or(0);
        for (snap, test) in &mut speaker_splits {
            snap.truncate(min_snap);
            test.truncate(min_test);
        }
    }

    let mut out: RunSamples<'a> = Vec::new();
    for (i, (name, rows)) in groups.iter().enumerate() {
        let snap_speakers: HashSet<i64> = speaker_splits[i].0.iter().copied().collect();
        let test_speakers: HashSet<i64> = speaker_splits[i].1.iter().copied().collect();

        let snap_rows = rows_for_speakers(rows, &snap_speakers);
        let test_rows = rows_for_speakers(rows, &test_speakers);

        out.push((
            name.clone(),
            GroupSamples {
                snapshot: assign_side(plan, &snap_rows, options.contribs_per_speaker, rng),
                test: TestPartition::Windowed(assign_side(
                    plan,
                    &test_rows,
                    options.contribs_per_speaker,
                    rng,
                )),
            },
        ));
    }

    if let Some(reference) = reference {
        let mut seen_snap: HashSet<i64> = HashSet::new();
        let mut seen_test: HashSet<i64> = HashSet::new();
        let mut ref_snap: Vec<&Contribution> = Vec::new();
        let mut ref_test: Vec<&Contribution> = Vec::new();
        for (snap_ids, test_ids) in &speaker_splits {
            let snap_speakers: HashSet<i64> = snap_ids.iter().copied().collect();
            let test_speakers: HashSet<i64> = test_ids.iter().copied().collect();
            for contribution in reference {
                if snap_speakers.contains(&contribution.speaker_id)
                    && seen_snap.insert(contribution.id)
                {
                    ref_snap.push(*contribution);
                }
                if test_speakers.contains(&contribution.speaker_id)
                    && seen_test.insert(contribution.id)
                {
                    ref_test.push(*contribution);
                }
            }
        }
        out.push((
            REFERENCE_GROUP.to_string(),
            GroupSamples {
                snapshot: assign_side(plan, &ref_snap, options.contribs_per_speaker, rng),
                test: TestPartition::Windowed(assign_side(
                    plan,
                    &ref_test,
                    options.contribs_per_speaker,
                    rng,
                )),
            },
        ));
    }

    out
}

/// Per-window quota sampler. For each group and window: keep speakers with
/// at least `samples_per_speaker` rows, draw exactly `num_speakers` of them,
/// and take exactly `samples_per_speaker` rows per drawn speaker for the
/// snapshot side. The test side draws `test_sample_size` rows per window
/// from the speakers *not* drawn, concatenated into one flat date-sorted
/// table. Underflow anywhere is a [`DataSufficiencyError`].
pub fn quota_sample<'a, R: Rng>(
    groups: &[(String, Vec<&'a Contribution>)],
    plan: &WindowPlan,
    params: &QuotaParams,
    rng: &mut R,
) -> Result<RunSamples<'a>> {
    let mut out: RunSamples<'a> = Vec::new();
    for (name, rows) in groups {
        let assignment = plan.assign(rows);
        let mut snapshot = WindowAssignment::new();
        let mut flat_test: Vec<&Contribution> = Vec::new();

        for (window, members) in &assignment {
            let (order, by_speaker) = rows_by_speaker(members);
            let eligible: Vec<i64> = order
                .iter()
                .filter(|s| by_speaker[s].len() >= params.samples_per_speaker)
                .copied()
                .collect();

            let drawn = draw_speakers(&eligible, params, name, *window, rng)?;

            let mut snap_rows: Vec<&Contribution> = Vec::new();
            for speaker in &order {
                if !drawn.contains(speaker) {
                    continue;
                }
                let speaker_rows = &by_speaker[speaker];
                if params.replace {
                    for _ in 0..params.samples_per_speaker {
                        snap_rows.push(speaker_rows[rng.gen_range(0..speaker_rows.len())]);
                    }
                } else {
                    snap_rows.extend(
                        speaker_rows
                            .choose_multiple(rng, params.samples_per_speaker)
                            .copied(),
                    );
                }
            }
            snap_rows.sort_by_key(|c| (c.date, c.id));
            snapshot.insert(*window, snap_rows);

            let pool: Vec<&Contribution> = members
                .iter()
                .filter(|c| !drawn.contains(&c.speaker_id))
                .copied()
                .collect();
            if params.replace {
                if pool.is_empty() {
                    return Err(anyhow::Error::new(DataSufficiencyError {
                        group: name.clone(),
                        window: *window,
                        requested: params.test_sample_size,
                        available: 0,
                    }));
                }
                for _ in 0..params.test_sample_size {
                    flat_test.push(pool[rng.gen_range(0..pool.len())]);
                }
            } else {
                if pool.len() < params.test_sample_size {
                    return Err(anyhow::Error::new(DataSufficiencyError {
                        group: name.clone(),
                        window: *window,
                        requested: params.test_sample_size,
                        available: pool.len(),
                    }));
                }
                flat_test.extend(pool.choose_multiple(rng, params.test_sample_size).copied());
            }
        }

        flat_test.sort_by_key(|c| (c.date, c.id));
        out.push((
            name.clone(),
            GroupSamples {
                snapshot,
                test: TestPartition::Flat(flat_test),
            },
        ));
    }
    Ok(out)
}

// Distinct speakers in first-appearance order, shuffled, then cut at
// floor((n + 1) * percentage), clamped to n.
fn split_speakers<R: Rng>(
    rows: &[&Contribution],
    percentage: f64,
    rng: &mut R,
) -> (Vec<i64>, Vec<i64>) {
    let mut speakers: Vec<i64> = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();
    for contribution in rows {
        if seen.insert(contribution.speaker_id) {
            speakers.push(contribution.speaker_id);
        }
    }
    speakers.shuffle(rng);
    let cut = (((speakers.len() + 1) as f64) * percentage) as usize;
    let cut = cut.min(speakers.len());
    let test = speakers.split_off(cut);
    (speakers, test)
}

fn rows_for_speakers<'a>(
    rows: &[&'a Contribution],
    speakers: &HashSet<i64>,
) -> Vec<&'a Contribution> {
    rows.iter()
        .filter(|c| speakers.contains(&c.speaker_id))
        .copied()
        .collect()
}

// Windows one side's rows, optionally capping rows per speaker per window.
fn assign_side<'a, R: Rng>(
    plan: &WindowPlan,
    rows: &[&'a Contribution],
    cap: Option<usize>,
    rng: &mut R,
) -> WindowAssignment<'a> {
    let mut assignment = plan.assign(rows);
    if let Some(cap) = cap {
        for members in assignment.values_mut() {
            *members = cap_per_speaker(members, cap, rng);
        }
    }
    assignment
}

// Per speaker: exactly `cap` rows without replacement when the speaker has
// that many, otherwise all of them. Output sorted by date.
fn cap_per_speaker<'a, R: Rng>(
    members: &[&'a Contribution],
    cap: usize,
    rng: &mut R,
) -> Vec<&'a Contribution> {
    let (order, by_speaker) = rows_by_speaker(members);
    let mut selected: Vec<&Contribution> = Vec::new();
    for speaker in order {
        let rows = &by_speaker[&speaker];
        if rows.len() >= cap {
            selected.extend(rows.choose_multiple(rng, cap).copied());
        } else {
            selected.extend(rows.iter().copied());
        }
    }
    selected.sort_by_key(|c| (c.date, c.id));
    selected
}

// Buckets rows per speaker, keeping first-appearance order so RNG
// consumption stays deterministic.
fn rows_by_speaker<'a>(
    members: &[&'a Contribution],
) -> (Vec<i64>, HashMap<i64, Vec<&'a Contribution>>) {
    let mut order: Vec<i64> = Vec::new();
    let mut by_speaker: HashMap<i64, Vec<&'a Contribution>> = HashMap::new();
    for contribution in members {
        if !by_speaker.contains_key(&contribution.speaker_id) {
            order.push(contribution.speaker_id);
        }
        by_speaker
            .entry(contribution.speaker_id)
            .or_default()
            .push(contribution);
    }
    (order, by_speaker)
}

fn draw_speakers<R: Rng>(
    eligible: &[i64],
    params: &QuotaParams,
    group: &str,
    window: NaiveDate,
    rng: &mut R,
) -> Result<HashSet<i64>> {
    if params.replace {
        if eligible.is_empty() {
            return Err(anyhow::Error::new(DataSufficiencyError {
                group: group.to_string(),
                window,
                requested: params.num_speakers,
                available: 0,
            }));
        }
        // Drawing with replacement can repeat a speaker; the set collapses
        // repeats, mirroring membership-based selection downstream.
        Ok((0..params.num_speakers)
            .map(|_| eligible[rng.gen_range(0..eligible.len())])
            .collect())
    } else {
        if eligible.len() < params.num_speakers {
            return Err(anyhow::Error::new(DataSufficiencyError {
                group: group.to_string(),
                window,
                requested: params.num_speakers,
                available: eligible.len(),
            }));
        }
        Ok(eligible
            .choose_multiple(rng, params.num_speakers)
            .copied()
            .collect())
    }
}
