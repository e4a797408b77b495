// Multi-run comparison driver: samples each run, scores it with the
// configured method, and writes one report per configuration.

// External crates
use anyhow::{bail, Error, Result};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::Serialize;

// Standard library
use std::collections::{BTreeMap, HashSet};
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::time::Instant;

// Internal crate imports
use mj_io::{build_pbar, write_mem_to_pathbuf};

use crate::config::{read_config, Config};
use crate::corpus::{load_corpus, topical_split, Contribution, Tokenizer, TopicMatcher};
use crate::debug_println;
use crate::grouping::GroupingStrategy;
use crate::sampling::{
    quota_sample, split_sample, DataSufficiencyError, RunSamples, TestPartition, REFERENCE_GROUP,
};
use crate::significance::{
    multi_sample_significant_windows, significant_changes, significant_windows,
    DistributionMatrix, RunMatrix,
};
use crate::snapshot::{EntropyRow, EntropyTable, SnapshotModelSet};
use crate::windows::{build_plan, window_label, WindowAssignment, WindowPlan};

/*=================================================================
=                        COMPARISON METHODS                       =
=================================================================*/

pub type DivergenceSeries = BTreeMap<NaiveDate, f64>;

/// One group pair's per-window leaves: CE methods carry per-contribution
/// entropy maps, KLD methods carry divergence scalars.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WindowSeries {
    Entropies(EntropyTable),
    Divergences(DivergenceSeries),
}

/// One run's output. Pairwise methods nest snap group -> test group ->
/// windows; fluctuation methods are keyed by group alone.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunComparison {
    Paired(BTreeMap<String, BTreeMap<String, WindowSeries>>),
    PerGroup(BTreeMap<String, WindowSeries>),
}

pub struct MethodContext {
    pub smoothing: f64,
    pub backoff_discount: f64,
    pub token_limit: usize,
}

pub trait ComparisonMethod: Sync {
    fn name(&self) -> &'static str;
    fn compare(&self, samples: &RunSamples, ctx: &MethodContext) -> Result<RunComparison>;
}

pub fn comparison_method(name: &str) -> Result<Box<dyn ComparisonMethod>> {
    match name {
        "CE" => Ok(Box::new(CrossEntropyMethod)),
        "CE_Fluct" => Ok(Box::new(CrossEntropyFluctuationMethod)),
        "KLD" => Ok(Box::new(KlDivergenceMethod)),
        "KLD_Fluct" => Ok(Box::new(KlFluctuationMethod)),
        other => bail!("Unknown comparison method '{}'", other),
    }
}

fn rows_to_table(rows: Vec<EntropyRow>) -> EntropyTable {
    let mut table = EntropyTable::new();
    for row in rows {
        table
            .entry(row.window)
            .or_default()
            .insert(row.contribution_id, row.cross_entropy);
    }
    table
}

fn score_test_partition(
    set: &SnapshotModelSet,
    test: &TestPartition,
    token_limit: usize,
) -> Result<EntropyTable> {
    match test {
        TestPartition::Windowed(assignment) => set.cross_entropies_preset(assignment, token_limit),
        TestPartition::Flat(rows) => Ok(rows_to_table(set.cross_entropies_for(rows)?)),
    }
}

/// Every ordered (snap, test) pair including self-pairs: the snap group's
/// snapshot models score the test group's test rows per window.
pub struct CrossEntropyMethod;

impl ComparisonMethod for CrossEntropyMethod {
    fn name(&self) -> &'static str {
        "CE"
    }

    fn compare(&self, samples: &RunSamples, ctx: &MethodContext) -> Result<RunComparison> {
        let mut out = BTreeMap::new();
        for (snap_name, snap) in samples {
            let set =
                SnapshotModelSet::from_assignment(&snap.snapshot, ctx.smoothing, ctx.backoff_discount);
            let mut per_test = BTreeMap::new();
            for (test_name, test) in samples {
                let table = score_test_partition(&set, &test.test, ctx.token_limit)?;
                per_test.insert(test_name.clone(), WindowSeries::Entropies(table));
            }
            out.insert(snap_name.clone(), per_test);
        }
        Ok(RunComparison::Paired(out))
    }
}

/// Per group: test rows of window w scored against the group's own window
/// w-1 snapshot model. The first window emits nothing.
pub struct CrossEntropyFluctuationMethod;

impl ComparisonMethod for CrossEntropyFluctuationMethod {
    fn name(&self) -> &'static str {
        "CE_Fluct"
    }

    fn compare(&self, samples: &RunSamples, ctx: &MethodContext) -> Result<RunComparison> {
        let mut out = BTreeMap::new();
        for (name, group) in samples {
            let set =
                SnapshotModelSet::from_assignment(&group.snapshot, ctx.smoothing, ctx.backoff_discount);
            let table = match &group.test {
                TestPartition::Windowed(assignment) => {
                    set.fluctuations_preset(assignment, ctx.token_limit)?
                }
                TestPartition::Flat(rows) => rows_to_table(set.fluctuations_for(rows)?),
            };
            out.insert(name.clone(), WindowSeries::Entropies(table));
        }
        Ok(RunComparison::PerGroup(out))
    }
}

/// Every ordered pair: per-window KL of the test group's test-side models
/// (P) from the snap group's snapshot-side models (Q). Flat test sides have
/// no window structure, so quota runs compare the snapshot sides instead.
pub struct KlDivergenceMethod;

impl ComparisonMethod for KlDivergenceMethod {
    fn name(&self) -> &'static str {
        "KLD"
    }

    fn compare(&self, samples: &RunSamples, ctx: &MethodContext) -> Result<RunComparison> {
        let snap_sets: Vec<(&String, SnapshotModelSet)> = samples
            .iter()
            .map(|(name, group)| {
                (
                    name,
                    SnapshotModelSet::from_assignment(
                        &group.snapshot,
                        ctx.smoothing,
                        ctx.backoff_discount,
                    ),
                )
            })
            .collect();
        let test_sets: Vec<(&String, SnapshotModelSet)> = samples
            .iter()
            .map(|(name, group)| {
                let assignment = match &group.test {
                    TestPartition::Windowed(assignment) => assignment,
                    TestPartition::Flat(_) => &group.snapshot,
                };
                (
                    name,
                    SnapshotModelSet::from_assignment(assignment, ctx.smoothing, ctx.backoff_discount),
                )
            })
            .collect();

        let mut out = BTreeMap::new();
        for (snap_name, q) in &snap_sets {
            let mut per_test = BTreeMap::new();
            for (test_name, p) in &test_sets {
                per_test.insert(
                    (*test_name).clone(),
                    WindowSeries::Divergences(q.kl_divergence_to(p)?),
                );
            }
            out.insert((*snap_name).clone(), per_test);
        }
        Ok(RunComparison::Paired(out))
    }
}

/// Per group: KL of the current window's test-side model from the previous
/// window's snapshot-side model, keyed by the current window.
pub struct KlFluctuationMethod;

impl ComparisonMethod for KlFluctuationMethod {
    fn name(&self) -> &'static str {
        "KLD_Fluct"
    }

    fn compare(&self, samples: &RunSamples, ctx: &MethodContext) -> Result<RunComparison> {
        let mut out = BTreeMap::new();
        for (name, group) in samples {
            let snap_set =
                SnapshotModelSet::from_assignment(&group.snapshot, ctx.smoothing, ctx.backoff_discount);
            let series = match &group.test {
                TestPartition::Windowed(assignment) => {
                    let test_set = SnapshotModelSet::from_assignment(
                        assignment,
                        ctx.smoothing,
                        ctx.backoff_discount,
                    );
                    snap_set.kl_fluctuation_against(&test_set)?
                }
                TestPartition::Flat(_) => snap_set.kl_fluctuation(),
            };
            out.insert(name.clone(), WindowSeries::Divergences(series));
        }
        Ok(RunComparison::PerGroup(out))
    }
}

/*=================================================================
=                         RUN METADATA                            =
=================================================================*/

pub type GroupWindowCounts = BTreeMap<String, BTreeMap<NaiveDate, usize>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMeta {
    #[serde(rename = "SnapPosts")]
    pub snap_posts: GroupWindowCounts,
    #[serde(rename = "TestPosts")]
    pub test_posts: GroupWindowCounts,
    #[serde(rename = "SnapUsers")]
    pub snap_users: GroupWindowCounts,
    #[serde(rename = "TestUsers")]
    pub test_users: GroupWindowCounts,
}

fn count_side(
    name: &str,
    assignment: &WindowAssignment,
    posts: &mut GroupWindowCounts,
    users: &mut GroupWindowCounts,
) {
    let mut post_counts = BTreeMap::new();
    let mut user_counts = BTreeMap::new();
    for (window, rows) in assignment {
        post_counts.insert(*window, rows.len());
        let speakers: HashSet<i64> = rows.iter().map(|c| c.speaker_id).collect();
        user_counts.insert(*window, speakers.len());
    }
    posts.insert(name.to_string(), post_counts);
    users.insert(name.to_string(), user_counts);
}

/// Posts and distinct speakers per group per window, both sides. Flat test
/// tables are bucketed back into plan windows for counting.
pub fn collect_run_meta(samples: &RunSamples, plan: &WindowPlan) -> RunMeta {
    let mut meta = RunMeta::default();
    for (name, group) in samples {
        count_side(
            name,
            &group.snapshot,
            &mut meta.snap_posts,
            &mut meta.snap_users,
        );
        match &group.test {
            TestPartition::Windowed(assignment) => {
                count_side(name, assignment, &mut meta.test_posts, &mut meta.test_users)
            }
            TestPartition::Flat(rows) => {
                let assignment = plan.assign(rows);
                count_side(name, &assignment, &mut meta.test_posts, &mut meta.test_users)
            }
        }
    }
    meta
}

/*=================================================================
=                      CROSS-RUN AGGREGATION                      =
=================================================================*/

fn window_scalars(series: &WindowSeries) -> Vec<(NaiveDate, f64)> {
    match series {
        // A window's CE leaf reduces to its mean; empty leaves drop out.
        WindowSeries::Entropies(table) => table
            .iter()
            .filter(|(_, leaf)| !leaf.is_empty())
            .map(|(window, leaf)| (*window, leaf.values().sum::<f64>() / leaf.len() as f64))
            .collect(),
        WindowSeries::Divergences(map) => map.iter().map(|(w, v)| (*w, *v)).collect(),
    }
}

fn finish_matrix(windows: BTreeMap<NaiveDate, Vec<f64>>, n_runs: usize) -> RunMatrix {
    // Keep only windows present in every run so columns stay paired.
    let kept: Vec<(NaiveDate, Vec<f64>)> = windows
        .into_iter()
        .filter(|(_, values)| values.len() == n_runs)
        .collect();
    RunMatrix {
        windows: kept.iter().map(|(w, _)| *w).collect(),
        values: kept.into_iter().map(|(_, v)| v).collect(),
    }
}

/// Windows x runs scalar matrix per ordered (snap, test) pair.
pub fn paired_run_matrices(runs: &[RunComparison]) -> BTreeMap<(String, String), RunMatrix> {
    let mut series: BTreeMap<(String, String), BTreeMap<NaiveDate, Vec<f64>>> = BTreeMap::new();
    for comparison in runs {
        if let RunComparison::Paired(pairs) = comparison {
            for (snap, per_test) in pairs {
                for (test, windows) in per_test {
                    let bucket = series.entry((snap.clone(), test.clone())).or_default();
                    for (window, value) in window_scalars(windows) {
                        bucket.entry(window).or_default().push(value);
                    }
                }
            }
        }
    }
    series
        .into_iter()
        .map(|(key, windows)| (key, finish_matrix(windows, runs.len())))
        .collect()
}

/// Windows x runs scalar matrix per group for the fluctuation methods.
pub fn per_group_run_matrices(runs: &[RunComparison]) -> BTreeMap<String, RunMatrix> {
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, Vec<f64>>> = BTreeMap::new();
    for comparison in runs {
        if let RunComparison::PerGroup(groups) = comparison {
            for (group, windows) in groups {
                let bucket = series.entry(group.clone()).or_default();
                for (window, value) in window_scalars(windows) {
                    bucket.entry(window).or_default().push(value);
                }
            }
        }
    }
    series
        .into_iter()
        .map(|(key, windows)| (key, finish_matrix(windows, runs.len())))
        .collect()
}

/// Raw per-contribution CE distributions per pair, for the multi-sample
/// significance test. KLD runs contribute nothing here.
pub fn paired_distribution_matrices(
    runs: &[RunComparison],
) -> BTreeMap<(String, String), DistributionMatrix> {
    let mut series: BTreeMap<(String, String), BTreeMap<NaiveDate, Vec<Vec<f64>>>> = BTreeMap::new();
    for comparison in runs {
        if let RunComparison::Paired(pairs) = comparison {
            for (snap, per_test) in pairs {
                for (test, windows) in per_test {
                    if let WindowSeries::Entropies(table) = windows {
                        let bucket = series.entry((snap.clone(), test.clone())).or_default();
                        for (window, leaf) in table {
                            if !leaf.is_empty() {
                                bucket
                                    .entry(*window)
                                    .or_default()
                                    .push(leaf.values().copied().collect());
                            }
                        }
                    }
                }
            }
        }
    }
    let n_runs = runs.len();
    series
        .into_iter()
        .map(|(key, windows)| {
            let kept: Vec<(NaiveDate, Vec<Vec<f64>>)> = windows
                .into_iter()
                .filter(|(_, dists)| dists.len() == n_runs)
                .collect();
            (
                key,
                DistributionMatrix {
                    windows: kept.iter().map(|(w, _)| *w).collect(),
                    dists: kept.into_iter().map(|(_, d)| d).collect(),
                },
            )
        })
        .collect()
}

/*=================================================================
=                           REPORTING                             =
=================================================================*/

#[derive(Debug, Serialize)]
pub struct ReportParams {
    pub data: String,
    pub comp_method: String,
    pub window_mode: String,
    pub win_size: usize,
    pub win_step: usize,
    pub n_runs: usize,
    pub split_percentage: f64,
    pub balanced: bool,
    pub contrib_limit: bool,
    pub contribs_per_mp: usize,
    pub token_limit: usize,
    pub use_reference: bool,
    pub sampling: String,
    pub smoothing: f64,
    pub backoff_discount: f64,
    pub seed: u64,
    pub gnames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub params: ReportParams,
    pub comparisons: Vec<RunComparison>,
    pub meta: Vec<RunMeta>,
    pub end_of_windows: Vec<NaiveDate>,
}

fn report_params(config: &Config, gnames: Vec<String>) -> ReportParams {
    ReportParams {
        data: config.data.clone(),
        comp_method: config.comp_method.clone(),
        window_mode: config.window_mode.clone(),
        win_size: config.win_size,
        win_step: config.win_step,
        n_runs: config.n_runs,
        split_percentage: config.split_percentage,
        balanced: config.balanced,
        contrib_limit: config.contrib_limit,
        contribs_per_mp: config.contribs_per_mp,
        token_limit: config.token_limit,
        use_reference: config.use_reference,
        sampling: config.sampling.clone(),
        smoothing: config.smoothing,
        backoff_discount: config.backoff_discount,
        seed: config.seed,
        gnames,
    }
}

pub fn report_filename(config: &Config) -> String {
    let cap = if config.contrib_limit {
        format!("w{}", config.contribs_per_mp)
    } else {
        "n".to_string()
    };
    let balance = if config.balanced { "balanced" } else { "unbalanced" };
    format!(
        "{}_{}_{}_{}_{}_lim_{}_{}_runs.json",
        config.data,
        config.comp_method,
        config.win_size,
        config.win_step,
        cap,
        balance,
        config.n_runs
    )
}

/*=================================================================
=                        CORPUS PARTITIONING                      =
=================================================================*/

/// The group-side rows and the reference pool per the data subset: `eu`
/// restricts groups to topical rows with the complementary rows as
/// reference; `full` uses everything on both sides.
fn subset_corpus<'a>(
    config: &Config,
    corpus: &'a [Contribution],
) -> Result<(Vec<&'a Contribution>, Vec<&'a Contribution>)> {
    if config.data == "eu" {
        let matcher = TopicMatcher::new(&config.topic_mention_terms, &config.topic_section_terms)?;
        Ok(topical_split(corpus, &matcher))
    } else {
        let all: Vec<&Contribution> = corpus.iter().collect();
        Ok((all.clone(), all))
    }
}

/// Reference rows restricted to the configured groups, deduplicated by
/// contribution id (first occurrence wins).
fn reference_rows<'a>(
    strategy: &GroupingStrategy,
    pool: &[&'a Contribution],
) -> Vec<&'a Contribution> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for (_, members) in strategy.partition(pool) {
        for contribution in members {
            if seen.insert(contribution.id) {
                rows.push(contribution);
            }
        }
    }
    rows
}

/// Group rows and reference rows merged (deduplicated by id) into the
/// chronological corpus the window plan is built from. Every group and the
/// reference are assigned against this one plan, so their window keys match.
fn combined_corpus<'a>(
    groups: &[(String, Vec<&'a Contribution>)],
    reference: Option<&[&'a Contribution]>,
) -> Vec<&'a Contribution> {
    let mut seen = HashSet::new();
    let mut combined: Vec<&Contribution> = Vec::new();
    for (_, members) in groups {
        for contribution in members {
            if seen.insert(contribution.id) {
                combined.push(contribution);
            }
        }
    }
    if let Some(reference) = reference {
        for contribution in reference {
            if seen.insert(contribution.id) {
                combined.push(contribution);
            }
        }
    }
    combined.sort_by_key(|c| c.date);
    combined
}

/*=================================================================
=                          RUN DRIVER                             =
=================================================================*/

pub fn execute_compare(
    config_path: &PathBuf,
    corpus_override: Option<&PathBuf>,
    output_override: Option<&PathBuf>,
) -> Result<(), Error> {
    let mut base = read_config(config_path)?;
    if let Some(corpus) = corpus_override {
        base.corpus = corpus.clone();
    }
    if let Some(output_dir) = output_override {
        base.output_dir = output_dir.clone();
    }
    base.validate()?;

    let configs = base.expanded();
    println!("Running {} configuration(s)...", configs.len());
    for (index, config) in configs.iter().enumerate() {
        config.validate()?;
        match run_configuration(config) {
            Ok(path) => println!("Configuration {} report: {:?}", index + 1, path),
            Err(e) => match e.downcast_ref::<DataSufficiencyError>() {
                Some(underflow) => {
                    eprintln!(
                        "Warning: skipping configuration {}: {}",
                        index + 1,
                        underflow
                    );
                }
                None => return Err(e),
            },
        }
    }
    Ok(())
}

pub fn run_configuration(config: &Config) -> Result<PathBuf> {
    let start_main = Instant::now();

    println!("Loading corpus from {:?}...", config.corpus);
    let tokenizer = Tokenizer::new();
    let corpus = load_corpus(&config.corpus, &tokenizer, &config.load_options()?)?;
    println!("Loaded {} contributions", corpus.len());
    if corpus.is_empty() {
        bail!("Corpus {:?} is empty after filtering", config.corpus);
    }

    let (group_pool, reference_pool) = subset_corpus(config, &corpus)?;
    let strategy = config.grouping_strategy()?;
    let groups = strategy.partition(&group_pool);
    if groups.iter().all(|(_, members)| members.is_empty()) {
        bail!("No group has any contribution in the {} subset", config.data);
    }
    for (name, members) in &groups {
        println!("Group {}: {} contributions", name, members.len());
    }

    let with_reference = config.use_reference && config.sampling == "split";
    let reference = if with_reference {
        let rows = reference_rows(&strategy, &reference_pool);
        println!("Reference: {} contributions", rows.len());
        Some(rows)
    } else {
        None
    };

    // One plan over the combined corpus; every side shares its window keys.
    let combined = combined_corpus(&groups, reference.as_deref());
    let plan = build_plan(
        &combined,
        config.window_mode()?,
        config.win_size,
        config.win_step,
    )?;
    if plan.is_empty() {
        bail!(
            "Window parameters (size {}, step {}) produce no windows over {} contributions",
            config.win_size,
            config.win_step,
            combined.len()
        );
    }
    println!("{} windows over the combined corpus", plan.num_windows());
    debug_println!(
        config,
        "Window keys: {:?}",
        plan.keys().iter().map(window_label).collect::<Vec<_>>()
    );

    let method = comparison_method(&config.comp_method)?;
    let split_options = config.split_options();
    let quota_params = config.quota_params();
    let context = MethodContext {
        smoothing: config.smoothing,
        backoff_discount: config.backoff_discount,
        token_limit: config.token_limit,
    };

    println!(
        "Running {} x {} comparison ({} sampling)...",
        config.n_runs,
        method.name(),
        config.sampling
    );
    let pbar = build_pbar(config.n_runs, "runs");
    let run_outputs: Result<Vec<(RunComparison, RunMeta)>> = (0..config.n_runs)
        .into_par_iter()
        .map(|run_index| {
            let mut rng = ChaCha20Rng::seed_from_u64(config.seed + run_index as u64);
            let samples = match config.sampling.as_str() {
                "quota" => quota_sample(&groups, &plan, &quota_params, &mut rng)?,
                _ => split_sample(
                    &groups,
                    reference.as_deref(),
                    &plan,
                    &split_options,
                    &mut rng,
                ),
            };
            let comparison = method.compare(&samples, &context)?;
            let meta = collect_run_meta(&samples, &plan);
            pbar.inc(1);
            Ok((comparison, meta))
        })
        .collect();
    let (comparisons, meta): (Vec<RunComparison>, Vec<RunMeta>) =
        run_outputs?.into_iter().unzip();

    print_significance_summary(config, &comparisons);

    let mut gnames: Vec<String> = groups.iter().map(|(name, _)| name.clone()).collect();
    if with_reference {
        gnames.push(REFERENCE_GROUP.to_string());
    }
    let report = Report {
        params: report_params(config, gnames),
        comparisons,
        meta,
        end_of_windows: plan.last_dates(),
    };

    create_dir_all(&config.output_dir)?;
    let output_file = config.output_dir.join(report_filename(config));
    let output_bytes = serde_json::to_vec(&report)?;
    write_mem_to_pathbuf(&output_bytes, &output_file)?;
    println!(
        "Comparison completed in {:?} seconds",
        start_main.elapsed().as_secs()
    );
    Ok(output_file)
}

/// Pairwise methods: each out-group model against the test group's own
/// model over the same test rows. Fluctuation methods: changepoints within
/// each group's own series.
fn print_significance_summary(config: &Config, comparisons: &[RunComparison]) {
    if config.n_runs < 2 {
        return;
    }
    println!("=== SIGNIFICANCE SUMMARY ===");
    match config.comp_method.as_str() {
        "CE" | "KLD" => {
            let matrices = paired_run_matrices(comparisons);
            for ((snap, test), matrix) in &matrices {
                if snap == test {
                    continue;
                }
                let baseline = match matrices.get(&(test.clone(), test.clone())) {
                    Some(baseline) => baseline,
                    None => continue,
                };
                match significant_windows(matrix, baseline, config.sig_level) {
                    Ok(flagged) => {
                        let labels: Vec<String> =
                            flagged.iter().map(|w| window_label(&w.window)).collect();
                        println!(
                            "{} -> {}: {} significant window(s) {:?}",
                            snap,
                            test,
                            labels.len(),
                            labels
                        );
                    }
                    Err(e) => eprintln!(
                        "Warning: significance test for {} -> {} failed: {}",
                        snap, test, e
                    ),
                }
            }
            if config.comp_method == "CE" {
                let distributions = paired_distribution_matrices(comparisons);
                for ((snap, test), matrix) in &distributions {
                    if snap == test {
                        continue;
                    }
                    let baseline = match distributions.get(&(test.clone(), test.clone())) {
                        Some(baseline) => baseline,
                        None => continue,
                    };
                    match multi_sample_significant_windows(
                        matrix,
                        baseline,
                        config.sig_level,
                        config.multi_sample_sig_fraction,
                    ) {
                        Ok(flagged) => {
                            let labels: Vec<String> =
                                flagged.iter().map(|w| window_label(&w.window)).collect();
                            println!(
                                "{} -> {} (multi-sample): {} significant window(s) {:?}",
                                snap,
                                test,
                                labels.len(),
                                labels
                            );
                        }
                        Err(e) => eprintln!(
                            "Warning: multi-sample test for {} -> {} failed: {}",
                            snap, test, e
                        ),
                    }
                }
            }
        }
        _ => {
            let matrices = per_group_run_matrices(comparisons);
            for (group, matrix) in &matrices {
                let changes = significant_changes(matrix, config.sig_level);
                let labels: Vec<String> =
                    changes.iter().map(|c| window_label(&c.window)).collect();
                println!(
                    "{}: {} significant change(s) {:?}",
                    group,
                    labels.len(),
                    labels
                );
            }
        }
    }
}
