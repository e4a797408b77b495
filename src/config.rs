// External crates
use anyhow::{bail, Context, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Standard library
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

// Internal crate imports
use mj_io::read_pathbuf_to_mem;

use crate::corpus::{load_excluded_speakers, LoadOptions};
use crate::grouping::{GroupField, GroupingStrategy};
use crate::sampling::{QuotaParams, SplitOptions};
use crate::windows::WindowMode;

/*=================================================================
=                             CONFIG                              =
=================================================================*/

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Input / output
    pub corpus: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_data")]
    pub data: String,

    // Group definitions
    #[serde(default)]
    pub grouping: GroupingConfig,

    // Corpus filtering
    #[serde(default)]
    pub excluded_speakers: Vec<i64>,
    #[serde(default)]
    pub excluded_speakers_file: Option<PathBuf>,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_end_date")]
    pub end_date: NaiveDate,
    #[serde(default = "default_topic_terms")]
    pub topic_mention_terms: Vec<String>,
    #[serde(default = "default_topic_terms")]
    pub topic_section_terms: Vec<String>,
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    // Windowing
    #[serde(default = "default_window_mode")]
    pub window_mode: String,
    #[serde(default = "default_win_size")]
    pub win_size: usize,
    #[serde(default = "default_win_step")]
    pub win_step: usize,

    // Comparison runs
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,
    #[serde(default = "default_comp_method")]
    pub comp_method: String,
    #[serde(default = "default_split_percentage")]
    pub split_percentage: f64,
    #[serde(default)]
    pub balanced: bool,
    #[serde(default)]
    pub contrib_limit: bool,
    #[serde(default = "default_contribs_per_mp")]
    pub contribs_per_mp: usize,
    #[serde(default = "default_use_reference")]
    pub use_reference: bool,
    #[serde(default = "default_sampling")]
    pub sampling: String,
    #[serde(default)]
    pub quota: QuotaConfig,

    // Language model parameters
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_backoff_discount")]
    pub backoff_discount: f64,

    // Significance testing
    #[serde(default = "default_sig_level")]
    pub sig_level: f64,
    #[serde(default = "default_multi_sample_sig_fraction")]
    pub multi_sample_sig_fraction: f64,

    // Keyword extraction thresholds
    #[serde(default = "default_keyword_min_count")]
    pub keyword_min_count: u64,
    #[serde(default = "default_keyword_min_log_ratio")]
    pub keyword_min_log_ratio: f64,

    // Reproducibility / debug
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_debug")]
    pub debug: bool,

    // Additional configurations derived from this one, run sequentially.
    #[serde(default)]
    pub param_sets: Vec<ParamSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_grouping_mode")]
    pub mode: String,
    // Named groups for composite mode; every field=value requirement in
    // all_of must hold for a contribution to join the group.
    #[serde(default)]
    pub groups: Vec<CompositeGroup>,
    // Named speaker-id lists for speaker_lists mode.
    #[serde(default)]
    pub speaker_lists: BTreeMap<String, Vec<i64>>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            mode: default_grouping_mode(),
            groups: Vec::new(),
            speaker_lists: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeGroup {
    pub name: String,
    pub all_of: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_quota_num_speakers")]
    pub num_speakers: usize,
    #[serde(default = "default_quota_samples_per_speaker")]
    pub samples_per_speaker: usize,
    #[serde(default = "default_quota_test_sample_size")]
    pub test_sample_size: usize,
    #[serde(default)]
    pub replace: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            num_speakers: default_quota_num_speakers(),
            samples_per_speaker: default_quota_samples_per_speaker(),
            test_sample_size: default_quota_test_sample_size(),
            replace: false,
        }
    }
}

// Overrides applied on top of the base config, one report per set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSet {
    #[serde(default)]
    pub comp_method: Option<String>,
    #[serde(default)]
    pub window_mode: Option<String>,
    #[serde(default)]
    pub win_size: Option<usize>,
    #[serde(default)]
    pub win_step: Option<usize>,
    #[serde(default)]
    pub n_runs: Option<usize>,
    #[serde(default)]
    pub balanced: Option<bool>,
    #[serde(default)]
    pub contrib_limit: Option<bool>,
    #[serde(default)]
    pub contribs_per_mp: Option<usize>,
    #[serde(default)]
    pub sampling: Option<String>,
    #[serde(default)]
    pub use_reference: Option<bool>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_data() -> String {
    "eu".to_string()  // Topical subset by default
}

fn default_grouping_mode() -> String {
    "party".to_string()  // Conservative vs Labour
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 5, 1).unwrap()  // Start of the 2015 parliament
}

fn default_end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 12, 11).unwrap()  // Eve of the 2019 election
}

fn default_topic_terms() -> Vec<String> {
    // Matched against lowercased text; section names get the same list.
    vec![
        r"\beu\b".to_string(),
        r"\beuropean union\b".to_string(),
        r"\bbrexit\b".to_string(),
    ]
}

fn default_token_limit() -> usize {
    60  // Minimum tokens to keep a row, and the truncation length
}

fn default_window_mode() -> String {
    "count".to_string()
}

fn default_win_size() -> usize {
    2000  // Contributions per window in count mode, days in time mode
}

fn default_win_step() -> usize {
    2000
}

fn default_n_runs() -> usize {
    20
}

fn default_comp_method() -> String {
    "CE".to_string()
}

fn default_split_percentage() -> f64 {
    0.6  // Share of speakers on the snapshot side
}

fn default_contribs_per_mp() -> usize {
    5  // Per-speaker per-window cap when contrib_limit is on
}

fn default_use_reference() -> bool {
    true
}

fn default_sampling() -> String {
    "split".to_string()
}

fn default_quota_num_speakers() -> usize {
    100
}

fn default_quota_samples_per_speaker() -> usize {
    10
}

fn default_quota_test_sample_size() -> usize {
    1000
}

fn default_smoothing() -> f64 {
    1.0  // Add-k smoothing constant
}

fn default_backoff_discount() -> f64 {
    0.4  // Stupid-backoff weight for unseen contexts
}

fn default_sig_level() -> f64 {
    0.05
}

fn default_multi_sample_sig_fraction() -> f64 {
    0.8  // Share of runs that must test significant individually
}

fn default_keyword_min_count() -> u64 {
    10  // Words at or below this count are dropped
}

fn default_keyword_min_log_ratio() -> f64 {
    1.0  // Keep words at least twice as frequent in the topical side
}

fn default_seed() -> u64 {
    42
}

fn default_debug() -> bool {
    false  // Debug logging disabled by default
}

pub fn read_config(config_path: &PathBuf) -> Result<Config, Error> {
    let contents = read_pathbuf_to_mem(config_path)?;
    let config: Config = serde_yaml::from_reader(contents)
        .with_context(|| format!("Failed to parse config {:?}", config_path))?;
    Ok(config)
}

const COMP_METHODS: [&str; 4] = ["CE", "CE_Fluct", "KLD", "KLD_Fluct"];

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.win_size == 0 || self.win_step == 0 {
            bail!("win_size and win_step must be at least 1");
        }
        if self.n_runs == 0 {
            bail!("n_runs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.split_percentage) {
            bail!(
                "split_percentage must lie in [0, 1], got {}",
                self.split_percentage
            );
        }
        if !COMP_METHODS.contains(&self.comp_method.as_str()) {
            bail!(
                "Unknown comp_method '{}', expected one of {:?}",
                self.comp_method,
                COMP_METHODS
            );
        }
        match self.window_mode.as_str() {
            "count" | "time" => {}
            other => bail!("Unknown window_mode '{}', expected count or time", other),
        }
        match self.sampling.as_str() {
            "split" | "quota" => {}
            other => bail!("Unknown sampling '{}', expected split or quota", other),
        }
        match self.data.as_str() {
            "eu" | "full" => {}
            other => bail!("Unknown data subset '{}', expected eu or full", other),
        }
        if self.sampling == "quota"
            && (self.quota.num_speakers == 0 || self.quota.samples_per_speaker == 0)
        {
            bail!("quota.num_speakers and quota.samples_per_speaker must be at least 1");
        }
        if !(0.0 < self.sig_level && self.sig_level < 1.0) {
            bail!("sig_level must lie in (0, 1), got {}", self.sig_level);
        }
        if !(0.0 < self.multi_sample_sig_fraction && self.multi_sample_sig_fraction <= 1.0) {
            bail!(
                "multi_sample_sig_fraction must lie in (0, 1], got {}",
                self.multi_sample_sig_fraction
            );
        }
        if self.smoothing < 0.0 || self.backoff_discount <= 0.0 {
            bail!("smoothing must be >= 0 and backoff_discount > 0");
        }
        if self.end_date < self.start_date {
            bail!(
                "end_date {} precedes start_date {}",
                self.end_date,
                self.start_date
            );
        }
        // Catch bad grouping/composite fields up front rather than mid-run.
        self.grouping_strategy()?;
        Ok(())
    }

    pub fn window_mode(&self) -> Result<WindowMode> {
        match self.window_mode.as_str() {
            "count" => Ok(WindowMode::Count),
            "time" => Ok(WindowMode::Time),
            other => bail!("Unknown window_mode '{}'", other),
        }
    }

    pub fn grouping_strategy(&self) -> Result<GroupingStrategy> {
        match self.grouping.mode.as_str() {
            "party" => Ok(GroupingStrategy::parties()),
            "stance" => Ok(GroupingStrategy::stances()),
            "stance_combos" => Ok(GroupingStrategy::ByCombinedFields),
            "speaker_lists" => {
                if self.grouping.speaker_lists.is_empty() {
                    bail!("grouping.speaker_lists is empty in speaker_lists mode");
                }
                Ok(GroupingStrategy::ByExternalIdList {
                    lists: self.grouping.speaker_lists.clone(),
                })
            }
            "composite" => {
                if self.grouping.groups.is_empty() {
                    bail!("grouping.groups is empty in composite mode");
                }
                let mut groups = Vec::new();
                for group in &self.grouping.groups {
                    let mut requirements = Vec::new();
                    for (field, value) in &group.all_of {
                        requirements.push((GroupField::parse(field)?, value.clone()));
                    }
                    groups.push((group.name.clone(), requirements));
                }
                Ok(GroupingStrategy::Composite { groups })
            }
            "all" => Ok(GroupingStrategy::WholeCorpus),
            other => bail!("Unknown grouping mode '{}'", other),
        }
    }

    /// Inline exclusions merged with the optional id-list file.
    pub fn excluded_speaker_set(&self) -> Result<HashSet<i64>> {
        let mut excluded: HashSet<i64> = self.excluded_speakers.iter().copied().collect();
        if let Some(path) = &self.excluded_speakers_file {
            excluded.extend(load_excluded_speakers(path)?);
        }
        Ok(excluded)
    }

    pub fn load_options(&self) -> Result<LoadOptions> {
        Ok(LoadOptions {
            excluded_speakers: self.excluded_speaker_set()?,
            start_date: self.start_date,
            end_date: self.end_date,
            token_limit: self.token_limit,
        })
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            percentage: self.split_percentage,
            balanced: self.balanced,
            contribs_per_speaker: if self.contrib_limit {
                Some(self.contribs_per_mp)
            } else {
                None
            },
        }
    }

    pub fn quota_params(&self) -> QuotaParams {
        QuotaParams {
            num_speakers: self.quota.num_speakers,
            samples_per_speaker: self.quota.samples_per_speaker,
            test_sample_size: self.quota.test_sample_size,
            replace: self.quota.replace,
        }
    }

    /// The configurations to execute: the config itself, or one per
    /// param_set when any are listed.
    pub fn expanded(&self) -> Vec<Config> {
        if self.param_sets.is_empty() {
            let mut base = self.clone();
            base.param_sets = Vec::new();
            return vec![base];
        }
        self.param_sets.iter().map(|set| set.apply(self)).collect()
    }
}

impl ParamSet {
    pub fn apply(&self, base: &Config) -> Config {
        let mut config = base.clone();
        if let Some(v) = &self.comp_method {
            config.comp_method = v.clone();
        }
        if let Some(v) = &self.window_mode {
            config.window_mode = v.clone();
        }
        if let Some(v) = self.win_size {
            config.win_size = v;
        }
        if let Some(v) = self.win_step {
            config.win_step = v;
        }
        if let Some(v) = self.n_runs {
            config.n_runs = v;
        }
        if let Some(v) = self.balanced {
            config.balanced = v;
        }
        if let Some(v) = self.contrib_limit {
            config.contrib_limit = v;
        }
        if let Some(v) = self.contribs_per_mp {
            config.contribs_per_mp = v;
        }
        if let Some(v) = &self.sampling {
            config.sampling = v.clone();
        }
        if let Some(v) = self.use_reference {
            config.use_reference = v;
        }
        config.param_sets = Vec::new();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_config() -> Config {
        serde_yaml::from_str("corpus: contributions.jsonl").unwrap()
    }

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = minimal_config();
        assert_eq!(config.data, "eu");
        assert_eq!(config.comp_method, "CE");
        assert_eq!(config.token_limit, 60);
        assert_eq!(config.win_size, 2000);
        assert_eq!(config.n_runs, 20);
        assert_eq!(config.split_percentage, 0.6);
        assert_eq!(config.seed, 42);
        assert!(config.use_reference);
        assert!(!config.balanced);
        assert_eq!(config.grouping.mode, "party");
        assert_eq!(config.quota.num_speakers, 100);
        assert_eq!(config.start_date.to_string(), "2015-05-01");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = minimal_config();
        config.win_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_method() {
        let mut config = minimal_config();
        config.comp_method = "perplexity".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_split_percentage() {
        let mut config = minimal_config();
        config.split_percentage = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grouping_strategy_modes() {
        let mut config = minimal_config();
        assert!(matches!(
            config.grouping_strategy().unwrap(),
            GroupingStrategy::ByField { .. }
        ));

        config.grouping.mode = "stance_combos".to_string();
        assert!(matches!(
            config.grouping_strategy().unwrap(),
            GroupingStrategy::ByCombinedFields
        ));

        config.grouping.mode = "composite".to_string();
        assert!(config.grouping_strategy().is_err());

        config.grouping.groups.push(CompositeGroup {
            name: "gov-leavers".to_string(),
            all_of: [
                ("party".to_string(), "Conservative".to_string()),
                ("ref_stance".to_string(), "leave".to_string()),
            ]
            .into_iter()
            .collect(),
        });
        assert!(matches!(
            config.grouping_strategy().unwrap(),
            GroupingStrategy::Composite { .. }
        ));

        config.grouping.mode = "unknown".to_string();
        assert!(config.grouping_strategy().is_err());
    }

    #[test]
    fn test_composite_rejects_unknown_field() {
        let mut config = minimal_config();
        config.grouping.mode = "composite".to_string();
        config.grouping.groups.push(CompositeGroup {
            name: "bad".to_string(),
            all_of: [("shoe_size".to_string(), "44".to_string())]
                .into_iter()
                .collect(),
        });
        assert!(config.grouping_strategy().is_err());
    }

    #[test]
    fn test_param_set_expansion() {
        let mut config = minimal_config();
        config.param_sets = vec![
            ParamSet {
                win_size: Some(500),
                win_step: Some(500),
                ..Default::default()
            },
            ParamSet {
                comp_method: Some("KLD".to_string()),
                balanced: Some(true),
                ..Default::default()
            },
        ];

        let expanded = config.expanded();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].win_size, 500);
        assert_eq!(expanded[0].comp_method, "CE");
        assert_eq!(expanded[1].comp_method, "KLD");
        assert!(expanded[1].balanced);
        assert_eq!(expanded[1].win_size, 2000);
        assert!(expanded.iter().all(|c| c.param_sets.is_empty()));
    }

    #[test]
    fn test_expanded_without_param_sets_is_base() {
        let config = minimal_config();
        let expanded = config.expanded();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].comp_method, config.comp_method);
    }

    #[test]
    fn test_excluded_speaker_set_merges_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[10, 11]").unwrap();

        let mut config = minimal_config();
        config.excluded_speakers = vec![1, 2];
        config.excluded_speakers_file = Some(file.path().to_path_buf());

        let excluded = config.excluded_speaker_set().unwrap();
        assert_eq!(excluded, [1, 2, 10, 11].into_iter().collect());
    }

    #[test]
    fn test_split_options_cap_follows_contrib_limit() {
        let mut config = minimal_config();
        assert_eq!(config.split_options().contribs_per_speaker, None);
        config.contrib_limit = true;
        assert_eq!(config.split_options().contribs_per_speaker, Some(5));
    }
}
