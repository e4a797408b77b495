// Keyword extraction: words overrepresented in a group's topical speech
// relative to its non-topical speech, by smoothed log2 frequency ratio.

// External crates
use anyhow::{bail, Error, Result};
use serde::Serialize;

// Standard library
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::create_dir_all;
use std::path::PathBuf;

// Internal crate imports
use mj_io::write_mem_to_pathbuf;

use crate::config::read_config;
use crate::corpus::{load_corpus, topical_split, Contribution, Tokenizer, TopicMatcher};

#[derive(Debug, Clone, Serialize)]
pub struct KeywordEntry {
    pub word: String,
    pub count: u64,
    pub comp_count: u64,
    pub log_ratio: f64,
}

fn count_tokens(rows: &[&Contribution]) -> (HashMap<String, u64>, u64) {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;
    for contribution in rows {
        for token in &contribution.tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
            total += 1;
        }
    }
    (counts, total)
}

/// Smoothed log2 frequency ratios over the union vocabulary, filtered to
/// words with a target count above `min_count` and a ratio above
/// `min_log_ratio`, sorted by ratio descending (ties alphabetical). Either
/// side being empty yields no keywords.
pub fn keywords_between(
    target: &[&Contribution],
    comparison: &[&Contribution],
    min_count: u64,
    min_log_ratio: f64,
) -> Vec<KeywordEntry> {
    let (target_counts, target_len) = count_tokens(target);
    let (comparison_counts, comparison_len) = count_tokens(comparison);
    if target_len == 0 || comparison_len == 0 {
        return Vec::new();
    }

    let vocabulary: BTreeSet<&String> = target_counts
        .keys()
        .chain(comparison_counts.keys())
        .collect();

    let mut entries = Vec::new();
    for word in vocabulary {
        let count = target_counts.get(word).copied().unwrap_or(0);
        let comp_count = comparison_counts.get(word).copied().unwrap_or(0);
        let p_target = (count as f64 + 0.5) / target_len as f64;
        let p_comparison = (comp_count as f64 + 0.5) / comparison_len as f64;
        let log_ratio = (p_target / p_comparison).log2();
        if count > min_count && log_ratio > min_log_ratio {
            entries.push(KeywordEntry {
                word: word.clone(),
                count,
                comp_count,
                log_ratio,
            });
        }
    }
    entries.sort_by(|a, b| b.log_ratio.total_cmp(&a.log_ratio));
    entries
}

/// Per group: keywords of its topical contributions against its non-topical
/// ones, one JSON report per group.
pub fn execute_keywords(
    config_path: &PathBuf,
    corpus_override: Option<&PathBuf>,
    output_override: Option<&PathBuf>,
) -> Result<(), Error> {
    let mut config = read_config(config_path)?;
    if let Some(corpus) = corpus_override {
        config.corpus = corpus.clone();
    }
    if let Some(output_dir) = output_override {
        config.output_dir = output_dir.clone();
    }
    config.validate()?;

    println!("Loading corpus from {:?}...", config.corpus);
    let tokenizer = Tokenizer::new();
    let corpus = load_corpus(&config.corpus, &tokenizer, &config.load_options()?)?;
    println!("Loaded {} contributions", corpus.len());
    if corpus.is_empty() {
        bail!("Corpus {:?} is empty after filtering", config.corpus);
    }

    let matcher = TopicMatcher::new(&config.topic_mention_terms, &config.topic_section_terms)?;
    let (topical, rest) = topical_split(&corpus, &matcher);
    println!(
        "{} topical / {} comparison contributions",
        topical.len(),
        rest.len()
    );

    let strategy = config.grouping_strategy()?;
    let groups = strategy.partition(&topical);
    let comparison_by_name: BTreeMap<String, Vec<&Contribution>> =
        strategy.partition(&rest).into_iter().collect();

    create_dir_all(&config.output_dir)?;
    let empty: Vec<&Contribution> = Vec::new();
    for (name, target_rows) in &groups {
        let comparison_rows = comparison_by_name.get(name).unwrap_or(&empty);
        let entries = keywords_between(
            target_rows,
            comparison_rows,
            config.keyword_min_count,
            config.keyword_min_log_ratio,
        );
        println!("Group {}: {} keyword(s)", name, entries.len());

        let output_file = config.output_dir.join(format!("keywords_{}.json", name));
        let output_bytes = serde_json::to_vec(&entries)?;
        write_mem_to_pathbuf(&output_bytes, &output_file)?;
        println!("Keywords saved to: {:?}", output_file);
    }
    Ok(())
}
