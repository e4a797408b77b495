// Corpus loading and preparation: contribution records, tokenization, and the
// topical/reference split.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

use mj_io::read_pathbuf_to_mem;

/// One parliamentary contribution. Immutable once loaded; the pipeline only
/// ever filters and slices these.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub id: i64,
    pub speaker_id: i64,
    pub party: String,
    pub date: NaiveDateTime,
    pub text: String,
    pub topic: Option<String>,
    pub section: Option<String>,
    pub ref_stance: Option<String>,
    pub deal_vote: Option<String>,
    pub benn_vote: Option<String>,
    pub constituency_leave: Option<f64>,
    pub tokens: Vec<String>,
}

// Wire form of one JSONL row. Dates arrive as strings and tokens are
// computed at load, so this never escapes the loader.
#[derive(Deserialize)]
struct RawContribution {
    id: i64,
    speaker_id: i64,
    party: String,
    date: String,
    text: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    ref_stance: Option<String>,
    #[serde(default)]
    deal_vote: Option<String>,
    #[serde(default)]
    benn_vote: Option<String>,
    #[serde(default)]
    constituency_leave: Option<f64>,
}

/// Parses `"YYYY-MM-DD HH:MM:SS"`, falling back to a bare `"YYYY-MM-DD"`
/// (midnight) for rows exported without a time component.
pub fn parse_contribution_date(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow!("Unparseable contribution date {:?}: {:?}", raw, e))?;
    Ok(day.and_hms_opt(0, 0, 0).unwrap())
}

/// Deterministic tokenizer shared by model building and keyword extraction.
/// Lowercases, rewrites digit runs (including decimals) to a `NUMBER` marker,
/// and splits on Unicode word boundaries, so punctuation never reaches the
/// models. The marker stays uppercase and cannot collide with the word
/// "number" in lowercased text.
pub struct Tokenizer {
    number_re: Regex,
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer {
            number_re: Regex::new(r"\d+(\.\d+)*").unwrap(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let marked = self.number_re.replace_all(&lowered, "NUMBER");
        marked.unicode_words().map(|w| w.to_string()).collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::new()
    }
}

/// Row filters applied while loading.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub excluded_speakers: HashSet<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    // Minimum token count to keep a row; kept rows are truncated to this
    // length. Zero disables both.
    pub token_limit: usize,
}

/// Reads a JSONL corpus (gz/zstd transparent), tokenizes, filters, and
/// returns contributions in chronological order. Malformed rows are an error,
/// not a skip.
pub fn load_corpus(
    path: &PathBuf,
    tokenizer: &Tokenizer,
    opts: &LoadOptions,
) -> Result<Vec<Contribution>> {
    let reader = read_pathbuf_to_mem(path)?;
    let mut contributions: Vec<Contribution> = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawContribution = serde_json::from_str(&line)
            .with_context(|| format!("Malformed contribution row on line {}", line_num + 1))?;
        let date = parse_contribution_date(&raw.date)
            .with_context(|| format!("Bad date on line {}", line_num + 1))?;

        if opts.excluded_speakers.contains(&raw.speaker_id) {
            continue;
        }
        let day = date.date();
        if day < opts.start_date || day > opts.end_date {
            continue;
        }

        let mut tokens = tokenizer.tokenize(&raw.text);
        if opts.token_limit > 0 {
            if tokens.len() < opts.token_limit {
                continue;
            }
            tokens.truncate(opts.token_limit);
        }

        contributions.push(Contribution {
            id: raw.id,
            speaker_id: raw.speaker_id,
            party: raw.party,
            date,
            text: raw.text,
            topic: raw.topic,
            section: raw.section,
            ref_stance: raw.ref_stance,
            deal_vote: raw.deal_vote,
            benn_vote: raw.benn_vote,
            constituency_leave: raw.constituency_leave,
            tokens,
        });
    }

    // Stable sort: rows on the same timestamp keep file order, which the
    // seeded samplers rely on for reproducibility.
    contributions.sort_by_key(|c| c.date);
    Ok(contributions)
}

/// Speaker ids to drop (procedural speakers and similar), one JSON array.
pub fn load_excluded_speakers(path: &PathBuf) -> Result<HashSet<i64>> {
    let reader = read_pathbuf_to_mem(path)?;
    let ids: Vec<i64> = serde_json::from_reader(reader)
        .with_context(|| format!("Unparseable excluded-speaker file {:?}", path))?;
    Ok(ids.into_iter().collect())
}

/// Topical filter compiled once from mention/section term lists. Terms are
/// regex fragments matched against lowercased text, joined into a single
/// alternation.
pub struct TopicMatcher {
    mention_re: Option<Regex>,
    section_re: Option<Regex>,
}

impl TopicMatcher {
    pub fn new(mention_terms: &[String], section_terms: &[String]) -> Result<Self> {
        Ok(TopicMatcher {
            mention_re: compile_terms(mention_terms)?,
            section_re: compile_terms(section_terms)?,
        })
    }

    /// True when the lowercased text matches the mention terms, or the row
    /// has a section and its lowercased form matches the section terms.
    pub fn is_topical(&self, contribution: &Contribution) -> bool {
        if let Some(re) = &self.mention_re {
            if re.is_match(&contribution.text.to_lowercase()) {
                return true;
            }
        }
        if let Some(re) = &self.section_re {
            if let Some(section) = &contribution.section {
                if re.is_match(&section.to_lowercase()) {
                    return true;
                }
            }
        }
        false
    }
}

fn compile_terms(terms: &[String]) -> Result<Option<Regex>> {
    if terms.is_empty() {
        return Ok(None);
    }
    let pattern = format!("({})", terms.join("|"));
    let re = Regex::new(&pattern)
        .map_err(|e| anyhow!("Bad topic term pattern {:?}: {:?}", pattern, e))?;
    Ok(Some(re))
}

/// Splits a corpus into (topical, non-topical) halves by reference.
pub fn topical_split<'a>(
    corpus: &'a [Contribution],
    matcher: &TopicMatcher,
) -> (Vec<&'a Contribution>, Vec<&'a Contribution>) {
    let mut topical = Vec::new();
    let mut rest = Vec::new();
    for contribution in corpus {
        if matcher.is_topical(contribution) {
            topical.push(contribution);
        } else {
            rest.push(contribution);
        }
    }
    (topical, rest)
}

// Shared fixture for unit tests across the crate.
#[cfg(test)]
pub(crate) fn make_contribution(id: i64, speaker_id: i64, date: &str, text: &str) -> Contribution {
    let tokenizer = Tokenizer::new();
    Contribution {
        id,
        speaker_id,
        party: "Labour".to_string(),
        date: parse_contribution_date(date).unwrap(),
        text: text.to_string(),
        topic: None,
        section: None,
        ref_stance: None,
        deal_vote: None,
        benn_vote: None,
        constituency_leave: None,
        tokens: tokenizer.tokenize(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_with_and_without_time() {
        let full = parse_contribution_date("2016-06-23 14:30:00").unwrap();
        assert_eq!(full.date(), NaiveDate::from_ymd_opt(2016, 6, 23).unwrap());
        let bare = parse_contribution_date("2016-06-23").unwrap();
        assert_eq!(bare, full.date().and_hms_opt(0, 0, 0).unwrap());
        assert!(parse_contribution_date("23/06/2016").is_err());
    }

    #[test]
    fn test_tokenizer_lowercases_and_strips_punctuation() {
        let tokenizer = Tokenizer::new();
        let toks = tokenizer.tokenize("The Honourable Member, I believe, is mistaken!");
        assert_eq!(
            toks,
            vec!["the", "honourable", "member", "i", "believe", "is", "mistaken"]
        );
    }

    #[test]
    fn test_tokenizer_rewrites_numbers() {
        let tokenizer = Tokenizer::new();
        let toks = tokenizer.tokenize("Inflation rose 2.5 per cent in 2019");
        assert_eq!(toks, vec!["inflation", "rose", "NUMBER", "per", "cent", "in", "NUMBER"]);
        // The marker is distinct from the literal word.
        let toks = tokenizer.tokenize("a number of 42 cases");
        assert_eq!(toks, vec!["a", "number", "of", "NUMBER", "cases"]);
    }

    #[test]
    fn test_topic_matcher_text_and_section() {
        let matcher = TopicMatcher::new(
            &["\\beu\\b".to_string(), "brexit".to_string()],
            &["europe".to_string()],
        )
        .unwrap();

        let by_text = make_contribution(1, 10, "2017-01-01", "Brexit means brexit");
        assert!(matcher.is_topical(&by_text));

        let mut by_section = make_contribution(2, 10, "2017-01-01", "I beg to move");
        by_section.section = Some("European Union (Withdrawal) Bill".to_string());
        assert!(matcher.is_topical(&by_section));

        let neither = make_contribution(3, 10, "2017-01-01", "The euphoria was palpable");
        assert!(!matcher.is_topical(&neither));
    }

    #[test]
    fn test_topical_split_partitions_corpus() {
        let matcher = TopicMatcher::new(&["brexit".to_string()], &[]).unwrap();
        let corpus = vec![
            make_contribution(1, 10, "2017-01-01", "brexit debate"),
            make_contribution(2, 11, "2017-01-02", "health budget"),
        ];
        let (topical, rest) = topical_split(&corpus, &matcher);
        assert_eq!(topical.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(rest.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_empty_term_lists_match_nothing() {
        let matcher = TopicMatcher::new(&[], &[]).unwrap();
        let c = make_contribution(1, 10, "2017-01-01", "anything at all");
        assert!(!matcher.is_topical(&c));
    }
}
