// Cohort grouping: turns the topical corpus into named speaker groups that
// the samplers and comparison methods operate on. Every strategy yields
// groups in a deterministic order.

use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, Result};

use crate::corpus::Contribution;

/// Contribution fields a grouping rule can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Party,
    RefStance,
    DealVote,
    BennVote,
}

impl GroupField {
    pub fn parse(name: &str) -> Result<GroupField> {
        match name {
            "party" => Ok(GroupField::Party),
            "ref_stance" => Ok(GroupField::RefStance),
            "deal_vote" => Ok(GroupField::DealVote),
            "benn_vote" => Ok(GroupField::BennVote),
            other => Err(anyhow!("Unknown grouping field {:?}", other)),
        }
    }

    fn value<'a>(&self, contribution: &'a Contribution) -> Option<&'a str> {
        match self {
            GroupField::Party => Some(contribution.party.as_str()),
            GroupField::RefStance => contribution.ref_stance.as_deref(),
            GroupField::DealVote => contribution.deal_vote.as_deref(),
            GroupField::BennVote => contribution.benn_vote.as_deref(),
        }
    }
}

// Constituency referendum binarization. Leave share below 50 means the
// constituency voted remain.
fn constituency_stance(leave_share: f64) -> &'static str {
    if leave_share < 50.0 {
        "remain"
    } else {
        "leave"
    }
}

#[derive(Debug, Clone)]
pub enum GroupingStrategy {
    /// One group per listed value of a single field (groups may be empty).
    ByField {
        field: GroupField,
        values: Vec<String>,
    },
    /// Constituency referendum result crossed with the member's own stance,
    /// named `con-{constituency}-mp-{member}`. Rows with an unknown stance
    /// or no constituency figure are skipped; empty combos are not emitted.
    ByCombinedFields,
    /// Externally supplied named speaker-id lists.
    ByExternalIdList {
        lists: BTreeMap<String, Vec<i64>>,
    },
    /// Named groups, each requiring every listed (field, value) pair to
    /// match. Covers division-vote cohorts like remain-voting members who
    /// backed both the deal and the Benn act.
    Composite {
        groups: Vec<(String, Vec<(GroupField, String)>)>,
    },
    /// Single "all" group holding the whole corpus.
    WholeCorpus,
}

impl GroupingStrategy {
    /// Standard two-party cohort.
    pub fn parties() -> Self {
        GroupingStrategy::ByField {
            field: GroupField::Party,
            values: vec!["Conservative".to_string(), "Labour".to_string()],
        }
    }

    /// Referendum stance cohort.
    pub fn stances() -> Self {
        GroupingStrategy::ByField {
            field: GroupField::RefStance,
            values: vec!["leave".to_string(), "remain".to_string()],
        }
    }

    /// Splits a corpus into named cohorts.
    pub fn partition<'a>(
        &self,
        corpus: &[&'a Contribution],
    ) -> Vec<(String, Vec<&'a Contribution>)> {
        match self {
            GroupingStrategy::ByField { field, values } => values
                .iter()
                .map(|value| {
                    let members: Vec<&Contribution> = corpus
                        .iter()
                        .filter(|c| field.value(c) == Some(value.as_str()))
                        .copied()
                        .collect();
                    (value.clone(), members)
                })
                .collect(),

            GroupingStrategy::ByCombinedFields => {
                let mut buckets: BTreeMap<String, Vec<&Contribution>> = BTreeMap::new();
                for contribution in corpus {
                    let member_stance = match contribution.ref_stance.as_deref() {
                        Some(s) if s != "unknown" => s,
                        _ => continue,
                    };
                    let leave_share = match contribution.constituency_leave {
                        Some(share) => share,
                        None => continue,
                    };
                    let name = format!(
                        "con-{}-mp-{}",
                        constituency_stance(leave_share),
                        member_stance
                    );
                    buckets.entry(name).or_default().push(contribution);
                }
                buckets.into_iter().collect()
            }

            GroupingStrategy::ByExternalIdList { lists } => lists
                .iter()
                .map(|(name, ids)| {
                    let id_set: HashSet<i64> = ids.iter().copied().collect();
                    let members: Vec<&Contribution> = corpus
                        .iter()
                        .filter(|c| id_set.contains(&c.speaker_id))
                        .copied()
                        .collect();
                    (name.clone(), members)
                })
                .collect(),

            GroupingStrategy::Composite { groups } => groups
                .iter()
                .map(|(name, requirements)| {
                    let members: Vec<&Contribution> = corpus
                        .iter()
                        .filter(|c| {
                            requirements
                                .iter()
                                .all(|(field, value)| field.value(c) == Some(value.as_str()))
                        })
                        .copied()
                        .collect();
                    (name.clone(), members)
                })
                .collect(),

            GroupingStrategy::WholeCorpus => vec![("all".to_string(), corpus.to_vec())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::make_contribution;

    fn sample_corpus() -> Vec<Contribution> {
        let mut corpus = Vec::new();

        let mut c = make_contribution(1, 10, "2017-01-01", "first speech");
        c.party = "Conservative".to_string();
        c.ref_stance = Some("leave".to_string());
        c.deal_vote = Some("aye".to_string());
        c.benn_vote = Some("no".to_string());
        c.constituency_leave = Some(61.2);
        corpus.push(c);

        let mut c = make_contribution(2, 11, "2017-01-02", "second speech");
        c.party = "Labour".to_string();
        c.ref_stance = Some("remain".to_string());
        c.deal_vote = Some("no".to_string());
        c.benn_vote = Some("aye".to_string());
        c.constituency_leave = Some(43.9);
        corpus.push(c);

        let mut c = make_contribution(3, 12, "2017-01-03", "third speech");
        c.party = "Conservative".to_string();
        c.ref_stance = Some("remain".to_string());
        c.deal_vote = Some("aye".to_string());
        c.benn_vote = Some("aye".to_string());
        c.constituency_leave = Some(55.0);
        corpus.push(c);

        let mut c = make_contribution(4, 13, "2017-01-04", "fourth speech");
        c.party = "Scottish National Party".to_string();
        c.ref_stance = Some("unknown".to_string());
        corpus.push(c);

        corpus
    }

    fn refs(corpus: &[Contribution]) -> Vec<&Contribution> {
        corpus.iter().collect()
    }

    fn ids(members: &[&Contribution]) -> Vec<i64> {
        members.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_party_grouping_keeps_declared_order() {
        let corpus = sample_corpus();
        let groups = GroupingStrategy::parties().partition(&refs(&corpus));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Conservative");
        assert_eq!(ids(&groups[0].1), vec![1, 3]);
        assert_eq!(groups[1].0, "Labour");
        assert_eq!(ids(&groups[1].1), vec![2]);
    }

    #[test]
    fn test_stance_grouping_ignores_unknown() {
        let corpus = sample_corpus();
        let groups = GroupingStrategy::stances().partition(&refs(&corpus));
        assert_eq!(ids(&groups[0].1), vec![1]); // leave
        assert_eq!(ids(&groups[1].1), vec![2, 3]); // remain
    }

    #[test]
    fn test_combined_fields_binarize_and_skip() {
        let corpus = sample_corpus();
        let groups = GroupingStrategy::ByCombinedFields.partition(&refs(&corpus));
        let names: Vec<&str> = groups.iter().map(|(n, _)| n.as_str()).collect();
        // Contribution 4 has unknown stance and no constituency share, so
        // only three combos appear; 55.0 binarizes to leave.
        assert_eq!(
            names,
            vec!["con-leave-mp-leave", "con-leave-mp-remain", "con-remain-mp-remain"]
        );
        assert_eq!(ids(&groups[1].1), vec![3]);
    }

    #[test]
    fn test_composite_requires_every_field() {
        let corpus = sample_corpus();
        let strategy = GroupingStrategy::Composite {
            groups: vec![(
                "ref-remain-deal-aye-benn-aye".to_string(),
                vec![
                    (GroupField::RefStance, "remain".to_string()),
                    (GroupField::DealVote, "aye".to_string()),
                    (GroupField::BennVote, "aye".to_string()),
                ],
            )],
        };
        let groups = strategy.partition(&refs(&corpus));
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0].1), vec![3]);
    }

    #[test]
    fn test_external_id_lists_select_speakers() {
        let corpus = sample_corpus();
        let mut lists = BTreeMap::new();
        lists.insert("rebels".to_string(), vec![11, 13]);
        lists.insert("loyalists".to_string(), vec![10]);
        let strategy = GroupingStrategy::ByExternalIdList { lists };
        let groups = strategy.partition(&refs(&corpus));
        // BTreeMap order: loyalists before rebels.
        assert_eq!(groups[0].0, "loyalists");
        assert_eq!(ids(&groups[0].1), vec![1]);
        assert_eq!(groups[1].0, "rebels");
        assert_eq!(ids(&groups[1].1), vec![2, 4]);
    }

    #[test]
    fn test_whole_corpus_single_group() {
        let corpus = sample_corpus();
        let groups = GroupingStrategy::WholeCorpus.partition(&refs(&corpus));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "all");
        assert_eq!(groups[0].1.len(), corpus.len());
    }

    #[test]
    fn test_group_field_parse() {
        assert!(GroupField::parse("party").is_ok());
        assert!(GroupField::parse("benn_vote").is_ok());
        assert!(GroupField::parse("constituency").is_err());
    }
}
