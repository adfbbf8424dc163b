//! Shared workflow record and the per-field merge policies applied by the driver.
//!
//! Stages never mutate [`WorkflowState`]; they return a [`StateUpdate`] and the
//! driver folds it in through [`WorkflowState::apply`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Atomic, attributable claim extracted from a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub content: String,
    pub source: String,
    pub relevance_score: f64,
}

impl Fact {
    pub fn new(content: impl Into<String>, source: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            relevance_score,
        }
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::of(&self.content)
    }
}

/// SHA-256 of a fact's content, exact bytes (case and whitespace sensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(content: &str) -> Self {
        Self(Sha256::digest(content.as_bytes()).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub query: String,
    pub outcome: String,
}

impl StepLog {
    pub fn new(query: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            outcome: outcome.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
    pub score: f64,
}

/// Insertion-ordered fact set keyed by content digest.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: Vec<Fact>,
    digests: HashSet<ContentDigest>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a fact with identical content is already stored.
    pub fn insert(&mut self, fact: Fact) -> bool {
        if !self.digests.insert(fact.digest()) {
            return false;
        }
        self.facts.push(fact);
        true
    }

    /// Inserts every unseen fact and returns how many were added.
    pub fn extend_unique<I>(&mut self, facts: I) -> usize
    where
        I: IntoIterator<Item = Fact>,
    {
        let mut added = 0;
        for fact in facts {
            if self.insert(fact) {
                added += 1;
            }
        }
        added
    }

    /// Facts from `candidates` that are neither stored nor repeated earlier in
    /// the batch. First occurrence wins; the store itself is left untouched.
    pub fn filter_new<I>(&self, candidates: I) -> Vec<Fact>
    where
        I: IntoIterator<Item = Fact>,
    {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|fact| {
                let digest = fact.digest();
                !self.digests.contains(&digest) && seen.insert(digest)
            })
            .collect()
    }

    pub fn contains_content(&self, content: &str) -> bool {
        self.digests.contains(&ContentDigest::of(content))
    }

    /// Distinct source URLs, sorted for stable output.
    pub fn sources(&self) -> BTreeSet<&str> {
        self.facts.iter().map(|fact| fact.source.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.facts.iter()
    }

    pub fn to_vec(&self) -> Vec<Fact> {
        self.facts.clone()
    }
}

impl<'a> IntoIterator for &'a FactStore {
    type Item = &'a Fact;
    type IntoIter = std::slice::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Reviewer verdict carried in a [`StateUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueVerdict {
    pub approved: bool,
    pub feedback: String,
}

/// The record threaded through every stage of one run.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    task: String,
    pub plan: Vec<String>,
    pub gathered_facts: FactStore,
    pub past_steps: Vec<StepLog>,
    pub temp_raw_results: Vec<RawSearchResult>,
    pub iteration_count: u32,
    pub critique_count: u32,
    pub report_content: String,
    pub critique_feedback: String,
    pub is_approved: bool,
}

impl WorkflowState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            plan: Vec::new(),
            gathered_facts: FactStore::new(),
            past_steps: Vec::new(),
            temp_raw_results: Vec::new(),
            iteration_count: 0,
            critique_count: 0,
            report_content: String::new(),
            critique_feedback: String::new(),
            is_approved: false,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Fold a stage's partial update into the state, one merge policy per field.
    pub fn apply(&mut self, update: StateUpdate) -> ChangeSummary {
        let mut summary = ChangeSummary::default();

        if let Some(plan) = update.plan {
            summary.push(format!("plan replaced ({} queries)", plan.len()));
            replace(&mut self.plan, plan);
        }
        if !update.new_facts.is_empty() {
            let added = merge_facts(&mut self.gathered_facts, update.new_facts);
            summary.push(format!(
                "+{added} facts (total {})",
                self.gathered_facts.len()
            ));
        }
        if !update.new_steps.is_empty() {
            summary.push(format!("+{} steps", update.new_steps.len()));
            append(&mut self.past_steps, update.new_steps);
        }
        if let Some(raw) = update.raw_results {
            summary.push(format!("raw results set to {}", raw.len()));
            replace(&mut self.temp_raw_results, raw);
        }
        if update.advance_iteration {
            increment(&mut self.iteration_count);
            summary.push(format!("iteration {}", self.iteration_count));
        }
        if let Some(report) = update.report {
            summary.push(format!("report replaced ({} chars)", report.chars().count()));
            replace(&mut self.report_content, report);
        }
        if let Some(verdict) = update.critique {
            increment(&mut self.critique_count);
            summary.push(format!(
                "critique {} (approved: {})",
                self.critique_count, verdict.approved
            ));
            replace(&mut self.is_approved, verdict.approved);
            replace(&mut self.critique_feedback, verdict.feedback);
        }

        summary
    }
}

fn replace<T>(slot: &mut T, value: T) {
    *slot = value;
}

fn append<T>(slot: &mut Vec<T>, values: Vec<T>) {
    slot.extend(values);
}

fn merge_facts(store: &mut FactStore, facts: Vec<Fact>) -> usize {
    store.extend_unique(facts)
}

fn increment(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

/// Partial update produced by one stage pass. Empty fields leave state untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub plan: Option<Vec<String>>,
    pub new_facts: Vec<Fact>,
    pub new_steps: Vec<StepLog>,
    pub raw_results: Option<Vec<RawSearchResult>>,
    pub advance_iteration: bool,
    pub report: Option<String>,
    pub critique: Option<CritiqueVerdict>,
}

impl StateUpdate {
    pub fn with_plan(plan: Vec<String>) -> Self {
        Self {
            plan: Some(plan),
            ..Self::default()
        }
    }
}

/// Human-readable description of what one `apply` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary(Vec<String>);

impl ChangeSummary {
    fn push(&mut self, entry: String) {
        self.0.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no changes");
        }
        f.write_str(&self.0.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(content: &str, source: &str) -> Fact {
        Fact::new(content, source, 0.9)
    }

    #[test]
    fn duplicate_content_is_kept_once() {
        let mut store = FactStore::new();
        let added = store.extend_unique([
            fact("A", "https://a.example"),
            fact("A", "https://other.example"),
            fact("B", "https://b.example"),
        ]);

        assert_eq!(added, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.iter().next().map(|f| f.source.as_str()), Some("https://a.example"));
    }

    #[test]
    fn dedup_is_order_independent_in_size() {
        let mut forward = FactStore::new();
        forward.extend_unique([fact("A", "u"), fact("A", "u"), fact("B", "u")]);
        let mut reverse = FactStore::new();
        reverse.extend_unique([fact("B", "u"), fact("A", "u"), fact("A", "u")]);
        assert_eq!(forward.len(), reverse.len());
    }

    #[test]
    fn digest_is_case_and_whitespace_sensitive() {
        let mut store = FactStore::new();
        assert!(store.insert(fact("Rust is fast", "u")));
        assert!(store.insert(fact("rust is fast", "u")));
        assert!(store.insert(fact("Rust is fast ", "u")));
        assert!(!store.insert(fact("Rust is fast", "v")));
        assert!(store.contains_content("rust is fast"));
    }

    #[test]
    fn filter_new_checks_store_then_batch() {
        let mut store = FactStore::new();
        store.insert(fact("known", "u1"));

        let fresh = store.filter_new([
            fact("known", "u2"),
            fact("new", "u3"),
            fact("new", "u4"),
        ]);

        assert_eq!(fresh, vec![fact("new", "u3")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sources_are_distinct() {
        let mut store = FactStore::new();
        store.extend_unique([fact("a", "u1"), fact("b", "u1"), fact("c", "u2")]);
        assert_eq!(store.sources().len(), 2);
    }

    #[test]
    fn apply_merges_each_field_by_policy() {
        let mut state = WorkflowState::new("task");
        state.apply(StateUpdate {
            plan: Some(vec!["q1".into()]),
            new_steps: vec![StepLog::new("q1", "Found 1 new sources")],
            raw_results: Some(vec![RawSearchResult {
                title: "t".into(),
                content: "c".into(),
                url: "u".into(),
                score: 0.9,
            }]),
            advance_iteration: true,
            ..StateUpdate::default()
        });
        state.apply(StateUpdate {
            plan: Some(Vec::new()),
            new_steps: vec![StepLog::new("q2", "No relevant results found")],
            raw_results: Some(Vec::new()),
            advance_iteration: true,
            new_facts: vec![fact("A", "u"), fact("A", "u")],
            ..StateUpdate::default()
        });

        assert!(state.plan.is_empty());
        assert_eq!(state.past_steps.len(), 2);
        assert!(state.temp_raw_results.is_empty());
        assert_eq!(state.iteration_count, 2);
        assert_eq!(state.gathered_facts.len(), 1);
        assert_eq!(state.critique_count, 0);
    }

    #[test]
    fn critique_replaces_verdict_and_counts() {
        let mut state = WorkflowState::new("task");
        state.apply(StateUpdate {
            critique: Some(CritiqueVerdict {
                approved: false,
                feedback: "Cite the second claim".into(),
            }),
            ..StateUpdate::default()
        });
        let summary = state.apply(StateUpdate {
            critique: Some(CritiqueVerdict {
                approved: true,
                feedback: "Looks complete and well sourced".into(),
            }),
            ..StateUpdate::default()
        });

        assert_eq!(state.critique_count, 2);
        assert!(state.is_approved);
        assert_eq!(state.critique_feedback, "Looks complete and well sourced");
        assert!(summary.to_string().contains("critique 2"));
    }

    #[test]
    fn empty_update_changes_nothing() {
        let mut state = WorkflowState::new("task");
        let summary = state.apply(StateUpdate::default());
        assert!(summary.is_empty());
        assert_eq!(summary.to_string(), "no changes");
    }
}
