use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use crate::{
    RawSearchResult, SearchProvider, StageError, StageId, StateUpdate, StepLog, WorkflowState,
    metrics,
};

const NO_RESULTS: &str = "No relevant results found";

/// Runs every planned query concurrently, gates on relevance and drops
/// URLs that are already known.
pub struct SearchGateway {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
    min_score: f64,
}

impl SearchGateway {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize, min_score: f64) -> Self {
        Self {
            provider,
            max_results,
            min_score,
        }
    }

    /// One entry per query, in plan order. Failed queries yield an empty list.
    async fn search_all(&self, queries: &[String]) -> Vec<(String, Vec<RawSearchResult>)> {
        let handles: Vec<_> = queries
            .iter()
            .map(|query| {
                let provider = Arc::clone(&self.provider);
                let query = query.clone();
                let max_results = self.max_results;
                tokio::spawn(async move { provider.search(&query, max_results).await })
            })
            .collect();

        let outcomes = join_all(handles).await;

        queries
            .iter()
            .cloned()
            .zip(outcomes)
            .map(|(query, outcome)| {
                let results = match outcome {
                    Ok(Ok(results)) => self.quality_gate(&query, results),
                    Ok(Err(err)) => {
                        warn!(%query, error = %err, "search failed; treating as no results");
                        metrics::record_capability_failure("search");
                        Vec::new()
                    }
                    Err(err) => {
                        warn!(%query, error = %err, "search task aborted; treating as no results");
                        metrics::record_capability_failure("search");
                        Vec::new()
                    }
                };
                (query, results)
            })
            .collect()
    }

    fn quality_gate(&self, query: &str, results: Vec<RawSearchResult>) -> Vec<RawSearchResult> {
        let total = results.len();
        let kept: Vec<_> = results
            .into_iter()
            .filter(|result| result.score >= self.min_score)
            .collect();
        if kept.len() < total {
            debug!(
                query,
                dropped = total - kept.len(),
                min_score = self.min_score,
                "results below relevance threshold dropped"
            );
        }
        kept
    }
}

#[async_trait]
impl Stage for SearchGateway {
    fn id(&self) -> StageId {
        StageId::Search
    }

    #[instrument(name = "stage.search", skip_all, fields(queries = state.plan.len()))]
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, StageError> {
        let mut seen_queries = HashSet::new();
        let queries: Vec<String> = state
            .plan
            .iter()
            .filter(|query| seen_queries.insert(query.as_str()))
            .cloned()
            .collect();

        let batches = if queries.is_empty() {
            Vec::new()
        } else {
            self.search_all(&queries).await
        };

        let mut known_urls: HashSet<String> = state
            .gathered_facts
            .sources()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut fresh = Vec::new();
        let mut steps = Vec::with_capacity(batches.len());

        for (query, results) in batches {
            let new_results: Vec<_> = results
                .into_iter()
                .filter(|result| known_urls.insert(result.url.clone()))
                .collect();
            let outcome = if new_results.is_empty() {
                NO_RESULTS.to_string()
            } else {
                format!("Found {} new sources", new_results.len())
            };
            steps.push(StepLog::new(query, outcome));
            fresh.extend(new_results);
        }

        info!(
            new_sources = fresh.len(),
            iteration = state.iteration_count + 1,
            "search pass complete"
        );

        Ok(StateUpdate {
            new_steps: steps,
            raw_results: Some(fresh),
            advance_iteration: true,
            ..StateUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fact;
    use crate::test_support::{StaticSearch, raw};

    fn gateway(search: StaticSearch) -> SearchGateway {
        SearchGateway::new(Arc::new(search), 5, 0.6)
    }

    fn urls(update: &StateUpdate) -> Vec<&str> {
        update
            .raw_results
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|r| r.url.as_str())
            .collect()
    }

    #[tokio::test]
    async fn drops_urls_already_backing_facts() {
        let search = StaticSearch::new().with("q1", vec![raw("u1", 0.9), raw("u2", 0.9)]);
        let mut state = WorkflowState::new("task text here");
        state.gathered_facts.insert(Fact::new("known", "u1", 0.9));
        state.plan = vec!["q1".into()];

        let update = gateway(search).run(&state).await.expect("search");

        assert_eq!(urls(&update), vec!["u2"]);
        assert_eq!(update.new_steps, vec![StepLog::new("q1", "Found 1 new sources")]);
    }

    #[tokio::test]
    async fn dedups_across_queries_first_wins() {
        let search = StaticSearch::new()
            .with("q1", vec![raw("shared", 0.9), raw("a", 0.8)])
            .with("q2", vec![raw("shared", 0.95)]);
        let mut state = WorkflowState::new("task text here");
        state.plan = vec!["q1".into(), "q2".into()];

        let update = gateway(search).run(&state).await.expect("search");

        assert_eq!(urls(&update), vec!["shared", "a"]);
        assert_eq!(
            update.new_steps,
            vec![
                StepLog::new("q1", "Found 2 new sources"),
                StepLog::new("q2", NO_RESULTS),
            ]
        );
    }

    #[tokio::test]
    async fn quality_gate_is_inclusive_at_threshold() {
        let search = StaticSearch::new().with(
            "q1",
            vec![raw("low", 0.59), raw("edge", 0.6), raw("high", 0.99)],
        );
        let mut state = WorkflowState::new("task text here");
        state.plan = vec!["q1".into()];

        let update = gateway(search).run(&state).await.expect("search");
        assert_eq!(urls(&update), vec!["edge", "high"]);
    }

    #[tokio::test]
    async fn failing_query_does_not_abort_batch() {
        let search = StaticSearch::new()
            .with("ok", vec![raw("u1", 0.9)])
            .failing_on("broken");
        let mut state = WorkflowState::new("task text here");
        state.plan = vec!["broken".into(), "ok".into()];

        let update = gateway(search).run(&state).await.expect("search never fails");

        assert_eq!(urls(&update), vec!["u1"]);
        assert_eq!(update.new_steps[0], StepLog::new("broken", NO_RESULTS));
        assert!(update.advance_iteration);
    }

    #[tokio::test]
    async fn empty_plan_still_advances_iteration() {
        let search = Arc::new(StaticSearch::new());
        let state = WorkflowState::new("task text here");

        let update = SearchGateway::new(search.clone(), 5, 0.6)
            .run(&state)
            .await
            .expect("search");

        assert!(update.advance_iteration);
        assert!(update.new_steps.is_empty());
        assert_eq!(update.raw_results, Some(Vec::new()));
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn repeated_query_is_searched_once() {
        let search = Arc::new(StaticSearch::new().with("q", vec![raw("u", 0.9)]));
        let mut state = WorkflowState::new("task text here");
        state.plan = vec!["q".into(), "q".into()];

        let update = SearchGateway::new(search.clone(), 5, 0.6)
            .run(&state)
            .await
            .expect("search");

        assert_eq!(search.calls(), 1);
        assert_eq!(update.new_steps.len(), 1);
    }
}
