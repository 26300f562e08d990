//! The enrichment pipeline.
//!
//! One run is: list (every page of every query), classify, de-duplicate,
//! enrich on a worker pool, then aggregate once the pool has joined.
//! Every command is an instance of this with its own classifier, mode and
//! aggregation.

mod aggregate;
mod classify;
mod enrich;
mod pool;
mod render;
mod source;

use std::collections::HashSet;

use tracing::{debug, info};

use crate::model::Record;
use crate::remote::{ListQuery, RemoteError, RemoteSource};

pub use aggregate::{Aggregation, GroupBy, Groups, Keep, MemberOrder};
pub use classify::{
    Classifier, Namespace, NotificationClassifier, PullRequestClassifier, RepositoryClassifier,
    SearchIssueClassifier, member_logins, repository_record,
};
pub use enrich::{EnrichmentMode, Query};
pub use pool::{CancelReason, CancelToken, DEFAULT_WORKERS, Tally, WorkerPool};
pub use render::{Column, Layout, View, render};
pub use source::{OnListError, PaginatedSource};

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("listing {query} failed: {source}")]
    Listing {
        query: String,
        #[source]
        source: RemoteError,
    },
}

/// What a run produced.
#[derive(Debug)]
pub struct Outcome {
    pub groups: Groups,
    pub tally: Tally,
}

/// A configured run.
pub struct Pipeline<'a, C> {
    remote: &'a dyn RemoteSource,
    queries: Vec<ListQuery>,
    on_error: OnListError,
    classifier: C,
    seeded: Vec<Record>,
    pool: Option<WorkerPool>,
    aggregation: Aggregation,
}

impl<'a, C: Classifier> Pipeline<'a, C> {
    pub fn new(remote: &'a dyn RemoteSource, classifier: C, aggregation: Aggregation) -> Self {
        Self {
            remote,
            queries: Vec::new(),
            on_error: OnListError::Abort,
            classifier,
            seeded: Vec::new(),
            pool: None,
            aggregation,
        }
    }

    /// Add a listing. Queries are walked in the order they are added.
    pub fn query(mut self, query: ListQuery) -> Self {
        self.queries.push(query);
        self
    }

    pub fn on_error(mut self, on_error: OnListError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Add a record that doesn't come from a listing.
    pub fn seed(mut self, record: Record) -> Self {
        self.seeded.push(record);
        self
    }

    /// Enrich on `pool`. Without a pool, classified records go straight to aggregation.
    pub fn enrich(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run to completion.
    ///
    /// Fails only when a listing fails under [`OnListError::Abort`], or with
    /// a fatal error. Per-record failures are dropped and counted.
    pub fn run(&self) -> Result<Outcome, PipelineError> {
        let records = dedupe(self.classified()?);

        let outcome = match &self.pool {
            Some(pool) => {
                let enrichment = pool.run(self.remote, records);
                Outcome {
                    groups: self.aggregation.aggregate(enrichment.results()),
                    tally: enrichment.tally,
                }
            }
            None => {
                let submitted = records.len();
                Outcome {
                    groups: self.aggregation.aggregate(records),
                    tally: Tally {
                        submitted,
                        enriched: submitted,
                        ..Tally::default()
                    },
                }
            }
        };

        info!(
            submitted = outcome.tally.submitted,
            enriched = outcome.tally.enriched,
            dropped = outcome.tally.dropped,
            cancelled = outcome.tally.cancelled,
            groups = outcome.groups.len(),
            shown = outcome.groups.record_count(),
            "pipeline finished"
        );
        Ok(outcome)
    }

    fn classified(&self) -> Result<Vec<Record>, PipelineError> {
        let mut records = Vec::new();
        for query in &self.queries {
            let source = PaginatedSource::new(self.remote, query.clone(), self.on_error);
            let items = source.collect().map_err(|source| PipelineError::Listing {
                query: query.to_string(),
                source,
            })?;
            let listed = items.len();
            records.extend(self.classifier.classify_all(items));
            debug!(%query, listed, classified = records.len(), "classified listing");
        }
        records.extend(self.seeded.iter().cloned());
        Ok(records)
    }
}

/// Keep the first record per id, preserving order.
fn dedupe(mut records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.id.clone()));
    records
}
