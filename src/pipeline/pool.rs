//! Worker pool: fan records out to a fixed number of threads, fan results in.
//!
//! The ordering that makes "all work finished" observable:
//!
//! 1. The producer enqueues every record, then drops the input sender.
//! 2. Each worker loops until the input queue is closed *and* empty.
//! 3. The driver joins every worker (the scope ends only when all have exited).
//! 4. Only then is the driver's output sender dropped, closing the results queue.
//!
//! Both queues are sized to the record count, so the producer never blocks
//! and workers never block publishing. Only consumers wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, warn};

use crate::model::Record;
use crate::remote::RemoteSource;

use super::enrich::EnrichmentMode;

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The run deadline passed.
    Deadline,
    /// A remote error that no later call could get past.
    FatalError,
}

/// Cooperative cancellation, checked by workers between dequeue and remote call.
///
/// Cancelled once `cancel` is called or the optional deadline passes. An
/// explicit cancel is reported as a fatal error even if the deadline has
/// passed since.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::Acquire) {
            Some(CancelReason::FatalError)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::Deadline)
        } else {
            None
        }
    }
}

/// What happened to the records handed to a pool.
///
/// `submitted == enriched + dropped + cancelled`. `cancelled_by` is set
/// whenever `cancelled` is nonzero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub submitted: usize,
    pub enriched: usize,
    pub dropped: usize,
    pub cancelled: usize,
    pub cancelled_by: Option<CancelReason>,
}

impl Tally {
    fn absorb(&mut self, worker: Tally) {
        self.enriched += worker.enriched;
        self.dropped += worker.dropped;
        self.cancelled += worker.cancelled;
    }
}

/// Output of a pool run: the closed results queue and the tally.
#[derive(Debug)]
pub struct Enrichment {
    results: Receiver<Record>,
    pub tally: Tally,
}

impl Enrichment {
    /// Drain the results. Ends once the queue is empty; it is already closed.
    pub fn results(&self) -> impl Iterator<Item = Record> + '_ {
        self.results.iter()
    }

    /// Whether every sender of the results queue is gone.
    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.results.is_empty()
            && matches!(
                self.results.try_recv(),
                Err(crossbeam_channel::TryRecvError::Disconnected)
            )
    }
}

/// A fixed-size set of threads applying one enrichment mode.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    mode: EnrichmentMode,
    cancel: CancelToken,
}

impl WorkerPool {
    /// A pool of `workers` threads (at least one).
    pub fn new(workers: usize, mode: EnrichmentMode) -> Self {
        Self {
            workers: workers.max(1),
            mode,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enrich every record, blocking until all workers have finished.
    ///
    /// Each record is enqueued exactly once and owned by whichever worker
    /// dequeues it. Failed records are logged and dropped. A fatal remote
    /// error cancels the rest of the run.
    pub fn run(&self, remote: &dyn RemoteSource, records: Vec<Record>) -> Enrichment {
        let submitted = records.len();
        let capacity = submitted.max(1);
        let (input_tx, input_rx) = bounded::<Record>(capacity);
        let (output_tx, output_rx) = bounded::<Record>(capacity);

        let mut tally = Tally {
            submitted,
            ..Tally::default()
        };

        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|id| {
                    let input = input_rx.clone();
                    let output = output_tx.clone();
                    scope.spawn(move || self.work(id, remote, &input, &output))
                })
                .collect();

            for record in records {
                // Capacity covers every record and `input_rx` outlives the loop.
                if input_tx.send(record).is_err() {
                    break;
                }
            }
            drop(input_tx);

            for handle in handles {
                match handle.join() {
                    Ok(worker) => tally.absorb(worker),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        // Every worker has exited; closing our sender closes the queue.
        drop(output_tx);

        if tally.cancelled > 0 {
            tally.cancelled_by = self.cancel.reason();
        }

        debug!(
            workers = self.workers,
            submitted = tally.submitted,
            enriched = tally.enriched,
            dropped = tally.dropped,
            cancelled = tally.cancelled,
            cancelled_by = ?tally.cancelled_by,
            "worker pool finished"
        );

        Enrichment {
            results: output_rx,
            tally,
        }
    }

    fn work(
        &self,
        id: usize,
        remote: &dyn RemoteSource,
        input: &Receiver<Record>,
        output: &Sender<Record>,
    ) -> Tally {
        let operation = self.mode.operation(remote);
        let mut tally = Tally::default();

        for mut record in input {
            if self.cancel.is_cancelled() {
                tally.cancelled += 1;
                continue;
            }

            match operation(&mut record) {
                Ok(()) => match output.send(record) {
                    Ok(()) => tally.enriched += 1,
                    Err(_) => break,
                },
                Err(e) => {
                    tally.dropped += 1;
                    warn!(
                        worker = id,
                        record = %record.target,
                        error = %e,
                        "enrichment failed; dropping record"
                    );
                    // No later call can succeed either.
                    if e.is_fatal() {
                        self.cancel.cancel();
                    }
                }
            }
        }

        tally
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    use super::*;
    use crate::model::{
        Actor, Collection, Comment, IssueState, RecordRef, Status, SubjectKind, Target,
    };
    use crate::pipeline::enrich::Query;
    use crate::remote::fake::FakeRemote;
    use crate::remote::{Cursor, DetailKind, Details, ListQuery, Mutation, Page, RemoteError};

    fn record(owner: &str, name: &str, number: u64) -> Record {
        let target = Target::Item(RecordRef {
            collection: Collection::new(owner, name),
            number,
        });
        Record::new(format!("{owner}/{name}#{number}"), target, SubjectKind::Issue)
    }

    fn records(n: u64) -> Vec<Record> {
        (1..=n).map(|i| record("o", "r", i)).collect()
    }

    fn comments(remote: &FakeRemote, record: &Record, by: &str) {
        remote.set_details(
            record.target.clone(),
            DetailKind::Comments,
            Details::Comments(vec![Comment {
                user: Some(Actor {
                    login: by.to_string(),
                }),
                created_at: None,
            }]),
        );
    }

    fn team_mode() -> EnrichmentMode {
        EnrichmentMode::Query(Query::TeamReview {
            team: vec!["jbardin".to_string()],
        })
    }

    fn ids(enrichment: &Enrichment) -> BTreeSet<String> {
        enrichment.results().map(|r| r.id).collect()
    }

    #[test]
    fn failed_records_are_dropped() {
        let remote = FakeRemote::new();
        let input = records(7);
        for r in &input {
            comments(&remote, r, "jbardin");
        }
        remote.fail_details(input[3].target.clone(), DetailKind::Comments);

        let enrichment = WorkerPool::new(5, team_mode()).run(&remote, input);

        assert_eq!(enrichment.results().count(), 6);
        assert_eq!(
            enrichment.tally,
            Tally {
                submitted: 7,
                enriched: 6,
                dropped: 1,
                cancelled: 0,
                cancelled_by: None,
            }
        );
    }

    #[test]
    fn results_close_only_after_all_work() {
        for workers in 1..=8 {
            for size in [0, 1, 3, 25] {
                let remote = FakeRemote::new();
                let input = records(size);
                for r in &input {
                    comments(&remote, r, "someone");
                }

                let enrichment = WorkerPool::new(workers, team_mode()).run(&remote, input);

                assert_eq!(
                    enrichment.results().count(),
                    usize::try_from(size).unwrap(),
                    "workers={workers} size={size}"
                );
                assert!(enrichment.is_closed(), "workers={workers} size={size}");
            }
        }
    }

    #[test]
    fn each_record_is_processed_once() {
        let remote = FakeRemote::new();
        let input = records(40);
        for r in &input {
            comments(&remote, r, "someone");
        }

        WorkerPool::new(5, team_mode()).run(&remote, input);

        let calls = remote.detail_calls.lock().unwrap();
        let unique: BTreeSet<_> = calls.iter().map(|(t, _)| t.to_string()).collect();
        assert_eq!(calls.len(), 40);
        assert_eq!(unique.len(), 40);
    }

    #[test]
    fn completion_order_does_not_lose_results() {
        let remote = FakeRemote::new();
        let input = records(6);
        for (i, r) in input.iter().enumerate() {
            comments(&remote, r, "jbardin");
            // Earlier records finish last.
            let delay = u64::try_from(6 - i).unwrap() * 5;
            remote.set_latency(r.target.clone(), Duration::from_millis(delay));
        }
        let expected: BTreeSet<_> = input.iter().map(|r| r.id.clone()).collect();

        let enrichment = WorkerPool::new(3, team_mode()).run(&remote, input);
        let results: Vec<_> = enrichment.results().collect();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.status == Status::Reviewed));
        let got: BTreeSet<_> = results.into_iter().map(|r| r.id).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn zero_workers_still_runs_one() {
        let remote = FakeRemote::new();
        let input = records(3);
        for r in &input {
            comments(&remote, r, "someone");
        }

        let enrichment = WorkerPool::new(0, team_mode()).run(&remote, input);

        assert_eq!(enrichment.tally.enriched, 3);
    }

    fn cleanup_remote(input: &[Record]) -> FakeRemote {
        let remote = FakeRemote::new();
        for (i, r) in input.iter().enumerate() {
            let state = if i % 2 == 0 {
                IssueState::Closed
            } else {
                IssueState::Open
            };
            remote.set_details(
                r.target.clone(),
                DetailKind::IssueState,
                Details::IssueState(state),
            );
        }
        remote
    }

    fn terminal_flags(enrichment: &Enrichment) -> BTreeMap<String, bool> {
        enrichment.results().map(|r| (r.id, r.terminal)).collect()
    }

    #[test]
    fn dry_run_never_mutates_but_matches_live_flags() {
        let input = records(9);

        let dry_remote = cleanup_remote(&input);
        let dry = WorkerPool::new(4, EnrichmentMode::MutateIfClosed { dry_run: true })
            .run(&dry_remote, input.clone());

        let live_remote = cleanup_remote(&input);
        let live = WorkerPool::new(4, EnrichmentMode::MutateIfClosed { dry_run: false })
            .run(&live_remote, input);

        assert_eq!(dry_remote.mutation_count(), 0);
        assert_eq!(live_remote.mutation_count(), 5);
        assert_eq!(terminal_flags(&dry), terminal_flags(&live));
    }

    #[test]
    fn cancelled_pool_makes_no_remote_calls() {
        let remote = FakeRemote::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let enrichment = WorkerPool::new(3, team_mode())
            .with_cancel(cancel)
            .run(&remote, records(10));

        assert_eq!(remote.detail_call_count(), 0);
        assert_eq!(enrichment.tally.cancelled, 10);
        assert_eq!(enrichment.tally.cancelled_by, Some(CancelReason::FatalError));
        assert_eq!(enrichment.results().count(), 0);
        assert!(enrichment.is_closed());
    }

    #[test]
    fn fatal_error_cancels_remaining_work() {
        struct Rejecting;

        impl RemoteSource for Rejecting {
            fn list(&self, _: &ListQuery, _: Option<Cursor>) -> Result<Page, RemoteError> {
                Ok(Page::default())
            }

            fn details(&self, _: &Target, _: &DetailKind) -> Result<Details, RemoteError> {
                Err(RemoteError::Unauthorized("Bad credentials".to_string()))
            }

            fn mutate(&self, _: &Mutation) -> Result<(), RemoteError> {
                Ok(())
            }
        }

        let cancel = CancelToken::new();
        let enrichment = WorkerPool::new(1, team_mode())
            .with_cancel(cancel.clone())
            .run(&Rejecting, records(5));

        assert_eq!(cancel.reason(), Some(CancelReason::FatalError));
        assert_eq!(enrichment.tally.dropped, 1);
        assert_eq!(enrichment.tally.cancelled, 4);
        assert_eq!(enrichment.tally.cancelled_by, Some(CancelReason::FatalError));
    }

    #[test]
    fn expired_deadline_cancels() {
        let token = CancelToken::with_deadline(Instant::now());
        assert_eq!(token.reason(), Some(CancelReason::Deadline));

        let later = CancelToken::with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!later.is_cancelled());
        later.cancel();
        assert_eq!(later.reason(), Some(CancelReason::FatalError));
    }

    #[test]
    fn deadline_is_reported_as_the_reason() {
        let remote = FakeRemote::new();

        let enrichment = WorkerPool::new(2, team_mode())
            .with_cancel(CancelToken::with_deadline(Instant::now()))
            .run(&remote, records(4));

        assert_eq!(enrichment.tally.cancelled, 4);
        assert_eq!(enrichment.tally.cancelled_by, Some(CancelReason::Deadline));
    }

    #[test]
    fn uncancelled_run_has_no_reason() {
        let remote = FakeRemote::new();
        let input = records(2);
        for r in &input {
            comments(&remote, r, "someone");
        }

        let enrichment = WorkerPool::new(2, team_mode()).run(&remote, input);

        assert_eq!(enrichment.tally.cancelled_by, None);
    }

    #[test]
    fn emitted_never_exceeds_submitted() {
        let remote = FakeRemote::new();
        let input = records(12);
        for r in input.iter().step_by(2) {
            comments(&remote, r, "someone");
        }

        let enrichment = WorkerPool::new(5, team_mode()).run(&remote, input);
        let tally = enrichment.tally;

        assert_eq!(ids(&enrichment).len(), 6);
        assert_eq!(
            tally.submitted,
            tally.enriched + tally.dropped + tally.cancelled
        );
    }
}
