use std::fmt;

use serde::Serialize;

use crate::submit::chunk::Chunk;
use crate::submit::log::{AcceptedSubmission, SubmissionCollector};
use crate::submit::scheduler::{ArrayRequest, ArrayScheduler, RequestTemplate, SchedulerResponse};

/// Result of a single submission attempt of one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// `job_id` is `None` in dry-run mode.
    Accepted {
        job_id: Option<String>,
        message: String,
    },
    RangeRejected {
        message: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The scheduler refused even a single array index.
    SingleIndexRejected { message: String },
    /// The range was bisected more times than allowed.
    DepthExceeded { depth: u32 },
    /// Any other scheduler failure, it is never retried.
    Scheduler { message: String },
    /// The range was accepted by the scheduler, but could not be written to the submission log.
    Log {
        job_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SingleIndexRejected { message } => {
                write!(f, "single index rejected: {message}")
            }
            FailureReason::DepthExceeded { depth } => {
                write!(f, "range still rejected after {depth} bisection(s)")
            }
            FailureReason::Scheduler { message } => write!(f, "{message}"),
            FailureReason::Log { job_id, message } => {
                if let Some(id) = job_id {
                    write!(f, "accepted as job {id}, ")?;
                }
                write!(f, "not written to the submission log: {message}")
            }
        }
    }
}

/// A range that could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFailure {
    pub range: Chunk,
    pub reason: FailureReason,
}

impl SubmissionFailure {
    /// True when the scheduler accepted the range despite the failure.
    pub fn is_accepted(&self) -> bool {
        matches!(self.reason, FailureReason::Log { .. })
    }
}

impl fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let FailureReason::Log { job_id, message } = &self.reason {
            write!(f, "Tasks {} were accepted", self.range)?;
            if let Some(id) = job_id {
                write!(f, " as job {id}")?;
            }
            return write!(f, " but could not be written to the submission log: {message}");
        }
        if self.range.size() == 1 {
            write!(f, "Task {} could not be submitted: {}", self.range, self.reason)
        } else {
            write!(f, "Tasks {} could not be submitted: {}", self.range, self.reason)
        }
    }
}

/// Submits chunks to a scheduler and bisects the ranges that the scheduler refuses.
pub struct AdaptiveSubmitter<'a> {
    scheduler: &'a mut dyn ArrayScheduler,
    requests: RequestTemplate,
    dry_run: bool,
    max_depth: u32,
}

impl<'a> AdaptiveSubmitter<'a> {
    pub fn new(
        scheduler: &'a mut dyn ArrayScheduler,
        requests: RequestTemplate,
        dry_run: bool,
        max_depth: u32,
    ) -> Self {
        Self {
            scheduler,
            requests,
            dry_run,
            max_depth,
        }
    }

    /// Performs a single submission attempt, without any retries.
    pub async fn attempt(&mut self, request: &ArrayRequest) -> SubmissionOutcome {
        if self.dry_run {
            log::info!("[dry-run] {}", request.format_command());
            return SubmissionOutcome::Accepted {
                job_id: None,
                message: format!("Dry run: {}", request.format_command()),
            };
        }

        log::debug!(
            "Submitting tasks {} as array {} (offset {})",
            request.chunk,
            request.array_spec,
            request.offset
        );
        match self.scheduler.submit_array(request).await {
            SchedulerResponse::Accepted { job_id, message } => SubmissionOutcome::Accepted {
                job_id: Some(job_id),
                message,
            },
            SchedulerResponse::RangeRejected { message } => {
                SubmissionOutcome::RangeRejected { message }
            }
            SchedulerResponse::OtherFailure { message } => {
                SubmissionOutcome::Failed { reason: message }
            }
        }
    }

    /// Submits `chunk`, bisecting it whenever the scheduler rejects its array range.
    ///
    /// Sub-ranges are resolved depth-first, the left half (including its own bisections) before
    /// the right half. A rejected single index does not stop the remaining sub-ranges of the
    /// chunk, but the first such failure is returned once the chunk is resolved. Any other
    /// scheduler failure stops the chunk immediately. Accepted ranges are stored in `collector`.
    pub async fn submit(
        &mut self,
        chunk: Chunk,
        collector: &mut SubmissionCollector,
    ) -> Result<(), SubmissionFailure> {
        let mut stack: Vec<(Chunk, u32)> = vec![(chunk, 0)];
        let mut first_failure: Option<SubmissionFailure> = None;

        while let Some((range, depth)) = stack.pop() {
            let request = self.requests.create_request(&range);
            match self.attempt(&request).await {
                SubmissionOutcome::Accepted { job_id, message } => {
                    match &job_id {
                        Some(id) => log::info!("Tasks {range} accepted as job {id}"),
                        None => log::debug!("Tasks {range} accepted (dry run)"),
                    }
                    let submission = AcceptedSubmission {
                        chunk: range,
                        array_spec: request.array_spec,
                        offset: request.offset,
                        job_id: job_id.clone(),
                        message,
                    };
                    if let Err(error) = collector.record(submission) {
                        let failure = SubmissionFailure {
                            range,
                            reason: FailureReason::Log {
                                job_id,
                                message: error.to_string(),
                            },
                        };
                        log::error!("{failure}");
                        return Err(first_failure.unwrap_or(failure));
                    }
                }
                SubmissionOutcome::RangeRejected { message } => match range.bisect() {
                    None => {
                        log::error!("Task {range} was rejected by the scheduler: {message}");
                        first_failure.get_or_insert(SubmissionFailure {
                            range,
                            reason: FailureReason::SingleIndexRejected { message },
                        });
                    }
                    Some(_) if depth >= self.max_depth => {
                        log::error!("Tasks {range} rejected after {depth} bisection(s): {message}");
                        first_failure.get_or_insert(SubmissionFailure {
                            range,
                            reason: FailureReason::DepthExceeded { depth },
                        });
                    }
                    Some((left, right)) => {
                        log::warn!(
                            "Tasks {range} rejected ({}), retrying as {left} and {right}",
                            message.lines().last().unwrap_or_default()
                        );
                        stack.push((right, depth + 1));
                        stack.push((left, depth + 1));
                    }
                },
                SubmissionOutcome::Failed { reason } => {
                    log::error!("Submission of tasks {range} failed: {reason}");
                    return Err(first_failure.unwrap_or(SubmissionFailure {
                        range,
                        reason: FailureReason::Scheduler { message: reason },
                    }));
                }
            }
        }

        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AdaptiveSubmitter, FailureReason, SubmissionFailure};
    use crate::submit::chunk::Chunk;
    use crate::submit::log::SubmissionCollector;
    use crate::submit::scheduler::{IndexMode, SchedulerResponse};
    use crate::submit::log::SubmissionLog;
    use crate::tests::utils::{MockScheduler, request_template};
    use tempfile::TempDir;

    fn global_ranges(scheduler: &MockScheduler) -> Vec<(u64, u64)> {
        scheduler
            .requests()
            .iter()
            .map(|r| (r.chunk.start, r.chunk.end))
            .collect()
    }

    #[tokio::test]
    async fn accepted_on_first_try() {
        let mut scheduler = MockScheduler::always_accept();
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap();

        let accepted = collector.accepted();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].chunk, Chunk::new(1, 100, 10));
        assert_eq!(accepted[0].job_id.as_deref(), Some("1000"));
        assert_eq!(scheduler.requests().len(), 1);
    }

    #[tokio::test]
    async fn bisect_until_accepted() {
        // Ranges larger than 30 indices are refused
        let mut scheduler = MockScheduler::new(|request| {
            if request.chunk.size() > 30 {
                SchedulerResponse::RangeRejected {
                    message: "Invalid job array specification".to_string(),
                }
            } else {
                SchedulerResponse::Accepted {
                    job_id: request.chunk.start.to_string(),
                    message: format!("Submitted batch job {}", request.chunk.start),
                }
            }
        });
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap();

        let accepted: Vec<_> = collector
            .accepted()
            .iter()
            .map(|s| (s.chunk.start, s.chunk.end))
            .collect();
        assert_eq!(accepted, vec![(1, 25), (26, 50), (51, 75), (76, 100)]);
        assert_eq!(
            global_ranges(&scheduler),
            vec![
                (1, 100),
                (1, 50),
                (1, 25),
                (26, 50),
                (51, 100),
                (51, 75),
                (76, 100)
            ]
        );
        // Each sub-range is submitted relative to its own start
        assert_eq!(collector.accepted()[1].array_spec, "1-25%10");
        assert_eq!(collector.accepted()[1].offset, 25);
    }

    #[tokio::test]
    async fn reject_everything_yields_single_leaves() {
        let mut scheduler = MockScheduler::always_reject_range();
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(5, 12, 1), &mut collector)
            .await
            .unwrap_err();

        assert_eq!(failure.range, Chunk::new(5, 5, 1));
        assert!(matches!(
            failure.reason,
            FailureReason::SingleIndexRejected { .. }
        ));
        assert!(collector.accepted().is_empty());

        let leaves: Vec<_> = scheduler
            .requests()
            .iter()
            .filter(|r| r.chunk.size() == 1)
            .map(|r| r.chunk.start)
            .collect();
        assert_eq!(leaves, (5..=12).collect::<Vec<_>>());
        // 8 leaves and 7 inner ranges
        assert_eq!(scheduler.requests().len(), 15);
    }

    #[tokio::test]
    async fn single_index_rejection_is_terminal() {
        let mut scheduler = MockScheduler::always_reject_range();
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(51, 51, 3), &mut collector)
            .await
            .unwrap_err();
        assert_eq!(failure.range, Chunk::new(51, 51, 3));
        assert_eq!(scheduler.requests().len(), 1);
        assert!(failure.to_string().starts_with("Task 51 could not be submitted"));
    }

    #[tokio::test]
    async fn partial_acceptance_after_bisection() {
        // [1, 100] and [51, 100] are refused, as is task 51 on its own
        let mut scheduler = MockScheduler::new(|request| {
            let chunk = request.chunk;
            let rejected = (chunk.start, chunk.end) == (1, 100)
                || (chunk.start == 51 && chunk.end > 51)
                || (chunk.start, chunk.end) == (51, 51);
            if rejected {
                SchedulerResponse::RangeRejected {
                    message: "Invalid job array specification".to_string(),
                }
            } else {
                SchedulerResponse::Accepted {
                    job_id: format!("{}", 500 + chunk.start),
                    message: format!("Submitted batch job {}", 500 + chunk.start),
                }
            }
        });
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap_err();

        assert_eq!(failure.range, Chunk::new(51, 51, 10));
        let accepted: Vec<_> = collector
            .accepted()
            .iter()
            .map(|s| (s.chunk.start, s.chunk.end))
            .collect();
        assert_eq!(
            accepted,
            vec![(1, 50), (52, 52), (53, 54), (55, 57), (58, 63), (64, 75), (76, 100)]
        );
        let covered: u64 = collector.accepted().iter().map(|s| s.chunk.size()).sum();
        assert_eq!(covered, 99);
    }

    #[tokio::test]
    async fn other_failure_is_not_bisected() {
        let mut scheduler = MockScheduler::new(|_| SchedulerResponse::OtherFailure {
            message: "Invalid account or account/partition combination specified".to_string(),
        });
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap_err();

        assert_eq!(
            failure,
            SubmissionFailure {
                range: Chunk::new(1, 100, 10),
                reason: FailureReason::Scheduler {
                    message: "Invalid account or account/partition combination specified"
                        .to_string()
                }
            }
        );
        assert_eq!(scheduler.requests().len(), 1);
    }

    #[tokio::test]
    async fn other_failure_stops_remaining_subranges() {
        let mut scheduler = MockScheduler::new(|request| match request.chunk.size() {
            100 => SchedulerResponse::RangeRejected {
                message: "Invalid job array specification".to_string(),
            },
            _ => SchedulerResponse::OtherFailure {
                message: "Socket timed out on send/recv operation".to_string(),
            },
        });
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap_err();
        assert_eq!(failure.range, Chunk::new(1, 50, 10));
        assert_eq!(global_ranges(&scheduler), vec![(1, 100), (1, 50)]);
    }

    #[tokio::test]
    async fn depth_limit_fails_closed() {
        let mut scheduler = MockScheduler::always_reject_range();
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 2);
        let failure = submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap_err();
        assert_eq!(failure.range, Chunk::new(1, 25, 10));
        assert_eq!(failure.reason, FailureReason::DepthExceeded { depth: 2 });
        // Depth 0: 1 range, depth 1: 2 ranges, depth 2: 4 ranges
        assert_eq!(scheduler.requests().len(), 7);
    }

    #[tokio::test]
    async fn dry_run_does_not_contact_scheduler() {
        let mut scheduler = MockScheduler::always_reject_range();
        let mut collector = SubmissionCollector::default();
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Global), true, 24);
        submitter
            .submit(Chunk::new(1001, 2000, 10), &mut collector)
            .await
            .unwrap();

        assert!(scheduler.requests().is_empty());
        let accepted = collector.accepted();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].job_id, None);
        assert_eq!(accepted[0].array_spec, "1001-2000%10");
    }

    #[tokio::test]
    async fn accepted_job_is_kept_when_log_fails() {
        let dir = TempDir::with_prefix("arraysub").unwrap();
        let path = dir.path().join("missing-dir").join("submissions.log");
        let mut scheduler = MockScheduler::always_accept();
        let mut collector = SubmissionCollector::new(Some(SubmissionLog::new(path)));
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(1, 100, 10), &mut collector)
            .await
            .unwrap_err();

        assert_eq!(scheduler.requests().len(), 1);
        assert_eq!(collector.accepted().len(), 1);
        assert_eq!(collector.accepted()[0].job_id.as_deref(), Some("1000"));
        assert!(failure.is_accepted());
        assert!(matches!(
            &failure.reason,
            FailureReason::Log { job_id: Some(id), .. } if id == "1000"
        ));
        let message = failure.to_string();
        assert!(message.starts_with("Tasks 1-100 were accepted as job 1000 but could not be written"));
        assert!(!message.contains("could not be submitted"));
    }

    #[tokio::test]
    async fn log_failure_after_rejection_keeps_first_failure() {
        let dir = TempDir::with_prefix("arraysub").unwrap();
        let path = dir.path().join("missing-dir").join("submissions.log");
        // Task 1 is refused, task 2 is accepted but cannot be logged
        let mut scheduler = MockScheduler::new(|request| {
            if request.chunk.size() > 1 || request.chunk.start == 1 {
                SchedulerResponse::RangeRejected {
                    message: "Invalid job array specification".to_string(),
                }
            } else {
                SchedulerResponse::Accepted {
                    job_id: "42".to_string(),
                    message: "Submitted batch job 42".to_string(),
                }
            }
        });
        let mut collector = SubmissionCollector::new(Some(SubmissionLog::new(path)));
        let mut submitter =
            AdaptiveSubmitter::new(&mut scheduler, request_template(IndexMode::Offset), false, 24);
        let failure = submitter
            .submit(Chunk::new(1, 2, 10), &mut collector)
            .await
            .unwrap_err();

        assert_eq!(failure.range, Chunk::new(1, 1, 10));
        assert_eq!(collector.accepted().len(), 1);
        assert_eq!(collector.accepted()[0].chunk, Chunk::new(2, 2, 10));
    }
}
