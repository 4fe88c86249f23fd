use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::common::utils::fs::append_line;
use crate::submit::chunk::Chunk;

/// An array job that was accepted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedSubmission {
    pub chunk: Chunk,
    pub array_spec: String,
    pub offset: u64,
    /// `None` in dry-run mode.
    pub job_id: Option<String>,
    /// Acceptance message of the scheduler.
    pub message: String,
}

/// Append-only record of accepted submissions, one line per array job.
///
/// The file is only created once the first submission is accepted.
pub struct SubmissionLog {
    path: PathBuf,
}

impl SubmissionLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, submission: &AcceptedSubmission) -> std::io::Result<()> {
        append_line(&self.path, &format_log_line(submission))
    }
}

fn format_log_line(submission: &AcceptedSubmission) -> String {
    format!(
        "{}\ttasks={}\tarray={}\toffset={}\t{}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        submission.chunk,
        submission.array_spec,
        submission.offset,
        submission.message
    )
}

/// Collects accepted submissions in the order in which they were accepted.
#[derive(Default)]
pub struct SubmissionCollector {
    accepted: Vec<AcceptedSubmission>,
    log: Option<SubmissionLog>,
}

impl SubmissionCollector {
    pub fn new(log: Option<SubmissionLog>) -> Self {
        Self {
            accepted: vec![],
            log,
        }
    }

    /// Stores an accepted submission and appends it to the submission log.
    ///
    /// The submission is kept even when the log cannot be written.
    pub fn record(&mut self, submission: AcceptedSubmission) -> std::io::Result<()> {
        let logged = match &self.log {
            Some(log) => log.append(&submission),
            None => Ok(()),
        };
        self.accepted.push(submission);
        logged
    }

    pub fn accepted(&self) -> &[AcceptedSubmission] {
        &self.accepted
    }

    pub fn into_accepted(self) -> Vec<AcceptedSubmission> {
        self.accepted
    }
}
