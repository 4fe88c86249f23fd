use std::collections::BTreeMap;

use crate::client::output::outputs::Output;
use crate::submit::concurrency::ConcurrencyPlan;
use crate::submit::controller::{SubmissionPlan, SubmissionReport};
use crate::submit::probe::ResourceSnapshot;
use crate::submit::scheduler::ArrayRequest;
use crate::TaskIndex;

#[derive(Default)]
pub struct Quiet;

impl Output for Quiet {
    // Submission
    fn print_submission_plan(&self, _plan: &SubmissionPlan, requests: &[ArrayRequest]) {
        for request in requests {
            println!("{}", request.format_command());
        }
    }
    fn print_submission_report(&self, report: &SubmissionReport) {
        for submission in &report.accepted {
            if let Some(job_id) = &submission.job_id {
                println!("{job_id}");
            }
        }
    }

    // Resources
    fn print_partition(&self, _snapshot: &ResourceSnapshot, plan: &ConcurrencyPlan) {
        println!("{}", plan.final_concurrency);
    }
    fn print_partition_list(&self, pools: &BTreeMap<String, ResourceSnapshot>) {
        for (pool, snapshot) in pools {
            println!("{pool} {}", snapshot.free_units());
        }
    }

    // Tasks
    fn print_task_line(&self, _index: TaskIndex, line: &str) {
        println!("{line}");
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}
