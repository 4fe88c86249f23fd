use std::collections::BTreeMap;

use crate::submit::concurrency::ConcurrencyPlan;
use crate::submit::controller::{SubmissionPlan, SubmissionReport};
use crate::submit::probe::ResourceSnapshot;
use crate::submit::scheduler::ArrayRequest;
use crate::TaskIndex;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
    Quiet,
}

pub trait Output {
    // Submission
    fn print_submission_plan(&self, plan: &SubmissionPlan, requests: &[ArrayRequest]);
    fn print_submission_report(&self, report: &SubmissionReport);

    // Resources
    fn print_partition(&self, snapshot: &ResourceSnapshot, plan: &ConcurrencyPlan);
    fn print_partition_list(&self, pools: &BTreeMap<String, ResourceSnapshot>);

    // Tasks
    fn print_task_line(&self, index: TaskIndex, line: &str);

    fn print_error(&self, error: anyhow::Error);
}
