use std::collections::BTreeMap;

use serde_json::json;

use crate::client::output::outputs::Output;
use crate::submit::concurrency::ConcurrencyPlan;
use crate::submit::controller::{SubmissionPlan, SubmissionReport};
use crate::submit::probe::ResourceSnapshot;
use crate::submit::scheduler::ArrayRequest;
use crate::TaskIndex;

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: serde_json::Value) {
        match serde_json::to_string_pretty(&data) {
            Ok(output) => println!("{output}"),
            Err(error) => log::error!("Cannot format JSON output: {error:?}"),
        }
    }
}

impl Output for JsonOutput {
    fn print_submission_plan(&self, plan: &SubmissionPlan, requests: &[ArrayRequest]) {
        let requests: Vec<_> = requests
            .iter()
            .map(|request| {
                json!({
                    "chunk": request.chunk,
                    "array": request.array_spec,
                    "offset": request.offset,
                    "command": request.format_command(),
                })
            })
            .collect();
        self.print(json!({
            "plan": plan,
            "requests": requests,
        }));
    }

    fn print_submission_report(&self, report: &SubmissionReport) {
        self.print(json!(report));
    }

    fn print_partition(&self, snapshot: &ResourceSnapshot, plan: &ConcurrencyPlan) {
        self.print(json!({
            "partition": snapshot.pool,
            "free_units": snapshot.free_units(),
            "down_nodes": snapshot.down_count(),
            "nodes": snapshot.members,
            "concurrency": plan,
        }));
    }

    fn print_partition_list(&self, pools: &BTreeMap<String, ResourceSnapshot>) {
        let pools: Vec<_> = pools
            .values()
            .map(|snapshot| {
                json!({
                    "partition": snapshot.pool,
                    "free_units": snapshot.free_units(),
                    "down_nodes": snapshot.down_count(),
                    "nodes": snapshot.members,
                })
            })
            .collect();
        self.print(json!(pools));
    }

    fn print_task_line(&self, index: TaskIndex, line: &str) {
        self.print(json!({
            "index": index,
            "line": line,
        }));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({
            "error": format!("{error:?}")
        }))
    }
}
