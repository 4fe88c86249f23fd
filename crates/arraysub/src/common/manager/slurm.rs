use std::collections::HashMap;

use crate::submit::scheduler::SchedulerResponse;

/// Fragments of `sbatch` error output that mean that the array specification itself was refused
/// (e.g. it is larger than `MaxArraySize` or than the submit limit of the QOS).
const RANGE_REJECTION_MARKERS: &[&str] = &[
    "invalid job array specification",
    "job array index too large",
    "maxarraysize",
    "qosmaxsubmitjobperuserlimit",
    "job submit limit",
];

/// Node states in which the free CPUs of a node cannot be used by new jobs.
const UNAVAILABLE_NODE_STATES: &[&str] = &["DOWN", "DRAIN", "FAIL"];

/// Format the value of the `--array` option, e.g. `1-1000%20`.
pub fn format_array_spec(start: u64, end: u64, concurrency: u32) -> String {
    format!("{start}-{end}%{concurrency}")
}

/// Parse <key>=<value> pairs from the output of `scontrol show <entity>`.
pub fn get_scontrol_items(output: &str) -> HashMap<&str, &str> {
    let mut map = HashMap::new();
    for line in output.lines() {
        for item in line.trim().split(' ') {
            let iter: Vec<_> = item.split('=').take(2).collect();
            if iter.len() < 2 {
                continue;
            }
            let (key, value) = (iter[0], iter[1]);
            map.insert(key, value);
        }
    }
    map
}

/// Classifies the result of a single `sbatch` invocation.
pub fn parse_sbatch_output(success: bool, stdout: &str, stderr: &str) -> SchedulerResponse {
    let stdout = stdout.trim();
    let stderr = stderr.trim();

    if success {
        let accepted = stdout
            .lines()
            .map(|l| l.trim())
            .find(|l| l.to_lowercase().starts_with("submitted batch job"));
        return match accepted.and_then(|l| l.split(' ').nth(3).map(|id| (l, id))) {
            Some((line, id)) => SchedulerResponse::Accepted {
                job_id: id.to_string(),
                message: line.to_string(),
            },
            None => SchedulerResponse::OtherFailure {
                message: format!("Missing job id in sbatch output\n{stdout}"),
            },
        };
    }

    let message = match (stderr.is_empty(), stdout.is_empty()) {
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (true, true) => "sbatch failed without any output".to_string(),
        (false, false) => format!("{stderr}\n{stdout}"),
    };
    let lowercase = message.to_lowercase();
    if RANGE_REJECTION_MARKERS
        .iter()
        .any(|marker| lowercase.contains(marker))
    {
        SchedulerResponse::RangeRejected { message }
    } else {
        SchedulerResponse::OtherFailure { message }
    }
}

/// Resource information about a single node, as reported by `scontrol show node --oneliner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    /// Comma-separated list of partitions that contain the node.
    pub partitions: String,
    pub total_units: u64,
    pub allocated_units: u64,
    pub state: String,
}

impl NodeRecord {
    pub fn is_down(&self) -> bool {
        let state = self.state.to_uppercase();
        UNAVAILABLE_NODE_STATES
            .iter()
            .any(|unavailable| state.contains(unavailable))
    }

    pub fn belongs_to(&self, pool: &str) -> bool {
        self.partitions.contains(pool)
    }

    pub fn free_units(&self) -> u64 {
        self.total_units.saturating_sub(self.allocated_units)
    }
}

/// Parses the output of `scontrol show node --oneliner`, one node per line.
/// Lines without the required keys are skipped.
pub fn parse_node_records(output: &str) -> Vec<NodeRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let items = get_scontrol_items(line);
            let record = parse_node_record(&items);
            if record.is_none() {
                log::debug!("Skipping incomplete scontrol node record: {}", line.trim());
            }
            record
        })
        .collect()
}

fn parse_node_record(items: &HashMap<&str, &str>) -> Option<NodeRecord> {
    let name = items.get("NodeName")?;
    let total_units = items.get("CPUTot")?.parse().ok()?;
    let allocated_units = items.get("CPUAlloc")?.parse().ok()?;
    Some(NodeRecord {
        name: name.to_string(),
        partitions: items.get("Partitions").copied().unwrap_or("").to_string(),
        total_units,
        allocated_units,
        state: items.get("State").copied().unwrap_or("UNKNOWN").to_string(),
    })
}
