use std::collections::BTreeMap;

use cli_table::format::{Justify, Separator};
use cli_table::{print_stdout, Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct};
use colored::Colorize;

use crate::client::output::outputs::Output;
use crate::common::utils::str::{pluralize, truncate_middle};
use crate::submit::concurrency::{ConcurrencyPlan, ConcurrencySource};
use crate::submit::controller::{SubmissionPlan, SubmissionReport};
use crate::submit::probe::ResourceSnapshot;
use crate::submit::scheduler::ArrayRequest;
use crate::TaskIndex;

const MAX_MESSAGE_WIDTH: usize = 60;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {:?}", e);
        }
    }
}

impl Output for CliOutput {
    fn print_submission_plan(&self, plan: &SubmissionPlan, requests: &[ArrayRequest]) {
        let Some(concurrency) = &plan.concurrency else {
            println!("Manifest {} does not contain any tasks", plan.manifest.display());
            return;
        };

        let rows = vec![
            vec![
                "Manifest".cell().bold(true),
                plan.manifest.display().cell(),
            ],
            vec!["Tasks".cell().bold(true), plan.total_tasks.cell()],
            vec!["Chunk size".cell().bold(true), plan.chunk_size.cell()],
            vec!["Chunks".cell().bold(true), plan.chunks.len().cell()],
            vec![
                "Concurrency".cell().bold(true),
                format_concurrency(concurrency).cell(),
            ],
        ];
        self.print_vertical_table(rows);

        let rows: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                vec![
                    (index + 1).cell().justify(Justify::Right),
                    request.chunk.to_string().cell(),
                    request.array_spec.as_str().cell(),
                    request.offset.cell().justify(Justify::Right),
                ]
            })
            .collect();
        let header = vec![
            "#".cell().bold(true),
            "Tasks".cell().bold(true),
            "Array".cell().bold(true),
            "Offset".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_submission_report(&self, report: &SubmissionReport) {
        if report.total_tasks == 0 {
            println!("No tasks to submit");
            return;
        }

        let rows: Vec<_> = report
            .accepted
            .iter()
            .map(|submission| {
                vec![
                    submission.chunk.to_string().cell(),
                    submission.array_spec.as_str().cell(),
                    submission.offset.cell().justify(Justify::Right),
                    match &submission.job_id {
                        Some(id) => id.as_str().cell(),
                        None => "dry run".cell().foreground_color(Some(Color::Cyan)),
                    },
                ]
            })
            .chain(report.failure.iter().map(|failure| {
                vec![
                    failure.range.to_string().cell(),
                    "".cell(),
                    "".cell(),
                    truncate_middle(&failure.reason.to_string(), MAX_MESSAGE_WIDTH)
                        .cell()
                        .foreground_color(Some(Color::Red)),
                ]
            }))
            .collect();
        let header = vec![
            "Tasks".cell().bold(true),
            "Array".cell().bold(true),
            "Offset".cell().bold(true),
            "Job".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);

        if report.dry_run {
            for submission in &report.accepted {
                println!("{}", submission.message);
            }
        }

        let submitted_tasks: u64 = report.accepted.iter().map(|s| s.chunk.size()).sum();
        let summary = format!(
            "{} {} {}, {submitted_tasks}/{} {}",
            report.accepted.len(),
            pluralize("array job", report.accepted.len()),
            if report.dry_run {
                "would be submitted"
            } else {
                "submitted"
            },
            report.total_tasks,
            pluralize("task", report.total_tasks as usize)
        );
        if report.is_success() {
            println!("{}", summary.green());
        } else {
            println!("{}", summary.yellow());
        }
        let log_failed = report.failure.as_ref().is_some_and(|f| f.is_accepted());
        if let Some(path) = &report.submission_log {
            if !report.accepted.is_empty() && !log_failed {
                println!("Submissions were recorded in {}", path.display());
            }
        }
    }

    fn print_partition(&self, snapshot: &ResourceSnapshot, plan: &ConcurrencyPlan) {
        let rows = vec![
            vec!["Partition".cell().bold(true), snapshot.pool.as_str().cell()],
            vec!["Nodes".cell().bold(true), snapshot.members.len().cell()],
            vec!["Down nodes".cell().bold(true), snapshot.down_count().cell()],
            vec!["Free CPUs".cell().bold(true), snapshot.free_units().cell()],
            vec![
                "Concurrency".cell().bold(true),
                format_concurrency(plan).cell(),
            ],
        ];
        self.print_vertical_table(rows);

        let rows: Vec<_> = snapshot
            .members
            .iter()
            .map(|member| {
                vec![
                    member.node.as_str().cell(),
                    if member.is_down {
                        "DOWN".cell().foreground_color(Some(Color::Red))
                    } else {
                        "UP".cell().foreground_color(Some(Color::Green))
                    },
                    member.total_units.cell().justify(Justify::Right),
                    member.allocated_units.cell().justify(Justify::Right),
                    member.free_units().cell().justify(Justify::Right),
                ]
            })
            .collect();
        let header = vec![
            "Node".cell().bold(true),
            "State".cell().bold(true),
            "CPUs".cell().bold(true),
            "Allocated".cell().bold(true),
            "Free".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_partition_list(&self, pools: &BTreeMap<String, ResourceSnapshot>) {
        let rows: Vec<_> = pools
            .values()
            .map(|snapshot| {
                vec![
                    snapshot.pool.as_str().cell(),
                    snapshot.members.len().cell().justify(Justify::Right),
                    snapshot.down_count().cell().justify(Justify::Right),
                    snapshot.free_units().cell().justify(Justify::Right),
                ]
            })
            .collect();
        let header = vec![
            "Partition".cell().bold(true),
            "Nodes".cell().bold(true),
            "Down".cell().bold(true),
            "Free CPUs".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_task_line(&self, _index: TaskIndex, line: &str) {
        println!("{line}");
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{:?}", error);
    }
}

fn format_concurrency(plan: &ConcurrencyPlan) -> String {
    match plan.source {
        ConcurrencySource::Explicit => format!("{} (explicit)", plan.final_concurrency),
        ConcurrencySource::Default => format!("{} (default)", plan.final_concurrency),
        ConcurrencySource::Probed => format!(
            "{} ({} free {} / {} per task * {})",
            plan.final_concurrency,
            plan.free_units,
            pluralize("CPU", plan.free_units as usize),
            plan.units_per_task,
            plan.safety_factor
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::format_concurrency;
    use crate::submit::concurrency::{plan_concurrency, ConcurrencyPlan};

    #[test]
    fn test_format_concurrency() {
        assert_eq!(
            format_concurrency(&plan_concurrency(100, 4, 0.8, 10)),
            "20 (100 free CPUs / 4 per task * 0.8)"
        );
        assert_eq!(
            format_concurrency(&plan_concurrency(0, 4, 0.8, 10)),
            "10 (default)"
        );
        assert_eq!(format_concurrency(&ConcurrencyPlan::explicit(3)), "3 (explicit)");
    }
}
