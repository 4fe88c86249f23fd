use std::convert::Infallible;
use std::path::PathBuf;

use serde::Serialize;

use crate::common::error::ArraySubError;
use crate::submit::chunk::{plan_chunks, Chunk};
use crate::submit::concurrency::{plan_concurrency, ConcurrencyPlan};
use crate::submit::log::{AcceptedSubmission, SubmissionCollector, SubmissionLog};
use crate::submit::manifest::count_tasks;
use crate::submit::probe::probe_free_units;
use crate::submit::scheduler::{ArrayScheduler, RequestTemplate};
use crate::submit::submitter::{AdaptiveSubmitter, SubmissionFailure};
use crate::submit::template::discover_units_per_task;

/// Concurrency requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencySetting {
    /// Derive the concurrency from the free capacity of the target partition.
    Auto,
    Fixed(u32),
    /// A value that is not a positive number. The default concurrency is used instead.
    Invalid(String),
}

/// Never fails, invalid values are reported later and replaced by the default.
pub fn parse_concurrency(value: &str) -> Result<ConcurrencySetting, Infallible> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("auto") {
        return Ok(ConcurrencySetting::Auto);
    }
    Ok(match value.parse::<u32>() {
        Ok(count) if count > 0 => ConcurrencySetting::Fixed(count),
        _ => ConcurrencySetting::Invalid(value.to_string()),
    })
}

/// Fully resolved parameters of a single controller run.
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub manifest: PathBuf,
    pub requests: RequestTemplate,
    pub chunk_size: u64,
    pub concurrency: ConcurrencySetting,
    pub default_concurrency: u32,
    pub safety_factor: f64,
    pub fallback_units_per_task: u64,
    pub max_bisect_depth: u32,
    pub dry_run: bool,
    pub submission_log: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionReport {
    pub total_tasks: u64,
    pub chunk_size: u64,
    pub concurrency: Option<ConcurrencyPlan>,
    pub chunks: Vec<Chunk>,
    pub accepted: Vec<AcceptedSubmission>,
    pub failure: Option<SubmissionFailure>,
    /// Chunks that were not attempted because an earlier chunk failed.
    pub skipped: Vec<Chunk>,
    pub dry_run: bool,
    pub submission_log: Option<PathBuf>,
}

impl SubmissionReport {
    fn empty(config: &SubmitConfig) -> Self {
        Self {
            total_tasks: 0,
            chunk_size: config.chunk_size,
            concurrency: None,
            chunks: vec![],
            accepted: vec![],
            failure: None,
            skipped: vec![],
            dry_run: config.dry_run,
            submission_log: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Error for a failed run, naming the offending range.
    pub fn failure_error(&self) -> Option<anyhow::Error> {
        let failure = self.failure.as_ref()?;
        let mut message = failure.to_string();
        if let (Some(first), Some(last)) = (self.skipped.first(), self.skipped.last()) {
            message.push_str(&format!(
                "\nTasks {}-{} were not submitted ({} chunk(s) skipped)",
                first.start,
                last.end,
                self.skipped.len()
            ));
        }
        if failure.is_accepted() {
            return Some(anyhow::anyhow!(message));
        }
        message.push_str(&format!(
            "\nConsider using a smaller chunk size (currently {}) with `--chunk-size` \
             or `max_chunk_size` in the configuration file",
            self.chunk_size
        ));
        Some(anyhow::anyhow!(message))
    }
}

/// Decides the concurrency cap of all chunks.
/// Resource probing problems are never fatal, the configured default is used instead.
pub async fn resolve_concurrency(
    config: &SubmitConfig,
    scheduler: &dyn ArrayScheduler,
) -> ConcurrencyPlan {
    let default_plan = || plan_concurrency(0, 0, config.safety_factor, config.default_concurrency);

    match &config.concurrency {
        ConcurrencySetting::Fixed(count) => ConcurrencyPlan::explicit(*count),
        ConcurrencySetting::Invalid(value) => {
            log::warn!(
                "Invalid concurrency `{value}`, using the default concurrency {}",
                config.default_concurrency
            );
            default_plan()
        }
        ConcurrencySetting::Auto => {
            let Some(partition) = &config.requests.partition else {
                log::warn!(
                    "No partition was specified, using the default concurrency {}",
                    config.default_concurrency
                );
                return default_plan();
            };
            if config.safety_factor > 1.0 {
                log::warn!(
                    "Safety factor {} is larger than 1, more tasks than free resources may be started",
                    config.safety_factor
                );
            }
            let snapshot = probe_free_units(scheduler, partition).await;
            let template = &config.requests.template;
            let discovered = if template.is_file() {
                discover_units_per_task(template)
            } else {
                Ok(None)
            };
            let units_per_task = match discovered {
                Ok(Some(units)) => units,
                Ok(None) => {
                    log::debug!(
                        "Template does not declare CPUs per task, assuming {}",
                        config.fallback_units_per_task
                    );
                    config.fallback_units_per_task
                }
                Err(error) => {
                    log::warn!(
                        "Cannot read CPUs per task from {}, assuming {}: {error:?}",
                        template.display(),
                        config.fallback_units_per_task
                    );
                    config.fallback_units_per_task
                }
            };
            let plan = plan_concurrency(
                snapshot.free_units(),
                units_per_task,
                config.safety_factor,
                config.default_concurrency,
            );
            if plan.free_units == 0 {
                log::warn!(
                    "No free resources found in partition `{partition}`, using the default concurrency {}",
                    config.default_concurrency
                );
            } else {
                log::info!(
                    "Partition `{partition}` has {} free CPU(s), {} per task: {} concurrent task(s) (safety factor {})",
                    plan.free_units,
                    plan.units_per_task,
                    plan.final_concurrency,
                    plan.safety_factor
                );
            }
            plan
        }
    }
}

/// Tasks of a manifest split into chunks.
#[derive(Debug, Serialize)]
pub struct SubmissionPlan {
    pub manifest: PathBuf,
    pub total_tasks: u64,
    pub chunk_size: u64,
    /// `None` when the manifest contains no tasks.
    pub concurrency: Option<ConcurrencyPlan>,
    pub chunks: Vec<Chunk>,
}

fn check_config(config: &SubmitConfig) -> crate::Result<()> {
    if config.chunk_size == 0 {
        return Err(ArraySubError::ConfigError(
            "Chunk size has to be at least 1".to_string(),
        ));
    }
    config.requests.validate()
}

/// Counts the tasks of the manifest and splits them into chunks.
pub async fn plan_submission(
    config: &SubmitConfig,
    scheduler: &dyn ArrayScheduler,
) -> crate::Result<SubmissionPlan> {
    check_config(config)?;
    let total_tasks = count_tasks(&config.manifest)?;
    Ok(plan_tasks(config, scheduler, total_tasks).await)
}

async fn plan_tasks(
    config: &SubmitConfig,
    scheduler: &dyn ArrayScheduler,
    total_tasks: u64,
) -> SubmissionPlan {
    let mut plan = SubmissionPlan {
        manifest: config.manifest.clone(),
        total_tasks,
        chunk_size: config.chunk_size,
        concurrency: None,
        chunks: vec![],
    };
    if total_tasks == 0 {
        return plan;
    }

    let concurrency = resolve_concurrency(config, scheduler).await;
    plan.chunks = plan_chunks(total_tasks, config.chunk_size, concurrency.final_concurrency);
    plan.concurrency = Some(concurrency);
    plan
}

/// Counts the tasks of the manifest, splits them into chunks and submits the chunks one by one.
///
/// Stops at the first chunk that cannot be fully submitted. Already accepted chunks stay
/// submitted, they are listed in the report and in the submission log.
pub async fn run_submission(
    config: &SubmitConfig,
    scheduler: &mut dyn ArrayScheduler,
) -> crate::Result<SubmissionReport> {
    check_config(config)?;
    let total_tasks = count_tasks(&config.manifest)?;
    if total_tasks == 0 {
        log::info!(
            "Manifest {} does not contain any tasks, nothing to submit",
            config.manifest.display()
        );
        return Ok(SubmissionReport::empty(config));
    }
    if !config.requests.template.is_file() {
        return Err(ArraySubError::ConfigError(format!(
            "Job template {} does not exist",
            config.requests.template.display()
        )));
    }

    let SubmissionPlan {
        concurrency,
        chunks,
        ..
    } = plan_tasks(config, &*scheduler, total_tasks).await;
    if let Some(concurrency) = &concurrency {
        log::info!(
            "Submitting {total_tasks} task(s) in {} chunk(s) of at most {} task(s), at most {} running at once",
            chunks.len(),
            config.chunk_size,
            concurrency.final_concurrency
        );
    }

    let log = match (&config.submission_log, config.dry_run) {
        (Some(path), false) => Some(SubmissionLog::new(path.clone())),
        _ => None,
    };
    let log_path = log.as_ref().map(|log| log.path().to_path_buf());
    let mut collector = SubmissionCollector::new(log);
    let mut submitter = AdaptiveSubmitter::new(
        scheduler,
        config.requests.clone(),
        config.dry_run,
        config.max_bisect_depth,
    );

    let mut failure = None;
    let mut skipped = vec![];
    for (index, chunk) in chunks.iter().enumerate() {
        log::debug!("Chunk {}/{}: tasks {chunk}", index + 1, chunks.len());
        if let Err(error) = submitter.submit(*chunk, &mut collector).await {
            failure = Some(error);
            skipped = chunks[index + 1..].to_vec();
            break;
        }
    }

    Ok(SubmissionReport {
        total_tasks,
        chunk_size: config.chunk_size,
        concurrency,
        chunks,
        accepted: collector.into_accepted(),
        failure,
        skipped,
        dry_run: config.dry_run,
        submission_log: log_path,
    })
}
