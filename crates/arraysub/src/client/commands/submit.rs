use std::path::PathBuf;

use anyhow::Context;

use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::{ChunkingOpts, PlanOpts, SubmitOpts};
use crate::common::config::ControllerConfig;
use crate::common::utils::fs::{absolute_path, get_current_dir};
use crate::submit::concurrency::is_valid_safety_factor;
use crate::submit::controller::{plan_submission, run_submission, SubmitConfig};
use crate::submit::scheduler::{RequestTemplate, SlurmScheduler};

/// Placeholder shown in planned commands when no template was configured.
const MISSING_TEMPLATE: &str = "<template>";

/// Safety factor from the command line, or from the configuration file when not given.
pub(crate) fn resolve_safety_factor(
    cli: Option<f64>,
    config: &ControllerConfig,
) -> anyhow::Result<f64> {
    let safety_factor = cli.unwrap_or(config.safety_factor);
    if !is_valid_safety_factor(safety_factor) {
        anyhow::bail!("Safety factor has to be a positive number, not {safety_factor}");
    }
    Ok(safety_factor)
}

/// Combines command line options with the configuration file.
/// Values given on the command line take precedence.
fn create_submit_config(
    opts: &ChunkingOpts,
    config: &ControllerConfig,
    require_template: bool,
) -> anyhow::Result<SubmitConfig> {
    let template = match opts.template.as_ref().or(config.template.as_ref()) {
        Some(template) => absolute_path(template.clone()),
        None if require_template => anyhow::bail!(
            "No job template was specified. Use `--template` or set `template` in the configuration file"
        ),
        None => PathBuf::from(MISSING_TEMPLATE),
    };
    let safety_factor = resolve_safety_factor(opts.safety_factor, config)?;
    let manifest = absolute_path(opts.manifest.clone());

    Ok(SubmitConfig {
        manifest: manifest.clone(),
        requests: RequestTemplate {
            template,
            manifest,
            partition: opts.partition.clone().or_else(|| config.partition.clone()),
            index_mode: opts.index_mode.unwrap_or(config.index_mode),
            offset_variable: config.offset_variable.clone(),
            job_name: config.job_name.clone(),
            extra_args: config.sbatch_args.clone(),
        },
        chunk_size: opts.chunk_size.unwrap_or(config.max_chunk_size),
        concurrency: opts.concurrency.clone(),
        default_concurrency: config.default_concurrency,
        safety_factor,
        fallback_units_per_task: config.fallback_units_per_task,
        max_bisect_depth: config.max_bisect_depth,
        dry_run: false,
        submission_log: config.submission_log.clone(),
    })
}

pub async fn command_submit(gsettings: &GlobalSettings, opts: SubmitOpts) -> anyhow::Result<()> {
    let mut config = create_submit_config(&opts.chunking, gsettings.config(), true)?;
    config.dry_run = opts.dry_run;
    if let Some(log) = opts.log {
        config.submission_log = Some(absolute_path(log));
    }
    if let Some(name) = opts.name {
        config.requests.job_name = Some(name);
    }
    if let Some(depth) = opts.max_bisect_depth {
        config.max_bisect_depth = depth;
    }
    config.requests.extra_args.extend(opts.sbatch_args);

    if !config.dry_run {
        let path = SlurmScheduler::check_available()?;
        log::debug!("Using sbatch from {}", path.display());
    }

    let mut scheduler = SlurmScheduler::new(get_current_dir());
    let report = run_submission(&config, &mut scheduler)
        .await
        .context("Submission failed")?;
    gsettings.printer().print_submission_report(&report);

    match report.failure_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

pub async fn command_plan(gsettings: &GlobalSettings, opts: PlanOpts) -> anyhow::Result<()> {
    let config = create_submit_config(&opts.chunking, gsettings.config(), false)?;
    let scheduler = SlurmScheduler::new(get_current_dir());
    let plan = plan_submission(&config, &scheduler).await?;
    let requests: Vec<_> = plan
        .chunks
        .iter()
        .map(|chunk| config.requests.create_request(chunk))
        .collect();
    gsettings.printer().print_submission_plan(&plan, &requests);
    Ok(())
}
