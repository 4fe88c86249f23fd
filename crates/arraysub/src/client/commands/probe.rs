use crate::client::commands::submit::resolve_safety_factor;
use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::ProbeOpts;
use crate::common::error::ArraySubError;
use crate::common::utils::fs::get_current_dir;
use crate::submit::concurrency::plan_concurrency;
use crate::submit::probe::{group_by_pool, probe_free_units};
use crate::submit::scheduler::{ArrayScheduler, SlurmScheduler};
use crate::submit::template::discover_units_per_task;

pub async fn command_probe(gsettings: &GlobalSettings, opts: ProbeOpts) -> anyhow::Result<()> {
    let config = gsettings.config();
    let scheduler = SlurmScheduler::new(get_current_dir());

    let Some(partition) = opts.partition.or_else(|| config.partition.clone()) else {
        let nodes = scheduler
            .query_nodes()
            .await
            .map_err(|error| ArraySubError::SchedulerError(format!("{error:?}")))?;
        gsettings.printer().print_partition_list(&group_by_pool(&nodes));
        return Ok(());
    };

    let safety_factor = resolve_safety_factor(opts.safety_factor, config)?;
    let snapshot = probe_free_units(&scheduler, &partition).await;
    let units_per_task = match opts.template.as_ref().or(config.template.as_ref()) {
        Some(template) => discover_units_per_task(template)?,
        None => None,
    }
    .unwrap_or(config.fallback_units_per_task);
    let plan = plan_concurrency(
        snapshot.free_units(),
        units_per_task,
        safety_factor,
        config.default_concurrency,
    );
    gsettings.printer().print_partition(&snapshot, &plan);
    Ok(())
}
