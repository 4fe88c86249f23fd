use crate::client::globalsettings::GlobalSettings;
use crate::common::cli::TaskLineOpts;
use crate::submit::manifest::resolve_task;

/// Prints the manifest line of the task addressed by an array index and its offset.
pub fn command_task_line(gsettings: &GlobalSettings, opts: TaskLineOpts) -> anyhow::Result<()> {
    let index = opts
        .index
        .checked_add(opts.offset)
        .ok_or_else(|| anyhow::anyhow!("Task index {} + {} overflows", opts.index, opts.offset))?;
    let line = resolve_task(&opts.manifest, index)?;
    gsettings.printer().print_task_line(index, &line);
    Ok(())
}
