use std::io;
use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};
use clap_complete::generate;
use cli_table::ColorChoice;

use arraysub::client::commands::probe::command_probe;
use arraysub::client::commands::submit::{command_plan, command_submit};
use arraysub::client::commands::task::command_task_line;
use arraysub::client::globalsettings::GlobalSettings;
use arraysub::client::output::cli::CliOutput;
use arraysub::client::output::json::JsonOutput;
use arraysub::client::output::outputs::{Output, Outputs};
use arraysub::client::output::quiet::Quiet;
use arraysub::common::cli::{
    ColorPolicy, CommonOpts, GenerateCompletionOpts, RootOptions, SubCommand,
};
use arraysub::common::config::load_config;
use arraysub::common::setup::setup_logging;

fn make_printer(opts: &CommonOpts) -> Box<dyn Output> {
    let color_policy = match opts.colors {
        ColorPolicy::Always => ColorChoice::AlwaysAnsi,
        ColorPolicy::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorPolicy::Never => ColorChoice::Never,
    };

    match opts.output_mode {
        Outputs::CLI => {
            // Set colored public for CLI
            match color_policy {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => {
                    colored::control::set_override(true)
                }
                ColorChoice::Never => colored::control::set_override(false),
                _ => {}
            }

            Box::new(CliOutput::new(color_policy))
        }
        Outputs::JSON => Box::<JsonOutput>::default(),
        Outputs::Quiet => Box::<Quiet>::default(),
    }
}

fn make_global_settings(opts: CommonOpts) -> GlobalSettings {
    let printer = make_printer(&opts);
    let config = match load_config(opts.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            printer.print_error(error.into());
            std::process::exit(1);
        }
    };
    GlobalSettings::new(config, printer)
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "arraysub".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> arraysub::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let gsettings = make_global_settings(top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Submit(opts) => command_submit(&gsettings, opts).await,
        SubCommand::Plan(opts) => command_plan(&gsettings, opts).await,
        SubCommand::Probe(opts) => command_probe(&gsettings, opts).await,
        SubCommand::TaskLine(opts) => command_task_line(&gsettings, opts),
        SubCommand::GenerateCompletion(opts) => generate_completion(opts),
    };

    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
