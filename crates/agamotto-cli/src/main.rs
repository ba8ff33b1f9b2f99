//! `agamotto` command-line driver

use agamotto_core::{
    MetricKind, ReplayGate, RunConfig, ScenarioOrchestrator, Selection, WeightPair,
};
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

fn run_command() -> Command {
    Command::new("run")
        .about("Run every scenario and report aggregated metrics")
        .arg(
            Arg::new("config")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine scenario configuration file"),
        )
        .arg(
            Arg::new("close")
                .long("close")
                .short('c')
                .action(ArgAction::Append)
                .help("Closed road segment id (repeatable)"),
        )
        .arg(
            Arg::new("weight")
                .long("weight")
                .short('w')
                .action(ArgAction::Append)
                .help("Awareness split aware:unaware (repeatable, default 100:0 0:100 50:50)"),
        )
        .arg(
            Arg::new("graph")
                .long("graph")
                .short('g')
                .action(ArgAction::Append)
                .help("Metric to aggregate and chart (repeatable, default all)"),
        )
        .arg(
            Arg::new("net")
                .long("net")
                .value_parser(value_parser!(PathBuf))
                .help("Road network file passed to the engine"),
        )
        .arg(
            Arg::new("routes")
                .long("routes")
                .value_parser(value_parser!(PathBuf))
                .help("Route file passed to the engine"),
        )
        .arg(
            Arg::new("run-root")
                .long("run-root")
                .value_parser(value_parser!(PathBuf))
                .help("Directory receiving run folders"),
        )
        .arg(
            Arg::new("min-sim")
                .long("min-sim")
                .value_parser(value_parser!(usize))
                .help("Minimum scenarios per lane before another lane opens"),
        )
        .arg(
            Arg::new("max-concurrent")
                .long("max-concurrent")
                .short('j')
                .value_parser(value_parser!(usize))
                .help("Maximum concurrent lanes"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_parser(value_parser!(u64))
                .help("Per-scenario timeout in seconds (0 disables it)"),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file; flags override it"),
        )
        .arg(
            Arg::new("show-gui")
                .long("show-gui")
                .action(ArgAction::SetTrue)
                .help("Run scenarios in the graphical engine, one at a time"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Keep engine logs and traces in each scenario directory"),
        )
        .arg(
            Arg::new("keep-output")
                .long("keep-output")
                .action(ArgAction::SetTrue)
                .help("Retain scenario output directories"),
        )
        .arg(
            Arg::new("no-reference")
                .long("no-reference")
                .action(ArgAction::SetTrue)
                .help("Skip the closure-free reference simulation"),
        )
        .arg(
            Arg::new("no-replay")
                .long("no-replay")
                .action(ArgAction::SetTrue)
                .help("Exit after the report instead of offering replay"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

fn cli() -> Command {
    Command::new("agamotto")
        .version(agamotto_core::VERSION)
        .about("Road-closure scenario matrix scheduler")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(run_command())
        .subcommand(
            run_command()
                .name("plan")
                .about("Print the scenario matrix and lane plan without running anything"),
        )
}

/// Settings file first, then flags on top
fn build_config(args: &ArgMatches) -> anyhow::Result<RunConfig> {
    let mut config = match args.get_one::<PathBuf>("settings") {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(path) = args.get_one::<PathBuf>("config") {
        config.config_path.clone_from(path);
    }
    if let Some(closures) = args.get_many::<String>("close") {
        config.closures = closures.cloned().collect();
    }
    if let Some(weights) = args.get_many::<String>("weight") {
        config.weights = weights
            .map(|w| {
                WeightPair::from_str(w)
                    .map(|p| (i64::from(p.aware), i64::from(p.unaware)))
                    .with_context(|| format!("--weight {w}"))
            })
            .collect::<anyhow::Result<_>>()?;
    }
    if let Some(metrics) = args.get_many::<String>("graph") {
        config.metrics = metrics
            .map(|m| MetricKind::from_str(m).with_context(|| format!("--graph {m}")))
            .collect::<anyhow::Result<_>>()?;
    }
    if let Some(net) = args.get_one::<PathBuf>("net") {
        config.net_file = Some(net.clone());
    }
    if let Some(routes) = args.get_one::<PathBuf>("routes") {
        config.route_file = Some(routes.clone());
    }
    if let Some(root) = args.get_one::<PathBuf>("run-root") {
        config.run_root.clone_from(root);
    }
    if let Some(&min_sim) = args.get_one::<usize>("min-sim") {
        config.min_sim = min_sim;
    }
    if let Some(&max) = args.get_one::<usize>("max-concurrent") {
        config.max_concurrent = max;
    }
    if let Some(&secs) = args.get_one::<u64>("timeout") {
        config.timeout_secs = secs;
    }
    config.show_gui |= args.get_flag("show-gui");
    config.debug |= args.get_flag("debug");
    config.keep_output |= args.get_flag("keep-output");
    config.reference &= !args.get_flag("no-reference");

    config.validate()?;
    Ok(config)
}

fn init_tracing(debug: bool, json: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn replay_prompt(gate: &ReplayGate) -> anyhow::Result<()> {
    let last = gate.matrix().len().saturating_sub(1);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout
            .write_all(format!("Replay scenario (0-{last} / q to exit): ").as_bytes())
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match gate.select(&line) {
            Ok(Selection::Quit) => return Ok(()),
            Ok(Selection::Scenario(index)) => {
                if let Err(e) = gate.replay(index).await {
                    eprintln!("{e}");
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// Exit status of a run rejected before any scenario started
const EXIT_INVALID_RUN: u8 = 2;

fn run_error(err: agamotto_core::Error) -> anyhow::Result<u8> {
    if err.is_fatal() {
        eprintln!("{err}");
        return Ok(EXIT_INVALID_RUN);
    }
    Err(anyhow::Error::new(err).context("scenario run failed"))
}

async fn run(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = build_config(args)?;
    tracing::debug!("Resolved configuration: {:?}", config);
    let orchestrator = ScenarioOrchestrator::new(config)?;
    let summary = match orchestrator.execute().await {
        Ok(summary) => summary,
        Err(e) => return run_error(e).map(ExitCode::from),
    };

    println!("{}", summary.report.render_text());
    for scenario in &summary.matrix {
        println!("  {}", scenario.label());
    }

    if !args.get_flag("no-replay") && !summary.matrix.is_empty() {
        let gate = orchestrator.replay_gate(&summary);
        replay_prompt(&gate).await?;
    }

    Ok(if summary.report.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn plan(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = build_config(args)?;
    let orchestrator = ScenarioOrchestrator::new(config)?;
    let (matrix, plan) = orchestrator.plan()?;

    println!("Closures: {}", matrix.closures());
    for scenario in &matrix {
        println!("  {}", scenario.label());
    }
    println!("{plan}");
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("run", args)) => {
            init_tracing(args.get_flag("debug"), args.get_flag("log-json"));
            run(args).await
        }
        Some(("plan", args)) => {
            init_tracing(args.get_flag("debug"), args.get_flag("log-json"));
            plan(args)
        }
        _ => unreachable!("subcommand_required"),
    }
}
