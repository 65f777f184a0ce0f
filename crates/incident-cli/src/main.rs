//! `incident-response`: run alerts through the pipeline against simulated infrastructure

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use incident_core::collaborators::RunbookRegistry;
use incident_core::{Alert, IncidentState, OrchestratorConfig, SessionManager, StandardRunbooks};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file");

    Command::new("incident-response")
        .version(incident_core::VERSION)
        .about("Automated incident triage, diagnostics and remediation")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log filter when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("run")
                .about("Submit an alert and stream its events as JSON lines")
                .arg(Arg::new("service").long("service").required(true).help("Affected service"))
                .arg(Arg::new("title").long("title").required(true).help("Alert title"))
                .arg(
                    Arg::new("description")
                        .long("description")
                        .default_value("")
                        .help("Alert description"),
                )
                .arg(
                    Arg::new("source")
                        .long("source")
                        .default_value("cli")
                        .help("Alert source"),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Seed for reproducible simulated outcomes"),
                ),
        )
        .subcommand(
            Command::new("runbooks").about("Print the runbook catalogue").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output as JSON"),
            ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(config_arg),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    // stdout carries the event stream, so logs go to stderr
    if matches.get_flag("json-logs") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<OrchestratorConfig> {
    let path = args.get_one::<PathBuf>("config");
    OrchestratorConfig::load(path.map(PathBuf::as_path)).context("loading configuration")
}

async fn run(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args)?;
    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }

    let text = |name: &str| args.get_one::<String>(name).cloned().unwrap_or_default();
    let alert = Alert::new(text("service"), text("title"))
        .with_description(text("description"))
        .with_source(text("source"));

    let sessions = SessionManager::simulated(config);
    let id = sessions.submit(alert);
    let mut events = sessions.subscribe(&id)?;
    tracing::info!("{}: streaming events", id);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&*event)?);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                tracing::warn!("{}: interrupted, cancelling run", id);
                sessions.shutdown().await;
                break;
            }
        }
    }

    let session = sessions.wait(&id).await?;
    if let Some(report) = &session.report {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    if let Some(error) = &session.error {
        tracing::error!("{}: {}", id, error);
    }
    Ok(match session.state {
        IncidentState::Resolved => ExitCode::SUCCESS,
        IncidentState::HumanTakeover => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    })
}

fn runbooks(args: &ArgMatches) -> anyhow::Result<()> {
    let catalogue = StandardRunbooks::new().list();
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&catalogue)?);
        return Ok(());
    }
    for runbook in catalogue {
        let approval = if runbook.auto_approve { "auto" } else { "approval" };
        println!(
            "{}  {:<18} {:<28} risk={:?} {} ~{}s",
            runbook.id,
            runbook.action_type,
            runbook.name,
            runbook.risk_level,
            approval,
            runbook.expected_duration_secs
        );
        println!("        symptoms: {}", runbook.applicable_symptoms.join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("runbooks", args)) => runbooks(args).map(|()| ExitCode::SUCCESS),
        Some(("config", args)) => {
            let config = load_config(args)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Some((other, _)) => anyhow::bail!("unknown command: {other}"),
        None => anyhow::bail!("no command given"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn run_arguments() {
        let matches = cli()
            .try_get_matches_from([
                "incident-response",
                "--log-level",
                "debug",
                "run",
                "--service",
                "payment-service",
                "--title",
                "High error rate",
                "--seed",
                "42",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<String>("log-level").unwrap(), "debug");
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(args.get_one::<u64>("seed"), Some(&42));
        assert_eq!(args.get_one::<String>("source").unwrap(), "cli");
    }

    #[test]
    fn run_requires_service_and_title() {
        let err = cli()
            .try_get_matches_from(["incident-response", "run", "--service", "x"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
