use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dualpath_core::logging::{init_tracing, LogFormat};
use dualpath_core::{Classification, Concurrency, ExperimentBuilder, ExperimentConfig, ResultSummary};
use parking_lot::Mutex;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn cli() -> Command {
    Command::new("dualpath")
        .version(dualpath_core::VERSION)
        .about("Control/candidate experiment runner")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(value_parser!(LogFormat))
                .help("Log output format (pretty or json)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("demo")
                .about("Run a control against a candidate built from sleeps and constants")
                .arg(
                    Arg::new("control-ms")
                        .long("control-ms")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("How long the control sleeps"),
                )
                .arg(
                    Arg::new("control-value")
                        .long("control-value")
                        .default_value("1")
                        .value_parser(value_parser!(i64))
                        .help("Value the control returns"),
                )
                .arg(
                    Arg::new("candidate-ms")
                        .long("candidate-ms")
                        .default_value("800")
                        .value_parser(value_parser!(u64))
                        .help("How long the candidate sleeps"),
                )
                .arg(
                    Arg::new("candidate-value")
                        .long("candidate-value")
                        .default_value("1")
                        .value_parser(value_parser!(i64))
                        .help("Value the candidate returns"),
                )
                .arg(
                    Arg::new("candidate-error")
                        .long("candidate-error")
                        .help("Make the candidate fail with this message"),
                )
                .arg(
                    Arg::new("concurrent")
                        .long("concurrent")
                        .action(ArgAction::SetTrue)
                        .help("Run control and candidate in parallel"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .value_parser(value_parser!(u64))
                        .help("Shared deadline for concurrent runs"),
                )
                .arg(
                    Arg::new("error-on-mismatch")
                        .long("error-on-mismatch")
                        .action(ArgAction::SetTrue)
                        .help("Fail the run when the candidate mismatches"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(std::path::PathBuf))
                        .help("TOML experiment configuration, overridden by flags"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the run summary as JSON"),
                ),
        )
}

fn demo_config(args: &ArgMatches) -> Result<ExperimentConfig, dualpath_core::ConfigError> {
    let mut config = match args.get_one::<std::path::PathBuf>("config") {
        Some(path) => ExperimentConfig::from_toml_file(path)?,
        None => ExperimentConfig::new(),
    };
    if args.get_flag("concurrent") {
        config = config.with_concurrency(Concurrency::Concurrent);
    }
    if let Some(ms) = args.get_one::<u64>("timeout-ms") {
        config = config.with_timeout(Some(Duration::from_millis(*ms)));
    }
    if args.get_flag("error-on-mismatch") {
        config = config.with_error_on_mismatch(true);
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(summary: &ResultSummary) {
    println!("Experiment: {} ({})", summary.experiment, summary.run_id);
    println!(
        "  control: {:.1}ms {}",
        summary.control.runtime_ms,
        summary
            .control
            .value
            .as_deref()
            .or(summary.control.error.as_deref())
            .unwrap_or("-")
    );
    for candidate in &summary.candidates {
        println!(
            "  {}: {:.1}ms {} [{}]",
            candidate.name,
            candidate.runtime_ms,
            candidate
                .value
                .as_deref()
                .or(candidate.error.as_deref())
                .unwrap_or("-"),
            candidate
                .classification
                .map_or("unclassified", Classification::as_str)
        );
    }
    for error in &summary.errors {
        println!("  error [{}]: {}", error.operation, error.message);
    }
    println!("  matched: {}", summary.matched);
}

async fn demo(args: &ArgMatches) -> ExitCode {
    let config = match demo_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let control_ms = *args.get_one::<u64>("control-ms").unwrap_or(&0);
    let control_value = *args.get_one::<i64>("control-value").unwrap_or(&0);
    let candidate_ms = *args.get_one::<u64>("candidate-ms").unwrap_or(&0);
    let candidate_value = *args.get_one::<i64>("candidate-value").unwrap_or(&0);
    let candidate_error = args.get_one::<String>("candidate-error").cloned();

    let published: Arc<Mutex<Option<ResultSummary>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&published);

    let experiment = ExperimentBuilder::new("demo")
        .use_control(move || {
            std::thread::sleep(Duration::from_millis(control_ms));
            Ok(control_value)
        })
        .try_candidate(move || {
            std::thread::sleep(Duration::from_millis(candidate_ms));
            match &candidate_error {
                Some(message) => Err(anyhow::anyhow!("{message}")),
                None => Ok(candidate_value),
            }
        })
        .publish(move |result| {
            *sink.lock() = Some(result.summarize(|v| Ok(v.to_string())));
            Ok(())
        })
        .report_errors(|errors| {
            for error in errors {
                tracing::warn!(operation = %error.operation, error = %error, "operation error");
            }
        })
        .config(config)
        .build();

    let experiment = match experiment {
        Ok(experiment) => experiment,
        Err(e) => {
            eprintln!("invalid experiment: {e}");
            return ExitCode::from(2);
        }
    };

    let outcome = experiment.run().await;

    let summary = published.lock().take();
    let matched = summary.as_ref().is_some_and(|s| s.matched);
    if let Some(summary) = &summary {
        if args.get_flag("json") {
            match serde_json::to_string_pretty(summary) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("failed to encode summary: {e}"),
            }
        } else {
            print_summary(summary);
        }
    }

    match outcome {
        Ok(value) => tracing::info!(value, "control returned"),
        Err(e) => eprintln!("experiment failed: {e}"),
    }

    if matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    if let Err(e) = init_tracing(level, format) {
        eprintln!("failed to initialise logging: {e}");
    }

    match matches.subcommand() {
        Some(("demo", args)) => demo(args).await,
        _ => ExitCode::from(2),
    }
}
