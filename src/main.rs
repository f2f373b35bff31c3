use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use argus::{
    build_collaborators, classify,
    config::{ConfigValidator, ReconConfig, MAX_ECHO_INTERVAL_MS},
    network::TransportKind,
    output::{OutputConfig, OutputFormat, OutputManager, ReportEnvelope},
    scanner::ReconEngine,
    utils::Logger,
};

fn cli() -> Command {
    Command::new("argus")
        .version(env!("CARGO_PKG_VERSION"))
        .about(
            "Argus: concurrent reconnaissance reports for a hostname, IP address or CIDR block",
        )
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Target to analyze (domain, IP address or CIDR block)")
                .required_unless_present("listen")
                .index(1),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .help("Read one target per line from stdin until EOF")
                .action(ArgAction::SetTrue)
                .conflicts_with("target"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: <config dir>/argus/config.toml)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Report format")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Append reports to FILE instead of printing them"),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .value_name("N")
                .help("Number of echo probes per address")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("MS")
                .help("Delay between echo probe launches in milliseconds")
                .value_parser(clap::value_parser!(u64).range(0..=MAX_ECHO_INTERVAL_MS)),
        )
        .arg(
            Arg::new("transport")
                .long("transport")
                .value_name("KIND")
                .help("Echo transport: system ping utility or raw ICMP socket")
                .value_parser(["system", "raw"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v debug, -vv trace)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
}

fn spinner(token: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("Analyzing {}...", token));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn analyze(
    engine: &ReconEngine,
    output: &OutputManager,
    token: &str,
    show_progress: bool,
) -> anyhow::Result<()> {
    let target = classify(token);
    Logger::log_investigation_start(token, target.kind());

    let started = Instant::now();
    let progress = show_progress.then(|| spinner(token));
    let report = engine.investigate(&target).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let outcomes: Vec<_> = report
        .address_reports()
        .into_iter()
        .flat_map(|address| address.outcomes.iter())
        .collect();
    Logger::log_investigation_complete(
        &target.to_string(),
        started.elapsed(),
        outcomes.iter().filter(|outcome| outcome.succeeded).count(),
        outcomes.len(),
    );

    let envelope = ReportEnvelope::new(token, target, report);
    output
        .write_report(&envelope)
        .with_context(|| format!("failed to write report for {}", token))
}

/// The target named by a listen-mode line, if the line is a single word.
fn listen_token(line: &str) -> Option<&str> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some(token), None) => Some(token),
        _ => None,
    }
}

/// Read targets from `input`, one per line. Empty lines and lines with more
/// than one word are ignored. A failed report is logged and the loop keeps
/// reading.
async fn listen<R: AsyncBufRead + Unpin>(
    input: R,
    engine: &ReconEngine,
    output: &OutputManager,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else { break };

        let Some(token) = listen_token(&line) else {
            debug!("Ignoring message: {:?}", line);
            continue;
        };

        let announcement = format!("Analyzing {}...", token);
        match format {
            OutputFormat::Text => println!("{}", announcement.bright_blue()),
            OutputFormat::Json => eprintln!("{}", announcement),
        }
        if let Err(e) = analyze(engine, output, token, false).await {
            error!("{:#}", e);
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<PathBuf>("config");
    let mut config = ReconConfig::load(config_path.map(PathBuf::as_path))
        .context("failed to load configuration")?
        .apply_env()?;

    if let Some(count) = matches.get_one::<usize>("count") {
        config.echo.count = *count;
    }
    if let Some(interval) = matches.get_one::<u64>("interval") {
        config.echo.interval_ms = *interval;
    }
    if let Some(transport) = matches.get_one::<String>("transport") {
        config.echo.transport = transport.parse::<TransportKind>().map_err(anyhow::Error::msg)?;
    }

    let level = if matches.get_flag("quiet") {
        log::LevelFilter::Error
    } else {
        match matches.get_count("verbose") {
            0 => Logger::level_from_str(&config.logging.level),
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    Logger::init(level);

    let problems = ConfigValidator::validate(&config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("{} {}", "[!]".bright_red(), problem);
        }
        bail!("invalid configuration");
    }
    for warning in ConfigValidator::warnings(&config) {
        warn!("{}", warning);
    }

    let colored = !matches.get_flag("no-color");
    if !colored {
        colored::control::set_override(false);
    }
    let format: OutputFormat = matches
        .get_one::<String>("output")
        .map(|s| s.parse().map_err(anyhow::Error::msg))
        .transpose()?
        .unwrap_or_default();
    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output-file").cloned(),
        colored,
    });

    let collaborators =
        build_collaborators(&config).context("failed to set up intelligence sources")?;
    let engine = ReconEngine::new(collaborators, config.probe_settings());

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "[~] Interrupted, finishing with partial results".bright_yellow()
            );
            cancel.cancel();
        }
    });

    if matches.get_flag("listen") {
        let stdin = BufReader::new(tokio::io::stdin());
        listen(stdin, &engine, &output, format, &engine.cancel_token()).await
    } else {
        let token = matches
            .get_one::<String>("target")
            .context("no target given")?;
        let show_progress = format == OutputFormat::Text && !matches.get_flag("quiet");
        analyze(&engine, &output, token, show_progress).await
    }
}
