//! Exchange Latency Probe - Main CLI Application

use clap::Parser;
use exchange_latency_probe::{
    cli::Cli,
    config::{display_config_summary, load_config, validate_config, EnvManager},
    dns::SystemResolver,
    error::{AppError, ErrorReporter, Result},
    executor::ProbeOrchestrator,
    logging::LoggerFactory,
    output::OutputFormatterFactory,
    PKG_NAME, VERSION,
};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(1);
    }));

    let cli = Cli::parse();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        process::exit(2);
    }

    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);
    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    let sweep = cli.sweep;
    if cli.debug {
        eprintln!(
            "{} v{} ({}, built {})",
            PKG_NAME,
            VERSION,
            option_env!("GIT_COMMIT").unwrap_or("unknown commit"),
            env!("BUILD_TIME")
        );
        eprint!("{}", cli.get_config_summary());
        for warning in EnvManager::validate_current_env() {
            eprintln!("{}", warning);
        }
    }

    let config = load_config(cli)?;
    let use_color = config.enable_color;

    for warning in validate_config(&config)? {
        eprintln!("{}", warning.format(use_color));
    }

    if config.debug {
        eprintln!("{}", display_config_summary(&config));
        eprintln!();
    }

    let logger_factory = LoggerFactory::new(config.clone());
    let probe_logger = logger_factory.create_probe_logger().await;
    let resolver = Arc::new(SystemResolver::new()?);
    let observer = Arc::new(OutputFormatterFactory::create_progress(use_color, config.verbose));
    let formatter = OutputFormatterFactory::create_formatter(use_color, config.verbose);

    let orchestrator = ProbeOrchestrator::new(config, resolver, probe_logger, observer);

    if sweep {
        println!("{}", formatter.format_header("Endpoint sweep")?);
        let report = orchestrator.run_sweep().await?;
        println!("{}", formatter.format_sweep(&report)?);

        if report.tcp_ranking().is_empty() {
            return Err(AppError::probe_execution("No endpoint answered the TCP probe"));
        }
        return Ok(());
    }

    let host = orchestrator.config().host.clone();
    println!("{}", formatter.format_header(&format!("Exchange latency probe: {}", host))?);
    let report = orchestrator.run_comparison().await?;

    for result in &report.results {
        println!();
        println!("{}", formatter.format_result(result)?);
    }
    println!();
    println!("{}", formatter.format_comparison(&report)?);

    if report.is_empty() {
        return Err(AppError::probe_execution("Every probe failed - check network connectivity"));
    }
    if report.failures.is_empty() {
        println!("{}", formatter.format_success("All probes completed")?);
    } else {
        println!(
            "{}",
            formatter.format_warning(&format!("{} probe(s) failed", report.failures.len()))?
        );
    }

    Ok(())
}
