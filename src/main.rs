use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use journey_load::cli::{Cli, Mode, RunArgs, ScenarioChoice, ValidateArgs};
use journey_load::metrics::reporter;
use journey_load::{
    scenarios, Overrides, ReqwestClient, RunError, Runner, ScenarioFile, EXIT_CONFIG_ERROR,
    EXIT_FAILURE, EXIT_OK,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.mode {
        Mode::Run(args) => {
            init_tracing(args.verbose)?;
            run(args).await?
        }
        Mode::Validate(args) => {
            init_tracing(args.verbose)?;
            validate(args)
        }
    };

    std::process::exit(code);
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(args: RunArgs) -> Result<i32> {
    tracing::info!("Journey Load Test Starting...");

    let file = match &args.scenario {
        ScenarioChoice::Load => scenarios::load::scenario(),
        ScenarioChoice::Stress => scenarios::stress::scenario(),
        ScenarioChoice::Checkout => scenarios::checkout::scenario(),
        ScenarioChoice::Smoke => scenarios::smoke::scenario(),
        ScenarioChoice::File(file) => match ScenarioFile::load(&file.config) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("{}", e);
                return Ok(EXIT_CONFIG_ERROR);
            }
        },
    };

    let client = ReqwestClient::new(args.timeout)
        .context("failed to build HTTP client")?
        .with_discarded_bodies(file.discard_response_bodies);

    let overrides = Overrides {
        target_url: args.target_url.clone(),
        seed: args.seed,
    };
    let scenario = match file.into_scenario(&overrides) {
        Ok(scenario) => scenario,
        Err(e) => {
            let e = RunError::from(e);
            tracing::error!("{}", e);
            return Ok(e.exit_code());
        }
    };

    tracing::info!("Running '{}' scenario", scenario.name);
    tracing::info!("  Timeout: {:?}", args.timeout);
    tracing::info!("  Max VUs: {}", scenario.profile.max_target());
    tracing::info!("  Duration: {:?}", scenario.profile.total_duration());

    let runner = Runner::new(Arc::new(client))
        .with_report_interval(Duration::from_secs(args.report_interval));

    let result = tokio::select! {
        result = runner.run(&scenario) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, no result produced");
            return Ok(EXIT_FAILURE);
        }
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(e.exit_code());
        }
    };

    reporter::print_final_report(&result);

    if let Some(path) = &args.summary_export {
        let json = result.to_json().context("failed to serialize run result")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        tracing::info!("Summary written to {}", path.display());
    }

    for failed in result.failed_thresholds() {
        tracing::warn!("Threshold failed: {} {}", failed.metric, failed.expression);
    }

    tracing::info!("Load test complete");
    Ok(result.exit_code())
}

fn validate(args: ValidateArgs) -> i32 {
    let scenario = ScenarioFile::load(&args.config)
        .and_then(|file| file.into_scenario(&Overrides::default()));

    match scenario {
        Ok(scenario) => {
            println!("✅ {} is valid", args.config.display());
            println!("   Scenario:   {}", scenario.name);
            println!("   Target:     {}", scenario.base_url);
            println!(
                "   Stages:     {} ({:?}, up to {} VUs)",
                scenario.profile.stages().len(),
                scenario.profile.total_duration(),
                scenario.profile.max_target()
            );
            for journey in &scenario.journeys {
                println!(
                    "   Journey:    {} (weight {}, {} steps)",
                    journey.name,
                    journey.weight,
                    journey.steps.len()
                );
            }
            for threshold in &scenario.thresholds {
                println!(
                    "   Threshold:  {} {}",
                    threshold.metric,
                    threshold.expression()
                );
            }
            EXIT_OK
        }
        Err(e) => {
            tracing::error!("{}: {}", args.config.display(), e);
            EXIT_CONFIG_ERROR
        }
    }
}
