use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Journey Load Testing Tool
#[derive(Parser, Debug)]
#[command(name = "journey-load")]
#[command(about = "Declarative user-journey load testing for HTTP storefronts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Run a built-in preset or a scenario file
    Run(RunArgs),

    /// Parse and validate a scenario file without sending any request
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Base URL of the system under test (overrides the scenario's base_url)
    #[arg(long, env = "TARGET_URL")]
    pub target_url: Option<String>,

    /// Per-request timeout, e.g. 30s or 1500ms
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Seed for journey selection and generated variables
    #[arg(long)]
    pub seed: Option<u64>,

    /// Live metrics refresh interval in seconds (0 disables the panel)
    #[arg(long, default_value = "5")]
    pub report_interval: u64,

    /// Write the final result as JSON to this path
    #[arg(long)]
    pub summary_export: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub scenario: ScenarioChoice,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScenarioChoice {
    /// Steady shopper journey: ramp to 10 users, hold 2m, ramp down
    Load,

    /// Four weighted shopper profiles ramping up to 100 users
    Stress,

    /// Six-step checkout flow with strict thresholds
    Checkout,

    /// 50 users on the home page and catalogue for 1m
    Smoke,

    /// Load a YAML or JSON scenario file
    File(FileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Path to the scenario file (.yaml, .yml or .json)
    #[arg(long, short)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to the scenario file (.yaml, .yml or .json)
    #[arg(long, short)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
