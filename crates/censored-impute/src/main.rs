//! CLI entry point for censored imputation.

use anyhow::{Result, anyhow};
use censored_impute::frame::{bounds_from_frame, read_csv, write_csv};
use censored_impute::{ImputationConfig, ImputationSummary, Imputer};
use clap::Parser;
use serde_json::json;
use std::path::Path;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bounded iterative imputation of values below the detection limit",
    long_about = "Replaces every empty or NaN cell of a CSV of positive concentrations with a \
                  draw that stays below the column's detection limit.\n\n\
                  The detection limits file is a single-row CSV with the same headers as \
                  the input.\n\n\
                  EXAMPLES:\n  \
                  # Impute with the default schedule\n  \
                  censored-impute -i wristbands.csv -b limits.csv -o imputed.csv\n\n  \
                  # Shorter schedule, also writing the censoring mask\n  \
                  censored-impute -i wristbands.csv -b limits.csv -o imputed.csv \\\n      \
                  --inner-iters 10 --outer-cycles 3 --mask-output mask.csv\n\n  \
                  # Machine-readable run summary\n  \
                  censored-impute -i wristbands.csv -b limits.csv -o imputed.csv --json"
)]
struct Args {
    /// Path to the CSV file of concentrations; empty cells are censored
    #[arg(short, long)]
    input: String,

    /// Path to the single-row CSV of detection limits
    #[arg(short, long)]
    bounds: String,

    /// Where to write the imputed CSV
    #[arg(short, long, default_value = "./outputs/imputed.csv")]
    output: String,

    /// Also write a CSV of booleans marking the censored cells
    #[arg(long)]
    mask_output: Option<String>,

    /// Refit-and-redraw rounds per column within one cycle
    #[arg(long, default_value = "50")]
    inner_iters: usize,

    /// Full cycles over every censored column
    #[arg(long, default_value = "10")]
    outer_cycles: usize,

    /// Seed for every random draw
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Elastic-net L1/L2 mixes searched by cross-validation
    #[arg(long, value_delimiter = ',')]
    penalty_mix: Option<Vec<f64>>,

    /// Cross-validation folds used to pick the penalty (needs at least this many rows)
    #[arg(long, default_value = "5")]
    cv_folds: usize,

    /// Stop once censored means change less than this between two cycles
    #[arg(long)]
    convergence_tol: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON summary.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (disabled if --json is set)
    init_logging(&args.log_level, args.quiet, args.json);

    for path in [&args.input, &args.bounds] {
        if !Path::new(path).exists() {
            return Err(anyhow!("Input file not found: {}", path));
        }
    }

    info!("Loading dataset from: {}", args.input);
    let data = read_csv(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    let limits = read_csv(&args.bounds)?;
    let bounds = bounds_from_frame(&limits, &data)?;
    info!("Detection limits: {:?}", bounds);

    let mut config_builder = ImputationConfig::builder()
        .inner_iters(args.inner_iters)
        .outer_cycles(args.outer_cycles)
        .seed(args.seed)
        .cv_folds(args.cv_folds);

    if let Some(ref mix) = args.penalty_mix {
        config_builder = config_builder.penalty_mix(mix.clone());
    }

    if let Some(tol) = args.convergence_tol {
        config_builder = config_builder.convergence_tol(tol);
    }

    let imputer = build_imputer(&args, config_builder.build()?)?;

    run_imputation(&imputer, &args, &data, &bounds)
}

fn build_imputer(args: &Args, config: ImputationConfig) -> Result<Imputer> {
    let mut builder = Imputer::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Run the imputation and write the outputs.
///
/// Output behavior:
/// - Default: Print human-readable summary to stdout
/// - `--json`: Print JSON to stdout only (no logs), including on failure
fn run_imputation(
    imputer: &Imputer,
    args: &Args,
    data: &polars::prelude::DataFrame,
    bounds: &[f64],
) -> Result<()> {
    let start_time = Instant::now();

    let mut outcome = match imputer.impute_frame(data, bounds) {
        Ok(outcome) => outcome,
        Err(e) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "success": false, "error": e }))?
                );
            }
            return Err(anyhow!("Imputation failed: {}", e));
        }
    };

    write_csv(&mut outcome.imputed, &args.output)?;
    info!("Imputed data written to: {}", args.output);

    if let Some(ref mask_path) = args.mask_output {
        write_csv(&mut outcome.mask, mask_path)?;
        info!("Censoring mask written to: {}", mask_path);
    }

    let summary = outcome.result.summary();

    if args.json {
        let report = json!({
            "success": true,
            "input_file": args.input,
            "output_file": args.output,
            "mask_file": args.mask_output,
            "duration_ms": start_time.elapsed().as_millis(),
            "summary": summary,
            "cycles": outcome.result.cycles,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&summary, args, start_time.elapsed().as_millis());
    Ok(())
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(summary: &ImputationSummary, args: &Args, duration_ms: u128) {
    println!();
    println!("{}", "=".repeat(80));
    println!("IMPUTATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        args.input, summary.rows, summary.columns
    );
    println!("Output: {}", args.output);
    if let Some(ref mask_path) = args.mask_output {
        println!("Mask:   {}", mask_path);
    }
    println!();

    println!("Run Summary:");
    println!("  Duration: {}ms", duration_ms);
    println!("  Seed: {}", summary.seed);
    println!("  Censored cells: {}", summary.censored_cells);
    println!("  Per column: {:?}", summary.censored_per_column);
    println!("  Cycles run: {}", summary.cycles_run);
    if let Some(change) = summary.final_max_change {
        println!("  Last change in censored means: {:.4}", change);
    }
    if summary.converged_early {
        println!("  Stopped early on the convergence tolerance");
    }
    println!();

    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}
