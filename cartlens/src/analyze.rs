//! cartlens-analyze - CLI tool to run batch analytics over a generated
//! e-commerce dataset directory.
//!
//! Loads the dataset, runs the full pipeline, and either prints a run
//! summary or writes every result table as a CSV file.

use anyhow::{Context, Result};
use cartlens_core::analytics::{self, render_csv, AnalyticsReport, TableRow};
use cartlens_core::{Config, RawDataset};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cartlens-analyze")]
#[command(about = "Run batch analytics over a generated e-commerce dataset")]
#[command(version)]
struct Args {
    /// Dataset directory containing users.json, categories.json,
    /// products.json, transactions.json and sessions_*.json
    #[arg(short, long)]
    input: PathBuf,

    /// Write result tables as CSV files into this directory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Config file path (default: ~/.config/cartlens/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Verbose output (list every recorded error, not just a sample)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard =
        cartlens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let raw = RawDataset::load_dir(&args.input)
        .with_context(|| format!("failed to load dataset from {:?}", args.input))?;

    let report = analytics::run(raw, &config).context("analytics run failed")?;

    if let Some(out_dir) = &args.out {
        write_tables(&report, out_dir)?;
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_summary(&report, args.verbose),
    }

    Ok(())
}

fn write_table<R: TableRow>(out_dir: &Path, name: &str, rows: &[R]) -> Result<()> {
    let path = out_dir.join(name);
    std::fs::write(&path, render_csv(rows))
        .with_context(|| format!("failed to write {:?}", path))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Table written");
    Ok(())
}

fn write_tables(report: &AnalyticsReport, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {:?}", out_dir))?;

    write_table(out_dir, "funnel_summary.csv", &report.funnel_summary)?;
    write_table(out_dir, "popularity_revenue.csv", &report.popularity_revenue)?;
    write_table(out_dir, "revenue_by_category.csv", &report.revenue_by_category)?;
    write_table(out_dir, "cohort_curves.csv", &report.cohort_curves)?;
    write_table(out_dir, "user_clv.csv", &report.user_clv)?;
    write_table(out_dir, "cohort_clv.csv", &report.cohort_clv)?;
    write_table(out_dir, "affinity_pairs.csv", &report.affinity_pairs)?;
    Ok(())
}

fn print_text_summary(report: &AnalyticsReport, verbose: bool) {
    println!(
        "Window: {} .. {}",
        report.window.start.format("%Y-%m-%d"),
        report.window.end.format("%Y-%m-%d")
    );
    println!(
        "Input: {} users, {} products, {} sessions, {} transactions",
        report.input_counts.users,
        report.input_counts.products,
        report.input_counts.sessions,
        report.input_counts.transactions
    );
    if report.skipped_empty_sessions > 0 {
        println!("Skipped {} session(s) with no events", report.skipped_empty_sessions);
    }

    println!("\nFunnel:");
    for row in &report.funnel_summary {
        println!(
            "  {:<9} {:>8} sessions  ({:.1}% from previous)",
            row.stage,
            row.sessions,
            row.conversion_from_previous * 100.0
        );
    }

    println!("\nTables:");
    println!("  popularity_revenue:  {:>6} rows", report.popularity_revenue.len());
    println!("  revenue_by_category: {:>6} rows", report.revenue_by_category.len());
    println!("  cohort_curves:       {:>6} rows", report.cohort_curves.len());
    println!("  user_clv:            {:>6} rows", report.user_clv.len());
    println!("  cohort_clv:          {:>6} rows", report.cohort_clv.len());
    println!("  affinity_pairs:      {:>6} rows", report.affinity_pairs.len());

    for run in &report.runs {
        println!(
            "  [{}] {} rows in {}ms",
            run.component, run.rows_produced, run.duration_ms
        );
    }

    if !report.errors.is_empty() {
        println!(
            "\n{} record(s) excluded ({:.2}% error rate):",
            report.errors.len(),
            report.errors.error_rate() * 100.0
        );
        let shown = if verbose {
            report.errors.errors.len()
        } else {
            report.errors.errors.len().min(10)
        };
        for error in &report.errors.errors[..shown] {
            println!("  - {}", error);
        }
        if shown < report.errors.errors.len() {
            println!(
                "  ... and {} more (use --verbose to list all)",
                report.errors.errors.len() - shown
            );
        }
    }
}
