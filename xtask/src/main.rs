use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "autorc workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the handle benchmarks and summarize them
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,
    },
    /// Run the loom model tests
    Loom {
        /// Upper bound on thread preemptions explored per model
        #[arg(long)]
        max_preemptions: Option<usize>,
    },
}

const BENCH: &str = "handle_benchmark";

#[derive(Deserialize)]
struct Estimates {
    mean: Estimate,
}

#[derive(Deserialize)]
struct Estimate {
    point_estimate: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench { quick, report_only } => {
            if !report_only {
                run_benchmarks(quick)?;
            }
            generate_report()?;
        }
        Commands::Loom { max_preemptions } => run_loom(max_preemptions)?,
    }

    Ok(())
}

fn run_benchmarks(quick: bool) -> Result<()> {
    println!(">>> Running {}...", BENCH);
    let start = Instant::now();

    let mut cmd = Command::new("cargo");
    cmd.env("CARGO_INCREMENTAL", "0");
    cmd.arg("bench").arg("--bench").arg(BENCH);

    // Args for the test runner (Criterion) go after --
    cmd.arg("--");
    if quick {
        cmd.arg("--measurement-time").arg("0.1");
        cmd.arg("--noplot");
        cmd.arg("--sample-size").arg("10");
    }

    let status = cmd.status().context("Failed to run cargo bench")?;
    if !status.success() {
        anyhow::bail!("Benchmark {} failed", BENCH);
    }
    println!("Finished {} in {:.2?}", BENCH, start.elapsed());
    Ok(())
}

fn run_loom(max_preemptions: Option<usize>) -> Result<()> {
    println!(">>> Running loom models...");
    let mut cmd = Command::new("cargo");
    cmd.env("RUSTFLAGS", "--cfg loom")
        .env("LOOM_MAX_PREEMPTIONS", max_preemptions.unwrap_or(3).to_string())
        .args(["test", "--release", "--test", "loom_refcount"]);

    let status = cmd.status().context("Failed to run loom tests")?;
    if !status.success() {
        anyhow::bail!("Loom models failed");
    }
    Ok(())
}

fn generate_report() -> Result<()> {
    println!("\n>>> Generating Report...");

    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        eprintln!("No criterion output found at {}", criterion_dir.display());
        return Ok(());
    }

    // group -> benchmark -> ops/s
    let mut results: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    collect_results(criterion_dir, &mut results);

    let report_path = Path::new("benchmark_results/report.md");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }

    use std::io::Write;
    let mut file = fs::File::create(report_path)?;

    writeln!(file, "# Handle Benchmark Report")?;

    for (group, benches) in &results {
        writeln!(file, "\n## {}\n", group)?;
        writeln!(file, "| Benchmark | Ops/s | vs fastest |")?;
        writeln!(file, "|---|---|---|")?;

        let fastest = benches.values().copied().fold(0.0_f64, f64::max);
        for (name, ops) in benches {
            let rel = if fastest > 0.0 { ops / fastest } else { 0.0 };
            writeln!(file, "| {} | {} | **{:.2}x** |", name, format_ops(*ops), rel)?;
        }
    }

    println!("Report written to {}", report_path.display());
    Ok(())
}

fn format_ops(ops: f64) -> String {
    if ops > 1_000_000.0 {
        format!("{:.2}M", ops / 1_000_000.0)
    } else if ops > 1_000.0 {
        format!("{:.2}K", ops / 1_000.0)
    } else {
        format!("{:.0}", ops)
    }
}

fn collect_results(dir: &Path, results: &mut BTreeMap<String, BTreeMap<String, f64>>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_results(&path, results);
            continue;
        }
        if path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }

        // Structure: .../<group>/<benchmark>/new/estimates.json
        let Some(run_dir) = path.parent() else { continue };
        if run_dir.file_name().and_then(|s| s.to_str()) != Some("new") {
            continue;
        }
        let Some(bench_dir) = run_dir.parent() else { continue };
        let Some(group_dir) = bench_dir.parent() else { continue };
        let (Some(bench), Some(group)) = (
            bench_dir.file_name().and_then(|s| s.to_str()),
            group_dir.file_name().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if bench == "report" || group == "report" {
            continue;
        }

        let Ok(content) = fs::read_to_string(&path) else { continue };
        let Ok(estimates) = serde_json::from_str::<Estimates>(&content) else { continue };
        let time_ns = estimates.mean.point_estimate;
        if time_ns > 0.0 {
            results
                .entry(group.to_string())
                .or_default()
                .insert(bench.to_string(), 1e9 / time_ns);
        }
    }
}
