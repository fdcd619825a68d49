//! effect-reanalysis: CLI entry point.
//!
//! Recomputes the comparisons of one or more studies from their summary
//! statistics and prints them, optionally with a specification curve.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use effect_reanalysis::batch::{
    run_study, ComparisonOutcome, ContrastOutcome, ExpectationCheck, RunSettings, StudyReport,
};
use effect_reanalysis::multiverse::{run_multiverse, SpecificationCurve};
use effect_reanalysis::study::{load_study_file, StudyFile};
use effect_reanalysis::types::VarianceAssumption;

#[derive(Parser)]
#[command(name = "effect-reanalysis")]
#[command(about = "Recompute effect sizes from published summary statistics")]
#[command(version)]
struct Cli {
    /// Study files or directories of study files (YAML).
    #[arg(default_value = "studies")]
    paths: Vec<PathBuf>,

    /// Confidence level for effect-size intervals (overrides the study file).
    #[arg(short, long)]
    confidence: Option<f64>,

    /// Assume equal variances (pooled t-test) instead of Welch.
    #[arg(long)]
    equal_variance: bool,

    /// Also build the specification curve over all analytic variants.
    #[arg(long)]
    multiverse: bool,

    /// Write all results as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Everything written by `--json`.
#[derive(Serialize)]
struct JsonOutput<'a> {
    reports: &'a [StudyReport],
    curves: &'a [SpecificationCurve],
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(level) = cli.confidence {
        if !(level > 0.0 && level < 1.0) {
            anyhow::bail!("Confidence level must be in (0, 1), got {level}");
        }
    }

    let studies = load_studies(&cli.paths)?;
    if studies.is_empty() {
        anyhow::bail!("No study files found");
    }

    println!("{}", "effect-reanalysis".bold());
    println!("  Studies: {}", studies.len());
    if let Some(level) = cli.confidence {
        println!("  Confidence: {level}");
    }
    if cli.equal_variance {
        println!("  Variance: pooled (override)");
    }
    println!();

    let start = Instant::now();
    let mut reports = Vec::new();
    let mut curves = Vec::new();

    for study in &studies {
        let settings = settings_for(study, &cli);
        let report = run_study(study, &settings);
        print_report(&report);
        reports.push(report);

        if cli.multiverse {
            let curve = run_multiverse(study, &settings.options);
            print_curve(&curve);
            curves.push(curve);
        }
    }

    let elapsed = start.elapsed();

    if let Some(ref path) = cli.json {
        let output = JsonOutput {
            reports: &reports,
            curves: &curves,
        };
        let json = serde_json::to_string_pretty(&output)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write JSON output: {}", path.display()))?;
        println!("  Wrote {}", path.display());
    }

    // Summary
    println!();
    println!("{}", "=".repeat(60));

    let computed: usize = reports.iter().map(|r| r.computed().count()).sum();
    let failed: usize = reports.iter().map(|r| r.failures().count()).sum();
    let checks_passed = reports
        .iter()
        .flat_map(|r| &r.checks)
        .filter(|c| c.is_pass())
        .count();
    let checks_failed = reports
        .iter()
        .flat_map(|r| &r.checks)
        .filter(|c| c.is_fail())
        .count();

    if failed == 0 && checks_failed == 0 {
        println!(
            "  {} {} comparisons, {} checks passed in {:.2}s",
            "OK".green(),
            computed.to_string().green(),
            checks_passed,
            elapsed.as_secs_f64()
        );
    } else {
        println!(
            "  {} {} comparisons, {} failed, {} checks passed, {} checks failed in {:.2}s",
            "FAIL".red(),
            computed,
            failed.to_string().red(),
            checks_passed,
            checks_failed.to_string().red(),
            elapsed.as_secs_f64()
        );
    }

    println!("{}", "=".repeat(60));

    if checks_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn settings_for(study: &StudyFile, cli: &Cli) -> RunSettings {
    let mut settings = RunSettings::from_study(study);
    if let Some(level) = cli.confidence {
        settings.options.confidence_level = level;
    }
    if cli.equal_variance {
        settings.options.variance = VarianceAssumption::from_equal_variance(true);
    }
    settings
}

fn load_studies(paths: &[PathBuf]) -> anyhow::Result<Vec<StudyFile>> {
    let mut studies = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Failed to read directory: {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_study_file(p))
                .collect();
            files.sort();
            for file in files {
                match load_study_file(&file) {
                    Ok(study) => studies.push(study),
                    Err(e) => {
                        eprintln!("{} {e:#}", "Warning:".yellow());
                    }
                }
            }
        } else if path.exists() {
            studies.push(load_study_file(path)?);
        } else {
            anyhow::bail!("Study path not found: {}", path.display());
        }
    }

    Ok(studies)
}

fn is_study_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "yaml" || e == "yml")
}

fn format_p(p: f64) -> String {
    if p < 1e-4 {
        format!("{p:.2e}")
    } else {
        format!("{p:.4}")
    }
}

fn print_report(report: &StudyReport) {
    println!(
        "{} {} ({}, {:.0}% CI)",
        "Study".cyan(),
        report.study.bold(),
        report.settings.options.variance,
        report.settings.options.confidence_level * 100.0
    );

    for outcome in &report.comparisons {
        print_comparison(outcome);
    }

    if !report.checks.is_empty() {
        println!("  {}", "Published values".dimmed());
        for check in &report.checks {
            print_check(check);
        }
    }

    if !report.contrasts.is_empty() {
        println!("  {}", "Contrasts".dimmed());
        for contrast in &report.contrasts {
            print_contrast(contrast);
        }
    }

    println!();
}

fn print_comparison(outcome: &ComparisonOutcome) {
    match outcome {
        ComparisonOutcome::Computed {
            key,
            result,
            adjusted,
            p_adjusted,
        } => {
            println!("  {} {}", "✓".green(), key);
            let corrected = match p_adjusted {
                Some(p) => format!(", p_bonf = {}", format_p(*p)),
                None => String::new(),
            };
            println!(
                "      t({:.2}) = {:.3}, p = {}{corrected}",
                result.degrees_of_freedom,
                result.t_statistic,
                format_p(result.p_value)
            );
            println!(
                "      d = {:.3} [{:.3}, {:.3}], g = {:.3} [{:.3}, {:.3}]",
                result.cohen_d,
                result.cohen_d_lower,
                result.cohen_d_upper,
                result.hedges_g,
                result.ci_lower,
                result.ci_upper
            );
            if let Some(adj) = adjusted {
                println!(
                    "      baseline-adjusted g = {:.3} [{:.3}, {:.3}]",
                    adj.adjusted_g, adj.adjusted_lower, adj.adjusted_upper
                );
            }
        }
        ComparisonOutcome::Failed { key, error } => {
            println!("  {} {}", "✗".red(), key.to_string().red());
            println!("      {error}");
        }
    }
}

fn print_check(check: &ExpectationCheck) {
    match check {
        ExpectationCheck::Pass { name, details } => {
            println!("  {} {} {}", "✓".green(), name, details.dimmed());
        }
        ExpectationCheck::Fail { name, reason } => {
            println!("  {} {}", "✗".red(), name.red());
            println!("      {reason}");
        }
        ExpectationCheck::Missing { name, reason } => {
            println!("  {} {} ({})", "○".yellow(), name.dimmed(), reason.dimmed());
        }
    }
}

fn print_contrast(contrast: &ContrastOutcome) {
    match contrast {
        ContrastOutcome::Computed {
            label,
            first_g,
            second_g,
            difference,
        } => {
            println!(
                "  {} {}: g {:.3} vs {:.3}, z = {:.3}, p = {}",
                "✓".green(),
                label,
                first_g,
                second_g,
                difference.z_statistic,
                format_p(difference.p_value)
            );
        }
        ContrastOutcome::Failed { label, error } => {
            println!("  {} {}", "✗".red(), label.red());
            println!("      {error}");
        }
    }
}

fn print_curve(curve: &SpecificationCurve) {
    println!(
        "{} {} ({} variants, {} points, {} failed)",
        "Specification curve".cyan(),
        curve.study.bold(),
        curve.variants.len(),
        curve.points.len(),
        curve.failures
    );
    for point in &curve.points {
        let marker = if point.excludes_zero() {
            "●".green()
        } else {
            "○".yellow()
        };
        println!(
            "  {:>3} {} {:>7.3} [{:>7.3}, {:>7.3}]  {}",
            point.rank,
            marker,
            point.estimate,
            point.ci_lower,
            point.ci_upper,
            point.label().dimmed()
        );
    }
    if let Some(median) = curve.median_estimate() {
        println!(
            "  median g = {median:.3}, {:.0}% of intervals exclude zero",
            curve.share_excluding_zero() * 100.0
        );
    }
    println!();
}
