//! pm - promptmill command line
//!
//! Validates, inspects and expands Prompt documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use promptmill::cli::{Cli, Command, OutputFormat};
use promptmill::config::Config;
use promptmill::engine::{CompiledPrompt, Engine, discover_prompts};
use promptmill::validation::{Finding, ValidationReport};

fn setup_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level: {}", level))?;

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!("Logging initialized (level: {})", level);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(seed) = cli.rng_seed {
        config.generation.rng_seed = Some(seed);
    }
    config.validate().context("Invalid configuration")?;

    // Setup logging: CLI > config > info
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let mut engine = Engine::new(config.generation.clone());
    let ok = match cli.command {
        Command::Validate { paths, report } => cmd_validate(&engine, &paths, report.as_deref())?,
        Command::Inspect { prompt, format } => cmd_inspect(&mut engine, &prompt, format)?,
        Command::Generate { prompt, limit, format } => cmd_generate(&mut engine, &prompt, limit, format)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_finding(finding: &Finding) -> String {
    let label = if finding.is_error() {
        "error".red().bold()
    } else {
        "warning".yellow().bold()
    };
    let mut line = format!("{} [{}] {}", label, finding.category, finding.file.display());
    if let Some(field) = &finding.field {
        line.push_str(&format!(" ({})", field.cyan()));
    }
    line.push_str(&format!(": {}", finding.message));
    line
}

fn report_failure(report: &ValidationReport) {
    for finding in &report.findings {
        eprintln!("{}", print_finding(finding));
    }
    eprintln!(
        "{} {} error(s), {} warning(s)",
        "Validation failed:".red().bold(),
        report.errors().count(),
        report.warnings().count()
    );
}

fn cmd_validate(engine: &Engine, paths: &[PathBuf], report_path: Option<&Path>) -> Result<bool> {
    let mut prompts = Vec::new();
    for path in paths {
        if path.is_dir() {
            let found = discover_prompts(path);
            info!("Found {} prompt(s) under {}", found.len(), path.display());
            prompts.extend(found);
        } else {
            prompts.push(path.clone());
        }
    }
    if prompts.is_empty() {
        warn!("No prompt documents found");
        println!("No prompt documents found");
    }

    let mut combined = ValidationReport::new();
    for prompt in &prompts {
        let report = engine.validate(prompt);
        if report.is_empty() {
            println!("{} {}", "ok".green().bold(), prompt.display());
        } else {
            let status = if report.has_errors() {
                "FAIL".red().bold()
            } else {
                "ok".green().bold()
            };
            println!("{} {}", status, prompt.display());
            for finding in &report.findings {
                println!("  {}", print_finding(finding));
            }
        }
        combined.extend(report.findings);
    }

    println!(
        "{} prompt(s), {} error(s), {} warning(s)",
        prompts.len(),
        combined.errors().count(),
        combined.warnings().count()
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&combined).context("Failed to serialize report")?;
        fs::write(path, json).context(format!("Failed to write report to {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    Ok(!combined.has_errors())
}

fn compile(engine: &mut Engine, prompt: &Path) -> Option<CompiledPrompt> {
    match engine.compile(prompt) {
        Ok(compiled) => {
            for warning in &compiled.warnings {
                eprintln!("{}", print_finding(warning));
            }
            Some(compiled)
        }
        Err(report) => {
            report_failure(&report);
            None
        }
    }
}

fn cmd_inspect(engine: &mut Engine, prompt: &Path, format: OutputFormat) -> Result<bool> {
    let Some(compiled) = compile(engine, prompt) else {
        return Ok(false);
    };
    let summary = compiled.summary();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("{} ({})", summary.name.bold(), summary.source.display());
            println!("Mode: {:?}", summary.mode);
            println!();
            println!("Parameters:");
            for (key, value) in summary.parameters {
                println!("  {:20} {}", key, serde_json::to_string(value)?);
            }
            println!();
            println!("Positive: {}", summary.positive);
            println!("Negative: {}", summary.negative);
            println!();
            println!("Placeholders:");
            for slot in &summary.slots {
                let selector = if slot.selector.is_empty() {
                    String::new()
                } else {
                    format!("[{}]", slot.selector)
                };
                println!(
                    "  {:24} {:>4} variation(s)  weight {}  {}",
                    slot.name, slot.pool, slot.weight, selector
                );
            }
            println!("Nesting (outermost first): {}", summary.nesting.join(" > "));
            println!("Space size: {}", summary.space_size);
        }
    }
    Ok(true)
}

fn cmd_generate(engine: &mut Engine, prompt: &Path, limit: Option<usize>, format: OutputFormat) -> Result<bool> {
    let Some(compiled) = compile(engine, prompt) else {
        return Ok(false);
    };

    let mut count = 0usize;
    for combination in compiled.combinations().take(limit.unwrap_or(usize::MAX)) {
        match format {
            // One object per line so consumers can stream
            OutputFormat::Json => println!("{}", serde_json::to_string(&combination)?),
            OutputFormat::Text => {
                println!("#{} seed={}", combination.index, combination.seed);
                println!("  + {}", combination.positive);
                if !combination.negative.is_empty() {
                    println!("  - {}", combination.negative);
                }
            }
        }
        count += 1;
    }
    info!("Generated {} combination(s) from {}", count, prompt.display());
    Ok(true)
}
