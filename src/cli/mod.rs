//! CLI module for codewiki

mod args;

pub use args::{Args, Command};

use crate::analysis::{Pipeline, RunReport};
use crate::config::Config;
use crate::error::{ErrorClass, Result};
use crate::explain::Enricher;
use crate::output::{self, DiagramGenerator, Document, SearchIndex};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "codewiki.toml";

/// Run the CLI application
pub fn run() -> ExitCode {
    let args = Args::parse_args();
    init_logging(args.verbose());

    match execute(args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(class = ?e.class(), "run aborted");
            eprintln!("Error: {}", e);
            if let Some(report) = e.report().filter(|r| !r.is_empty()) {
                eprintln!("Diagnostics gathered before the abort:");
                for line in diagnostic_lines(report, report.len()) {
                    eprintln!("{}", line);
                }
            }
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flag
fn init_logging(verbose: bool) {
    let default = if verbose { "codewiki=debug" } else { "codewiki=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(args: Args) -> Result<()> {
    match args.command {
        Command::Analyze {
            path,
            output,
            config,
            ai,
            ai_provider,
            security,
            exclude,
            verbose,
        } => {
            let config_path = config.unwrap_or_else(|| Path::new(DEFAULT_CONFIG).to_path_buf());
            let mut cfg = Config::load_or_default(&config_path)?;

            // CLI takes precedence
            cfg.merge_cli(output, exclude, ai, ai_provider, security);

            if verbose {
                println!("Analyzing: {}", path.display());
                println!("Output: {}", cfg.output.directory.display());
                println!("Security pass: {}", cfg.analyzers.security);
                println!(
                    "Enrichment: {}",
                    if cfg.enrichment.enabled {
                        format!("{:?}", cfg.enrichment.provider).to_lowercase()
                    } else {
                        "off".to_string()
                    }
                );
                println!("Exclude: {:?}", cfg.analysis.exclude);
            }

            let (document, index) = generate(&cfg, &path, verbose)?;
            let report = output::write(&document, &index, &cfg.output.directory, cfg.output.pretty)?;

            print_summary(&document);
            println!("{}", report.summary());
            println!("Documentation written to: {}", cfg.output.directory.display());
            Ok(())
        }

        Command::Version => {
            println!("codewiki {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Run the whole pipeline for `root` and return the emitted document and index
pub fn generate(config: &Config, root: &Path, verbose: bool) -> Result<(Document, SearchIndex)> {
    let pipeline = Pipeline::new(config.clone())?.with_verbose(verbose);
    let analysis = pipeline.analyze(root)?;

    let enricher = Enricher::from_config(&config.enrichment)?;
    let (enrichments, enrichment_report) = enricher.enrich_all_blocking(&analysis.graph, &analysis.project)?;

    let diagrams = DiagramGenerator::from_config(&config.output);
    let document = output::emit_with(&analysis, &enrichments, &enrichment_report, &diagrams);
    let index = output::index(&document);
    info!(files = document.files.len(), records = index.len(), "document ready");
    Ok((document, index))
}

fn print_summary(document: &Document) {
    let stats = &document.overview.stats;
    println!(
        "Analysis complete: {} files, {} symbols, {} edges ({} unresolved, {} ambiguous)",
        stats.files, stats.symbols, stats.edges, stats.unresolved, stats.ambiguous
    );

    let report = &document.report;
    if report.is_empty() {
        return;
    }
    println!(
        "\nRecoverable problems ({}): {} per-file, {} enrichment, {} annotation",
        report.len(),
        report.count(ErrorClass::RecoverablePerFile),
        report.count(ErrorClass::RecoverableEnrichment),
        report.count(ErrorClass::RecoverableAnnotation),
    );
    for line in diagnostic_lines(report, 5) {
        println!("{}", line);
    }
}

/// One indented line per diagnostic, up to `limit`, then a remainder count
fn diagnostic_lines(report: &RunReport, limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = report
        .diagnostics
        .iter()
        .take(limit)
        .map(|diag| {
            let place = diag
                .path
                .as_deref()
                .or(diag.key.as_deref())
                .unwrap_or("-");
            match diag.line {
                Some(line) => format!("  {}:{}: {}", place, line, diag.message),
                None => format!("  {}: {}", place, diag.message),
            }
        })
        .collect();
    if report.len() > limit {
        lines.push(format!("  ... and {} more", report.len() - limit));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RunDiagnostic;

    fn report(n: usize) -> RunReport {
        let mut report = RunReport::new();
        for i in 0..n {
            report.push(RunDiagnostic {
                class: ErrorClass::RecoverablePerFile,
                path: Some(format!("f{}.py", i)),
                line: (i > 0).then_some(i),
                key: None,
                message: "syntax error".to_string(),
            });
        }
        report
    }

    #[test]
    fn test_diagnostic_lines_cap() {
        let lines = diagnostic_lines(&report(7), 5);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "  f0.py: syntax error");
        assert_eq!(lines[1], "  f1.py:1: syntax error");
        assert_eq!(lines[5], "  ... and 2 more");
    }

    #[test]
    fn test_diagnostic_lines_uncapped() {
        assert_eq!(diagnostic_lines(&report(3), 3).len(), 3);
    }
}
