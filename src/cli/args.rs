//! CLI argument parsing

use crate::config::ProviderKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build a cross-referenced documentation model of a codebase
#[derive(Parser, Debug)]
#[command(name = "codewiki")]
#[command(about = "Build a cross-referenced documentation model of a codebase")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    pub fn verbose(&self) -> bool {
        match &self.command {
            Command::Analyze { verbose, .. } => *verbose,
            Command::Version => false,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a source tree and write document.json and search_index.json
    Analyze {
        /// Root directory of the source tree
        path: PathBuf,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file path (default: codewiki.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable AI enrichment
        #[arg(long)]
        ai: bool,

        /// Enrichment provider (mock, ollama, openai)
        #[arg(long, value_parser = parse_provider)]
        ai_provider: Option<ProviderKind>,

        /// Enable the security pass
        #[arg(long)]
        security: bool,

        /// Glob patterns to exclude (can be repeated)
        #[arg(long)]
        exclude: Vec<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show version information
    Version,
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    match s.to_lowercase().as_str() {
        "mock" => Ok(ProviderKind::Mock),
        "ollama" => Ok(ProviderKind::Ollama),
        "openai" => Ok(ProviderKind::OpenAI),
        other => Err(format!("unknown provider `{}` (expected mock, ollama or openai)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_defaults() {
        let args = Args::try_parse_from(["codewiki", "analyze", "./src"]).unwrap();
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
                assert_eq!(path, PathBuf::from("./src"));
                assert_eq!(output, None);
                assert_eq!(config, None);
                assert!(!ai);
                assert_eq!(ai_provider, None);
                assert!(!security);
                assert!(exclude.is_empty());
                assert!(!verbose);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_analyze_with_options() {
        let args = Args::try_parse_from([
            "codewiki", "analyze", "./project",
            "--output", "/tmp/docs",
            "--config", "custom.toml",
            "--ai",
            "--ai-provider", "ollama",
            "--security",
            "--exclude", "tests/**",
            "--exclude", "fixtures/**",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose());

        match args.command {
            Command::Analyze {
                path,
                output,
                config,
                ai,
                ai_provider,
                security,
                exclude,
                ..
            } => {
                assert_eq!(path, PathBuf::from("./project"));
                assert_eq!(output, Some(PathBuf::from("/tmp/docs")));
                assert_eq!(config, Some(PathBuf::from("custom.toml")));
                assert!(ai);
                assert_eq!(ai_provider, Some(ProviderKind::Ollama));
                assert!(security);
                assert_eq!(exclude, vec!["tests/**".to_string(), "fixtures/**".to_string()]);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Args::try_parse_from(["codewiki", "analyze", ".", "--ai-provider", "bard"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_path_rejected() {
        assert!(Args::try_parse_from(["codewiki", "analyze"]).is_err());
    }

    #[test]
    fn test_version_command() {
        let args = Args::try_parse_from(["codewiki", "version"]).unwrap();
        assert!(matches!(args.command, Command::Version));
        assert!(!args.verbose());
    }
}
