//! Command-line argument parsing for reviewrag
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::store::MetadataFilter;
use crate::types::{PassageId, Sentiment};

/// reviewrag - Ask questions about product reviews and get cited answers
#[derive(Parser, Debug)]
#[command(name = "reviewrag")]
#[command(version)]
#[command(about = "Index product reviews and answer questions over them with cited sources", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, env = "REVIEWRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse, chunk, embed and index a JSON Lines file of reviews
    Ingest {
        /// Input file, one JSON review per line
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,

        /// Concurrent embedding/indexing batches
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Answer a question; starts an interactive session without one
    Ask {
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Print the cited review text under the answer
        #[arg(long)]
        show_sources: bool,
    },

    /// Delete indexed passages by id
    Delete {
        #[arg(value_name = "PASSAGE_ID", required = true)]
        ids: Vec<PassageId>,
    },

    /// Drop the whole collection
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show index statistics
    Stats,

    /// Display current configuration
    Config,
}

/// Metadata constraints for `ask`
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Only reviews of this product
    #[arg(long)]
    pub product: Option<String>,

    #[arg(long)]
    pub min_rating: Option<f32>,

    #[arg(long)]
    pub max_rating: Option<f32>,

    /// Reviews at or after this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<i64>,

    /// Reviews at or before this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<i64>,

    /// positive, negative or neutral
    #[arg(long)]
    pub sentiment: Option<Sentiment>,

    /// Aspect label, e.g. battery or shipping
    #[arg(long)]
    pub aspect: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> MetadataFilter {
        MetadataFilter {
            product_id: self.product.clone(),
            min_rating: self.min_rating,
            max_rating: self.max_rating,
            since: self.since,
            until: self.until,
            sentiment: self.sentiment,
            aspect: self.aspect.as_ref().map(|a| a.to_lowercase()),
        }
    }
}

/// Epoch milliseconds from an RFC 3339 timestamp or a plain date
fn parse_time(value: &str) -> Result<i64, String> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(ts.timestamp_millis());
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| format!("invalid time '{}': expected RFC 3339 or YYYY-MM-DD", value))
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show per-run statistics
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["reviewrag", "-q", "stats"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["reviewrag", "stats"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["reviewrag", "stats", "-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["reviewrag", "-vv", "stats"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_ingest_args() {
        let args = parse(&["reviewrag", "ingest", "reviews.jsonl", "--limit", "10", "--workers", "2"]);
        match args.command {
            Commands::Ingest { file, limit, workers } => {
                assert_eq!(file, PathBuf::from("reviews.jsonl"));
                assert_eq!(limit, Some(10));
                assert_eq!(workers, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_filters() {
        let args = parse(&[
            "reviewrag",
            "ask",
            "how is the battery?",
            "-k",
            "3",
            "--product",
            "B01",
            "--min-rating",
            "4",
            "--since",
            "2024-01-01",
            "--sentiment",
            "positive",
            "--aspect",
            "Battery",
        ]);
        match args.command {
            Commands::Ask { query, top_k, filter, show_sources } => {
                assert_eq!(query.as_deref(), Some("how is the battery?"));
                assert_eq!(top_k, Some(3));
                assert!(!show_sources);
                let filter = filter.to_filter();
                assert_eq!(filter.product_id.as_deref(), Some("B01"));
                assert_eq!(filter.min_rating, Some(4.0));
                assert_eq!(filter.since, Some(1_704_067_200_000));
                assert_eq!(filter.sentiment, Some(Sentiment::Positive));
                assert_eq!(filter.aspect.as_deref(), Some("battery"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_without_query_is_interactive() {
        match parse(&["reviewrag", "ask"]).command {
            Commands::Ask { query, filter, .. } => {
                assert!(query.is_none());
                assert!(filter.to_filter().is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_time_is_rejected() {
        assert!(Args::try_parse_from(["reviewrag", "ask", "q", "--since", "yesterday"]).is_err());
        assert_eq!(parse_time("2024-01-01T00:00:00Z"), Ok(1_704_067_200_000));
    }

    #[test]
    fn test_delete_requires_valid_ids() {
        let id = PassageId::derive("r1", 0).to_string();
        match parse(&["reviewrag", "delete", &id]).command {
            Commands::Delete { ids } => assert_eq!(ids, vec![PassageId::derive("r1", 0)]),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Args::try_parse_from(["reviewrag", "delete", "not-a-uuid"]).is_err());
        assert!(Args::try_parse_from(["reviewrag", "delete"]).is_err());
    }
}
