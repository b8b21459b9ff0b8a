//! GraphQL Insight CLI
//!
//! Search, introspect and analyze against an SDL file. Output is JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use graphql_insight::{InsightConfig, SchemaInsight};
use graphql_insight::store::FileSource;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphql-insight")]
#[command(about = "Search, introspect and analyze queries against a GraphQL schema")]
struct Cli {
    /// SDL file (overrides schema.path from the config)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Config file layered over insight.toml
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Print compact JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search types, fields and enum values
    Search {
        term: String,
        /// type, field, mutation, query, enum or any
        #[arg(short, long, default_value = "any")]
        filter: String,
        /// Context lines around each match
        #[arg(short = 'C', long)]
        context: Option<usize>,
    },

    /// Describe one type
    Introspect {
        type_name: String,
        /// Omit the relationship classification
        #[arg(long)]
        no_relationships: bool,
        /// Include deprecated fields and enum values
        #[arg(long)]
        include_deprecated: bool,
    },

    /// Analyze a query file ("-" reads stdin)
    Analyze {
        query: PathBuf,
        #[arg(long)]
        no_suggestions: bool,
    },

    /// Field usage across query files
    Usage {
        field: String,
        #[arg(required = true)]
        queries: Vec<PathBuf>,
        /// Free-form label echoed in the report
        #[arg(long)]
        time_range: Option<String>,
        #[arg(long)]
        no_recommendations: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = InsightConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(schema) = cli.schema {
        config.schema.path = Some(schema);
    }

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let schema_path = config.schema.path.clone();
    let insight = SchemaInsight::new(config)?;

    let needs_schema = !matches!(cli.command, Commands::Analyze { .. } | Commands::Usage { .. });
    match schema_path {
        Some(path) => {
            insight
                .refresh(&FileSource::new(&path))
                .with_context(|| format!("loading schema {}", path.display()))?;
        }
        None if needs_schema => bail!("no schema given; pass --schema or set schema.path"),
        None => {}
    }

    match cli.command {
        Commands::Search { term, filter, context } => {
            emit(&insight.search(&term, &filter, context)?, cli.compact)
        }
        Commands::Introspect {
            type_name,
            no_relationships,
            include_deprecated,
        } => emit(
            &insight.introspect(&type_name, !no_relationships, include_deprecated)?,
            cli.compact,
        ),
        Commands::Analyze { query, no_suggestions } => {
            let text = read_input(&query)?;
            emit(&insight.analyze(&text, !no_suggestions), cli.compact)
        }
        Commands::Usage {
            field,
            queries,
            time_range,
            no_recommendations,
        } => {
            let texts = queries
                .iter()
                .map(|path| read_input(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let report = insight.field_usage(&field, &texts, time_range.as_deref(), !no_recommendations)?;
            emit(&report, cli.compact)
        }
        Commands::Config => Ok(()),
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).context("reading stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn emit<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}
