//! Datasearch CLI
//!
//! Command-line interface for searching event datasets:
//! - Search with Lucene or criterion queries, listed or grouped
//! - Inspect how a query parses and compiles
//! - List the fields of a dataset
//! - Write a default configuration file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use datasearch::config::{generate_default_config, Config, LoggingConfig};
use datasearch::highlight::{Fragment, Highlight};
use datasearch::provider::{load_dataset, MemoryProvider, Row, Value};
use datasearch::query::{
    parse_criterion, parse_lucene, Compiler, QueryMode, RequestContext, SearchParams,
};
use datasearch::surface::SearchSurface;
use datasearch::time::TimeRange;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "datasearch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search event datasets with Lucene or criterion queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default locations and environment otherwise)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the dataset
    Search {
        /// Query text; empty lists everything
        #[arg(default_value = "")]
        query: String,
        /// Query language (lucene, criterion)
        #[arg(short, long)]
        mode: Option<String>,
        /// Grouping fields or one time unit (year, month, day, hour, minute)
        #[arg(short, long, value_delimiter = ',')]
        group_by: Vec<String>,
        /// Only events in the last period (e.g. 24h, 7d, 4w)
        #[arg(short, long)]
        last: Option<String>,
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,
        /// Rows per page (config default otherwise)
        #[arg(long)]
        rows: Option<usize>,
        /// Sort as field:order, e.g. severity:asc
        #[arg(long)]
        sort: Option<String>,
        /// Dataset file overriding the configured one
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Base URL for drill-down links of grouped rows
        #[arg(long, default_value = "/search")]
        link_base: String,
    },

    /// Show how a query parses and compiles
    Parse {
        query: String,
        /// Query language (lucene, criterion)
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// List the dataset's fields
    Fields {
        /// Dataset file overriding the configured one
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            group_by,
            last,
            page,
            rows,
            sort,
            dataset,
            link_base,
        } => {
            let surface = build_surface(&config, dataset.as_deref())?;
            let mut context = RequestContext::new(config.timezone()?);
            if let Some(last) = &last {
                context = context.with_window(parse_window(last)?);
            }

            let groupby = if group_by.is_empty() {
                surface.default_groupby().to_vec()
            } else {
                group_by
            };
            let mut params = SearchParams::new(query).group_by(groupby);
            if let Some(mode) = mode.as_deref() {
                params = params.mode(parse_mode(mode)?);
            }

            let sort = sort.as_deref().map(|s| s.split_once(':').unwrap_or((s, "desc")));
            let rows = rows.unwrap_or(config.search.default_limit);
            let mut planner = surface.prepare(context, params, page, rows, sort)?;

            if planner.is_aggregate() {
                let step = planner.step();
                let items = planner.chart_items(step)?;

                if cli.format == "json" {
                    println!("{}", serde_json::to_string_pretty(&items)?);
                } else if items.is_empty() {
                    println!("No matching events");
                } else {
                    println!("{:<40} {:>8}  {}", planner.groupby().join(", "), "Count", "Link");
                    println!("{}", "-".repeat(60));
                    for item in &items {
                        println!(
                            "{:<40} {:>8}  {}",
                            item.label,
                            item.value.to_string(),
                            item.link.to_url(&link_base)
                        );
                    }
                }
            } else {
                let headers: Vec<String> = surface.fields().iter().map(|f| f.field.clone()).collect();
                let results = planner.get_result()?;
                let total = results.total();
                let rows: Vec<Row> = results.collect::<Result<_, _>>()?;

                if cli.format == "json" {
                    let records: Vec<serde_json::Value> = rows
                        .iter()
                        .map(|row| row_to_json(&headers, row, surface.highlight()))
                        .collect();
                    let body = serde_json::json!({ "total": total, "rows": records });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                } else {
                    print_table(&headers, &rows, surface.highlight());
                    println!();
                    println!("{} of {} events", rows.len(), total);
                }
            }
        }

        Commands::Parse { query, mode } => {
            let mode = match mode.as_deref() {
                Some(mode) => parse_mode(mode)?,
                None => config.search.query_mode,
            };
            let translations = config.translation_table()?;
            let datatype = config.search.datatype.as_str();

            let tree = match mode {
                QueryMode::Lucene => parse_lucene(&query)?.to_string(),
                QueryMode::Criterion => format!("{:?}", parse_criterion(&query)?),
            };
            let criteria = Compiler::new(datatype, &translations).compile(&query, mode)?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&criteria)?);
            } else {
                println!("Parsed ({}):  {}", mode, tree);
                println!(
                    "Lucene:     {}",
                    criteria.to_query_string(QueryMode::Lucene, Some(datatype))
                );
                println!(
                    "Criterion:  {}",
                    criteria.to_query_string(QueryMode::Criterion, Some(datatype))
                );
            }
        }

        Commands::Fields { dataset } => {
            let surface = build_surface(&config, dataset.as_deref())?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(surface.fields())?);
            } else {
                println!("{:<4} {:<30} {:<10} {:<10} {}", "#", "Field", "Type", "Filter", "Group");
                println!("{}", "-".repeat(64));
                for f in surface.fields() {
                    println!(
                        "{:<4} {:<30} {:<10} {:<10} {}",
                        f.column_index,
                        f.field,
                        format!("{:?}", f.info.field_type).to_lowercase(),
                        f.info.filterable,
                        f.info.groupable
                    );
                }
            }
        }

        Commands::InitConfig { output } => match output {
            Some(path) => {
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                std::fs::write(&path, generate_default_config())
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote default config to {}", path.display());
            }
            None => print!("{}", generate_default_config()),
        },
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("datasearch={}", config.level)));

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .try_init()?;
    }
    Ok(())
}

fn build_surface(config: &Config, dataset: Option<&Path>) -> anyhow::Result<SearchSurface> {
    let path = dataset.unwrap_or_else(|| Path::new(&config.dataset.path));
    let records = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;

    let search = &config.search;
    let provider = MemoryProvider::new().with_dataset(search.datatype.as_str(), records);

    let mut builder = SearchSurface::builder(search.datatype.as_str(), Arc::new(provider))
        .translations(config.translation_table()?)
        .default_columns(search.default_columns.iter().cloned())
        .default_mode(search.query_mode)
        .time_field(search.time_field.as_str())
        .default_groupby(search.groupby_default.iter().cloned());
    if let Some(sort) = &search.sort_path_default {
        builder = builder.default_sort(sort.as_str());
    }
    Ok(builder.build()?)
}

fn parse_mode(s: &str) -> anyhow::Result<QueryMode> {
    match QueryMode::from_str(s) {
        Some(mode) => Ok(mode),
        None => bail!("Invalid query mode: {}. Use: lucene, criterion", s),
    }
}

fn parse_window(s: &str) -> anyhow::Result<TimeRange> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        Ok(TimeRange::last_hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(TimeRange::last_days(days.parse()?))
    } else if let Some(weeks) = s.strip_suffix('w') {
        Ok(TimeRange::last_days(weeks.parse::<i64>()?.saturating_mul(7)))
    } else {
        bail!("Invalid period: {}. Use: 24h, 7d, 4w", s)
    }
}

fn display_value(value: &Value, highlight: &Highlight) -> String {
    match value {
        Value::Text(text) => highlight
            .fragments(text)
            .into_iter()
            .map(|fragment| match fragment {
                Fragment::Plain(s) => s.to_string(),
                Fragment::Match(s) => format!("*{}*", s),
            })
            .collect(),
        other => other.to_string(),
    }
}

fn row_to_json(headers: &[String], row: &Row, highlight: &Highlight) -> serde_json::Value {
    let record: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .zip(row)
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let value = match value {
                Value::Text(text) => serde_json::Value::String(highlight.strip(text)),
                other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
            };
            (name.clone(), value)
        })
        .collect();
    serde_json::Value::Object(record)
}

fn print_table(headers: &[String], rows: &[Row], highlight: &Highlight) {
    if rows.is_empty() {
        println!("No matching events");
        return;
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|v| display_value(v, highlight)).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
                .min(40)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", truncate(v, *w), width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(headers.iter().map(String::as_str).collect()));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
    for row in &cells {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
