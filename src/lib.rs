//! # Datasearch
//!
//! Search over event records with two query languages, a Lucene-like syntax
//! and a C-like criterion syntax, compiled to one backend-agnostic criteria
//! tree.
//!
//! ## Features
//!
//! - **Two syntaxes**: `severity:high -source:internal` or
//!   `severity = "high" && source != "internal"`
//! - **Field translation**: logical fields backed by several physical fields
//! - **Query planning**: listings, grouped counts and time-bucketed charts
//! - **Drill-down links**: every grouped row links to the events behind it
//!
//! ## Modules
//!
//! - [`query`]: parsers, compiler, planner, reconstructor and links
//! - [`provider`]: the backend interface and an in-memory implementation
//! - [`surface`]: per-datatype field metadata and search defaults
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datasearch::provider::{load_dataset, MemoryProvider};
//! use datasearch::query::{RequestContext, SearchParams};
//! use datasearch::surface::SearchSurface;
//! use datasearch::time::parse_timezone;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dataset = load_dataset(Path::new("events.json"))?;
//!     let provider = MemoryProvider::new().with_dataset("events", dataset);
//!     let surface = SearchSurface::builder("events", Arc::new(provider)).build()?;
//!
//!     let tz = parse_timezone("UTC").ok_or("bad timezone")?;
//!     let params = SearchParams::new("severity:high").group_by(["day"]);
//!     let mut planner = surface.planner(RequestContext::new(tz), params)?;
//!
//!     let step = planner.step();
//!     for item in planner.chart_items(step)? {
//!         println!("{} {}", item.label, item.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod highlight;
pub mod provider;
pub mod query;
pub mod surface;
pub mod time;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, LoggingConfig, SearchConfig};

pub use highlight::{Fragment, Highlight};

pub use provider::{
    load_dataset, DataProvider, Dataset, MemoryProvider, PathExpr, PathInfo, ProviderError,
    ProviderResult, QueryRequest, ResultSet, Row, Value,
};

pub use query::{
    ChartItem, Criteria, DrilldownLink, QueryError, QueryMode, QueryPlanner, QueryResult,
    RequestContext, SearchParams, TranslationTable,
};

pub use surface::{FieldInfo, SearchSurface};

pub use time::{Step, TimeRange, TimeUnit, UserTimezone};
