//! Command-line interface and dispatch.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use crate::config::{self, DEFAULT_PAGE_SIZE};
use crate::indexer;
use crate::model::{SearchRequest, SortOrder};
use crate::normalize::value_token;
use crate::resolver::LinkResolver;
use crate::store::PaperStore;

#[derive(Parser, Debug)]
#[command(
    name = "papers",
    about = "Faceted full-text search over conference paper metadata",
    version
)]
pub struct Cli {
    /// SQLite database path (overrides PAPERS_DB_PATH and the default
    /// data-dir location).
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the search index from a corpus JSON file
    Index {
        /// Path to the source JSON file (top-level map with a 'results' list)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Search the indexed corpus
    Search {
        /// Full text query run against all fields
        query: Option<String>,

        /// Field filter as FIELD=VALUE; repeat for multiple values or fields
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        /// 1-based page index
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Results per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,

        /// Field to sort by; 'random' for a seeded shuffle (default: name)
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort direction: asc or desc
        #[arg(long, default_value = "asc")]
        sort_order: String,

        /// Seed for --sort-by random
        #[arg(long)]
        seed: Option<String>,

        /// Print the full JSON response instead of one line per hit
        #[arg(long)]
        json: bool,
    },

    /// Print the field type report and facet values
    Schema,

    /// Fetch a single document by id
    Get { id: i64 },

    /// Resolve an external link for a document's title
    Link { id: i64 },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = config::database_path(cli.db.as_deref());

    match cli.command {
        Commands::Index { input } => {
            let summary = indexer::build_index(&input, &db_path)
                .with_context(|| format!("index build from {} failed", input.display()))?;
            println!(
                "Indexed {} documents ({} columns) into {}",
                summary.documents,
                summary.columns,
                db_path.display()
            );
            Ok(())
        }

        Commands::Search {
            query,
            filters,
            page,
            page_size,
            sort_by,
            sort_order,
            seed,
            json,
        } => {
            let request = SearchRequest {
                query,
                filters: parse_filter_args(&filters)?,
                page,
                page_size,
                sort_by,
                sort_order: sort_order.parse::<SortOrder>()?,
                seed,
            }
            .validated()?;

            let store = PaperStore::open(&db_path)?;
            let response = store.search(&request)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!(
                    "{} matches (page {} of size {})",
                    response.total, response.page, response.page_size
                );
                for document in &response.results {
                    let id = document.get("id").map(value_token).unwrap_or_default();
                    let name = document
                        .get("name")
                        .or_else(|| document.get("title"))
                        .map(value_token)
                        .unwrap_or_default();
                    println!("{id}\t{name}");
                }
            }
            Ok(())
        }

        Commands::Schema => {
            let store = PaperStore::open(&db_path)?;
            println!("{}", serde_json::to_string_pretty(store.schema())?);
            Ok(())
        }

        Commands::Get { id } => {
            let store = PaperStore::open(&db_path)?;
            match store.get(id) {
                Some(document) => {
                    println!("{}", serde_json::to_string_pretty(document)?);
                    Ok(())
                }
                None => bail!("paper {id} not found"),
            }
        }

        Commands::Link { id } => {
            let store = PaperStore::open(&db_path)?;
            let Some(document) = store.get(id) else {
                bail!("paper {id} not found");
            };
            let title = document
                .get("name")
                .or_else(|| document.get("title"))
                .and_then(Value::as_str)
                .with_context(|| format!("paper {id} has no title field"))?;

            let resolver = LinkResolver::offline();
            let resolution = resolver.resolve(title);
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(())
        }
    }
}

/// Turn repeated `FIELD=VALUE` flags into the filters map. Repeating a
/// field collects its values into a list (OR semantics within the field).
fn parse_filter_args(args: &[String]) -> anyhow::Result<BTreeMap<String, Value>> {
    let mut filters: BTreeMap<String, Value> = BTreeMap::new();
    for arg in args {
        let Some((field, value)) = arg.split_once('=') else {
            bail!("invalid --filter {arg:?}: expected FIELD=VALUE");
        };
        if field.is_empty() {
            bail!("invalid --filter {arg:?}: empty field name");
        }
        match filters.get_mut(field) {
            Some(Value::Array(existing)) => existing.push(json!(value)),
            Some(single) => {
                let first = single.take();
                *single = json!([first, value]);
            }
            None => {
                filters.insert(field.to_string(), json!(value));
            }
        }
    }
    Ok(filters)
}
