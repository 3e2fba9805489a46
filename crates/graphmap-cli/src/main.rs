//! CLI entry point for graphmap administration.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use graphmap_core::config::Settings;
use graphmap_core::mapper::{MapperRegistry, NodeRecordMapper};
use graphmap_core::paging::{FindOptions, Page, Sort};
use graphmap_core::statement::Statement;
use graphmap_core::types::{Params, Value};
use graphmap_graph::{AsyncRepository, GraphClient, GraphConfig, TransactionCoordinator};

#[derive(Parser)]
#[command(name = "graphmap")]
#[command(about = "Inspect and query a graphmap Neo4j database")]
struct Cli {
    /// Config file prefix (default: graphmap).
    #[arg(short, long, default_value = "graphmap")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the database answers.
    Ping,

    /// Count nodes with a label.
    Count {
        #[arg(short, long)]
        label: String,
    },

    /// Fetch one node by its `id` property.
    Get {
        #[arg(short, long)]
        label: String,

        #[arg(long)]
        id: String,
    },

    /// List nodes with a label.
    List {
        #[arg(short, long)]
        label: String,

        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        size: u32,

        /// Sort key, `property` or `property:desc`. Repeatable.
        #[arg(long)]
        sort: Vec<String>,
    },

    /// Run a Cypher statement and print the rows.
    Query {
        #[arg(long)]
        cypher: String,

        /// Parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
    },
}

type NodeRepository = AsyncRepository<GraphClient, NodeRecordMapper>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    tracing::debug!(config = %cli.config, uri = %settings.neo4j.uri, "Loaded settings");
    let client = GraphClient::connect(&GraphConfig::from(&settings.neo4j)).await?;

    let output = match cli.command {
        Command::Ping => {
            let started = std::time::Instant::now();
            client
                .query_rows(&Statement::raw("RETURN 1 AS ok", Params::new()))
                .await?;
            serde_json::json!({ "ok": true, "elapsed_ms": started.elapsed().as_millis() as u64 })
        }
        Command::Count { label } => {
            let count = repository(&client, &label, &settings).count(None).await?;
            serde_json::json!({ "label": label, "count": count })
        }
        Command::Get { label, id } => {
            let record = repository(&client, &label, &settings)
                .find_by_id(id.as_str())
                .await?
                .ok_or_else(|| anyhow::anyhow!("No {label} node with id {id}"))?;
            serde_json::to_value(record)?
        }
        Command::List {
            label,
            page,
            size,
            sort,
        } => {
            let mut options = FindOptions::new().page(Page::new(page, size));
            for spec in &sort {
                let key = Sort::parse(spec)
                    .ok_or_else(|| anyhow::anyhow!("Invalid sort key: {spec}. Use property[:asc|:desc]"))?;
                options = options.sort(key);
            }
            let records = repository(&client, &label, &settings)
                .find_all(options)
                .await?;
            serde_json::to_value(records)?
        }
        Command::Query { cypher, params } => {
            let params = parse_params(params.as_deref())?;
            let rows = client
                .query_rows(&Statement::raw(cypher, params))
                .await?;
            serde_json::Value::Array(rows.iter().map(|row| row.to_json()).collect())
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn repository(client: &GraphClient, label: &str, settings: &Settings) -> NodeRepository {
    let mapper = Arc::new(NodeRecordMapper::new(label));
    let registry = Arc::new(MapperRegistry::new().with(mapper.clone()));
    AsyncRepository::new(
        TransactionCoordinator::new(Arc::new(client.clone())),
        registry,
        mapper,
        settings.mapping,
    )
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<Params> {
    let Some(raw) = raw else {
        return Ok(Params::new());
    };
    match Value::from(serde_json::from_str::<serde_json::Value>(raw)?) {
        Value::Map(map) => Ok(map),
        other => anyhow::bail!("--params must be a JSON object, got {}", other.type_name()),
    }
}
