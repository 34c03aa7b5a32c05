use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bools::{jsonl, BoolsError, Dependencies};
use bools_repository::adapters::{
    es_actions, hits_to_records, records_to_points, series_to_rows, EsWriteOptions, PointOptions,
    Target, DEFAULT_TZ_OFFSET_SECS,
};
use bools_repository::elasticsearch::DEFAULT_SCROLL_BATCH_SIZE;
use bools_repository::influxdb::DEFAULT_QUERY_CHUNK_SIZE;
use bools_repository::{ScrollOptions, StoreClient, WriteOptions, DEFAULT_WRITE_BATCH_SIZE};
use bools_shared::pool::bounded_map;

#[derive(Parser)]
#[command(name = "bools")]
#[command(about = "Batched writes and scroll reads for Elasticsearch and InfluxDB", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Request timeout in seconds, overriding the configured default
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Elasticsearch,
    Influxdb,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backends are reachable
    Ping {
        #[arg(value_enum, default_value = "all")]
        backend: BackendArg,
    },
    /// Import a JSON-lines file into Elasticsearch
    Import {
        /// Input file, one JSON object per line
        file: PathBuf,
        /// Target index
        #[arg(long)]
        index: Option<String>,
        /// Column holding the target index of each record
        #[arg(long)]
        index_col: Option<String>,
        /// Column holding the document id
        #[arg(long)]
        id_col: Option<String>,
        /// Convert numeric-looking string columns to numbers
        #[arg(long)]
        numeric_detection: bool,
        #[arg(long, default_value_t = DEFAULT_WRITE_BATCH_SIZE)]
        batch_size: usize,
        /// Report every skipped line
        #[arg(long)]
        verbose: bool,
    },
    /// Export the hits of a query as JSON lines
    Export {
        /// Index or index pattern
        index: String,
        /// Query body, defaults to match_all
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = DEFAULT_SCROLL_BATCH_SIZE)]
        batch_size: usize,
        /// Stop after this many hits
        #[arg(long)]
        total_size: Option<usize>,
        /// Log progress per page
        #[arg(long)]
        log: bool,
    },
    /// Import a JSON-lines file into InfluxDB
    InfluxImport {
        /// Input file, one JSON object per line
        file: PathBuf,
        /// Target measurement
        #[arg(long)]
        measurement: Option<String>,
        /// Column holding the measurement of each record
        #[arg(long)]
        measurement_col: Option<String>,
        /// Columns written as tags
        #[arg(long = "tag-col")]
        tag_cols: Vec<String>,
        /// Column holding the point time
        #[arg(long)]
        time_col: Option<String>,
        /// Target database, defaults to INFLUXDB_DATABASE
        #[arg(long)]
        database: Option<String>,
        #[arg(long, default_value_t = DEFAULT_WRITE_BATCH_SIZE)]
        batch_size: usize,
        /// Report every skipped line
        #[arg(long)]
        verbose: bool,
    },
    /// Run an InfluxQL query and print the rows as JSON lines
    InfluxQuery {
        query: String,
        /// Database, defaults to INFLUXDB_DATABASE
        #[arg(long)]
        database: Option<String>,
        #[arg(long, default_value_t = DEFAULT_QUERY_CHUNK_SIZE)]
        chunk_size: usize,
        /// Offset of printed times east of UTC, in hours
        #[arg(long, default_value_t = DEFAULT_TZ_OFFSET_SECS / 3600, allow_hyphen_values = true)]
        tz_offset_hours: i32,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoolsError> {
    let dependencies = Dependencies::new()?;
    let timeout = cli.timeout.map(Duration::from_secs);

    match cli.command {
        Commands::Ping { backend } => ping(&dependencies, backend).await,
        Commands::Import {
            file,
            index,
            index_col,
            id_col,
            numeric_detection,
            batch_size,
            verbose,
        } => {
            let target = Target::resolve(index.as_deref(), index_col.as_deref())?;
            let mut options = EsWriteOptions::new(target).with_numeric_detection(numeric_detection);
            if let Some(id_col) = id_col {
                options = options.with_id_col(id_col);
            }

            let records = jsonl::read_records(&file, verbose).await?;
            let Some(batch) = es_actions(records, &options)? else {
                info!(file = %file.display(), "Nothing to import");
                return Ok(());
            };

            let client = dependencies.elasticsearch().await?;
            let summary = client
                .write_actions(&batch.index, batch.actions, &write_options(batch_size, timeout))
                .await?;

            info!(
                chunks = summary.chunks,
                records = summary.records,
                item_errors = summary.item_errors,
                "Import finished"
            );
            Ok(())
        }
        Commands::Export {
            index,
            query,
            batch_size,
            total_size,
            log,
        } => {
            let body = match query {
                Some(query) => serde_json::from_str(&query)?,
                None => json!({"query": {"match_all": {}}}),
            };
            let options = ScrollOptions {
                batch_size,
                timeout,
                total_size,
                log,
            };

            let client = dependencies.elasticsearch().await?;
            let response = client.scroll_query(&index, body, &options).await?;
            for record in hits_to_records(response) {
                println!("{}", Value::Object(record));
            }
            Ok(())
        }
        Commands::InfluxImport {
            file,
            measurement,
            measurement_col,
            tag_cols,
            time_col,
            database,
            batch_size,
            verbose,
        } => {
            let target = Target::resolve(measurement.as_deref(), measurement_col.as_deref())?;
            let mut options = PointOptions::new(target).with_tag_cols(tag_cols);
            if let Some(time_col) = time_col {
                options = options.with_time_col(time_col);
            }

            let records = jsonl::read_records(&file, verbose).await?;
            let points = records_to_points(records, &options)?;
            if points.is_empty() {
                info!(file = %file.display(), "Nothing to import");
                return Ok(());
            }

            let client = dependencies.influxdb().await?;
            let summary = client
                .write_points(points, database.as_deref(), &write_options(batch_size, timeout))
                .await?;

            info!(
                chunks = summary.chunks,
                points = summary.records,
                "Import finished"
            );
            Ok(())
        }
        Commands::InfluxQuery {
            query,
            database,
            chunk_size,
            tz_offset_hours,
        } => {
            let client = dependencies.influxdb().await?;
            let result = client
                .query(&query, database.as_deref(), chunk_size, timeout)
                .await?;

            let offset_secs = tz_offset_hours
                .checked_mul(3600)
                .ok_or_else(|| BoolsError::config("Timezone offset out of range"))?;
            for row in series_to_rows(&result, offset_secs)? {
                println!("{}", Value::Object(row));
            }
            Ok(())
        }
    }
}

fn write_options(batch_size: usize, timeout: Option<Duration>) -> WriteOptions {
    let options = WriteOptions::with_batch_size(batch_size);
    match timeout {
        Some(timeout) => options.timeout(timeout),
        None => options,
    }
}

async fn ping(dependencies: &Dependencies, backend: BackendArg) -> Result<(), BoolsError> {
    let mut clients: Vec<Box<dyn StoreClient>> = Vec::new();
    if matches!(backend, BackendArg::Elasticsearch | BackendArg::All) {
        clients.push(Box::new(dependencies.elasticsearch().await?));
    }
    if matches!(backend, BackendArg::Influxdb | BackendArg::All) {
        clients.push(Box::new(dependencies.influxdb().await?));
    }

    let results = bounded_map(&clients, clients.len(), |client| async move {
        (client.backend(), client.version(), client.health_check().await)
    })
    .await;

    let mut healthy = true;
    for (backend, version, result) in results {
        match result {
            Ok(true) => info!(backend = %backend, version = version, "Backend is healthy"),
            Ok(false) => {
                healthy = false;
                error!(backend = %backend, "Backend answered but is unhealthy");
            }
            Err(e) => {
                healthy = false;
                error!(backend = %backend, error = %e, "Backend is unreachable");
            }
        }
    }

    if healthy {
        Ok(())
    } else {
        Err(BoolsError::config("One or more backends are unhealthy"))
    }
}
