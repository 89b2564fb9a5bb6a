use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value as Json;
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bqframe::{
    BigQuery, Dialect, Field, Frame, GbqError, IfExists, Priority, QueryOptions, Settings,
    TableSchema,
};

#[derive(Parser)]
#[command(name = "bqframe")]
#[command(about = "Run BigQuery jobs and move tabular data in and out of tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the per-user config file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GCP project ID
    #[arg(short, long, env = "BIGQUERY_PROJECT")]
    project: Option<String>,

    /// Service account key file (application default credentials when absent)
    #[arg(long, env = "BIGQUERY_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Job location, e.g. EU or US
    #[arg(long, env = "BIGQUERY_LOCATION")]
    location: Option<String>,

    /// Enable verbose output; streaming inserts report every failed row
    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args, Clone)]
struct QueryArgs {
    /// SQL text
    sql: String,

    /// Use legacy SQL
    #[arg(long)]
    legacy: bool,

    /// Run with INTERACTIVE priority instead of BATCH
    #[arg(long)]
    interactive: bool,

    /// Allow queries without a partition restriction
    #[arg(long)]
    no_strict: bool,

    /// Job configuration overlay as JSON, e.g. '{"query": {"maximumBytesBilled": "1000000"}}'
    #[arg(long)]
    configuration: Option<String>,

    /// Client-side timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the rows
    Query {
        #[command(flatten)]
        args: QueryArgs,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// Submit a query and print the job id without waiting
    Submit {
        #[command(flatten)]
        args: QueryArgs,
    },

    /// Copy a table (dataset.table) to another
    Copy {
        source: String,
        destination: String,

        /// Job configuration overlay as JSON
        #[arg(long)]
        configuration: Option<String>,
    },

    /// Show a table's schema
    Schema {
        dataset: String,
        table: String,
    },

    /// Compare a local schema file (JSON list of fields) with a table
    VerifySchema {
        dataset: String,
        table: String,

        /// JSON file with [{"name": ..., "type": ...}, ...]
        #[arg(long)]
        schema: PathBuf,

        /// Only require the local fields to exist remotely
        #[arg(long)]
        subset: bool,
    },

    /// Upload a JSON array of records to dataset.table or dataset.table$YYYYMMDD
    Upload {
        file: PathBuf,
        destination: String,

        #[arg(long, default_value = "fail")]
        if_exists: String,

        /// Rows per insertAll request
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List tables in a dataset
    Tables {
        dataset: String,
    },

    /// List datasets in the project
    Datasets,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    field_type: String,
    #[tabled(rename = "Mode")]
    mode: String,
}

#[derive(Tabled)]
struct NameRow {
    #[tabled(rename = "Name")]
    name: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("bqframe=debug,info")
        } else {
            EnvFilter::new("bqframe=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: &GbqError) {
    eprintln!("{} {}", format!("✗ {:?}:", err.kind()).red().bold(), err);
    if matches!(err, GbqError::StrictMode(_)) {
        eprintln!("{} pass --no-strict to run it anyway", "Suggestion:".yellow());
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, GbqError> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    if let Some(project) = &cli.project {
        settings.project_id = Some(project.clone());
    }
    if let Some(key_path) = &cli.key_path {
        settings.key_path = Some(key_path.clone());
    }
    if let Some(location) = &cli.location {
        settings.location = Some(location.clone());
    }
    if cli.verbose {
        settings.verbose = true;
    }

    Ok(settings)
}

async fn run(cli: Cli) -> Result<(), GbqError> {
    let settings = load_settings(&cli)?;
    let bq = BigQuery::connect(settings).await?;

    match cli.command {
        Commands::Query { args, output } => cmd_query(&bq, &args, output).await,
        Commands::Submit { args } => cmd_submit(&bq, &args).await,
        Commands::Copy { source, destination, configuration } => {
            cmd_copy(&bq, &source, &destination, configuration.as_deref()).await
        }
        Commands::Schema { dataset, table } => cmd_schema(&bq, &dataset, &table).await,
        Commands::VerifySchema { dataset, table, schema, subset } => {
            cmd_verify_schema(&bq, &dataset, &table, &schema, subset).await
        }
        Commands::Upload { file, destination, if_exists, chunk_size } => {
            cmd_upload(&bq, &file, &destination, &if_exists, chunk_size).await
        }
        Commands::Tables { dataset } => cmd_tables(&bq, &dataset).await,
        Commands::Datasets => cmd_datasets(&bq).await,
    }
}

fn parse_configuration(raw: Option<&str>) -> Result<Option<Json>, GbqError> {
    raw.map(|s| serde_json::from_str(s).map_err(GbqError::from))
        .transpose()
}

fn query_options(args: &QueryArgs) -> Result<QueryOptions, GbqError> {
    let mut options = QueryOptions::new()
        .dialect(if args.legacy { Dialect::Legacy } else { Dialect::Standard })
        .priority(if args.interactive { Priority::Interactive } else { Priority::Batch });

    if args.no_strict {
        options = options.strict(false);
    }
    if let Some(configuration) = parse_configuration(args.configuration.as_deref())? {
        options = options.configuration(configuration);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        options = options.timeout_ms(timeout_ms);
    }

    Ok(options)
}

async fn cmd_query(bq: &BigQuery, args: &QueryArgs, output: OutputFormat) -> Result<(), GbqError> {
    let frame = bq.query(&args.sql, &query_options(args)?).await?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&frame.to_json_rows()?)?);
        }
        OutputFormat::Table => {
            println!("{}", render_frame(&frame)?);
            println!("{}", format!("{} rows", frame.len()).dimmed());
        }
    }

    Ok(())
}

fn render_frame(frame: &Frame) -> Result<Table, GbqError> {
    let mut builder = Builder::default();
    builder.push_record(frame.column_names().into_iter().map(String::from));
    for row in frame.display_rows()? {
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::markdown());
    Ok(table)
}

async fn cmd_submit(bq: &BigQuery, args: &QueryArgs) -> Result<(), GbqError> {
    let job_id = bq.submit_query_job(&args.sql, &query_options(args)?).await?;
    println!("{} {}", "✓ Submitted".green(), job_id);
    Ok(())
}

async fn cmd_copy(
    bq: &BigQuery,
    source: &str,
    destination: &str,
    configuration: Option<&str>,
) -> Result<(), GbqError> {
    let source = bq.table_reference(source)?;
    let destination = bq.table_reference(destination)?;
    let configuration = parse_configuration(configuration)?;

    bq.run_copy_job(&source, &destination, configuration.as_ref()).await?;
    println!("{} {} -> {}", "✓ Copied".green(), source, destination);
    Ok(())
}

async fn cmd_schema(bq: &BigQuery, dataset: &str, table: &str) -> Result<(), GbqError> {
    let reference = bq.tables().reference(dataset, table);
    let schema = bq.tables().get_schema(&reference).await?;

    let rows: Vec<FieldRow> = schema
        .fields
        .iter()
        .map(|f| FieldRow {
            name: f.name.clone(),
            field_type: f.field_type.to_string(),
            mode: f.mode.clone().unwrap_or_else(|| "NULLABLE".to_string()),
        })
        .collect();

    let mut out = Table::new(rows);
    out.with(Style::markdown());
    println!("{}", out);
    Ok(())
}

async fn cmd_verify_schema(
    bq: &BigQuery,
    dataset: &str,
    table: &str,
    schema_path: &PathBuf,
    subset: bool,
) -> Result<(), GbqError> {
    let content = std::fs::read_to_string(schema_path)?;
    let fields: Vec<Field> = serde_json::from_str(&content)?;
    let schema = TableSchema::from_fields(fields);

    let ok = if subset {
        bq.is_subset(dataset, table, &schema).await?
    } else {
        bq.schemas_equivalent(dataset, table, &schema).await?
    };

    let check = if subset { "is a subset of" } else { "matches" };
    if ok {
        println!("{} local schema {} {}.{}", "✓".green(), check, dataset, table);
        Ok(())
    } else {
        Err(GbqError::InvalidSchema(format!(
            "local schema does not match {}.{}",
            dataset, table
        )))
    }
}

async fn cmd_upload(
    bq: &BigQuery,
    file: &PathBuf,
    destination: &str,
    if_exists: &str,
    chunk_size: Option<usize>,
) -> Result<(), GbqError> {
    let if_exists: IfExists = if_exists.parse()?;
    let content = std::fs::read_to_string(file)?;
    let records: Vec<Json> = serde_json::from_str(&content)?;
    let frame = Frame::from_json_records(&records)?;

    info!("Uploading {} rows to {} (if_exists = {})", frame.len(), destination, if_exists);

    let report = bq.upload(&frame, destination, if_exists, chunk_size).await?;

    if report.is_clean() {
        println!("{} {} rows to {}", "✓ Uploaded".green(), report.rows_sent, destination);
    } else {
        println!(
            "{} {} rows sent, {} row errors",
            "⚠ Uploaded with errors:".yellow(),
            report.rows_sent,
            report.failed_rows.len()
        );
        for failure in &report.failed_rows {
            println!("  {}", failure);
        }
    }
    Ok(())
}

async fn cmd_tables(bq: &BigQuery, dataset: &str) -> Result<(), GbqError> {
    let rows: Vec<NameRow> = bq
        .tables()
        .list(dataset)
        .await?
        .into_iter()
        .map(|name| NameRow { name })
        .collect();

    let mut out = Table::new(rows);
    out.with(Style::markdown());
    println!("{}", out);
    Ok(())
}

async fn cmd_datasets(bq: &BigQuery) -> Result<(), GbqError> {
    let rows: Vec<NameRow> = bq
        .datasets()
        .list()
        .await?
        .into_iter()
        .map(|name| NameRow { name })
        .collect();

    let mut out = Table::new(rows);
    out.with(Style::markdown());
    println!("{}", out);
    Ok(())
}
