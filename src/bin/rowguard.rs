//! Binary entry point for the rowguard CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rowguard::access::{fetch_concurrently, with_connection, Pipeline, ResultCache};
use rowguard::cli::import::{import_csv, ImportConfig};
use rowguard::cli::write_json_line;
use rowguard::source::SqliteOptions;
use rowguard::stream::{
    filter_batches, numeric_field, paginate, stream_batches, stream_query, streaming_average,
};
use rowguard::{AccessMetrics, AccessOptions, CancelToken, Query, Row, SqliteSource};
use tracing_subscriber::EnvFilter;

const DEFAULT_SQL: &str = "SELECT * FROM user_data";

#[derive(Parser, Debug)]
#[command(
    name = "rowguard",
    version,
    about = "Resilient queries and streaming over SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, env = "ROWGUARD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "ROWGUARD_DATABASE", value_name = "DB")]
    database: Option<PathBuf>,

    #[arg(long, global = true, help = "Total attempts for transient failures")]
    max_attempts: Option<u32>,

    #[arg(long, global = true, help = "Pause between attempts in milliseconds")]
    retry_delay_ms: Option<u64>,

    #[arg(long, global = true, help = "SQLite busy timeout in milliseconds")]
    busy_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a CSV file into a table unless the table already holds rows.
    Import {
        #[arg(value_name = "CSV")]
        csv: PathBuf,
        #[arg(long, default_value = "user_data")]
        table: String,
    },
    /// Stream rows one at a time.
    Stream {
        #[arg(long, default_value = DEFAULT_SQL)]
        sql: String,
        #[arg(long, help = "Stop after this many rows")]
        limit: Option<usize>,
    },
    /// Stream rows in batches and keep those whose column exceeds a threshold.
    Batches {
        #[arg(long, default_value = DEFAULT_SQL)]
        sql: String,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long, default_value = "age")]
        column: String,
        #[arg(long, default_value_t = 25.0)]
        greater_than: f64,
    },
    /// Page through a query with LIMIT/OFFSET windows.
    Paginate {
        #[arg(long, default_value = DEFAULT_SQL)]
        sql: String,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Average a numeric column in one pass.
    Average {
        #[arg(long, default_value = "SELECT age FROM user_data")]
        sql: String,
        #[arg(long, default_value = "age")]
        column: String,
    },
    /// Run a query through the retry and cache layers.
    Query {
        #[arg(long, default_value = DEFAULT_SQL)]
        sql: String,
        #[arg(long, help = "Run inside a transaction")]
        transactional: bool,
        #[arg(long, help = "Print access metrics to stderr")]
        metrics: bool,
    },
    /// Run several queries concurrently, one connection each.
    Concurrent {
        #[arg(long = "sql", required = true)]
        queries: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rowguard=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = build_options(&cli.open)?;
    let database = options
        .database
        .clone()
        .ok_or("no database configured; pass --database or set [database].path")?;
    let source = Arc::new(SqliteSource::with_options(
        &database,
        sqlite_options(&cli.command, &options),
    ));

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if let Command::Concurrent { queries } = &cli.command {
        let queries = queries.iter().map(Query::new).collect();
        let results = fetch_concurrently(Arc::clone(&source), queries).await?;
        let mut out = io::stdout().lock();
        for rows in &results {
            print_rows(&mut out, rows)?;
        }
        return Ok(());
    }

    let outcome =
        tokio::task::spawn_blocking(move || run_blocking(cli.command, &source, &options, &cancel))
            .await?;
    outcome.map_err(|err| err as Box<dyn Error>)
}

fn run_blocking(
    command: Command,
    source: &SqliteSource,
    options: &AccessOptions,
    cancel: &CancelToken,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut out = io::stdout().lock();
    match command {
        Command::Import { csv, table } => {
            let reader = BufReader::new(File::open(&csv)?);
            let summary = with_connection(source, |conn| {
                Ok(import_csv(conn, &ImportConfig::new(table), reader))
            })??;
            if summary.skipped() {
                writeln!(
                    out,
                    "Table already holds {} rows; nothing imported",
                    summary.existing_rows
                )?;
            } else {
                writeln!(out, "Imported {} rows", summary.rows_imported)?;
            }
        }
        Command::Stream { sql, limit } => {
            stream_query(source, &Query::new(sql), cancel, |rows| {
                for row in rows.take(limit.unwrap_or(usize::MAX)) {
                    emit(&mut out, &row?)?;
                }
                Ok(())
            })?;
        }
        Command::Batches {
            sql,
            batch_size,
            column,
            greater_than,
        } => {
            let size = batch_size.unwrap_or(options.batch_size);
            let value = numeric_field(column);
            stream_query(source, &Query::new(sql), cancel, |rows| {
                let matching = filter_batches(stream_batches(rows, size)?, |row| {
                    value(row).map(|v| v > greater_than).unwrap_or(false)
                });
                for row in matching {
                    emit(&mut out, &row?)?;
                }
                Ok(())
            })?;
        }
        Command::Paginate { sql, page_size } => {
            let size = page_size.unwrap_or(options.page_size);
            with_connection(source, |conn| {
                let mut pages = paginate(conn, Query::new(sql), size)?;
                while let Some(page) = pages.next_page()? {
                    cancel.check()?;
                    for row in &page {
                        emit(&mut out, row)?;
                    }
                }
                Ok(())
            })?;
        }
        Command::Average { sql, column } => {
            let average = stream_query(source, &Query::new(sql), cancel, |rows| {
                streaming_average(rows, numeric_field(column))
            })?;
            writeln!(out, "{average}")?;
        }
        Command::Query {
            sql,
            transactional,
            metrics,
        } => {
            let cache = match options.cache_capacity {
                Some(capacity) => ResultCache::with_capacity(capacity),
                None => ResultCache::new(),
            };
            let counters = AccessMetrics::new();
            let mut pipeline = Pipeline::new(source)
                .retry(options.retry.clone())
                .cache(&cache)
                .observer(&counters)
                .cancel(cancel.clone());
            if transactional {
                pipeline = pipeline.transactional();
            }
            let rows = pipeline.fetch(&Query::new(sql))?;
            print_rows(&mut out, &rows)?;
            if metrics {
                eprintln!("{}", counters.snapshot());
            }
        }
        Command::Concurrent { .. } => {}
    }
    Ok(())
}

fn build_options(args: &OpenArgs) -> Result<AccessOptions, Box<dyn Error>> {
    let mut options = AccessOptions::load(args.config.as_deref())?;
    if let Some(database) = &args.database {
        options.database = Some(database.clone());
    }
    if let Some(max_attempts) = args.max_attempts {
        options.retry.max_attempts = max_attempts;
    }
    if let Some(ms) = args.retry_delay_ms {
        options.retry.delay = Duration::from_millis(ms);
    }
    if let Some(ms) = args.busy_timeout_ms {
        options.busy_timeout = Duration::from_millis(ms);
    }
    Ok(options)
}

fn sqlite_options(command: &Command, options: &AccessOptions) -> SqliteOptions {
    let mut sqlite = options.sqlite_options();
    sqlite.create_if_missing = matches!(command, Command::Import { .. });
    sqlite
}

fn emit<W: Write>(out: &mut W, row: &Row) -> rowguard::Result<()> {
    write_json_line(out, row).map_err(|err| rowguard::AccessError::Fatal(err.to_string()))
}

fn print_rows<W: Write>(out: &mut W, rows: &[Row]) -> io::Result<()> {
    for row in rows {
        write_json_line(out, row)?;
    }
    Ok(())
}
