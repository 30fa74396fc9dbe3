use clap::{Parser, Subcommand, ValueEnum};
use datafusion::prelude::DataFrame;
use fabric_utilities::{
    get_access_token, get_azure_storage_access_token, scan_delta, scan_parquet, scan_parquets,
    upsert, write_delta, write_parquet, FabricResult, Frame, ReadOptions, SchemaMode, Table,
    WriteMetrics, WriteMode, WriteOptions,
};
use log::info;

#[derive(Parser)]
#[command(version, name = "fabric", about = "Microsoft Fabric storage utilities")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// A Delta table
    Delta,
    /// A Parquet file or a (partitioned) Parquet dataset
    Parquet,
    /// Parquet files with differing schemas in one directory
    Parquets,
}

#[derive(Subcommand)]
enum Command {
    /// Print an access token
    Token {
        /// The audience of the token
        #[arg(long, default_value = "https://storage.azure.com")]
        audience: String,
        /// Print the storage token, honoring `AZURE_STORAGE_TOKEN`
        #[arg(long, conflicts_with = "audience")]
        storage: bool,
    },
    /// Print the contents of a table
    Read {
        location: String,
        #[arg(long, value_enum, default_value_t = Format::Delta)]
        format: Format,
        /// The Delta table version to read
        #[arg(long)]
        version: Option<i64>,
        /// The maximum number of rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Copy a table or dataset to another location
    Copy {
        source: String,
        target: String,
        #[arg(long, value_enum, default_value_t = Format::Delta)]
        source_format: Format,
        #[arg(long, value_enum, default_value_t = Format::Delta)]
        format: Format,
        #[arg(long, default_value_t = WriteMode::ErrorIfExists)]
        mode: WriteMode,
        #[arg(long, value_delimiter = ',')]
        partition_by: Vec<String>,
        /// How to treat a schema that differs from the target's
        #[arg(long)]
        schema_mode: Option<SchemaMode>,
    },
    /// Upsert a table or dataset into a Delta table
    Upsert {
        source: String,
        target: String,
        #[arg(long, value_enum, default_value_t = Format::Delta)]
        source_format: Format,
        #[arg(long, value_delimiter = ',', required = true)]
        primary_key: Vec<String>,
        /// Columns that are only written on insert
        #[arg(long, value_delimiter = ',')]
        update_exclude: Vec<String>,
        /// Columns whose changes do not cause an update
        #[arg(long, value_delimiter = ',')]
        predicate_exclude: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        partition_by: Vec<String>,
    },
    /// Print the version
    Version,
}

async fn scan(location: &str, format: Format, options: &ReadOptions) -> FabricResult<DataFrame> {
    match format {
        Format::Delta => scan_delta(location, options).await,
        Format::Parquet => scan_parquet(location, options).await,
        Format::Parquets => scan_parquets(location, options).await,
    }
}

fn print_metrics(metrics: &WriteMetrics) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(metrics)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Token { audience, storage } => {
            let token = if storage {
                get_azure_storage_access_token().await?
            } else {
                get_access_token(&audience).await?
            };
            if let Some(expiry) = token.expiry() {
                info!("The token expires at {expiry}.");
            }
            println!("{}", token.secret());
        }
        Command::Read {
            location,
            format,
            version,
            limit,
        } => {
            let options = ReadOptions {
                version,
                ..Default::default()
            };
            let df = scan(&location, format, &options).await?;
            let table = Frame::from(df.limit(0, Some(limit))?).collect().await?;
            print_table(&table);
        }
        Command::Copy {
            source,
            target,
            source_format,
            format,
            mode,
            partition_by,
            schema_mode,
        } => {
            let data = scan(&source, source_format, &ReadOptions::default()).await?;
            let options = WriteOptions {
                partition_by,
                schema_mode,
                ..Default::default()
            };
            let metrics = match format {
                Format::Delta => write_delta(data, &target, mode, &options).await?,
                Format::Parquet | Format::Parquets => {
                    write_parquet(data, &target, mode, &options).await?
                }
            };
            print_metrics(&metrics)?;
        }
        Command::Upsert {
            source,
            target,
            source_format,
            primary_key,
            update_exclude,
            predicate_exclude,
            partition_by,
        } => {
            let data = scan(&source, source_format, &ReadOptions::default()).await?;
            let metrics = upsert(
                &target,
                data,
                primary_key,
                update_exclude,
                predicate_exclude,
                partition_by,
            )
            .await?;
            print_metrics(&metrics)?;
        }
        Command::Version => {
            println!("fabric {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

fn print_table(table: &Table) {
    println!("{table}");
    info!("{} rows", table.num_rows());
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}
