//! FerroLake host executable.
//!
//! A thin stand-in for an embedding host process: it builds an engine
//! configuration from the command line, drives catalog operations through
//! the host adapter, and prints the output as JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ferrolake_core::{AttachmentDescriptor, CatalogOperation, EngineConfig, HostAdapter};
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "ferrolake-host", about = "Drive a FerroLake engine from the command line")]
struct Cli {
    /// Root for relative catalog locations and engine-owned files.
    #[arg(long, default_value = "./ferrolake_data")]
    data_dir: PathBuf,

    /// Backend used when an attachment does not name one.
    #[arg(long, default_value = "json")]
    default_backend: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach a catalog by name, bound to a metadata backend.
    Attach {
        catalog: String,
        #[arg(long, default_value = "")]
        backend: String,
        #[arg(long)]
        metadata_location: PathBuf,
        #[arg(long)]
        data_location: PathBuf,
        /// Backend-specific option, repeatable as key=value.
        #[arg(long = "option", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
        #[arg(long)]
        if_not_exists: bool,
    },
    /// Detach a previously attached catalog.
    Detach { catalog: String },
    /// Print catalog-level metadata.
    Info { catalog: String },
    /// List the tables in a schema.
    Tables {
        catalog: String,
        #[arg(long, default_value = "main")]
        schema: String,
    },
    /// Run a raw catalog operation given as a JSON envelope.
    Exec { envelope: String },
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => bail!("expected key=value, got '{raw}'"),
    }
}

fn operation(command: Command) -> Result<CatalogOperation> {
    Ok(match command {
        Command::Attach {
            catalog,
            backend,
            metadata_location,
            data_location,
            options,
            if_not_exists,
        } => CatalogOperation::Attach(AttachmentDescriptor {
            catalog_name: catalog,
            backend_name: backend,
            metadata_location,
            data_location,
            extra_options: options.into_iter().collect::<BTreeMap<_, _>>(),
            if_not_exists,
        }),
        Command::Detach { catalog } => CatalogOperation::Detach { catalog },
        Command::Info { catalog } => CatalogOperation::LoadCatalogInfo { catalog },
        Command::Tables { catalog, schema } => CatalogOperation::ListTables { catalog, schema },
        Command::Exec { envelope } => {
            serde_json::from_str(&envelope).context("malformed operation envelope")?
        }
    })
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig {
        data_dir: cli.data_dir,
        default_backend: cli.default_backend,
        ..EngineConfig::default()
    };

    let adapter = HostAdapter::new(config);
    let op = operation(cli.command)?;
    info!(operation = %op.describe(), "running catalog operation");
    let output = adapter.run_catalog_operation(&op)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
