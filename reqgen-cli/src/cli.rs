use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use reqgen::mapping_config::{
    load_document, mapping_file_schema, merged_settings, read_mapping_files,
};
use reqgen::{
    GeneratorSettings, InvalidValue, MappingTable, OperationIndex, RequestDataBuilder,
    RequestOverrides, SchemaLoader, SchemaNode, validate_value,
};
use serde_json::{Value, json};
use std::io::Write;

use crate::logging;
use crate::offline::{DryRunCreator, OfflineIdProvider};

#[derive(Parser)]
#[command(name = "reqgen")]
#[command(about = "Valid and invalid request data for OpenAPI operations", long_about = None)]
pub struct Cli {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Constraint mapping file or directory of mapping files
    #[arg(long)]
    pub mapping: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a value that satisfies a schema
    Valid {
        /// JSON or YAML file holding the schema (or a document containing it)
        #[arg(long)]
        schema: String,
        /// JSON pointer to the schema inside the file
        #[arg(long)]
        pointer: Option<String>,
    },
    /// Generate a value that violates a schema
    Invalid {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        pointer: Option<String>,
        /// Valid value (JSON) to start from; generated when omitted
        #[arg(long)]
        value: Option<String>,
    },
    /// Build valid request data for an operation
    Request {
        /// `OpenAPI` document (JSON or YAML)
        #[arg(long)]
        document: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "get")]
        method: String,
        /// Overrides as JSON: {"query": {..}, "headers": {..}, "body": {..}}
        #[arg(long)]
        overrides: Option<String>,
    },
    /// Build a request body that should produce the given status
    InvalidBody {
        #[arg(long)]
        document: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "post")]
        method: String,
        #[arg(long)]
        status: u16,
        /// Concrete url of the request; resolved from the path when omitted
        #[arg(long)]
        url: Option<String>,
    },
    /// Invalidate one query parameter or header for the given status
    InvalidParams {
        #[arg(long)]
        document: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "get")]
        method: String,
        #[arg(long)]
        status: u16,
    },
    /// Resolve a path to a valid url, and optionally an invalidated one
    Url {
        #[arg(long)]
        document: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        status: Option<u16>,
    },
    /// Print the JSON Schema of the mapping file format
    MappingSchema,
    /// Validate a value against a schema
    Validate {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        pointer: Option<String>,
        #[arg(long)]
        value: String,
    },
}

/// Run the CLI application
///
/// # Errors
///
/// Returns an error if command execution fails
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Execute CLI commands with a parsed Cli struct
///
/// # Errors
///
/// Returns an error if:
/// - A document, schema or mapping file cannot be loaded
/// - A JSON argument does not parse
/// - Generation fails
pub fn run_with_cli(cli: Cli) -> Result<()> {
    logging::init(cli.verbose);
    run_command(cli)
}

fn run_command(cli: Cli) -> Result<()> {
    let seed = cli.seed;
    let mapping = cli.mapping.as_deref();

    match cli.command {
        Commands::Valid { schema, pointer } => {
            let (node, mut builder) = schema_builder(&schema, pointer.as_deref(), mapping, seed)?;
            let value = builder.generate_valid(&node)?;
            print_result(&value)?;
        }
        Commands::Invalid {
            schema,
            pointer,
            value,
        } => {
            let (node, mut builder) = schema_builder(&schema, pointer.as_deref(), mapping, seed)?;
            invalid_value(&node, &mut builder, value.as_deref())?;
        }
        Commands::Request {
            document,
            path,
            method,
            overrides,
        } => {
            let mut builder = document_builder(&document, mapping, seed)?;
            let overrides: RequestOverrides = if let Some(text) = overrides {
                serde_json::from_value(parse_json(&text)?)
                    .context("overrides must hold only query, headers and body")?
            } else {
                RequestOverrides::default()
            };
            let data = builder.build(&path, &method, &overrides)?;
            print_result(&data)?;
        }
        Commands::InvalidBody {
            document,
            path,
            method,
            status,
            url,
        } => {
            let mut builder = document_builder(&document, mapping, seed)?;
            invalid_body(&mut builder, &path, &method, status, url)?;
        }
        Commands::InvalidParams {
            document,
            path,
            method,
            status,
        } => {
            let mut builder = document_builder(&document, mapping, seed)?;
            let data = builder.build(&path, &method, &RequestOverrides::default())?;
            let invalid = builder.build_invalidated_parameters(status, &data)?;
            print_result(&json!({
                "valid": {"query": data.query, "headers": data.headers},
                "invalid": invalid
            }))?;
        }
        Commands::Url {
            document,
            path,
            status,
        } => {
            let mut builder = document_builder(&document, mapping, seed)?;
            let valid = builder.valid_url(&path)?;
            let invalid = status
                .map(|status| builder.invalidated_url(&valid, &path, status))
                .transpose()?;
            print_result(&json!({"valid": valid, "invalid": invalid}))?;
        }
        Commands::MappingSchema => {
            print_result(&mapping_file_schema())?;
        }
        Commands::Validate {
            schema,
            pointer,
            value,
        } => {
            let document = load_document(&schema)?;
            let (_, settings) = read_mappings(mapping, &document)?;
            let node = load_schema(&document, pointer.as_deref(), &settings)?;
            let errors = validate_value(&node, &parse_json(&value)?);
            print_result(&json!({"ok": errors.is_empty(), "errors": errors}))?;
        }
    }

    Ok(())
}

fn invalid_value(
    node: &SchemaNode,
    builder: &mut RequestDataBuilder,
    value: Option<&str>,
) -> Result<()> {
    let valid = if let Some(text) = value {
        parse_json(text)?
    } else {
        builder.generate_valid(node)?
    };
    let invalid = builder.generate_invalid(node, &valid, &[])?;
    let omit = matches!(invalid, InvalidValue::Ignore);
    print_result(&json!({
        "valid": valid,
        "invalid": invalid.into_value(),
        "omit": omit
    }))
}

fn invalid_body(
    builder: &mut RequestDataBuilder,
    path: &str,
    method: &str,
    status: u16,
    url: Option<String>,
) -> Result<()> {
    let data = builder.build(path, method, &RequestOverrides::default())?;
    let url = if let Some(url) = url {
        url
    } else {
        builder.valid_url(path)?
    };
    let invalid = builder.build_invalid_body(&url, method, status, &data)?;
    print_result(&json!({
        "url": url,
        "valid": data.body,
        "invalid": invalid
    }))
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("not valid JSON: {text}"))
}

fn read_mappings(
    mapping: Option<&str>,
    document: &Value,
) -> Result<(MappingTable, GeneratorSettings)> {
    let Some(path) = mapping else {
        return Ok((MappingTable::new(), GeneratorSettings::default()));
    };
    let files = read_mapping_files(path)?;
    let settings = merged_settings(&files);
    let mut loader = SchemaLoader::new(document, &settings);
    let table = MappingTable::from_files(files, &mut loader)?;
    Ok((table, settings))
}

fn load_schema(
    document: &Value,
    pointer: Option<&str>,
    settings: &GeneratorSettings,
) -> Result<SchemaNode> {
    let pointer = pointer.unwrap_or_default();
    let raw = document
        .pointer(pointer)
        .ok_or_else(|| anyhow!("nothing at '{pointer}'"))?;
    let node = SchemaLoader::new(document, settings).load(raw, &format!("#{pointer}"))?;
    Ok(node)
}

fn seeded(builder: RequestDataBuilder, seed: Option<u64>) -> RequestDataBuilder {
    let builder = builder
        .with_id_provider(OfflineIdProvider::seeded(seed))
        .with_creator(DryRunCreator);
    if let Some(seed) = seed {
        builder.with_seed(seed)
    } else {
        builder
    }
}

fn schema_builder(
    schema: &str,
    pointer: Option<&str>,
    mapping: Option<&str>,
    seed: Option<u64>,
) -> Result<(SchemaNode, RequestDataBuilder)> {
    let document = load_document(schema)?;
    let (_, settings) = read_mappings(mapping, &document)?;
    let node = load_schema(&document, pointer, &settings)?;
    let builder = RequestDataBuilder::new(OperationIndex::default(), settings);
    Ok((node, seeded(builder, seed)))
}

fn document_builder(
    document: &str,
    mapping: Option<&str>,
    seed: Option<u64>,
) -> Result<RequestDataBuilder> {
    let document = load_document(document)?;
    let (table, settings) = read_mappings(mapping, &document)?;
    let builder = RequestDataBuilder::from_document(&document, &table, settings)?;
    Ok(seeded(builder, seed))
}

fn print_result<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}
