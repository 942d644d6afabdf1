//! Zentinel Mapper Agent CLI entry point.
//!
//! Validates mapping configurations and applies them to a single request.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_agent_mapper::modifier::{self, ParsedModifier, DEFAULT_MAX_BODY_SIZE};
use zentinel_agent_mapper::{MapperModifier, MappingDefinition, ProxyRequest};

#[derive(Parser, Debug)]
#[command(name = "zentinel-agent-mapper")]
#[command(
    author,
    version,
    about = "Query and JSON body field mapping agent for Zentinel"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "MAPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Request URI to map (path or absolute URL, including query string)
    #[arg(long)]
    uri: Option<String>,

    /// HTTP method of the request
    #[arg(long, default_value = "POST")]
    method: String,

    /// Request header as "name: value" (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Request body file, or "-" to read from stdin
    #[arg(long)]
    body: Option<PathBuf>,

    /// Maximum body size to buffer for mapping (bytes)
    #[arg(long, env = "MAPPER_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

fn print_example_config() {
    let example = r#"# Mapper Agent Configuration Example
#
# Copies are applied before renames, to both the query string
# and a flat JSON request body.

# Duplicate a field under a new name (original is kept)
copy_fields:
  occupation: job

# Move a field to a new name (original is removed)
map_fields:
  user_id: token

# Phases the proxy runs this modifier in
scope:
  - request
"#;
    println!("{}", example);
}

fn load_definition(path: &Path) -> Result<MappingDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let definition = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        MappingDefinition::from_yaml(&content)?
    } else {
        MappingDefinition::from_json(content.as_bytes())?
    };

    Ok(definition)
}

async fn build_request(args: &Args, uri: &str) -> Result<ProxyRequest> {
    let mut request = ProxyRequest::new(args.method.clone(), uri);

    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Invalid header (expected name:value): {}", header))?;
        request = request.with_header(name.trim(), value.trim());
    }

    request = match &args.body {
        Some(path) if path.as_os_str() == "-" => request.with_body_stream(tokio::io::stdin()),
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open body file: {}", path.display()))?;
            request.with_body_stream(file)
        }
        None => request,
    };

    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Print example config if requested
    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let Some(config_path) = &args.config else {
        bail!("No configuration given (use --config or MAPPER_CONFIG)");
    };

    let definition = load_definition(config_path)?;

    // Validate only if requested
    if args.validate {
        info!(config = %config_path.display(), "Configuration is valid");
        return Ok(());
    }

    let Some(uri) = args.uri.as_deref() else {
        bail!("Nothing to map (use --uri, or --validate to only check the configuration)");
    };

    let parsed =
        ParsedModifier::new(MapperModifier::new(definition).with_max_body_size(args.max_body_size));

    info!(
        config = %config_path.display(),
        modifier = modifier::MODIFIER_NAME,
        max_body_size = args.max_body_size,
        "Mapper agent initialized"
    );

    let mut request = build_request(&args, uri).await?;

    match parsed.request_modifier() {
        Some(m) => m
            .modify_request(&mut request)
            .await
            .context("Failed to apply field mapping")?,
        None => warn!("Request phase not in scope, request passes through unchanged"),
    }

    let body = request
        .read_body()
        .await
        .context("Failed to read mapped body")?;

    println!("{}", request.uri());
    if !body.is_empty() {
        println!("{}", String::from_utf8_lossy(&body));
    }

    Ok(())
}
