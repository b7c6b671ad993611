mod errors;
mod files;
mod logging;
mod settings;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rowport_core::{
    EntityRegistry, FieldValue, Filter, RecordStore, SortSpec, StaticRegistry, derive_model_config,
    entity_json_schema,
};
use rowport_export::{ExportRequest, export_entity};
use rowport_import::{ImportRequest, import_upload, parse_csv_bytes, suggest_mappings};
use rowport_store::{MemorySnapshot, MemoryStore, PostgresStore};

use errors::{CliError, CliResult};
use files::{load_registry, read_inline_or_file, write_bytes_atomic};
use logging::init_logging;
use settings::{LogFormat, RowportSettings, load_settings};

#[derive(Parser, Debug)]
#[command(name = "rowport", version, about = "Rowport CSV import/export")]
struct Cli {
    /// Settings file; `rowport.toml` in the working directory when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit JSON logs regardless of the configured format.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a CSV file into an entity.
    Import(ImportArgs),
    /// Export an entity's records to CSV.
    Export(ExportArgs),
    /// Print the derived model config of an entity.
    Inspect(InspectArgs),
    /// Print the JSON Schema of the entity schema format.
    SchemaJson,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// PostgreSQL connection string; overrides the settings file.
    #[arg(long, env = "ROWPORT_DATABASE_URL", value_name = "CONNECTION_STRING")]
    database_url: Option<String>,
    /// JSON file backing the in-memory store when no database is configured.
    #[arg(long, default_value = "rowport-store.json")]
    store: PathBuf,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Entity schema file (JSON object or array).
    #[arg(long)]
    schemas: PathBuf,
    #[arg(long)]
    entity: String,
    /// CSV file to import.
    #[arg(long)]
    file: PathBuf,
    /// Mapping JSON, or `@path` to read it from a file. Suggested from the header when omitted.
    #[arg(long)]
    mapping: Option<String>,
    /// Duplicate strategy: skip, update or error.
    #[arg(long, default_value = "skip")]
    strategy: String,
    /// Organization the rows belong to.
    #[arg(long)]
    org: String,
    #[arg(long)]
    error_limit: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long)]
    schemas: PathBuf,
    #[arg(long)]
    entity: String,
    #[arg(long)]
    org: String,
    /// Comma-separated subset of fields, in output order.
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
    /// Equality filter `field=value`; repeatable.
    #[arg(long, value_name = "FIELD=VALUE")]
    filter: Vec<String>,
    /// Sort as `field` or `field:desc`.
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
    /// Output directory.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(long)]
    schemas: PathBuf,
    #[arg(long)]
    entity: String,
}

/// Store selected for a command run.
enum StoreHandle {
    Memory { store: MemoryStore, path: PathBuf },
    Postgres(PostgresStore),
}

impl StoreHandle {
    async fn open(args: &StoreArgs, settings: &RowportSettings) -> CliResult<Self> {
        if let Some(url) = args.database_url.as_ref().or(settings.database_url.as_ref()) {
            return Ok(StoreHandle::Postgres(PostgresStore::connect(url).await?));
        }
        let store = if args.store.exists() {
            let content = std::fs::read(&args.store)?;
            MemoryStore::from_snapshot(serde_json::from_slice::<MemorySnapshot>(&content)?)
        } else {
            MemoryStore::new()
        };
        Ok(StoreHandle::Memory {
            store,
            path: args.store.clone(),
        })
    }

    fn store(&self) -> &dyn RecordStore {
        match self {
            StoreHandle::Memory { store, .. } => store,
            StoreHandle::Postgres(store) => store,
        }
    }

    fn persist(&self) -> CliResult<()> {
        if let StoreHandle::Memory { store, path } = self {
            let data = serde_json::to_vec_pretty(&store.snapshot()?)?;
            write_bytes_atomic(path, &data)?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        settings.log_format
    };
    init_logging(format, settings.log_file.as_deref())?;

    match cli.command {
        Command::Import(args) => run_import(args, &settings).await,
        Command::Export(args) => run_export(args, &settings).await,
        Command::Inspect(args) => run_inspect(args),
        Command::SchemaJson => print_json(&entity_json_schema()),
    }
}

async fn run_import(args: ImportArgs, settings: &RowportSettings) -> CliResult<()> {
    let registry = load_registry(&args.schemas)?;
    let file = std::fs::read(&args.file)?;
    let mappings_json = match &args.mapping {
        Some(value) => read_inline_or_file(value)?,
        None => suggested_mappings(&registry, &args.entity, &file)?,
    };

    let mut import_settings = settings.import_settings();
    if let Some(limit) = args.error_limit {
        import_settings.error_limit = limit;
    }
    if let Some(size) = args.batch_size {
        import_settings.batch_size = size;
    }

    let handle = StoreHandle::open(&args.store, settings).await?;
    let request = ImportRequest {
        entity: args.entity,
        file,
        mappings_json,
        duplicate_strategy: args.strategy,
        organization_id: args.org,
    };
    let result = import_upload(handle.store(), &registry, &request, &import_settings).await?;
    handle.persist()?;
    print_json(&result)?;

    match &result.aborted {
        Some(reason) => Err(CliError::Aborted(format!("{reason:?}"))),
        None => Ok(()),
    }
}

/// Mapping JSON built by matching header cells to field names and labels.
fn suggested_mappings(registry: &StaticRegistry, entity: &str, file: &[u8]) -> CliResult<String> {
    let resolved = registry
        .resolve(entity)
        .ok_or_else(|| CliError::InvalidConfig(format!("entity not found: {entity}")))?;
    let config = derive_model_config(&resolved.schema);
    let parsed = parse_csv_bytes(file)?;
    let mappings = suggest_mappings(&config, &parsed.headers);
    tracing::info!(entity, mapped = mappings.len(), "using suggested mappings");
    Ok(serde_json::to_string(&mappings)?)
}

async fn run_export(args: ExportArgs, settings: &RowportSettings) -> CliResult<()> {
    let registry = load_registry(&args.schemas)?;
    let resolved = registry
        .resolve(&args.entity)
        .ok_or_else(|| CliError::InvalidConfig(format!("entity not found: {}", args.entity)))?;
    let config = derive_model_config(&resolved.schema);

    let mut filters = Vec::with_capacity(args.filter.len());
    for raw in &args.filter {
        let (field, value) = parse_filter(raw)?;
        let value = match config.field(&field) {
            Some(field) => field
                .kind
                .coerce(&value)
                .map_err(|message| CliError::InvalidConfig(format!("filter {raw}: {message}")))?,
            None => FieldValue::Text(value),
        };
        filters.push(Filter { field, value });
    }
    let sort = match &args.sort {
        Some(raw) => Some(
            SortSpec::parse(raw)
                .ok_or_else(|| CliError::InvalidConfig(format!("invalid sort '{raw}'")))?,
        ),
        None => None,
    };

    let handle = StoreHandle::open(&args.store, settings).await?;
    let request = ExportRequest {
        organization_id: args.org,
        fields: (!args.fields.is_empty()).then_some(args.fields),
        filters,
        sort,
        limit: args.limit,
    };
    let output = export_entity(handle.store(), &registry, &args.entity, &request).await?;

    let path = args.out.join(&output.filename);
    write_bytes_atomic(&path, output.csv.as_bytes())?;
    print_json(&serde_json::json!({
        "path": path_display(&path),
        "rowCount": output.row_count,
        "truncated": output.truncated,
    }))
}

fn run_inspect(args: InspectArgs) -> CliResult<()> {
    let registry = load_registry(&args.schemas)?;
    let resolved = registry
        .resolve(&args.entity)
        .ok_or_else(|| CliError::InvalidConfig(format!("entity not found: {}", args.entity)))?;
    let mut config = derive_model_config(&resolved.schema);
    config.table_name = resolved.table_name;
    print_json(&config)
}

fn parse_filter(raw: &str) -> CliResult<(String, String)> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidConfig(format!(
            "invalid filter '{raw}' (expected FIELD=VALUE)"
        ))),
    }
}

fn path_display(path: &Path) -> String {
    path.display().to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_args_split_fields_and_filters() {
        let cli = Cli::try_parse_from([
            "rowport",
            "export",
            "--schemas",
            "schemas.json",
            "--entity",
            "assets",
            "--org",
            "acme",
            "--fields",
            "tag,name",
            "--filter",
            "status=active",
            "--sort",
            "tag:desc",
        ])
        .expect("parse");
        let Command::Export(args) = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(args.fields, vec!["tag".to_string(), "name".to_string()]);
        assert_eq!(args.filter, vec!["status=active".to_string()]);
        assert_eq!(args.out, PathBuf::from("."));
    }

    #[test]
    fn filters_need_a_field_name() {
        assert_eq!(
            parse_filter("status=active").expect("filter"),
            ("status".to_string(), "active".to_string())
        );
        assert_eq!(
            parse_filter("note=a=b").expect("filter"),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_filter("=x").is_err());
        assert!(parse_filter("status").is_err());
    }
}
