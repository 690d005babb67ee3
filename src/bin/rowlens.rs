//! rowlens: browse and query Postgres tables from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # List tables
//! rowlens tables
//!
//! # Fetch rows with filters
//! rowlens rows users -w "age >= 18" -w "role in (admin,staff)" --order id.desc --limit 10
//!
//! # Dry run (show the request only)
//! rowlens rows users -w "email ilike '%@example.com'" --dry-run
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use rowlens::backend::{PgQuery, PostgrestQuery};
use rowlens::controller::{
    AuthGate, DEFAULT_PAGE_LIMIT, DraftPatch, FilterDraft, QueryRunner, TableExplorer,
};
use rowlens::prelude::*;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowlens")]
#[command(version)]
#[command(about = "Browse and query Postgres tables over PostgREST or sqlx", long_about = None)]
#[command(after_help = "EXAMPLES:
    rowlens tables
    rowlens describe users
    rowlens browse users --limit 10
    rowlens run tickets -d 'status in open,pending' -d 'assignee eq alice'
    rowlens rows users -w 'age >= 18' --order created_at.desc --limit 20 --count
    rowlens update users '{\"role\":\"admin\"}' -w 'id = 7'
    rowlens delete sessions -w 'expired is true' --dry-run")]
struct Cli {
    /// Project URL
    #[arg(long, global = true, env = "ROWLENS_URL")]
    url: Option<String>,

    /// Public (anon) API key
    #[arg(long, global = true, env = "ROWLENS_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    /// Session token to send instead of the anon key
    #[arg(long, global = true, env = "ROWLENS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Query Postgres directly instead of going through PostgREST
    #[arg(long, global = true, env = "ROWLENS_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Config file to use instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Don't execute, just show the request or SQL
    #[arg(long, global = true)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables in the configured schemas
    Tables,
    /// Show the columns of a table
    Describe { table: String },
    /// Show the columns and the first page of a table
    Browse {
        /// Table to open; defaults to the first listed table
        table: Option<String>,
        /// Rows per page
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u64,
    },
    /// Run filter drafts given as `column operator value`; values are sent as text
    Run {
        table: String,
        /// Draft, e.g. `status in open,pending`; repeatable
        #[arg(short = 'd', long = "draft")]
        drafts: Vec<String>,
    },
    /// Fetch rows
    Rows {
        table: String,
        #[command(flatten)]
        filters: FilterArgs,
        /// Order spec, e.g. `id.desc`
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
        /// Columns to return
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Ask for the exact number of matching rows
        #[arg(long)]
        count: bool,
    },
    /// Insert a row given as a JSON object
    Insert { table: String, json: String },
    /// Update the matching rows with a JSON object of new values
    Update {
        table: String,
        json: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Delete the matching rows
    Delete {
        table: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Exchange a refresh token for a new access token
    Refresh {
        #[arg(long, env = "ROWLENS_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
    /// Register with email and password
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// User metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Filter expression, e.g. `age >= 18`; repeatable
    #[arg(short = 'w', long = "where")]
    filters: Vec<String>,
}

/// Shows what a handle would send without sending it.
trait Explain {
    fn explain(&self) -> String;
}

impl Explain for PostgrestQuery {
    fn explain(&self) -> String {
        let url = match self.to_url() {
            Ok(url) => url.to_string(),
            Err(e) => format!("<invalid url: {}>", e),
        };
        match self.prefer() {
            Some(prefer) => format!("{} {}\nPrefer: {}", self.method(), url, prefer),
            None => format!("{} {}", self.method(), url),
        }
    }
}

impl Explain for PgQuery {
    fn explain(&self) -> String {
        self.to_sql()
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rowlens=debug" } else { "rowlens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let base = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => ClientConfig::discover()?,
    };
    let mut explicit = ClientConfig::builder();
    if let Some(url) = &cli.url {
        explicit = explicit.url(url);
    }
    if let Some(key) = &cli.anon_key {
        explicit = explicit.anon_key(key);
    }
    if let Some(token) = &cli.access_token {
        explicit = explicit.access_token(token);
    }
    if let Some(db) = &cli.database_url {
        explicit = explicit.database_url(db);
    }
    Ok(base.merge(explicit.build()))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::SignIn { email, password } => return sign_in(&config, email, password).await,
        Commands::SignUp {
            email,
            password,
            metadata,
        } => return sign_up(&config, email, password, metadata.as_deref()).await,
        Commands::Refresh { refresh_token } => return refresh(&config, refresh_token).await,
        _ => {}
    }

    match config.database_url.as_deref() {
        Some(url) => {
            if cli.verbose {
                println!("{} {}", "Connecting to:".dimmed(), redact(url));
            }
            let backend = if cli.dry_run {
                PgBackend::connect_lazy(url)?
            } else {
                PgBackend::connect(url).await?
            };
            execute(Arc::new(backend), &config, &cli).await
        }
        None => execute(shared_client(&config)?, &config, &cli).await,
    }
}

async fn execute<B>(backend: Arc<B>, config: &ClientConfig, cli: &Cli) -> anyhow::Result<()>
where
    B: Backend,
    B::Query: Explain,
{
    let service = RowQueryService::new(Arc::clone(&backend));

    match &cli.command {
        Commands::Tables => {
            let explorer = open_explorer(backend, config, DEFAULT_PAGE_LIMIT);
            explorer.load_tables().await;
            let state = explorer.state();
            if let Some(error) = state.error {
                bail!(error);
            }
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state.tables)?),
                OutputFormat::Table => {
                    if state.tables.is_empty() {
                        println!("{}", "(no tables)".dimmed());
                    }
                    for table in &state.tables {
                        println!("  {}", table.name.cyan());
                    }
                }
            }
        }
        Commands::Describe { table } => {
            let schema = SchemaService::with_schemas(backend, config.schemas.clone());
            let described = schema.describe_table(table).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&described)?),
                OutputFormat::Table => print_columns(&described),
            }
        }
        Commands::Rows {
            table,
            filters,
            order,
            limit,
            offset,
            columns,
            count,
        } => {
            let filters = parse_filters(filters.filters.as_slice())?;
            let mut options = QueryOptions::new().columns(columns.iter().cloned());
            if let Some(order) = order {
                let order = parse_order(order)?;
                options = options.order_by(order.column, order.ascending);
            }
            if let Some(limit) = limit {
                options = options.limit(*limit);
            }
            if let Some(offset) = offset {
                options = options.offset(*offset);
            }
            if *count {
                options = options.with_count();
            }

            if cli.dry_run {
                let query = service.build_select(table, &filters, &options)?;
                return show_dry_run(&query);
            }
            let result: QueryResult = service.fetch_rows(table, &filters, &options).await;
            print_result(result, cli.format)?;
        }
        Commands::Browse { table, limit } => {
            let explorer = open_explorer(Arc::clone(&backend), config, *limit);
            let table = match table {
                Some(table) => table.clone(),
                None => {
                    explorer.load_tables().await;
                    let state = explorer.state();
                    if let Some(error) = state.error {
                        bail!(error);
                    }
                    state
                        .active_table
                        .context("no tables to browse")?
                }
            };
            if cli.dry_run {
                let options = QueryOptions::new().limit(explorer.limit()).order_by("id", true);
                return show_dry_run(&service.build_select(&table, &[], &options)?);
            }
            explorer.load_table(&table).await;
            let state = explorer.state();
            if let Some(error) = state.error {
                bail!(error);
            }
            print_columns(&TableSchema {
                name: table,
                columns: state.columns,
            });
            println!();
            format_output(&state.rows.unwrap_or_default(), cli.format);
        }
        Commands::Run { table, drafts } => {
            let runner = QueryRunner::with_service(service.clone());
            runner.set_table_name(table.as_str());
            for line in drafts {
                let id = runner.add_draft();
                runner.update_draft(id, draft_patch(line)?);
            }
            if cli.dry_run {
                let filters: Vec<FilterClause> = runner
                    .state()
                    .drafts
                    .iter()
                    .filter_map(FilterDraft::to_clause)
                    .collect();
                return show_dry_run(&service.build_select(table, &filters, &QueryOptions::new())?);
            }
            runner.run().await;
            let state = runner.state();
            if let Some(error) = state.error {
                bail!(error);
            }
            format_output(&state.rows.unwrap_or_default(), cli.format);
        }
        Commands::Insert { table, json } => {
            let payload = parse_json_object(json)?;
            if cli.dry_run {
                return show_dry_run(&backend.insert(table, payload));
            }
            let result: QueryResult = service.insert_row(table, &payload).await;
            print_result(result, cli.format)?;
        }
        Commands::Update {
            table,
            json,
            filters,
        } => {
            let payload = parse_json_object(json)?;
            let filters = parse_filters(filters.filters.as_slice())?;
            if cli.dry_run {
                return show_dry_run(&service.build_update(table, &payload, &filters)?);
            }
            let result: QueryResult = service.update_row(table, &payload, &filters).await;
            print_result(result, cli.format)?;
        }
        Commands::Delete { table, filters } => {
            let filters = parse_filters(filters.filters.as_slice())?;
            if filters.is_empty() && !cli.dry_run {
                bail!("refusing to delete every row of '{}'; pass at least one -w filter", table);
            }
            if cli.dry_run {
                return show_dry_run(&service.build_delete(table, &filters)?);
            }
            print_result(service.delete_rows(table, &filters).await, cli.format)?;
        }
        Commands::SignIn { .. } | Commands::SignUp { .. } | Commands::Refresh { .. } => {}
    }

    Ok(())
}

fn open_explorer<B: Backend>(
    backend: Arc<B>,
    config: &ClientConfig,
    limit: u64,
) -> TableExplorer<B> {
    let explorer = TableExplorer::with_schema(
        RowQueryService::new(Arc::clone(&backend)),
        SchemaService::with_schemas(backend, config.schemas.clone()),
    );
    explorer.set_limit(limit);
    explorer
}

/// Split `column operator value` into a draft edit. The value keeps its
/// inner spaces.
fn draft_patch(line: &str) -> anyhow::Result<DraftPatch> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let (Some(column), Some(operator)) = (parts.next(), parts.next()) else {
        bail!("draft '{}' must look like `column operator value`", line);
    };
    let value = parts.next().unwrap_or_default().trim();
    Ok(DraftPatch::default()
        .column(column)
        .operator(operator.to_lowercase())
        .value(value))
}

async fn sign_in(config: &ClientConfig, email: &str, password: &str) -> anyhow::Result<()> {
    let auth = AuthClient::new(config)?;
    let mut gate = AuthGate::new(auth.subscribe());
    let session = auth.sign_in_with_password(email, password).await?;
    gate.sync();
    report_session(&gate, email, &session);
    Ok(())
}

async fn refresh(config: &ClientConfig, refresh_token: &str) -> anyhow::Result<()> {
    let auth = AuthClient::new(config)?;
    let mut gate = AuthGate::new(auth.subscribe());
    let expired = Session {
        access_token: config.access_token.clone().unwrap_or_default(),
        token_type: None,
        refresh_token: Some(refresh_token.to_string()),
        expires_in: None,
        expires_at: Some(chrono::Utc::now()),
        user: None,
    };
    let session = auth.restore_session(expired).await?;
    gate.sync();
    report_session(&gate, "session", &session);
    Ok(())
}

fn report_session(gate: &AuthGate, fallback: &str, session: &Session) {
    let who = gate
        .state()
        .user
        .as_ref()
        .and_then(|u| u.email.clone())
        .unwrap_or_else(|| fallback.to_string());
    if gate.is_authenticated() {
        println!("{} Signed in as {}", "✓".green(), who.cyan());
    } else {
        println!("{} Refreshed {}", "✓".green(), who.cyan());
    }
    if let Some(expires_at) = session.expires_at {
        println!("  {} {}", "Expires:".dimmed(), expires_at.to_rfc3339());
    }
    println!();
    println!("export ROWLENS_ACCESS_TOKEN={}", session.access_token);
    if let Some(refresh_token) = &session.refresh_token {
        println!("export ROWLENS_REFRESH_TOKEN={}", refresh_token);
    }
}

async fn sign_up(
    config: &ClientConfig,
    email: &str,
    password: &str,
    metadata: Option<&str>,
) -> anyhow::Result<()> {
    let metadata = metadata.map(parse_json_object).transpose()?;
    let auth = AuthClient::new(config)?;
    let outcome = auth.sign_up_with_password(email, password, metadata).await?;
    match outcome.session {
        Some(session) => {
            println!("{} Registered and signed in as {}", "✓".green(), email.cyan());
            println!();
            println!("export ROWLENS_ACCESS_TOKEN={}", session.access_token);
        }
        None => {
            println!("{} Registered {}", "✓".green(), email.cyan());
            println!("{}", "Check your inbox to confirm the address before signing in.".yellow());
        }
    }
    Ok(())
}

fn parse_json_object(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw).context("payload is not valid JSON")?;
    if !value.is_object() {
        bail!("payload must be a JSON object");
    }
    Ok(value)
}

fn show_dry_run<Q: Explain>(query: &Q) -> anyhow::Result<()> {
    println!("{}", "Request:".green().bold());
    println!("{}", query.explain().white());
    Ok(())
}

fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

fn print_result(result: QueryResult, format: OutputFormat) -> anyhow::Result<()> {
    if let Some(error) = result.error {
        let mut message = error.message.clone();
        if let Some(code) = &error.code {
            message = format!("{} ({})", message, code);
        }
        if let Some(details) = &error.details {
            message = format!("{}\n  {} {}", message, "details:".dimmed(), details);
        }
        if let Some(hint) = &error.hint {
            message = format!("{}\n  {} {}", message, "hint:".dimmed(), hint);
        }
        bail!(message);
    }

    let rows = result.data.unwrap_or_default();
    format_output(&rows, format);
    if let Some(count) = result.count {
        println!("{} matching row(s) in total", count.to_string().cyan());
    }
    Ok(())
}

fn print_columns(table: &TableSchema) {
    println!("{}", table.name.cyan().bold());
    if table.columns.is_empty() {
        println!("{}", "(no columns)".dimmed());
        return;
    }
    let width = table.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for column in &table.columns {
        let nullable = if column.is_nullable { "" } else { " not null" };
        let default = column
            .default_value
            .as_deref()
            .map(|d| format!(" default {}", d))
            .unwrap_or_default();
        println!(
            "  {:width$}  {}{}{}",
            column.name.white(),
            column.data_type.yellow(),
            nullable.dimmed(),
            default.dimmed(),
            width = width
        );
    }
}

fn format_output(results: &[Row], format: OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns: Vec<&String> = results[0].keys().collect();

            let mut widths: HashMap<&String, usize> =
                columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).chars().count();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &Value) -> String {
    match val {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}
