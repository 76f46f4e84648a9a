use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use crate::baq::{
    BaqClient, FilterScalar, FilterValue, Filters, MissingValues, QueryRequest, Row, Select,
};
use crate::config::{self, Overrides, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid output '{raw}' in profile. Supported values: text, json."
            )),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct QueryArgs {
    /// Name of the BAQ to run.
    #[arg(value_name = "QUERY")]
    pub query: String,
    /// Field to return; accepts comma-separated lists and may be repeated.
    #[arg(long, value_delimiter = ',', value_name = "FIELD")]
    pub select: Vec<String>,
    /// Filter as KEY=VALUE, or KEY=V1,V2,... for a list filter.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
    /// JSON object of filters; --filter entries are applied on top.
    #[arg(long, value_name = "JSON")]
    pub filters_json: Option<String>,
    /// Method to retry once with when the server answers with an error status.
    #[arg(long, value_name = "METHOD")]
    pub retry_method: Option<String>,
    /// CSV file listing requested values that were never returned
    /// [default: missing_items.csv].
    #[arg(long, value_name = "PATH")]
    pub missing_report: Option<PathBuf>,
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,
    #[arg(long, value_enum)]
    pub output: Option<OutputMode>,
    /// Shorthand for --output json.
    #[arg(long)]
    pub json: bool,
    /// Also write the rendered output to a file.
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
    /// Print the planned requests without sending them.
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long, short)]
    pub verbose: bool,
    /// Suppress everything but fatal errors; wins over --verbose.
    #[arg(long, short)]
    pub quiet: bool,
}

pub async fn run(args: QueryArgs) -> Result<(), String> {
    init_logging(args.verbose, args.quiet);

    let profile = match args.profile.as_deref() {
        Some(name) => Some(config::load_profile(name)?),
        None => None,
    };
    let settings = Settings::resolve(
        Overrides {
            base_url: args.base_url.clone(),
            timeout: args.timeout,
            retry_method: args.retry_method.clone(),
            missing_report: args.missing_report.clone(),
            accept_invalid_certs: args.insecure,
        },
        profile,
    )?;
    let output = resolve_output(&args, &settings)?;
    let request = build_request(&args)?;

    let config = settings.client_config(!args.dry_run)?;
    let client = BaqClient::new(config).map_err(|err| err.to_string())?;

    tracing::debug!(
        query = %request.query_name,
        base_url = %client.config().base_url,
        api_key_present = settings.api_key.is_some(),
        credentials_present = settings.credentials.is_some(),
        retry_method = settings.retry_method.as_deref().unwrap_or("none"),
        "resolved query settings"
    );

    if args.dry_run {
        let dry_run = client.dry_run(&request).map_err(|err| err.to_string())?;
        let body = json!({
            "dry_run": true,
            "query": request.query_name,
            "url": dry_run.url,
            "requests": dry_run.requests,
            "retry_method": settings.retry_method,
            "missing_report": settings.missing_report,
            "output": output.as_str(),
        });
        let rendered = serde_json::to_string(&body).map_err(|err| err.to_string())?;
        return emit(&rendered, args.save.as_deref());
    }

    let report = client
        .run_query(&request, settings.retry_method.as_deref())
        .await
        .map_err(|err| err.to_string())?;

    if !report.missing.is_empty() {
        let written = client.save_missing(&report.missing);
        if written && !args.quiet {
            print_missing_summary(&report.missing, &settings.missing_report);
        }
    }
    if report.failed_plans > 0 && !args.quiet {
        eprintln!(
            "{}",
            format!(
                "warning: {} of {} requests failed; results are partial",
                report.failed_plans, report.plans
            )
            .yellow()
        );
    }

    let rendered = match output {
        OutputMode::Json => serde_json::to_string_pretty(&report.rows),
        OutputMode::Text => Ok(render_table(&report.rows)),
    }
    .map_err(|err| err.to_string())?;
    emit(&rendered, args.save.as_deref())
}

fn init_logging(verbose: bool, quiet: bool) {
    let directive = if quiet {
        "error"
    } else if verbose {
        "warn,baqpipe=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn resolve_output(args: &QueryArgs, settings: &Settings) -> Result<OutputMode, String> {
    if args.json {
        return Ok(OutputMode::Json);
    }
    if let Some(output) = args.output {
        return Ok(output);
    }
    match settings.output.as_deref() {
        Some(raw) => OutputMode::parse(raw),
        None => Ok(OutputMode::Text),
    }
}

pub fn build_request(args: &QueryArgs) -> Result<QueryRequest, String> {
    let mut filters = match args.filters_json.as_deref() {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|err| format!("Failed to parse --filters-json: {err}"))?;
            Filters::from_json(&value).map_err(|err| err.to_string())?
        }
        None => Filters::new(),
    };
    for raw in &args.filters {
        let (key, value) = parse_filter_arg(raw)?;
        filters.insert(key, value);
    }

    let select = if args.select.is_empty() {
        None
    } else {
        let fields = args.select.iter().map(|field| field.trim().to_string());
        Some(Select::Fields(fields.collect()))
    };

    let request = QueryRequest {
        query_name: args.query.trim().to_string(),
        select,
        filters,
    };
    request.validate().map_err(|err| err.to_string())?;
    Ok(request)
}

/// `KEY=VALUE` is a scalar filter, `KEY=V1,V2` a list filter.
pub fn parse_filter_arg(raw: &str) -> Result<(String, FilterValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Invalid --filter '{raw}'. Expected KEY=VALUE."))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid --filter '{raw}'. Filter key is empty."));
    }

    let value = if value.contains(',') {
        FilterValue::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(FilterScalar::parse)
                .collect(),
        )
    } else {
        FilterValue::Scalar(FilterScalar::parse(value))
    };
    Ok((key.to_string(), value))
}

/// Tab-separated header plus one line per row; columns in first-seen order.
pub fn render_table(rows: &[Row]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.keys() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    if columns.is_empty() {
        return String::new();
    }

    let mut out = columns.join("\t");
    for row in rows {
        let cells = columns
            .iter()
            .map(|column| match row.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            })
            .collect::<Vec<_>>();
        out.push('\n');
        out.push_str(&cells.join("\t"));
    }
    out
}

fn print_missing_summary(missing: &MissingValues, path: &Path) {
    eprintln!(
        "{}",
        format!(
            "{} requested values were not returned ({} unique); see {}",
            missing.len(),
            missing.unique_values(),
            path.display()
        )
        .yellow()
    );
}

fn emit(rendered: &str, save: Option<&Path>) -> Result<(), String> {
    if let Some(path) = save {
        save_output(path, rendered)?;
    }
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}

fn save_output(path: &Path, rendered: &str) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| {
            format!(
                "Failed to create output directory '{}': {err}",
                parent.display()
            )
        })?;
    }
    fs::write(path, rendered)
        .map_err(|err| format!("Failed to write output file '{}': {err}", path.display()))
}
