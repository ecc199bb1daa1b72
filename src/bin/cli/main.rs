//! Binary entry point for the `cctql` calling-context query CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use cctql::query::object::object_query_from_json;
use cctql::query::{AnyQuery, EngineStats, QueryEngine};
use cctql::{parse_string_dialect, AggregationMode, Frame};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::{CliConfig, Profile};
use ui::{format_duration, Level, MatchLine, PositionLine, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "cctql",
    version,
    about = "Query calling-context graphs with path patterns",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "CCTQL_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/cctql/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Config profile to apply")]
    profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Output format for structured responses"
    )]
    format: Option<OutputFormat>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct QuerySource {
    #[arg(long, value_name = "QUERY", help = "String-dialect query text")]
    text: Option<String>,

    #[arg(long, value_name = "JSON", help = "Object-dialect query as a JSON array")]
    object: Option<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "File holding a query (JSON arrays are read as object dialect)"
    )]
    query_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QueryCmd {
    #[arg(long, value_name = "FILE", help = "Graph literal (JSON) to query")]
    graph: Option<PathBuf>,

    #[command(flatten)]
    source: QuerySource,

    #[arg(long, value_name = "off|all|any", help = "Aggregation mode for multi-row metrics")]
    mode: Option<AggregationMode>,

    #[arg(long, help = "Report engine counters for the run")]
    stats: bool,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[command(flatten)]
    source: QuerySource,

    #[arg(long, value_name = "off|all|any", help = "Aggregation mode to compile with")]
    mode: Option<AggregationMode>,
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    #[command(about = "Print the resolved CLI configuration")]
    Show,
    #[command(about = "Select (or clear) the default profile")]
    SetDefault {
        #[arg(value_name = "PROFILE", required_unless_present = "clear")]
        name: Option<String>,
        #[arg(long, conflicts_with = "name", help = "Remove the default profile")]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Apply a query to a graph literal and list matched nodes")]
    Query(QueryCmd),

    #[command(about = "Compile a query and print its pattern without running it")]
    Check(CheckCmd),

    #[command(subcommand, about = "Inspect or edit the CLI configuration")]
    Config(ConfigCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.clone())?;
    install_tracing(&config);

    let profile = config.resolve_profile(cli.profile.as_deref())?.cloned();
    let format = cli
        .format
        .or_else(|| profile.as_ref().and_then(|p| p.format))
        .or(config.default_format())
        .unwrap_or(OutputFormat::Text);
    let ui = Ui::new(cli.theme, format == OutputFormat::Json);

    match cli.command {
        Command::Query(cmd) => {
            let mode = resolve_mode(cmd.mode, profile.as_ref(), &config);
            let graph = cmd
                .graph
                .clone()
                .or_else(|| profile.as_ref().and_then(|p| p.graph.clone()))
                .ok_or("no graph given; pass --graph or set `graph` in a profile")?;
            let report = run_query(&ui, &graph, &cmd, mode)?;
            emit(&format, &report, |_| print_query_text(&ui, &report))?;
        }
        Command::Check(cmd) => {
            let mode = resolve_mode(cmd.mode, profile.as_ref(), &config);
            let query = load_query(&cmd.source, mode)?;
            let report = CheckReport::new(&query, mode);
            emit(&format, &report, |_| print_check_text(&ui, &report))?;
        }
        Command::Config(ConfigCmd::Show) => {
            let report = ConfigReport::new(&config);
            emit(&format, &report, |_| print_config_text(&ui, &report))?;
        }
        Command::Config(ConfigCmd::SetDefault { name, clear }) => {
            let name = if clear { None } else { name };
            config.set_default_profile(name.as_deref())?;
            let path = config.persist()?;
            match name {
                Some(name) => ui.message(
                    Level::Done,
                    &format!("default profile set to '{name}' in {}", path.display()),
                ),
                None => ui.message(
                    Level::Done,
                    &format!("default profile cleared in {}", path.display()),
                ),
            }
        }
    }
    Ok(())
}

fn install_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_env("CCTQL_LOG")
        .or_else(|_| EnvFilter::try_new(config.log_filter().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_mode(
    explicit: Option<AggregationMode>,
    profile: Option<&Profile>,
    config: &CliConfig,
) -> AggregationMode {
    explicit
        .or_else(|| profile.and_then(|p| p.mode))
        .or(config.default_mode())
        .unwrap_or_default()
}

fn load_query(source: &QuerySource, mode: AggregationMode) -> Result<AnyQuery, Box<dyn Error>> {
    if let Some(text) = &source.text {
        return Ok(parse_string_dialect(text, mode)?);
    }
    if let Some(json) = &source.object {
        return Ok(object_query_from_json(json, mode)?.into());
    }
    let path = source
        .query_file
        .as_ref()
        .ok_or("pass one of --text, --object, or --query-file")?;
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read query file {}: {err}", path.display()))?;
    let contents = contents.trim();
    if contents.starts_with('[') {
        Ok(object_query_from_json(contents, mode)?.into())
    } else {
        Ok(parse_string_dialect(contents, mode)?)
    }
}

#[derive(Debug, Serialize)]
struct MatchedNode {
    id: u32,
    depth: u32,
    frame: Frame,
}

#[derive(Debug, Serialize)]
struct QueryReport {
    graph: String,
    mode: AggregationMode,
    query: String,
    nodes: usize,
    matched: Vec<MatchedNode>,
    load_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<EngineStats>,
}

fn run_query(
    ui: &Ui,
    graph_path: &Path,
    cmd: &QueryCmd,
    mode: AggregationMode,
) -> Result<QueryReport, Box<dyn Error>> {
    let query = load_query(&cmd.source, mode)?;
    let loading = ui.loading(graph_path);
    let (graph, metrics) = cctql::literal::from_path(graph_path)?;
    let load_time = loading.done();

    let mut engine = QueryEngine::new();
    let matched = engine.apply(&query, &graph, &metrics)?;
    let matched = matched
        .into_iter()
        .map(|id| {
            let node = &graph[id];
            MatchedNode {
                id: id.0,
                depth: node.depth(),
                frame: node.frame().clone(),
            }
        })
        .collect();
    Ok(QueryReport {
        graph: graph_path.display().to_string(),
        mode,
        query: query.to_string(),
        nodes: graph.len(),
        matched,
        load_ms: load_time.as_secs_f64() * 1_000.0,
        stats: cmd.stats.then(|| engine.last_stats()),
    })
}

fn print_query_text(ui: &Ui, report: &QueryReport) {
    ui.fields(
        "Query",
        &[
            ("graph", report.graph.clone()),
            ("mode", report.mode.to_string()),
            ("pattern", report.query.clone()),
            (
                "matched",
                format!("{} of {} nodes", report.matched.len(), report.nodes),
            ),
        ],
    );
    if report.matched.is_empty() {
        ui.message(Level::Warn, "no nodes matched");
    } else {
        let frames: Vec<String> = report.matched.iter().map(|node| node.frame.to_string()).collect();
        ui.match_tree(report.matched.iter().zip(&frames).map(|(node, frame)| MatchLine {
            id: node.id,
            depth: node.depth,
            frame,
        }));
    }
    if let Some(stats) = &report.stats {
        ui.fields(
            "Engine",
            &[
                ("nodes visited", stats.nodes_visited.to_string()),
                ("predicate evaluations", stats.predicate_evaluations.to_string()),
                ("cache hits", stats.cache_hits.to_string()),
                ("cache misses", stats.cache_misses.to_string()),
                ("match attempts", stats.match_attempts.to_string()),
                ("paths accepted", stats.paths_accepted.to_string()),
                ("subqueries", stats.queries_applied.to_string()),
                (
                    "elapsed",
                    format_duration(std::time::Duration::from_nanos(stats.elapsed_ns)),
                ),
            ],
        );
    }
}

#[derive(Debug, Serialize)]
struct PositionReport {
    position: usize,
    quantifier: &'static str,
    predicate: String,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    kind: &'static str,
    mode: AggregationMode,
    summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    positions: Vec<PositionReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subqueries: Vec<String>,
}

impl CheckReport {
    fn new(query: &AnyQuery, mode: AggregationMode) -> Self {
        let mut report = CheckReport {
            kind: "query",
            mode,
            summary: query.to_string(),
            positions: Vec::new(),
            subqueries: Vec::new(),
        };
        match query {
            AnyQuery::Query(query) => {
                report.positions = query
                    .entries()
                    .iter()
                    .enumerate()
                    .map(|(position, entry)| PositionReport {
                        position,
                        quantifier: entry.quantifier.symbol(),
                        predicate: entry.predicate.to_string(),
                    })
                    .collect();
            }
            AnyQuery::Compound(compound) => {
                report.kind = "compound";
                report.mode = compound.mode();
                report.subqueries = compound.subqueries().iter().map(ToString::to_string).collect();
            }
            AnyQuery::Object(_) | AnyQuery::Text(_) => report.kind = "literal",
        }
        report
    }
}

fn print_check_text(ui: &Ui, report: &CheckReport) {
    ui.fields(
        "Compiled query",
        &[
            ("kind", report.kind.to_string()),
            ("mode", report.mode.to_string()),
            ("summary", report.summary.clone()),
        ],
    );
    ui.pattern(report.positions.iter().map(|p| PositionLine {
        position: p.position,
        quantifier: p.quantifier,
        predicate: &p.predicate,
    }));
    ui.entries("Subqueries", &report.subqueries);
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    path: Option<String>,
    default_mode: Option<AggregationMode>,
    default_format: Option<OutputFormat>,
    log_filter: Option<String>,
    default_profile: Option<String>,
    profiles: Vec<Profile>,
}

impl ConfigReport {
    fn new(config: &CliConfig) -> Self {
        Self {
            path: config.path().map(|p| p.display().to_string()),
            default_mode: config.default_mode(),
            default_format: config.default_format(),
            log_filter: config.log_filter().map(str::to_string),
            default_profile: config.default_profile_name().map(str::to_string),
            profiles: config.profiles().cloned().collect(),
        }
    }
}

fn print_config_text(ui: &Ui, report: &ConfigReport) {
    let unset = || "-".to_string();
    ui.fields(
        "Configuration",
        &[
            ("path", report.path.clone().unwrap_or_else(unset)),
            (
                "default mode",
                report.default_mode.map(|m| m.to_string()).unwrap_or_else(unset),
            ),
            (
                "default format",
                report
                    .default_format
                    .map(|f| format!("{f:?}").to_lowercase())
                    .unwrap_or_else(unset),
            ),
            ("log filter", report.log_filter.clone().unwrap_or_else(unset)),
            (
                "default profile",
                report.default_profile.clone().unwrap_or_else(unset),
            ),
        ],
    );
    if report.profiles.is_empty() {
        ui.message(Level::Note, "no profiles configured");
        return;
    }
    let profiles: Vec<String> = report
        .profiles
        .iter()
        .map(|profile| {
            let mut parts = Vec::new();
            if let Some(graph) = &profile.graph {
                parts.push(format!("graph={}", graph.display()));
            }
            if let Some(mode) = profile.mode {
                parts.push(format!("mode={mode}"));
            }
            if let Some(format) = profile.format {
                parts.push(format!("format={format:?}").to_lowercase());
            }
            format!("{} {}", profile.name, parts.join(" "))
        })
        .collect();
    ui.entries("Profiles", &profiles);
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}
