//! riskgraph CLI: score activity records and query the result.
//!
//! Usage:
//!   riskgraph analyze <records.json>... [--top N] [--db path] [--config path]
//!   riskgraph critical [--top N]
//!   riskgraph path <start> [--max-depth N] [--min-risk R]
//!   riskgraph forecast <node> [--periods N]
//!   riskgraph node <id>
//!   riskgraph flag <id> [--clear]
//!   riskgraph note <id> <text>

use clap::{Parser, Subcommand};
use riskgraph::adapter::{IngestPipeline, JsonFileSource};
use riskgraph::embedding::{backend_from_name, EmbeddingGenerator};
use riskgraph::{
    GraphEngine, GraphFilter, GraphProcessor, InferenceModel, InvestigationApi, OpenStore, PredictiveGnn,
    RankedNode, Settings, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "riskgraph",
    version,
    about = "Temporal entity graph with graph-neural risk scoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file holding the scored graph
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSON record files, score the graph and store it
    Analyze {
        /// Files shaped like {"nodes": [...], "edges": [...]}
        #[arg(required = true)]
        records: Vec<PathBuf>,
        /// How many critical nodes to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List the most critical nodes
    Critical {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Find the riskiest investigation path from a node
    Path {
        start: String,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        min_risk: Option<f32>,
    },
    /// Forecast a node's risk
    Forecast {
        node: String,
        /// Periods ahead
        #[arg(long)]
        periods: Option<usize>,
    },
    /// Show a node with its neighbourhood
    Node { id: String },
    /// Flag a node for investigation
    Flag {
        id: String,
        /// Clear the flag instead of setting it
        #[arg(long)]
        clear: bool,
    },
    /// Append an investigation note to a node
    Note { id: String, text: String },
    /// Print graph statistics
    Stats {
        /// Only count nodes at or above this risk
        #[arg(long)]
        min_risk: Option<f32>,
    },
}

/// Get the default database path (~/.local/share/riskgraph/riskgraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("riskgraph").join("riskgraph.db")
}

fn load_model(settings: &Settings) -> Result<Arc<dyn InferenceModel>, String> {
    let model = match &settings.data.model_path {
        Some(path) => PredictiveGnn::load(path).map_err(|e| format!("Failed to load model: {}", e))?,
        None => PredictiveGnn::new(settings.gnn.clone()).map_err(|e| format!("Invalid model settings: {}", e))?,
    };
    Ok(Arc::new(model))
}

fn build_api(settings: &Settings, db: &Path, records: &[PathBuf]) -> Result<InvestigationApi, String> {
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("Cannot create {}: {}", parent.display(), e))?;
    }
    let store = SqliteStore::open(db).map_err(|e| format!("Failed to open database: {}", e))?;
    let engine = GraphEngine::with_store(Arc::new(store));
    engine
        .load_persisted()
        .map_err(|e| format!("Failed to load graph: {}", e))?;

    let mut pipeline =
        IngestPipeline::new().with_max_rejection_fraction(settings.ingestion.max_rejection_fraction);
    for path in records {
        pipeline.register_source(Arc::new(JsonFileSource::new(path)));
    }

    let backend = backend_from_name(&settings.embedding.model_name, settings.embedding.dimension)
        .map_err(|e| format!("Embedding backend: {}", e))?;
    let embeddings = EmbeddingGenerator::new(backend).with_batch_size(settings.embedding.batch_size);
    let processor =
        GraphProcessor::new(Arc::new(embeddings), load_model(settings)?).with_config(settings.processor_config());

    Ok(InvestigationApi::new(
        Arc::new(engine),
        Arc::new(pipeline),
        Arc::new(processor),
    ))
}

fn print_ranked(ranked: &[RankedNode]) {
    for (i, r) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {:<32} {:<9} risk={:.3} relevance={:.3} composite={:.3}{}",
            i + 1,
            r.node.id,
            r.node.risk_level(),
            r.node.risk_score(),
            r.node.relevance_score(),
            r.composite,
            if r.node.is_critical() { "  [critical]" } else { "" }
        );
    }
}

async fn cmd_analyze(api: &InvestigationApi, top: usize) -> i32 {
    let summary = match api.reingest().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let ingest = &summary.ingest;
    println!(
        "Ingested {} records from {} source(s): {} nodes, {} edges, {} merged, {} rejected",
        ingest.records_produced,
        ingest.sources,
        ingest.nodes_committed,
        ingest.edges_committed,
        ingest.nodes_merged,
        ingest.rejected()
    );
    for rejection in &ingest.rejections {
        println!("  rejected {} from {}: {}", rejection.record_id, rejection.source, rejection.reason);
    }
    let scoring = &summary.scoring;
    println!(
        "Scored {} nodes ({} forecasts, {} anomalous edges, {} critical)",
        scoring.nodes_scored, scoring.forecasts, scoring.anomalies_marked, scoring.critical
    );
    match api.get_critical_nodes(top) {
        Ok(ranked) => {
            print_ranked(&ranked);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_critical(api: &InvestigationApi, top: usize) -> i32 {
    match api.get_critical_nodes(top) {
        Ok(ranked) if ranked.is_empty() => {
            println!("Graph is empty; run `riskgraph analyze` first");
            0
        }
        Ok(ranked) => {
            print_ranked(&ranked);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_path(api: &InvestigationApi, start: &str, max_depth: usize, min_risk: f32) -> i32 {
    match api.find_investigation_path(start, max_depth, min_risk) {
        Ok(path) => {
            println!("{}", path.describe());
            for node in &path.nodes {
                println!("  {:<32} risk={:.3}", node.id, node.risk_score());
            }
            println!("{} hop(s), total risk {:.3}", path.hops(), path.total_risk);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_forecast(api: &InvestigationApi, node: &str, periods: usize) -> i32 {
    match api.forecast(node, periods) {
        Ok(f) => {
            match (f.forecasted_risk, f.change) {
                (Some(predicted), Some(change)) => println!(
                    "{}: current {:.3}, in {} period(s) {:.3} ({:+.3})",
                    f.node_id, f.current_risk, f.periods_ahead, predicted, change
                ),
                _ => println!("{}: current {:.3}, no activity trend to forecast from", f.node_id, f.current_risk),
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_node(api: &InvestigationApi, id: &str) -> i32 {
    match api.get_node(id) {
        Ok(detail) => match serde_json::to_string_pretty(&detail) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(api: &InvestigationApi, min_risk: Option<f32>) -> i32 {
    let stats = match api.get_stats() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("nodes: {}  edges: {}", stats.total_nodes, stats.total_edges);
    for (level, count) in &stats.risk_distribution {
        println!("  {:<9} {}", level, count);
    }
    for (node_type, count) in &stats.node_types {
        println!("  {:<9} {}", node_type, count);
    }
    println!(
        "avg risk {:.3}, avg relevance {:.3}, {} critical, {} flagged, {} anomalous edges",
        stats.avg_risk_score, stats.avg_relevance_score, stats.critical_nodes, stats.flagged_nodes, stats.anomalous_edges
    );
    if let (Some(start), Some(end)) = (stats.start, stats.end) {
        println!("activity from {} to {}", start.to_rfc3339(), end.to_rfc3339());
    }
    if let Some(min_risk) = min_risk {
        match api.get_graph(&GraphFilter::new().min_risk(min_risk)) {
            Ok(view) => println!(
                "{} node(s) and {} edge(s) at risk >= {}",
                view.node_count(),
                view.edge_count(),
                min_risk
            ),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let db = cli
        .db
        .or_else(|| settings.data.db_path.clone())
        .unwrap_or_else(default_db_path);
    let records: &[PathBuf] = match &cli.command {
        Commands::Analyze { records, .. } => records,
        _ => &[],
    };
    let api = match build_api(&settings, &db, records) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let investigation = &settings.investigation;
    let code = match cli.command {
        Commands::Analyze { top, .. } => cmd_analyze(&api, top).await,
        Commands::Critical { top } => cmd_critical(&api, top),
        Commands::Path {
            start,
            max_depth,
            min_risk,
        } => cmd_path(
            &api,
            &start,
            max_depth.unwrap_or(investigation.max_depth),
            min_risk.unwrap_or(investigation.min_risk),
        ),
        Commands::Forecast { node, periods } => {
            cmd_forecast(&api, &node, periods.unwrap_or(investigation.forecast_horizon))
        }
        Commands::Node { id } => cmd_node(&api, &id),
        Commands::Flag { id, clear } => match api.set_flag(&id, !clear).await {
            Ok(()) => {
                println!("{} {}", if clear { "Cleared flag on" } else { "Flagged" }, id);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Note { id, text } => match api.append_note(&id, &text).await {
            Ok(()) => {
                println!("Added note to {}", id);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Stats { min_risk } => cmd_stats(&api, min_risk),
    };
    std::process::exit(code);
}
