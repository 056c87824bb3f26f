use std::path::PathBuf;

use anyhow::Context;
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use poct_usage_monitor::export::{self, UsageSummary, DEFAULT_PREVIEW_LIMIT};
use poct_usage_monitor::ingest::{self, DEFAULT_MAX_UPLOAD_BYTES};
use poct_usage_monitor::{compute_report, report, validate_and_normalize, EngineConfig, LastResultStore};

#[derive(Parser)]
#[command(name = "poct-usage-monitor")]
#[command(about = "Flags POCT barcode sharing and misuse in middleware exports", long_about = None)]
struct Cli {
    /// Verbose diagnostics on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a middleware export and write the requested outputs
    Analyze {
        /// Middleware export in CSV form (save .xlsx sheets as CSV first)
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        thresholds: Thresholds,
        /// Write the JSON usage summary here
        #[arg(long)]
        summary_json: Option<PathBuf>,
        /// Write flagged events as CSV here
        #[arg(long)]
        export_csv: Option<PathBuf>,
        /// Write a markdown usage report here
        #[arg(long)]
        report: Option<PathBuf>,
        /// Audit notes to include in the report
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_LIMIT)]
        preview_limit: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, env = "POCT_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: u64,
    },
    /// Write a blank upload template
    Template {
        #[arg(long, default_value = "poct_usage_template.csv")]
        out: PathBuf,
    },
}

// Keeps window spans well inside chrono's representable range.
const MAX_SPAN: i64 = 100_000;

#[derive(Args)]
struct Thresholds {
    #[arg(long, default_value_t = 1.0)]
    rapid_minutes: f64,
    #[arg(long, default_value_t = 5.0)]
    conflict_window_minutes: f64,
    #[arg(long, default_value_t = 20)]
    hourly_threshold: usize,
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(0..=MAX_SPAN))]
    device_hop_window_minutes: i64,
    #[arg(long, default_value_t = 3)]
    device_hop_devices: usize,
    #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(0..=MAX_SPAN))]
    shift_lookback_hours: i64,
    #[arg(long, default_value_t = 14, value_parser = clap::value_parser!(i64).range(0..=MAX_SPAN))]
    shift_overrun_hours: i64,
    #[arg(long, default_value_t = 3)]
    coloc_operators: usize,
}

impl From<Thresholds> for EngineConfig {
    fn from(args: Thresholds) -> Self {
        Self {
            rapid_minutes: args.rapid_minutes,
            conflict_window_minutes: args.conflict_window_minutes,
            hourly_load_threshold: args.hourly_threshold,
            device_hop_window: Duration::minutes(args.device_hop_window_minutes),
            device_hop_min_devices: args.device_hop_devices,
            shift_lookback: Duration::hours(args.shift_lookback_hours),
            shift_overrun: Duration::hours(args.shift_overrun_hours),
            coloc_min_operators: args.coloc_operators,
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let store = LastResultStore::new();

    match cli.command {
        Commands::Analyze {
            input,
            thresholds,
            summary_json,
            export_csv,
            report: report_path,
            notes,
            preview_limit,
            limit,
            max_upload_bytes,
        } => {
            let bytes = ingest::read_payload(&input, max_upload_bytes)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let raw = ingest::parse_csv(&bytes)?;
            let batch = validate_and_normalize(&raw).map_err(|errors| {
                warn!(%errors, "upload rejected");
                anyhow::anyhow!("{} rejected: {errors}", input.display())
            })?;

            let config = EngineConfig::from(thresholds);
            let engine_config = config.clone();
            let computed = tokio::task::spawn_blocking(move || compute_report(&batch, &engine_config))
                .await
                .context("flag computation did not complete")?;

            let source = input.display().to_string();
            store.publish(&source, computed, config);
            if let Some(notes) = notes {
                store.attach_notes(notes);
            }

            let latest = store.latest().context("no batch was published")?;
            let stats = &latest.report.flag_stats;
            println!(
                "Analyzed {} events from {}: {} flagged.",
                latest.report.events.len(),
                latest.source,
                latest.report.flagged_count()
            );
            println!(
                "Flags: rapid {}, loc_conflict {}, device_hop {}, shift_viol {}, load_dev {}, coloc {}",
                stats.rapid, stats.loc_conflict, stats.device_hop, stats.shift_viol, stats.load_dev, stats.coloc
            );

            let ranked = report::rank_operators(&latest.report);
            if !ranked.is_empty() {
                println!("Top operators by suspicion score:");
                for summary in ranked.iter().take(limit) {
                    println!(
                        "- {} score {:.2} across {} tests",
                        summary.operator_id, summary.suspicion_score, summary.total_tests
                    );
                }
            }

            if let Some(path) = summary_json {
                let json = UsageSummary::from_report(&latest.report, preview_limit).to_json()?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Summary written to {}.", path.display());
            }

            if let Some(path) = export_csv {
                let mut buffer = Vec::new();
                let rows = export::write_flagged_csv(&latest.report, &mut buffer)?;
                tokio::fs::write(&path, buffer)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Exported {rows} flagged events to {}.", path.display());
            }

            if let Some(path) = report_path {
                let text = report::build_report(&latest, store.notes().as_deref(), limit);
                tokio::fs::write(&path, text)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Report written to {}.", path.display());
            }

            let status = store.status();
            info!(
                version = status.version,
                uptime_secs = status.uptime_secs,
                batch_id = ?status.batch_id,
                last_processed = ?status.last_processed,
                "analysis complete"
            );
        }
        Commands::Template { out } => {
            tokio::fs::write(&out, export::template_csv())
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Template written to {}.", out.display());
        }
    }

    Ok(())
}
