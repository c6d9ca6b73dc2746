use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::HashSet;

mod emit;
mod error;
mod family;
mod graph;
mod render;
mod resolve;
mod sheet;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "tma-metrics")]
#[command(about = "Generate perf metric JSON from a TMA metrics spreadsheet", long_about = None)]
struct Cli {
    /// Log resolution details (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every metric of one CPU family.
    Extract {
        /// Family column in the spreadsheet (e.g. SKX, ICL, SPR).
        cpu: String,

        /// TMA metrics spreadsheet exported as CSV.
        csv: String,

        /// Include memory-dependent metrics.
        #[arg(long)]
        memory: bool,

        /// Append sleep-state residency metrics.
        #[arg(long)]
        cstate: bool,

        /// Drop metrics referencing fewer distinct events than this.
        #[arg(long = "expr-events")]
        expr_events: Option<usize>,

        /// Model tested by `#Model in [...]` clauses.
        #[arg(long)]
        extramodel: Option<String>,

        /// JSON array of extra metric descriptors to merge in.
        #[arg(long)]
        extrajson: Option<String>,

        /// PMU of a hybrid part (cpu_core or cpu_atom).
        #[arg(long)]
        unit: Option<String>,

        /// Family profile JSON replacing the built-in one.
        #[arg(long)]
        profile: Option<String>,

        /// Output file; stdout when absent.
        #[arg(short = 'o', long)]
        out: Option<String>,
    },
    /// Print only the sleep-state residency metrics of a family.
    Cstates {
        cpu: String,

        #[arg(long)]
        profile: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(verbose)
        .init();
}

fn load_profile(cpu: &str, path: Option<&str>) -> Result<family::FamilyProfile> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read profile file {}", path))?;
            let profile: family::FamilyProfile = serde_json::from_str(&text)
                .with_context(|| format!("parse profile file {}", path))?;
            if profile.family != cpu {
                anyhow::bail!(
                    "profile {} describes family {}, not {}",
                    path,
                    profile.family,
                    cpu
                );
            }
            Ok(profile)
        }
        None => Ok(family::FamilyProfile::builtin(cpu)?),
    }
}

fn load_supplementary(path: &str) -> Result<Vec<serde_json::Value>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read extra json {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parse extra json {}", path))
}

/// Keep supplementary descriptors whose name is new, compared
/// case-insensitively against resolved metrics and earlier entries.
fn dedup_supplementary(
    resolved: &[emit::ResolvedMetric],
    supplementary: Vec<serde_json::Value>,
) -> Vec<serde_json::Value> {
    let mut seen: HashSet<String> = resolved
        .iter()
        .map(|m| m.metric_name.to_lowercase())
        .collect();
    supplementary
        .into_iter()
        .filter(|v| match v.get("MetricName").and_then(|n| n.as_str()) {
            Some(name) => seen.insert(name.to_lowercase()),
            None => true,
        })
        .collect()
}

fn write_output(out: Option<&str>, json: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("write output {}", path))?;
            log::info!("Wrote {}", path);
        }
        None => print!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Commands::Extract {
            cpu,
            csv,
            memory,
            cstate,
            expr_events,
            extramodel,
            extrajson,
            unit,
            profile,
            out,
        } => {
            let profile = load_profile(&cpu, profile.as_deref())?;

            // 1) Load the sheet into a reference graph.
            let file = std::fs::File::open(&csv).with_context(|| format!("open sheet {}", csv))?;
            let rows = sheet::read_rows(file).with_context(|| format!("read sheet {}", csv))?;
            let graph = sheet::load_sheet(&rows, &profile)?;

            // 2) Resolve.
            let resolve_options = resolve::ResolveOptions {
                memory,
                model: extramodel,
                unit: family::ExecutionUnit::from_pmu(unit.as_deref()),
                ..resolve::ResolveOptions::default()
            };
            let emit_options = emit::EmitOptions {
                unit,
                min_events: expr_events,
                cstates: cstate,
            };
            let emitter = emit::Emitter::new(&graph, &profile, &resolve_options, &emit_options);

            // 3) Merge extras and render.
            let metrics = match extrajson {
                Some(path) => {
                    let resolved = emitter.resolve_all()?;
                    let supplementary = dedup_supplementary(&resolved, load_supplementary(&path)?);
                    emitter.assemble(resolved, supplementary)?
                }
                None => emitter.emit(Vec::new())?,
            };
            let json = render::render_metrics_json(&metrics)?;
            write_output(out.as_deref(), &json)?;
        }
        Commands::Cstates { cpu, profile } => {
            let profile = load_profile(&cpu, profile.as_deref())?;
            let metrics: Vec<emit::Descriptor> = emit::sleep_state_metrics(profile.sleep_states()?)
                .into_iter()
                .map(emit::Descriptor::Resolved)
                .collect();
            print!("{}", render::render_metrics_json(&metrics)?);
        }
    }

    Ok(())
}
