use crossterm::style::Stylize;
use lattice_core::core::graph::SlipPair;
use lattice_core::evaluation::AdmissibilityReport;
use lattice_core::persistence::{load_corpus, save_context, save_corpus, save_json, save_lattice};
use lattice_core::{EngineConfig, LatticeEngine, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUT_DIR: &str = "lattice_out";

struct Args {
    corpus: PathBuf,
    config: Option<PathBuf>,
    slips: Option<PathBuf>,
    out_dir: PathBuf,
}

fn usage() -> String {
    "usage: lattice_engine <corpus.txt> [--config cfg.json] [--slips slips.json] [--out dir]".into()
}

fn parse_args() -> std::result::Result<Args, String> {
    let mut raw = std::env::args().skip(1);
    let mut corpus = None;
    let mut config = None;
    let mut slips = None;
    let mut out_dir = PathBuf::from(DEFAULT_OUT_DIR);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => config = Some(raw.next().ok_or_else(usage)?.into()),
            "--slips" => slips = Some(raw.next().ok_or_else(usage)?.into()),
            "--out" => out_dir = raw.next().ok_or_else(usage)?.into(),
            "-h" | "--help" => return Err(usage()),
            other if corpus.is_none() => corpus = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument `{other}`\n{}", usage())),
        }
    }
    Ok(Args { corpus: corpus.ok_or_else(usage)?, config, slips, out_dir })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "lattice run failed");
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let slips: Vec<SlipPair> = match &args.slips {
        Some(path) => lattice_core::persistence::load_json(path)?,
        None => Vec::new(),
    };
    let lines = load_corpus(&args.corpus)?;
    let engine = LatticeEngine::new(config)?;

    let (build, context) = engine.fit(&lines, &slips)?;
    let mirror = engine.emulate(&context, &lines)?;
    let real = engine.evaluate(&context, &lines, None);
    let synthetic = engine.evaluate(&context, &mirror.lines, Some(lines.as_slice()));

    println!("{}", "Lattice Mechanism Engine".bold());
    println!("---------------------------------------------------------------");
    println!(
        "Corpus: {} lines, {} tokens, {} distinct",
        lines.len(),
        build.graph.tokens_seen,
        build.graph.vocabulary
    );
    println!(
        "Lattice: {} tokens in {} windows (requested {})",
        build.lattice.len(),
        build.lattice.num_windows(),
        build.requested_windows
    );
    for degradation in &build.degradations {
        println!("  {} {:?}", "degraded:".yellow(), degradation);
    }
    if let Some(reorder) = &build.reorder {
        println!("Reorder cost: {} -> {}", reorder.cost_before, reorder.cost_after);
    }
    print_admissibility("Real corpus", &real.admissibility);
    print_admissibility("Mirror corpus", &synthetic.admissibility);
    if let Some(over) = &synthetic.overgeneration {
        println!("\nOvergeneration (mirror vs real):");
        for order in &over.orders {
            println!(
                "  n={}: {} distinct, {} unattested ({:.1}%)",
                order.n,
                order.synthetic_distinct,
                order.unattested,
                order.unattested_rate * 100.0
            );
        }
    }

    write_artifacts(&args.out_dir, &engine, &build.lattice, &context, &mirror, &real, &synthetic)?;
    println!("\nArtifacts written to '{}'", args.out_dir.display().to_string().green());
    Ok(())
}

fn print_admissibility(label: &str, report: &AdmissibilityReport) {
    println!("\n{}:", label.cyan());
    println!(
        "  strict {:.3} | drift {:.3} | consolidated {:.3}",
        report.strict_rate, report.drift_rate, report.consolidated_rate
    );
    println!(
        "  base {} | oov recovered {}/{} | unresolved {}",
        report.base_transitions, report.oov_recovered, report.oov_transitions, report.unresolved
    );
}

fn write_artifacts(
    out_dir: &Path,
    engine: &LatticeEngine,
    lattice: &lattice_core::Lattice,
    context: &lattice_core::LatticeContext,
    mirror: &lattice_core::emulator::EmulatorOutput,
    real: &lattice_core::core::engine::EvaluationReport,
    synthetic: &lattice_core::core::engine::EvaluationReport,
) -> Result<()> {
    save_json(engine.config(), &out_dir.join("config.json"))?;
    save_lattice(lattice, &out_dir.join("lattice.json"))?;
    save_context(context, &out_dir.join("context.json"))?;
    if let Some(corrections) = &context.corrections {
        save_json(&corrections.to_artifact(), &out_dir.join("corrections.json"))?;
    }
    if let Some(suffix_map) = &context.suffix_map {
        save_json(&suffix_map.to_map(), &out_dir.join("suffix_map.json"))?;
    }
    save_corpus(&mirror.lines, &out_dir.join("mirror.txt"))?;
    if let Some(trace) = &mirror.trace {
        save_json(trace, &out_dir.join("trace.json"))?;
    }
    save_json(real, &out_dir.join("evaluation_real.json"))?;
    save_json(synthetic, &out_dir.join("evaluation_mirror.json"))
}
