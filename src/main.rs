use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use docfold::archive::ClusterOutcome;
use docfold::config::{EngineConfig, StrategyKind, DEFAULT_CONFIG_FILE};
use docfold::document::SizeClass;
use docfold::extract::Extractor;
use docfold::loader::{classify, Candidate};
use docfold::logging::init_tracing;
use docfold::{score, Consolidator, StreamingProbe};

/// docfold - Merge overlapping documents into canonical files
#[derive(Parser)]
#[command(name = "docfold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Clone)]
struct ScanArgs {
    /// Document roots
    roots: Vec<PathBuf>,

    /// Overlap threshold (0.0 to 1.0)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Cluster every pair regardless of threshold
    #[arg(long)]
    force: bool,

    /// File extensions to scan (comma-separated)
    #[arg(long)]
    types: Option<String>,

    /// Patterns to exclude (can be repeated)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Clustering strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum StrategyArg {
    Greedy,
    Transitive,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge overlapping documents and archive the originals
    Run {
        #[command(flatten)]
        scan: ScanArgs,

        /// Archive directory for superseded files
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Plan only; write nothing
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the clusters a run would merge
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the overlap score between two files
    Pair {
        /// First file
        file1: PathBuf,

        /// Second file
        file2: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref(), cli.verbose).and_then(|config| {
        init_tracing(config.verbose);
        match cli.command {
            Commands::Run { scan, archive, dry_run, json } => {
                cmd_run(config, &scan, archive, dry_run, json, cli.quiet)
            }
            Commands::Scan { scan, json } => cmd_scan(config, &scan, json),
            Commands::Pair { file1, file2 } => cmd_pair(&config, &file1, &file2),
        }
    });

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&Path>,
    verbose: bool,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(p) => EngineConfig::load(p, true)?,
        None => EngineConfig::load(Path::new(DEFAULT_CONFIG_FILE), false)?,
    };
    config.verbose |= verbose;
    Ok(config)
}

fn apply_scan_args(config: &mut EngineConfig, args: &ScanArgs) {
    if !args.roots.is_empty() {
        config.roots = args.roots.clone();
    }
    if let Some(t) = args.threshold {
        config.threshold = t;
    }
    config.force |= args.force;
    if let Some(types) = &args.types {
        config.set_extensions(types);
    }
    config.exclude.extend(args.exclude.iter().cloned());
    if let Some(strategy) = args.strategy {
        config.strategy = match strategy {
            StrategyArg::Greedy => StrategyKind::Greedy,
            StrategyArg::Transitive => StrategyKind::Transitive,
        };
    }
}

fn cmd_run(
    mut config: EngineConfig,
    args: &ScanArgs,
    archive: Option<PathBuf>,
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    apply_scan_args(&mut config, args);
    if archive.is_some() {
        config.archive_dir = archive;
    }

    let engine = Consolidator::new(config)?;
    let (report, plan) = engine.run(Utc::now(), dry_run)?;

    if json {
        let planned: Vec<_> = plan
            .clusters
            .iter()
            .map(|p| {
                serde_json::json!({
                    "canonical": p.canonical_path,
                    "base": p.base,
                    "related": p.related,
                    "reasons": p.reasons,
                    "conflicts": p.conflicts,
                    "degraded": p.degraded,
                })
            })
            .collect();
        let output = serde_json::json!({ "report": report, "plan": planned });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    if plan.is_empty() {
        println!("{}", "Nothing to consolidate.".green());
        return Ok(());
    }

    for p in &plan.clusters {
        let degraded = if p.degraded { " [large-file]".yellow().to_string() } else { String::new() };
        println!("{}{}", p.canonical_name.cyan().bold(), degraded);
        println!("  {} {}", "base".dimmed(), p.base.display());
        for r in &p.related {
            println!("  {} {}", "+".dimmed(), r.display());
        }
        for c in &p.conflicts {
            println!(
                "  {} {}: {} ({})",
                "!".yellow(),
                c.heading,
                c.sources.join(", "),
                c.resolution
            );
        }
        println!();
    }

    if dry_run {
        println!(
            "{} {} clusters planned (dry run, nothing written)",
            "Plan".green().bold(),
            report.planned.to_string().cyan()
        );
    } else {
        println!("{}", "Run Summary".green().bold());
        println!("  Documents scanned:  {}", report.discovered.to_string().cyan());
        println!("  Extraction errors:  {}", report.extraction_errors.to_string().cyan());
        println!("  Clusters written:   {}", report.written().to_string().cyan());
        println!("  Clusters failed:    {}", report.failed().to_string().red());
        for outcome in &report.clusters {
            if let ClusterOutcome::Failed { canonical, reason } = outcome {
                println!("  {} {}: {}", "x".red(), canonical.display(), reason);
            }
        }
    }
    println!("  Time elapsed:       {:.2?}", start.elapsed());

    Ok(())
}

fn cmd_scan(
    mut config: EngineConfig,
    args: &ScanArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    apply_scan_args(&mut config, args);
    let engine = Consolidator::new(config)?;
    let docs = engine.load()?;
    let clusters = engine.cluster(&docs);

    if json {
        let output: Vec<_> = clusters
            .iter()
            .map(|c| {
                serde_json::json!({
                    "base": c.base.path,
                    "related": c.related.iter().map(|d| &d.path).collect::<Vec<_>>(),
                    "reasons": c.reasons,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let errors: Vec<_> = docs.iter().filter(|d| d.extraction_error.is_some()).collect();
    for d in &errors {
        eprintln!(
            "{} {}: {}",
            "skip".yellow(),
            d.path.display(),
            d.extraction_error.as_deref().unwrap_or_default()
        );
    }

    if clusters.is_empty() {
        println!("{}", "No overlapping documents found.".green());
        return Ok(());
    }

    println!(
        "{} clusters across {} documents\n",
        clusters.len().to_string().yellow().bold(),
        docs.len()
    );

    let mut clustered: HashSet<&Path> = HashSet::new();
    for c in &clusters {
        println!("{}", c.base.path.display().to_string().cyan());
        clustered.insert(c.base.path.as_path());
        for (doc, reason) in c.related.iter().zip(&c.reasons) {
            clustered.insert(doc.path.as_path());
            println!("  {} {}", "~".dimmed(), doc.path.display());
            println!("    {}", reason.dimmed());
        }
        println!();
    }

    let standalone = docs.iter().filter(|d| !clustered.contains(d.path.as_path())).count();
    println!("{} documents left standalone", standalone.to_string().cyan());

    Ok(())
}

fn cmd_pair(
    config: &EngineConfig,
    file1: &Path,
    file2: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = Extractor::new(config, &StreamingProbe);
    let to_candidate = |path: &Path| -> Result<Candidate, Box<dyn std::error::Error>> {
        let bytes = std::fs::metadata(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?
            .len();
        Ok(Candidate {
            path: path.to_path_buf(),
            bytes,
            size_class: classify(bytes, config.oversized_bytes),
        })
    };

    let a = extractor.extract(&to_candidate(file1)?);
    let b = extractor.extract(&to_candidate(file2)?);
    let pair = score(&a, &b);

    let describe = |d: &docfold::Document| {
        let size = match d.size_class {
            SizeClass::Normal => "normal",
            SizeClass::Oversized => "oversized",
        };
        println!("{} ({})", d.path.display().to_string().cyan(), size);
        if let Some(err) = &d.extraction_error {
            println!("  {} {}", "error".red(), err);
        }
        let tags: Vec<&str> = d.tags.iter().map(String::as_str).collect();
        println!("  tags:     {}", tags.join(", "));
        println!("  keywords: {}", d.keywords.join(", "));
    };

    describe(&a);
    describe(&b);
    println!();

    let pct = (pair.overlap * 100.0) as u32;
    let verdict = if pair.overlap >= config.threshold {
        format!("{}%", pct).green().bold()
    } else {
        format!("{}%", pct).yellow()
    };
    println!("Overlap: {} (threshold {}%)", verdict, (config.threshold * 100.0) as u32);
    println!("  {}", pair.reason);

    Ok(())
}
