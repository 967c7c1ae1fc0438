use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use directories::ProjectDirs;
use microburst_id::args::{Cli, Commands};
use microburst_id::batch::{
    dedup_by_timestamp, detection_job, pass_job, run_batch, BatchOptions, BatchSummary, SkipReason,
};
use microburst_id::cache::UnitCache;
use microburst_id::catalog::{self, csv, NewRun, RunLedger};
use microburst_id::config::MicroburstConfig;
use microburst_id::merge::{annotate_passes, filter_by_quality};
use microburst_id::source::{SampexArchive, UnitSource};
use microburst_id::synthetic::HiltDay;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    let proj_dirs = ProjectDirs::from("com", "sampex", "microburst-id");

    let config = match load_config(&cli, proj_dirs.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            env_logger::init();
            log::error!("Error: {:#}", e);
            process::exit(1);
        }
    };
    let default_level = if config.log_enabled() { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run(cli, config, proj_dirs) {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli, proj_dirs: Option<&ProjectDirs>) -> Result<MicroburstConfig> {
    if let Some(path) = &cli.config {
        return MicroburstConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let default_path = proj_dirs.map(|d| d.config_dir().join("config.kdl"));
    match default_path {
        Some(path) if path.exists() => MicroburstConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        _ => Ok(MicroburstConfig::default()),
    }
}

fn run(cli: Cli, config: MicroburstConfig, proj_dirs: Option<ProjectDirs>) -> Result<()> {
    let proj_dirs = proj_dirs.context("Could not determine project directories")?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    let ledger = RunLedger::open(data_dir.join("runs.db")).context("Failed to open run ledger")?;

    let catalog_dir = cli
        .catalog_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("catalogs"));
    let archive_root = cli.data_dir.clone().or_else(|| config.data_dir());

    match cli.command {
        Commands::Detect {
            range,
            detection,
            output,
            no_cache,
        } => {
            let params = detection.apply(config.detection_params());
            let cache = if no_cache {
                None
            } else {
                Some(UnitCache::open(proj_dirs.cache_dir().join("units"))?)
            };
            let job = detection_job(params, cache)?;
            let options = batch_options(&config, range.start, range.end);
            let source = open_archive(archive_root)?;

            let report = run_batch(source, &options, job)?;
            let summary = report.summary();
            print_report(&summary, &report.skipped);
            let detections = dedup_by_timestamp(report.records());

            let path = output_path(output, &catalog_dir, catalog::DETECTION_STEM)?;
            csv::write_detections(create(&path)?, &detections)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} microbursts to {}", detections.len(), path.display());
            record(&ledger, "detect", &path, format!("{:?}", params), &summary, detections.len())?;
        }
        Commands::Passes { range, passes, output } => {
            let params = passes.apply(config.pass_params());
            let job = pass_job(params)?;
            let options = batch_options(&config, range.start, range.end);
            let source = open_archive(archive_root)?;

            let report = run_batch(source, &options, job)?;
            let summary = report.summary();
            print_report(&summary, &report.skipped);
            let passes = report.records();

            let path = output_path(output, &catalog_dir, catalog::PASS_STEM)?;
            csv::write_passes(create(&path)?, &passes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} passes to {}", passes.len(), path.display());
            record(&ledger, "passes", &path, format!("{:?}", params), &summary, passes.len())?;
        }
        Commands::Merge {
            passes,
            microbursts,
            output,
            max_flag,
        } => {
            let mut pass_list = csv::load_passes(&passes)?;
            if let Some(max_flag) = max_flag {
                pass_list = filter_by_quality(&pass_list, max_flag);
            }
            let times: Vec<_> = csv::load_detections(&microbursts)?
                .into_iter()
                .map(|(time, _)| time)
                .collect();
            let activity = annotate_passes(&pass_list, &times);

            let path = output.unwrap_or_else(|| merged_name(&passes));
            csv::write_annotated_passes(create(&path)?, &activity)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let total: usize = activity.iter().map(|a| a.microburst_count).sum();
            println!(
                "{} microbursts across {} passes written to {}",
                total,
                activity.len(),
                path.display()
            );
        }
        Commands::Simulate {
            date,
            out,
            spikes,
            seed,
        } => {
            let day = HiltDay { spikes, ..HiltDay::new(date) };
            let mut rng = StdRng::seed_from_u64(seed);
            let mut file = BufWriter::new(create(&out)?);
            let bursts = day
                .write(&mut file, &mut rng)
                .and_then(|bursts| file.flush().map(|_| bursts))
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {} rows with {} bursts to {}", day.rows, bursts.len(), out.display());
            for time in bursts {
                println!("  {}", time.format("%Y-%m-%dT%H:%M:%S%.3f"));
            }
        }
        Commands::Runs => {
            let runs = ledger.list_runs()?;
            if runs.is_empty() {
                println!("No runs recorded.");
            } else {
                for run in runs {
                    println!(
                        "#{} {} {} -> {} (v{}): {} processed, {} skipped, {} records [{}]",
                        run.id,
                        run.created,
                        run.kind,
                        run.catalog_name,
                        run.crate_version,
                        run.processed,
                        run.skipped,
                        run.records,
                        run.parameters
                    );
                }
            }
        }
    }
    Ok(())
}

fn batch_options(
    config: &MicroburstConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> BatchOptions {
    BatchOptions {
        threads: config.threads(),
        start,
        end,
        skip_years: config.skip_years(),
    }
}

fn open_archive(root: Option<PathBuf>) -> Result<Arc<dyn UnitSource>> {
    let root = root.context("No data directory given; pass --data-dir or set data-dir in the config")?;
    log::info!("Reading SAMPEX archive at {}", root.display());
    Ok(Arc::new(SampexArchive::new(root)))
}

fn output_path(output: Option<PathBuf>, catalog_dir: &Path, stem: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path);
    }
    std::fs::create_dir_all(catalog_dir)
        .with_context(|| format!("Failed to create {}", catalog_dir.display()))?;
    catalog::next_catalog_path(catalog_dir, stem)
}

fn merged_name(passes: &Path) -> PathBuf {
    let stem = passes.file_stem().and_then(|s| s.to_str()).unwrap_or("passes");
    passes.with_file_name(format!("{}_microbursts.csv", stem))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

fn print_report(summary: &BatchSummary, skipped: &[(NaiveDate, SkipReason)]) {
    println!(
        "Processed {} units ({} quiet), skipped {}, {} records",
        summary.processed, summary.quiet, summary.skipped, summary.records
    );
    for (date, reason) in skipped {
        println!("  skipped {}: {}", date, reason);
    }
}

fn record(
    ledger: &RunLedger,
    kind: &str,
    catalog: &Path,
    parameters: String,
    summary: &BatchSummary,
    records: usize,
) -> Result<()> {
    let name = catalog.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let run = NewRun {
        kind,
        catalog_name: name,
        parameters,
        processed: summary.processed,
        skipped: summary.skipped,
        records,
    };
    ledger
        .record_run(Local::now().naive_local(), &run)
        .context("Failed to record run")?;
    Ok(())
}
