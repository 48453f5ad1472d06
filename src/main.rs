mod cli;
mod config;
mod error;
mod launcher;
mod output;
mod partition;
mod scheduler;
mod state_machine;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use cli::{Cli, Command};
use config::{JobFileConfig, PeriodConfig, resolve_paths};
use launcher::{LaunchOptions, Launcher, SubmissionReport, SubmitMode};
use scheduler::{LocalOutcome, LocalScheduler, SlurmScheduler};
use ui::{LaunchProgress, StatusView};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Launch {
            config_file,
            period_file,
            list_file,
            failed_only,
            remove_source,
            start_year,
            end_year,
            rm_input,
            account,
            run_local,
            dry_run,
        } => {
            let options = LaunchOptions {
                mode: if failed_only { SubmitMode::FailedOnly } else { SubmitMode::All },
                remove_source,
                start_year,
                end_year,
                rm_input,
                config_file: Some(config_file.clone()),
                verbose: cli.verbose,
            };
            launch(
                &config_file,
                &period_file,
                &list_file,
                options,
                account,
                run_local,
                dry_run,
            )
        }
        Command::Output { descriptor, exit_status, rm_input, config_file } => {
            let data_dir = output_data_dir(config_file.as_deref())?;
            let handled = output::handle_output(&descriptor, exit_status, rm_input, &data_dir)
                .with_context(|| format!("handling output of {}", descriptor.display()))?;
            println!(
                "{} [{}] -> {}",
                handled.canonical,
                handled.state,
                handled.log_file.display()
            );
            Ok(())
        }
        Command::Status { config_file, list_file } => status(&config_file, &list_file),
    }
}

#[allow(clippy::too_many_arguments)]
fn launch(
    config_file: &Path,
    period_file: &Path,
    list_file: &Path,
    options: LaunchOptions,
    account: Option<String>,
    run_local: bool,
    dry_run: bool,
) -> Result<()> {
    let config = JobFileConfig::load(config_file)
        .with_context(|| format!("loading config {}", config_file.display()))?;
    let periods = PeriodConfig::load(period_file)
        .with_context(|| format!("loading periods {}", period_file.display()))?;
    let entries = partition::load_list(list_file)
        .with_context(|| format!("loading partition list {}", list_file.display()))?;
    let paths = resolve_paths(&config.paths)?;

    let progress = LaunchProgress::start(&format!(
        "{} {} {} -> {}",
        config.release,
        config.dataset,
        config.job_config.source_level,
        config.job_config.data_level
    ));

    let launcher = Launcher::new(&config, &periods, &paths, options);
    let mut local_failures = 0;
    let outcome: Result<SubmissionReport> = if dry_run || run_local {
        let mut sched = LocalScheduler::new();
        match launcher.run(&mut sched, &entries) {
            Ok(report) => {
                if dry_run {
                    progress.println(format!(
                        "  dry-run: {} job(s) queued, nothing executed",
                        sched.pending()
                    ));
                } else {
                    sched.run_all()?;
                    report_local_outcomes(&progress, &sched);
                    local_failures = sched.failure_count();
                }
                Ok(report)
            }
            Err(e) => Err(e.into()),
        }
    } else {
        launcher
            .run(&mut SlurmScheduler::new(account), &entries)
            .map_err(Into::into)
    };

    match outcome {
        Ok(report) => {
            for p in &report.partitions {
                progress.partition_done(p);
            }
            progress.finish(&report);
            // In --run-local mode this process IS the executor, so a
            // failed handler or cleanup must not exit 0.
            if local_failures > 0 {
                return Err(anyhow!("{local_failures} local job(s) failed"));
            }
            Ok(())
        }
        Err(e) => {
            progress.fail(&format!("{e:#}"));
            Err(e)
        }
    }
}

/// Uma linha por job executado localmente — principais, handlers e
/// limpeza — com seu resultado.
fn report_local_outcomes(progress: &LaunchProgress, sched: &LocalScheduler) {
    for (name, outcome) in sched.completed() {
        let label = match outcome {
            LocalOutcome::Succeeded => "succeeded",
            LocalOutcome::Failed => "failed",
            LocalOutcome::Skipped => "skipped",
        };
        progress.println(format!("  {name}: {label}"));
    }
}

/// Resolve o data_dir para o subcomando `output`: arquivo de configuração
/// se fornecido, senão a variável de ambiente.
fn output_data_dir(config_file: Option<&Path>) -> Result<PathBuf> {
    match config_file {
        Some(path) => {
            let config = JobFileConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            Ok(resolve_paths(&config.paths)?.data_dir)
        }
        None => std::env::var("MARLIN_DATA_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("set MARLIN_DATA_DIR or pass --config-file")),
    }
}

fn status(config_file: &Path, list_file: &Path) -> Result<()> {
    let config = JobFileConfig::load(config_file)
        .with_context(|| format!("loading config {}", config_file.display()))?;
    let entries = partition::load_list(list_file)?;
    let paths = resolve_paths(&config.paths)?;

    let level = &config.job_config.data_level;
    let log_dir = paths
        .data_dir
        .join(&config.release)
        .join(&config.dataset)
        .join(level)
        .join("log");

    println!("{} {} / {level}", config.release, config.update);
    let view = StatusView::new();
    for entry in &entries {
        let store = state_machine::SentinelStore::open(&log_dir.join(&entry.sid_dck), level)?;
        view.partition(&entry.sid_dck, &store.summary()?);
    }
    Ok(())
}
