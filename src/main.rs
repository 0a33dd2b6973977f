//! `TekDT AIS` command-line entry point
//!
//! Startup order: paths and logging, argument parsing, single instance,
//! configuration healing, tool provisioning, self-update check, catalog
//! fetch, then the requested command.

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use tekdt_ais::{
    catalog::{CatalogClient, CatalogOrigin, effective_catalog, status::filter_compatible},
    cli::{self, CliCommand, CliReport},
    config::{AppContext, AppPaths, ConfigStore},
    error::get_user_friendly_error,
    tools::{ProvisionOutcome, ToolProvisioner},
    utils::{self, UpdateChecker},
    worker::{BatchSummary, Task, TaskStatus, TaskWorker, WorkerBackends, WorkerEvent, icon},
};
use tracing::{error, info, warn};

fn main() -> Result<ExitCode> {
    let paths = AppPaths::discover();
    paths
        .ensure_dirs()
        .context("Failed to create application directories")?;
    utils::init_logging(&paths.logs_dir).context("Failed to initialize logging system")?;

    let args = match cli::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("Invalid command line: {}", e);
            eprintln!("{}", get_user_friendly_error(&e));
            return Ok(ExitCode::from(2));
        }
    };
    if let Some((width, height)) = args.embed {
        warn!(
            "Embedded window mode ({}x{}) requested but no window is available",
            width, height
        );
    }
    if args.command == CliCommand::Help {
        println!("{}", cli::HELP_TEXT);
        return Ok(ExitCode::SUCCESS);
    }

    let _single_instance_guard = match utils::SingleInstanceGuard::acquire() {
        Ok(guard) => guard,
        Err(e) => {
            error!("Single instance check failed: {}", e);
            show_error_and_exit(
                "Another instance of TekDT AIS is already running.\n\n\
                 Please wait for it to finish before starting a new one.",
            );
        }
    };

    let ctx = AppContext::new(paths);
    let store = Arc::new(ConfigStore::for_paths(&ctx.paths));
    prepare_local_state(&ctx, &store);

    match &args.command {
        CliCommand::SetAutoInstall { app_key, enabled } => {
            store
                .set_auto_install(app_key, *enabled)
                .with_context(|| format!("Failed to update auto_install for {app_key}"))?;
            println!("auto_install for {app_key} set to {enabled}");
            return Ok(ExitCode::SUCCESS);
        }
        CliCommand::Run(app_key) => {
            cli::run_portable(&ctx.paths, &store.load(), app_key)
                .with_context(|| format!("Failed to start {app_key}"))?;
            return Ok(ExitCode::SUCCESS);
        }
        CliCommand::List
        | CliCommand::Install(_)
        | CliCommand::Update(_)
        | CliCommand::Download(_)
        | CliCommand::Help => {}
    }

    let outcome = ToolProvisioner::new(&ctx.paths, &ctx.endpoints).ensure_tools_current();
    if !outcome.is_ok() {
        show_error_and_exit(outcome.message());
    }
    if outcome != ProvisionOutcome::Current {
        eprintln!("{}", outcome.message());
    }

    if let Some(update) = UpdateChecker::for_application(&ctx.endpoints).check_if_due(&store)
        && update.update_available
    {
        println!(
            "A new version of TekDT AIS is available: {} (current {})\n{}",
            update.latest_version, update.current_version, update.release_url
        );
    }

    let local = store.load();
    let remote = CatalogClient::new(ctx.endpoints.catalog_url.clone()).fetch();
    let (catalog, origin) = effective_catalog(remote, &local);
    if origin == CatalogOrigin::Local {
        eprintln!("Remote catalog unavailable, showing locally known apps only");
    }
    let catalog = filter_compatible(catalog, utils::native_arch());

    if args.command == CliCommand::List {
        print!("{}", cli::format_catalog(&catalog, &local, &ctx.paths));
        return Ok(ExitCode::SUCCESS);
    }

    let plan = cli::plan_tasks(&args.command, &catalog, &local);
    let summary = if plan.tasks.is_empty() {
        info!("Nothing to do");
        BatchSummary::default()
    } else {
        run_batch(&ctx, &store, plan.tasks.clone(), local.max_parallel_downloads())?
    };

    let report = CliReport::new(&plan, &summary);
    let text = cli::format_summary(&plan, &summary);
    println!("{text}");
    show_summary(&text, report.failed > 0);

    Ok(ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)))
}

/// Default icon and configuration healing; failures only degrade the display
fn prepare_local_state(ctx: &AppContext, store: &ConfigStore) {
    if let Err(e) = icon::ensure_default_icon(&ctx.paths) {
        warn!("Failed to create default icon: {}", e);
    }
    if let Err(e) = store.heal(&ctx.paths) {
        warn!("Failed to heal configuration: {}", e);
    }
}

/// Run tasks on the worker and print progress until it finishes
fn run_batch(
    ctx: &AppContext,
    store: &Arc<ConfigStore>,
    tasks: Vec<Task>,
    max_parallel: Option<usize>,
) -> Result<BatchSummary> {
    let mut options = ctx.worker;
    if let Some(max) = max_parallel {
        options.max_parallel_downloads = max;
    }

    let worker = TaskWorker::new(
        ctx.paths.clone(),
        Arc::clone(store),
        WorkerBackends::system(&ctx.paths, &options),
        options,
    );

    let (tx, rx) = mpsc::channel();
    let handle = worker
        .spawn(tasks, tx)
        .context("Failed to start task worker")?;

    for event in rx {
        match event {
            WorkerEvent::Progress {
                app_key,
                status,
                message,
            } => {
                if status == TaskStatus::Failed {
                    eprintln!("{app_key}: {message}");
                } else {
                    println!("{app_key}: {message}");
                }
            }
            WorkerEvent::Percent { app_key, percent } => {
                if percent % 25 == 0 {
                    println!("{app_key}: {percent}%");
                }
            }
            WorkerEvent::WorkerError(message) => eprintln!("Error: {message}"),
            WorkerEvent::Finished(_) => break,
        }
    }

    handle.join().context("Task worker terminated abnormally")
}

/// Shows the batch summary in a dialog box.
#[cfg(windows)]
fn show_summary(text: &str, failed: bool) {
    use rfd::{MessageButtons, MessageDialog, MessageLevel};

    MessageDialog::new()
        .set_title("TekDT AIS")
        .set_description(text)
        .set_buttons(MessageButtons::Ok)
        .set_level(if failed {
            MessageLevel::Warning
        } else {
            MessageLevel::Info
        })
        .show();
}

#[cfg(not(windows))]
fn show_summary(_text: &str, _failed: bool) {}

/// Shows an error dialog and exits the application.
#[cfg(windows)]
fn show_error_and_exit(message: &str) -> ! {
    use rfd::MessageDialog;

    MessageDialog::new()
        .set_title("TekDT AIS - Error")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .set_level(rfd::MessageLevel::Error)
        .show();

    std::process::exit(1);
}

/// Shows an error dialog and exits the application (non-Windows fallback).
#[cfg(not(windows))]
fn show_error_and_exit(message: &str) -> ! {
    eprintln!("ERROR: {message}");
    std::process::exit(1);
}
