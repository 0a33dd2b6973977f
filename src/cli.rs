//! Command-line interface
//!
//! Windows-style slash commands:
//!
//! ```text
//! tekdt-ais                               list the catalog with status
//! tekdt-ais /install [app1|app2]          install apps (default: auto_install apps)
//! tekdt-ais /update [app1|app2]           update apps (default: every outdated app)
//! tekdt-ais /download app1|app2           download without installing
//! tekdt-ais /auto_install:true|false app  toggle auto_install for an app
//! tekdt-ais /run app                      start a portable app
//! tekdt-ais /help                         show usage
//! ```
//!
//! `--embed=<W>x<H>` may accompany any command.

use crate::catalog::status::{app_status, search};
use crate::catalog::{Catalog, needs_update};
use crate::config::paths::{is_contained_relative, is_single_component};
use crate::config::{AppConfig, AppPaths, AppType};
use crate::error::{AisError, Result};
use crate::worker::process::launch_portable;
use crate::worker::{BatchSummary, Task, TaskAction, TaskStatus};
use std::fmt::{self, Write as _};
use tracing::info;

/// Usage text printed by `/help`
pub const HELP_TEXT: &str = "\
TekDT AIS command line

  /install [app1|app2|...]      Install apps. Without a list, installs every app marked auto_install.
  /update [app1|app2|...]       Update apps. Without a list, updates every app with a newer version.
  /download app1|app2|...       Download apps without installing them.
  /auto_install:true <app>      Enable auto_install for an app.
  /auto_install:false <app>     Disable auto_install for an app.
  /run <app>                    Start a downloaded portable app.
  /help                         Show this help.
  --embed=<W>x<H>               Embedded window size for host integration.

Without arguments the catalog is listed with the status of each app.";

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Print the catalog
    List,
    /// Install the listed apps, or the auto_install apps when empty
    Install(Vec<String>),
    /// Update the listed apps, or every outdated app when empty
    Update(Vec<String>),
    /// Download the listed apps
    Download(Vec<String>),
    /// Toggle `auto_install`
    SetAutoInstall {
        /// App key
        app_key: String,
        /// New value
        enabled: bool,
    },
    /// Start a portable app
    Run(String),
    /// Print usage
    Help,
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Command to execute
    pub command: CliCommand,
    /// Requested embedded window size
    pub embed: Option<(u32, u32)>,
}

/// Parse the arguments following the program name
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into).peekable();
    let mut command = None;
    let mut embed = None;

    while let Some(arg) = args.next() {
        let lower = arg.to_ascii_lowercase();

        if let Some(size) = lower.strip_prefix("--embed=") {
            embed = Some(parse_embed(size)?);
            continue;
        }

        let parsed = match lower.as_str() {
            "/help" | "/?" | "-h" | "--help" => CliCommand::Help,
            "/install" => CliCommand::Install(take_list(&mut args)),
            "/update" => CliCommand::Update(take_list(&mut args)),
            "/download" => {
                let list = take_list(&mut args);
                if list.is_empty() {
                    return Err(AisError::InvalidArgument(
                        "/download requires a list of apps".to_string(),
                    ));
                }
                CliCommand::Download(list)
            }
            "/run" => {
                let app_key = take_value(&mut args)
                    .ok_or_else(|| AisError::InvalidArgument("/run requires an app".to_string()))?;
                CliCommand::Run(app_key)
            }
            _ => {
                let Some(value) = lower
                    .strip_prefix("/auto_install:")
                    .or_else(|| lower.strip_prefix("/autoinstall:"))
                else {
                    return Err(AisError::InvalidArgument(arg));
                };
                let enabled = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(AisError::InvalidArgument(arg)),
                };
                let app_key = take_value(&mut args).ok_or_else(|| {
                    AisError::InvalidArgument(format!("{arg} requires an app"))
                })?;
                CliCommand::SetAutoInstall { app_key, enabled }
            }
        };

        if command.is_some() {
            return Err(AisError::InvalidArgument(format!(
                "{arg}: only one command may be given"
            )));
        }
        command = Some(parsed);
    }

    Ok(CliArgs {
        command: command.unwrap_or(CliCommand::List),
        embed,
    })
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with("--")
}

fn take_value<I: Iterator<Item = String>>(args: &mut std::iter::Peekable<I>) -> Option<String> {
    args.next_if(|next| !is_flag(next))
}

fn take_list<I: Iterator<Item = String>>(args: &mut std::iter::Peekable<I>) -> Vec<String> {
    take_value(args)
        .map(|list| {
            list.split('|')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_embed(size: &str) -> Result<(u32, u32)> {
    let invalid = || AisError::InvalidArgument(format!("--embed={size}"));
    let (w, h) = size.split_once('x').ok_or_else(invalid)?;
    let width = w.trim().parse().map_err(|_| invalid())?;
    let height = h.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

/// Tasks to run plus apps left out and why
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Tasks for the worker
    pub tasks: Vec<Task>,
    /// `(app_key, reason)` for every requested app that gets no task
    pub skipped: Vec<(String, String)>,
}

/// Turn a batch command into worker tasks
///
/// Non-batch commands yield an empty plan.
pub fn plan_tasks(command: &CliCommand, catalog: &Catalog, local: &AppConfig) -> Plan {
    let mut plan = Plan::default();

    match command {
        CliCommand::Install(keys) => {
            let keys: Vec<String> = if keys.is_empty() {
                local
                    .app_items
                    .iter()
                    .filter(|(_, record)| record.is_auto_install())
                    .map(|(key, _)| key.clone())
                    .collect()
            } else {
                keys.clone()
            };
            for key in keys {
                match catalog.get(&key) {
                    Some(record) => plan
                        .tasks
                        .push(Task::new(key, record.clone(), TaskAction::Install)),
                    None => plan.skipped.push((key, "not in catalog".to_string())),
                }
            }
        }
        CliCommand::Update(keys) => {
            let keys: Vec<String> = if keys.is_empty() {
                local.app_items.keys().cloned().collect()
            } else {
                keys.clone()
            };
            for key in keys {
                let Some(remote) = catalog.get(&key) else {
                    plan.skipped.push((key, "not in catalog".to_string()));
                    continue;
                };
                let Some(installed) = local.app_items.get(&key) else {
                    plan.skipped.push((key, "not installed".to_string()));
                    continue;
                };
                if needs_update(installed, remote) {
                    plan.tasks
                        .push(Task::new(key, remote.clone(), TaskAction::Update));
                } else {
                    plan.skipped.push((key, "already up to date".to_string()));
                }
            }
        }
        CliCommand::Download(keys) => {
            for key in keys {
                match catalog.get(key) {
                    Some(record) => plan.tasks.push(Task::new(
                        key.clone(),
                        record.clone(),
                        TaskAction::Download,
                    )),
                    None => plan.skipped.push((key.clone(), "not in catalog".to_string())),
                }
            }
        }
        CliCommand::List
        | CliCommand::SetAutoInstall { .. }
        | CliCommand::Run(_)
        | CliCommand::Help => {}
    }

    info!(
        "Planned {} tasks, {} skipped",
        plan.tasks.len(),
        plan.skipped.len()
    );
    plan
}

/// Counts shown at the end of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CliReport {
    /// Successful installs
    pub installed: usize,
    /// Successful updates
    pub updated: usize,
    /// Successful downloads
    pub downloaded: usize,
    /// Requested apps that got no task
    pub skipped: usize,
    /// Failed tasks
    pub failed: usize,
    /// Stopped tasks
    pub stopped: usize,
}

impl CliReport {
    /// Aggregate a plan and its batch summary
    pub fn new(plan: &Plan, summary: &BatchSummary) -> Self {
        let mut report = Self {
            skipped: plan.skipped.len(),
            ..Self::default()
        };
        for outcome in &summary.outcomes {
            match (outcome.status, outcome.action) {
                (TaskStatus::Success, TaskAction::Install) => report.installed += 1,
                (TaskStatus::Success, TaskAction::Update) => report.updated += 1,
                (TaskStatus::Success, TaskAction::Download) => report.downloaded += 1,
                (TaskStatus::Failed, _) => report.failed += 1,
                (TaskStatus::Stopped, _) => report.stopped += 1,
                (TaskStatus::Downloading | TaskStatus::Installing, _) => {}
            }
        }
        report
    }

    /// Process exit code: 1 if anything failed
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed > 0)
    }
}

impl fmt::Display for CliReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Installed: {}, Updated: {}, Downloaded: {}, Skipped: {}, Failed: {}",
            self.installed, self.updated, self.downloaded, self.skipped, self.failed
        )?;
        if self.stopped > 0 {
            write!(f, ", Stopped: {}", self.stopped)?;
        }
        Ok(())
    }
}

/// Multi-line summary with one line per failed or skipped app
pub fn format_summary(plan: &Plan, summary: &BatchSummary) -> String {
    let mut out = CliReport::new(plan, summary).to_string();
    for outcome in &summary.outcomes {
        if outcome.status != TaskStatus::Success {
            let _ = write!(
                out,
                "\n  {} ({}): {}",
                outcome.app_key, outcome.status, outcome.message
            );
        }
    }
    for (key, reason) in &plan.skipped {
        let _ = write!(out, "\n  {key} (skipped): {reason}");
    }
    out
}

/// Catalog listing grouped by category
pub fn format_catalog(catalog: &Catalog, local: &AppConfig, paths: &AppPaths) -> String {
    let mut out = String::new();
    for group in search(catalog, "") {
        let _ = writeln!(out, "[{}]", group.category);
        for (key, record) in &group.apps {
            let status = app_status(paths, local, key, record);
            let _ = writeln!(
                out,
                "  {:<24} {:<14} {}",
                key,
                record.version_or_default(),
                status.label()
            );
        }
    }
    if out.is_empty() {
        out.push_str("No applications available\n");
    }
    out
}

/// Start the portable app `app_key`
pub fn run_portable(paths: &AppPaths, local: &AppConfig, app_key: &str) -> Result<()> {
    let record = local
        .app_items
        .get(app_key)
        .ok_or_else(|| AisError::UnknownApp(app_key.to_string()))?;

    if record.kind() != AppType::Portable {
        return Err(AisError::InvalidArgument(format!(
            "{app_key} is not a portable app"
        )));
    }
    let executable = record.executable.as_deref().ok_or_else(|| {
        AisError::InvalidArgument(format!("{app_key} has no executable configured"))
    })?;
    if !is_single_component(app_key) || !is_contained_relative(executable) {
        return Err(AisError::InvalidArgument(format!(
            "{app_key} executable {executable:?} is outside its app directory"
        )));
    }

    let path = paths.app_dir(app_key).join(executable);
    if !path.is_file() {
        return Err(AisError::InvalidArgument(format!(
            "{} not found, download {app_key} first",
            path.display()
        )));
    }
    launch_portable(&path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppRecord;
    use crate::test_utils::TestLayout;
    use crate::worker::TaskOutcome;

    fn record(version: &str) -> AppRecord {
        AppRecord {
            version: Some(version.to_string()),
            download_url: Some("https://example/app.exe".to_string()),
            ..AppRecord::default()
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_args(Vec::<String>::new()).unwrap().command, CliCommand::List);
        assert_eq!(parse_args(["/help"]).unwrap().command, CliCommand::Help);
        assert_eq!(
            parse_args(["/install"]).unwrap().command,
            CliCommand::Install(vec![])
        );
        assert_eq!(
            parse_args(["/INSTALL", "vlc|7zip"]).unwrap().command,
            CliCommand::Install(vec!["vlc".to_string(), "7zip".to_string()])
        );
        assert_eq!(
            parse_args(["/update", "--embed=800x600"]).unwrap(),
            CliArgs {
                command: CliCommand::Update(vec![]),
                embed: Some((800, 600)),
            }
        );
        assert_eq!(
            parse_args(["/auto_install:false", "vlc"]).unwrap().command,
            CliCommand::SetAutoInstall {
                app_key: "vlc".to_string(),
                enabled: false,
            }
        );
        assert_eq!(
            parse_args(["/run", "notepad++"]).unwrap().command,
            CliCommand::Run("notepad++".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_args(["/bogus"]), Err(AisError::InvalidArgument(_))));
        assert!(parse_args(["/download"]).is_err());
        assert!(parse_args(["/run"]).is_err());
        assert!(parse_args(["/auto_install:maybe", "vlc"]).is_err());
        assert!(parse_args(["/auto_install:true"]).is_err());
        assert!(parse_args(["--embed=wide"]).is_err());
        assert!(parse_args(["--embed=0x600"]).is_err());
        assert!(parse_args(["/install", "/update"]).is_err());
    }

    #[test]
    fn test_update_skips_equal_versions() {
        let mut catalog = Catalog::new();
        catalog.insert("vlc".to_string(), record("3.0.18"));
        let mut local = AppConfig::default();
        local.app_items.insert("vlc".to_string(), record("3.0.18"));

        let plan = plan_tasks(
            &CliCommand::Update(vec!["vlc".to_string()]),
            &catalog,
            &local,
        );
        assert!(plan.tasks.is_empty());
        assert_eq!(plan.skipped[0].0, "vlc");

        let plan = plan_tasks(&CliCommand::Update(vec![]), &catalog, &local);
        assert!(plan.tasks.is_empty());
    }

    #[test]
    fn test_update_plans_outdated_apps() {
        let mut catalog = Catalog::new();
        catalog.insert("vlc".to_string(), record("3.0.20"));
        catalog.insert("7zip".to_string(), record("24.08"));
        let mut local = AppConfig::default();
        local.app_items.insert("vlc".to_string(), record("3.0.18"));

        let plan = plan_tasks(&CliCommand::Update(vec![]), &catalog, &local);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].app_key, "vlc");
        assert_eq!(plan.tasks[0].action, TaskAction::Update);
        assert_eq!(plan.tasks[0].info.version.as_deref(), Some("3.0.20"));

        let plan = plan_tasks(
            &CliCommand::Update(vec!["7zip".to_string()]),
            &catalog,
            &local,
        );
        assert_eq!(plan.skipped, vec![("7zip".to_string(), "not installed".to_string())]);
    }

    #[test]
    fn test_install_defaults_to_auto_install_apps() {
        let mut catalog = Catalog::new();
        catalog.insert("vlc".to_string(), record("3.0.18"));
        catalog.insert("7zip".to_string(), record("24.08"));
        let mut local = AppConfig::default();
        local.app_items.insert(
            "vlc".to_string(),
            AppRecord {
                auto_install: Some(true),
                ..record("3.0.18")
            },
        );
        local.app_items.insert("7zip".to_string(), record("24.08"));

        let plan = plan_tasks(&CliCommand::Install(vec![]), &catalog, &local);
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].app_key, "vlc");

        let plan = plan_tasks(
            &CliCommand::Install(vec!["7zip".to_string(), "ghost".to_string()]),
            &catalog,
            &local,
        );
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.skipped[0].0, "ghost");
    }

    #[test]
    fn test_report_and_exit_code() {
        let plan = Plan {
            tasks: vec![],
            skipped: vec![("x".to_string(), "not in catalog".to_string())],
        };
        let outcome = |key: &str, action, status| TaskOutcome {
            app_key: key.to_string(),
            action,
            status,
            message: "msg".to_string(),
        };
        let summary = BatchSummary {
            outcomes: vec![
                outcome("a", TaskAction::Install, TaskStatus::Success),
                outcome("b", TaskAction::Update, TaskStatus::Success),
                outcome("c", TaskAction::Install, TaskStatus::Failed),
            ],
        };

        let report = CliReport::new(&plan, &summary);
        assert_eq!(report.installed, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.exit_code(), 1);

        let text = format_summary(&plan, &summary);
        assert!(text.starts_with("Installed: 1, Updated: 1"));
        assert!(text.contains("c (failed): msg"));
        assert!(text.contains("x (skipped): not in catalog"));

        assert_eq!(CliReport::default().exit_code(), 0);
    }

    #[test]
    fn test_run_portable_rejects_installers() {
        let layout = TestLayout::new();
        let paths = &layout.paths;
        let mut local = AppConfig::default();
        local.app_items.insert(
            "vlc".to_string(),
            AppRecord {
                app_type: Some(AppType::Installer),
                ..record("1")
            },
        );

        assert!(matches!(
            run_portable(paths, &local, "vlc"),
            Err(AisError::InvalidArgument(_))
        ));
        assert!(matches!(
            run_portable(paths, &local, "ghost"),
            Err(AisError::UnknownApp(_))
        ));
    }

    #[test]
    fn test_run_portable_rejects_escaping_executable() {
        let layout = TestLayout::new();
        let paths = &layout.paths;
        std::fs::create_dir_all(paths.app_dir("tool")).unwrap();
        std::fs::write(paths.apps_dir.join("evil.exe"), b"MZ").unwrap();

        let mut local = AppConfig::default();
        for executable in ["../evil.exe", "bin\\..\\..\\evil.exe", "C:\\evil.exe"] {
            local.app_items.insert(
                "tool".to_string(),
                AppRecord {
                    app_type: Some(AppType::Portable),
                    executable: Some(executable.to_string()),
                    ..record("1")
                },
            );
            assert!(
                matches!(
                    run_portable(paths, &local, "tool"),
                    Err(AisError::InvalidArgument(ref msg)) if msg.contains("outside")
                ),
                "{executable} was not rejected"
            );
        }
    }

    #[test]
    fn test_format_catalog() {
        let layout = TestLayout::new();
        let paths = &layout.paths;
        let mut catalog = Catalog::new();
        catalog.insert(
            "vlc".to_string(),
            AppRecord {
                category: Some("Media".to_string()),
                ..record("3.0.18")
            },
        );

        let text = format_catalog(&catalog, &AppConfig::default(), paths);
        assert!(text.starts_with("[Media]"));
        assert!(text.contains("vlc"));
        assert!(text.contains("not downloaded"));

        let empty = format_catalog(&Catalog::new(), &AppConfig::default(), paths);
        assert_eq!(empty, "No applications available\n");
    }
}
