use agentmerge_core::logging::init_logging;
use agentmerge_core::{LogSink, MergeReport, ReportStore, RunStatus, Settings, TaskRequest};
use agentmerge_inference::model::from_settings;
use agentmerge_orchestrator::MergeOrchestrator;
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use merge_engine::Decision;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "agentmerge",
    about = "Merge the work of parallel coding agents back onto one branch"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file
    #[arg(long, global = true, default_value = ".agentmerge/settings.json")]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge task working copies onto the target branch
    Merge(MergeArgs),
    /// Summarize a persisted merge report
    Report {
        /// Report file to show; defaults to the latest report
        file: Option<PathBuf>,
        /// List stored reports instead of showing one
        #[arg(long, conflicts_with = "file")]
        list: bool,
        /// Report directory
        #[arg(long)]
        storage_dir: Option<PathBuf>,
    },
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a settings file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings
    Show,
}

#[derive(Args)]
struct MergeArgs {
    /// Task to merge, as ID=PATH or ID=PATH@BRANCH
    #[arg(long = "task", required = true, value_parser = parse_task)]
    tasks: Vec<TaskArg>,

    /// Intent of a task, as ID=TEXT
    #[arg(long = "intent", value_parser = parse_intent)]
    intents: Vec<(String, String)>,

    /// Branch to merge onto
    #[arg(long)]
    target: Option<String>,

    /// Repository root
    #[arg(long)]
    root: Option<PathBuf>,

    /// Analyze and report without writing files
    #[arg(long)]
    dry_run: bool,

    /// Never call the language model
    #[arg(long)]
    no_ai: bool,

    /// Report directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskArg {
    id: String,
    path: PathBuf,
    branch: Option<String>,
}

fn parse_task(raw: &str) -> Result<TaskArg, String> {
    let (id, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH[@BRANCH], got `{}`", raw))?;
    let (path, branch) = match rest.rsplit_once('@') {
        Some((path, branch)) if !branch.is_empty() => (path, Some(branch.to_string())),
        _ => (rest, None),
    };
    if id.trim().is_empty() || path.is_empty() {
        return Err(format!("task id and path must not be empty in `{}`", raw));
    }
    Ok(TaskArg {
        id: id.trim().to_string(),
        path: PathBuf::from(path),
        branch,
    })
}

fn parse_intent(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, text)) if !id.trim().is_empty() => Ok((id.trim().to_string(), text.to_string())),
        _ => Err(format!("expected ID=TEXT, got `{}`", raw)),
    }
}

fn log_dir(cli: &Cli) -> PathBuf {
    cli.config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("logs")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Merge(args) => cmd_merge(&cli, args).await,
        Commands::Report {
            file,
            list,
            storage_dir,
        } => cmd_report(&cli, file.as_deref(), *list, storage_dir.as_deref()).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(&cli, *force),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    }
}

fn build_requests(tasks: &[TaskArg], intents: &[(String, String)]) -> anyhow::Result<Vec<TaskRequest>> {
    let mut seen = BTreeSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            bail!("Task `{}` given more than once", task.id);
        }
    }
    for (id, _) in intents {
        if !seen.contains(id.as_str()) {
            bail!("Intent given for unknown task `{}`", id);
        }
    }

    Ok(tasks
        .iter()
        .map(|task| {
            let mut request = TaskRequest::new(&task.id, &task.path);
            if let Some(branch) = &task.branch {
                request = request.with_branch(branch);
            }
            if let Some((_, intent)) = intents.iter().rev().find(|(id, _)| *id == task.id) {
                request = request.with_intent(intent);
            }
            request
        })
        .collect())
}

async fn cmd_merge(cli: &Cli, args: &MergeArgs) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    if let Some(target) = &args.target {
        settings.merge.target_branch = target.clone();
    }
    if let Some(root) = &args.root {
        settings.merge.root_path = root.clone();
    }
    if let Some(dir) = &args.storage_dir {
        settings.merge.storage_dir = dir.clone();
    }
    settings.merge.dry_run |= args.dry_run;
    if args.no_ai {
        settings.ai.enabled = false;
    }
    settings.validate()?;

    let _guard = init_logging(&log_dir(cli), cli.verbose)?;

    let requests = build_requests(&args.tasks, &args.intents)?;
    let target = settings.merge.target_branch.clone();
    let vcs = Arc::new(agentmerge_core::GitCli::new(&settings.merge.root_path));

    let mut orchestrator = MergeOrchestrator::new(settings.clone(), vcs).with_events(Arc::new(LogSink));
    if settings.ai.enabled {
        let model = from_settings(&settings.ai)?;
        tracing::info!(model = model.name(), "AI resolution enabled");
        orchestrator = orchestrator.with_model(model);
    }

    let report = orchestrator.merge(&requests, &target).await;
    print_report(&report);
    println!();
    println!("Report saved in {}", orchestrator.store().dir().display());

    Ok(exit_code(report.status))
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::NeedsReview | RunStatus::Partial => ExitCode::from(2),
        RunStatus::Error | RunStatus::Running => ExitCode::from(1),
    }
}

async fn cmd_report(
    cli: &Cli,
    file: Option<&Path>,
    list: bool,
    storage_dir: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let dir = match storage_dir {
        Some(dir) => dir.to_path_buf(),
        None => Settings::load_or_default(&cli.config)?.merge.storage_path(),
    };
    let store = ReportStore::new(dir);

    if list {
        let reports = store.list().await?;
        if reports.is_empty() {
            println!("No reports in {}", store.dir().display());
        }
        for path in reports {
            println!("{}", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = match file {
        Some(path) => store
            .load(path)
            .await
            .with_context(|| format!("Failed to read report {}", path.display()))?,
        None => match store.load_latest().await? {
            Some(report) => report,
            None => bail!("No merge report found in {}", store.dir().display()),
        },
    };
    print_report(&report);
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_init(cli: &Cli, force: bool) -> anyhow::Result<ExitCode> {
    if cli.config.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", cli.config.display());
    }
    Settings::default().save(&cli.config)?;
    println!("Configuration saved to {}", cli.config.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(cli: &Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::load_or_default(&cli.config)?;
    if !cli.config.exists() {
        println!("# {} not found, showing defaults", cli.config.display());
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &MergeReport) {
    println!("Merge {}", report.run_id);
    println!("===========================================");
    println!("  Tasks: {}", report.tasks.join(", "));
    println!("  Target: {}", report.target_branch);
    println!(
        "  Status: {}{}",
        report.status,
        if report.dry_run { " (dry run)" } else { "" }
    );
    println!("  Started: {}", report.started_at.to_rfc3339());
    if let Some(done) = report.completed_at {
        println!("  Completed: {}", done.to_rfc3339());
    }
    println!(
        "  Files: {} analyzed, {} conflicts",
        report.files_analyzed, report.conflicts_detected
    );
    println!(
        "  Auto-merged: {}  AI-merged: {}  Needs review: {}  Failed: {}",
        report.auto_merged, report.ai_merged, report.needs_human_review, report.failed
    );
    if report.resolver_stats.calls_made > 0 {
        println!(
            "  AI calls: {} (~{} tokens)",
            report.resolver_stats.calls_made, report.resolver_stats.estimated_tokens_used
        );
    }

    if !report.results.is_empty() {
        println!();
        for outcome in &report.results {
            println!("  [{}] {}: {}", outcome.decision(), outcome.file_path, outcome.result.explanation);
            if let Some(error) = &outcome.result.error {
                println!("      error: {}", error);
            }
            for record in &outcome.conflicts {
                if record.result.decision == Decision::AutoMerged && !record.low_confidence {
                    continue;
                }
                println!(
                    "      {} at {} ({}, {}): {}{}",
                    record.conflict.targets.join(" / "),
                    record.conflict.location,
                    record.conflict.severity,
                    record.result.decision,
                    record.result.explanation,
                    if record.low_confidence { " [low confidence]" } else { "" }
                );
            }
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_with_branch() {
        let task = parse_task("auth=../wt/auth@feature/login").unwrap();
        assert_eq!(task.id, "auth");
        assert_eq!(task.path, PathBuf::from("../wt/auth"));
        assert_eq!(task.branch.as_deref(), Some("feature/login"));
    }

    #[test]
    fn test_parse_task_without_branch() {
        let task = parse_task("t1=/tmp/t1").unwrap();
        assert_eq!(task.branch, None);
        assert!(parse_task("t1").is_err());
        assert!(parse_task("=/tmp").is_err());
        assert!(parse_task("t1=").is_err());
    }

    #[test]
    fn test_intents_attach_to_their_task() {
        let tasks = vec![parse_task("a=/a").unwrap(), parse_task("b=/b@dev").unwrap()];
        let intents = vec![parse_intent("b=Add logout button").unwrap()];
        let requests = build_requests(&tasks, &intents).unwrap();
        assert_eq!(requests[0].intent, None);
        assert_eq!(requests[1].intent.as_deref(), Some("Add logout button"));
        assert_eq!(requests[1].branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_bad_task_lists_are_rejected() {
        let tasks = vec![parse_task("a=/a").unwrap(), parse_task("a=/b").unwrap()];
        assert!(build_requests(&tasks, &[]).is_err());

        let tasks = vec![parse_task("a=/a").unwrap()];
        let intents = vec![("zzz".to_string(), "x".to_string())];
        assert!(build_requests(&tasks, &intents).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(RunStatus::Success), ExitCode::SUCCESS);
        assert_eq!(exit_code(RunStatus::Partial), ExitCode::from(2));
        assert_eq!(exit_code(RunStatus::Error), ExitCode::from(1));
    }

    #[test]
    fn test_cli_parses_merge() {
        let cli = Cli::try_parse_from([
            "agentmerge",
            "merge",
            "--task",
            "a=/a",
            "--task",
            "b=/b",
            "--no-ai",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.tasks.len(), 2);
                assert!(args.no_ai && args.dry_run);
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn test_cli_parses_report() {
        let cli = Cli::try_parse_from(["agentmerge", "report"]).unwrap();
        match cli.command {
            Commands::Report { file, list, .. } => assert!(file.is_none() && !list),
            _ => panic!("expected report"),
        }
        assert!(Cli::try_parse_from(["agentmerge", "report", "--latest"]).is_err());
        assert!(Cli::try_parse_from(["agentmerge", "report", "r.json", "--list"]).is_err());
    }
}
