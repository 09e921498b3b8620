use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use a11y_adjudicate::{TaskFilter, TracingSink};
use a11y_core::{Confidence, ReviewSubmission, SessionId, Urgency, WorkflowTaskId, WorkflowType};
use a11y_criteria::KnowledgeBase;
use a11y_runner::{
    load_session_plan, ComplianceService, Config, DiscoverySnapshot, DiscoverySource, StartSessionRequest,
    StaticDiscovery,
};
use a11y_scan::CommandToolRunner;
use a11y_storage_sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "a11y", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a11y in the current project (creates .a11y/, config, db)
    Init,

    /// Run a compliance session from a YAML or JSON plan and wait for it
    Run {
        #[arg(long)]
        plan: PathBuf,
    },

    /// Show one session, or list all sessions
    Status {
        #[arg(long)]
        session: Option<String>,
    },

    /// List open review tasks, highest priority first
    Tasks {
        #[arg(long)]
        session: String,
        #[arg(long)]
        workflow_type: Option<String>,
        #[arg(long)]
        urgency: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        min_priority: Option<u8>,
    },

    /// Claim a pending task
    Assign {
        #[arg(long)]
        task: String,
        #[arg(long)]
        reviewer: String,
    },

    /// Submit the review for an in-progress task
    Complete {
        #[arg(long)]
        task: String,
        /// The finding is a real violation
        #[arg(long)]
        violation: bool,
        /// The tool was wrong
        #[arg(long)]
        false_positive: bool,
        #[arg(long, default_value = "medium")]
        confidence: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        reviewer: Option<String>,
    },

    /// Queue a re-check of a confirmed violation after a fix
    Remediate {
        #[arg(long)]
        task: String,
    },

    /// Cancel a running session
    Cancel {
        #[arg(long)]
        session: String,
    },
}

fn open_service(root: &Path, discovery: Arc<dyn DiscoverySource>) -> anyhow::Result<(Config, ComplianceService)> {
    let cfg = Config::load_or_init(root)?;
    let store = SqliteStore::open(&cfg.db_path(root))?;
    let kb = KnowledgeBase::builtin(cfg.criteria.unmapped_policy.clone());
    let service = ComplianceService::new(
        Arc::new(store),
        Arc::new(kb),
        discovery,
        Arc::new(CommandToolRunner::new(cfg.tool_commands())),
        Arc::new(TracingSink),
        cfg.orchestrator.runner_config(),
    );
    Ok((cfg, service))
}

/// Commands other than `run` never poll discovery.
fn idle_discovery() -> Arc<dyn DiscoverySource> {
    Arc::new(StaticDiscovery::new(DiscoverySnapshot::running()))
}

fn parse_wire<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> anyhow::Result<T> {
    parse(value).ok_or_else(|| anyhow!("unknown {what}: {value}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            let cfg = Config::load_or_init(&root)?;
            let _ = SqliteStore::open(&cfg.db_path(&root))?;
            println!("Initialized a11y in {}", root.display());
        }
        Command::Run { plan } => {
            info!(plan = %plan.display(), "loading session plan");
            let p = load_session_plan(&plan)?;
            let base = plan.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            let (cfg, service) = open_service(&root, p.discovery(&base))?;
            let project_id = p.project_id.clone().unwrap_or_else(|| cfg.project.id.clone());
            let id = service.start_session(StartSessionRequest { project_id, tools: p.tool_names() })?;
            println!("Session {} started", id);
            service.wait_for_session(&id).await?;
            let view = service.get_session_status(&id)?.ok_or_else(|| anyhow!("session {id} vanished"))?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Status { session } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            match session {
                Some(id) => {
                    let id = SessionId::from_str(id);
                    let view = service.get_session_status(&id)?.ok_or_else(|| anyhow!("no such session: {id}"))?;
                    println!("{}", serde_json::to_string_pretty(&view)?);
                }
                None => {
                    let sessions = service.list_sessions()?;
                    println!("Sessions: {}", sessions.len());
                    for s in sessions {
                        println!(
                            "- {} [{}] {} ({:.0}%, {} pages)",
                            s.id,
                            s.status,
                            s.project_id,
                            s.progress.percent(),
                            s.pages.len()
                        );
                    }
                }
            }
        }
        Command::Tasks { session, workflow_type, urgency, assignee, min_priority } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            let filter = TaskFilter {
                workflow_type: workflow_type
                    .map(|w| parse_wire(&w, WorkflowType::from_wire, "workflow type"))
                    .transpose()?,
                urgency: urgency.map(|u| parse_wire(&u, Urgency::from_wire, "urgency")).transpose()?,
                assignee,
                min_priority,
            };
            let tasks = service.list_open_tasks(&SessionId::from_str(session), &filter)?;
            println!("Open tasks: {}", tasks.len());
            for t in tasks {
                println!(
                    "- {} p{} [{}] {} {} on page {} ({})",
                    t.id,
                    t.priority,
                    t.urgency,
                    t.workflow_type,
                    t.criterion_id,
                    t.page_id,
                    t.assigned_to.as_deref().unwrap_or("unassigned")
                );
            }
        }
        Command::Assign { task, reviewer } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            let t = service.assign_task(&WorkflowTaskId::from_str(task), &reviewer)?;
            println!("Assigned {} to {}", t.id, reviewer);
        }
        Command::Complete { task, violation, false_positive, confidence, notes, reviewer } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            let review = ReviewSubmission {
                reviewer,
                is_violation: violation,
                is_false_positive: false_positive,
                confidence_level: parse_wire(&confidence, Confidence::from_wire, "confidence")?,
                notes,
            };
            let t = service.complete_task(&WorkflowTaskId::from_str(task), review)?;
            let resolution = t.resolution.map(|r| r.to_string()).unwrap_or_default();
            println!("Completed {}: {}", t.id, resolution);
        }
        Command::Remediate { task } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            match service.request_remediation_validation(&WorkflowTaskId::from_str(task))? {
                Some(t) => println!("Queued remediation check {}", t.id),
                None => println!("A task is already open for that criterion and page"),
            }
        }
        Command::Cancel { session } => {
            let (_, service) = open_service(&root, idle_discovery())?;
            let id = SessionId::from_str(session);
            if service.cancel_session(&id).with_context(|| format!("cancel {id}"))? {
                println!("Cancelled {}", id);
            } else {
                println!("Session {} had already finished", id);
            }
        }
    }

    Ok(())
}
