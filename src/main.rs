//! # Summary Harness CLI (`smx`)
//!
//! The `smx` binary manages AI tools and projects and triggers processing
//! runs. All commands accept a `--config` flag pointing to a TOML
//! configuration file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `smx init` | Seed the JSON store files and the reports directory |
//! | `smx tool add <name> --endpoint-url <url>` | Register an AI tool |
//! | `smx tool list` | List tools and their status |
//! | `smx tool enable <id>` / `smx tool disable <id>` | Toggle a tool |
//! | `smx project add <name> --source <dir> --tool <id>` | Register a project |
//! | `smx project list` | List projects with their derived status |
//! | `smx project show <id>` | Print one project and its result payload |
//! | `smx run <project-id>` | Process a project and wait for the worker |
//! | `smx recover` | Fail projects left in Processing by a dead host |
//!
//! ## Examples
//!
//! ```bash
//! smx init --config ./config/smx.toml
//! smx tool add summarizer --endpoint-url http://localhost:9999/api
//! smx project add docs --source ./docs --tool <tool-id>
//! smx run <project-id>
//! smx project show <project-id>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use summary_harness::config::{self, Config};
use summary_harness::models::{AiTool, Project, ProjectResult};
use summary_harness::process::ProjectProcessor;
use summary_harness::store::{ProjectStore, ToolStore};
use summary_harness::worker::{recover_interrupted, RunRegistry, Worker};

/// Summary Harness CLI — a local-first project summarization orchestrator
/// for AI tools.
#[derive(Parser)]
#[command(
    name = "smx",
    about = "Summary Harness — a local-first project summarization orchestrator for AI tools",
    version,
    long_about = "Summary Harness registers projects (a named source directory bound to one AI \
    tool) and processes them on demand: every eligible file is summarized through the tool's \
    HTTP endpoint and the results are aggregated into a Markdown report per run."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/smx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Seed the store files and reports directory.
    ///
    /// Creates empty `projects.json` and `ai_tools.json` collections under
    /// the configured storage directory. Idempotent.
    Init,

    /// Manage AI tools (named HTTP summarization endpoints).
    Tool {
        #[command(subcommand)]
        action: ToolAction,
    },

    /// Manage projects (a source directory bound to one tool).
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Process a project: summarize every eligible source file and write
    /// the run report. Waits for the spawned worker to finish, then reads
    /// the outcome back from the store.
    Run {
        /// Id of the project to process.
        project_id: String,
    },

    /// Transition projects left in Processing by a dead host to Failed.
    ///
    /// Run this once after a host restart, before triggering new runs; it
    /// must not race live workers.
    Recover,
}

/// Tool subcommands.
#[derive(Subcommand)]
enum ToolAction {
    /// Register a new AI tool.
    Add {
        /// Display name for the tool.
        name: String,

        /// HTTP endpoint the tool answers on. Required for execution; a
        /// tool without it fails any run at setup time.
        #[arg(long)]
        endpoint_url: Option<String>,

        /// One-line description.
        #[arg(long)]
        description: Option<String>,
    },

    /// List registered tools.
    List,

    /// Re-activate a disabled tool.
    Enable {
        /// Tool id.
        id: String,
    },

    /// Disable a tool. Existing projects that reference it still run;
    /// only new project creation stops offering it.
    Disable {
        /// Tool id.
        id: String,
    },
}

/// Project subcommands.
#[derive(Subcommand)]
enum ProjectAction {
    /// Register a new project.
    Add {
        /// Display name for the project.
        name: String,

        /// Source directory whose eligible files get summarized.
        #[arg(long)]
        source: PathBuf,

        /// Id of the AI tool to use. Must exist and be active.
        #[arg(long)]
        tool: String,
    },

    /// List projects with their derived status.
    List,

    /// Print one project, its derived status, and its result payload.
    Show {
        /// Project id.
        id: String,
    },
}

fn open_stores(cfg: &Config) -> anyhow::Result<(Arc<ProjectStore>, Arc<ToolStore>)> {
    let projects = ProjectStore::open(cfg.projects_path())?;
    let tools = ToolStore::open(cfg.tools_path())?;
    Ok((Arc::new(projects), Arc::new(tools)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "summary_harness=info,smx=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let (projects, tools) = open_stores(&cfg)?;

    match cli.command {
        Commands::Init => {
            projects.init().await?;
            tools.init().await?;
            std::fs::create_dir_all(&cfg.storage.reports_dir).with_context(|| {
                format!(
                    "Failed to create reports directory: {}",
                    cfg.storage.reports_dir.display()
                )
            })?;
            println!("Stores initialized successfully.");
        }

        Commands::Tool { action } => match action {
            ToolAction::Add {
                name,
                endpoint_url,
                description,
            } => {
                let tool = AiTool::new(name, description, endpoint_url);
                tools.save(&tool).await?;
                println!("id: {}", tool.id);
            }
            ToolAction::List => {
                for tool in tools.find_all().await? {
                    let state = if tool.is_active() { "active" } else { "disabled" };
                    println!(
                        "{}  {}  {}  {}",
                        tool.id,
                        state,
                        tool.name,
                        tool.endpoint_url.as_deref().unwrap_or("-")
                    );
                }
            }
            ToolAction::Enable { id } => {
                let tool = tools.enable(&id).await?;
                println!("enabled {}", tool.id);
            }
            ToolAction::Disable { id } => {
                let tool = tools.disable(&id).await?;
                println!("disabled {}", tool.id);
            }
        },

        Commands::Project { action } => match action {
            ProjectAction::Add { name, source, tool } => {
                // Disabled tools are never offered for new projects; they
                // stay valid for projects that already reference them.
                let tool_record = tools.find_by_id(&tool).await?;
                if !tool_record.is_active() {
                    anyhow::bail!("tool {} is disabled", tool_record.id);
                }
                let project = Project::new(name, source, tool);
                projects.save(&project).await?;
                println!("id: {}", project.id);
            }
            ProjectAction::List => {
                for project in projects.find_all().await? {
                    println!(
                        "{}  {}  {}  tool={}",
                        project.id,
                        project.status(),
                        project.name,
                        project.tool
                    );
                }
            }
            ProjectAction::Show { id } => {
                let project = projects.find_by_id(&id).await?;
                println!("id: {}", project.id);
                println!("name: {}", project.name);
                println!("source: {}", project.source.display());
                println!("tool: {}", project.tool);
                println!("status: {}", project.status());
                println!("created_at: {}", project.created_at.to_rfc3339());
                if let Some(executed_at) = project.executed_at {
                    println!("executed_at: {}", executed_at.to_rfc3339());
                }
                if let Some(finished_at) = project.finished_at {
                    println!("finished_at: {}", finished_at.to_rfc3339());
                }
                match &project.result {
                    Some(ProjectResult::Success {
                        processed_files,
                        message,
                    }) => {
                        println!("message: {}", message);
                        println!("processed_files: {}", processed_files.join(", "));
                    }
                    Some(ProjectResult::Error { error }) => {
                        println!("error: {}", error);
                    }
                    None => {}
                }
            }
        },

        Commands::Run { project_id } => {
            let processor = ProjectProcessor::new(projects.clone(), tools.clone(), &cfg)?;
            let registry = Arc::new(RunRegistry::new());
            let handle = Worker::spawn(processor, &registry, project_id.clone())?;
            handle.await.context("worker task panicked")?;

            // The worker reports only through the store; read the outcome back.
            let project = projects.find_by_id(&project_id).await?;
            println!("status: {}", project.status());
            println!(
                "report: {}",
                cfg.storage
                    .reports_dir
                    .join(format!("{}.md", project.id))
                    .display()
            );
        }

        Commands::Recover => {
            let recovered = recover_interrupted(&projects).await?;
            if recovered.is_empty() {
                println!("No interrupted runs found.");
            } else {
                for id in &recovered {
                    println!("recovered {}", id);
                }
            }
            println!("ok");
        }
    }

    Ok(())
}
