use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use berth::backend::{BackendRegistry, Operation, WorkspaceError};
use berth::config::parse_override_args;
use berth::logging::init_tracing;
use berth::resolver::{ResolveError, ResolveFlags, Resolver};
use berth::settings::Settings;
use berth::ui::TerminalUi;

#[derive(Parser)]
#[command(name = "berth", version, about = "Backend resolution and state migration")]
struct Cli {
    /// Working directory to operate in (default: current directory)
    #[arg(long, global = true)]
    chdir: Option<PathBuf>,
    /// Disable interactive prompts
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    no_input: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the backend, migrating state if the configuration changed
    Init {
        /// Copy existing state when the backend is removed or changed
        #[arg(long, action = ArgAction::SetTrue)]
        migrate_state: bool,
        /// Ignore the saved backend and configure from scratch
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "migrate_state")]
        reconfigure: bool,
        /// Copy state without asking for confirmation
        #[arg(long, action = ArgAction::SetTrue)]
        force_copy: bool,
        /// Backend configuration override: key=value or a TOML file
        #[arg(long = "backend-config", action = ArgAction::Append, value_name = "ARG")]
        backend_config: Vec<String>,
        /// Local state file path
        #[arg(long)]
        state: Option<PathBuf>,
        /// Local state output path
        #[arg(long)]
        state_out: Option<PathBuf>,
        /// Local state backup path, or "-" to disable backups
        #[arg(long)]
        backup: Option<PathBuf>,
    },
    /// Show the state of the selected workspace
    Status,
    /// List workspaces of the saved backend without reinitializing
    Workspaces,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ResolveError>() {
                Some(ResolveError::Failed(diags)) => eprintln!("\n{}", diags),
                _ => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.chdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let mut settings = Settings::load()?;
    if cli.no_input {
        settings.input = false;
    }

    let registry = BackendRegistry::with_builtins(&working_dir);
    let ui = Box::new(TerminalUi::new(settings.input));

    match cli.command {
        Command::Init {
            migrate_state,
            reconfigure,
            force_copy,
            backend_config,
            state,
            state_out,
            backup,
        } => {
            if force_copy {
                settings.force_copy = true;
            }
            let override_body = if backend_config.is_empty() {
                None
            } else {
                Some(parse_override_args(&backend_config, &working_dir).map_err(ResolveError::Failed)?)
            };

            let mut resolver = Resolver::new(&working_dir, registry, settings, ui)
                .with_state_paths(state, state_out, backup);
            let resolution = resolver.resolve_for_operation(
                None,
                override_body,
                ResolveFlags {
                    init: true,
                    migrate_state,
                    reconfigure,
                    force_local: false,
                },
            )?;
            for diag in &resolution.diagnostics {
                eprintln!("{}\n", diag);
            }
            println!(
                "Initialized with the {:?} backend ({}).",
                resolution.record.type_name, resolution.transition
            );
        }
        Command::Status => {
            let mut resolver = Resolver::new(&working_dir, registry, settings, ui);
            let resolution = resolver.resolve_for_operation(None, None, ResolveFlags::default())?;
            let workspace = resolver.selection().current()?;
            let outcome = resolution
                .backend
                .operation(Operation::show(workspace.as_str()))
                .with_context(|| format!("Failed to read state of workspace {:?}", workspace))?;

            println!("Backend:   {}", resolution.record.type_name);
            println!("Workspace: {}", outcome.workspace);
            match outcome.state {
                Some(state) => {
                    println!("Serial:    {}", state.serial);
                    println!("Lineage:   {}", state.lineage);
                    println!("Resources: {}", state.resource_count());
                }
                None => println!("No state."),
            }
        }
        Command::Workspaces => {
            let mut resolver = Resolver::new(&working_dir, registry, settings, ui);
            let (backend, diags) = resolver.resolve_from_cached_record_only()?;
            for diag in &diags {
                eprintln!("{}\n", diag);
            }
            let current = resolver.selection().current()?;
            match backend.workspaces() {
                Ok(names) => {
                    for name in names {
                        let marker = if name == current { "*" } else { " " };
                        println!("{} {}", marker, name);
                    }
                }
                Err(WorkspaceError::NotSupported) => println!("* {}", current),
                Err(e) => return Err(e).context("Failed to list workspaces"),
            }
        }
    }

    Ok(())
}
