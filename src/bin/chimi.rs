// src/bin/chimi.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use log::warn;

use chimi::cli::args::{Cli, Command};
use chimi::cli::handlers;
use chimi::core::build::BuildError;
use chimi::core::definition::DriveError;
use chimi::core::registry::RegistryError;
use chimi::core::resolver::ResolveError;
use chimi::settings;
use chimi::system::executor::ExecutionError;
use chimi::system::vcs::VcsError;
use chimi::CancellationToken;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    settings::set_dry_run(cli.dry_run);

    let token: CancellationToken = Arc::new(AtomicBool::new(false));
    let handler_token = Arc::clone(&token);
    if let Err(err) = ctrlc::set_handler(move || {
        handler_token.store(true, Ordering::SeqCst);
    }) {
        warn!("could not install the interrupt handler: {err}");
    }

    if let Err(err) = run(&cli, &token) {
        let code = exit_code(&err);
        if code == 130 {
            eprintln!("{}", "interrupted".yellow().bold());
        } else {
            eprintln!("{} {err:#}", "error:".red().bold());
            if let Some(hint) = hint_for(&err) {
                eprintln!("{} {hint}", "hint:".cyan().bold());
            }
        }
        std::process::exit(code);
    }
}

fn run(cli: &Cli, token: &CancellationToken) -> anyhow::Result<()> {
    match &cli.command {
        Command::Init(args) => handlers::init::handle(args),
        Command::Fetch(args) => handlers::fetch::handle(args, token),
        Command::Build(args) => handlers::build::handle(args, token),
        Command::Status => handlers::status::handle(),
        Command::Show(args) => handlers::show::handle(args),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if matches!(
        err.downcast_ref::<DriveError>(),
        Some(DriveError::Interrupted | DriveError::Execution(ExecutionError::Interrupted(_)))
    ) {
        return 130;
    }
    if matches!(
        err.downcast_ref::<ExecutionError>(),
        Some(ExecutionError::Interrupted(_))
    ) {
        return 130;
    }
    if matches!(
        err.downcast_ref::<VcsError>(),
        Some(VcsError::Git(ExecutionError::Interrupted(_)))
    ) {
        return 130;
    }
    1
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(resolve) = err.downcast_ref::<ResolveError>() {
        return match resolve {
            ResolveError::InvalidArchitecture { .. } | ResolveError::Arch(_) => {
                Some("'chimi show arch --list' prints the known architectures")
            }
            ResolveError::InvalidBuildOption { .. } => {
                Some("'chimi show arch NAME' prints the options an architecture supports")
            }
            ResolveError::MissingPath { .. } => {
                Some("pass --force to skip the path existence checks")
            }
        };
    }
    if let Some(registry) = err.downcast_ref::<RegistryError>() {
        return match registry {
            RegistryError::NotFound(_) => Some("run 'chimi init' to set up a managed directory"),
            RegistryError::CannotOverwriteBuild(_) => {
                Some("pass --replace to overwrite the recorded build")
            }
            _ => None,
        };
    }
    if let Some(drive) = err.downcast_ref::<DriveError>() {
        return match drive {
            DriveError::NotFetched(_) => Some("run 'chimi fetch' to clone the source trees"),
            DriveError::Build(BuildError::NoMatchingBuildToContinue) => {
                Some("drop --continue to start a fresh build")
            }
            DriveError::Build(BuildError::BuildAlreadyComplete(_)) => {
                Some("pass --force to rebuild anyway")
            }
            DriveError::Registry(RegistryError::CannotOverwriteBuild(_)) => {
                Some("pass --replace to overwrite the recorded build")
            }
            _ => None,
        };
    }
    None
}
