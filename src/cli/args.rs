// src/cli/args.rs

//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "chimi",
    version,
    about = "Companion tool for ChaNGa and Charm++: fetch, build, and track builds."
)]
pub struct Cli {
    /// Print what would be done without doing it.
    #[arg(short = 'n', long = "dry-run", global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a directory for managed builds.
    Init(InitArgs),
    /// Clone or update the managed source trees.
    Fetch(FetchArgs),
    /// Configure and compile packages.
    Build(BuildArgs),
    /// Summarize packages and their recorded builds.
    Status,
    /// Inspect architectures or builds in detail.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory).
    pub directory: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Packages to fetch (defaults to all).
    pub packages: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// The application and, if needed, a matching runtime build.
    All,
    /// Only the application package.
    Changa,
    /// Only the runtime package.
    Charm,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// What to build.
    #[arg(value_enum, default_value_t = BuildTarget::All)]
    pub target: BuildTarget,

    /// Target architecture, or a base-architecture shorthand.
    #[arg(short, long)]
    pub arch: Option<String>,

    /// Branch to record for the build (defaults to the checkout's branch).
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Comma-separated build options: NAME enables, -NAME disables,
    /// NAME=VALUE assigns. May be given multiple times.
    #[arg(short = 'o', long = "options", value_name = "LIST", allow_hyphen_values = true)]
    pub options: Vec<String>,

    /// Extra include directory passed through to the build.
    #[arg(short = 'I', value_name = "DIR")]
    pub include_dirs: Vec<String>,

    /// Extra library directory passed through to the build.
    #[arg(short = 'L', value_name = "DIR")]
    pub lib_dirs: Vec<String>,

    /// Resume a previously failed build instead of starting over.
    #[arg(long = "continue")]
    pub continue_build: bool,

    /// Replace an existing build record occupying the same directory.
    #[arg(long)]
    pub replace: bool,

    /// Remove matching builds instead of building. With no value, matches
    /// the resolved configuration; otherwise a comma-separated list of
    /// build names or ids.
    #[arg(long, value_name = "NAME|ID", value_delimiter = ',', num_args = 0..)]
    pub purge: Option<Vec<String>>,

    /// Skip safety checks (path existence, already-complete builds).
    #[arg(short, long)]
    pub force: bool,

    /// Ignore unrecognized option tokens instead of failing.
    #[arg(long)]
    pub ignore_unknown: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(subcommand)]
    pub what: ShowCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShowCommand {
    /// List known architectures, or detail one.
    Arch(ShowArchArgs),
    /// List recorded builds.
    Builds(ShowBuildsArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchKind {
    /// Concrete build architectures only.
    Build,
    /// Base architectures only.
    Base,
    /// Both.
    All,
}

#[derive(Args, Debug)]
pub struct ShowArchArgs {
    /// Architectures to detail (omit to list all).
    pub names: Vec<String>,

    /// Print names only, one per line.
    #[arg(short, long)]
    pub list: bool,

    /// Restrict listings to one kind of architecture.
    #[arg(short, long, value_enum, default_value_t = ArchKind::All)]
    pub kind: ArchKind,
}

#[derive(Args, Debug)]
pub struct ShowBuildsArgs {
    /// Restrict to one package.
    #[arg(short, long)]
    pub package: Option<String>,

    /// Restrict to builds of one branch.
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Restrict to builds of one architecture.
    #[arg(short, long)]
    pub arch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_options_accumulate() {
        let cli = Cli::parse_from([
            "chimi", "build", "charm", "-o", "cuda,smp", "-o", "-ibverbs", "--arch", "net",
        ]);
        let Command::Build(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.target, BuildTarget::Charm);
        assert_eq!(args.options, vec!["cuda,smp", "-ibverbs"]);
        assert_eq!(args.arch.as_deref(), Some("net"));
    }

    #[test]
    fn purge_accepts_bare_and_listed_forms() {
        let cli = Cli::parse_from(["chimi", "build", "--purge"]);
        let Command::Build(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.purge, Some(vec![]));

        let cli = Cli::parse_from(["chimi", "build", "--purge", "a,b"]);
        let Command::Build(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.purge, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn dry_run_is_global() {
        let cli = Cli::parse_from(["chimi", "status"]);
        assert!(!cli.dry_run);
        let cli = Cli::parse_from(["chimi", "fetch", "-n"]);
        assert!(cli.dry_run);
    }
}
