use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use reconcile::{DiffPolicy, EntityKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative provisioning for Cobbler", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file [default: ~/.config/provisync/config.toml]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// State file [default: ~/.local/state/provisync/state.json]
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings. Each one falls back to the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Cobbler XML-RPC endpoint, e.g. https://cobbler.lab/cobbler_api
    #[arg(long, global = true, env = "COBBLER_URL")]
    pub url: Option<String>,

    /// Cobbler username
    #[arg(long, global = true, env = "COBBLER_USERNAME")]
    pub username: Option<String>,

    /// Cobbler password
    #[arg(long, global = true, env = "COBBLER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true, env = "COBBLER_INSECURE")]
    pub insecure: bool,

    /// CA certificate to trust, as a path or PEM contents
    #[arg(long = "cacert-file", global = true, env = "COBBLER_CACERT_FILE")]
    pub cacert_file: Option<String>,

    /// How interface changes are applied: compatible or by_name
    #[arg(long, global = true)]
    pub interface_policy: Option<DiffPolicy>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan {
        /// Desired-state manifest (TOML)
        manifest: PathBuf,
    },

    /// Bring Cobbler in line with the manifest
    Apply(ApplyArgs),

    /// Show one entity as Cobbler has it
    Show(ShowArgs),

    /// Delete every entity recorded in the state file
    Destroy {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Desired-state manifest (TOML)
    pub manifest: PathBuf,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of systems to reconcile in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Entity kind: distro, profile, repo, snippet, template_file, system
    pub kind: EntityKind,

    /// Entity name
    pub name: String,

    /// Print as JSON in manifest shape
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "provisync",
            "-vv",
            "--interface-policy",
            "by_name",
            "apply",
            "lab.toml",
            "--yes",
            "-j",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.connection.interface_policy, Some(DiffPolicy::ByName));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.yes);
        assert_eq!(args.jobs, 8);
    }

    #[test]
    fn test_parse_show_kind() {
        let cli = Cli::try_parse_from(["provisync", "show", "template", "sample.ks"]).unwrap();
        let Command::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.kind, EntityKind::TemplateFile);

        assert!(Cli::try_parse_from(["provisync", "show", "image", "x"]).is_err());
    }
}
