use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;

use scoped_authz::authz::{PathResourceTree, PermissionCatalog};
use scoped_authz::persistence::{codec, ConfigFile, ConfigStorage};
use scoped_authz::{AuthorizationStrategy, AuthzConfig, SubjectIdentity, Target};

#[derive(Parser, Debug)]
#[command(author, version, about = "scoped-authz role configuration tool", long_about = None)]
struct Cli {
    /// Role configuration file (defaults to AUTHZ_CONFIG_FILE, then authz.json)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse the configuration and report role counts and dropped permissions
    Validate,
    /// Rewrite the configuration in canonical form
    Canonicalize {
        /// Write here instead of replacing the input file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the SHA-256 digest of the canonical form
    Digest,
    /// Evaluate one access check
    Check {
        #[command(flatten)]
        subject: SubjectArgs,
        #[arg(long)]
        permission: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List every grant a subject holds at a target
    Grants {
        #[command(flatten)]
        subject: SubjectArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug)]
struct SubjectArgs {
    #[arg(long)]
    subject: String,
    /// Group the subject belongs to (repeatable)
    #[arg(long = "group")]
    groups: Vec<String>,
}

impl SubjectArgs {
    fn identity(&self) -> SubjectIdentity {
        SubjectIdentity::new(&self.subject).with_groups(self.groups.iter().cloned())
    }
}

/// Target of a check; the root when neither option is given.
#[derive(Args, Debug)]
#[group(required = false, multiple = false)]
struct TargetArgs {
    /// Item or namespace path, e.g. /teamA/sub/job
    #[arg(long)]
    item: Option<String>,
    /// Agent id
    #[arg(long)]
    agent: Option<String>,
}

impl TargetArgs {
    fn target(&self) -> Target {
        match (&self.item, &self.agent) {
            (Some(item), _) => Target::item(item),
            (None, Some(agent)) => Target::agent(agent.clone()),
            (None, None) => Target::Root,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = AuthzConfig::from_env()?;
    let file = match cli.file {
        Some(path) => ConfigFile::new(path),
        None => ConfigFile::from_config(&config),
    };

    let bytes = file
        .read()
        .await?
        .with_context(|| format!("no configuration at {}", file.path().display()))?;

    let strategy = AuthorizationStrategy::from_config(&config, PermissionCatalog::standard(), Arc::new(PathResourceTree));

    match cli.command {
        Commands::Validate => {
            let decoded = codec::import(&bytes, strategy.catalog())?;
            let counts = decoded.snapshot.counts();
            println!("version:   {}", decoded.version);
            println!("global:    {}", counts.global);
            println!("namespace: {}", counts.namespace);
            println!("agent:     {}", counts.agent);
            for dropped in &decoded.dropped_permissions {
                println!("dropped:   {} role {} permission {}", dropped.kind, dropped.role, dropped.permission);
            }
            for (kind, name) in &decoded.duplicate_records {
                println!("duplicate: {} role {}", kind, name);
            }
        }
        Commands::Canonicalize { out } => {
            strategy.load_configuration(&bytes)?;
            let target = out.map(ConfigFile::new).unwrap_or(file);
            let counts = target.save(&strategy).await?;
            println!("Wrote {} roles to {}", counts.total(), target.path().display());
        }
        Commands::Digest => {
            strategy.load_configuration(&bytes)?;
            let canonical = strategy.export_configuration()?;
            let status = if canonical == bytes { "canonical" } else { "not canonical" };
            println!("{}  ({})", codec::digest(&canonical), status);
        }
        Commands::Check { subject, permission, target } => {
            strategy.load_configuration(&bytes)?;
            let decision = strategy.check(&subject.identity(), &permission, &target.target());
            println!("{decision}");
        }
        Commands::Grants { subject, target } => {
            strategy.load_configuration(&bytes)?;
            let grants = strategy.effective_grants(&subject.identity(), &target.target());
            println!("{:<24} {:<10} {}", "Permission", "Kind", "Role");
            for grant in grants {
                println!("{:<24} {:<10} {}", grant.permission, grant.kind, grant.role_name);
            }
        }
    }

    Ok(())
}

fn load_env() {
    if dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
