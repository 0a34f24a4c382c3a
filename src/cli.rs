//! Command-line argument model.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::backup::BackupFormat;
use crate::core::query::ServerAddress;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "craftctl",
    author,
    version,
    about = "Install, update and run Minecraft servers"
)]
pub struct Cli {
    /// Installation root (defaults to the current directory).
    #[arg(long, short = 'd', global = true, default_value = ".")]
    pub dir: PathBuf,
    /// Debug logging for craftctl.
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create the config for a new installation, optionally installing a server.
    Init(InitArgs),
    /// Install a server build or a modpack into an initialized installation.
    Install(InstallArgs),
    /// Update the installed build or modpack to its newest version.
    Update(UpdateArgs),
    /// Show what is installed and whether it is up to date.
    Version(ProfileArg),
    /// Run the server in the foreground, or in the background with --detached.
    Start(StartArgs),
    /// Show whether a detached server is running.
    Status,
    /// Stop the detached server.
    Stop,
    /// Follow the detached server's console and send it commands.
    Attach,
    /// Ping a server for its version, players and MOTD.
    Query(QueryArgs),
    /// Look up a player by name or UUID.
    Lookup(LookupArgs),
    /// Show or change launch settings.
    Config(ConfigArgs),
    /// Manage profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Manage mods.
    #[command(subcommand)]
    Mods(ModsCommand),
    /// Manage Java runtimes.
    #[command(subcommand)]
    Java(JavaCommand),
    /// Inspect or clear the lookup cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Snapshot and restore the installation root.
    #[command(subcommand)]
    Backup(BackupCommand),
}

/// What to put into an installation.
#[derive(Debug, Clone, Args)]
pub struct InstallTarget {
    /// Server type (paper, fabric, forge, ...).
    #[arg(long = "type", short = 't', conflicts_with = "modpack")]
    pub server_type: Option<String>,
    /// Minecraft version (defaults to the newest).
    #[arg(long = "minecraft", short = 'm')]
    pub minecraft_version: Option<String>,
    /// Build label (defaults to the newest build).
    #[arg(long)]
    pub build: Option<String>,
    /// Modpack slug or id.
    #[arg(long)]
    pub modpack: Option<String>,
    /// Modpack version id (defaults to the newest).
    #[arg(long, requires = "modpack")]
    pub modpack_version: Option<String>,
}

impl InstallTarget {
    pub fn is_empty(&self) -> bool {
        self.server_type.is_none() && self.modpack.is_none()
    }
}

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
    /// Profile name of the new installation.
    #[arg(long, default_value = "default")]
    pub profile_name: String,
    /// Maximum heap in MiB.
    #[arg(long)]
    pub ram: Option<u32>,
    /// Existing jar to adopt instead of installing one.
    #[arg(long)]
    pub jar: Option<String>,
    #[command(flatten)]
    pub target: InstallTarget,
}

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    #[command(flatten)]
    pub target: InstallTarget,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    /// Move to another Minecraft version instead of staying on the current one.
    #[arg(long = "minecraft", short = 'm')]
    pub minecraft_version: Option<String>,
    #[command(flatten)]
    pub profile: ProfileArg,
}

#[derive(Debug, Clone, Args)]
pub struct ProfileArg {
    /// Operate on a stored profile instead of the active installation.
    #[arg(long, short = 'p')]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    /// Accept the Minecraft EULA before starting.
    #[arg(long, default_value_t = false)]
    pub eula: bool,
    /// Run in the background; use `attach`, `status` and `stop` afterwards.
    #[arg(long, short = 'D', default_value_t = false)]
    pub detached: bool,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// `host[:port]` (defaults to this installation's server port).
    pub address: Option<ServerAddress>,
    /// Use the full UDP query instead of the status ping.
    #[arg(long, default_value_t = false)]
    pub query: bool,
    /// Seconds to wait for an answer.
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Args)]
pub struct LookupArgs {
    /// Player name or UUID.
    pub player: String,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Maximum heap in MiB.
    #[arg(long)]
    pub ram: Option<u32>,
    /// Java major version to run with.
    #[arg(long)]
    pub java: Option<u32>,
    /// JVM flags placed before `-jar` (replaces the current list).
    #[arg(long, num_args = 0.., allow_hyphen_values = true)]
    pub flags: Option<Vec<String>>,
    /// Server arguments placed after `nogui` (replaces the current list).
    #[arg(long, num_args = 0.., allow_hyphen_values = true)]
    pub args: Option<Vec<String>>,
    #[command(flatten)]
    pub profile: ProfileArg,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ProfileCommand {
    /// List stored profiles.
    List,
    /// Create a new empty profile.
    Create { name: String },
    /// Delete a stored profile.
    Delete { name: String },
    /// Make a stored profile the active installation.
    Use { name: String },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ModsCommand {
    /// List installed mods and their update status.
    List(ProfileArg),
    /// Install a mod and its required dependencies.
    Install { project: String },
    /// Remove a mod by file name, project id, slug or title.
    Uninstall { name: String },
    /// Update every outdated mod.
    Update,
    /// Search the registry for server-side mods.
    Search { query: String },
}

#[derive(Debug, Clone, Subcommand)]
pub enum JavaCommand {
    /// List installed and available runtimes.
    List,
    /// Install a runtime.
    Install { major: u32 },
    /// Delete an installed runtime.
    Delete { major: u32 },
    /// Run the installation with this Java major version.
    Use { major: u32 },
}

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommand {
    /// Entry count and size.
    View,
    /// Remove every entry.
    Clear,
}

#[derive(Debug, Clone, Subcommand)]
pub enum BackupCommand {
    /// Archive the installation root.
    Create {
        /// Backup name (defaults to the current date and time).
        name: Option<String>,
        /// zip, tar, tar.gz or tar.xz.
        #[arg(long, short = 'f', default_value = "zip")]
        format: BackupFormat,
    },
    /// List backups, newest first.
    List,
    /// Replace the installation root with a backup.
    Restore { name: String },
    /// Delete a backup.
    Delete { name: String },
}
