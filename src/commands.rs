//! Command drivers: one async fn per subcommand, thin over `core`.
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{
    BackupCommand, CacheCommand, Command, ConfigArgs, InitArgs, InstallTarget, JavaCommand,
    LookupArgs, ModsCommand, ProfileCommand, QueryArgs, StartArgs, UpdateArgs,
};
use crate::core::api::mcjars::{Build, ServerType};
use crate::core::api::modrinth::{Version, VersionFilter};
use crate::core::backup::{default_name, BackupStore};
use crate::core::config::Config;
use crate::core::context::AppContext;
use crate::core::error::{CraftError, CraftResult, RecoverableFailure};
use crate::core::jar::JarIdentity;
use crate::core::launch::{self, Detached};
use crate::core::modpack::ModpackInstaller;
use crate::core::mods::install::{search_facets, uninstall};
use crate::core::mods::resolver::scan;
use crate::core::mods::{ModInstaller, ModRecord};
use crate::core::query::{self, ServerAddress};

const PLAYER_LISTS: [(&str, &str); 3] = [
    ("ops.json", "operator"),
    ("whitelist.json", "whitelisted"),
    ("banned-players.json", "banned"),
];

pub async fn dispatch(ctx: &AppContext, command: Command) -> CraftResult<()> {
    match command {
        Command::Init(args) => init(ctx, args).await,
        Command::Install(args) => {
            let mut config = ctx.load_config(None).await?;
            install_target(ctx, &mut config, &args.target).await
        }
        Command::Update(args) => update(ctx, args).await,
        Command::Version(args) => version(ctx, args.profile.as_deref()).await,
        Command::Start(args) => start(ctx, args).await,
        Command::Status => status(ctx).await,
        Command::Stop => stop(ctx).await,
        Command::Attach => Detached::new(ctx.root()).attach().await,
        Command::Query(args) => query_server(ctx, args).await,
        Command::Lookup(args) => lookup(ctx, args).await,
        Command::Config(args) => config(ctx, args).await,
        Command::Profile(command) => profile(ctx, command).await,
        Command::Mods(command) => mods(ctx, command).await,
        Command::Java(command) => java(ctx, command).await,
        Command::Cache(command) => cache(ctx, command).await,
        Command::Backup(command) => backup(ctx, command).await,
    }
}

// ── init / install / update ─────────────────────────

async fn init(ctx: &AppContext, args: InitArgs) -> CraftResult<()> {
    let mut config = Config::create(ctx.root(), &args.profile_name).await?;
    if let Some(ram) = args.ram {
        config.ram_mb = ram;
    }
    if let Some(jar) = args.jar {
        config.jar_file = jar;
    }
    config.save().await?;
    println!("initialized {:?} as profile {}", ctx.root(), config.profile_name);

    if args.target.is_empty() {
        print_identity(&ctx.identify(&config).await);
        return Ok(());
    }
    install_target(ctx, &mut config, &args.target).await
}

async fn install_target(
    ctx: &AppContext,
    config: &mut Config,
    target: &InstallTarget,
) -> CraftResult<()> {
    if let Some(slug) = &target.modpack {
        let version = resolve_modpack_version(ctx, slug, target.modpack_version.as_deref()).await?;
        let previous = config.modpack_version.clone();
        return install_modpack(ctx, config, slug, previous.as_deref(), &version).await;
    }

    let server_type: ServerType = target
        .server_type
        .as_deref()
        .ok_or_else(|| CraftError::InvalidArgument("pass --type or --modpack".into()))?
        .parse()?;

    let versions = ctx.build_index.list_minecraft_versions(server_type).await?;
    let minecraft = match &target.minecraft_version {
        Some(v) => versions
            .iter()
            .find(|mv| &mv.version == v)
            .ok_or_else(|| CraftError::NotFound(format!("{server_type} for Minecraft {v}")))?,
        None => versions
            .last()
            .ok_or_else(|| CraftError::NotFound(format!("versions of {server_type}")))?,
    };

    let builds = ctx
        .build_index
        .list_builds(server_type, &minecraft.version)
        .await?;
    let build = pick_build(builds, target.build.as_deref())?;

    println!(
        "installing {} {} ({})",
        server_type,
        minecraft.version,
        build.jar_version_label()
    );
    let outcome = ctx.installer().run(&build.installation, config).await?;

    config.java_version = minecraft.java;
    config.modpack_slug = None;
    config.modpack_version = None;
    config.save().await?;

    report_recovered(&outcome.recovered);
    println!("installed {} into {}", config.jar_file, config.jar_dir().display());
    Ok(())
}

fn pick_build(builds: Vec<Build>, label: Option<&str>) -> CraftResult<Build> {
    match label {
        Some(label) => builds
            .into_iter()
            .find(|b| b.jar_version_label() == label || b.id.to_string() == label)
            .ok_or_else(|| CraftError::NotFound(format!("build {label}"))),
        None => builds
            .into_iter()
            .next()
            .ok_or_else(|| CraftError::NotFound("any build".into())),
    }
}

async fn resolve_modpack_version(
    ctx: &AppContext,
    slug: &str,
    version_id: Option<&str>,
) -> CraftResult<Version> {
    if let Some(id) = version_id {
        return ctx.registry.version(id).await;
    }
    let project = ctx.registry.project(slug).await?;
    if project.project_type != "modpack" {
        return Err(CraftError::InvalidArgument(format!("{slug} is not a modpack")));
    }
    ctx.registry
        .project_versions(&project.id, &VersionFilter::default())
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CraftError::NotFound(format!("versions of {slug}")))
}

async fn install_modpack(
    ctx: &AppContext,
    config: &mut Config,
    slug: &str,
    previous: Option<&str>,
    version: &Version,
) -> CraftResult<()> {
    println!("installing modpack {} {}", slug, version.version_number);
    let mut installer = ModpackInstaller::new(
        ctx.registry.as_ref(),
        ctx.build_index.as_ref(),
        ctx.downloader.clone(),
    );
    let outcome = installer.install(slug, previous, &version.id, config).await?;

    report_recovered(&outcome.stale_failures);
    report_recovered(&outcome.install.recovered);
    println!(
        "installed modpack {} on {} {} ({} files)",
        slug,
        outcome.build.server_type,
        outcome.build.minecraft_label(),
        outcome.files_downloaded
    );
    Ok(())
}

async fn update(ctx: &AppContext, args: UpdateArgs) -> CraftResult<()> {
    let mut config = ctx.load_config(args.profile.profile.as_deref()).await?;

    if let (Some(slug), Some(current)) = (config.modpack_slug.clone(), config.modpack_version.clone()) {
        let latest = resolve_modpack_version(ctx, &slug, None).await?;
        if latest.id == current {
            println!("modpack {} is up to date ({})", slug, latest.version_number);
            return Ok(());
        }
        return install_modpack(ctx, &mut config, &slug, Some(current.as_str()), &latest).await;
    }

    let identity = ctx.identify(&config).await;
    if identity.is_unknown() {
        return Err(CraftError::NotFound(
            "identity of the installed jar, reinstall with `craftctl install`".into(),
        ));
    }

    let minecraft = args
        .minecraft_version
        .unwrap_or_else(|| identity.minecraft_version.clone());
    let builds = ctx
        .build_index
        .list_builds(identity.server_type, &minecraft)
        .await?;
    let latest = pick_build(builds, None)?;

    if minecraft == identity.minecraft_version && Some(latest.id) == identity.build_id {
        println!("{} {} is up to date", identity.server_type, identity.jar_version);
        return Ok(());
    }

    println!(
        "updating {} {} ({}) -> {} ({})",
        identity.server_type,
        identity.minecraft_version,
        identity.jar_version,
        minecraft,
        latest.jar_version_label()
    );
    let outcome = ctx.installer().run(&latest.installation, &mut config).await?;
    report_recovered(&outcome.recovered);
    println!("updated");
    Ok(())
}

// ── version / start / lookup / config ───────────────

async fn version(ctx: &AppContext, profile: Option<&str>) -> CraftResult<()> {
    let config = ctx.load_config(profile).await?;
    println!("profile: {}", config.profile_name);
    println!("jar: {}", config.jar_file);
    if let (Some(slug), Some(version)) = (&config.modpack_slug, &config.modpack_version) {
        println!("modpack: {slug} ({version})");
    }

    let identity = ctx.identify(&config).await;
    print_identity(&identity);
    if identity.is_unknown() {
        return Ok(());
    }

    let summary = ctx
        .build_index
        .latest_summary(identity.server_type, &identity.minecraft_version)
        .await?;
    println!("latest jar version: {}", summary.latest_jar);
    println!("latest minecraft version: {}", summary.latest_mc);

    let up_to_date = identity
        .is_latest_build()
        .unwrap_or(summary.latest_jar == identity.jar_version);
    if up_to_date {
        println!("build is up to date");
    } else {
        println!("build is outdated, run `craftctl update`");
    }
    Ok(())
}

fn print_identity(identity: &JarIdentity) {
    println!("type: {}", identity.server_type);
    println!("minecraft version: {}", identity.minecraft_version);
    println!("jar version: {}", identity.jar_version);
}

async fn start(ctx: &AppContext, args: StartArgs) -> CraftResult<()> {
    let config = ctx.load_config(None).await?;
    let root = config.root();

    if args.eula {
        launch::accept_eula(&root).await?;
    }
    if !launch::eula_accepted(&root) {
        return Err(CraftError::InvalidArgument(
            "the Minecraft EULA is not accepted, rerun with --eula".into(),
        ));
    }

    let detached = Detached::new(&root);
    detached.ensure_stopped().await?;
    launch::ensure_server_jar(&config, &ctx.downloader).await?;
    let java = ctx.java().ensure(config.java_version).await?;

    if args.detached {
        let session = detached.start(&config, &java).await?;
        println!(
            "server started in the background (pid {}), console log at {}",
            session.pid,
            detached.log_path().display()
        );
        return Ok(());
    }

    let status = launch::run_server(&config, &java).await?;
    info!("Server exited with {}", status);
    println!("server exited ({status})");
    Ok(())
}

async fn status(ctx: &AppContext) -> CraftResult<()> {
    match Detached::new(ctx.root()).running().await? {
        Some(info) => {
            println!("running (pid {})", info.pid);
            println!("memory: {}", human_size(info.memory));
            let started = info.started.with_timezone(&chrono::Local);
            println!("started: {}", started.format("%Y-%m-%d %H:%M:%S"));
            println!("uptime: {}", human_duration(info.uptime()));
        }
        None => println!("no detached server is running"),
    }
    Ok(())
}

async fn stop(ctx: &AppContext) -> CraftResult<()> {
    let info = Detached::new(ctx.root()).stop().await?;
    println!("stopped server (pid {}) after {}", info.pid, human_duration(info.uptime()));
    Ok(())
}

async fn query_server(ctx: &AppContext, args: QueryArgs) -> CraftResult<()> {
    let port_key = if args.query { "query.port" } else { "server-port" };
    let address = args
        .address
        .unwrap_or_else(|| ServerAddress::local(ctx.root(), port_key));
    let timeout = Duration::from_secs(args.timeout);

    if args.query {
        let stat = query::full_stat(&address, timeout).await?;
        for (key, value) in &stat.fields {
            println!("{key}: {value}");
        }
        println!("players: {}", stat.players.join(", "));
        return Ok(());
    }

    let status = query::status(&address, timeout).await?;
    println!("address: {address}");
    println!("version: {}", status.version.as_deref().unwrap_or("unknown"));
    if let Some(protocol) = status.protocol {
        println!("protocol: {protocol}");
    }
    println!("players: {}/{}", status.online, status.max);
    if !status.sample.is_empty() {
        println!("online: {}", status.sample.join(", "));
    }
    println!("motd: {}", status.motd);
    println!("latency: {} ms", status.latency.as_millis());
    Ok(())
}

async fn lookup(ctx: &AppContext, args: LookupArgs) -> CraftResult<()> {
    let profile = ctx.mojang().profile(&args.player).await?;
    let uuid = profile.dashed_id();
    println!("name: {}", profile.name);
    println!("uuid: {}", uuid);

    let root = match ctx.load_config(None).await {
        Ok(config) => config.jar_dir(),
        Err(CraftError::NotInitialized { .. }) => return Ok(()),
        Err(e) => return Err(e),
    };

    for (file, label) in PLAYER_LISTS {
        let path = root.join(file);
        let listed = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<Value>(&raw)
                .map(|doc| listed_in(&doc, &uuid))
                .unwrap_or(false),
            Err(_) => false,
        };
        println!("{label}: {}", if listed { "yes" } else { "no" });
    }
    Ok(())
}

/// True when a player list document has an entry with `uuid`.
fn listed_in(doc: &Value, uuid: &str) -> bool {
    doc.as_array()
        .map(|entries| {
            entries.iter().any(|entry| {
                entry
                    .get("uuid")
                    .and_then(Value::as_str)
                    .map(|id| id.eq_ignore_ascii_case(uuid))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

async fn config(ctx: &AppContext, args: ConfigArgs) -> CraftResult<()> {
    let mut config = ctx.load_config(args.profile.profile.as_deref()).await?;
    let mut changed = false;

    if let Some(ram) = args.ram {
        if ram == 0 {
            return Err(CraftError::InvalidArgument("--ram must be positive".into()));
        }
        config.ram_mb = ram;
        changed = true;
    }
    if let Some(java) = args.java {
        config.java_version = java;
        changed = true;
    }
    if let Some(flags) = args.flags {
        config.extra_flags = flags;
        changed = true;
    }
    if let Some(extra) = args.args {
        config.extra_args = extra;
        changed = true;
    }

    if changed {
        config.save().await?;
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ── profiles ────────────────────────────────────────

async fn profile(ctx: &AppContext, command: ProfileCommand) -> CraftResult<()> {
    let profiles = ctx.profiles();
    match command {
        ProfileCommand::List => {
            println!("* {}", profiles.active().await?);
            for name in profiles.list().await? {
                println!("  {name}");
            }
        }
        ProfileCommand::Create { name } => {
            profiles.create(&name).await?;
            println!("created profile {name}, switch with `craftctl profile use {name}`");
        }
        ProfileCommand::Delete { name } => {
            profiles.delete(&name).await?;
            println!("deleted profile {name}");
        }
        ProfileCommand::Use { name } => {
            Detached::new(ctx.root()).ensure_stopped().await?;
            profiles.switch(&name).await?;
            println!("switched to profile {name}");
        }
    }
    Ok(())
}

// ── mods ────────────────────────────────────────────

fn mod_filter(identity: &JarIdentity) -> CraftResult<VersionFilter> {
    if identity.is_unknown() {
        return Err(CraftError::NotFound(
            "server type of the installation, mods need a known loader".into(),
        ));
    }
    Ok(VersionFilter::new(
        identity.server_type.loader_name(),
        identity.minecraft_version.clone(),
    ))
}

async fn installed_mods(
    ctx: &AppContext,
    config: &Config,
    filter: &VersionFilter,
) -> CraftResult<Vec<ModRecord>> {
    scan(&config.mods_dir(), &ctx.cache, ctx.registry.as_ref(), filter).await
}

async fn mods(ctx: &AppContext, command: ModsCommand) -> CraftResult<()> {
    let profile = match &command {
        ModsCommand::List(arg) => arg.profile.clone(),
        _ => None,
    };
    let config = ctx.load_config(profile.as_deref()).await?;
    let identity = ctx.identify(&config).await;

    match command {
        ModsCommand::List(_) => {
            let filter = mod_filter(&identity).unwrap_or_default();
            let records = installed_mods(ctx, &config, &filter).await?;
            print_mods(&records);
        }
        ModsCommand::Install { project } => {
            let filter = mod_filter(&identity)?;
            let records = installed_mods(ctx, &config, &filter).await?;
            let installer = ModInstaller::new(
                ctx.registry.as_ref(),
                ctx.downloader.clone(),
                filter,
                config.mods_dir(),
            );
            let report = installer.install(&project, &records).await?;
            for file in &report.installed {
                println!("installed {file}");
            }
            for dep in &report.already_present {
                println!("dependency {dep} already installed");
            }
            report_recovered(&report.failures);
        }
        ModsCommand::Uninstall { name } => {
            let filter = mod_filter(&identity).unwrap_or_default();
            let records = installed_mods(ctx, &config, &filter).await?;
            for file in uninstall(&name, &records).await? {
                println!("removed {file}");
            }
        }
        ModsCommand::Update => {
            let filter = mod_filter(&identity)?;
            let records = installed_mods(ctx, &config, &filter).await?;
            let installer = ModInstaller::new(
                ctx.registry.as_ref(),
                ctx.downloader.clone(),
                filter,
                config.mods_dir(),
            );
            let updated = installer.update(&records).await?;
            if updated.is_empty() {
                println!("all mods are up to date");
            }
            for (old, new) in updated {
                println!("updated {old} -> {new}");
            }
        }
        ModsCommand::Search { query } => {
            mod_filter(&identity)?;
            let facets = search_facets(
                &identity.server_type.loader_name(),
                &identity.minecraft_version,
            );
            for hit in ctx.registry.search(&query, &facets).await? {
                println!("{} ({}) by {}: {}", hit.title, hit.slug, hit.author, hit.description);
            }
        }
    }
    Ok(())
}

fn print_mods(records: &[ModRecord]) {
    let mut missing = 0;
    let mut outdated = 0;

    for record in records {
        match &record.info {
            Some(info) => {
                let status = if record.is_outdated() {
                    outdated += 1;
                    format!(
                        "outdated, latest {}",
                        info.latest_version_available.as_deref().unwrap_or("unknown")
                    )
                } else if info.latest_version_id.is_some() {
                    "latest".to_string()
                } else {
                    "no compatible release".to_string()
                };
                println!(
                    "{} {} [{}] ({}) {}",
                    info.title,
                    info.version,
                    info.license.as_deref().unwrap_or("unknown license"),
                    record.file_name,
                    status
                );
            }
            None => {
                missing += 1;
                println!("{} (no registry info)", record.file_name);
            }
        }
    }

    println!(
        "{} mods, {} without info, {} outdated",
        records.len(),
        missing,
        outdated
    );
}

// ── java / cache ────────────────────────────────────

async fn java(ctx: &AppContext, command: JavaCommand) -> CraftResult<()> {
    let manager = ctx.java();
    match command {
        JavaCommand::List => {
            for runtime in manager.installed().await? {
                println!("{} installed at {}", runtime.major, runtime.home.display());
            }
            match manager.available().await {
                Ok(releases) => {
                    let list: Vec<String> = releases
                        .available_releases
                        .iter()
                        .map(u32::to_string)
                        .collect();
                    println!("available: {} (LTS {})", list.join(", "), releases.most_recent_lts);
                }
                Err(e) => warn!("Could not list available runtimes: {}", e),
            }
        }
        JavaCommand::Install { major } => {
            let runtime = manager.install(major).await?;
            println!("installed Java {} at {}", major, runtime.home.display());
        }
        JavaCommand::Delete { major } => {
            manager.delete(major).await?;
            println!("deleted Java {major}");
        }
        JavaCommand::Use { major } => {
            let mut config = ctx.load_config(None).await?;
            manager.ensure(major).await?;
            config.java_version = major;
            config.save().await?;
            println!("using Java {major}");
        }
    }
    Ok(())
}

async fn cache(ctx: &AppContext, command: CacheCommand) -> CraftResult<()> {
    match command {
        CacheCommand::View => {
            let keys = ctx.cache.keys().await?;
            let size = ctx.cache.size().await?;
            println!("{} entries, {}", keys.len(), human_size(size));
        }
        CacheCommand::Clear => {
            let removed = ctx.cache.clear().await?;
            println!("removed {removed} entries");
        }
    }
    Ok(())
}

// ── backups ─────────────────────────────────────────

async fn backup(ctx: &AppContext, command: BackupCommand) -> CraftResult<()> {
    let store = BackupStore::new(ctx.root());
    match command {
        BackupCommand::Create { name, format } => {
            ctx.load_config(None).await?;
            let name = name.unwrap_or_else(default_name);
            let backup = store.create(&name, format).await?;
            println!(
                "created backup {} ({})",
                backup.path.display(),
                human_size(backup.size)
            );
        }
        BackupCommand::List => {
            let backups = store.list().await?;
            if backups.is_empty() {
                println!("no backups in {}", store.dir().display());
            }
            for backup in backups {
                println!(
                    "{} [{}] {} {}",
                    backup.name,
                    backup.format,
                    human_size(backup.size),
                    backup.created.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        BackupCommand::Restore { name } => {
            Detached::new(ctx.root()).ensure_stopped().await?;
            let backup = store.restore(&name).await?;
            println!("restored backup {} ({})", backup.name, backup.format);
        }
        BackupCommand::Delete { name } => {
            let backup = store.delete(&name).await?;
            println!("deleted backup {}", backup.name);
        }
    }
    Ok(())
}

fn report_recovered(failures: &[RecoverableFailure]) {
    for failure in failures {
        println!("warning: {failure}");
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn human_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {}s", secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn player_list_membership() {
        let ops = json!([
            {"uuid": "069a79f4-44e9-4726-a5be-fca90e38aaf5", "name": "Notch", "level": 4}
        ]);
        assert!(listed_in(&ops, "069A79F4-44E9-4726-A5BE-FCA90E38AAF5"));
        assert!(!listed_in(&ops, "853c80ef-3c37-49fd-aa49-938b674adae6"));
        assert!(!listed_in(&json!({}), "x"));
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn durations_are_humanized() {
        assert_eq!(human_duration(chrono::Duration::seconds(75)), "1m 15s");
        assert_eq!(human_duration(chrono::Duration::seconds(2 * 3600 + 300)), "2h 5m");
        assert_eq!(human_duration(chrono::Duration::seconds(90_061)), "1d 1h 1m");
        assert_eq!(human_duration(chrono::Duration::seconds(-5)), "0m 0s");
    }

    #[test]
    fn build_selection_by_label_or_newest() {
        let build = |id: u64, label: &str| Build {
            id,
            server_type: ServerType::Paper,
            build_number: id,
            name: String::new(),
            version_id: Some("1.21.1".into()),
            project_version_id: Some(label.into()),
            installation: Vec::new(),
        };
        let builds = vec![build(130, "130"), build(129, "129")];
        assert_eq!(pick_build(builds.clone(), None).unwrap().id, 130);
        assert_eq!(pick_build(builds.clone(), Some("129")).unwrap().id, 129);
        assert!(pick_build(builds, Some("1")).is_err());
    }
}
