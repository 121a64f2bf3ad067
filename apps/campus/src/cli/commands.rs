//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::BackupAction;
use campus_core::export::digest;
use campus_core::identity::NewUser;
use campus_core::primitives::MAX_BACKUP_SIZE;
use campus_core::storage::schema::SCHEMAS;
use campus_core::{
    Actor, Campus, CampusConfig, CampusError, CampusResult, Filter, MaintenanceReport, Role,
    Snapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CONTEXT
// =============================================================================

/// Resolved settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub database: PathBuf,
    pub config: CampusConfig,
    pub json_mode: bool,
}

impl CommandContext {
    /// Open (or create) the store.
    pub fn open(&self) -> CampusResult<Campus> {
        Campus::open(&self.database, self.config.clone())
    }

    fn print_json(&self, value: &impl serde::Serialize) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

/// Username and password of the operator running an admin command.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AdminCredentials {
    pub fn from_parts(username: Option<String>, password: Option<String>) -> CampusResult<Self> {
        let username = username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CampusError::Validation("--admin <username> is required".to_string()))?;
        let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
            CampusError::Validation(format!("{} must be set", super::ADMIN_PASSWORD_ENV))
        })?;
        Ok(Self { username, password })
    }

    /// Log in and require the admin role.
    pub fn sign_in(&self, campus: &Campus) -> CampusResult<Actor> {
        let login = campus.identity().login(&self.username, &self.password)?;
        let actor = campus.identity().authorize(&login.session)?;
        if !actor.is_admin() {
            campus.identity().logout(&login.session);
            return Err(CampusError::PermissionDenied(format!(
                "{} is not an admin",
                self.username
            )));
        }
        Ok(actor)
    }
}

/// Input for `user-add`.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: Option<String>,
    pub name: Option<String>,
}

// =============================================================================
// FILE HELPERS
// =============================================================================

/// The path with a canonical parent directory; the parent must exist.
fn validate_output_path(path: &Path) -> CampusResult<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        CampusError::Validation(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    let filename = path
        .file_name()
        .ok_or_else(|| CampusError::Validation("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

fn read_limited(path: &Path, max_size: usize) -> CampusResult<Vec<u8>> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        CampusError::Validation(format!("Cannot read '{}': {}", path.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(CampusError::Validation(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > max_size as u64 {
        return Err(CampusError::Validation(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    std::fs::read(path)
        .map_err(|e| CampusError::Validation(format!("Cannot read '{}': {}", path.display(), e)))
}

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Create the database. With `admin`, also register the first admin.
pub fn cmd_init(
    ctx: &CommandContext,
    force: bool,
    admin: Option<&AdminCredentials>,
    admin_email: Option<String>,
) -> CampusResult<()> {
    if ctx.database.exists() {
        if !force {
            return Err(CampusError::Validation(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database).map_err(|e| {
            CampusError::Storage(format!("Remove {}: {}", ctx.database.display(), e))
        })?;
        tracing::warn!(event = "database_replaced", path = %ctx.database.display());
    }

    let campus = ctx.open()?;
    println!("Initialized new database at {:?}", ctx.database);

    if let Some(admin) = admin {
        let email = admin_email.unwrap_or_else(|| format!("{}@campus.local", admin.username));
        let profile = campus.identity().register(NewUser {
            username: admin.username.clone(),
            password: admin.password.clone(),
            email,
            role: Some(Role::Admin),
            ..NewUser::default()
        })?;
        println!("Created admin '{}' ({})", profile.username, profile.id);
    }
    Ok(())
}

/// Schema version and per-collection counts.
pub fn cmd_status(ctx: &CommandContext) -> CampusResult<()> {
    let campus = ctx.open()?;
    let store = campus.store();
    let mut counts = serde_json::Map::new();
    for schema in SCHEMAS {
        counts.insert(
            schema.name.to_string(),
            store.count(schema.name, &Filter::All)?.into(),
        );
    }
    let version = store.schema_version()?;
    let backups = store.backups()?.len();

    if ctx.json_mode {
        ctx.print_json(&serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "schema_version": version,
            "collections": counts,
            "backups": backups,
        }));
        return Ok(());
    }

    println!("Campus Store Status");
    println!("===================");
    println!("Database:       {:?}", ctx.database);
    println!("Schema version: {}", version);
    println!();
    for (name, count) in &counts {
        println!("  {:<22} {}", name, count);
    }
    println!();
    println!("Backups: {}", backups);
    Ok(())
}

// =============================================================================
// ACCOUNTS / STATS
// =============================================================================

pub fn cmd_user_add(ctx: &CommandContext, account: NewAccount) -> CampusResult<()> {
    let campus = ctx.open()?;
    let profile = campus.identity().register(NewUser {
        username: account.username,
        password: account.password,
        email: account.email,
        role: Some(account.role),
        department: account.department,
        name: account.name,
        ..NewUser::default()
    })?;

    if ctx.json_mode {
        ctx.print_json(&profile);
    } else {
        println!(
            "Registered {} '{}' ({})",
            profile.role, profile.username, profile.id
        );
    }
    Ok(())
}

pub fn cmd_stats(ctx: &CommandContext, admin: &AdminCredentials) -> CampusResult<()> {
    let campus = ctx.open()?;
    let actor = admin.sign_in(&campus)?;
    let stats = campus.stats().system_stats(&actor)?;

    if ctx.json_mode {
        ctx.print_json(&stats);
        return Ok(());
    }
    println!("Campus Statistics");
    println!("=================");
    println!("Users:         {} ({} active)", stats.users_total, stats.users_active);
    for (role, count) in &stats.users_by_role {
        println!("  {:<18} {}", role, count);
    }
    println!("Attendance:    {}", stats.attendance_records);
    println!(
        "Mess:          {} menus, {} bookings, {} feedback",
        stats.menus, stats.bookings, stats.feedback
    );
    println!(
        "Career:        {} opportunities ({} active), {} applications",
        stats.opportunities_total, stats.opportunities_active, stats.applications
    );
    println!("Results:       {}", stats.result_records);
    println!(
        "Alerts:        {} ({} active)",
        stats.alerts_total, stats.alerts_active
    );
    println!("Log entries:   {}", stats.log_entries);
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

pub fn cmd_export(
    ctx: &CommandContext,
    admin: &AdminCredentials,
    output: &Path,
) -> CampusResult<()> {
    let validated_output = validate_output_path(output)?;
    let campus = ctx.open()?;
    let actor = admin.sign_in(&campus)?;
    let snapshot = campus.backups().export(&actor)?;
    let text = snapshot.to_json_pretty()?;
    std::fs::write(&validated_output, text.as_bytes())
        .map_err(|e| CampusError::Storage(format!("Write file: {}", e)))?;

    println!(
        "Exported {} records ({} bytes) to {:?}",
        snapshot.record_count(),
        text.len(),
        validated_output
    );
    Ok(())
}

pub fn cmd_import(ctx: &CommandContext, admin: &AdminCredentials, input: &Path) -> CampusResult<()> {
    let bytes = read_limited(input, MAX_BACKUP_SIZE)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| CampusError::Serialization(format!("Snapshot is not UTF-8: {}", e)))?;
    let snapshot = Snapshot::from_json(&text)?;

    let campus = ctx.open()?;
    let actor = admin.sign_in(&campus)?;
    let report = campus.backups().import(&actor, &snapshot)?;

    if ctx.json_mode {
        ctx.print_json(&report);
    } else {
        println!("Imported {} records", report.total());
        for name in &report.skipped_collections {
            println!("  skipped unknown collection '{}'", name);
        }
    }
    Ok(())
}

// =============================================================================
// BACKUP REGISTRY
// =============================================================================

pub fn cmd_backup(
    ctx: &CommandContext,
    admin: &AdminCredentials,
    action: BackupAction,
) -> CampusResult<()> {
    let campus = ctx.open()?;
    let actor = admin.sign_in(&campus)?;
    let backups = campus.backups();

    match action {
        BackupAction::Create => {
            let info = backups.create_backup(&actor)?;
            if ctx.json_mode {
                ctx.print_json(&info);
            } else {
                println!(
                    "Created {} ({} records, {} bytes)",
                    info.id, info.record_count, info.size_bytes
                );
            }
        }
        BackupAction::List => {
            let infos = backups.list_backups(&actor)?;
            if ctx.json_mode {
                ctx.print_json(&infos);
            } else if infos.is_empty() {
                println!("No backups");
            } else {
                for info in &infos {
                    println!(
                        "{:<32} {}  {:>8} records  {:>10} bytes",
                        info.id,
                        info.exported_at.to_rfc3339(),
                        info.record_count,
                        info.size_bytes
                    );
                }
            }
        }
        BackupAction::Restore { id } => {
            let report = backups.restore_backup(&actor, &id)?;
            if ctx.json_mode {
                ctx.print_json(&report);
            } else {
                println!("Restored {} records from {}", report.total(), id);
            }
        }
        BackupAction::Delete { id } => {
            backups.delete_backup(&actor, &id)?;
            println!("Deleted {}", id);
        }
        BackupAction::Hash { id } => {
            let hash = digest(&backups.backup_bytes(&actor, &id)?);
            if ctx.json_mode {
                ctx.print_json(&serde_json::json!({ "id": id, "blake3": hash }));
            } else {
                println!("BLAKE3: {}", hash);
            }
        }
    }
    Ok(())
}

// =============================================================================
// MAINTENANCE
// =============================================================================

fn print_report(report: &MaintenanceReport, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string(report).unwrap_or_default()
        );
        return;
    }
    println!(
        "Maintenance: {} alerts expired, {} log entries trimmed, {} menus and {} opportunities reconciled, {} sessions purged",
        report.alerts_expired,
        report.log_entries_trimmed,
        report.menus_reconciled,
        report.opportunities_reconciled,
        report.sessions_purged
    );
    for error in &report.errors {
        println!("  error: {}", error);
    }
}

/// One maintenance pass.
pub fn cmd_sweep(ctx: &CommandContext) -> CampusResult<()> {
    let campus = ctx.open()?;
    let report = campus.run_maintenance();
    print_report(&report, ctx.json_mode);
    Ok(())
}

/// Run maintenance every `interval` seconds (or the configured interval)
/// until Ctrl-C. Missed ticks are skipped, not replayed.
pub async fn cmd_maintain(ctx: &CommandContext, interval: Option<u64>) -> CampusResult<()> {
    let period = match interval {
        Some(0) => {
            return Err(CampusError::Validation(
                "interval must be positive".to_string(),
            ));
        }
        Some(secs) => Duration::from_secs(secs),
        None => ctx.config.maintenance_interval(),
    };
    let campus = Arc::new(ctx.open()?);
    tracing::info!(event = "maintenance_scheduled", interval_secs = period.as_secs());
    if !ctx.json_mode {
        println!("Running maintenance every {}s. Press Ctrl+C to stop", period.as_secs());
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let worker = Arc::clone(&campus);
                match tokio::task::spawn_blocking(move || worker.run_maintenance()).await {
                    Ok(report) => print_report(&report, ctx.json_mode),
                    Err(e) => tracing::error!(event = "maintenance_task_failed", error = %e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(event = "maintenance_stopped");
                break;
            }
        }
    }
    Ok(())
}
