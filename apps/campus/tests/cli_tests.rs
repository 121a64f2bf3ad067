//! CLI parsing, config loading and command round trips against a temp store.

#![allow(clippy::unwrap_used, clippy::panic)]

use campus::cli::{
    AdminCredentials, BackupAction, Cli, CommandContext, Commands, NewAccount, cmd_backup,
    cmd_export, cmd_import, cmd_init, cmd_stats, cmd_status, cmd_sweep, cmd_user_add,
};
use campus::config::{AppConfig, DEFAULT_DATABASE};
use campus_core::{Campus, CampusConfig, CampusError, Role};
use clap::Parser;
use std::path::PathBuf;

fn context(dir: &tempfile::TempDir) -> CommandContext {
    CommandContext {
        database: dir.path().join("campus.redb"),
        config: CampusConfig {
            password_cost: 4,
            ..CampusConfig::default()
        },
        json_mode: false,
    }
}

fn root() -> AdminCredentials {
    AdminCredentials::from_parts(Some("root".into()), Some("s3cret-pw".into())).unwrap()
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn parses_backup_restore() {
    let cli = Cli::try_parse_from(["campus", "--admin", "root", "backup", "restore", "backup_1"])
        .unwrap();
    assert_eq!(cli.admin.as_deref(), Some("root"));
    match cli.command {
        Some(Commands::Backup {
            action: BackupAction::Restore { id },
        }) => assert_eq!(id, "backup_1"),
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn parses_roles_and_rejects_unknown() {
    let cli = Cli::try_parse_from([
        "campus", "user-add", "-u", "ana", "-e", "ana@campus.edu", "-r", "mess-staff",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::UserAdd {
            role: Role::MessStaff,
            ..
        })
    ));

    assert!(
        Cli::try_parse_from(["campus", "user-add", "-u", "a", "-e", "a@b", "-r", "dean"]).is_err()
    );
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["campus", "status", "--json-mode", "-D", "/tmp/x.redb"]).unwrap();
    assert!(cli.json_mode);
    assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.redb")));
}

// =============================================================================
// CONFIG
// =============================================================================

#[test]
fn partial_toml_keeps_defaults() {
    let config = AppConfig::from_toml_str(
        r#"
        database = "data/campus.redb"

        [campus]
        activity_log_cap = 50
        "#,
    )
    .unwrap();
    assert_eq!(config.database, Some(PathBuf::from("data/campus.redb")));
    assert_eq!(config.campus.activity_log_cap, 50);
    assert_eq!(config.campus.session_ttl_hours, 24);
}

#[test]
fn bad_toml_is_a_validation_error() {
    assert!(matches!(
        AppConfig::from_toml_str("unknown_key = 1"),
        Err(CampusError::Validation(_))
    ));
    assert!(matches!(
        AppConfig::from_toml_str("[campus]\npassword_cost = 0"),
        Err(CampusError::Validation(_))
    ));
    assert!(matches!(
        AppConfig::from_toml_str("[campus]\nsession_ttl_hours = 9223372036854775807"),
        Err(CampusError::Validation(_))
    ));
}

#[test]
fn load_reads_file_and_defaults_without_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campus.toml");
    std::fs::write(&path, "[campus]\nmaintenance_interval_secs = 60\n").unwrap();

    let loaded = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded.campus.maintenance_interval_secs, 60);
    assert_eq!(AppConfig::load(None).unwrap(), AppConfig::default());
    assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
}

#[test]
fn database_path_precedence() {
    let config = AppConfig {
        database: Some(PathBuf::from("from-file.redb")),
        ..AppConfig::default()
    };
    let flag = Some(PathBuf::from("from-flag.redb"));
    let env = Some("from-env.redb".to_string());

    assert_eq!(
        config.database_path(flag.clone(), env.clone()),
        PathBuf::from("from-flag.redb")
    );
    assert_eq!(
        config.database_path(None, env),
        PathBuf::from("from-env.redb")
    );
    assert_eq!(
        config.database_path(None, Some("  ".into())),
        PathBuf::from("from-file.redb")
    );
    assert_eq!(
        AppConfig::default().database_path(None, None),
        PathBuf::from(DEFAULT_DATABASE)
    );
}

#[test]
fn admin_credentials_need_both_parts() {
    assert!(AdminCredentials::from_parts(None, Some("pw".into())).is_err());
    assert!(AdminCredentials::from_parts(Some("root".into()), None).is_err());
    let creds = root();
    assert!(!format!("{:?}", creds).contains("s3cret"));
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn init_refuses_existing_database_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    cmd_init(&ctx, false, None, None).unwrap();
    assert!(ctx.database.exists());
    assert!(cmd_init(&ctx, false, None, None).is_err());
    cmd_init(&ctx, true, None, None).unwrap();
}

#[test]
fn admin_commands_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    let admin = root();

    cmd_init(&ctx, false, Some(&admin), Some("root@campus.edu".into())).unwrap();
    cmd_user_add(
        &ctx,
        NewAccount {
            username: "ana".into(),
            email: "ana@campus.edu".into(),
            password: "ana-password".into(),
            role: Role::Student,
            department: Some("cse".into()),
            name: None,
        },
    )
    .unwrap();
    cmd_status(&ctx).unwrap();
    cmd_stats(&ctx, &admin).unwrap();

    let snapshot_path = dir.path().join("snapshot.json");
    cmd_export(&ctx, &admin, &snapshot_path).unwrap();
    let text = std::fs::read_to_string(&snapshot_path).unwrap();
    assert!(text.contains("\"ana\""));
    assert!(!text.contains("$scrypt$"));
    cmd_import(&ctx, &admin, &snapshot_path).unwrap();

    cmd_backup(&ctx, &admin, BackupAction::Create).unwrap();
    cmd_backup(&ctx, &admin, BackupAction::List).unwrap();
    cmd_sweep(&ctx).unwrap();

    let campus = Campus::open(&ctx.database, ctx.config.clone()).unwrap();
    let actor = admin.sign_in(&campus).unwrap();
    let backups = campus.backups().list_backups(&actor).unwrap();
    assert_eq!(backups.len(), 1);
    drop(campus);

    let id = backups[0].id.clone();
    cmd_backup(&ctx, &admin, BackupAction::Hash { id: id.clone() }).unwrap();
    cmd_backup(&ctx, &admin, BackupAction::Restore { id: id.clone() }).unwrap();
    cmd_backup(&ctx, &admin, BackupAction::Delete { id: id.clone() }).unwrap();
    assert!(cmd_backup(&ctx, &admin, BackupAction::Delete { id }).is_err());
}

#[test]
fn non_admin_cannot_run_admin_commands() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    cmd_init(&ctx, false, None, None).unwrap();
    cmd_user_add(
        &ctx,
        NewAccount {
            username: "ana".into(),
            email: "ana@campus.edu".into(),
            password: "ana-password".into(),
            role: Role::Student,
            department: None,
            name: None,
        },
    )
    .unwrap();

    let ana = AdminCredentials::from_parts(Some("ana".into()), Some("ana-password".into())).unwrap();
    assert!(matches!(
        cmd_stats(&ctx, &ana),
        Err(CampusError::PermissionDenied(_))
    ));
    assert!(matches!(
        cmd_stats(&ctx, &root()),
        Err(CampusError::NotFound { .. })
    ));
}

#[test]
fn export_needs_existing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);
    cmd_init(&ctx, false, Some(&root()), None).unwrap();
    let nowhere = dir.path().join("no-such-dir").join("out.json");
    assert!(cmd_export(&ctx, &root(), &nowhere).is_err());
}
