mod support;

use chrono::Duration;
use gist_sync::{MANIFEST_FILENAME, MemoryContainer, PushStatus, TokenSource};
use support::{count_records, fixed_now, seed_own_store, setup_app, setup_app_with};
use usage_app::{SyncConfig, TOKEN_ENV_VAR, TokenLocation, TokenManager};

#[test]
fn push_from_one_app_and_pull_into_another() {
    let laptop = setup_app("laptop");
    let desktop = setup_app("desktop");
    seed_own_store(&laptop, 40);
    let remote = MemoryContainer::new();

    let sync = &laptop.state.services.sync;
    let options = sync.push_options(false, false, None);
    let pushed = sync
        .push_with(&remote, options, fixed_now())
        .expect("push");
    assert_eq!(pushed.status, PushStatus::Success);
    assert_eq!(pushed.exported_records, 40);

    let pulled = desktop
        .state
        .services
        .sync
        .pull_with(&remote, None)
        .expect("pull");
    assert_eq!(pulled.totals.new_records, 40);
    assert_eq!(count_records(&desktop, "laptop"), 40);

    let machines = desktop.state.services.sync.machines(false).expect("machines");
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].machine_name, "laptop");
}

#[test]
fn second_push_without_new_records_is_a_no_op() {
    let laptop = setup_app("laptop");
    seed_own_store(&laptop, 5);
    let remote = MemoryContainer::new();
    let sync = &laptop.state.services.sync;
    let options = sync.push_options(false, false, None);

    sync.push_with(&remote, options, fixed_now()).expect("first push");
    let later = fixed_now() + Duration::days(1);
    let second = sync.push_with(&remote, options, later).expect("second push");
    assert_eq!(second.status, PushStatus::NothingToSync);
}

#[test]
fn backup_flag_overrides_config_default() {
    let app = setup_app_with(SyncConfig {
        machine_name: Some("laptop".to_string()),
        create_backup: true,
        ..SyncConfig::default()
    });
    let sync = &app.state.services.sync;
    assert!(sync.push_options(false, false, None).create_backup);
    assert!(!sync.push_options(false, false, Some(false)).create_backup);

    let options = sync.push_options(true, true, None);
    assert!(options.force);
    assert!(options.skip_conflict_check);
}

#[test]
fn exported_file_imports_into_another_machine_store() {
    let laptop = setup_app("laptop");
    seed_own_store(&laptop, 12);
    let output = laptop._dir.path().join("out").join("bundle.json");

    let summary = laptop
        .state
        .services
        .sync
        .export_to_file(&output, None)
        .expect("export");
    assert_eq!(summary.records, 12);
    assert_eq!(summary.machine_name, "laptop");
    assert!(output.exists());

    let desktop = setup_app("desktop");
    let sync = &desktop.state.services.sync;
    let preview = sync.import_file(&output, None, true).expect("dry run");
    assert_eq!(preview.new_records, 12);
    assert!(!desktop.state.config.layout().store_path("laptop").exists());

    let first = sync
        .import_file(&output, Some("archive"), false)
        .expect("import");
    assert_eq!(first.new_records, 12);
    let again = sync
        .import_file(&output, Some("archive"), false)
        .expect("reimport");
    assert_eq!(again.new_records, 0);
    assert_eq!(again.duplicate_records, 12);
    assert_eq!(count_records(&desktop, "archive"), 12);
}

#[test]
fn import_files_continues_past_a_bad_file() {
    let laptop = setup_app("laptop");
    seed_own_store(&laptop, 3);
    let good = laptop._dir.path().join("good.json");
    laptop
        .state
        .services
        .sync
        .export_to_file(&good, None)
        .expect("export");
    let bad = laptop._dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").expect("write bad file");
    let missing = laptop._dir.path().join("missing.json");

    let desktop = setup_app("desktop");
    let report = desktop
        .state
        .services
        .sync
        .import_files(&[bad, good, missing], None, false);
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.files_failed(), 2);
    assert_eq!(report.totals.new_records, 3);
}

#[test]
fn status_cache_is_reused_while_fresh() {
    let laptop = setup_app("laptop");
    seed_own_store(&laptop, 2);
    let remote = MemoryContainer::new();
    let sync = &laptop.state.services.sync;
    sync.push_with(&remote, sync.push_options(false, false, None), fixed_now())
        .expect("push");

    let ttl = Duration::minutes(5);
    let first = sync
        .status_cached_with(&remote, None, ttl, fixed_now())
        .expect("status");
    assert_eq!(first.fetched_at, fixed_now());
    let remote_status = first.status.sync.remote.as_ref().expect("remote status");
    assert_eq!(remote_status.machine_total_records, Some(2));

    let soon = fixed_now() + Duration::minutes(1);
    let reused = sync
        .status_cached_with(&remote, Some(first.clone()), ttl, soon)
        .expect("cached status");
    assert_eq!(reused.fetched_at, fixed_now());

    let later = fixed_now() + Duration::minutes(10);
    let refreshed = sync
        .status_cached_with(&remote, Some(first), ttl, later)
        .expect("fresh status");
    assert_eq!(refreshed.fetched_at, later);
}

#[test]
fn token_manager_stores_and_deletes_token_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config").join("token");
    let tokens = TokenManager::with_env_var("USAGE_APP_TEST_TOKEN_NEVER_SET", &path);

    assert_eq!(tokens.get_token(), None);
    assert_eq!(tokens.location(), TokenLocation::NotConfigured);
    assert!(tokens.set_token("   ").is_err());

    tokens.set_token(" ghp_example \n").expect("set token");
    assert_eq!(tokens.get_token().as_deref(), Some("ghp_example"));
    assert_eq!(tokens.location(), TokenLocation::File(path.clone()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    assert!(tokens.delete_token().expect("delete"));
    assert!(!tokens.delete_token().expect("delete again"));
    assert_eq!(tokens.get_token(), None);
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let config: SyncConfig =
        serde_json::from_str(r#"{ "machine_name": "laptop", "create_backup": true }"#)
            .expect("parse config");
    let defaults = SyncConfig::default();
    assert_eq!(config.machine_name.as_deref(), Some("laptop"));
    assert!(config.create_backup);
    assert_eq!(config.api_base, "https://api.github.com");
    assert_eq!(config.max_file_size_bytes, defaults.max_file_size_bytes);
    assert_eq!(config.backup_retention_days, 30);
    assert_eq!(config.conflict_retries, 3);
    assert_eq!(config.retry_attempts, 3);
    assert!(!defaults.create_backup);
}

#[test]
fn container_info_lists_pushed_files() {
    let laptop = setup_app("laptop");
    let remote = MemoryContainer::new();
    let sync = &laptop.state.services.sync;
    assert!(sync.container_info_with(&remote).expect("info").is_none());

    seed_own_store(&laptop, 3);
    sync.push_with(&remote, sync.push_options(false, false, None), fixed_now())
        .expect("push");
    let container = sync
        .container_info_with(&remote)
        .expect("info")
        .expect("container");
    assert!(container.has_file(MANIFEST_FILENAME));
    assert!(container.has_file("usage_data_laptop.json"));
    assert!(container.files.iter().all(|file| file.size.is_some()));
}

#[test]
fn status_without_token_reads_local_state() {
    if std::env::var(TOKEN_ENV_VAR).is_ok() {
        return;
    }
    let laptop = setup_app("laptop");
    seed_own_store(&laptop, 2);
    let remote = MemoryContainer::new();
    let sync = &laptop.state.services.sync;
    let pushed = sync
        .push_with(&remote, sync.push_options(false, false, None), fixed_now())
        .expect("push");

    let status = sync.status().expect("status");
    assert_eq!(status.token, TokenLocation::NotConfigured);
    assert_eq!(status.sync.machine_name, "laptop");
    assert_eq!(status.sync.container_id, pushed.container_id);
    assert!(status.sync.last_local_export.is_some());
    assert!(status.sync.remote.is_none());
}
