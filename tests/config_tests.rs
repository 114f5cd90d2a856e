use confdir::{ConfigError, ConfigRegistry, JsonSerializer, Serializer, TomlSerializer};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_config_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Registry without background refresh, usable outside a runtime
fn registry(dir: &TempDir) -> ConfigRegistry {
    ConfigRegistry::new(dir.path(), Duration::ZERO).expect("Failed to create registry")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct BasicConfig {
    name: String,
    count: u32,
    enabled: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            name: "default_name".to_string(),
            count: 42,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StrictConfig {
    required_field: String,
    also_required: u32,
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            required_field: "default".to_string(),
            also_required: 0,
        }
    }
}

#[test]
fn test_missing_directory_is_created() {
    let temp_dir = temp_config_dir();
    let config_dir = temp_dir.path().join("nested").join("config");

    ConfigRegistry::new(&config_dir, Duration::ZERO).expect("Failed to create registry");

    assert!(config_dir.is_dir(), "Config directory should be created");
}

#[test]
fn test_base_path_that_is_a_file_is_rejected() {
    let temp_dir = temp_config_dir();
    let file_path = temp_dir.path().join("not_a_dir");
    fs::write(&file_path, "").expect("Failed to write file");

    let result = ConfigRegistry::new(&file_path, Duration::ZERO);

    match result {
        Err(ConfigError::InvalidPath { path, expected }) => {
            assert_eq!(path, file_path);
            assert_eq!(expected, "directory");
        }
        other => panic!("Expected InvalidPath error, got {other:?}"),
    }
}

#[test]
fn test_load_creates_default_config_file() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    let config_path = temp_dir.path().join("basic.toml");
    assert!(
        !config_path.exists(),
        "Config file should not exist before loading"
    );

    let handle = registry
        .load("basic", TomlSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    assert!(
        config_path.exists(),
        "Config file should be created after loading"
    );
    assert_eq!(*handle.cache(), BasicConfig::default());

    let on_disk: BasicConfig =
        toml::from_str(&fs::read_to_string(&config_path).unwrap()).expect("Invalid TOML");
    assert_eq!(on_disk, BasicConfig::default());
}

#[test]
fn test_load_existing_config_file() {
    let temp_dir = temp_config_dir();
    let config_path = temp_dir.path().join("basic.toml");

    let content = r#"
name = "preexisting"
count = 999
enabled = false
"#;
    fs::write(&config_path, content).expect("Failed to write config file");

    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", TomlSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let config = handle.cache();
    assert_eq!(config.name, "preexisting");
    assert_eq!(config.count, 999);
    assert!(!config.enabled);

    // An existing file is never overwritten by the default
    assert_eq!(fs::read_to_string(&config_path).unwrap(), content);
}

#[test]
fn test_load_twice_returns_same_handle() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    let first = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");
    let second = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.path(), second.path());
    assert_eq!(first.read_now().unwrap(), second.cache());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_load_with_other_type_is_type_mismatch() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let result = registry.load("basic", JsonSerializer::<Vec<String>>::new());

    assert!(matches!(
        result,
        Err(ConfigError::TypeMismatch { ref name, .. }) if name == "basic"
    ));
}

#[test]
fn test_get_returns_loaded_handle() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    let loaded = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");
    let fetched = registry
        .get::<BasicConfig>("basic")
        .expect("Failed to get config");

    assert!(Arc::ptr_eq(&loaded, &fetched));
    assert_eq!(fetched.cache().name, "default_name");
    assert_eq!(fetched.cache().count, 42);
}

#[test]
fn test_get_unknown_config_returns_not_loaded() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    let result = registry.get::<BasicConfig>("unknown");

    if let Err(ConfigError::NotLoaded(name)) = result {
        assert_eq!(name, "unknown");
    } else {
        panic!("Expected NotLoaded error");
    }
}

#[test]
fn test_get_with_wrong_type_returns_type_mismatch() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);

    registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let result = registry.get::<StrictConfig>("basic");

    assert!(matches!(result, Err(ConfigError::TypeMismatch { .. })));
}

#[test]
fn test_config_path_that_is_a_directory_is_rejected() {
    let temp_dir = temp_config_dir();
    fs::create_dir(temp_dir.path().join("basic.json")).expect("Failed to create dir");

    let registry = registry(&temp_dir);
    let result = registry.load("basic", JsonSerializer::<BasicConfig>::new());

    assert!(matches!(
        result,
        Err(ConfigError::InvalidPath { expected: "file", .. })
    ));
    assert!(!registry.contains("basic"));
}

#[test]
fn test_write_now_persists_changes() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", TomlSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let updated = BasicConfig {
        name: "updated_name".to_string(),
        count: 100,
        enabled: false,
    };
    handle
        .write_now(updated.clone())
        .expect("Failed to write config");

    // Verify in memory
    assert_eq!(*handle.cache(), updated);
    assert_eq!(*handle.read_now().unwrap(), updated);

    // Verify on disk with a fresh registry
    let new_registry = registry_for(temp_dir.path());
    let reloaded = new_registry
        .load("basic", TomlSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    assert_eq!(*reloaded.cache(), updated);
}

fn registry_for(path: &std::path::Path) -> ConfigRegistry {
    ConfigRegistry::new(path, Duration::ZERO).expect("Failed to create registry")
}

#[test]
fn test_external_change_is_picked_up_by_read_now() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::write(
        handle.path(),
        r#"{"name":"external","count":1,"enabled":false}"#,
    )
    .expect("Failed to write config file");

    // Cache only changes on the next read
    assert_eq!(handle.cache().name, "default_name");

    let config = handle.read_now().expect("Failed to read config");
    assert_eq!(config.name, "external");
    assert_eq!(handle.cache().name, "external");
}

#[test]
fn test_multiple_sequential_modifies() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    for i in 0..5 {
        handle
            .modify(|cfg| {
                cfg.count = i;
                Ok(())
            })
            .expect("Failed to modify config");

        assert_eq!(handle.cache().count, i);
        assert_eq!(handle.read_now().unwrap().count, i);
    }
}

#[test]
fn test_atomic_save_creates_no_temp_files() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    handle
        .modify(|cfg| {
            cfg.name = "atomic_test".to_string();
            Ok(())
        })
        .expect("Failed to modify config");

    let mut names: Vec<_> = fs::read_dir(temp_dir.path())
        .expect("Failed to read dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names, vec![".basic.json.lock", "basic.json"]);
}

#[test]
fn test_missing_fields_get_defaults_with_serde_default() {
    let temp_dir = temp_config_dir();
    let config_path = temp_dir.path().join("basic.toml");
    fs::write(&config_path, "name = \"partial\"\n").expect("Failed to write config file");

    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", TomlSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let config = handle.cache();
    assert_eq!(config.name, "partial");
    assert_eq!(config.count, 42);
    assert!(config.enabled);
}

#[test]
fn test_missing_fields_without_serde_default_fails() {
    let temp_dir = temp_config_dir();
    let config_path = temp_dir.path().join("strict.toml");
    fs::write(&config_path, "required_field = \"present\"\n")
        .expect("Failed to write config file");

    let registry = registry(&temp_dir);
    let result = registry.load("strict", TomlSerializer::<StrictConfig>::new());

    assert!(
        matches!(result, Err(ref e) if e.is_format()),
        "Loading config with missing required field should fail"
    );
    assert!(
        !registry.contains("strict"),
        "A failed load should not register the config"
    );
}

#[test]
fn test_validate_accepting_leaves_file_untouched() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");
    let before = fs::read(handle.path()).unwrap();
    let modified_before = fs::metadata(handle.path()).unwrap().modified().unwrap();

    let mut calls = 0;
    let repaired = handle
        .validate(|current| {
            calls += 1;
            assert_eq!(current, Some(&BasicConfig::default()));
            None
        })
        .expect("Failed to validate config");

    assert!(!repaired);
    assert_eq!(calls, 1);
    assert_eq!(fs::read(handle.path()).unwrap(), before);
    assert_eq!(
        fs::metadata(handle.path()).unwrap().modified().unwrap(),
        modified_before
    );
    assert_eq!(*handle.cache(), BasicConfig::default());
}

#[test]
fn test_validate_repairs_invalid_value() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::write(
        handle.path(),
        r#"{"name":"","count":0,"enabled":true}"#,
    )
    .unwrap();

    let repaired = handle
        .validate(|current| match current {
            Some(cfg) if !cfg.name.is_empty() => None,
            Some(cfg) => Some(BasicConfig {
                name: "repaired".to_string(),
                ..cfg.clone()
            }),
            None => Some(BasicConfig::default()),
        })
        .expect("Failed to validate config");

    assert!(repaired);
    assert_eq!(handle.cache().name, "repaired");
    assert_eq!(handle.cache().count, 0);
    assert_eq!(handle.read_now().unwrap().name, "repaired");
}

#[test]
fn test_validate_recovers_malformed_file() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::write(handle.path(), "{ definitely not json").unwrap();
    assert!(handle.read_now().unwrap_err().is_format());

    let repaired = handle
        .validate(|current| match current {
            Some(_) => None,
            None => Some(BasicConfig::default()),
        })
        .expect("Failed to validate config");

    assert!(repaired);
    assert_eq!(*handle.read_now().unwrap(), BasicConfig::default());
}

#[test]
fn test_refresh_all_skips_broken_files() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let first = registry
        .load("first", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");
    let second = registry
        .load("second", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::write(first.path(), "broken").unwrap();
    fs::write(
        second.path(),
        r#"{"name":"fresh","count":7,"enabled":true}"#,
    )
    .unwrap();

    let failures = registry.refresh_all();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "first");
    assert!(failures[0].1.is_format());

    // Broken config keeps its last good value, the other one is refreshed
    assert_eq!(*first.cache(), BasicConfig::default());
    assert_eq!(second.cache().name, "fresh");
}

#[test]
fn test_refresh_all_reports_deleted_file_as_io() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("gone", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::remove_file(handle.path()).unwrap();
    let failures = registry.refresh_all();

    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.is_io());
    assert_eq!(*handle.cache(), BasicConfig::default());
}

#[test]
fn test_failed_write_now_keeps_cache() {
    let temp_dir = temp_config_dir();
    let config_dir = temp_dir.path().join("config");
    let registry = registry_for(&config_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    fs::remove_dir_all(&config_dir).expect("Failed to remove config dir");

    let changed = BasicConfig {
        name: "lost".to_string(),
        ..BasicConfig::default()
    };
    let err = handle.write_now(changed).unwrap_err();

    assert!(err.is_io(), "Expected I/O error, got {err:?}");
    assert_eq!(*handle.cache(), BasicConfig::default());
}

#[cfg(unix)]
#[test]
fn test_unwritable_directory_is_permission_error() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = temp_config_dir();
    let config_dir = temp_dir.path().join("locked");
    fs::create_dir(&config_dir).unwrap();
    fs::set_permissions(&config_dir, fs::Permissions::from_mode(0o555)).unwrap();

    // Root bypasses directory permissions
    let is_root = fs::write(config_dir.join("write_check"), b"").is_ok();
    let result = ConfigRegistry::new(&config_dir, Duration::ZERO);
    fs::set_permissions(&config_dir, fs::Permissions::from_mode(0o755)).unwrap();

    if is_root {
        return;
    }
    assert!(matches!(result, Err(ConfigError::Permission(ref path)) if path == &config_dir));
}

#[cfg(unix)]
#[test]
fn test_failed_seed_is_retried_on_next_load() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let config_path = temp_dir.path().join("basic.json");

    fs::set_permissions(temp_dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
    let result = registry.load("basic", JsonSerializer::<BasicConfig>::new());
    fs::set_permissions(temp_dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

    if result.is_ok() {
        return;
    }
    assert!(!config_path.exists(), "Failed seed must not leave a file behind");
    assert!(!registry.contains("basic"));

    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");
    assert_eq!(*handle.cache(), BasicConfig::default());
}

/// Serializer counting how often its default value is produced
#[derive(Default)]
struct CountingSerializer {
    seeded: Arc<AtomicUsize>,
}

impl Serializer for CountingSerializer {
    type Value = BasicConfig;

    fn extension(&self) -> &str {
        "json"
    }

    fn default_value(&self) -> BasicConfig {
        self.seeded.fetch_add(1, Ordering::SeqCst);
        BasicConfig::default()
    }

    fn encode(&self, value: &BasicConfig) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<BasicConfig, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[test]
fn test_default_value_is_produced_only_when_seeding() {
    let temp_dir = temp_config_dir();
    fs::write(
        temp_dir.path().join("existing.json"),
        r#"{"name":"on_disk","count":1,"enabled":false}"#,
    )
    .unwrap();
    let registry = registry(&temp_dir);
    let seeded = Arc::new(AtomicUsize::new(0));
    let counting = || CountingSerializer {
        seeded: Arc::clone(&seeded),
    };

    registry.load("existing", counting()).expect("Failed to load config");
    assert_eq!(seeded.load(Ordering::SeqCst), 0);

    registry.load("fresh", counting()).expect("Failed to load config");
    assert_eq!(seeded.load(Ordering::SeqCst), 1);

    registry.load("fresh", counting()).expect("Failed to load config");
    assert_eq!(seeded.load(Ordering::SeqCst), 1);
}

#[test]
fn test_refresh_waits_for_validate_to_finish() {
    let temp_dir = temp_config_dir();
    let registry = registry(&temp_dir);
    let handle = registry
        .load("basic", JsonSerializer::<BasicConfig>::new())
        .expect("Failed to load config");

    let barrier = Barrier::new(2);
    let events = Mutex::new(Vec::new());

    thread::scope(|scope| {
        scope.spawn(|| {
            handle
                .validate(|_| {
                    barrier.wait();
                    thread::sleep(Duration::from_millis(200));
                    events.lock().unwrap().push("checked");
                    Some(BasicConfig {
                        count: 7,
                        ..BasicConfig::default()
                    })
                })
                .expect("Failed to validate");
        });

        scope.spawn(|| {
            barrier.wait();
            assert!(registry.refresh_all().is_empty());
            events.lock().unwrap().push("refreshed");
        });
    });

    assert_eq!(*events.lock().unwrap(), vec!["checked", "refreshed"]);
    assert_eq!(handle.cache().count, 7);
}
