use std::fs;

use webcarbon::config::{ConfigStore, TrackerConfig, DEFAULT_GRID_API_URL};

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("config.json")).unwrap();

    assert_eq!(store.config(), TrackerConfig::default());
    assert_eq!(store.config().grid_api_url, DEFAULT_GRID_API_URL);
    assert_eq!(store.config().fallback_zone, "DE");
}

#[test]
fn invalid_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "not json at all").unwrap();

    let store = ConfigStore::new(path).unwrap();
    assert_eq!(store.config(), TrackerConfig::default());
}

#[test]
fn token_update_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let store = ConfigStore::new(path.clone()).unwrap();
    store.set_grid_token(Some("abc123".into())).unwrap();
    assert_eq!(store.config().grid_token(), Some("abc123"));

    let reopened = ConfigStore::new(path.clone()).unwrap();
    assert_eq!(reopened.config().grid_token(), Some("abc123"));

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"gridApiToken\""));
}

#[test]
fn update_changes_several_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let store = ConfigStore::new(path.clone()).unwrap();

    store
        .update(|config| {
            config.fallback_zone = "SE".into();
            config.default_device_watts = 65.0;
            config.refresh_interval_secs = 120;
        })
        .unwrap();

    let reopened = ConfigStore::new(path).unwrap().config();
    assert_eq!(reopened.fallback_zone, "SE");
    assert_eq!(reopened.device_watts(), 65.0);
    assert_eq!(reopened.refresh_interval().as_secs(), 120);
}

#[test]
fn clearing_token_disables_grid_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("config.json")).unwrap();

    store.set_grid_token(Some("abc".into())).unwrap();
    store.set_grid_token(None).unwrap();

    assert_eq!(store.config().grid_token(), None);
}
