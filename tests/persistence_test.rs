use energy_price_level::host::{SensorState, StateStore};
use energy_price_level::persistence::{PersistenceManager, PersistentState};
use serde_json::{Map, json};
use std::fs;
use std::sync::Arc;
use std::thread;

fn state(label: &str) -> SensorState {
    let mut attributes = Map::new();
    attributes.insert("current_hour".to_string(), json!(14));
    SensorState {
        state: Some(label.to_string()),
        attributes,
    }
}

#[test]
fn default_state_is_empty() {
    assert!(PersistentState::default().sensors.is_empty());
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = PersistenceManager::new(dir.path().join("absent.json"));
    mgr.load().unwrap();
    assert!(mgr.restore_last("energy_price_level_x").is_none());
}

#[test]
fn load_save_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let mgr = PersistenceManager::new(&path);
    mgr.persist_last("energy_price_level_a", &state("cheap")).unwrap();
    mgr.persist_last("energy_price_level_b", &state("normal")).unwrap();

    let mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    assert_eq!(mgr2.restore_last("energy_price_level_a"), Some(state("cheap")));
    assert_eq!(mgr2.get("energy_price_level_b"), Some(state("normal")));
    assert!(mgr2.get("energy_price_level_c").is_none());
}

#[test]
fn concurrent_persists_keep_latest_state_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mgr = Arc::new(PersistenceManager::new(&path));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                let id = format!("energy_price_level_{}", t);
                for i in 0..200 {
                    mgr.persist_last(&id, &state(&format!("v{}", i))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reloaded = PersistenceManager::new(&path);
    reloaded.load().unwrap();
    for t in 0..8 {
        let id = format!("energy_price_level_{}", t);
        assert_eq!(reloaded.restore_last(&id), Some(state("v199")));
        assert_eq!(reloaded.restore_last(&id), mgr.restore_last(&id));
    }
}

#[test]
fn unknown_state_roundtrips_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mgr = PersistenceManager::new(&path);
    mgr.persist_last("energy_price_level_a", &SensorState::default()).unwrap();

    let mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    assert_eq!(
        mgr2.restore_last("energy_price_level_a"),
        Some(SensorState::default())
    );
}

#[test]
fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"{not json").unwrap();
    let mgr = PersistenceManager::new(tmp.path());
    let err = mgr.load().unwrap_err();
    assert!(format!("{}", err).contains("Serialization error"));
}
