use chrono::{DateTime, TimeZone, Utc};
use moodjournal_core::{
    derive_id, import_store_name, is_derived_id, BundleEntry, BundleError, ClientId, Entry,
    EntryContent, EntryKey, ExportBundle, Mood, OpenLock, Store, StoreConfig, StoreError,
    StoreOptions,
};
use rusqlite::Connection;
use tempfile::TempDir;

fn test_config() -> (TempDir, StoreConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path());
    (dir, config)
}

fn at_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

async fn populated_store(config: &StoreConfig, lock: &OpenLock) -> Store {
    let store = Store::open(config, lock, StoreOptions::named("source"))
        .await
        .unwrap();
    store
        .add(at_millis(1_700_000_000_000), EntryContent::new(Mood::VeryBad, "rain"))
        .await
        .unwrap();
    store
        .add(at_millis(1_700_000_360_500), EntryContent::new(Mood::VeryGood, "sun"))
        .await
        .unwrap();
    store
}

fn legacy_bundle(client_id: ClientId, version: u32) -> ExportBundle {
    ExportBundle::new(
        client_id,
        version,
        vec![
            BundleEntry::legacy(
                1,
                at_millis(1_650_000_000_000),
                EntryContent::new(Mood::Bad, "old one"),
            ),
            BundleEntry::legacy(
                2,
                at_millis(1_650_000_100_000),
                EntryContent::new(Mood::Good, "old two"),
            ),
        ],
    )
    .unwrap()
}

fn stored_version(config: &StoreConfig, name: &str) -> u32 {
    let conn = Connection::open(config.db_path(name).unwrap()).unwrap();
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn export_of_fresh_store_is_empty_at_latest_version() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let store = Store::open(&config, &lock, StoreOptions::named("empty"))
        .await
        .unwrap();

    let bundle = store.export().await.unwrap();
    assert_eq!(bundle.client_id(), store.identity().unwrap());
    assert_eq!(bundle.version(), 3);
    assert_eq!(bundle.record_count(), 0);
}

#[tokio::test]
async fn export_lists_every_entry_with_owner() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let store = populated_store(&config, &lock).await;
    let identity = store.identity().unwrap();

    let bundle = store.export().await.unwrap();
    assert_eq!(bundle.record_count(), 2);
    for entry in bundle.journal() {
        assert_eq!(entry.created_at(), Some(identity));
        assert_eq!(
            entry.id(),
            EntryKey::Derived(derive_id(&entry.date(), identity))
        );
    }
}

#[tokio::test]
async fn bundle_survives_json_encoding() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let store = populated_store(&config, &lock).await;

    let bundle = store.export().await.unwrap();
    let json = bundle.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["data"]["version"], 3);
    assert_eq!(value["data"]["id"], bundle.client_id().to_string());
    assert_eq!(value["data"]["journal"][1]["date"], "2023-11-14T22:19:20.500Z");

    assert_eq!(ExportBundle::from_json(&json).unwrap(), bundle);
}

#[tokio::test]
async fn import_of_latest_bundle_reproduces_the_store() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let source = populated_store(&config, &lock).await;
    let bundle = source.export().await.unwrap();

    let imported = Store::from_export(&config, &lock, &bundle).await.unwrap();

    assert_eq!(imported.name(), import_store_name(bundle.client_id()));
    assert_eq!(imported.identity().unwrap(), bundle.client_id());
    assert_eq!(
        imported.retrieve_all().await.unwrap().to_vec(),
        source.retrieve_all().await.unwrap().to_vec()
    );
    assert_eq!(imported.export().await.unwrap(), bundle);
}

#[tokio::test]
async fn import_keeps_owner_of_entries_from_other_clients() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let bundle_owner = ClientId::generate();
    let other_owner = ClientId::generate();
    let foreign = Entry::new(
        at_millis(1_690_000_000_000),
        EntryContent::new(Mood::Neutral, "synced in"),
        other_owner,
    );
    let bundle = ExportBundle::new(bundle_owner, 3, vec![BundleEntry::from(&foreign)]).unwrap();

    let imported = Store::from_export(&config, &lock, &bundle).await.unwrap();

    let entries = imported.retrieve_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].created_at(), other_owner);
    assert_eq!(entries[0].id(), foreign.id());
    assert_eq!(imported.identity().unwrap(), bundle_owner);
}

#[tokio::test]
async fn legacy_bundle_is_migrated_to_derived_ids() {
    for version in [1, 2] {
        let (_dir, config) = test_config();
        let lock = OpenLock::new();
        let client_id = ClientId::generate();
        let bundle = legacy_bundle(client_id, version);

        let imported = Store::from_export(&config, &lock, &bundle).await.unwrap();

        assert_eq!(imported.identity().unwrap(), client_id);
        let entries = imported.retrieve_all().await.unwrap();
        assert_eq!(entries.len(), 2, "bundle version {version}");
        for (entry, source) in entries.iter().zip(bundle.journal()) {
            assert!(is_derived_id(&entry.id()));
            assert_eq!(entry.id(), derive_id(&source.date(), client_id));
            assert_eq!(entry.created_at(), client_id);
            assert_eq!(entry.content(), source.content());
        }

        let name = imported.name().to_string();
        imported.close();
        assert_eq!(stored_version(&config, &name), 3);
    }
}

#[tokio::test]
async fn reimport_discards_previous_contents() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let client_id = ClientId::generate();

    let first = Store::from_export(&config, &lock, &legacy_bundle(client_id, 2))
        .await
        .unwrap();
    first
        .add(at_millis(1_700_000_000_000), EntryContent::new(Mood::Neutral, "local"))
        .await
        .unwrap();
    first.close();

    let single = ExportBundle::new(
        client_id,
        3,
        vec![BundleEntry::from(&Entry::new(
            at_millis(1_710_000_000_000),
            EntryContent::new(Mood::Good, "only"),
            client_id,
        ))],
    )
    .unwrap();
    let second = Store::from_export(&config, &lock, &single).await.unwrap();

    let entries = second.retrieve_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text(), "only");
}

#[tokio::test]
async fn imported_store_accepts_new_entries_under_bundle_identity() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let client_id = ClientId::generate();
    let imported = Store::from_export(&config, &lock, &legacy_bundle(client_id, 2))
        .await
        .unwrap();

    let date = at_millis(1_720_000_000_000);
    let id = imported
        .add(date, EntryContent::new(Mood::VeryGood, "after import"))
        .await
        .unwrap();
    assert_eq!(id, derive_id(&date, client_id));
    assert_eq!(imported.retrieve_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_bundles_are_rejected() {
    let unsupported = r#"{"data":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","version":9,"journal":[]}}"#;
    assert!(matches!(
        ExportBundle::from_json(unsupported),
        Err(BundleError::UnsupportedVersion { version: 9, .. })
    ));

    let legacy_ids_at_latest = r#"{"data":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","version":3,"journal":[
        {"date":"2024-01-01T00:00:00.000Z","content":{"mood":2,"text":"x"},"id":7}
    ]}}"#;
    let err = ExportBundle::from_json(legacy_ids_at_latest).unwrap_err();
    assert!(matches!(err, BundleError::InvalidEntry(_)));

    let store_err: StoreError = ExportBundle::from_json("not json").unwrap_err().into();
    assert!(matches!(store_err, StoreError::ImportFailed(_)));
}

#[tokio::test]
async fn legacy_bundle_json_imports() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let json = r#"{"data":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","version":2,"journal":[
        {"date":"2022-03-04T05:06:07.089Z","content":{"mood":4,"text":"legacy"},"id":1}
    ]}}"#;
    let bundle = ExportBundle::from_json(json).unwrap();

    let imported = Store::from_export(&config, &lock, &bundle).await.unwrap();

    let client_id: ClientId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
    let entries = imported.retrieve_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mood(), Mood::VeryGood);
    assert_eq!(
        entries[0].id(),
        derive_id(&at_millis(1_646_370_367_089), client_id)
    );
}

#[test]
fn legacy_bundle_with_repeated_dates_is_refused() {
    let json = r#"{"data":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","version":2,"journal":[
        {"date":"2022-03-04T05:06:07.089Z","content":{"mood":1,"text":"morning"},"id":1},
        {"date":"2022-03-04T05:06:07.089400Z","content":{"mood":3,"text":"same instant"},"id":2}
    ]}}"#;

    let err = ExportBundle::from_json(json).unwrap_err();
    assert!(matches!(err, BundleError::InvalidEntry(_)), "unexpected error: {err}");
    let err: StoreError = err.into();
    assert!(matches!(err, StoreError::ImportFailed(_)));
}

#[tokio::test]
async fn sub_millisecond_bundle_dates_import_truncated() {
    let (_dir, config) = test_config();
    let lock = OpenLock::new();
    let json = r#"{"data":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e","version":2,"journal":[
        {"date":"2022-03-04T05:06:07.089999Z","content":{"mood":2,"text":"precise"},"id":1}
    ]}}"#;
    let bundle = ExportBundle::from_json(json).unwrap();

    let imported = Store::from_export(&config, &lock, &bundle).await.unwrap();
    let exported = imported.export().await.unwrap();

    assert_eq!(exported.journal()[0].date(), at_millis(1_646_370_367_089));
    assert_eq!(ExportBundle::from_json(&exported.to_json().unwrap()).unwrap(), exported);
}

