#[cfg(test)]
mod tests {
    use crate::{decode, MemoryStorage, SqliteStorage, StorageMap, StorageService};
    use serde_json::json;
    use std::env;
    use webtone_core::{CoreError, StorageError};

    async fn setup_test_db() -> SqliteStorage {
        let db_path = env::temp_dir().join(format!("test_webtone_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

        SqliteStorage::connect(&db_url)
            .await
            .expect("Failed to connect to test database")
    }

    #[tokio::test]
    async fn test_sqlite_round_trip_and_missing_keys() {
        let db = setup_test_db().await;

        let mut entries = StorageMap::new();
        entries.insert("isEnabled".to_string(), json!(false));
        entries.insert("allowHandles".to_string(), json!(["jack"]));
        db.set(entries).await.expect("Failed to save values");

        let values = db
            .get(&["isEnabled", "allowHandles", "blurMode"])
            .await
            .expect("Failed to read values");

        assert_eq!(values.get("isEnabled"), Some(&json!(false)));
        assert_eq!(values.get("allowHandles"), Some(&json!(["jack"])));
        assert!(!values.contains_key("blurMode"));
    }

    #[tokio::test]
    async fn test_sqlite_overwrites_existing_key() {
        let db = SqliteStorage::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");

        db.set_one("sensitivity", json!(0.65)).await.unwrap();
        db.set_one("sensitivity", json!(0.4)).await.unwrap();

        assert_eq!(db.get_one("sensitivity").await.unwrap(), Some(json!(0.4)));
    }

    #[tokio::test]
    async fn test_memory_storage_unavailable() {
        let storage = MemoryStorage::new();
        storage.set_one("blurMode", json!(true)).await.unwrap();

        storage.set_available(false);
        let result = storage.get(&["blurMode"]).await;
        assert!(matches!(
            result,
            Err(CoreError::Storage(StorageError::Unavailable { .. }))
        ));

        storage.set_available(true);
        assert_eq!(storage.get_one("blurMode").await.unwrap(), Some(json!(true)));
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_decode_reports_encoding_error() {
        let result: Result<Vec<String>, CoreError> = decode("allowHandles", json!("jack"));
        assert!(matches!(
            result,
            Err(CoreError::Storage(StorageError::Encoding { .. }))
        ));
    }
}
