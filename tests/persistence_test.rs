use auriga::persistence::{PersistenceManager, StoredTokens, TokenStore};

#[test]
fn load_from_missing_file_is_none() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("settings.json");

    let mgr = PersistenceManager::new(&path.to_string_lossy());
    assert!(mgr.load_tokens().unwrap().is_none());
}

#[test]
fn save_load_roundtrip() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_string_lossy().to_string();

    let mgr = PersistenceManager::new(&path);
    let tokens = StoredTokens {
        bearer_token: "4720d5f980c9969b".to_string(),
        refresh_token: "110dd445543".to_string(),
        token_expire_time: 1_903_120_970.0,
        saved_at: chrono::Utc::now(),
    };
    mgr.save_tokens(&tokens).unwrap();

    let loaded = PersistenceManager::new(&path).load_tokens().unwrap().unwrap();
    assert_eq!(loaded.bearer_token, "4720d5f980c9969b");
    assert_eq!(loaded.refresh_token, "110dd445543");
    assert!((loaded.token_expire_time - 1_903_120_970.0).abs() < f64::EPSILON);
}

#[test]
fn load_rejects_corrupt_state() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"{not json").unwrap();

    let mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    assert!(mgr.load_tokens().is_err());
}
