use std::fs;
use std::path::Path;

use pushkind_images::backup::BackupManager;
use pushkind_images::domain::image::NewImageEmbedding;
use pushkind_images::domain::types::Embedding;
use pushkind_images::models::config::ServerConfig;
use pushkind_images::repository::{DieselRepository, ImageWriter};
use pushkind_images::services::startup::{StartupState, initialize};

mod common;

fn config(root: &Path) -> ServerConfig {
    ServerConfig {
        upload_dir: root.join("uploads/nested"),
        backup_dir: root.join("backups"),
        embedding_dim: 3,
        ..ServerConfig::default()
    }
}

#[test]
fn test_fresh_start_without_backups() {
    let Some(test_db) = common::TestDb::new(3) else {
        return;
    };
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let db = test_db.database();
    let backups = BackupManager::new(db.clone(), &config.backup_dir).unwrap();

    let state = initialize(&db, &backups, &config).unwrap();

    assert_eq!(state, StartupState::Fresh);
    assert!(config.upload_dir.is_dir());
    assert!(db.is_connected());
    assert_eq!(db.count_embeddings().unwrap(), 0);
}

#[test]
fn test_corrupt_backup_falls_back_to_fresh_schema() {
    let Some(test_db) = common::TestDb::new(3) else {
        return;
    };
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let db = test_db.database();
    let backups = BackupManager::new(db.clone(), &config.backup_dir).unwrap();
    fs::write(config.backup_dir.join("broken.dump"), b"not a pg_dump archive").unwrap();

    let repo = DieselRepository::new(db.clone());
    let existing = NewImageEmbedding::new(
        "kept.png",
        "set/kept.png",
        Embedding::new(vec![1.0, 0.0, 0.0]).unwrap(),
    );
    assert_eq!(repo.insert_embeddings(&[existing]).unwrap(), 1);

    let state = initialize(&db, &backups, &config).unwrap();

    assert_eq!(state, StartupState::Fresh);
    assert!(db.is_connected());
    assert_eq!(db.count_embeddings().unwrap(), 1);
    assert_eq!(
        repo.insert_embeddings(&[NewImageEmbedding::new(
            "new.png",
            "set/new.png",
            Embedding::new(vec![0.0, 1.0, 0.0]).unwrap(),
        )])
        .unwrap(),
        1
    );
}

#[test]
fn test_failed_restore_reopens_the_pool() {
    let Some(test_db) = common::TestDb::new(3) else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let db = test_db.database();
    let backups = BackupManager::new(db.clone(), dir.path()).unwrap();
    fs::write(dir.path().join("broken.dump"), b"garbage").unwrap();

    assert!(backups.restore("broken.dump").is_err());

    assert!(db.is_connected());
    assert_eq!(db.count_embeddings().unwrap(), 0);
}
