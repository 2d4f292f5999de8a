use domain::FirmwareFamily;
use komfo_firmware::{FIRMWARE_DIR, FirmwareStore, METADATA_FILE, StoreError, parse_firmware_filename};

const MODERN: &str = "C6_1_5_46_72_P1_1_1_5_48.mbin";
const LEGACY: &str = "C6_1_3_28_38_20180428.mbin";

#[tokio::test]
async fn save_persists_metadata_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = FirmwareStore::new(dir.path());
    let version = parse_firmware_filename(MODERN).unwrap();

    let info = store
        .save_firmware(FirmwareFamily::C6, MODERN, &version, b"firmware-bytes")
        .await
        .expect("save");
    assert_eq!(info.version(), "1.5.46.72");
    assert_eq!(info.file_path, dir.path().join(FIRMWARE_DIR).join(MODERN));
    assert_eq!(std::fs::read(&info.file_path).unwrap(), b"firmware-bytes");
    assert!(dir.path().join(METADATA_FILE).exists());
    assert!(store.has_firmware_file(FirmwareFamily::C6).await);
    assert!(!store.has_firmware_file(FirmwareFamily::C8).await);

    // 重新打开后数据一致
    let reopened = FirmwareStore::open(dir.path()).await.expect("open");
    assert_eq!(reopened.get(FirmwareFamily::C6).await, Some(info));
    assert_eq!(
        reopened.latest_version(FirmwareFamily::C6).await.as_deref(),
        Some("1.5.46.72")
    );

    // 没有遗留临时文件
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(FIRMWARE_DIR))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn open_missing_store_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FirmwareStore::open(dir.path().join("nested")).await.expect("open");
    assert!(store.get(FirmwareFamily::C6).await.is_none());
    assert!(store.firmware_path(FirmwareFamily::C6).await.is_none());
}

#[tokio::test]
async fn open_corrupt_metadata_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(METADATA_FILE), "{not json").unwrap();
    let err = FirmwareStore::open(dir.path()).await.err().unwrap();
    assert!(matches!(err, StoreError::Metadata(_)));
}

#[tokio::test]
async fn rejects_path_like_filenames() {
    let dir = tempfile::tempdir().unwrap();
    let store = FirmwareStore::new(dir.path());
    let version = parse_firmware_filename(MODERN).unwrap();
    let err = store
        .save_firmware(FirmwareFamily::C6, "../escape.mbin", &version, b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidFilename(_)));
    assert!(!dir.path().join("escape.mbin").exists());
}

#[tokio::test]
async fn cleanup_keeps_only_active_family_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FirmwareStore::new(dir.path());

    let legacy = parse_firmware_filename(LEGACY).unwrap();
    store
        .save_firmware(FirmwareFamily::C6, LEGACY, &legacy, b"old")
        .await
        .unwrap();
    let modern = parse_firmware_filename(MODERN).unwrap();
    store
        .save_firmware(FirmwareFamily::C6, MODERN, &modern, b"new")
        .await
        .unwrap();

    let c8_name = "C8_2_0_1_10_P2_1_0_0_3.mbin";
    let c8 = parse_firmware_filename(c8_name).unwrap();
    store
        .save_firmware(FirmwareFamily::C8, c8_name, &c8, b"c8")
        .await
        .unwrap();
    std::fs::write(dir.path().join(FIRMWARE_DIR).join("notes.txt"), "keep").unwrap();

    let removed = store
        .cleanup_old_files(&[FirmwareFamily::C6])
        .await
        .unwrap();
    let mut removed = removed;
    removed.sort();
    assert_eq!(removed, vec![LEGACY.to_string(), c8_name.to_string()]);

    let storage = dir.path().join(FIRMWARE_DIR);
    assert!(storage.join(MODERN).exists());
    assert!(storage.join("notes.txt").exists());
    assert!(!storage.join(LEGACY).exists());
}

#[tokio::test]
async fn remove_drops_metadata_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = FirmwareStore::new(dir.path());
    let version = parse_firmware_filename(MODERN).unwrap();
    store
        .save_firmware(FirmwareFamily::C6, MODERN, &version, b"x")
        .await
        .unwrap();

    store.remove(FirmwareFamily::C6).await.unwrap();
    assert!(store.get(FirmwareFamily::C6).await.is_none());

    let reopened = FirmwareStore::open(dir.path()).await.unwrap();
    assert!(reopened.get(FirmwareFamily::C6).await.is_none());
}
