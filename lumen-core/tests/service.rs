use std::{fs, path::Path, sync::Arc, thread};

use lumen_core::{
    load_model, mock::MockModel, DeviceMap, FailureKind, ImageService, ImageStore,
};

fn service_in(dir: &Path) -> ImageService {
    ImageService::new(
        Box::new(MockModel::new()),
        ImageStore::new(dir.join("uploads").join("theme_images")),
        25,
    )
}

fn png_count(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "png"))
            .count(),
        Err(_) => 0,
    }
}

#[test]
fn generated_file_exists_and_is_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let saved = service.generate("a red fox").unwrap();

    let metadata = fs::metadata(&saved.file).unwrap();
    assert!(metadata.is_file());
    assert!(metadata.len() > 0);
    assert!(saved.public_path.ends_with(".png"));
    assert!(saved.public_path.contains("/uploads/theme_images/"));
}

#[test]
fn empty_prompt_is_rejected_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let err = service.generate("").unwrap_err();

    assert_eq!(err.kind(), FailureKind::InvalidInput);
    assert_eq!(png_count(service.store().output_dir()), 0);
}

#[test]
fn identical_prompts_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let first = service.generate("a red fox").unwrap();
    let second = service.generate("a red fox").unwrap();

    assert_ne!(first.file, second.file);
    assert_ne!(first.public_path, second.public_path);
    assert_eq!(png_count(service.store().output_dir()), 2);
}

#[test]
fn concurrent_callers_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(service_in(dir.path()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.generate("same prompt").unwrap())
        })
        .collect();
    let mut paths: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().public_path)
        .collect();
    paths.sort();
    paths.dedup();

    assert_eq!(paths.len(), 8);
    assert_eq!(png_count(service.store().output_dir()), 8);
}

#[test]
fn returned_path_has_no_backslash_or_dot_prefix() {
    let service = ImageService::new(
        Box::new(MockModel::new()),
        ImageStore::new("./target/lumen-test-output"),
        25,
    );

    let saved = service.generate("mountain lake at dawn").unwrap();

    assert!(!saved.public_path.contains('\\'));
    assert!(!saved.public_path.starts_with("./"));
    assert!(saved.public_path.starts_with("/target/lumen-test-output/"));
    fs::remove_file(saved.file).unwrap();
}

#[test]
fn failing_model_reports_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = ImageService::new(
        Box::new(MockModel::new().with_failure(true)),
        ImageStore::new(dir.path()),
        25,
    );

    let err = service.generate("a red fox").unwrap_err();

    assert_eq!(err.kind(), FailureKind::Internal);
    assert_eq!(png_count(dir.path()), 0);
}

#[tokio::test]
async fn loader_rejects_invalid_model_dir() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("stable-diffusion-v1-4");
    assert!(load_model(&missing, DeviceMap::ForceCpu).await.is_err());

    // present but without weights
    fs::create_dir_all(&missing).unwrap();
    assert!(load_model(&missing, DeviceMap::ForceCpu).await.is_err());
}
