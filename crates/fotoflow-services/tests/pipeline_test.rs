//! Intake and reconciliation tests over local storage and an isolated
//! database per test.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::PgPool;

use fotoflow_core::models::{DerivativeKeys, MediaKind, MediaStatus, NewMediaItem};
use fotoflow_core::{AppError, SweepConfig, UploadPolicy};
use fotoflow_db::{MediaRepository, QueueRepository, TagRepository, UserRepository};
use fotoflow_processing::FfmpegService;
use fotoflow_services::{
    DeleteTarget, IngestEntry, IngestRequest, IntakeService, ReconciliationService,
};
use fotoflow_storage::{LocalStorage, Namespace, ObjectStorage};

async fn seed_user(pool: &PgPool, name: &str) -> i64 {
    UserRepository::new(pool.clone())
        .create(name)
        .await
        .unwrap()
        .id
}

async fn local_storage(dir: &tempfile::TempDir) -> Arc<LocalStorage> {
    Arc::new(LocalStorage::new(dir.path().join("store")).await.unwrap())
}

fn intake(pool: &PgPool, storage: Arc<LocalStorage>) -> IntakeService {
    IntakeService::new(
        pool.clone(),
        storage,
        QueueRepository::new(pool.clone()),
        FfmpegService::new("ffmpeg", "ffprobe"),
        UploadPolicy::default(),
    )
}

fn image_entry(dir: &tempfile::TempDir, name: &str, tags: &[&str]) -> IngestEntry {
    let path = dir.path().join(name);
    std::fs::write(&path, b"fake png bytes").unwrap();
    IngestEntry {
        file_name: name.to_string(),
        content_type: "image/png".to_string(),
        declared_len: 14,
        title: name.trim_end_matches(".png").to_string(),
        description: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        local_path: Some(path),
    }
}

async fn queue_depth(pool: &PgPool) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM processing_queue WHERE status = 'pending'")
            .fetch_one(pool)
            .await
            .unwrap();
    count
}

async fn media_count(pool: &PgPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM media_items")
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn server_received_batch_creates_album_uploads_and_enqueues(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let service = intake(&pool, storage.clone());

    let outcome = service
        .ingest(
            owner,
            IngestRequest {
                kind: MediaKind::Image,
                entries: vec![
                    image_entry(&dir, "one.png", &[]),
                    image_entry(&dir, "two.png", &[]),
                    image_entry(&dir, "three.png", &[]),
                ],
                as_album: true,
                album_title: Some("trip".to_string()),
            },
        )
        .await
        .unwrap();

    let album_id = outcome.album_id.expect("multi-file batch creates an album");
    assert_eq!(outcome.items.len(), 3);
    assert_eq!(queue_depth(&pool).await, 3);

    let repo = MediaRepository::new(pool.clone());
    for ingested in &outcome.items {
        let item = repo.get(ingested.media_id).await.unwrap().unwrap();
        assert_eq!(item.status, MediaStatus::Pending);
        assert_eq!(item.album_id, Some(album_id));
        // The original landed under the minted source key.
        assert!(storage
            .exists(Namespace::Originals, &item.source_key)
            .await
            .unwrap());
    }
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn single_file_batch_is_standalone(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let service = intake(&pool, storage);

    let outcome = service
        .ingest(
            owner,
            IngestRequest {
                kind: MediaKind::Image,
                entries: vec![image_entry(&dir, "solo.png", &[])],
                as_album: false,
                album_title: None,
            },
        )
        .await
        .unwrap();

    assert!(outcome.album_id.is_none());
    assert_eq!(outcome.items.len(), 1);
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn kind_mismatch_aborts_whole_batch_before_any_write(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let service = intake(&pool, storage);

    let video_path = dir.path().join("clip.mp4");
    std::fs::write(&video_path, b"fake mp4").unwrap();

    let err = service
        .ingest(
            owner,
            IngestRequest {
                kind: MediaKind::Image,
                entries: vec![
                    image_entry(&dir, "ok.png", &[]),
                    IngestEntry {
                        file_name: "clip.mp4".to_string(),
                        content_type: "video/mp4".to_string(),
                        declared_len: 8,
                        title: "clip".to_string(),
                        description: None,
                        tags: vec![],
                        local_path: Some(video_path),
                    },
                ],
                as_album: true,
                album_title: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(media_count(&pool).await, 0, "no partial commit");
    assert_eq!(queue_depth(&pool).await, 0);
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn unsupported_formats_are_rejected(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let service = intake(&pool, storage);

    let path = dir.path().join("anim.gif");
    std::fs::write(&path, b"GIF89a").unwrap();

    let err = service
        .ingest(
            owner,
            IngestRequest {
                kind: MediaKind::Image,
                entries: vec![IngestEntry {
                    file_name: "anim.gif".to_string(),
                    content_type: "image/gif".to_string(),
                    declared_len: 6,
                    title: "anim".to_string(),
                    description: None,
                    tags: vec![],
                    local_path: Some(path),
                }],
                as_album: false,
                album_title: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(media_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn unknown_tags_are_dropped_known_tags_linked(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    TagRepository::new(pool.clone()).create("sunset").await.unwrap();

    let service = intake(&pool, storage);
    let outcome = service
        .ingest(
            owner,
            IngestRequest {
                kind: MediaKind::Image,
                entries: vec![image_entry(&dir, "pic.png", &["sunset", "nonexistent"])],
                as_album: false,
                album_title: None,
            },
        )
        .await
        .unwrap();

    let (linked,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM media_tags WHERE media_id = $1")
            .bind(outcome.items[0].media_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(linked, 1, "only the vocabulary tag is linked");

    let (total_tags,): (i64,) = sqlx::query_as("SELECT count(*) FROM tags")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total_tags, 1, "intake never grows the vocabulary");
}

async fn seed_pending_with_object(
    pool: &PgPool,
    storage: &LocalStorage,
    dir: &tempfile::TempDir,
    owner: i64,
    source_key: &str,
) -> i64 {
    let mut tx = pool.begin().await.unwrap();
    let item = MediaRepository::create_in_tx(
        &mut tx,
        &NewMediaItem {
            owner_id: owner,
            album_id: None,
            kind: MediaKind::Image,
            source_key: source_key.to_string(),
            content_type: "image/png".to_string(),
            title: "t".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let path: PathBuf = dir.path().join("uploaded.bin");
    std::fs::write(&path, b"uploaded bytes").unwrap();
    storage
        .upload_file(Namespace::Originals, source_key, &path, "image/png")
        .await
        .unwrap();

    item.id
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn mark_ready_flips_pending_items_and_enqueues(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let id = seed_pending_with_object(&pool, &storage, &dir, owner, "1/direct.png").await;

    let service = intake(&pool, storage);
    let ready = service
        .mark_ready(owner, &["1/direct.png".to_string()])
        .await
        .unwrap();
    assert_eq!(ready, vec![id]);

    let item = MediaRepository::new(pool.clone())
        .get(id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, MediaStatus::Processing);
    assert_eq!(queue_depth(&pool).await, 1);
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn mark_ready_rejects_foreign_and_unknown_keys(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let alice = seed_user(&pool, "alice").await;
    let bob = seed_user(&pool, "bob").await;
    let bob_item =
        seed_pending_with_object(&pool, &storage, &dir, bob, "2/bobs.png").await;

    let service = intake(&pool, storage);

    // Alice cannot mark Bob's upload ready, and unknown keys are refused.
    let err = service
        .mark_ready(alice, &["2/bobs.png".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let item = MediaRepository::new(pool.clone())
        .get(bob_item)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, MediaStatus::Pending, "nothing flipped");
    assert_eq!(queue_depth(&pool).await, 0, "nothing emitted");
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn mark_ready_requires_the_object_to_exist(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;

    let mut tx = pool.begin().await.unwrap();
    MediaRepository::create_in_tx(
        &mut tx,
        &NewMediaItem {
            owner_id: owner,
            album_id: None,
            kind: MediaKind::Image,
            source_key: "1/never-uploaded.png".to_string(),
            content_type: "image/png".to_string(),
            title: "t".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let service = intake(&pool, storage);
    let err = service
        .mark_ready(owner, &["1/never-uploaded.png".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(queue_depth(&pool).await, 0);
}

// --- reconciliation ---

async fn upload_marker(storage: &LocalStorage, ns: Namespace, key: &str, dir: &tempfile::TempDir) {
    let path = dir.path().join("marker.bin");
    std::fs::write(&path, b"x").unwrap();
    storage.upload_file(ns, key, &path, "application/octet-stream").await.unwrap();
}

/// Seed an active item with real storage objects behind every key.
async fn seed_active_item(
    pool: &PgPool,
    storage: &LocalStorage,
    dir: &tempfile::TempDir,
    owner: i64,
    album_id: Option<i64>,
    stem: &str,
) -> i64 {
    let source_key = format!("{owner}/{stem}.png");
    let mut tx = pool.begin().await.unwrap();
    let item = MediaRepository::create_in_tx(
        &mut tx,
        &NewMediaItem {
            owner_id: owner,
            album_id,
            kind: MediaKind::Image,
            source_key: source_key.clone(),
            content_type: "image/png".to_string(),
            title: stem.to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let keys = DerivativeKeys::Image {
        small: format!("{}/g/small.jpg", item.id),
        medium: format!("{}/g/medium.jpg", item.id),
        large: format!("{}/g/large.jpg", item.id),
    };
    MediaRepository::new(pool.clone())
        .mark_active(item.id, &keys)
        .await
        .unwrap();

    upload_marker(storage, Namespace::Originals, &source_key, dir).await;
    for key in [
        format!("{}/g/small.jpg", item.id),
        format!("{}/g/medium.jpg", item.id),
        format!("{}/g/large.jpg", item.id),
    ] {
        upload_marker(storage, Namespace::Assets, &key, dir).await;
    }

    item.id
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn bulk_delete_aggregates_albums_and_standalones(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;

    let mut tx = pool.begin().await.unwrap();
    let album = fotoflow_db::AlbumRepository::create_in_tx(&mut tx, owner, "trip", None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let m1 = seed_active_item(&pool, &storage, &dir, owner, Some(album.id), "a1").await;
    let m2 = seed_active_item(&pool, &storage, &dir, owner, Some(album.id), "a2").await;
    let m3 = seed_active_item(&pool, &storage, &dir, owner, Some(album.id), "a3").await;
    let s1 = seed_active_item(&pool, &storage, &dir, owner, None, "s1").await;
    let s2 = seed_active_item(&pool, &storage, &dir, owner, None, "s2").await;

    // One member is already soft-deleted; it must still be reachable.
    MediaRepository::new(pool.clone()).soft_delete(m2).await.unwrap();

    let service =
        ReconciliationService::new(pool.clone(), storage.clone(), SweepConfig::default());
    let report = service
        .bulk_delete(&[
            DeleteTarget { id: album.id, is_album: true },
            DeleteTarget { id: s1, is_album: false },
            DeleteTarget { id: s2, is_album: false },
        ])
        .await
        .unwrap();

    assert_eq!(report.albums, 1);
    assert_eq!(report.media_items, 5);

    assert_eq!(media_count(&pool).await, 0);
    let (albums,): (i64,) = sqlx::query_as("SELECT count(*) FROM albums")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(albums, 0);

    // Storage emptied for every underlying row, soft-deleted member included.
    for id in [m1, m2, m3, s1, s2] {
        assert!(!storage
            .exists(Namespace::Assets, &format!("{id}/g/small.jpg"))
            .await
            .unwrap());
    }
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn expiry_purge_removes_only_rows_past_retention(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;

    let old = seed_active_item(&pool, &storage, &dir, owner, None, "old").await;
    let fresh = seed_active_item(&pool, &storage, &dir, owner, None, "fresh").await;

    let repo = MediaRepository::new(pool.clone());
    repo.soft_delete(old).await.unwrap();
    repo.soft_delete(fresh).await.unwrap();
    sqlx::query("UPDATE media_items SET deleted_at = now() - interval '31 days' WHERE id = $1")
        .bind(old)
        .execute(&pool)
        .await
        .unwrap();

    let service =
        ReconciliationService::new(pool.clone(), storage.clone(), SweepConfig::default());
    let report = service.run_expiry_purge().await.unwrap();

    assert_eq!(report.media_items, 1);
    assert!(repo.get_with_deleted(&[old]).await.unwrap().is_empty());
    assert_eq!(repo.get_with_deleted(&[fresh]).await.unwrap().len(), 1);

    assert!(!storage
        .exists(Namespace::Assets, &format!("{old}/g/small.jpg"))
        .await
        .unwrap());
    assert!(storage
        .exists(Namespace::Assets, &format!("{fresh}/g/small.jpg"))
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn expiry_purge_hard_deletes_expired_users(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let users = UserRepository::new(pool.clone());

    let gone = seed_user(&pool, "gone").await;
    let _staying = seed_user(&pool, "staying").await;
    users.soft_delete(gone).await.unwrap();
    sqlx::query("UPDATE users SET deleted_at = now() - interval '31 days' WHERE id = $1")
        .bind(gone)
        .execute(&pool)
        .await
        .unwrap();

    let service = ReconciliationService::new(pool.clone(), storage, SweepConfig::default());
    let report = service.run_expiry_purge().await.unwrap();
    assert_eq!(report.users, 1);

    let (remaining,): (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[sqlx::test(migrations = "../fotoflow-db/migrations")]
async fn stalled_sweep_requeues_eligible_and_buries_exhausted(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let storage = local_storage(&dir).await;
    let owner = seed_user(&pool, "alice").await;
    let repo = MediaRepository::new(pool.clone());

    // 25h-old failed item with budget left: requeued.
    let retryable = seed_pending_with_object(&pool, &storage, &dir, owner, "1/retry.png").await;
    repo.mark_failed(retryable).await.unwrap();
    sqlx::query("UPDATE media_items SET created_at = now() - interval '25 hours' WHERE id = $1")
        .bind(retryable)
        .execute(&pool)
        .await
        .unwrap();

    // 25h-old failed item at the attempt ceiling: dead, not requeued.
    let exhausted = seed_pending_with_object(&pool, &storage, &dir, owner, "1/spent.png").await;
    repo.mark_failed(exhausted).await.unwrap();
    sqlx::query(
        "UPDATE media_items \
         SET created_at = now() - interval '25 hours', processing_attempts = 5 \
         WHERE id = $1",
    )
    .bind(exhausted)
    .execute(&pool)
    .await
    .unwrap();

    // 23h-old failed item: untouched this round.
    let recent = seed_pending_with_object(&pool, &storage, &dir, owner, "1/recent.png").await;
    repo.mark_failed(recent).await.unwrap();
    sqlx::query("UPDATE media_items SET created_at = now() - interval '23 hours' WHERE id = $1")
        .bind(recent)
        .execute(&pool)
        .await
        .unwrap();

    let service = ReconciliationService::new(pool.clone(), storage, SweepConfig::default());
    let report = service.run_stalled_sweep().await.unwrap();

    assert_eq!(report.requeued, 1);
    assert_eq!(report.dead, 1);
    assert_eq!(queue_depth(&pool).await, 1);

    assert_eq!(repo.get(retryable).await.unwrap().unwrap().status, MediaStatus::Failed);
    assert_eq!(repo.get(exhausted).await.unwrap().unwrap().status, MediaStatus::Dead);
    assert_eq!(repo.get(recent).await.unwrap().unwrap().status, MediaStatus::Failed);
}
