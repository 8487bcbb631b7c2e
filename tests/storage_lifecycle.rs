// tests/storage_lifecycle.rs
//
// End-to-end behaviour of the storage engine on a temp directory:
// write -> dedup -> compaction past retention -> purge past archive life.
// Simulated days come from ManualClock; file ages from explicit mtimes.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Duration, Local, Utc};
use crypto_news_selector::storage::{ManualClock, SweepSummary};
use crypto_news_selector::{Entity, NewsRecord, RetentionPolicy, Storage, StorageError};

fn set_mtime(path: &Path, at: DateTime<Utc>) {
    File::options()
        .write(true)
        .open(path)
        .expect("open for mtime")
        .set_modified(SystemTime::from(at))
        .expect("set mtime");
}

fn foo_record() -> NewsRecord {
    NewsRecord {
        title: "Foo raises funds".into(),
        link: "http://x".into(),
        description: "...".into(),
        ..Default::default()
    }
}

fn log_name(at: DateTime<Utc>) -> String {
    format!("{}.log", at.with_timezone(&Local).format("%Y-%m-%d"))
}

fn read_zip_entry(path: &Path) -> (String, String) {
    let mut zip = zip::ZipArchive::new(File::open(path).expect("open zip")).expect("zip");
    assert_eq!(zip.len(), 1, "one entry per artifact");
    let mut entry = zip.by_index(0).expect("entry");
    let mut body = String::new();
    entry.read_to_string(&mut body).expect("read entry");
    (entry.name().to_string(), body)
}

#[tokio::test]
async fn record_is_logged_then_archived_after_retention() {
    let tmp = tempfile::tempdir().unwrap();
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let foo = Entity::new("foo").unwrap();

    let storage = Storage::init_with_clock(
        tmp.path(),
        &[foo.clone()],
        RetentionPolicy::default(),
        clock.clone(),
    )
    .await
    .expect("init");

    let out = storage
        .append_records(&foo, vec![foo_record()])
        .await
        .expect("append");
    assert_eq!(out.written, 1);
    storage.drain().await;

    let log = tmp.path().join("foo").join(log_name(start));
    let content = fs::read_to_string(&log).expect("daily log");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("] Foo raises funds (link: http://x)"));

    clock.advance(Duration::days(15));
    let summary = storage.sweep_all(&[foo.clone()]).await;
    assert_eq!(summary.archived, 1);
    assert_eq!(summary.archive_failures, 0);

    assert!(!log.exists(), "source removed after archiving");
    let artifact = tmp
        .path()
        .join("foo/archive")
        .join(format!("{}.zip", log_name(start)));
    let (entry, body) = read_zip_entry(&artifact);
    assert_eq!(entry, log_name(start));
    assert_eq!(body, content);
}

#[tokio::test]
async fn identical_records_in_one_call_write_one_line() {
    let tmp = tempfile::tempdir().unwrap();
    let foo = Entity::new("foo").unwrap();
    let storage = Storage::init(tmp.path(), &[foo.clone()], RetentionPolicy::default())
        .await
        .unwrap();

    let out = storage
        .append_records(&foo, vec![foo_record(), foo_record()])
        .await
        .expect("duplicates are not an error");
    assert_eq!((out.written, out.skipped), (1, 1));

    // And again across calls.
    let out = storage.append_records(&foo, vec![foo_record()]).await.unwrap();
    assert_eq!(out.written, 0);
    storage.drain().await;

    let log = tmp.path().join("foo").join(log_name(Utc::now()));
    assert_eq!(fs::read_to_string(log).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn failed_artifact_keeps_log_until_a_later_sweep_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    let foo = Entity::new("foo").unwrap();
    let storage = Storage::init(tmp.path(), &[foo.clone()], RetentionPolicy::default())
        .await
        .unwrap();

    let log = tmp.path().join("foo/2025-01-01.log");
    fs::write(&log, "[2025-01-01T00:00:00Z] old news (link: l)\n").unwrap();
    set_mtime(&log, Utc::now() - Duration::days(30));

    // Make the archive directory unusable.
    let archive = tmp.path().join("foo/archive");
    fs::remove_dir_all(&archive).unwrap();
    fs::write(&archive, "not a directory").unwrap();

    let summary = storage.sweep_all(&[foo.clone()]).await;
    assert_eq!(summary.archived, 0);
    assert_eq!(summary.archive_failures, 1);
    assert!(log.exists(), "source kept when the artifact cannot be written");

    fs::remove_file(&archive).unwrap();
    let summary = storage.sweep_all(&[foo.clone()]).await;
    assert_eq!(summary.archived, 1);
    assert!(!log.exists());
    assert!(archive.join("2025-01-01.log.zip").is_file());
}

#[tokio::test]
async fn second_sweep_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let entities: Vec<Entity> = ["alpha", "beta"]
        .iter()
        .map(|n| Entity::new(n).unwrap())
        .collect();
    let storage = Storage::init(tmp.path(), &entities, RetentionPolicy::default())
        .await
        .unwrap();

    let now = Utc::now();
    for e in &entities {
        let dir = tmp.path().join(e.as_str());
        for (name, age_days) in [("2025-01-01.log", 20), ("2025-01-02.log", 3)] {
            let p = dir.join(name);
            fs::write(&p, "x\n").unwrap();
            set_mtime(&p, now - Duration::days(age_days));
        }
        let expired = dir.join("archive/2024-06-01.log.zip");
        fs::write(&expired, "PK").unwrap();
        set_mtime(&expired, now - Duration::days(120));
    }

    let first = storage.sweep_all(&entities).await;
    assert_eq!(first.entities, 2);
    assert_eq!(first.archived, 2);
    assert_eq!(first.purged, 2);

    let second = storage.sweep_all(&entities).await;
    assert_eq!(
        second,
        SweepSummary {
            entities: 2,
            ..Default::default()
        }
    );
    for e in &entities {
        let dir = tmp.path().join(e.as_str());
        assert!(dir.join("2025-01-02.log").exists());
        assert!(dir.join("archive/2025-01-01.log.zip").exists());
        assert!(!dir.join("archive/2024-06-01.log.zip").exists());
    }
}

#[tokio::test]
async fn write_triggered_pass_compacts_but_does_not_purge() {
    let tmp = tempfile::tempdir().unwrap();
    let foo = Entity::new("foo").unwrap();
    let storage = Storage::init(tmp.path(), &[foo.clone()], RetentionPolicy::default())
        .await
        .unwrap();

    let now = Utc::now();
    let stale_log = tmp.path().join("foo/2025-01-01.log");
    fs::write(&stale_log, "x\n").unwrap();
    set_mtime(&stale_log, now - Duration::days(20));
    let expired = tmp.path().join("foo/archive/2024-01-01.log.zip");
    fs::write(&expired, "PK").unwrap();
    set_mtime(&expired, now - Duration::days(200));

    storage.append_records(&foo, vec![foo_record()]).await.unwrap();
    storage.drain().await;

    assert!(!stale_log.exists());
    assert!(tmp.path().join("foo/archive/2025-01-01.log.zip").is_file());
    assert!(expired.exists(), "purge only runs on full sweeps");
}

#[tokio::test]
async fn init_prepares_dirs_and_locks() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("news");
    let policy = RetentionPolicy {
        archive_subdir: "zips".into(),
        ..Default::default()
    };
    let entities = vec![Entity::new("Bitcoin").unwrap(), Entity::new("Shiba Inu").unwrap()];
    let storage = Storage::init(&root, &entities, policy).await.unwrap();

    assert!(root.join("bitcoin/zips").is_dir());
    assert!(root.join("shiba_inu/zips").is_dir());
    assert_eq!(storage.registered_locks(), 2);
    assert_eq!(storage.archive_dir(&entities[0]), root.join("bitcoin/zips"));
}

#[tokio::test]
async fn unusable_root_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("news");
    fs::write(&root, "file, not dir").unwrap();

    let err = Storage::init(&root, &[], RetentionPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Init { .. }));
}

#[tokio::test]
async fn append_to_blocked_entity_dir_is_a_write_error() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::init(tmp.path(), &[], RetentionPolicy::default())
        .await
        .unwrap();
    let ghost = Entity::new("ghost").unwrap();
    fs::write(tmp.path().join("ghost"), "blocker").unwrap();

    let err = storage
        .append_records(&ghost, vec![foo_record()])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Write { .. }));
}

#[tokio::test]
async fn short_retention_policy_is_honoured() {
    let tmp = tempfile::tempdir().unwrap();
    let foo = Entity::new("foo").unwrap();
    let policy = RetentionPolicy {
        log_retention: StdDuration::from_secs(60),
        ..Default::default()
    };
    let storage = Storage::init(tmp.path(), &[foo.clone()], policy).await.unwrap();

    let p = tmp.path().join("foo/2025-01-01.log");
    fs::write(&p, "x\n").unwrap();
    set_mtime(&p, Utc::now() - Duration::seconds(120));

    assert_eq!(storage.sweep_all(&[foo]).await.archived, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeps_never_exceed_the_worker_cap() {
    let tmp = tempfile::tempdir().unwrap();
    let entities: Vec<Entity> = (0..20)
        .map(|i| Entity::new(&format!("coin{i}")).unwrap())
        .collect();
    let policy = RetentionPolicy {
        max_workers: 2,
        ..Default::default()
    };
    let storage = Storage::init(tmp.path(), &entities, policy).await.unwrap();

    let old = Utc::now() - Duration::days(30);
    for e in &entities {
        let p = tmp.path().join(e.as_str()).join("2025-01-01.log");
        fs::write(&p, "x\n").unwrap();
        set_mtime(&p, old);
    }

    let summary = storage.sweep_all(&entities).await;
    assert_eq!(summary.entities, 20);
    assert_eq!(summary.archived, 20);

    let stats = storage.pool_stats();
    assert_eq!(stats.workers, 2);
    assert!(stats.peak_in_flight <= 2, "peak was {}", stats.peak_in_flight);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_of_one_entity_archive_each_log_once() {
    let tmp = tempfile::tempdir().unwrap();
    let foo = Entity::new("foo").unwrap();
    let storage = Storage::init(tmp.path(), &[foo.clone()], RetentionPolicy::default())
        .await
        .unwrap();

    let old = Utc::now() - Duration::days(30);
    for day in 1..=5 {
        let p = tmp.path().join(format!("foo/2025-01-0{day}.log"));
        fs::write(&p, format!("[2025-01-0{day}T00:00:00Z] n{day} (link: l)\n")).unwrap();
        set_mtime(&p, old);
    }

    let batch = [foo.clone()];
    let (a, b) = tokio::join!(storage.sweep_all(&batch), storage.sweep_all(&batch));
    assert_eq!(a.archived + b.archived, 5);
    assert_eq!(a.archive_failures + b.archive_failures, 0);

    let names: Vec<String> = fs::read_dir(tmp.path().join("foo/archive"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 5);
    assert!(names.iter().all(|n| n.ends_with(".log.zip")));
}
