//! Integration tests for bucket operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use bucketdb::{Config, Db, Error, NodeKind, PageId, SplitEvent};
use parking_lot::Mutex;
use tempfile::tempdir;

fn open_db(max_keys: usize) -> (Db, tempfile::TempDir) {
    open_db_with(Config::default().max_keys_per_node(max_keys))
}

fn open_db_with(config: Config) -> (Db, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path().join("test.db"), config.sync_writes(false)).unwrap();
    (db, dir)
}

fn keys_of(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<String> {
    entries
        .iter()
        .map(|(k, _)| String::from_utf8(k.clone()).unwrap())
        .collect()
}

/// Countries with a small fan-out: splits on both levels, then deletes that
/// empty two leaves.
#[test]
fn test_countries_insert_delete_update() {
    let (db, _dir) = open_db(2);
    let bucket = db.bucket("countries").unwrap();

    for country in ["Zanzibar", "Algeria", "Egypt", "Germany", "France", "Spain", "Poland"] {
        bucket.put(country.as_bytes(), country.as_bytes()).unwrap();
        bucket.verify().unwrap();
    }
    for country in ["Algeria", "Spain", "Zanzibar", "Poland"] {
        bucket.delete(country.as_bytes()).unwrap();
        bucket.verify().unwrap();
    }
    bucket.put(b"Germany", b"Berlin").unwrap();

    let entries = bucket.entries().unwrap();
    assert_eq!(keys_of(&entries), vec!["Egypt", "France", "Germany"]);
    assert_eq!(entries[2].1, b"Berlin");
    assert_eq!(bucket.get(b"Egypt").unwrap(), b"Egypt");

    // Two leaves were reclaimed; their ids are reusable once flushed.
    assert!(db.free_pages().is_empty());
    bucket.flush().unwrap();
    assert_eq!(db.free_pages().len(), 2);
    bucket.verify().unwrap();
}

#[test]
fn test_names_build_multi_level_tree() {
    let (db, _dir) = open_db(3);
    let bucket = db.bucket("people").unwrap();

    let names = [
        "Ibrahim", "Gamal", "Hassan", "Camal", "Basem", "Dawood", "Emad", "Ahmed", "Fady",
    ];
    for name in names {
        bucket.put(name.as_bytes(), b"x").unwrap();
    }

    let mut sorted = names.to_vec();
    sorted.sort();
    assert_eq!(keys_of(&bucket.entries().unwrap()), sorted);
    assert!(bucket.height().unwrap() > 1);
    assert_eq!(bucket.len().unwrap(), 9);
    bucket.verify().unwrap();
}

#[test]
fn test_update_in_place_keeps_key_count() {
    let (db, _dir) = open_db(3);
    let bucket = db.bucket("b").unwrap();

    bucket.put(b"k", b"v1").unwrap();
    bucket.put(b"k", b"v2").unwrap();

    assert_eq!(bucket.get(b"k").unwrap(), b"v2");
    assert_eq!(bucket.len().unwrap(), 1);
    assert_eq!(bucket.height().unwrap(), 1);
}

#[test]
fn test_absent_and_deleted_keys() {
    let (db, _dir) = open_db(3);
    let bucket = db.bucket("b").unwrap();

    assert!(matches!(bucket.get(b"never"), Err(Error::KeyNotFound)));
    assert!(matches!(bucket.delete(b"never"), Err(Error::KeyNotFound)));

    bucket.put(b"gone", b"v").unwrap();
    bucket.delete(b"gone").unwrap();
    assert!(matches!(bucket.get(b"gone"), Err(Error::KeyNotFound)));
    assert!(bucket.is_empty().unwrap());
}

#[test]
fn test_split_hook_reports_root_growth() {
    let events = Arc::new(Mutex::new(Vec::<SplitEvent>::new()));
    let sink = Arc::clone(&events);

    let dir = tempdir().unwrap();
    let config = Config::default()
        .max_keys_per_node(2)
        .sync_writes(false)
        .on_split(move |event| sink.lock().push(event.clone()));
    let db = Db::open(dir.path().join("test.db"), config).unwrap();
    let bucket = db.bucket("b").unwrap();

    bucket.put(b"a", b"1").unwrap();
    bucket.put(b"b", b"2").unwrap();
    assert!(events.lock().is_empty());

    bucket.put(b"c", b"3").unwrap();
    let recorded = events.lock().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0],
        SplitEvent {
            bucket: "b".into(),
            page_id: PageId::new(1),
            sibling: PageId::new(3),
            kind: NodeKind::Leaf,
            new_root: Some(PageId::new(2)),
        }
    );
    assert_eq!(bucket.root(), PageId::new(2));

    // Overwriting never splits.
    bucket.put(b"c", b"4").unwrap();
    assert_eq!(events.lock().len(), 1);
}

#[test]
fn test_split_hook_sees_internal_splits() {
    let events = Arc::new(Mutex::new(Vec::<SplitEvent>::new()));
    let sink = Arc::clone(&events);

    let dir = tempdir().unwrap();
    let config = Config::default()
        .max_keys_per_node(2)
        .sync_writes(false)
        .on_split(move |event| sink.lock().push(event.clone()));
    let db = Db::open(dir.path().join("test.db"), config).unwrap();
    let bucket = db.bucket("b").unwrap();

    for i in 0..20u8 {
        bucket.put(&[b'a' + i], b"v").unwrap();
    }

    let recorded = events.lock();
    assert!(recorded.iter().any(|e| e.kind == NodeKind::Internal));
    let grown = recorded.iter().filter(|e| e.new_root.is_some()).count();
    assert_eq!(grown + 1, bucket.height().unwrap());
}

#[test]
fn test_reclaimed_leaf_id_is_reused_first() {
    let (db, _dir) = open_db(2);
    let first = db.bucket("first").unwrap();

    for k in [b"a", b"b", b"c"] {
        first.put(k, b"v").unwrap();
    }
    // Leaf 1 holds "a" alone after the split.
    first.delete(b"a").unwrap();
    assert!(db.free_pages().is_empty());
    first.flush().unwrap();
    assert_eq!(db.free_pages(), vec![PageId::new(1)]);

    let second = db.bucket("second").unwrap();
    assert_eq!(second.root(), PageId::new(1));
    assert!(db.free_pages().is_empty());

    second.put(b"x", b"y").unwrap();
    assert_eq!(first.entries().unwrap().len(), 2);
    assert_eq!(second.get(b"x").unwrap(), b"y");
    first.verify().unwrap();
    second.verify().unwrap();
}

#[test]
fn test_only_child_leaf_is_kept() {
    let (db, _dir) = open_db(2);
    let bucket = db.bucket("b").unwrap();

    for k in [b"a", b"b", b"c"] {
        bucket.put(k, b"v").unwrap();
    }
    for k in [b"a", b"b", b"c"] {
        bucket.delete(k).unwrap();
    }

    // The right leaf was its parent's last child and stays.
    assert!(bucket.is_empty().unwrap());
    bucket.flush().unwrap();
    assert_eq!(db.free_pages(), vec![PageId::new(1)]);
    bucket.verify().unwrap();

    bucket.put(b"again", b"v").unwrap();
    assert_eq!(bucket.get(b"again").unwrap(), b"v");
}

#[test]
fn test_input_validation() {
    let (db, _dir) = open_db(3);
    let bucket = db.bucket("b").unwrap();

    assert!(matches!(bucket.put(b"", b"v"), Err(Error::EmptyKey)));
    assert!(matches!(
        bucket.put(&[b'k'; 101], b"v"),
        Err(Error::CapacityExceeded { what: "key", .. })
    ));
    assert!(matches!(
        bucket.put(b"k", &[b'v'; 1001]),
        Err(Error::CapacityExceeded { what: "value", .. })
    ));

    bucket.put(&[b'k'; 100], &[b'v'; 1000]).unwrap();
    assert_eq!(bucket.get(&[b'k'; 100]).unwrap(), vec![b'v'; 1000]);
}

#[test]
fn test_buckets_are_independent() {
    let (db, _dir) = open_db(2);
    let fruits = db.bucket("fruits").unwrap();
    let colors = db.bucket("colors").unwrap();

    fruits.put(b"apple", b"red").unwrap();
    colors.put(b"apple", b"#ff0000").unwrap();

    assert_eq!(fruits.get(b"apple").unwrap(), b"red");
    assert_eq!(colors.get(b"apple").unwrap(), b"#ff0000");
    assert_ne!(fruits.root(), colors.root());
    assert_eq!(db.bucket_names(), vec!["fruits", "colors"]);
}

#[test]
fn test_released_page_is_not_reused_before_flush() {
    let (db, _dir) = open_db(2);
    let first = db.bucket("first").unwrap();
    for k in [b"a", b"b", b"c"] {
        first.put(k, b"v").unwrap();
    }
    first.flush().unwrap();
    first.delete(b"a").unwrap();

    // Page 1 is still the on-disk leaf of "first", so a new bucket must
    // not take it over.
    let second = db.bucket("second").unwrap();
    assert_ne!(second.root(), PageId::new(1));
    second.put(b"x", b"y").unwrap();
    second.flush().unwrap();
    assert!(db.free_pages().is_empty());

    first.flush().unwrap();
    assert_eq!(db.free_pages(), vec![PageId::new(1)]);
}

#[test]
fn test_binary_values_round_trip() {
    let (db, _dir) = open_db(3);
    let bucket = db.bucket("binary").unwrap();
    let values: [&[u8]; 4] = [&[42, 0, 0, 0], &[0], &[], &[0, 7, 0]];

    for (i, value) in values.iter().enumerate() {
        bucket.put(&[b'a' + i as u8], value).unwrap();
    }
    for (i, value) in values.iter().enumerate() {
        assert_eq!(bucket.get(&[b'a' + i as u8]).unwrap(), *value);
    }
    bucket.verify().unwrap();
}

#[test]
fn test_page_ids_are_unique_across_buckets() {
    let (db, _dir) = open_db(2);
    let buckets: Vec<_> = (0..4).map(|i| db.bucket(&format!("b{}", i)).unwrap()).collect();

    for (i, bucket) in buckets.iter().enumerate() {
        for k in 0..(10 + i as u8) {
            bucket.put(&[b'a' + k], b"v").unwrap();
        }
    }

    let mut seen = HashSet::new();
    for bucket in &buckets {
        bucket.verify().unwrap();
        let chart = bucket.to_mermaid().unwrap();
        for line in chart.lines().filter(|l| l.contains("[\"")) {
            let id = line.trim().split('[').next().unwrap().to_string();
            assert!(seen.insert(id), "page shared between buckets");
        }
    }
}

#[test]
fn test_concurrent_writers_on_separate_buckets() {
    let (db, _dir) = open_db(3);
    let db = Arc::new(db);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let bucket = db.bucket(&format!("thread-{}", t)).unwrap();
                for i in 0..100u32 {
                    let key = format!("key-{:04}", i);
                    bucket.put(key.as_bytes(), &i.to_le_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        let bucket = db.bucket(&format!("thread-{}", t)).unwrap();
        assert_eq!(bucket.len().unwrap(), 100);
        assert_eq!(bucket.get(b"key-0042").unwrap(), 42u32.to_le_bytes());
        bucket.verify().unwrap();
    }
}

#[test]
fn test_readers_alongside_writer() {
    let (db, _dir) = open_db_with(Config::default().max_keys_per_node(4).value_size(200));
    let bucket = db.bucket("shared").unwrap();
    for i in 0..50u32 {
        bucket.put(format!("seed-{:03}", i).as_bytes(), b"v").unwrap();
    }

    let writer = {
        let bucket = bucket.clone();
        thread::spawn(move || {
            for i in 0..200u32 {
                bucket.put(format!("new-{:03}", i).as_bytes(), b"v").unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let bucket = bucket.clone();
            thread::spawn(move || {
                for i in 0..50u32 {
                    assert_eq!(bucket.get(format!("seed-{:03}", i).as_bytes()).unwrap(), b"v");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(bucket.len().unwrap(), 250);
    bucket.verify().unwrap();
}
