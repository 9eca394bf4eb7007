//! Watch delivery through the facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use txfs_kernel::{MkdirOptions, Vfs, WatchEventType, WatchOptions, WriteOptions};

async fn wait_for(counter: &AtomicUsize, expected: usize) {
    for _ in 0..100 {
        if counter.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn listener_runs_after_the_mutation_returns() {
    let vfs = Vfs::memory();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&seen);
    let counter = Arc::clone(&hits);
    vfs.watch_with_listener("/", WatchOptions::default(), move |event| {
        sink.lock().unwrap().push(event.filename);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    vfs.write_file("/a.txt", b"x", WriteOptions::default())
        .await
        .unwrap();
    // the current-thread runtime has not yielded to the listener task yet
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    wait_for(&hits, 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn recursive_and_direct_watchers_see_different_names() {
    let vfs = Vfs::memory();
    vfs.mkdir("/proj/src", MkdirOptions::recursive()).await.unwrap();

    let mut root = vfs.watch("/", WatchOptions::recursive());
    let mut flat_root = vfs.watch("/", WatchOptions::default());
    let mut src = vfs.watch("/proj/src", WatchOptions::default());

    vfs.write_file("/proj/src/main.rs", b"fn main() {}", WriteOptions::default())
        .await
        .unwrap();

    let event = root.recv().await.unwrap();
    assert_eq!(event.filename, "proj/src/main.rs");
    assert_eq!(event.path, "/proj/src/main.rs");
    assert_eq!(event.event_type, WatchEventType::Rename);

    assert_eq!(src.recv().await.unwrap().filename, "main.rs");
    assert!(flat_root.try_recv().is_none());
}

#[tokio::test]
async fn removed_watcher_stops_receiving() {
    let vfs = Vfs::memory();
    let mut watcher = vfs.watch("/", WatchOptions::default());
    let signal = watcher.signal();

    assert!(vfs.remove_watcher(watcher.id()));
    assert!(signal.is_cancelled());

    vfs.write_file("/a", b"x", WriteOptions::default()).await.unwrap();
    assert!(watcher.recv().await.is_none());
}

#[tokio::test]
async fn panicking_listener_does_not_affect_mutation_or_peers() {
    let vfs = Vfs::memory();
    let hits = Arc::new(AtomicUsize::new(0));

    vfs.watch_with_listener("/", WatchOptions::default(), |_| panic!("bad listener"));
    let counter = Arc::clone(&hits);
    vfs.watch_with_listener("/", WatchOptions::default(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    vfs.write_file("/a", b"1", WriteOptions::default()).await.unwrap();
    vfs.write_file("/a", b"2", WriteOptions::default()).await.unwrap();
    wait_for(&hits, 2).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(vfs.read_file("/a").await.unwrap(), b"2");
}

#[tokio::test]
async fn symlink_and_link_announce_new_names() {
    let vfs = Vfs::memory();
    vfs.write_file("/target", b"x", WriteOptions::default()).await.unwrap();
    let mut watcher = vfs.watch("/", WatchOptions::default());

    vfs.symlink("/target", "/soft").await.unwrap();
    vfs.link("/target", "/hard").await.unwrap();

    let names: Vec<_> = std::iter::from_fn(|| watcher.try_recv())
        .map(|e| (e.event_type, e.filename))
        .collect();
    assert_eq!(
        names,
        vec![
            (WatchEventType::Rename, "soft".to_string()),
            (WatchEventType::Rename, "hard".to_string()),
        ]
    );
}
