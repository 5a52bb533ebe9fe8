use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use quiver::error::{QuiverError, Result};
use quiver::pool::{PartitionKey, SlotKind, WriterHandle, WriterPool};
use quiver::writer::{Document, IndexWriter};

/// Minimal writer that records how often it was opened and closed.
#[derive(Debug)]
struct CountingWriter {
    serial: usize,
    open: bool,
    pending: u64,
    live: Arc<AtomicUsize>,
}

impl CountingWriter {
    fn open(serial: usize, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            serial,
            open: true,
            pending: 0,
            live: live.clone(),
        }
    }
}

impl IndexWriter for CountingWriter {
    fn add_document(&mut self, _doc: Document) -> Result<()> {
        if !self.open {
            return Err(QuiverError::index("closed"));
        }
        self.pending += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.pending = 0;
        Ok(())
    }

    fn pending_docs(&self) -> u64 {
        self.pending
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        !self.open
    }
}

struct Fixture {
    pool: Arc<WriterPool<CountingWriter>>,
    live: Arc<AtomicUsize>,
    materialized: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            pool: Arc::new(WriterPool::new()),
            live: Arc::new(AtomicUsize::new(0)),
            materialized: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn register_proxy(&self, key: &str) {
        let live = self.live.clone();
        let materialized = self.materialized.clone();
        self.pool
            .check_in_fn(key, move |_: &PartitionKey| {
                let serial = materialized.fetch_add(1, Ordering::SeqCst);
                Ok(CountingWriter::open(serial, &live))
            })
            .unwrap();
    }

    fn handle(&self, serial: usize) -> WriterHandle<CountingWriter> {
        WriterHandle::new(CountingWriter::open(serial, &self.live))
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn materialized(&self) -> usize {
        self.materialized.load(Ordering::SeqCst)
    }
}

#[test]
fn test_never_checked_in_keys_are_not_found() {
    let fixture = Fixture::new();
    for key in ["a", "part-00000", "Z"] {
        assert!(fixture.pool.check_out(key).unwrap_err().is_not_found());
    }
}

#[test]
fn test_proxy_lifecycle_scenario() {
    let fixture = Fixture::new();
    fixture.register_proxy("P1");

    let h1 = fixture.pool.check_out("P1").unwrap();
    assert_eq!(fixture.materialized(), 1);

    fixture.pool.check_in("P1", h1.clone()).unwrap();
    let again = fixture.pool.check_out("P1").unwrap();
    assert_eq!(again, h1);
    assert_eq!(fixture.materialized(), 1);

    fixture.pool.remove("P1").unwrap();
    assert!(h1.is_closed());
    assert_eq!(fixture.live(), 0);
    assert!(fixture.pool.check_out("P1").unwrap_err().is_not_found());
}

#[test]
fn test_concrete_lifecycle_scenario() {
    let fixture = Fixture::new();
    let h = fixture.handle(0);
    fixture.pool.check_in("A", h.clone()).unwrap();

    let out = fixture.pool.check_out("A").unwrap();
    assert_eq!(out, h);
    assert!(fixture.pool.check_out("A").unwrap_err().is_already_in_use());

    fixture.pool.check_in("A", out).unwrap();
    assert_eq!(fixture.pool.check_out("A").unwrap(), h);
}

#[test]
fn test_clean_leaves_every_key_not_found() {
    let fixture = Fixture::new();
    let keys: Vec<String> = (0..8).map(|i| PartitionKey::numbered(i).into_inner()).collect();
    for (i, key) in keys.iter().enumerate() {
        if i % 2 == 0 {
            fixture.register_proxy(key);
        } else {
            fixture.pool.check_in(key, fixture.handle(i)).unwrap();
        }
    }
    // Materialize a couple of proxies and keep one checked out.
    let _held = fixture.pool.check_out(&keys[0]).unwrap();
    let idle = fixture.pool.check_out(&keys[2]).unwrap();
    fixture.pool.check_in(&keys[2], idle).unwrap();
    assert_eq!(fixture.live(), 6);

    fixture.pool.clean().unwrap();

    assert_eq!(fixture.live(), 0);
    assert!(fixture.pool.is_empty());
    for key in &keys {
        assert!(fixture.pool.check_out(key).unwrap_err().is_not_found());
    }
}

#[test]
fn test_second_check_in_closes_first_handle() {
    let fixture = Fixture::new();
    let first = fixture.handle(1);
    let second = fixture.handle(2);

    fixture.pool.check_in("K", first.clone()).unwrap();
    assert_eq!(fixture.live(), 2);

    fixture.pool.check_in("K", second.clone()).unwrap();
    assert!(first.is_closed());
    assert_eq!(fixture.live(), 1);
    assert_eq!(fixture.pool.check_out("K").unwrap().lock().serial, 2);
}

#[test]
fn test_concurrent_check_outs_have_one_winner() {
    let fixture = Fixture::new();
    fixture.register_proxy("hot");

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let winners = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let pool = Arc::clone(&fixture.pool);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                barrier.wait();
                match pool.check_out("hot") {
                    Ok(handle) => winners.lock().unwrap().push(handle),
                    Err(e) => assert!(e.is_already_in_use(), "unexpected error: {e}"),
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.lock().unwrap().len(), 1);
    assert_eq!(fixture.materialized(), 1);
    assert_eq!(fixture.pool.slot_kind("hot"), Some(SlotKind::CheckedOut));
}

#[test]
fn test_exclusive_use_under_contention() {
    let fixture = Fixture::new();
    let keys = ["k0", "k1", "k2"];
    for key in keys {
        fixture.register_proxy(key);
    }

    let in_use: Arc<Mutex<HashSet<&'static str>>> = Arc::new(Mutex::new(HashSet::new()));
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&fixture.pool);
            let in_use = Arc::clone(&in_use);
            thread::spawn(move || {
                let mut done = 0;
                let mut round = worker;
                while done < 50 {
                    let key = keys[round % keys.len()];
                    round += 1;
                    let handle = match pool.check_out(key) {
                        Ok(handle) => handle,
                        Err(e) if e.is_already_in_use() => {
                            thread::yield_now();
                            continue;
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    };

                    assert!(in_use.lock().unwrap().insert(key), "{key} handed out twice");
                    handle
                        .add_document(Document::new().with_field("worker", worker))
                        .unwrap();
                    assert!(in_use.lock().unwrap().remove(key));

                    pool.check_in(key, handle).unwrap();
                    done += 1;
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // One writer per key, ever.
    assert_eq!(fixture.materialized(), keys.len());
    assert_eq!(fixture.live(), keys.len());
    assert_eq!(fixture.pool.stats().check_outs, 8 * 50);

    fixture.pool.clean().unwrap();
    assert_eq!(fixture.live(), 0);
}

#[test]
fn test_remove_while_checked_out_then_reregister() {
    let fixture = Fixture::new();
    fixture.register_proxy("K");
    let stale = fixture.pool.check_out("K").unwrap();

    // A dead worker's key is reclaimed only by an explicit remove.
    fixture.pool.remove("K").unwrap();
    assert!(stale.is_closed());
    assert!(stale.add_document(Document::new()).is_err());

    fixture.register_proxy("K");
    let fresh = fixture.pool.check_out("K").unwrap();
    assert_ne!(fresh, stale);
    assert_eq!(fixture.materialized(), 2);
}

#[test]
fn test_stale_worker_cannot_clobber_reregistered_key() {
    let fixture = Fixture::new();
    fixture.register_proxy("K");
    let stale = fixture.pool.check_out("K").unwrap();
    fixture.pool.remove("K").unwrap();
    fixture.register_proxy("K");

    // The dead worker finally hands its closed writer back.
    assert!(fixture.pool.check_in("K", stale).is_err());
    assert_eq!(fixture.pool.slot_kind("K"), Some(SlotKind::IdleProxy));

    let fresh = fixture.pool.check_out("K").unwrap();
    assert!(fresh.add_document(Document::new()).is_ok());
    assert_eq!(fresh.lock().serial, 1);
    assert_eq!(fixture.live(), 1);
}

#[test]
fn test_creation_failure_then_retry_with_new_proxy() {
    let fixture = Fixture::new();
    fixture
        .pool
        .check_in_fn("K", |key: &PartitionKey| {
            Err(QuiverError::storage(format!("cannot open {key}")))
        })
        .unwrap();

    let err = fixture.pool.check_out("K").unwrap_err();
    assert!(matches!(err, QuiverError::ResourceCreationFailed { .. }));
    assert!(err.to_string().contains("cannot open K"));
    assert!(fixture.pool.check_out("K").unwrap_err().is_not_found());

    fixture.register_proxy("K");
    assert!(fixture.pool.check_out("K").is_ok());
}
