//! Concurrent writers and readers sharing one database.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

mod common;

use std::{
    sync::{Arc, Barrier},
    thread,
};

use common::{Fixture, Patient, patient_options};
use sqlkv_store::{Error, retry_on_key_collision};
use sqlkv_test_utils::test_retry_config;
use sqlkv_types::{config::CompressionMode, idgen};

const THREADS: usize = 8;

#[test]
fn test_shared_key_has_one_winner() {
    let fixture = Fixture::in_memory();
    let patients = Arc::new(fixture.patients(patient_options(CompressionMode::Zstd)));
    let barrier = Arc::new(Barrier::new(THREADS));
    let shared_id = idgen::generate_id();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let patients = Arc::clone(&patients);
            let barrier = Arc::clone(&barrier);
            let ctx = fixture.ctx.clone();
            thread::spawn(move || {
                let mut patient = Patient { id: shared_id, ..Patient::sample(i) };
                barrier.wait();
                patients.insert(&ctx, &mut patient)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, Error::PrimaryKeyConstraint { .. }), "got {err}");
    }
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), 1);
}

#[test]
fn test_losers_retry_with_fresh_keys() {
    let fixture = Fixture::in_memory();
    let patients = Arc::new(fixture.patients(patient_options(CompressionMode::None)));
    let barrier = Arc::new(Barrier::new(THREADS));
    let shared_id = idgen::generate_id();
    let config = test_retry_config();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let patients = Arc::clone(&patients);
            let barrier = Arc::clone(&barrier);
            let ctx = fixture.ctx.clone();
            let config = config.clone();
            thread::spawn(move || {
                barrier.wait();
                retry_on_key_collision(&ctx, &config, |attempt| {
                    let id = if attempt == 1 { shared_id } else { idgen::generate_id() };
                    let mut patient = Patient { id, ..Patient::sample(i) };
                    patients.insert(&ctx, &mut patient)?;
                    Ok(patient.id)
                })
            })
        })
        .collect();

    let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), THREADS);
    assert!(ids.contains(&shared_id));
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), THREADS as i64);
}

#[test]
fn test_readers_see_committed_rows_while_writing() {
    let fixture = Fixture::in_memory();
    let patients = Arc::new(fixture.patients(patient_options(CompressionMode::Zstd)));
    let mut seed = Patient::sample(0);
    patients.insert(&fixture.ctx, &mut seed).unwrap();

    let writer = {
        let patients = Arc::clone(&patients);
        let ctx = fixture.ctx.clone();
        thread::spawn(move || {
            for i in 1..200 {
                patients.insert(&ctx, &mut Patient::sample(i)).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let patients = Arc::clone(&patients);
            let ctx = fixture.ctx.clone();
            let expected = seed.clone();
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..200 {
                    assert_eq!(patients.get(&ctx, expected.id).unwrap().unwrap(), expected);
                    let count = patients.count(&ctx, None, &[]).unwrap();
                    assert!(count >= last, "count went backwards");
                    last = count;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), 200);
    let stats = fixture.db.stats();
    assert!(stats.reads > 0 && stats.writes >= 200);
}
