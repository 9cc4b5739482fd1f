//! Collection behaviour across compression modes and constraints.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

mod common;

use common::{Fixture, Patient, patient_options};
use proptest::prelude::*;
use rusqlite::types::Value;
use sqlkv_store::{Error, ErrorCode, SelectOptions};
use sqlkv_test_utils::strategies::{arb_compression_mode, arb_phone, arb_text};
use sqlkv_types::{RecordFlags, config::CompressionMode};

fn stored_flags(fixture: &Fixture, id: i64) -> RecordFlags {
    fixture
        .db
        .read(&fixture.ctx, |conn| {
            Ok(conn.query_row("SELECT flags FROM patients WHERE id = ?1", [id], |row| {
                row.get::<_, i64>(0)
            })?)
        })
        .map(RecordFlags::from_bits)
        .unwrap()
}

#[test]
fn test_round_trip_for_every_mode() {
    for mode in [CompressionMode::None, CompressionMode::Zstd, CompressionMode::Dictionary] {
        let fixture = Fixture::in_memory();
        let patients = fixture.patients(patient_options(mode));
        let mut patient = Patient::sample(3);
        let key = patients.insert(&fixture.ctx, &mut patient).unwrap();
        assert_eq!(key, Value::Integer(patient.id));

        let loaded = patients.get(&fixture.ctx, patient.id).unwrap().unwrap();
        assert_eq!(loaded, patient, "mode {mode:?}");
    }
}

#[test]
fn test_flags_record_compression() {
    let fixture = Fixture::in_memory();
    let raw = fixture.patients(patient_options(CompressionMode::None));
    let mut patient = Patient::sample(1);
    raw.insert(&fixture.ctx, &mut patient).unwrap();
    assert_eq!(stored_flags(&fixture, patient.id), RecordFlags::empty());

    let fixture = Fixture::in_memory();
    let zstd = fixture.patients(patient_options(CompressionMode::Zstd));
    let mut patient = Patient::sample(2);
    zstd.insert(&fixture.ctx, &mut patient).unwrap();
    let flags = stored_flags(&fixture, patient.id);
    assert_eq!(flags.bits() & RecordFlags::COMPRESSED, RecordFlags::COMPRESSED);
    assert_eq!(flags.dictionary_version(), 0);
}

#[test]
fn test_dictionary_mode_before_training_uses_zstd() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::Dictionary));
    assert_eq!(patients.dictionary_version(), 0);

    let mut patient = Patient::sample(9);
    patients.insert(&fixture.ctx, &mut patient).unwrap();
    let flags = stored_flags(&fixture, patient.id);
    assert_eq!(flags.bits() & RecordFlags::DICTIONARY, 0);
    assert_eq!(flags.bits() & RecordFlags::COMPRESSED, RecordFlags::COMPRESSED);
}

#[test]
fn test_unique_and_primary_key_violations() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::Zstd));
    let mut first = Patient::sample(1);
    patients.insert(&fixture.ctx, &mut first).unwrap();

    let mut same_email = Patient { email: first.email.clone(), ..Patient::sample(2) };
    let err = patients.insert(&fixture.ctx, &mut same_email).unwrap_err();
    assert!(matches!(err, Error::UniqueConstraint { .. }), "got {err}");
    assert_eq!(err.code(), ErrorCode::UniqueConstraint);
    assert!(!err.is_retryable());

    let mut same_id = Patient { id: first.id, ..Patient::sample(3) };
    let err = patients.insert(&fixture.ctx, &mut same_id).unwrap_err();
    assert!(matches!(err, Error::PrimaryKeyConstraint { .. }), "got {err}");
    assert!(err.is_retryable());
}

#[test]
fn test_upsert_replaces_columns_and_payload() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::Zstd));
    let mut patient = Patient::sample(4);
    patients.insert(&fixture.ctx, &mut patient).unwrap();

    patient.email = "changed@example.com".to_string();
    patient.visits = 40;
    patients.upsert(&fixture.ctx, &mut patient).unwrap();

    let by_email =
        patients.get_unique(&fixture.ctx, "email", "changed@example.com".to_string()).unwrap();
    assert_eq!(by_email.unwrap(), patient);
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), 1);
}

#[test]
fn test_nullable_column_round_trips() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::None));
    let mut without_phone = Patient { phone: None, ..Patient::sample(1) };
    let mut with_phone = Patient { phone: Some("555-0100".into()), ..Patient::sample(2) };
    patients.insert(&fixture.ctx, &mut without_phone).unwrap();
    patients.insert(&fixture.ctx, &mut with_phone).unwrap();

    let options = SelectOptions { filter: Some("phone IS NULL"), ..SelectOptions::default() };
    let missing = patients.select(&fixture.ctx, &options, &[]).unwrap();
    assert_eq!(missing, vec![without_phone]);
}

#[test]
fn test_soft_delete_lifecycle() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::Zstd));
    let mut patient = Patient::sample(5);
    patients.insert(&fixture.ctx, &mut patient).unwrap();

    assert_eq!(patients.soft_delete(&fixture.ctx, patient.id).unwrap(), 1);
    assert!(patients.get(&fixture.ctx, patient.id).unwrap().is_none());
    assert!(
        patients.get_unique(&fixture.ctx, "email", patient.email.clone()).unwrap().is_none()
    );
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), 0);
    assert!(stored_flags(&fixture, patient.id).is_soft_deleted());

    // The unique email stays taken while the row is soft-deleted.
    let mut twin = Patient { email: patient.email.clone(), ..Patient::sample(6) };
    assert!(matches!(
        patients.insert(&fixture.ctx, &mut twin),
        Err(Error::UniqueConstraint { .. })
    ));

    assert_eq!(patients.restore(&fixture.ctx, patient.id).unwrap(), 1);
    assert_eq!(patients.get(&fixture.ctx, patient.id).unwrap().unwrap(), patient);

    assert_eq!(patients.delete(&fixture.ctx, patient.id).unwrap(), 1);
    assert_eq!(patients.restore(&fixture.ctx, patient.id).unwrap(), 0);
    assert_eq!(patients.delete(&fixture.ctx, patient.id).unwrap(), 0);
}

#[test]
fn test_named_select_statement_is_reused() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::None));
    for i in 0..10 {
        patients.insert(&fixture.ctx, &mut Patient::sample(i)).unwrap();
    }
    let options = SelectOptions {
        filter: Some("phone IS NOT NULL"),
        order_by: Some("id DESC"),
        limit: Some(3),
        statement: Some("with_phone"),
    };
    let first = patients.select(&fixture.ctx, &options, &[]).unwrap();
    let second = patients.select(&fixture.ctx, &options, &[]).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].id > w[1].id));
}

#[test]
fn test_cancelled_context_skips_write() {
    let fixture = Fixture::in_memory();
    let patients = fixture.patients(patient_options(CompressionMode::None));
    let cancelled = fixture.ctx.child(None);
    cancelled.cancel();

    let err = patients.insert(&cancelled, &mut Patient::sample(1)).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(patients.count(&fixture.ctx, None, &[]).unwrap(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_insert_get_round_trip(
        mode in arb_compression_mode(),
        notes in arb_text(),
        phone in arb_phone(),
        visits in any::<u32>(),
    ) {
        let fixture = Fixture::in_memory();
        let patients = fixture.patients(patient_options(mode));
        let mut patient = Patient { notes, phone, visits, ..Patient::sample(0) };
        patients.insert(&fixture.ctx, &mut patient).unwrap();
        let loaded = patients.get(&fixture.ctx, patient.id).unwrap().unwrap();
        prop_assert_eq!(loaded, patient);
    }
}
