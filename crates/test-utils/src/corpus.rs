//! Deterministic text for dictionary training.
//!
//! zstd's trainer needs many samples sharing structure. These helpers build
//! clinic-note style sentences from fixed word lists, so every run trains on
//! the same bytes.

const SUBJECTS: &[&str] = &[
    "patient", "resident", "client", "visitor", "member", "guardian", "donor", "caller",
];
const VERBS: &[&str] =
    &["reported", "denied", "described", "mentioned", "confirmed", "noted", "requested"];
const OBJECTS: &[&str] = &[
    "mild headache",
    "shortness of breath",
    "follow-up appointment",
    "medication refill",
    "lower back pain",
    "seasonal allergies",
    "blood pressure check",
    "lab results review",
    "dietary changes",
    "sleep disturbance",
];
const CLINICS: &[&str] = &["north", "south", "riverside", "hillcrest", "downtown"];

/// Returns the `i`th note; the same `i` always yields the same text.
pub fn note(i: usize) -> String {
    let subject = SUBJECTS[i % SUBJECTS.len()];
    let verb = VERBS[(i / SUBJECTS.len()) % VERBS.len()];
    let object = OBJECTS[(i * 7 + 3) % OBJECTS.len()];
    let clinic = CLINICS[(i / 3) % CLINICS.len()];
    format!(
        "Visit {i} at {clinic} clinic: {subject} {verb} {object}. \
         Vitals recorded, plan discussed, next review in {} days.",
        (i % 28) + 2
    )
}

/// Returns `count` consecutive notes starting at 0.
pub fn notes(count: usize) -> Vec<String> {
    (0..count).map(note).collect()
}

/// Returns `count` notes as byte samples for dictionary training.
pub fn training_samples(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| note(i).into_bytes()).collect()
}
