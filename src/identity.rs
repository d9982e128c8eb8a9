use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{normalize_email, StudentRecord};
use crate::roster::RosterEntry;

/// Rewrites identifying fields before a view leaves the engine.
///
/// Both methods are keyed by the identity's email so every view of one
/// student (roster row, LMS record, report line) gets the same alias.
pub trait Pseudonymizer: Send + Sync {
    fn email(&self, email: &str) -> String;
    fn name(&self, email: &str, name: &str) -> String;
}

/// Passes identities through unchanged.
pub struct PlainIdentity;

impl Pseudonymizer for PlainIdentity {
    fn email(&self, email: &str) -> String {
        email.to_string()
    }

    fn name(&self, _email: &str, name: &str) -> String {
        name.to_string()
    }
}

/// Deterministic salted-hash pseudonyms, stable across calls and views.
pub struct HashedPseudonyms {
    salt: String,
}

impl HashedPseudonyms {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.to_string(),
        }
    }

    fn digest(&self, kind: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(normalize_email(value).as_bytes());
        hasher
            .finalize()
            .iter()
            .take(4)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl Pseudonymizer for HashedPseudonyms {
    fn email(&self, email: &str) -> String {
        if email.trim().is_empty() {
            return String::new();
        }
        format!("student-{}@example.invalid", self.digest("email", email))
    }

    fn name(&self, email: &str, name: &str) -> String {
        if email.trim().is_empty() {
            return name.to_string();
        }
        format!("Student {}", self.digest("name", email))
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Reconciled {
    Matched {
        roster: RosterEntry,
        student: StudentRecord,
    },
    /// Placeholder for a roster row the LMS does not know.
    Unmatched { roster: RosterEntry },
}

impl Reconciled {
    pub fn roster(&self) -> &RosterEntry {
        match self {
            Reconciled::Matched { roster, .. } | Reconciled::Unmatched { roster } => roster,
        }
    }

    pub fn student(&self) -> Option<&StudentRecord> {
        match self {
            Reconciled::Matched { student, .. } => Some(student),
            Reconciled::Unmatched { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Reconciled::Matched { .. })
    }
}

/// Email-keyed index over LMS records, merged across departments.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_email: HashMap<String, StudentRecord>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = StudentRecord>) -> Self {
        let mut index = Self::new();
        index.merge(records);
        index
    }

    /// Adds records whose email is not yet mapped; the first record seen for
    /// an email keeps it. Returns how many new emails were indexed.
    pub fn merge(&mut self, records: impl IntoIterator<Item = StudentRecord>) -> usize {
        let mut added = 0;
        for record in records {
            let email = normalize_email(&record.email);
            if email.is_empty() || self.by_email.contains_key(&email) {
                continue;
            }
            self.by_email.insert(email, record);
            added += 1;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    pub fn get(&self, email: &str) -> Option<&StudentRecord> {
        self.by_email.get(&normalize_email(email))
    }

    pub fn canonical_id(&self, email: &str) -> Option<&str> {
        self.get(email).map(|record| record.id.as_str())
    }

    /// Joins roster rows against the index, applying `pseudonyms` to every
    /// emitted email and name.
    pub fn reconcile(&self, roster: &[RosterEntry], pseudonyms: &dyn Pseudonymizer) -> Vec<Reconciled> {
        roster
            .iter()
            .map(|entry| {
                let mut shown = entry.clone();
                shown.email = pseudonyms.email(&entry.email);
                shown.name = pseudonyms.name(&entry.email, &entry.name);

                match self.get(&entry.email) {
                    Some(record) => {
                        let mut student = record.clone();
                        student.email = shown.email.clone();
                        let full_name = record.full_name();
                        let alias = pseudonyms.name(&record.email, &full_name);
                        // An unchanged name keeps its first/last split.
                        if alias != full_name {
                            student.first_name = alias;
                            student.last_name.clear();
                        }
                        Reconciled::Matched {
                            roster: shown,
                            student,
                        }
                    }
                    None => Reconciled::Unmatched { roster: shown },
                }
            })
            .collect()
    }
}
