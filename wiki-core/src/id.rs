//! Identifier types.
//!
//! Internal ids (`SpaceId`, `DocumentId`, ...) are autoincrement-style
//! numeric handles, the sort a relational store would hand out as primary
//! keys. `DocKey` is the separate, stable 12-char opaque identifier that
//! correlates one document across every revision it appears in (spec.md §3,
//! §6 "Identifiers").

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub fn new(n: u64) -> Self {
                Self(n)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(SpaceId);
numeric_id!(DocumentId);
numeric_id!(BlobId);
numeric_id!(RevisionId);
numeric_id!(ChangeRequestId);

/// A monotonic counter used by the store to mint the ids above, mirroring
/// the autoincrement primary key a relational backend would provide.
#[derive(Debug, Default)]
pub struct IdCounter(AtomicU64);

impl IdCounter {
    pub fn next(&self) -> u64 {
        // ids start at 1 so that 0 can be reserved as "unset" if ever needed
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The stable, cross-revision correlation key for a document (spec.md §3,
/// §6). 12 characters of uniform random alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey(String);

const DOC_KEY_LEN: usize = 12;

impl DocKey {
    pub fn generate() -> Self {
        let s: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(DOC_KEY_LEN)
            .map(char::from)
            .collect();
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Display for DocKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_keys_are_twelve_chars_and_unique() {
        let a = DocKey::generate();
        let b = DocKey::generate();
        assert_eq!(a.as_str().len(), DOC_KEY_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn id_counter_is_monotonic_and_starts_at_one() {
        let counter = IdCounter::default();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.next(), 3);
    }
}
