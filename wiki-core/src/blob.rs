//! Blob Store (spec.md §4.1). Content-addressed immutable text blobs keyed
//! by SHA-256. Blobs are never updated; empty content is a legal, canonical
//! blob.

use crate::error::WikiResult;
use crate::hash::Sha256Hex;
use crate::model::{BlobId, ContentBlob};
use crate::store::WikiStore;

pub const DEFAULT_CONTENT_TYPE: &str = "markdown";

/// Inserts `content`, deduplicating by hash. Returns the existing blob if
/// one with the same hash already exists.
pub fn put(store: &WikiStore, content: &str, content_type: Option<&str>) -> WikiResult<ContentBlob> {
    let hash = Sha256Hex::of(content);
    store.transaction(|inner| {
        if let Some(&id) = inner.blob_by_hash.get(&hash) {
            return inner.get_blob(id);
        }
        let id = inner.next_blob_id();
        let blob = ContentBlob {
            id,
            hash: hash.clone(),
            content: content.to_owned(),
            content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_owned(),
            size: content.as_bytes().len(),
        };
        inner.blob_by_hash.insert(hash, id);
        inner.blobs.insert(id, blob.clone());
        Ok(blob)
    })
}

pub fn get(store: &WikiStore, id: BlobId) -> WikiResult<ContentBlob> {
    store.read(|inner| inner.get_blob(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_dedups_identical_content_by_hash() {
        let store = WikiStore::new();
        let a = put(&store, "hello world", None).unwrap();
        let b = put(&store, "hello world", None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.hash, Sha256Hex::of("hello world"));
    }

    #[test]
    fn put_distinguishes_different_content() {
        let store = WikiStore::new();
        let a = put(&store, "a", None).unwrap();
        let b = put(&store, "b", None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn empty_content_is_a_legal_canonical_blob() {
        let store = WikiStore::new();
        let blob = put(&store, "", None).unwrap();
        assert_eq!(blob.size, 0);
        assert_eq!(blob.content, "");
    }

    #[test]
    fn default_content_type_is_markdown() {
        let store = WikiStore::new();
        let blob = put(&store, "x", None).unwrap();
        assert_eq!(blob.content_type, "markdown");
    }

    #[test]
    fn get_returns_previously_put_blob() {
        let store = WikiStore::new();
        let blob = put(&store, "content", None).unwrap();
        let fetched = get(&store, blob.id).unwrap();
        assert_eq!(fetched.content, "content");
    }
}
