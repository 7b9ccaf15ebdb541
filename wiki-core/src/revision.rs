//! Revision Store (spec.md §4.2). Immutable snapshots of the entire tree
//! plus content-addressed blobs, with deterministic `tree_hash` /
//! `content_hash` fingerprints as the primary fast path for equality.

use crate::blob;
use crate::error::WikiResult;
use crate::hash::Sha256Hex;
use crate::id::DocKey;
use crate::model::*;
use crate::store::{Context, WikiStore};
use chrono::Utc;
use std::collections::HashMap;
use std::collections::HashSet;

/// Walks the live tree rooted at `space.root_group_id` in `lft` order,
/// assigning a `doc_key` to any document lacking one, and creates one
/// revision item per document.
pub fn snapshot_live(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    message: &str,
    parent_revision: Option<RevisionId>,
    working: bool,
    merge: bool,
) -> WikiResult<WikiRevision> {
    store.transaction(|inner| {
        let space = inner.get_space(space_id)?;

        let docs = match space.root_group_id {
            Some(root_id) => {
                let root = inner.get_document(root_id)?;
                inner.documents_under(&root)
            }
            None => Vec::new(),
        };

        // assign doc_key to any document lacking one
        let mut keyed_docs = Vec::with_capacity(docs.len());
        for mut doc in docs {
            if doc.doc_key.is_none() {
                let key = DocKey::generate();
                doc.doc_key = Some(key.clone());
                inner.doc_key_index.insert(key, doc.id);
                inner.documents.insert(doc.id, doc.clone());
            }
            keyed_docs.push(doc);
        }

        let id_to_key: HashMap<_, _> = keyed_docs
            .iter()
            .map(|d| (d.id, d.doc_key.clone().expect("doc_key assigned above")))
            .collect();

        let revision_id = inner.next_revision_id();
        let revision = WikiRevision {
            id: revision_id,
            space_id,
            parent_revision_id: parent_revision,
            change_request_id: None,
            message: message.to_owned(),
            is_working: working,
            is_merge: merge,
            tree_hash: Sha256Hex::of(""),
            content_hash: Sha256Hex::of(""),
            doc_count: 0,
            created_at: Utc::now(),
            created_by: ctx.principal.clone(),
        };
        inner.revisions.insert(revision_id, revision.clone());

        let mut items = HashMap::new();
        for doc in &keyed_docs {
            let content_blob = upsert_blob_locked(inner, &doc.content);
            let doc_key = doc.doc_key.clone().expect("doc_key assigned above");
            let item = WikiRevisionItem {
                revision_id,
                doc_key: doc_key.clone(),
                title: doc.title.clone(),
                slug: doc.slug.clone(),
                is_group: doc.is_group,
                is_published: doc.is_published,
                parent_key: doc.parent_id.and_then(|p| id_to_key.get(&p).cloned()),
                order_index: doc.sort_order,
                content_blob_id: Some(content_blob.id),
                is_deleted: false,
            };
            items.insert(doc_key, item);
        }
        inner.revision_items.insert(revision_id, items);

        recompute_hashes(inner, revision_id);
        inner.get_revision(revision_id)
    })
}

/// Shallow-copies all items of `base_revision` into a new revision, reusing
/// blob ids, and recomputes hashes.
pub fn clone_revision(
    store: &WikiStore,
    ctx: &Context,
    base_revision: RevisionId,
    working: bool,
) -> WikiResult<WikiRevision> {
    store.transaction(|inner| {
        let base = inner.get_revision(base_revision)?;
        let base_items = inner.revision_items(base_revision);

        let new_id = inner.next_revision_id();
        let new_revision = WikiRevision {
            id: new_id,
            space_id: base.space_id,
            parent_revision_id: Some(base_revision),
            change_request_id: None,
            message: base.message.clone(),
            is_working: working,
            is_merge: false,
            tree_hash: base.tree_hash.clone(),
            content_hash: base.content_hash.clone(),
            doc_count: base.doc_count,
            created_at: Utc::now(),
            created_by: ctx.principal.clone(),
        };
        inner.revisions.insert(new_id, new_revision);

        let mut new_items = HashMap::with_capacity(base_items.len());
        for (key, mut item) in base_items {
            item.revision_id = new_id;
            new_items.insert(key, item);
        }
        inner.revision_items.insert(new_id, new_items);

        recompute_hashes(inner, new_id);
        inner.get_revision(new_id)
    })
}

/// A denormalized view of a revision's items, each carrying its blob's
/// `content_hash`.
pub fn items(store: &WikiStore, revision_id: RevisionId) -> HashMap<DocKey, WikiRevisionItem> {
    store.read(|inner| inner.revision_items(revision_id))
}

pub fn get(store: &WikiStore, revision_id: RevisionId) -> WikiResult<WikiRevision> {
    store.read(|inner| inner.get_revision(revision_id))
}

/// Pre-order traversal of `items` via `parent_key` linkage, ordered at each
/// level by `order_index` ascending.
pub fn tree_order(items: &HashMap<DocKey, WikiRevisionItem>) -> Vec<DocKey> {
    let mut children: HashMap<Option<DocKey>, Vec<DocKey>> = HashMap::new();
    for (key, item) in items {
        children.entry(item.parent_key.clone()).or_default().push(key.clone());
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|k| items[k].order_index);
    }

    let mut ordered = Vec::with_capacity(items.len());
    let mut visited = HashSet::new();
    walk(None, &children, items, &mut ordered, &mut visited);
    ordered
}

fn walk(
    parent: Option<DocKey>,
    children: &HashMap<Option<DocKey>, Vec<DocKey>>,
    items: &HashMap<DocKey, WikiRevisionItem>,
    ordered: &mut Vec<DocKey>,
    visited: &mut HashSet<DocKey>,
) {
    let Some(kids) = children.get(&parent) else { return };
    for key in kids {
        if !visited.insert(key.clone()) {
            continue;
        }
        ordered.push(key.clone());
        walk(Some(key.clone()), children, items, ordered, visited);
    }
}

/// `tree_hash` = SHA-256 of the newline-joined
/// `"{doc_key}|{parent_key or ''}|{order_index or 0}|{slug or ''}"`.
/// `content_hash` = SHA-256 of the newline-joined
/// `"{doc_key}:{blob_hash or ''}"`. Both exclude deleted items and are
/// ordered by ascending `doc_key` (spec.md §4.2).
pub fn compute_hashes(
    items: &HashMap<DocKey, WikiRevisionItem>,
    blob_hash_of: impl Fn(Option<BlobId>) -> Option<Sha256Hex>,
) -> (Sha256Hex, Sha256Hex) {
    let mut keys: Vec<&DocKey> = items.values().filter(|i| !i.is_deleted).map(|i| &i.doc_key).collect();
    keys.sort();

    let mut tree_parts = Vec::with_capacity(keys.len());
    let mut content_parts = Vec::with_capacity(keys.len());
    for key in keys {
        let item = &items[key];
        tree_parts.push(format!(
            "{}|{}|{}|{}",
            item.doc_key,
            item.parent_key.as_ref().map(DocKey::as_str).unwrap_or(""),
            item.order_index,
            item.slug,
        ));
        let content_hash = blob_hash_of(item.content_blob_id);
        content_parts.push(format!(
            "{}:{}",
            item.doc_key,
            content_hash.as_ref().map(Sha256Hex::as_str).unwrap_or(""),
        ));
    }

    (Sha256Hex::of(tree_parts.join("\n")), Sha256Hex::of(content_parts.join("\n")))
}

pub(crate) fn recompute_hashes(inner: &mut crate::store::StoreInner, revision_id: RevisionId) {
    let items = inner.revision_items(revision_id);
    let blob_hashes: HashMap<BlobId, Sha256Hex> =
        inner.blobs.iter().map(|(id, b)| (*id, b.hash.clone())).collect();
    let (tree_hash, content_hash) =
        compute_hashes(&items, |blob_id| blob_id.and_then(|id| blob_hashes.get(&id).cloned()));
    let doc_count = items.values().filter(|i| !i.is_deleted).count();

    if let Some(revision) = inner.revisions.get_mut(&revision_id) {
        revision.tree_hash = tree_hash;
        revision.content_hash = content_hash;
        revision.doc_count = doc_count;
    }
}

fn upsert_blob_locked(inner: &mut crate::store::StoreInner, content: &str) -> ContentBlob {
    let hash = Sha256Hex::of(content);
    if let Some(&id) = inner.blob_by_hash.get(&hash) {
        return inner.blobs[&id].clone();
    }
    let id = inner.next_blob_id();
    let blob = ContentBlob {
        id,
        hash: hash.clone(),
        content: content.to_owned(),
        content_type: blob::DEFAULT_CONTENT_TYPE.to_owned(),
        size: content.as_bytes().len(),
    };
    inner.blob_by_hash.insert(hash, id);
    inner.blobs.insert(id, blob.clone());
    blob
}
