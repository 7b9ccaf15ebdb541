//! Diff Engine (spec.md §4.6). Summary and page-scope diffs between two
//! revisions — here always a CR's base and head.

use crate::error::WikiResult;
use crate::hash::Sha256Hex;
use crate::id::DocKey;
use crate::model::*;
use crate::revision;
use crate::store::WikiStore;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
}

#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub doc_key: DocKey,
    pub change_type: ChangeType,
    pub title: String,
    pub is_group: bool,
}

#[derive(Debug, Clone)]
pub struct PageDiff {
    pub doc_key: DocKey,
    pub base: Option<PageSide>,
    pub head: Option<PageSide>,
}

#[derive(Debug, Clone)]
pub struct PageSide {
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub content: String,
}

/// Compares normalized items of a CR's base and head revisions. A key
/// present only on one (non-deleted) side is added/deleted; otherwise any
/// difference in `{title, slug, is_group, is_published, parent_key,
/// order_index, content_hash}` is modified. Deleted items are treated as
/// absent.
pub fn summary(store: &WikiStore, cr_id: ChangeRequestId) -> WikiResult<Vec<SummaryEntry>> {
    let cr = store.read(|inner| inner.get_change_request(cr_id))?;
    let base_items = live_view(store, cr.base_revision_id);
    let head_items = live_view(store, cr.head_revision_id);

    let mut keys: Vec<DocKey> =
        base_items.keys().chain(head_items.keys()).cloned().collect();
    keys.sort();
    keys.dedup();

    let mut entries = Vec::new();
    for key in keys {
        let base = base_items.get(&key);
        let head = head_items.get(&key);
        let entry = match (base, head) {
            (None, Some(h)) => Some(SummaryEntry {
                doc_key: key,
                change_type: ChangeType::Added,
                title: h.title.clone(),
                is_group: h.is_group,
            }),
            (Some(b), None) => Some(SummaryEntry {
                doc_key: key,
                change_type: ChangeType::Deleted,
                title: b.title.clone(),
                is_group: b.is_group,
            }),
            (Some(b), Some(h)) => {
                if items_differ(b, h) {
                    Some(SummaryEntry {
                        doc_key: key,
                        change_type: ChangeType::Modified,
                        title: h.title.clone(),
                        is_group: h.is_group,
                    })
                } else {
                    None
                }
            }
            (None, None) => None,
        };
        if let Some(entry) = entry {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn items_differ(a: &ItemSnapshot, b: &ItemSnapshot) -> bool {
    a.title != b.title
        || a.slug != b.slug
        || a.is_group != b.is_group
        || a.is_published != b.is_published
        || a.parent_key != b.parent_key
        || a.order_index != b.order_index
        || a.content_hash != b.content_hash
}

/// Both sides including blob content.
pub fn page(store: &WikiStore, cr_id: ChangeRequestId, doc_key: &DocKey) -> WikiResult<PageDiff> {
    let cr = store.read(|inner| inner.get_change_request(cr_id))?;
    let base_side = page_side(store, cr.base_revision_id, doc_key);
    let head_side = page_side(store, cr.head_revision_id, doc_key);
    Ok(PageDiff { doc_key: doc_key.clone(), base: base_side, head: head_side })
}

fn page_side(store: &WikiStore, revision_id: RevisionId, doc_key: &DocKey) -> Option<PageSide> {
    let items = revision::items(store, revision_id);
    let item = items.get(doc_key)?;
    if item.is_deleted {
        return None;
    }
    let content = store.read(|inner| inner.blob_content(item.content_blob_id));
    Some(PageSide {
        title: item.title.clone(),
        slug: item.slug.clone(),
        is_group: item.is_group,
        is_published: item.is_published,
        content,
    })
}

/// `{doc_key -> ItemSnapshot}` for every non-deleted item of `revision_id`,
/// the normalized view the merger and diff engine both compare on.
pub(crate) fn live_view(store: &WikiStore, revision_id: RevisionId) -> HashMap<DocKey, ItemSnapshot> {
    let items = revision::items(store, revision_id);
    let blob_hashes: HashMap<BlobId, Sha256Hex> =
        store.read(|inner| inner.blobs.iter().map(|(id, b)| (*id, b.hash.clone())).collect());

    items
        .into_iter()
        .filter(|(_, item)| !item.is_deleted)
        .map(|(key, item)| {
            let snapshot = ItemSnapshot {
                doc_key: item.doc_key.clone(),
                title: item.title,
                slug: item.slug,
                is_group: item.is_group,
                is_published: item.is_published,
                parent_key: item.parent_key,
                order_index: item.order_index,
                content_hash: item.content_blob_id.and_then(|id| blob_hashes.get(&id).cloned()),
            };
            (key, snapshot)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_request;
    use crate::editor;
    use crate::store::{Context, Role};
    use crate::tree;

    fn ctx() -> Context {
        Context::new("alice", [Role::WikiManager])
    }

    #[test]
    fn summary_reports_added_and_modified_pages() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();

        let page =
            editor::create_page(&store, cr.id, None, "New Page", None, false, true, "hi", None)
                .unwrap();

        let entries = summary(&store, cr.id).unwrap();
        assert!(entries
            .iter()
            .any(|e| e.doc_key == page.doc_key && e.change_type == ChangeType::Added));
    }

    #[test]
    fn delete_cascade_shows_up_as_deleted_in_summary() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let group_doc = tree::append_new(&store, &ctx(), root, "Group", true, None).unwrap();
        tree::append_new(&store, &ctx(), group_doc.id, "Child", false, None).unwrap();

        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();
        let group_key = group_doc.doc_key.clone().unwrap();
        let head_items = revision::items(&store, cr.head_revision_id);
        let child = head_items
            .values()
            .find(|i| i.parent_key.as_ref() == Some(&group_key))
            .expect("child present in cloned head")
            .doc_key
            .clone();

        editor::delete_page(&store, cr.id, &group_key).unwrap();
        let entries = summary(&store, cr.id).unwrap();
        let deleted: Vec<&DocKey> = entries
            .iter()
            .filter(|e| e.change_type == ChangeType::Deleted)
            .map(|e| &e.doc_key)
            .collect();
        assert!(deleted.contains(&&group_key));
        assert!(deleted.contains(&&child));
    }
}
