//! CR Editor (spec.md §4.5). Mutations against a change request's working
//! head revision. Every operation here recomputes the head's hashes on
//! exit.

use crate::error::{WikiError, WikiResult};
use crate::hash::Sha256Hex;
use crate::id::DocKey;
use crate::model::*;
use crate::revision;
use crate::slug;
use crate::store::WikiStore;
use std::collections::HashSet;

fn working_revision_id(
    inner: &crate::store::StoreInner,
    cr_id: ChangeRequestId,
) -> WikiResult<RevisionId> {
    Ok(inner.get_change_request(cr_id)?.head_revision_id)
}

/// Generates a fresh `doc_key`; `order_index` defaults to
/// `max(sibling.order_index) + 1`; `slug` defaults to a slugified `title`.
/// Stores content via the blob store.
#[allow(clippy::too_many_arguments)]
pub fn create_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    parent_key: Option<&DocKey>,
    title: &str,
    slug_override: Option<&str>,
    is_group: bool,
    is_published: bool,
    content: &str,
    order_index: Option<i64>,
) -> WikiResult<WikiRevisionItem> {
    store.transaction(|inner| {
        let revision_id = working_revision_id(inner, cr_id)?;
        let items = inner.revision_items(revision_id);

        if let Some(parent_key) = parent_key {
            if !items.contains_key(parent_key) {
                return Err(
                    WikiError::ParentNotInChangeRequest(parent_key.clone(), cr_id).into(),
                );
            }
        }

        let order_index = order_index.unwrap_or_else(|| {
            items
                .values()
                .filter(|i| i.parent_key.as_ref() == parent_key && !i.is_deleted)
                .map(|i| i.order_index)
                .max()
                .map_or(0, |max| max + 1)
        });

        let doc_key = DocKey::generate();
        let blob = revision_blob_put(inner, content);
        let item = WikiRevisionItem {
            revision_id,
            doc_key: doc_key.clone(),
            title: title.to_owned(),
            slug: slug_override
                .map(str::to_owned)
                .unwrap_or_else(|| slug::slugify_with_limit(title, inner.config.max_slug_len)),
            is_group,
            is_published,
            parent_key: parent_key.cloned(),
            order_index,
            content_blob_id: Some(blob.id),
            is_deleted: false,
        };

        let mut items = items;
        items.insert(doc_key, item.clone());
        inner.revision_items.insert(revision_id, items);
        revision::recompute_hashes(inner, revision_id);
        Ok(item)
    })
}

#[derive(Default)]
pub struct PageUpdate<'a> {
    pub title: Option<&'a str>,
    pub slug: Option<&'a str>,
    pub is_group: Option<bool>,
    pub is_published: Option<bool>,
    pub content: Option<&'a str>,
    pub is_deleted: Option<bool>,
}

pub fn update_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    doc_key: &DocKey,
    update: PageUpdate,
) -> WikiResult<WikiRevisionItem> {
    store.transaction(|inner| {
        let revision_id = working_revision_id(inner, cr_id)?;
        let mut items = inner.revision_items(revision_id);
        let item = items
            .get_mut(doc_key)
            .ok_or_else(|| WikiError::DocumentNotInChangeRequest(doc_key.clone(), cr_id))?;

        if let Some(title) = update.title {
            item.title = title.to_owned();
        }
        if let Some(slug) = update.slug {
            item.slug = slug.to_owned();
        }
        if let Some(is_group) = update.is_group {
            item.is_group = is_group;
        }
        if let Some(is_published) = update.is_published {
            item.is_published = is_published;
        }
        if let Some(is_deleted) = update.is_deleted {
            item.is_deleted = is_deleted;
        }
        let content = update.content;
        let updated = item.clone();

        if let Some(content) = content {
            let blob = revision_blob_put(inner, content);
            if let Some(item) = items.get_mut(doc_key) {
                item.content_blob_id = Some(blob.id);
            }
        }
        let updated = items.get(doc_key).cloned().unwrap_or(updated);

        inner.revision_items.insert(revision_id, items);
        revision::recompute_hashes(inner, revision_id);
        Ok(updated)
    })
}

pub fn move_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    doc_key: &DocKey,
    new_parent_key: Option<&DocKey>,
    new_order_index: Option<i64>,
) -> WikiResult<WikiRevisionItem> {
    store.transaction(|inner| {
        let revision_id = working_revision_id(inner, cr_id)?;
        let mut items = inner.revision_items(revision_id);

        if !items.contains_key(doc_key) {
            return Err(WikiError::DocumentNotInChangeRequest(doc_key.clone(), cr_id).into());
        }
        if let Some(parent_key) = new_parent_key {
            if !items.contains_key(parent_key) {
                return Err(
                    WikiError::ParentNotInChangeRequest(parent_key.clone(), cr_id).into(),
                );
            }
        }

        let order_index = new_order_index.unwrap_or_else(|| {
            items
                .values()
                .filter(|i| i.parent_key.as_ref() == new_parent_key && i.doc_key != *doc_key && !i.is_deleted)
                .map(|i| i.order_index)
                .max()
                .map_or(0, |max| max + 1)
        });

        let item = items.get_mut(doc_key).expect("checked above");
        item.parent_key = new_parent_key.cloned();
        item.order_index = order_index;
        let updated = item.clone();

        inner.revision_items.insert(revision_id, items);
        revision::recompute_hashes(inner, revision_id);
        Ok(updated)
    })
}

pub fn reorder_children(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    parent_key: Option<&DocKey>,
    ordered_keys: &[DocKey],
) -> WikiResult<()> {
    store.transaction(|inner| {
        let revision_id = working_revision_id(inner, cr_id)?;
        let mut items = inner.revision_items(revision_id);

        for (index, key) in ordered_keys.iter().enumerate() {
            let item = items
                .get_mut(key)
                .ok_or_else(|| WikiError::DocumentNotInChangeRequest(key.clone(), cr_id))?;
            item.parent_key = parent_key.cloned();
            item.order_index = index as i64;
        }

        inner.revision_items.insert(revision_id, items);
        revision::recompute_hashes(inner, revision_id);
        Ok(())
    })
}

/// Marks `doc_key` deleted and, transitively, every descendant reached by
/// `parent_key` chasing. Cycle-safe via a visited set (spec.md §9): the
/// working tree isn't guaranteed acyclic, since a buggy client could
/// create one.
pub fn delete_page(store: &WikiStore, cr_id: ChangeRequestId, doc_key: &DocKey) -> WikiResult<usize> {
    store.transaction(|inner| {
        let revision_id = working_revision_id(inner, cr_id)?;
        let mut items = inner.revision_items(revision_id);
        if !items.contains_key(doc_key) {
            return Err(WikiError::DocumentNotInChangeRequest(doc_key.clone(), cr_id).into());
        }

        let mut children: std::collections::HashMap<DocKey, Vec<DocKey>> = std::collections::HashMap::new();
        for item in items.values() {
            if let Some(parent) = &item.parent_key {
                children.entry(parent.clone()).or_default().push(item.doc_key.clone());
            }
        }

        let mut to_delete = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![doc_key.clone()];
        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            to_delete.push(key.clone());
            if let Some(kids) = children.get(&key) {
                stack.extend(kids.iter().cloned());
            }
        }

        for key in &to_delete {
            if let Some(item) = items.get_mut(key) {
                item.is_deleted = true;
            }
        }

        let count = to_delete.len();
        inner.revision_items.insert(revision_id, items);
        revision::recompute_hashes(inner, revision_id);
        Ok(count)
    })
}

fn revision_blob_put(inner: &mut crate::store::StoreInner, content: &str) -> ContentBlob {
    let hash = Sha256Hex::of(content);
    if let Some(&id) = inner.blob_by_hash.get(&hash) {
        return inner.blobs[&id].clone();
    }
    let id = inner.next_blob_id();
    let blob = ContentBlob {
        id,
        hash: hash.clone(),
        content: content.to_owned(),
        content_type: crate::blob::DEFAULT_CONTENT_TYPE.to_owned(),
        size: content.as_bytes().len(),
    };
    inner.blob_by_hash.insert(hash, id);
    inner.blobs.insert(id, blob.clone());
    blob
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_request;
    use crate::store::{Context, Role};
    use crate::tree;

    fn ctx() -> Context {
        Context::new("alice", [Role::WikiManager])
    }

    fn new_cr(store: &WikiStore) -> WikiChangeRequest {
        let space = tree::create_space(store, "Docs", "docs").unwrap();
        change_request::create(store, &ctx(), space.id, "My change", None).unwrap()
    }

    #[test]
    fn create_page_defaults_order_index_and_slug() {
        let store = WikiStore::new();
        let cr = new_cr(&store);
        let a = create_page(&store, cr.id, None, "Page A", None, false, true, "hello", None)
            .unwrap();
        let b = create_page(&store, cr.id, None, "Page B", None, false, true, "world", None)
            .unwrap();
        assert_eq!(a.slug, "page-a");
        assert!(b.order_index > a.order_index);
    }

    #[test]
    fn update_page_reblobs_content() {
        let store = WikiStore::new();
        let cr = new_cr(&store);
        let page =
            create_page(&store, cr.id, None, "Page", None, false, true, "v1", None).unwrap();
        let updated = update_page(
            &store,
            cr.id,
            &page.doc_key,
            PageUpdate { content: Some("v2"), ..Default::default() },
        )
        .unwrap();
        assert_ne!(updated.content_blob_id, page.content_blob_id);
    }

    #[test]
    fn delete_page_cascades_to_descendants_without_cycling() {
        let store = WikiStore::new();
        let cr = new_cr(&store);
        let group =
            create_page(&store, cr.id, None, "Group", None, true, true, "", None).unwrap();
        let child = create_page(
            &store,
            cr.id,
            Some(&group.doc_key),
            "Child",
            None,
            false,
            true,
            "x",
            None,
        )
        .unwrap();

        let count = delete_page(&store, cr.id, &group.doc_key).unwrap();
        assert_eq!(count, 2);

        let items = revision::items(&store, change_request::get(&store, cr.id).unwrap().head_revision_id);
        assert!(items[&group.doc_key].is_deleted);
        assert!(items[&child.doc_key].is_deleted);
    }

    #[test]
    fn move_page_rejects_parent_outside_the_change_request() {
        let store = WikiStore::new();
        let cr = new_cr(&store);
        let page =
            create_page(&store, cr.id, None, "Page", None, false, true, "x", None).unwrap();
        let bogus = DocKey::from("doesnotexist0");
        let err = move_page(&store, cr.id, &page.doc_key, Some(&bogus), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WikiError>(),
            Some(WikiError::ParentNotInChangeRequest(..))
        ));
    }
}
