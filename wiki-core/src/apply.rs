//! Merge Applier (spec.md §4.8). Writes a merged revision back into the
//! live tree while preserving routes and identities, and advances
//! `space.main_revision_id`.

use crate::error::{WikiError, WikiResult};
use crate::hash::Sha256Hex;
use crate::id::DocKey;
use crate::merge::{three_way_merge, MergedItem};
use crate::model::*;
use crate::revision;
use crate::slug;
use crate::store::{Context, WikiStore};
use chrono::Utc;
use std::collections::HashMap;

pub struct MergeReport {
    pub merge_revision_id: RevisionId,
}

/// Only Wiki Manager / Approver / System Manager may merge. On success,
/// builds a new non-working merge revision, writes it into the live tree,
/// advances `space.main_revision_id`, and marks the CR `Merged`. On
/// conflict, records every `WikiMergeConflict` and fails with validation
/// — no live state is touched either way.
pub fn merge_cr(store: &WikiStore, ctx: &Context, cr_id: ChangeRequestId) -> WikiResult<MergeReport> {
    if !ctx.is_manager_or_approver() {
        return Err(WikiError::NotManagerOrApprover.into());
    }

    let cr = store.read(|inner| inner.get_change_request(cr_id))?;
    let space = store.read(|inner| inner.get_space(cr.space_id))?;
    let current_main = space.main_revision_id.ok_or(WikiError::SpaceNotFound(cr.space_id))?;

    let result = three_way_merge(store, &cr, current_main);
    if !result.conflicts.is_empty() {
        store.transaction(|inner| {
            inner.merge_conflicts.extend(result.conflicts.iter().cloned());
            Ok(())
        })?;
        warn!(
            "merge of change request {cr_id} failed with {} conflict(s)",
            result.conflicts.len()
        );
        return Err(WikiError::MergeConflicts(result.conflicts.len()).into());
    }

    store.transaction(|inner| {
        let merge_revision_id = build_merge_revision(inner, ctx, &cr, current_main, &result.items)?;
        apply_to_live_tree(inner, &cr.space_id, merge_revision_id)?;

        if let Some(space) = inner.spaces.get_mut(&cr.space_id) {
            space.main_revision_id = Some(merge_revision_id);
        }

        let mut merged_cr = inner.get_change_request(cr_id)?;
        merged_cr.status = CrStatus::Merged;
        merged_cr.merge_revision_id = Some(merge_revision_id);
        merged_cr.merged_at = Some(Utc::now());
        merged_cr.merged_by = Some(ctx.principal.clone());
        merged_cr.updated_at = Utc::now();
        inner.change_requests.insert(cr_id, merged_cr);

        debug!("merged change request {cr_id} into revision {merge_revision_id}");
        Ok(MergeReport { merge_revision_id })
    })
}

fn build_merge_revision(
    inner: &mut crate::store::StoreInner,
    ctx: &Context,
    cr: &WikiChangeRequest,
    current_main: RevisionId,
    merged: &HashMap<DocKey, MergedItem>,
) -> WikiResult<RevisionId> {
    let revision_id = inner.next_revision_id();
    let revision = WikiRevision {
        id: revision_id,
        space_id: cr.space_id,
        parent_revision_id: Some(current_main),
        change_request_id: Some(cr.id),
        message: format!("Merge \"{}\"", cr.title),
        is_working: false,
        is_merge: true,
        tree_hash: Sha256Hex::of(""),
        content_hash: Sha256Hex::of(""),
        doc_count: 0,
        created_at: Utc::now(),
        created_by: ctx.principal.clone(),
    };
    inner.revisions.insert(revision_id, revision);

    let mut items = HashMap::with_capacity(merged.len());
    for (key, merged_item) in merged {
        let blob = upsert_blob(inner, &merged_item.content);
        let snapshot = &merged_item.snapshot;
        items.insert(
            key.clone(),
            WikiRevisionItem {
                revision_id,
                doc_key: key.clone(),
                title: snapshot.title.clone(),
                slug: snapshot.slug.clone(),
                is_group: snapshot.is_group,
                is_published: snapshot.is_published,
                parent_key: snapshot.parent_key.clone(),
                order_index: snapshot.order_index,
                content_blob_id: Some(blob.id),
                is_deleted: false,
            },
        );
    }
    inner.revision_items.insert(revision_id, items);
    revision::recompute_hashes(inner, revision_id);
    Ok(revision_id)
}

/// For each item in `tree_order(merge_revision.items)`, upserts the live
/// document by `doc_key`: new keys are inserted, existing keys keep their
/// id and, crucially, their `route`. Reparenting uses the key-to-id map
/// built as each ancestor is visited, since tree order is pre-order.
fn apply_to_live_tree(
    inner: &mut crate::store::StoreInner,
    space_id: &SpaceId,
    merge_revision_id: RevisionId,
) -> WikiResult<()> {
    let items = inner.revision_items(merge_revision_id);
    let order = revision::tree_order(&items);

    let mut key_to_id: HashMap<DocKey, DocumentId> = HashMap::new();
    let space = inner.get_space(*space_id)?;
    if let Some(root_id) = space.root_group_id {
        if let Some(root_doc) = inner.documents.get(&root_id) {
            if let Some(root_key) = &root_doc.doc_key {
                key_to_id.insert(root_key.clone(), root_id);
            }
        }
    }

    for key in &order {
        let item = &items[key];
        if item.is_deleted {
            continue;
        }

        let parent_id = item.parent_key.as_ref().and_then(|pk| key_to_id.get(pk).copied());
        let content = inner.blob_content(item.content_blob_id);

        if let Some(&existing_id) = inner.doc_key_index.get(key) {
            if let Some(doc) = inner.documents.get_mut(&existing_id) {
                doc.title = item.title.clone();
                doc.slug = item.slug.clone();
                doc.is_group = item.is_group;
                doc.is_published = item.is_published;
                doc.content = content;
                doc.sort_order = item.order_index;
                if item.parent_key.is_some() {
                    doc.parent_id = parent_id;
                }
            }
            key_to_id.insert(key.clone(), existing_id);
        } else {
            let new_id = inner.next_document_id();
            let route = parent_id
                .and_then(|pid| inner.documents.get(&pid))
                .map(|parent| format!("{}/{}", parent.route, item.slug))
                .unwrap_or_else(|| slug::slugify_with_limit(&item.title, inner.config.max_slug_len));
            let doc = WikiDocument {
                id: new_id,
                doc_key: Some(key.clone()),
                title: item.title.clone(),
                slug: item.slug.clone(),
                is_group: item.is_group,
                is_published: item.is_published,
                parent_id,
                sort_order: item.order_index,
                route,
                content,
                lft: 0,
                rgt: 0,
            };
            inner.doc_key_index.insert(key.clone(), new_id);
            inner.documents.insert(new_id, doc);
            key_to_id.insert(key.clone(), new_id);
        }
    }

    crate::tree::rebuild_nested_sets_locked(inner);
    Ok(())
}

fn upsert_blob(inner: &mut crate::store::StoreInner, content: &str) -> ContentBlob {
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
