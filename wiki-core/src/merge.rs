//! Three-Way Merger (spec.md §4.7). Reconciles base→ours (live main) and
//! base→theirs (CR head) per `doc_key`, distinguishing content, metadata
//! and tree conflicts.

use crate::diff::live_view;
use crate::hash::Sha256Hex;
use crate::id::DocKey;
use crate::linediff;
use crate::model::*;
use crate::store::WikiStore;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Skip,
    KeepOurs,
    KeepTheirs,
    Merged(ItemSnapshot, String),
}

#[derive(Debug, Clone)]
pub struct MergedItem {
    pub snapshot: ItemSnapshot,
    pub content: String,
}

pub struct MergeResult {
    pub items: HashMap<DocKey, MergedItem>,
    pub conflicts: Vec<WikiMergeConflict>,
}

/// Runs the merge decision matrix over `keys(base) ∪ keys(ours) ∪
/// keys(theirs)`, where `base` is the CR's original base revision, `ours`
/// is the space's *current* main revision (which may have advanced past
/// `base` via direct writes since the CR was opened), and `theirs` is the
/// CR's working head. Returns every resolved item plus every recorded
/// conflict; callers check `conflicts.is_empty()` before applying.
pub fn three_way_merge(
    store: &WikiStore,
    cr: &WikiChangeRequest,
    current_main_revision: RevisionId,
) -> MergeResult {
    let base = live_view(store, cr.base_revision_id);
    let ours = live_view(store, current_main_revision);
    let theirs = live_view(store, cr.head_revision_id); // cr.head_revision.items

    let content_of = |item: &ItemSnapshot| -> String {
        content_for_hash(store, &item.content_hash)
    };

    let mut keys: Vec<DocKey> =
        base.keys().chain(ours.keys()).chain(theirs.keys()).cloned().collect();
    keys.sort();
    keys.dedup();

    let mut items = HashMap::new();
    let mut conflicts = Vec::new();

    for key in keys {
        let b = base.get(&key);
        let o = ours.get(&key);
        let t = theirs.get(&key);

        match resolve_one(store, cr, &key, b, o, t, &content_of) {
            Ok(Some(merged)) => {
                items.insert(key, merged);
            }
            Ok(None) => {}
            Err(conflict) => conflicts.push(conflict),
        }
    }

    MergeResult { items, conflicts }
}

fn content_for_hash(store: &WikiStore, hash: &Option<Sha256Hex>) -> String {
    let Some(hash) = hash else { return String::new() };
    store.read(|inner| {
        inner
            .blob_by_hash
            .get(hash)
            .and_then(|id| inner.blobs.get(id))
            .map(|b| b.content.clone())
            .unwrap_or_default()
    })
}

#[allow(clippy::too_many_arguments)]
fn resolve_one(
    store: &WikiStore,
    cr: &WikiChangeRequest,
    key: &DocKey,
    b: Option<&ItemSnapshot>,
    o: Option<&ItemSnapshot>,
    t: Option<&ItemSnapshot>,
    content_of: &impl Fn(&ItemSnapshot) -> String,
) -> Result<Option<MergedItem>, WikiMergeConflict> {
    let conflict = |conflict_type: ConflictType| WikiMergeConflict {
        change_request_id: cr.id,
        doc_key: key.clone(),
        conflict_type,
        base_payload: b.cloned(),
        ours_payload: o.cloned(),
        theirs_payload: t.cloned(),
        status: ConflictStatus::Open,
    };

    match (b, o, t) {
        (None, None, None) => Ok(None), // skip

        (None, None, Some(theirs)) => Ok(Some(keep(theirs, content_of))), // keep theirs
        (None, Some(ours), None) => Ok(Some(keep(ours, content_of))),     // keep ours

        (None, Some(ours), Some(theirs)) => {
            if ours == theirs {
                Ok(Some(keep(ours, content_of)))
            } else {
                Err(conflict(ConflictType::Content))
            }
        }

        (Some(_), None, None) => Ok(None), // both deleted: skip

        (Some(base), None, Some(theirs)) => {
            if theirs == base {
                Ok(None) // ours deleted, theirs unchanged -> delete
            } else {
                Err(conflict(ConflictType::Content))
            }
        }

        (Some(base), Some(ours), None) => {
            if ours == base {
                Ok(None) // symmetric delete
            } else {
                Err(conflict(ConflictType::Content))
            }
        }

        (Some(_base), Some(ours), Some(theirs)) => {
            if ours == theirs {
                Ok(Some(keep(ours, content_of)))
            } else {
                resolve_three_way(store, &conflict, b.unwrap(), ours, theirs, content_of)
            }
        }
    }
}

fn keep(item: &ItemSnapshot, content_of: &impl Fn(&ItemSnapshot) -> String) -> MergedItem {
    MergedItem { snapshot: item.clone(), content: content_of(item) }
}

fn resolve_three_way(
    store: &WikiStore,
    conflict: &impl Fn(ConflictType) -> WikiMergeConflict,
    base: &ItemSnapshot,
    ours: &ItemSnapshot,
    theirs: &ItemSnapshot,
    content_of: &impl Fn(&ItemSnapshot) -> String,
) -> Result<Option<MergedItem>, WikiMergeConflict> {
    if ours == base {
        return Ok(Some(keep(theirs, content_of))); // keep theirs
    }
    if theirs == base {
        return Ok(Some(keep(ours, content_of))); // keep ours
    }

    // both sides changed and disagree
    if ours.parent_key != theirs.parent_key || ours.order_index != theirs.order_index {
        return Err(conflict(ConflictType::Tree));
    }

    // A field conflicts if ours and theirs disagree on it and neither side
    // matches base; otherwise `resolve_field` below picks a value.
    let field_conflicts = (ours.title != theirs.title && ours.title != base.title && theirs.title != base.title)
        || (ours.slug != theirs.slug && ours.slug != base.slug && theirs.slug != base.slug)
        || (ours.is_group != theirs.is_group && ours.is_group != base.is_group && theirs.is_group != base.is_group)
        || (ours.is_published != theirs.is_published
            && ours.is_published != base.is_published
            && theirs.is_published != base.is_published);
    if field_conflicts {
        return Err(conflict(ConflictType::Meta));
    }

    let base_content = content_for_hash(store, &base.content_hash);
    let ours_content = content_of(ours);
    let theirs_content = content_of(theirs);
    let normalize = store.config().normalize_line_endings;

    match linediff::merge_content_with(&base_content, &ours_content, &theirs_content, normalize) {
        Some(merged_content) => {
            let snapshot = ItemSnapshot {
                doc_key: ours.doc_key.clone(),
                title: resolve_field(&base.title, &ours.title, &theirs.title).clone(),
                slug: resolve_field(&base.slug, &ours.slug, &theirs.slug).clone(),
                is_group: *resolve_field(&base.is_group, &ours.is_group, &theirs.is_group),
                is_published: *resolve_field(
                    &base.is_published,
                    &ours.is_published,
                    &theirs.is_published,
                ),
                parent_key: ours.parent_key.clone(), // ties resolved by tree conflict above
                order_index: ours.order_index,
                content_hash: Some(Sha256Hex::of(&merged_content)),
            };
            Ok(Some(MergedItem { snapshot, content: merged_content }))
        }
        None => Err(conflict(ConflictType::Content)),
    }
}

/// `resolve(b, o, t) = o if o==t; t if o==b; o if t==b; else o`.
fn resolve_field<'a, T: PartialEq>(base: &'a T, ours: &'a T, theirs: &'a T) -> &'a T {
    if ours == theirs {
        ours
    } else if ours == base {
        theirs
    } else if theirs == base {
        ours
    } else {
        ours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_request;
    use crate::editor;
    use crate::revision;
    use crate::store::{Context, Role};
    use crate::tree;

    fn ctx() -> Context {
        Context::new("alice", [Role::WikiManager])
    }

    #[test]
    fn non_overlapping_edits_merge_without_conflict() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let page = tree::append_new(&store, &ctx(), root, "Page", false, None).unwrap();
        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().content = "line1\nline2\nline3\n".to_owned();
                Ok(())
            })
            .unwrap();

        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();
        let page_key = page.doc_key.clone().unwrap();
        editor::update_page(
            &store,
            cr.id,
            &page_key,
            editor::PageUpdate { content: Some("line1-cr\nline2\nline3\n"), ..Default::default() },
        )
        .unwrap();

        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().content =
                    "line1\nline2\nline3-main\n".to_owned();
                Ok(())
            })
            .unwrap();
        let new_main = revision::snapshot_live(&store, &ctx(), space.id, "direct edit", None, false, false)
            .unwrap();
        store
            .transaction(|inner| {
                inner.spaces.get_mut(&space.id).unwrap().main_revision_id = Some(new_main.id);
                Ok(())
            })
            .unwrap();
        let cr = change_request::get(&store, cr.id).unwrap();

        let result = three_way_merge(&store, &cr, new_main.id);
        assert!(result.conflicts.is_empty());
        let merged = &result.items[&page_key];
        assert_eq!(merged.content, "line1-cr\nline2\nline3-main\n");
    }

    #[test]
    fn conflicting_content_edits_record_a_content_conflict() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let page = tree::append_new(&store, &ctx(), root, "Page", false, None).unwrap();
        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().content = "v1".to_owned();
                Ok(())
            })
            .unwrap();

        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();
        let page_key = page.doc_key.clone().unwrap();
        editor::update_page(
            &store,
            cr.id,
            &page_key,
            editor::PageUpdate { content: Some("cr-change"), ..Default::default() },
        )
        .unwrap();

        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().content = "main-change".to_owned();
                Ok(())
            })
            .unwrap();
        let new_main =
            revision::snapshot_live(&store, &ctx(), space.id, "direct edit", None, false, false)
                .unwrap();
        store
            .transaction(|inner| {
                inner.spaces.get_mut(&space.id).unwrap().main_revision_id = Some(new_main.id);
                Ok(())
            })
            .unwrap();
        let cr = change_request::get(&store, cr.id).unwrap();

        let result = three_way_merge(&store, &cr, new_main.id);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Content);
    }

    #[test]
    fn moving_a_page_under_different_parents_on_each_side_is_a_tree_conflict() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let g1 = tree::append_new(&store, &ctx(), root, "G1", true, None).unwrap();
        let g2 = tree::append_new(&store, &ctx(), root, "G2", true, None).unwrap();
        let page = tree::append_new(&store, &ctx(), root, "P", false, None).unwrap();

        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();
        let page_key = page.doc_key.clone().unwrap();
        let g1_key = g1.doc_key.clone().unwrap();
        editor::move_page(&store, cr.id, &page_key, Some(&g1_key), None).unwrap();

        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().parent_id = Some(g2.id);
                Ok(())
            })
            .unwrap();
        crate::tree::rebuild_nested_sets(&store);
        let new_main = revision::snapshot_live(&store, &ctx(), space.id, "direct move", None, false, false)
            .unwrap();
        store
            .transaction(|inner| {
                inner.spaces.get_mut(&space.id).unwrap().main_revision_id = Some(new_main.id);
                Ok(())
            })
            .unwrap();
        let cr = change_request::get(&store, cr.id).unwrap();

        let result = three_way_merge(&store, &cr, new_main.id);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Tree);
    }

    #[test]
    fn disagreeing_title_edits_with_no_side_matching_base_is_a_meta_conflict() {
        let store = WikiStore::new();
        let space = tree::create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let page = tree::append_new(&store, &ctx(), root, "Original", false, None).unwrap();

        let cr = change_request::create(&store, &ctx(), space.id, "Change", None).unwrap();
        let page_key = page.doc_key.clone().unwrap();
        editor::update_page(
            &store,
            cr.id,
            &page_key,
            editor::PageUpdate { title: Some("CR Title"), ..Default::default() },
        )
        .unwrap();

        store
            .transaction(|inner| {
                inner.documents.get_mut(&page.id).unwrap().title = "Main Title".to_owned();
                Ok(())
            })
            .unwrap();
        let new_main = revision::snapshot_live(&store, &ctx(), space.id, "direct rename", None, false, false)
            .unwrap();
        store
            .transaction(|inner| {
                inner.spaces.get_mut(&space.id).unwrap().main_revision_id = Some(new_main.id);
                Ok(())
            })
            .unwrap();
        let cr = change_request::get(&store, cr.id).unwrap();

        let result = three_way_merge(&store, &cr, new_main.id);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Meta);
    }
}
