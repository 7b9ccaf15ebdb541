//! Live Tree Store (spec.md §4.3). The authoritative current state: an
//! ordered, nested-set-indexed tree of documents whose sibling order lives
//! in `sort_order` and whose routes are stable across reorder and reparent.
//!
//! `sort_order` is the only ordering source of truth; `lft`/`rgt` are a
//! read-side denormalization rebuilt only when parentage changes, never for
//! a pure reorder (spec.md §9).

use crate::error::{WikiError, WikiResult};
use crate::model::*;
use crate::slug;
use crate::store::{Context, WikiStore};
use log::debug;

/// A nested view of the live tree, rooted at a space's `root_group_id`.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: DocumentId,
    pub doc_key: Option<DocKey>,
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub route: String,
    pub sort_order: i64,
    pub children: Vec<TreeNode>,
}

pub struct ReorderOutcome {
    pub is_contribution: bool,
    pub change_request_id: Option<ChangeRequestId>,
}

/// Creates a space with a root group document. Not a spec.md §4.x operation
/// by itself, but every space needs one to exist before any tree op makes
/// sense; mirrors the original's space-creation bootstrap.
pub fn create_space(store: &WikiStore, display_name: &str, route: &str) -> WikiResult<WikiSpace> {
    store.transaction(|inner| {
        if inner.spaces.values().any(|s| s.route == route) {
            return Err(WikiError::RouteConflict(route.to_owned()).into());
        }
        let space_id = inner.next_space_id();
        let root_id = inner.next_document_id();
        let root = WikiDocument {
            id: root_id,
            doc_key: Some(crate::id::DocKey::generate()),
            title: display_name.to_owned(),
            slug: slug::slugify_with_limit(display_name, inner.config.max_slug_len),
            is_group: true,
            is_published: true,
            parent_id: None,
            sort_order: 0,
            route: route.to_owned(),
            content: String::new(),
            lft: 1,
            rgt: 2,
        };
        inner.doc_key_index.insert(root.doc_key.clone().unwrap(), root.id);
        inner.documents.insert(root_id, root);

        let space = WikiSpace {
            id: space_id,
            display_name: display_name.to_owned(),
            route: route.to_owned(),
            root_group_id: Some(root_id),
            main_revision_id: None,
        };
        inner.spaces.insert(space_id, space.clone());
        Ok(space)
    })
}

/// Reads all descendants of `root_group_id`, building a nested structure
/// with each sibling list sorted by `(sort_order, id)`.
pub fn get_tree(store: &WikiStore, space_id: SpaceId) -> WikiResult<TreeNode> {
    store.read(|inner| {
        let space = inner.get_space(space_id)?;
        let root_id = space
            .root_group_id
            .ok_or_else(|| WikiError::SpaceNotFound(space_id))?;
        Ok(build_node(inner, root_id))
    })
}

fn build_node(inner: &crate::store::StoreInner, id: DocumentId) -> TreeNode {
    let doc = inner.documents.get(&id).expect("tree node id always resolves");
    let mut children: Vec<TreeNode> =
        inner.children_of(Some(id)).into_iter().map(|child| build_node(inner, child.id)).collect();
    children.sort_by_key(|c| (c.sort_order, c.id));
    TreeNode {
        id: doc.id,
        doc_key: doc.doc_key.clone(),
        title: doc.title.clone(),
        slug: doc.slug.clone(),
        is_group: doc.is_group,
        is_published: doc.is_published,
        route: doc.route.clone(),
        sort_order: doc.sort_order,
        children,
    }
}

/// If `ctx` has direct-write capability, reparents `doc` (if `new_parent`
/// differs) and assigns `sort_order = i` for each sibling in `siblings`,
/// rebuilding nested sets only when the parent actually changed. Otherwise
/// routes the request to the caller's change request instead, per spec.md
/// §6's `{is_contribution: true, cr}` contract.
pub fn reorder(
    store: &WikiStore,
    ctx: &Context,
    doc_id: DocumentId,
    new_parent: Option<DocumentId>,
    siblings: &[DocumentId],
    route_to_cr: impl FnOnce(&WikiStore, &Context, DocumentId, Option<DocumentId>, &[DocumentId]) -> WikiResult<ChangeRequestId>,
) -> WikiResult<ReorderOutcome> {
    if !ctx.has_direct_write() {
        let cr_id = route_to_cr(store, ctx, doc_id, new_parent, siblings)?;
        return Ok(ReorderOutcome { is_contribution: true, change_request_id: Some(cr_id) });
    }

    store.transaction(|inner| {
        let mut doc = inner.get_document(doc_id)?;
        let parent_changed = doc.parent_id != new_parent;
        if parent_changed {
            doc.parent_id = new_parent;
            inner.documents.insert(doc.id, doc.clone());
        }

        for (index, &sibling_id) in siblings.iter().enumerate() {
            if let Some(sibling) = inner.documents.get_mut(&sibling_id) {
                sibling.sort_order = index as i64;
            }
        }

        if parent_changed {
            rebuild_nested_sets_locked(inner);
        }
        debug!("reordered doc {doc_id} under parent {new_parent:?}, {} siblings", siblings.len());
        Ok(ReorderOutcome { is_contribution: false, change_request_id: None })
    })
}

/// Recursively walks from all root documents (those with `parent_id =
/// None`) ordered by `(sort_order, id)`, assigning contiguous `lft`/`rgt`
/// counters. Idempotent: running it twice yields identical indices.
pub fn rebuild_nested_sets(store: &WikiStore) {
    store.transaction(|inner| {
        rebuild_nested_sets_locked(inner);
        Ok(())
    })
    .expect("rebuild never fails");
}

pub(crate) fn rebuild_nested_sets_locked(inner: &mut crate::store::StoreInner) {
    let mut roots: Vec<DocumentId> =
        inner.documents.values().filter(|d| d.parent_id.is_none()).map(|d| d.id).collect();
    roots.sort_by_key(|&id| {
        let d = &inner.documents[&id];
        (d.sort_order, d.id)
    });

    let mut counter = 1i64;
    for root in roots {
        counter = assign_lft_rgt(inner, root, counter);
    }
}

fn assign_lft_rgt(inner: &mut crate::store::StoreInner, id: DocumentId, start: i64) -> i64 {
    let mut counter = start + 1;
    let mut children: Vec<DocumentId> = inner.children_of(Some(id)).into_iter().map(|c| c.id).collect();
    children.sort_by_key(|&cid| {
        let d = &inner.documents[&cid];
        (d.sort_order, d.id)
    });
    for child in children {
        counter = assign_lft_rgt(inner, child, counter);
    }
    let rgt = counter;
    if let Some(doc) = inner.documents.get_mut(&id) {
        doc.lft = start;
        doc.rgt = rgt;
    }
    rgt + 1
}

/// Inserts a new document under `parent`. When `sort_order` is not
/// provided, assigns `max(sibling.sort_order) + 1` so the new document
/// lands last among its siblings.
pub fn append_new(
    store: &WikiStore,
    ctx: &Context,
    parent: DocumentId,
    title: &str,
    is_group: bool,
    sort_order: Option<i64>,
) -> WikiResult<WikiDocument> {
    let _ = ctx;
    store.transaction(|inner| {
        let parent_doc = inner.get_document(parent)?;
        let order = sort_order.unwrap_or_else(|| inner.max_sort_order(Some(parent)) + 1);
        let id = inner.next_document_id();
        let doc_key = crate::id::DocKey::generate();
        let slug_value = slug::slugify_with_limit(title, inner.config.max_slug_len);
        let doc = WikiDocument {
            id,
            doc_key: Some(doc_key.clone()),
            title: title.to_owned(),
            slug: slug_value.clone(),
            is_group,
            is_published: true,
            parent_id: Some(parent),
            sort_order: order,
            route: format!("{}/{}", parent_doc.route, slug_value),
            content: String::new(),
            lft: 0,
            rgt: 0,
        };
        inner.doc_key_index.insert(doc_key, id);
        inner.documents.insert(id, doc.clone());
        rebuild_nested_sets_locked(inner);
        Ok(doc)
    })
}

/// Rewrites `space.route` and the `route` of every descendant document by
/// replacing the old route prefix with `new_route`, preserving the
/// remainder of each path unchanged. Wiki-Manager-only.
pub fn update_routes(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    new_route: &str,
) -> WikiResult<usize> {
    if !ctx.is_wiki_manager() {
        return Err(WikiError::NoDirectWriteCapability.into());
    }
    if new_route.is_empty() {
        return Err(WikiError::RouteEmpty.into());
    }

    store.transaction(|inner| {
        let mut space = inner.get_space(space_id)?;
        if space.route == new_route {
            return Err(WikiError::RouteUnchanged.into());
        }
        if inner.spaces.values().any(|s| s.id != space_id && s.route == new_route) {
            return Err(WikiError::RouteConflict(new_route.to_owned()).into());
        }

        let old_route = space.route.clone();
        space.route = new_route.to_owned();
        inner.spaces.insert(space_id, space.clone());

        let mut updated = 0usize;
        let affected: Vec<DocumentId> = match space.root_group_id {
            Some(root_id) => {
                let root = inner.get_document(root_id)?;
                inner.documents_under(&root).into_iter().map(|d| d.id).collect()
            }
            None => Vec::new(),
        };
        for doc_id in affected {
            if let Some(doc) = inner.documents.get_mut(&doc_id) {
                if let Some(suffix) = doc.route.strip_prefix(&old_route) {
                    doc.route = format!("{new_route}{suffix}");
                    updated += 1;
                }
            }
        }
        Ok(updated)
    })
}

pub(crate) fn space_for_document(
    store: &WikiStore,
    doc_id: DocumentId,
) -> Option<SpaceId> {
    store.read(|inner| inner.space_for_document(doc_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;

    fn ctx() -> Context {
        Context::new("alice", [Role::WikiManager])
    }

    #[test]
    fn new_document_lands_last_among_siblings() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        append_new(&store, &ctx(), root, "Q1", false, None).unwrap();
        append_new(&store, &ctx(), root, "Q2", false, None).unwrap();
        let q3 = append_new(&store, &ctx(), root, "Q3", false, None).unwrap();
        assert_eq!(q3.sort_order, 2);

        let tree = get_tree(&store, space.id).unwrap();
        let titles: Vec<&str> = tree.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Q1", "Q2", "Q3"]);
    }

    #[test]
    fn rebuild_nested_sets_is_idempotent() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        append_new(&store, &ctx(), root, "A", false, None).unwrap();
        append_new(&store, &ctx(), root, "B", true, None).unwrap();

        rebuild_nested_sets(&store);
        let first: Vec<(i64, i64)> =
            store.read(|inner| inner.documents.values().map(|d| (d.lft, d.rgt)).collect());
        rebuild_nested_sets(&store);
        let second: Vec<(i64, i64)> =
            store.read(|inner| inner.documents.values().map(|d| (d.lft, d.rgt)).collect());
        let mut a = first;
        let mut b = second;
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test_env_log::test]
    fn direct_reorder_persists_sort_order_and_sibling_sequence() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let q = (1..=5)
            .map(|n| append_new(&store, &ctx(), root, &format!("Q{n}"), false, None).unwrap().id)
            .collect::<Vec<_>>();
        let q6 = append_new(&store, &ctx(), root, "Q6", false, None).unwrap().id;

        let tree = get_tree(&store, space.id).unwrap();
        let titles: Vec<&str> = tree.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Q1", "Q2", "Q3", "Q4", "Q5", "Q6"]);

        let new_siblings = vec![q6, q[0], q[1], q[2], q[3], q[4]];
        let unreachable = |_: &WikiStore, _: &Context, _: DocumentId, _: Option<DocumentId>, _: &[DocumentId]| -> WikiResult<ChangeRequestId> {
            unreachable!("manager has direct write")
        };
        reorder(&store, &ctx(), q6, Some(root), &new_siblings, unreachable).unwrap();

        let tree = get_tree(&store, space.id).unwrap();
        let titles: Vec<&str> = tree.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Q6", "Q1", "Q2", "Q3", "Q4", "Q5"]);
    }

    #[test]
    fn non_privileged_caller_is_routed_to_a_contribution() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        let q1 = append_new(&store, &ctx(), root, "Q1", false, None).unwrap().id;

        let reader = Context::new("bob", []);
        let routed = |_: &WikiStore, _: &Context, _: DocumentId, _: Option<DocumentId>, _: &[DocumentId]| {
            Ok(crate::id::ChangeRequestId::new(42))
        };
        let outcome = reorder(&store, &reader, q1, Some(root), &[q1], routed).unwrap();
        assert!(outcome.is_contribution);
        assert_eq!(outcome.change_request_id.unwrap().get(), 42);
    }

    #[test]
    fn update_routes_rewrites_space_and_descendant_prefixes() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let root = space.root_group_id.unwrap();
        append_new(&store, &ctx(), root, "Guide", false, None).unwrap();

        let updated = update_routes(&store, &ctx(), space.id, "handbook").unwrap();
        assert_eq!(updated, 2); // root + Guide

        let tree = get_tree(&store, space.id).unwrap();
        assert_eq!(tree.route, "handbook");
        assert_eq!(tree.children[0].route, "handbook/guide");
    }

    #[test]
    fn update_routes_rejects_non_manager() {
        let store = WikiStore::new();
        let space = create_space(&store, "Docs", "docs").unwrap();
        let reader = Context::new("bob", []);
        let err = update_routes(&store, &reader, space.id, "handbook").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WikiError>(),
            Some(WikiError::NoDirectWriteCapability)
        ));
    }
}
