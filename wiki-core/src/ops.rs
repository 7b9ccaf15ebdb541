//! The flat external operation surface (spec.md §6). Thin wrappers over
//! the component modules, returning the shapes named in §6 rather than
//! requiring callers to reach into `tree`/`change_request`/`editor`/`diff`/
//! `apply` directly. This is the crate's intended integration point for an
//! external transport (HTTP/RPC) layer, which is itself out of scope.

use crate::apply::{self, MergeReport};
use crate::change_request;
use crate::diff::{self, PageDiff, SummaryEntry};
use crate::editor::{self, PageUpdate};
use crate::error::WikiResult;
use crate::id::DocKey;
use crate::model::*;
use crate::store::{Context, WikiStore};
use crate::tree::{self, TreeNode};
use std::collections::HashMap;

pub struct ReorderResult {
    pub is_contribution: bool,
    pub cr: Option<WikiChangeRequest>,
}

/// `reorder(doc_id, new_parent_id, new_index, siblings_ids[], cr_id?)`. If
/// the caller lacks direct-write capability, the move is instead recorded
/// on their draft CR via `move_page`/`reorder_children`, and
/// `is_contribution = true` is returned alongside that CR (spec.md §6,
/// SPEC_FULL.md §C.4).
pub fn reorder(
    store: &WikiStore,
    ctx: &Context,
    doc_id: DocumentId,
    new_parent: Option<DocumentId>,
    new_index: usize,
    siblings: &[DocumentId],
) -> WikiResult<ReorderResult> {
    let outcome = tree::reorder(store, ctx, doc_id, new_parent, siblings, route_reorder_to_cr)?;
    let _ = new_index; // siblings[] already encodes the target order (spec.md §4.3)

    if !outcome.is_contribution {
        advance_main_after_direct_reorder(store, ctx, doc_id)?;
        return Ok(ReorderResult { is_contribution: false, cr: None });
    }

    let cr_id = outcome.change_request_id.expect("contribution path always carries a cr id");
    let cr = change_request::get(store, cr_id)?;
    Ok(ReorderResult { is_contribution: true, cr: Some(cr) })
}

fn route_reorder_to_cr(
    store: &WikiStore,
    ctx: &Context,
    doc_id: DocumentId,
    new_parent: Option<DocumentId>,
    siblings: &[DocumentId],
) -> WikiResult<ChangeRequestId> {
    let space_id = tree::space_for_document(store, doc_id)
        .ok_or_else(|| anyhow::anyhow!("document {doc_id} does not belong to any known space"))?;
    let cr = change_request::get_or_create_draft(store, ctx, space_id, None)?;

    let doc_key = store.read(|inner| inner.get_document(doc_id).ok().and_then(|d| d.doc_key));
    let Some(doc_key) = doc_key else {
        return Ok(cr.id);
    };
    let parent_key = new_parent
        .and_then(|p| store.read(|inner| inner.get_document(p).ok().and_then(|d| d.doc_key)));
    let sibling_keys: Vec<DocKey> = siblings
        .iter()
        .filter_map(|&id| store.read(|inner| inner.get_document(id).ok().and_then(|d| d.doc_key)))
        .collect();

    editor::move_page(store, cr.id, &doc_key, parent_key.as_ref(), None)?;
    editor::reorder_children(store, cr.id, parent_key.as_ref(), &sibling_keys)?;
    Ok(cr.id)
}

/// After a direct (non-CR) tree write, snapshot the live tree as a new
/// revision with message "Direct reorder" and advance `main_revision_id`
/// (spec.md §4.8).
fn advance_main_after_direct_reorder(
    store: &WikiStore,
    ctx: &Context,
    doc_id: DocumentId,
) -> WikiResult<()> {
    let Some(space_id) = tree::space_for_document(store, doc_id) else { return Ok(()) };
    let current_main = store.read(|inner| inner.get_space(space_id)).ok().and_then(|s| s.main_revision_id);

    let revision = crate::revision::snapshot_live(
        store,
        ctx,
        space_id,
        "Direct reorder",
        current_main,
        false,
        false,
    )?;
    store.transaction(|inner| {
        if let Some(space) = inner.spaces.get_mut(&space_id) {
            space.main_revision_id = Some(revision.id);
        }
        Ok(())
    })
}

pub fn get_tree(store: &WikiStore, space_id: SpaceId) -> WikiResult<TreeNode> {
    tree::get_tree(store, space_id)
}

pub fn update_routes(store: &WikiStore, ctx: &Context, space_id: SpaceId, new_route: &str) -> WikiResult<usize> {
    tree::update_routes(store, ctx, space_id, new_route)
}

pub fn create_cr(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    title: &str,
    description: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    change_request::create(store, ctx, space_id, title, description)
}

pub fn get_or_create_draft_cr(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    title: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    change_request::get_or_create_draft(store, ctx, space_id, title)
}

pub fn list_crs(store: &WikiStore, space_id: SpaceId, status: Option<CrStatus>) -> Vec<WikiChangeRequest> {
    change_request::list(store, space_id, status)
}

pub fn update_cr(
    store: &WikiStore,
    id: ChangeRequestId,
    title: Option<&str>,
    description: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    change_request::update(store, id, title, description)
}

pub fn archive_cr(store: &WikiStore, ctx: &Context, id: ChangeRequestId) -> WikiResult<WikiChangeRequest> {
    change_request::archive(store, ctx, id)
}

/// A nested view of a CR's working head, mirroring `tree::TreeNode` (spec.md
/// §6 `get_cr_tree(id) → nested_nodes`). Deleted items are omitted, same as
/// `tree::get_tree`'s live equivalent.
#[derive(Debug, Clone)]
pub struct CrTreeNode {
    pub doc_key: DocKey,
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub order_index: i64,
    pub children: Vec<CrTreeNode>,
}

pub fn get_cr_tree(store: &WikiStore, id: ChangeRequestId) -> WikiResult<CrTreeNode> {
    let cr = change_request::get(store, id)?;
    let items = crate::revision::items(store, cr.head_revision_id);
    let items: HashMap<DocKey, WikiRevisionItem> =
        items.into_iter().filter(|(_, item)| !item.is_deleted).collect();

    let order = crate::revision::tree_order(&items);
    let root_key = order
        .into_iter()
        .find(|key| items[key].parent_key.is_none())
        .ok_or_else(|| anyhow::anyhow!("change request {id} has no root document"))?;
    Ok(build_cr_tree_node(&root_key, &items))
}

fn build_cr_tree_node(key: &DocKey, items: &HashMap<DocKey, WikiRevisionItem>) -> CrTreeNode {
    let item = &items[key];
    let mut children: Vec<&WikiRevisionItem> =
        items.values().filter(|i| i.parent_key.as_ref() == Some(key)).collect();
    children.sort_by_key(|c| (c.order_index, c.doc_key.clone()));

    CrTreeNode {
        doc_key: item.doc_key.clone(),
        title: item.title.clone(),
        slug: item.slug.clone(),
        is_group: item.is_group,
        is_published: item.is_published,
        order_index: item.order_index,
        children: children.into_iter().map(|c| build_cr_tree_node(&c.doc_key, items)).collect(),
    }
}

pub fn get_cr_page(
    store: &WikiStore,
    id: ChangeRequestId,
    doc_key: &DocKey,
) -> WikiResult<Option<WikiRevisionItem>> {
    let cr = change_request::get(store, id)?;
    let items = crate::revision::items(store, cr.head_revision_id);
    Ok(items.get(doc_key).filter(|i| !i.is_deleted).cloned())
}

#[allow(clippy::too_many_arguments)]
pub fn create_cr_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    parent_key: Option<&DocKey>,
    title: &str,
    slug: Option<&str>,
    is_group: bool,
    is_published: bool,
    content: &str,
    order_index: Option<i64>,
) -> WikiResult<WikiRevisionItem> {
    editor::create_page(store, cr_id, parent_key, title, slug, is_group, is_published, content, order_index)
}

pub fn update_cr_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    doc_key: &DocKey,
    update: PageUpdate,
) -> WikiResult<WikiRevisionItem> {
    editor::update_page(store, cr_id, doc_key, update)
}

pub fn move_cr_page(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    doc_key: &DocKey,
    new_parent_key: Option<&DocKey>,
    new_order_index: Option<i64>,
) -> WikiResult<WikiRevisionItem> {
    editor::move_page(store, cr_id, doc_key, new_parent_key, new_order_index)
}

pub fn reorder_cr_children(
    store: &WikiStore,
    cr_id: ChangeRequestId,
    parent_key: Option<&DocKey>,
    ordered_keys: &[DocKey],
) -> WikiResult<()> {
    editor::reorder_children(store, cr_id, parent_key, ordered_keys)
}

pub fn delete_cr_page(store: &WikiStore, cr_id: ChangeRequestId, doc_key: &DocKey) -> WikiResult<usize> {
    editor::delete_page(store, cr_id, doc_key)
}

pub enum DiffScope {
    Summary,
    Page(DocKey),
}

pub enum DiffResult {
    Summary(Vec<SummaryEntry>),
    Page(PageDiff),
}

pub fn diff_cr(store: &WikiStore, id: ChangeRequestId, scope: DiffScope) -> WikiResult<DiffResult> {
    match scope {
        DiffScope::Summary => diff::summary(store, id).map(DiffResult::Summary),
        DiffScope::Page(doc_key) => diff::page(store, id, &doc_key).map(DiffResult::Page),
    }
}

pub fn request_review(store: &WikiStore, id: ChangeRequestId, reviewers: &[String]) -> WikiResult<WikiChangeRequest> {
    change_request::request_review(store, id, reviewers)
}

pub fn review_action(
    store: &WikiStore,
    ctx: &Context,
    id: ChangeRequestId,
    reviewer: &str,
    action: ReviewStatus,
    comment: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    change_request::review_action(store, ctx, id, reviewer, action, comment)
}

pub fn merge_cr(store: &WikiStore, ctx: &Context, id: ChangeRequestId) -> WikiResult<MergeReport> {
    apply::merge_cr(store, ctx, id)
}

pub fn check_outdated(store: &WikiStore, id: ChangeRequestId) -> WikiResult<bool> {
    change_request::check_outdated(store, id)
}
