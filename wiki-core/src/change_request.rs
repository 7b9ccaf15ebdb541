//! Change Request lifecycle (spec.md §4.4). A branch: base revision +
//! working head revision + reviewers + status.

use crate::error::{WikiError, WikiResult};
use crate::model::*;
use crate::revision;
use crate::store::{Context, WikiStore};
use chrono::Utc;

/// If `space.main_revision` is null, snapshots the live tree as the
/// initial main revision first. Clones that revision as a working head,
/// and constructs a `Draft` CR with `base=main`, `head=clone`.
pub fn create(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    title: &str,
    description: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    ensure_main_revision(store, ctx, space_id)?;

    store.transaction(|inner| {
        let space = inner.get_space(space_id)?;
        let base_id = space.main_revision_id.expect("ensured above");

        let cr_id = inner.next_cr_id();
        let working = clone_into_store(inner, ctx, base_id, Some(cr_id))?;

        let now = Utc::now();
        let cr = WikiChangeRequest {
            id: cr_id,
            space_id,
            title: title.to_owned(),
            description: description.map(str::to_owned),
            status: CrStatus::Draft,
            base_revision_id: base_id,
            head_revision_id: working.id,
            merge_revision_id: None,
            outdated: false,
            reviewers: Vec::new(),
            owner: ctx.principal.clone(),
            created_at: now,
            updated_at: now,
            merged_at: None,
            merged_by: None,
            archived_at: None,
        };
        inner.change_requests.insert(cr_id, cr.clone());
        debug!("created change request {cr_id} on space {space_id}");
        Ok(cr)
    })
}

/// Returns the caller's most recent Draft/Changes Requested CR for the
/// space. If its base has diverged from `space.main_revision` **and** its
/// tree/content hashes already equal the new main's hashes, archives it
/// and opens a new one (rebase elision, per the original's policy — see
/// DESIGN.md for the Open Question this resolves). Otherwise flags it
/// `outdated`.
pub fn get_or_create_draft(
    store: &WikiStore,
    ctx: &Context,
    space_id: SpaceId,
    title: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    ensure_main_revision(store, ctx, space_id)?;

    let existing = store.read(|inner| {
        let space = inner.spaces.get(&space_id);
        let mut candidates: Vec<WikiChangeRequest> = inner
            .change_requests
            .values()
            .filter(|cr| {
                cr.space_id == space_id
                    && cr.owner == ctx.principal
                    && matches!(cr.status, CrStatus::Draft | CrStatus::ChangesRequested)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|cr| std::cmp::Reverse(cr.created_at));
        let _ = space;
        candidates.into_iter().next()
    });

    let Some(existing) = existing else {
        let title =
            title.map(str::to_owned).unwrap_or_else(|| default_draft_title(store, space_id));
        return create(store, ctx, space_id, &title, None);
    };

    let main_revision_id =
        store.read(|inner| inner.spaces.get(&space_id).and_then(|s| s.main_revision_id));

    if Some(existing.base_revision_id) == main_revision_id {
        return Ok(existing);
    }

    let main_id = main_revision_id.expect("ensured above");
    let (main_hashes, cr_hashes) = store.read(|inner| {
        let main = inner.revisions.get(&main_id).cloned();
        let head = inner.revisions.get(&existing.head_revision_id).cloned();
        (main.map(|r| (r.tree_hash, r.content_hash)), head.map(|r| (r.tree_hash, r.content_hash)))
    });

    if main_hashes.is_some() && main_hashes == cr_hashes {
        archive(store, ctx, existing.id)?;
        let title =
            title.map(str::to_owned).unwrap_or_else(|| default_draft_title(store, space_id));
        create(store, ctx, space_id, &title, None)
    } else {
        store.transaction(|inner| {
            if let Some(cr) = inner.change_requests.get_mut(&existing.id) {
                cr.outdated = true;
                cr.updated_at = Utc::now();
            }
            inner.get_change_request(existing.id)
        })
    }
}

fn default_draft_title(store: &WikiStore, space_id: SpaceId) -> String {
    let name = store.read(|inner| {
        inner.spaces.get(&space_id).map(|s| s.display_name.clone()).unwrap_or_default()
    });
    format!("Draft Changes - {name}")
}

pub fn list(
    store: &WikiStore,
    space_id: SpaceId,
    status: Option<CrStatus>,
) -> Vec<WikiChangeRequest> {
    store.read(|inner| {
        inner
            .change_requests
            .values()
            .filter(|cr| cr.space_id == space_id)
            .filter(|cr| status.map_or(true, |s| cr.status == s))
            .cloned()
            .collect()
    })
}

pub fn get(store: &WikiStore, id: ChangeRequestId) -> WikiResult<WikiChangeRequest> {
    store.read(|inner| inner.get_change_request(id))
}

pub fn update(
    store: &WikiStore,
    id: ChangeRequestId,
    title: Option<&str>,
    description: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    store.transaction(|inner| {
        let mut cr = inner.get_change_request(id)?;
        if let Some(title) = title {
            cr.title = title.to_owned();
        }
        if let Some(description) = description {
            cr.description = Some(description.to_owned());
        }
        cr.updated_at = Utc::now();
        inner.change_requests.insert(id, cr.clone());
        Ok(cr)
    })
}

pub fn archive(store: &WikiStore, _ctx: &Context, id: ChangeRequestId) -> WikiResult<WikiChangeRequest> {
    store.transaction(|inner| {
        let mut cr = inner.get_change_request(id)?;
        cr.status = CrStatus::Archived;
        cr.archived_at = Some(Utc::now());
        cr.updated_at = Utc::now();
        inner.change_requests.insert(id, cr.clone());
        debug!("archived change request {id}");
        Ok(cr)
    })
}

/// Deduplicates `reviewers`, replaces the reviewer table with fresh
/// `Requested` rows, and sets the CR status to `In Review`.
pub fn request_review(
    store: &WikiStore,
    id: ChangeRequestId,
    reviewers: &[String],
) -> WikiResult<WikiChangeRequest> {
    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<String> = reviewers
        .iter()
        .filter(|r| seen.insert((*r).clone()))
        .cloned()
        .collect();

    store.transaction(|inner| {
        let mut cr = inner.get_change_request(id)?;
        cr.reviewers = deduped
            .iter()
            .map(|reviewer| ReviewerEntry {
                reviewer: reviewer.clone(),
                status: ReviewStatus::Requested,
                reviewed_at: None,
                comment: None,
            })
            .collect();
        cr.status = CrStatus::InReview;
        cr.updated_at = Utc::now();
        inner.change_requests.insert(id, cr.clone());
        Ok(cr)
    })
}

/// `action` must be `Approved` or `ChangesRequested`. The caller must
/// either be the named reviewer or hold a managing role — both checks are
/// enforced (see DESIGN.md).
pub fn review_action(
    store: &WikiStore,
    ctx: &Context,
    id: ChangeRequestId,
    reviewer: &str,
    action: ReviewStatus,
    comment: Option<&str>,
) -> WikiResult<WikiChangeRequest> {
    if reviewer != ctx.principal && !ctx.is_manager_or_approver() {
        return Err(WikiError::NotAReviewer.into());
    }

    store.transaction(|inner| {
        let mut cr = inner.get_change_request(id)?;
        let now = Utc::now();
        if let Some(entry) = cr.reviewers.iter_mut().find(|r| r.reviewer == reviewer) {
            entry.status = action;
            entry.reviewed_at = Some(now);
            entry.comment = comment.map(str::to_owned);
        } else {
            cr.reviewers.push(ReviewerEntry {
                reviewer: reviewer.to_owned(),
                status: action,
                reviewed_at: Some(now),
                comment: comment.map(str::to_owned),
            });
        }

        cr.status = if cr.reviewers.iter().any(|r| r.status == ReviewStatus::ChangesRequested) {
            CrStatus::ChangesRequested
        } else if !cr.reviewers.is_empty()
            && cr.reviewers.iter().all(|r| r.status == ReviewStatus::Approved)
        {
            CrStatus::Approved
        } else {
            CrStatus::InReview
        };
        cr.updated_at = now;
        inner.change_requests.insert(id, cr.clone());
        trace!("review_action on {id} by {reviewer}: {:?} -> status {:?}", action, cr.status);
        Ok(cr)
    })
}

/// Sets `outdated = true` iff `space.main_revision_id != cr.base_revision_id`.
pub fn check_outdated(store: &WikiStore, id: ChangeRequestId) -> WikiResult<bool> {
    store.transaction(|inner| {
        let mut cr = inner.get_change_request(id)?;
        let space = inner.get_space(cr.space_id)?;
        let outdated = space.main_revision_id != Some(cr.base_revision_id);
        cr.outdated = outdated;
        inner.change_requests.insert(id, cr);
        Ok(outdated)
    })
}

fn ensure_main_revision(store: &WikiStore, ctx: &Context, space_id: SpaceId) -> WikiResult<()> {
    let needs_snapshot =
        store.read(|inner| inner.spaces.get(&space_id).map(|s| s.main_revision_id.is_none()));
    match needs_snapshot {
        Some(true) => {
            let revision = revision::snapshot_live(store, ctx, space_id, "Initial", None, false, false)?;
            store.transaction(|inner| {
                if let Some(space) = inner.spaces.get_mut(&space_id) {
                    space.main_revision_id = Some(revision.id);
                }
                Ok(())
            })
        }
        Some(false) => Ok(()),
        None => Err(WikiError::SpaceNotFound(space_id).into()),
    }
}

fn clone_into_store(
    inner: &mut crate::store::StoreInner,
    ctx: &Context,
    base_revision: RevisionId,
    owning_cr: Option<ChangeRequestId>,
) -> WikiResult<WikiRevision> {
    let base = inner.get_revision(base_revision)?;
    let base_items = inner.revision_items(base_revision);

    let new_id = inner.next_revision_id();
    let new_revision = WikiRevision {
        id: new_id,
        space_id: base.space_id,
        parent_revision_id: Some(base_revision),
        change_request_id: owning_cr,
        message: base.message.clone(),
        is_working: true,
        is_merge: false,
        tree_hash: base.tree_hash.clone(),
        content_hash: base.content_hash.clone(),
        doc_count: base.doc_count,
        created_at: Utc::now(),
        created_by: ctx.principal.clone(),
    };
    inner.revisions.insert(new_id, new_revision);

    let mut new_items = std::collections::HashMap::with_capacity(base_items.len());
    for (key, mut item) in base_items {
        item.revision_id = new_id;
        new_items.insert(key, item);
    }
    inner.revision_items.insert(new_id, new_items);
    inner.get_revision(new_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use crate::tree;

    fn ctx() -> Context {
        Context::new("alice", [Role::WikiManager])
    }

    fn new_space(store: &WikiStore) -> WikiSpace {
        tree::create_space(store, "Docs", "docs").unwrap()
    }

    #[test]
    fn create_snapshots_live_tree_as_initial_main_when_absent() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let cr = create(&store, &ctx(), space.id, "My change", None).unwrap();
        assert_eq!(cr.status, CrStatus::Draft);

        let space = store.read(|inner| inner.get_space(space.id)).unwrap();
        assert!(space.main_revision_id.is_some());
        assert_eq!(Some(cr.base_revision_id), space.main_revision_id);
    }

    #[test]
    fn review_action_requires_named_reviewer_or_manager() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let cr = create(&store, &ctx(), space.id, "My change", None).unwrap();
        request_review(&store, cr.id, &["bob".to_owned()]).unwrap();

        let carol = Context::new("carol", []);
        let err = review_action(&store, &carol, cr.id, "bob", ReviewStatus::Approved, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WikiError>(),
            Some(WikiError::NotAReviewer)
        ));

        let bob = Context::new("bob", []);
        review_action(&store, &bob, cr.id, "bob", ReviewStatus::Approved, None).unwrap();
    }

    #[test_env_log::test]
    fn review_status_function_matches_spec_truth_table() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let cr = create(&store, &ctx(), space.id, "My change", None).unwrap();
        request_review(&store, cr.id, &["bob".to_owned(), "carol".to_owned()]).unwrap();

        let bob = Context::new("bob", []);
        let carol = Context::new("carol", []);

        let cr = review_action(&store, &bob, cr.id, "bob", ReviewStatus::Approved, None).unwrap();
        assert_eq!(cr.status, CrStatus::InReview);

        let cr =
            review_action(&store, &carol, cr.id, "carol", ReviewStatus::Approved, None).unwrap();
        assert_eq!(cr.status, CrStatus::Approved);

        let cr = review_action(
            &store,
            &bob,
            cr.id,
            "bob",
            ReviewStatus::ChangesRequested,
            Some("needs work"),
        )
        .unwrap();
        assert_eq!(cr.status, CrStatus::ChangesRequested);
    }

    #[test]
    fn request_review_deduplicates_reviewers() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let cr = create(&store, &ctx(), space.id, "My change", None).unwrap();
        let cr =
            request_review(&store, cr.id, &["bob".to_owned(), "bob".to_owned()]).unwrap();
        assert_eq!(cr.reviewers.len(), 1);
    }

    #[test]
    fn check_outdated_detects_main_advance() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let cr = create(&store, &ctx(), space.id, "My change", None).unwrap();
        assert!(!check_outdated(&store, cr.id).unwrap());

        let r1 = revision::snapshot_live(&store, &ctx(), space.id, "R1", None, false, false)
            .unwrap();
        store
            .transaction(|inner| {
                inner.spaces.get_mut(&space.id).unwrap().main_revision_id = Some(r1.id);
                Ok(())
            })
            .unwrap();

        assert!(check_outdated(&store, cr.id).unwrap());
        let cr = get(&store, cr.id).unwrap();
        assert!(cr.outdated);
    }

    #[test]
    fn get_or_create_draft_reuses_unchanged_existing_draft() {
        let store = WikiStore::new();
        let space = new_space(&store);
        let first = get_or_create_draft(&store, &ctx(), space.id, None).unwrap();
        let second = get_or_create_draft(&store, &ctx(), space.id, None).unwrap();
        assert_eq!(first.id, second.id);
    }
}
