//! Data model (spec.md §3).

pub use crate::id::{ChangeRequestId, DocKey, DocumentId, BlobId, RevisionId, SpaceId};
use crate::hash::Sha256Hex;
use chrono::{DateTime, Utc};

/// A named container with its own document tree and main revision.
#[derive(Debug, Clone)]
pub struct WikiSpace {
    pub id: SpaceId,
    pub display_name: String,
    /// URL prefix, no leading/trailing slash. Unique across all spaces.
    pub route: String,
    /// Points at a document that is a group and has no parent.
    pub root_group_id: Option<DocumentId>,
    pub main_revision_id: Option<RevisionId>,
}

/// A node in the live tree.
#[derive(Debug, Clone)]
pub struct WikiDocument {
    pub id: DocumentId,
    /// Stable identifier correlating this document across revisions. `None`
    /// only for documents created before a `doc_key` was ever assigned to
    /// them; `revision::snapshot_live` assigns one the first time such a
    /// document is walked (spec.md §4.2).
    pub doc_key: Option<DocKey>,
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub parent_id: Option<DocumentId>,
    pub sort_order: i64,
    /// Permalink. Immutable except via an explicit rename/route rewrite.
    pub route: String,
    /// Meaningful only when `is_group == false`.
    pub content: String,
    pub lft: i64,
    pub rgt: i64,
}

/// An immutable, content-addressed text body.
#[derive(Debug, Clone)]
pub struct ContentBlob {
    pub id: BlobId,
    pub hash: Sha256Hex,
    pub content: String,
    pub content_type: String,
    pub size: usize,
}

impl Default for ContentBlob {
    fn default() -> Self {
        Self {
            id: BlobId::new(0),
            hash: Sha256Hex::of(""),
            content: String::new(),
            content_type: "markdown".to_owned(),
            size: 0,
        }
    }
}

/// An immutable snapshot of a space's tree and content.
#[derive(Debug, Clone)]
pub struct WikiRevision {
    pub id: RevisionId,
    pub space_id: SpaceId,
    pub parent_revision_id: Option<RevisionId>,
    pub change_request_id: Option<ChangeRequestId>,
    pub message: String,
    pub is_working: bool,
    pub is_merge: bool,
    pub tree_hash: Sha256Hex,
    pub content_hash: Sha256Hex,
    pub doc_count: usize,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// One document's snapshot within a revision.
#[derive(Debug, Clone)]
pub struct WikiRevisionItem {
    pub revision_id: RevisionId,
    pub doc_key: DocKey,
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub parent_key: Option<DocKey>,
    pub order_index: i64,
    pub content_blob_id: Option<BlobId>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrStatus {
    Draft,
    InReview,
    ChangesRequested,
    Approved,
    Merged,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Requested,
    Approved,
    ChangesRequested,
}

#[derive(Debug, Clone)]
pub struct ReviewerEntry {
    pub reviewer: String,
    pub status: ReviewStatus,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

/// A branch: base revision + working head + reviewers + status.
#[derive(Debug, Clone)]
pub struct WikiChangeRequest {
    pub id: ChangeRequestId,
    pub space_id: SpaceId,
    pub title: String,
    pub description: Option<String>,
    pub status: CrStatus,
    pub base_revision_id: RevisionId,
    pub head_revision_id: RevisionId,
    pub merge_revision_id: Option<RevisionId>,
    pub outdated: bool,
    pub reviewers: Vec<ReviewerEntry>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged_by: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    Content,
    Meta,
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// A normalized view of a revision item used for three-way comparison
/// (spec.md §4.6, §4.7). Deliberately excludes the content body itself —
/// that's compared/merged separately via `content_hash`/blob lookup so the
/// merger doesn't have to fetch blob text for items that turn out equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub doc_key: DocKey,
    pub title: String,
    pub slug: String,
    pub is_group: bool,
    pub is_published: bool,
    pub parent_key: Option<DocKey>,
    pub order_index: i64,
    pub content_hash: Option<Sha256Hex>,
}

/// A recorded, irreconcilable divergence from a failed merge attempt.
#[derive(Debug, Clone)]
pub struct WikiMergeConflict {
    pub change_request_id: ChangeRequestId,
    pub doc_key: DocKey,
    pub conflict_type: ConflictType,
    pub base_payload: Option<ItemSnapshot>,
    pub ours_payload: Option<ItemSnapshot>,
    pub theirs_payload: Option<ItemSnapshot>,
    pub status: ConflictStatus,
}
