//! The in-memory transactional store and the request context (spec.md §5,
//! §9).
//!
//! Every public operation takes a `&Context` explicitly — the redesign
//! spec.md §9 calls for in place of the teacher's thread-local
//! `tls::with_repo`. `WikiStore` plays the role of "the database": a single
//! `parking_lot::RwLock` (matching the teacher's locking primitive)
//! guarding all tables, with write operations taking the lock for their
//! whole critical section the way spec.md §5 describes one handler running
//! to completion inside one transaction, serialized by a row-level lock on
//! the space.

use crate::config::WikiConfig;
use crate::hash::Sha256Hex;
use crate::id::IdCounter;
use crate::model::*;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    WikiManager,
    WikiApprover,
    SystemManager,
    /// Capability to write directly to the live tree without going through
    /// a change request.
    WikiEditor,
}

/// The authenticated principal and role set a caller presents to every
/// operation (spec.md §9's redesigned explicit `Context`).
#[derive(Debug, Clone)]
pub struct Context {
    pub principal: String,
    pub roles: HashSet<Role>,
}

impl Context {
    pub fn new(principal: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { principal: principal.into(), roles: roles.into_iter().collect() }
    }

    /// spec.md §4.8, §4.4: Wiki Manager / Wiki Approver / System Manager.
    pub fn is_manager_or_approver(&self) -> bool {
        self.roles.contains(&Role::WikiManager)
            || self.roles.contains(&Role::WikiApprover)
            || self.roles.contains(&Role::SystemManager)
    }

    /// spec.md §4.3: whether writes to the live tree apply directly, or are
    /// routed to a change request instead.
    pub fn has_direct_write(&self) -> bool {
        self.roles.contains(&Role::WikiManager)
            || self.roles.contains(&Role::SystemManager)
            || self.roles.contains(&Role::WikiEditor)
    }

    pub fn is_wiki_manager(&self) -> bool {
        self.roles.contains(&Role::WikiManager) || self.roles.contains(&Role::SystemManager)
    }
}

#[derive(Default)]
pub(crate) struct StoreInner {
    pub config: WikiConfig,
    pub spaces: HashMap<SpaceId, WikiSpace>,
    pub documents: HashMap<DocumentId, WikiDocument>,
    pub doc_key_index: HashMap<DocKey, DocumentId>,
    pub blobs: HashMap<BlobId, ContentBlob>,
    pub blob_by_hash: HashMap<Sha256Hex, BlobId>,
    pub revisions: HashMap<RevisionId, WikiRevision>,
    pub revision_items: HashMap<RevisionId, HashMap<DocKey, WikiRevisionItem>>,
    pub change_requests: HashMap<ChangeRequestId, WikiChangeRequest>,
    pub merge_conflicts: Vec<WikiMergeConflict>,

    pub(crate) space_ids: IdCounter,
    pub(crate) document_ids: IdCounter,
    pub(crate) blob_ids: IdCounter,
    pub(crate) revision_ids: IdCounter,
    pub(crate) cr_ids: IdCounter,
}

impl StoreInner {
    pub fn get_space(&self, id: SpaceId) -> crate::error::WikiResult<WikiSpace> {
        self.spaces
            .get(&id)
            .cloned()
            .ok_or_else(|| crate::error::WikiError::SpaceNotFound(id).into())
    }

    pub fn get_document(&self, id: DocumentId) -> crate::error::WikiResult<WikiDocument> {
        self.documents.get(&id).cloned().ok_or_else(|| {
            anyhow::anyhow!("internal: document id {id} referenced but missing")
        })
    }

    pub fn get_document_by_key(&self, key: &DocKey) -> crate::error::WikiResult<WikiDocument> {
        self.doc_key_index
            .get(key)
            .and_then(|id| self.documents.get(id))
            .cloned()
            .ok_or_else(|| crate::error::WikiError::DocumentNotFound(key.clone()).into())
    }

    pub fn get_revision(&self, id: RevisionId) -> crate::error::WikiResult<WikiRevision> {
        self.revisions
            .get(&id)
            .cloned()
            .ok_or_else(|| crate::error::WikiError::RevisionNotFound(id).into())
    }

    pub fn get_change_request(
        &self,
        id: ChangeRequestId,
    ) -> crate::error::WikiResult<WikiChangeRequest> {
        self.change_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| crate::error::WikiError::ChangeRequestNotFound(id).into())
    }

    pub fn get_blob(&self, id: BlobId) -> crate::error::WikiResult<ContentBlob> {
        self.blobs
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("internal: blob id {id} referenced but missing"))
    }

    pub fn blob_content(&self, id: Option<BlobId>) -> String {
        id.and_then(|id| self.blobs.get(&id)).map(|b| b.content.clone()).unwrap_or_default()
    }

    pub fn revision_items(&self, id: RevisionId) -> HashMap<DocKey, WikiRevisionItem> {
        self.revision_items.get(&id).cloned().unwrap_or_default()
    }

    pub fn next_space_id(&self) -> SpaceId {
        SpaceId::new(self.space_ids.next())
    }

    pub fn next_document_id(&self) -> DocumentId {
        DocumentId::new(self.document_ids.next())
    }

    pub fn next_blob_id(&self) -> BlobId {
        BlobId::new(self.blob_ids.next())
    }

    pub fn next_revision_id(&self) -> RevisionId {
        RevisionId::new(self.revision_ids.next())
    }

    pub fn next_cr_id(&self) -> ChangeRequestId {
        ChangeRequestId::new(self.cr_ids.next())
    }

    /// Documents under `root` (inclusive) per the nested-set range, ordered
    /// by `lft` (spec.md §4.2's pre-order snapshot walk).
    pub fn documents_under(&self, root: &WikiDocument) -> Vec<WikiDocument> {
        let mut docs: Vec<WikiDocument> = self
            .documents
            .values()
            .filter(|d| d.lft >= root.lft && d.rgt <= root.rgt)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.lft);
        docs
    }

    pub fn children_of(&self, parent: Option<DocumentId>) -> Vec<WikiDocument> {
        let mut children: Vec<WikiDocument> =
            self.documents.values().filter(|d| d.parent_id == parent).cloned().collect();
        children.sort_by_key(|d| (d.sort_order, d.id));
        children
    }

    pub fn max_sort_order(&self, parent: Option<DocumentId>) -> i64 {
        self.documents
            .values()
            .filter(|d| d.parent_id == parent)
            .map(|d| d.sort_order)
            .max()
            .unwrap_or(-1)
    }

    /// Walks up `parent_id` from `doc` to find the space whose
    /// `root_group_id` it descends from (original_source's
    /// `_get_wiki_space_for_document`). Guarded against cycles.
    pub fn space_for_document(&self, doc: DocumentId) -> Option<SpaceId> {
        let mut current = Some(doc);
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = current {
            if !visited.insert(id) {
                return None;
            }
            if let Some(space) = self.spaces.values().find(|s| s.root_group_id == Some(id)) {
                return Some(space.id);
            }
            current = self.documents.get(&id).and_then(|d| d.parent_id);
        }
        None
    }
}

/// The engine's "database". One lock for the whole store; see the module
/// doc comment for why that's an adequate model of spec.md §5's
/// per-space row lock at this scope.
#[derive(Default)]
pub struct WikiStore {
    inner: RwLock<StoreInner>,
}

impl WikiStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WikiConfig) -> Self {
        let store = Self::default();
        store.inner.write().config = config;
        store
    }

    pub fn config(&self) -> WikiConfig {
        self.inner.read().config.clone()
    }

    /// Runs `f` with exclusive access, as if `f`'s body were one database
    /// transaction (spec.md §5). Cancellation (an `Err` return) leaves no
    /// partial state visible to subsequent calls only in the sense that
    /// callers must not partially apply writes before an error path —
    /// each component is written to validate before mutating.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut StoreInner) -> crate::error::WikiResult<T>) -> crate::error::WikiResult<T> {
        let mut guard = self.inner.write();
        f(&mut guard)
    }

    pub fn read<T>(&self, f: impl FnOnce(&StoreInner) -> T) -> T {
        let guard = self.inner.read();
        f(&guard)
    }
}
