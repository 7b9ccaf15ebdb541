//! Error taxonomy (spec.md §7).
//!
//! Three kinds surface to callers on the wire: `not_found`, `validation`
//! (including merge conflicts), `permission`. As in the teacher's
//! `libbit::error`, we generally just pass around `anyhow::Error` for
//! convenience, but keep a matchable `WikiError` enum for the cases callers
//! need to branch on, plus extension traits to downcast into it.

use crate::model::{ChangeRequestId, DocKey, RevisionId, SpaceId};
use std::fmt::{self, Display, Formatter};

pub type WikiResult<T> = Result<T, WikiGenericError>;
pub type WikiGenericError = anyhow::Error;

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum WikiError {
    SpaceNotFound(SpaceId),
    DocumentNotFound(DocKey),
    RevisionNotFound(RevisionId),
    ChangeRequestNotFound(ChangeRequestId),

    RouteEmpty,
    RouteUnchanged,
    RouteConflict(String),
    DocumentNotInChangeRequest(DocKey, ChangeRequestId),
    ParentNotInChangeRequest(DocKey, ChangeRequestId),

    NotAReviewer,
    NotManagerOrApprover,
    NoDirectWriteCapability,

    MergeConflicts(usize),
}

impl Display for WikiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WikiError::SpaceNotFound(id) => write!(f, "wiki space `{id}` not found"),
            WikiError::DocumentNotFound(key) => write!(f, "document `{key}` not found"),
            WikiError::RevisionNotFound(id) => write!(f, "revision `{id}` not found"),
            WikiError::ChangeRequestNotFound(id) => write!(f, "change request `{id}` not found"),
            WikiError::RouteEmpty => write!(f, "route must not be empty"),
            WikiError::RouteUnchanged => write!(f, "new route is identical to the current route"),
            WikiError::RouteConflict(route) => {
                write!(f, "route `{route}` is already in use by another space")
            }
            WikiError::DocumentNotInChangeRequest(key, cr) => {
                write!(f, "document `{key}` not found in change request `{cr}`")
            }
            WikiError::ParentNotInChangeRequest(key, cr) => {
                write!(f, "parent `{key}` not found in change request `{cr}`")
            }
            WikiError::NotAReviewer => {
                write!(f, "you can only submit a review as yourself")
            }
            WikiError::NotManagerOrApprover => write!(
                f,
                "only Wiki Managers or Approvers may perform this action"
            ),
            WikiError::NoDirectWriteCapability => {
                write!(f, "caller does not have direct-write capability")
            }
            WikiError::MergeConflicts(n) => write!(f, "merge conflicts detected ({n})"),
        }
    }
}

impl std::error::Error for WikiError {}

/// The wire-level kind a `WikiError` maps to (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Permission,
}

impl WikiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WikiError::SpaceNotFound(..)
            | WikiError::DocumentNotFound(..)
            | WikiError::RevisionNotFound(..)
            | WikiError::ChangeRequestNotFound(..) => ErrorKind::NotFound,

            WikiError::NotAReviewer
            | WikiError::NotManagerOrApprover
            | WikiError::NoDirectWriteCapability => ErrorKind::Permission,

            WikiError::RouteEmpty
            | WikiError::RouteUnchanged
            | WikiError::RouteConflict(..)
            | WikiError::DocumentNotInChangeRequest(..)
            | WikiError::ParentNotInChangeRequest(..)
            | WikiError::MergeConflicts(..) => ErrorKind::Validation,
        }
    }
}

pub trait WikiErrorExt {
    fn try_into_wiki_error(self) -> WikiResult<WikiError>;
    fn kind(&self) -> Option<ErrorKind>;
}

impl WikiErrorExt for WikiGenericError {
    fn try_into_wiki_error(self) -> WikiResult<WikiError> {
        match self.downcast::<WikiError>() {
            Ok(err) => Ok(err),
            Err(not_a_wiki_error) => Err(not_a_wiki_error),
        }
    }

    fn kind(&self) -> Option<ErrorKind> {
        self.downcast_ref::<WikiError>().map(WikiError::kind)
    }
}

pub trait WikiResultExt {
    fn is_not_found(&self) -> bool;
    fn is_permission(&self) -> bool;
    fn is_validation(&self) -> bool;
}

macro_rules! kind_is_method {
    ($method:ident, $kind:expr) => {
        fn $method(&self) -> bool {
            matches!(WikiErrorExt::kind(self), Some(k) if k == $kind)
        }
    };
}

impl WikiResultExt for WikiGenericError {
    kind_is_method!(is_not_found, ErrorKind::NotFound);

    kind_is_method!(is_permission, ErrorKind::Permission);

    kind_is_method!(is_validation, ErrorKind::Validation);
}

impl<T> WikiResultExt for WikiResult<T> {
    fn is_not_found(&self) -> bool {
        matches!(self, Err(e) if e.is_not_found())
    }

    fn is_permission(&self) -> bool {
        matches!(self, Err(e) if e.is_permission())
    }

    fn is_validation(&self) -> bool {
        matches!(self, Err(e) if e.is_validation())
    }
}
