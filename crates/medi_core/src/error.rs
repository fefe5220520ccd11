//! crates/medi_core/src/error.rs
//!
//! Error kinds, the per-operation failure policy table, and the error type the
//! workflows return to their callers.

use std::fmt;

use crate::ports::PortError;

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Store,
    Storage,
    Generation,
    Validation,
    Busy,
    Conflict,
    Unauthenticated,
}

/// What a workflow does with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Returned to the user who started the action.
    Surface,
    /// Logged; the workflow carries on with an empty or default value.
    Degrade,
    /// Logged; a fixed substitute value is used instead.
    Fallback,
    /// Logged and otherwise ignored.
    LogOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub kind: ErrorKind,
    pub retry: bool,
    pub reaction: Reaction,
}

/// Every call site that talks to an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    RefreshSession,
    RestoreSession,
    LoadProfile,
    SaveProfile,
    ListVisits,
    ListSummaries,
    FindVisit,
    InsertVisit,
    DeleteVisit,
    UploadObject,
    DownloadObject,
    RemoveObject,
    GenerateVisitSummary,
    GenerateAggregate,
    TranslateVisit,
    TranslateAggregate,
}

impl Operation {
    /// The failure policy table. Nothing is retried.
    pub fn policy(self) -> Policy {
        use ErrorKind::*;
        use Operation::*;
        let (kind, reaction) = match self {
            SignUp | SignIn => (Auth, Reaction::Surface),
            SignOut => (Auth, Reaction::LogOnly),
            RefreshSession | RestoreSession => (Auth, Reaction::Degrade),
            LoadProfile | ListVisits | ListSummaries => (Store, Reaction::Degrade),
            FindVisit | InsertVisit | DeleteVisit | SaveProfile => (Store, Reaction::Surface),
            UploadObject | DownloadObject | RemoveObject => (Storage, Reaction::Surface),
            GenerateVisitSummary => (Generation, Reaction::Fallback),
            GenerateAggregate | TranslateVisit | TranslateAggregate => {
                (Generation, Reaction::Surface)
            }
        };
        Policy {
            kind,
            retry: false,
            reaction,
        }
    }

    /// Wraps a port failure, logging it at the level its reaction calls for.
    pub fn fail(self, source: PortError) -> WorkflowError {
        self.log(&source);
        WorkflowError::Port {
            operation: self,
            source,
        }
    }

    pub fn log(self, error: &PortError) {
        match self.policy().reaction {
            Reaction::Surface => tracing::error!(operation = %self, error = %error, "operation failed"),
            Reaction::Degrade | Reaction::Fallback | Reaction::LogOnly => {
                tracing::warn!(operation = %self, error = %error, "operation failed")
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::SignUp => "sign up",
            Operation::SignIn => "sign in",
            Operation::SignOut => "sign out",
            Operation::RefreshSession => "refresh session",
            Operation::RestoreSession => "restore session",
            Operation::LoadProfile => "load profile",
            Operation::SaveProfile => "save profile",
            Operation::ListVisits => "list visits",
            Operation::ListSummaries => "list visit summaries",
            Operation::FindVisit => "find visit",
            Operation::InsertVisit => "record visit",
            Operation::DeleteVisit => "delete visit",
            Operation::UploadObject => "upload document",
            Operation::DownloadObject => "download document",
            Operation::RemoveObject => "remove document",
            Operation::GenerateVisitSummary => "generate visit summary",
            Operation::GenerateAggregate => "generate patient summary",
            Operation::TranslateVisit => "translate visit summary",
            Operation::TranslateAggregate => "translate patient summary",
        };
        f.write_str(name)
    }
}

/// The error type returned by every workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    /// The same action is still running for this dashboard.
    #[error("{0} is already in progress")]
    Busy(&'static str),

    /// The data an action started from changed before it finished.
    #[error("{0}")]
    Conflict(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Failed to {operation}: {source}")]
    Port {
        operation: Operation,
        #[source]
        source: PortError,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::Busy(_) => ErrorKind::Busy,
            WorkflowError::Conflict(_) => ErrorKind::Conflict,
            WorkflowError::Unauthenticated => ErrorKind::Unauthenticated,
            WorkflowError::Port { operation, .. } => operation.policy().kind,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WorkflowError::Port {
                source: PortError::NotFound(_),
                ..
            }
        )
    }

    /// An upstream service refused the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            WorkflowError::Port {
                source: PortError::Unauthorized,
                ..
            }
        )
    }

    /// The message shown to the user. Upstream refusals are passed through as-is.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Port {
                source: PortError::Rejected(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_retried() {
        let all = [
            Operation::SignUp,
            Operation::SignIn,
            Operation::SignOut,
            Operation::RefreshSession,
            Operation::RestoreSession,
            Operation::LoadProfile,
            Operation::SaveProfile,
            Operation::ListVisits,
            Operation::ListSummaries,
            Operation::FindVisit,
            Operation::InsertVisit,
            Operation::DeleteVisit,
            Operation::UploadObject,
            Operation::DownloadObject,
            Operation::RemoveObject,
            Operation::GenerateVisitSummary,
            Operation::GenerateAggregate,
            Operation::TranslateVisit,
            Operation::TranslateAggregate,
        ];
        assert!(all.iter().all(|op| !op.policy().retry));
    }

    #[test]
    fn reads_degrade_and_writes_surface() {
        assert_eq!(Operation::ListVisits.policy().reaction, Reaction::Degrade);
        assert_eq!(Operation::InsertVisit.policy().reaction, Reaction::Surface);
        assert_eq!(Operation::UploadObject.policy().kind, ErrorKind::Storage);
        assert_eq!(
            Operation::GenerateVisitSummary.policy().reaction,
            Reaction::Fallback
        );
        assert_eq!(Operation::TranslateVisit.policy().reaction, Reaction::Surface);
    }

    #[test]
    fn kind_follows_the_failed_operation() {
        let err = Operation::RemoveObject.fail(PortError::Unexpected("boom".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.to_string(), "Failed to remove document: An unexpected error occurred: boom");
    }

    #[test]
    fn refused_credentials_are_recognised_whatever_the_operation() {
        let err = Operation::DownloadObject.fail(PortError::Unauthorized);
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_unauthorized());
        assert!(!Operation::DownloadObject
            .fail(PortError::Unexpected("boom".into()))
            .is_unauthorized());
    }

    #[test]
    fn rejected_messages_reach_the_user_verbatim() {
        let err = Operation::SignIn.fail(PortError::Rejected("Invalid login credentials".into()));
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.user_message(), "Invalid login credentials");
    }
}
