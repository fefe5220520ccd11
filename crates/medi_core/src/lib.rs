pub mod auth;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod guard;
pub mod ingestion;
pub mod ports;
pub mod profile;
pub mod prompts;
pub mod summary;
pub mod visits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{AuthContext, SessionState};
pub use dashboard::{Dashboard, Overview};
pub use domain::{DocumentFile, NewVisit, Profile, ProfileUpdate, Session, SignUpData, Visit, VisitForm};
pub use error::{ErrorKind, Operation, WorkflowError};
pub use guard::{Access, RouteGuard};
pub use ports::{
    AuthService, Buckets, DatabaseService, ObjectStorage, PortError, PortResult, Services,
    TextGenerationService,
};
pub use summary::{AggregateSummary, AggregateView};
pub use visits::{Translation, VisitEntry};
