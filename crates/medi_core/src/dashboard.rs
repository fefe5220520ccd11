//! crates/medi_core/src/dashboard.rs
//!
//! One dashboard per signed-in client. It owns the client's auth context and all
//! state that only lives as long as the view does: translations, the patient
//! summary, in-flight flags and the loaded profile.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{AuthContext, SessionState};
use crate::domain::{DocumentFile, Profile, ProfileUpdate, Session, SignUpData, Visit, VisitForm};
use crate::error::WorkflowError;
use crate::guard::{Access, RouteGuard};
use crate::ingestion::{self, IngestOutcome};
use crate::ports::Services;
use crate::profile::{self, ProfileSlot};
use crate::summary::{self, AggregateView};
use crate::visits::{self, TranslationCache, VisitEntry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears an in-flight flag when dropped, whichever way the workflow ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, what: &'static str) -> Result<Self, WorkflowError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(WorkflowError::Busy(what));
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Same as `InFlight`, per visit.
struct Translating<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    visit_id: Uuid,
}

impl<'a> Translating<'a> {
    fn acquire(set: &'a Mutex<HashSet<Uuid>>, visit_id: Uuid) -> Result<Self, WorkflowError> {
        if !lock(set).insert(visit_id) {
            return Err(WorkflowError::Busy("Translation"));
        }
        Ok(Self { set, visit_id })
    }
}

impl Drop for Translating<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.visit_id);
    }
}

/// Everything the dashboard page shows at once.
#[derive(Debug, Clone)]
pub struct Overview {
    pub session: Session,
    pub profile: Profile,
    pub visits: Vec<VisitEntry>,
    pub summary: AggregateView,
}

pub struct Dashboard {
    services: Services,
    auth: AuthContext,
    /// The user the cached state below belongs to.
    owner: Mutex<Option<Uuid>>,
    translations: Mutex<TranslationCache>,
    aggregate: Mutex<AggregateView>,
    profile: Mutex<ProfileSlot>,
    uploading: AtomicBool,
    translating_summary: AtomicBool,
    translating: Mutex<HashSet<Uuid>>,
    shutdown: CancellationToken,
}

impl Dashboard {
    /// Creates the view and starts the watcher that follows identity changes
    /// made outside a request, such as a failed refresh. Must be called inside a
    /// Tokio runtime.
    pub fn start(services: Services) -> Arc<Self> {
        let dashboard = Arc::new(Self {
            auth: AuthContext::new(services.auth.clone()),
            owner: Mutex::new(None),
            services,
            translations: Mutex::new(TranslationCache::default()),
            aggregate: Mutex::new(AggregateView::default()),
            profile: Mutex::new(ProfileSlot::default()),
            uploading: AtomicBool::new(false),
            translating_summary: AtomicBool::new(false),
            translating: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        });
        Self::watch_identity(&dashboard);
        dashboard
    }

    fn watch_identity(dashboard: &Arc<Self>) {
        let view: Weak<Self> = Arc::downgrade(dashboard);
        let mut rx = dashboard.auth.subscribe();
        drop(rx.borrow_and_update());
        let shutdown = dashboard.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        drop(rx.borrow_and_update());
                        match view.upgrade() {
                            Some(dashboard) => dashboard.follow_identity(),
                            None => break,
                        }
                    }
                }
            }
            debug!("dashboard session watcher stopped");
        });
    }

    /// Hands the cached state to whoever is signed in now, clearing it when that
    /// is not the user it was cached for. The auth state is read under the owner
    /// lock, so concurrent callers settle on the latest identity.
    fn follow_identity(&self) {
        let mut owner = lock(&self.owner);
        let current = self.auth.session().user_id();
        if *owner != current {
            self.reset();
            *owner = current;
        }
    }

    /// Runs `apply` only while the cached state still belongs to `user_id`.
    fn for_owner<R>(&self, user_id: Uuid, apply: impl FnOnce() -> R) -> Result<R, WorkflowError> {
        let owner = lock(&self.owner);
        if *owner != Some(user_id) {
            debug!(user_id = %user_id, "signed-in user changed during the request");
            return Err(WorkflowError::Unauthenticated);
        }
        Ok(apply())
    }

    /// Drops every piece of ephemeral state. Callers hold the owner lock.
    fn reset(&self) {
        lock(&self.translations).clear();
        *lock(&self.aggregate) = AggregateView::default();
        lock(&self.profile).clear();
        debug!("dashboard state reset");
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // --- Session ---

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpData, WorkflowError> {
        let data = self.auth.sign_up(email, password).await?;
        self.follow_identity();
        Ok(data)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, WorkflowError> {
        let session = self.auth.sign_in(email, password).await?;
        self.follow_identity();
        Ok(session)
    }

    pub async fn restore(&self, access_token: &str) -> SessionState {
        let state = self.auth.restore(access_token).await;
        self.follow_identity();
        state
    }

    /// Signs out, clears the view and stops its watcher.
    pub async fn sign_out(&self) {
        self.auth.sign_out().await;
        self.follow_identity();
        self.shutdown.cancel();
    }

    /// The guard in front of everything below.
    pub async fn require_session(&self) -> Result<Session, WorkflowError> {
        let state = self.auth.current().await;
        self.follow_identity();
        match RouteGuard::check(&state) {
            Access::Granted(session) => Ok(session),
            Access::Denied => Err(WorkflowError::Unauthenticated),
        }
    }

    // --- Visits ---

    fn entries(&self, visits: Vec<Visit>) -> Vec<VisitEntry> {
        let cache = lock(&self.translations);
        visits
            .into_iter()
            .map(|visit| VisitEntry::new(visit, &cache))
            .collect()
    }

    pub async fn visits(&self) -> Result<Vec<VisitEntry>, WorkflowError> {
        let session = self.require_session().await?;
        let visits = visits::list_visits(&self.services, session.user_id).await;
        Ok(self.entries(visits))
    }

    pub async fn upload(
        &self,
        file: DocumentFile,
        form: VisitForm,
    ) -> Result<(VisitEntry, Vec<VisitEntry>), WorkflowError> {
        let session = self.require_session().await?;
        let _uploading = InFlight::acquire(&self.uploading, "Upload")?;
        let IngestOutcome { visit, visits } =
            ingestion::ingest_visit(&self.services, &session, file, form).await?;
        let entry = VisitEntry::new(visit, &lock(&self.translations));
        Ok((entry, self.entries(visits)))
    }

    pub async fn download(&self, visit_id: Uuid) -> Result<DocumentFile, WorkflowError> {
        let session = self.require_session().await?;
        visits::download_visit(&self.services, &session, visit_id).await
    }

    pub async fn delete(&self, visit_id: Uuid) -> Result<Vec<VisitEntry>, WorkflowError> {
        let session = self.require_session().await?;
        visits::delete_visit(&self.services, &session, visit_id).await?;
        lock(&self.translations).remove(visit_id);
        self.visits().await
    }

    pub async fn translate_visit(
        &self,
        visit_id: Uuid,
        language: &str,
    ) -> Result<VisitEntry, WorkflowError> {
        let session = self.require_session().await?;
        let _translating = Translating::acquire(&self.translating, visit_id)?;
        let text =
            visits::translate_visit(&self.services, session.user_id, visit_id, language).await?;
        self.for_owner(session.user_id, || {
            lock(&self.translations).insert(visit_id, language.trim(), text)
        })?;
        let visit = visits::find_visit(&self.services, session.user_id, visit_id).await?;
        Ok(VisitEntry::new(visit, &lock(&self.translations)))
    }

    pub async fn toggle_visit(&self, visit_id: Uuid) -> Result<VisitEntry, WorkflowError> {
        let session = self.require_session().await?;
        if lock(&self.translations).toggle(visit_id).is_none() {
            return Err(WorkflowError::Validation(
                "This visit has not been translated yet".to_string(),
            ));
        }
        let visit = visits::find_visit(&self.services, session.user_id, visit_id).await?;
        Ok(VisitEntry::new(visit, &lock(&self.translations)))
    }

    // --- Patient summary ---

    /// Recomputes the patient summary from every visit.
    pub async fn summary(&self) -> Result<AggregateView, WorkflowError> {
        let session = self.require_session().await?;
        let computed = summary::compose_aggregate(&self.services, session.user_id).await;
        self.for_owner(session.user_id, || {
            let mut view = lock(&self.aggregate);
            view.set_summary(computed);
            view.clone()
        })
    }

    pub async fn translate_summary(&self, language: &str) -> Result<AggregateView, WorkflowError> {
        let session = self.require_session().await?;
        let language = visits::require_language(language)?.to_string();
        let _translating = InFlight::acquire(&self.translating_summary, "Translation")?;

        let Some((revision, text)) = lock(&self.aggregate).translation_source() else {
            return Err(WorkflowError::Validation(
                "There is no summary to translate yet".to_string(),
            ));
        };

        let result = summary::translate_aggregate(&self.services, &text, &language).await;
        self.for_owner(session.user_id, || {
            let mut view = lock(&self.aggregate);
            match result {
                Ok(translated) => {
                    if view.apply_translation(revision, &language, translated) {
                        Ok(view.clone())
                    } else {
                        Err(WorkflowError::Conflict(
                            "The summary changed while it was being translated".to_string(),
                        ))
                    }
                }
                Err(e) => {
                    if view.revision == revision {
                        view.set_translation_failed();
                    }
                    Err(e)
                }
            }
        })?
    }

    pub async fn toggle_summary(&self) -> Result<AggregateView, WorkflowError> {
        self.require_session().await?;
        let mut view = lock(&self.aggregate);
        if !view.toggle() {
            return Err(WorkflowError::Validation(
                "The summary has not been translated yet".to_string(),
            ));
        }
        Ok(view.clone())
    }

    // --- Profile ---

    pub async fn profile(&self) -> Result<Profile, WorkflowError> {
        let session = self.require_session().await?;
        let ticket = lock(&self.profile).begin();
        let loaded = profile::load_profile(&self.services, session.user_id).await;
        let applied = self.for_owner(session.user_id, || {
            lock(&self.profile).apply(ticket, loaded.clone())
        })?;
        if !applied {
            debug!(user_id = %session.user_id, "discarding stale profile load");
        }
        Ok(loaded)
    }

    pub async fn save_profile(&self, update: ProfileUpdate) -> Result<Profile, WorkflowError> {
        let session = self.require_session().await?;
        let saved = profile::save_profile(&self.services, session.user_id, update).await?;
        self.for_owner(session.user_id, || lock(&self.profile).store(saved.clone()))?;
        Ok(saved)
    }

    pub async fn upload_avatar(&self, file: DocumentFile) -> Result<Profile, WorkflowError> {
        let session = self.require_session().await?;
        let saved = profile::upload_avatar(&self.services, &session, file).await?;
        self.for_owner(session.user_id, || lock(&self.profile).store(saved.clone()))?;
        Ok(saved)
    }

    /// The profile as last loaded or saved through this view.
    pub fn cached_profile(&self) -> Option<Profile> {
        lock(&self.profile).current().cloned()
    }

    // --- Everything ---

    pub async fn overview(&self) -> Result<Overview, WorkflowError> {
        let session = self.require_session().await?;
        let profile = self.profile().await?;
        let visits = self.visits().await?;
        let summary = self.summary().await?;
        Ok(Overview {
            session,
            profile,
            visits,
            summary,
        })
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
