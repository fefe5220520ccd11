//! crates/medi_core/src/testing.rs
//!
//! In-memory implementations of every port, for unit tests here and the
//! service's HTTP tests (through the `testing` feature).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::{NewVisit, Profile, Session, SignUpData, Visit};
use crate::ports::{
    AuthService, Buckets, DatabaseService, ObjectStorage, PortError, PortResult, Services,
    TextGenerationService,
};
use crate::prompts::EMPTY_AGGREGATE_PLACEHOLDER;

/// Ordered record of the calls made against the fakes sharing it.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

fn unexpected(what: &str) -> PortError {
    PortError::Unexpected(format!("{what} failed"))
}

//=========================================================================================
// Auth
//=========================================================================================

struct Account {
    user_id: Uuid,
    password: String,
}

pub struct InMemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, Session>>,
    refresh_tokens: Mutex<HashMap<String, Session>>,
    lifetime: Mutex<Duration>,
    issue_refresh_tokens: AtomicBool,
    require_confirmation: AtomicBool,
    last_email: Mutex<Option<String>>,
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuth {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            refresh_tokens: Mutex::new(HashMap::new()),
            lifetime: Mutex::new(Duration::hours(1)),
            issue_refresh_tokens: AtomicBool::new(true),
            require_confirmation: AtomicBool::new(false),
            last_email: Mutex::new(None),
        }
    }

    pub fn register(&self, email: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        user_id
    }

    pub fn set_lifetime(&self, lifetime: Duration) {
        *self.lifetime.lock().unwrap() = lifetime;
    }

    pub fn set_issue_refresh_tokens(&self, issue: bool) {
        self.issue_refresh_tokens.store(issue, Ordering::SeqCst);
    }

    /// Makes sign-up return no session, as when email confirmation is on.
    pub fn set_require_confirmation(&self, require: bool) {
        self.require_confirmation.store(require, Ordering::SeqCst);
    }

    pub fn last_email(&self) -> Option<String> {
        self.last_email.lock().unwrap().clone()
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    fn issue(&self, user_id: Uuid, email: &str) -> Session {
        let refresh_token = self
            .issue_refresh_tokens
            .load(Ordering::SeqCst)
            .then(|| Uuid::new_v4().to_string());
        let session = Session {
            user_id,
            email: email.to_string(),
            access_token: Uuid::new_v4().to_string(),
            refresh_token: refresh_token.clone(),
            expires_at: Some(Utc::now() + *self.lifetime.lock().unwrap()),
        };
        self.tokens
            .lock()
            .unwrap()
            .insert(session.access_token.clone(), session.clone());
        if let Some(token) = refresh_token {
            self.refresh_tokens
                .lock()
                .unwrap()
                .insert(token, session.clone());
        }
        session
    }
}

#[async_trait]
impl AuthService for InMemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<SignUpData> {
        *self.last_email.lock().unwrap() = Some(email.to_string());
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(PortError::Rejected("User already registered".to_string()));
        }
        let user_id = self.register(email, password);
        let session = if self.require_confirmation.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.issue(user_id, email))
        };
        Ok(SignUpData {
            user_id,
            email: email.to_string(),
            session,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session> {
        *self.last_email.lock().unwrap() = Some(email.to_string());
        let user_id = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some(account) if account.password == password => account.user_id,
                _ => return Err(PortError::Rejected("Invalid login credentials".to_string())),
            }
        };
        Ok(self.issue(user_id, email))
    }

    async fn sign_out(&self, session: &Session) -> PortResult<()> {
        self.tokens.lock().unwrap().remove(&session.access_token);
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<Session> {
        let previous = self
            .refresh_tokens
            .lock()
            .unwrap()
            .remove(refresh_token)
            .ok_or(PortError::Unauthorized)?;
        self.tokens.lock().unwrap().remove(&previous.access_token);
        Ok(self.issue(previous.user_id, &previous.email))
    }

    /// Like the hosted service, a bare access token yields no refresh token.
    async fn session_for_token(&self, access_token: &str) -> PortResult<Session> {
        let session = self
            .tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(PortError::Unauthorized)?;
        Ok(Session {
            refresh_token: None,
            ..session
        })
    }
}

//=========================================================================================
// Rows
//=========================================================================================

#[derive(Default)]
pub struct InMemoryDatabase {
    profiles: Mutex<HashMap<Uuid, Profile>>,
    visits: Mutex<Vec<Visit>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    log: CallLog,
}

impl InMemoryDatabase {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn visits(&self) -> Vec<Visit> {
        self.visits.lock().unwrap().clone()
    }

    pub fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.profiles.lock().unwrap().get(&user_id).cloned()
    }

    /// Seeds a row directly, bypassing the workflows.
    pub fn seed_visit(&self, visit: Visit) {
        self.visits.lock().unwrap().push(visit);
    }

    fn read(&self, what: &str) -> PortResult<()> {
        self.log.push(format!("db.{what}"));
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unexpected(what));
        }
        Ok(())
    }

    fn write(&self, what: &str) -> PortResult<()> {
        self.log.push(format!("db.{what}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unexpected(what));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        self.read("get_profile")?;
        Ok(self.profile(user_id))
    }

    async fn upsert_profile(&self, profile: &Profile) -> PortResult<Profile> {
        self.write("upsert_profile")?;
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn list_visits(&self, user_id: Uuid) -> PortResult<Vec<Visit>> {
        self.read("list_visits")?;
        let mut visits: Vec<Visit> = self
            .visits()
            .into_iter()
            .filter(|v| v.user_id == user_id)
            .collect();
        visits.sort_by(|a, b| b.visit_date.cmp(&a.visit_date));
        Ok(visits)
    }

    async fn list_visit_summaries(&self, user_id: Uuid) -> PortResult<Vec<Option<String>>> {
        self.read("list_visit_summaries")?;
        Ok(self
            .visits()
            .into_iter()
            .filter(|v| v.user_id == user_id)
            .map(|v| v.summary)
            .collect())
    }

    async fn get_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<Visit> {
        self.read("get_visit")?;
        self.visits()
            .into_iter()
            .find(|v| v.id == visit_id && v.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Visit {visit_id} not found")))
    }

    async fn insert_visit(&self, visit: NewVisit) -> PortResult<Visit> {
        self.write("insert_visit")?;
        let stored = Visit {
            id: Uuid::new_v4(),
            user_id: visit.user_id,
            document_url: visit.document_url,
            clinic_name: visit.clinic_name,
            type_of_visit: visit.type_of_visit,
            summary: visit.summary,
            visit_date: visit.visit_date,
        };
        self.visits.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn delete_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<()> {
        self.write("delete_visit")?;
        self.visits
            .lock()
            .unwrap()
            .retain(|v| !(v.id == visit_id && v.user_id == user_id));
        Ok(())
    }
}

//=========================================================================================
// Storage
//=========================================================================================

#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    content_types: Mutex<HashMap<(String, String), String>>,
    fail_upload: AtomicBool,
    fail_download: AtomicBool,
    fail_remove: AtomicBool,
    log: CallLog,
}

impl InMemoryStorage {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.fail_upload.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_download(&self, fail: bool) {
        self.fail_download.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Seeds an object directly, bypassing the call log.
    pub fn put(&self, bucket: &str, path: &str, bytes: Bytes) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), bytes);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// The content type the object was last uploaded with.
    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.content_types
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload(
        &self,
        _session: &Session,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> PortResult<()> {
        self.log.push(format!("storage.upload {bucket}/{path}"));
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(unexpected("upload"));
        }
        let key = (bucket.to_string(), path.to_string());
        let mut content_types = self.content_types.lock().unwrap();
        match content_type {
            Some(content_type) => content_types.insert(key.clone(), content_type.to_string()),
            None => content_types.remove(&key),
        };
        self.objects.lock().unwrap().insert(key, bytes);
        Ok(())
    }

    async fn download(&self, _session: &Session, bucket: &str, path: &str) -> PortResult<Bytes> {
        self.log.push(format!("storage.download {bucket}/{path}"));
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(unexpected("download"));
        }
        self.get(bucket, path)
            .ok_or_else(|| PortError::NotFound(format!("Object {bucket}/{path} not found")))
    }

    async fn remove(&self, _session: &Session, bucket: &str, path: &str) -> PortResult<()> {
        self.log.push(format!("storage.remove {bucket}/{path}"));
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(unexpected("remove"));
        }
        let key = (bucket.to_string(), path.to_string());
        self.content_types.lock().unwrap().remove(&key);
        self.objects.lock().unwrap().remove(&key);
        Ok(())
    }
}

//=========================================================================================
// Text generation
//=========================================================================================

/// A generator that honours the prompt contracts without a model:
/// translations are prefixed with the language, an empty aggregate yields the
/// placeholder sentence.
#[derive(Default)]
pub struct ScriptedGenerator {
    fail: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Holds every following call until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn respond(prompt: &str) -> String {
        if let Some(rest) = prompt.strip_prefix("Translate the following medical summary to ") {
            let language = rest.split('.').next().unwrap_or_default();
            let text = prompt.rsplit("\n\n").next().unwrap_or_default();
            return format!("({language}) {text}");
        }
        if prompt.starts_with("Given the following summaries") {
            let summaries = prompt.split("\n\n").nth(1).unwrap_or_default().trim();
            if summaries.is_empty() || summaries.starts_with("Please provide") {
                return EMPTY_AGGREGATE_PLACEHOLDER.to_string();
            }
            return format!("Patient history: {}", summaries.replace('\n', " "));
        }
        let title = prompt
            .split("document title: ")
            .nth(1)
            .and_then(|rest| rest.split(".\n").next())
            .unwrap_or_default();
        format!("Visit regarding {title}.")
    }
}

#[async_trait]
impl TextGenerationService for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(unexpected("generate"));
        }
        Ok(Self::respond(prompt))
    }
}

//=========================================================================================
// Bundle
//=========================================================================================

/// All fakes wired together, sharing one call log.
pub struct Backend {
    pub auth: Arc<InMemoryAuth>,
    pub db: Arc<InMemoryDatabase>,
    pub storage: Arc<InMemoryStorage>,
    pub llm: Arc<ScriptedGenerator>,
    pub log: CallLog,
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend {
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            auth: Arc::new(InMemoryAuth::new()),
            db: Arc::new(InMemoryDatabase::with_log(log.clone())),
            storage: Arc::new(InMemoryStorage::with_log(log.clone())),
            llm: Arc::new(ScriptedGenerator::default()),
            log,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            auth: self.auth.clone(),
            db: self.db.clone(),
            storage: self.storage.clone(),
            llm: self.llm.clone(),
            buckets: Buckets::default(),
        }
    }

    /// A signed-in session for a freshly registered user.
    pub async fn signed_in(&self, email: &str) -> Session {
        self.auth.register(email, "password");
        self.auth
            .sign_in(email, "password")
            .await
            .expect("registered user can sign in")
    }
}
