//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It reads and writes the
//! hosted backend's `profiles` and `visits` tables with `sqlx`. Every visit query
//! is scoped by `user_id`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use medi_core::domain::{NewVisit, Profile, Visit};
use medi_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PROFILE_COLUMNS: &str = "id, name, birthday, height, weight, country, avatar_url, updated_at";
const VISIT_COLUMNS: &str =
    "id, user_id, document_url, clinic_name, type_of_visit, summary, visit_date";

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    name: Option<String>,
    birthday: Option<NaiveDate>,
    height: Option<f64>,
    weight: Option<f64>,
    country: Option<String>,
    avatar_url: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            name: self.name,
            birthday: self.birthday,
            height: self.height,
            weight: self.weight,
            country: self.country,
            avatar_url: self.avatar_url,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct VisitRecord {
    id: Uuid,
    user_id: Uuid,
    document_url: Option<String>,
    clinic_name: Option<String>,
    type_of_visit: Option<String>,
    summary: Option<String>,
    visit_date: Option<DateTime<Utc>>,
}
impl VisitRecord {
    /// Rows written outside this service may leave columns empty.
    fn to_domain(self) -> Visit {
        Visit {
            id: self.id,
            user_id: self.user_id,
            document_url: self.document_url.unwrap_or_default(),
            clinic_name: self.clinic_name.unwrap_or_default(),
            type_of_visit: self.type_of_visit.unwrap_or_default(),
            summary: self.summary,
            visit_date: self.visit_date.unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    summary: Option<String>,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn upsert_profile(&self, profile: &Profile) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO profiles ({PROFILE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                birthday = EXCLUDED.birthday,
                height = EXCLUDED.height,
                weight = EXCLUDED.weight,
                country = EXCLUDED.country,
                avatar_url = EXCLUDED.avatar_url,
                updated_at = EXCLUDED.updated_at
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.id)
        .bind(&profile.name)
        .bind(profile.birthday)
        .bind(profile.height)
        .bind(profile.weight)
        .bind(&profile.country)
        .bind(&profile.avatar_url)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn list_visits(&self, user_id: Uuid) -> PortResult<Vec<Visit>> {
        let records = sqlx::query_as::<_, VisitRecord>(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = $1 ORDER BY visit_date DESC NULLS LAST"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_visit_summaries(&self, user_id: Uuid) -> PortResult<Vec<Option<String>>> {
        let records = sqlx::query_as::<_, SummaryRecord>(
            "SELECT summary FROM visits WHERE user_id = $1 ORDER BY visit_date ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.summary).collect())
    }

    async fn get_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<Visit> {
        let record = sqlx::query_as::<_, VisitRecord>(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1 AND user_id = $2"
        ))
        .bind(visit_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Visit {} not found", visit_id)),
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn insert_visit(&self, visit: NewVisit) -> PortResult<Visit> {
        let record = sqlx::query_as::<_, VisitRecord>(&format!(
            "INSERT INTO visits (id, user_id, document_url, clinic_name, type_of_visit, summary, visit_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {VISIT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(visit.user_id)
        .bind(visit.document_url)
        .bind(visit.clinic_name)
        .bind(visit.type_of_visit)
        .bind(visit.summary)
        .bind(visit.visit_date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.to_domain())
    }

    async fn delete_visit(&self, user_id: Uuid, visit_id: Uuid) -> PortResult<()> {
        // A row that is already gone counts as deleted.
        sqlx::query("DELETE FROM visits WHERE id = $1 AND user_id = $2")
            .bind(visit_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
