//! Repository for availability templates and their date-range assignments

use crate::error::DbError;
use crate::DbClient;
use bookify_common::models::{AvailabilityTemplate, TemplateAssignment, TimeSlot};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbAvailabilityTemplate {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTemplateSlot {
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

impl From<DbTemplateSlot> for TimeSlot {
    fn from(db: DbTemplateSlot) -> Self {
        Self {
            day_of_week: u8::try_from(db.day_of_week).unwrap_or(u8::MAX),
            start_time: db.start_time,
            end_time: db.end_time,
            enabled: db.enabled,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTemplateAssignment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub template_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<DbTemplateAssignment> for TemplateAssignment {
    fn from(db: DbTemplateAssignment) -> Self {
        Self {
            id: db.id,
            provider_id: db.provider_id,
            template_id: db.template_id,
            start_date: db.start_date,
            end_date: db.end_date,
            created_at: db.created_at,
        }
    }
}

/// Repository for availability templates
pub trait TemplateRepository {
    /// Stores a template with its slots. A default template replaces the previous default.
    fn create_template(
        &self,
        template: AvailabilityTemplate,
    ) -> impl std::future::Future<Output = Result<AvailabilityTemplate, DbError>> + Send;

    /// Replaces the weekly slots of a template owned by `provider_id`.
    fn replace_slots(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
        slots: Vec<TimeSlot>,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    fn set_default_template(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    fn find_template(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AvailabilityTemplate>, DbError>> + Send;

    fn find_default_template(
        &self,
        provider_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AvailabilityTemplate>, DbError>> + Send;

    fn create_assignment(
        &self,
        assignment: TemplateAssignment,
    ) -> impl std::future::Future<Output = Result<TemplateAssignment, DbError>> + Send;

    /// Assignments covering `date`, most recently created first.
    fn find_assignments_covering(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<TemplateAssignment>, DbError>> + Send;
}

/// SQL implementation of the template repository
#[derive(Debug, Clone)]
pub struct SqlTemplateRepository {
    db_client: DbClient,
}

impl SqlTemplateRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    async fn load_slots(
        conn: &mut SqliteConnection,
        template_id: Uuid,
    ) -> Result<Vec<TimeSlot>, DbError> {
        let rows = sqlx::query_as::<_, DbTemplateSlot>(
            r#"
            SELECT day_of_week, start_time, end_time, enabled FROM template_slots
            WHERE template_id = $1 ORDER BY position
            "#,
        )
        .bind(template_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::query("load template slots", e))?;

        Ok(rows.into_iter().map(TimeSlot::from).collect())
    }

    async fn write_slots(
        conn: &mut SqliteConnection,
        template_id: Uuid,
        slots: &[TimeSlot],
    ) -> Result<(), DbError> {
        for (position, slot) in slots.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO template_slots (template_id, position, day_of_week, start_time,
                                            end_time, enabled)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(template_id)
            .bind(position as i64)
            .bind(i64::from(slot.day_of_week))
            .bind(&slot.start_time)
            .bind(&slot.end_time)
            .bind(slot.enabled)
            .execute(&mut *conn)
            .await
            .map_err(|e| DbError::query("insert template slot", e))?;
        }
        Ok(())
    }

    async fn hydrate(
        &self,
        row: Option<DbAvailabilityTemplate>,
    ) -> Result<Option<AvailabilityTemplate>, DbError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut conn = self
            .db_client
            .pool()
            .acquire()
            .await
            .map_err(|e| DbError::PoolError(e.to_string()))?;
        let slots = Self::load_slots(&mut conn, row.id).await?;

        Ok(Some(AvailabilityTemplate {
            id: row.id,
            provider_id: row.provider_id,
            name: row.name,
            is_default: row.is_default,
            slots,
            created_at: row.created_at,
        }))
    }
}

fn validate_slots(slots: &[TimeSlot]) -> Result<(), DbError> {
    match slots.iter().find(|slot| !slot.is_valid()) {
        Some(slot) => Err(DbError::InvalidData(format!(
            "invalid slot: day {} {}-{}",
            slot.day_of_week, slot.start_time, slot.end_time
        ))),
        None => Ok(()),
    }
}

impl TemplateRepository for SqlTemplateRepository {
    async fn create_template(
        &self,
        template: AvailabilityTemplate,
    ) -> Result<AvailabilityTemplate, DbError> {
        validate_slots(&template.slots)?;
        debug!(
            "Creating template {} with {} slots for provider {}",
            template.id,
            template.slots.len(),
            template.provider_id
        );

        let mut tx = self.db_client.begin().await?;
        if template.is_default {
            sqlx::query("UPDATE availability_templates SET is_default = 0 WHERE provider_id = $1")
                .bind(template.provider_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::query("clear default template", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO availability_templates (id, provider_id, name, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(template.id)
        .bind(template.provider_id)
        .bind(&template.name)
        .bind(template.is_default)
        .bind(template.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("insert template", e))?;

        Self::write_slots(&mut tx, template.id, &template.slots).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;

        info!("Template {} created", template.id);
        Ok(template)
    }

    async fn replace_slots(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
        slots: Vec<TimeSlot>,
    ) -> Result<bool, DbError> {
        validate_slots(&slots)?;

        let mut tx = self.db_client.begin().await?;
        let owned: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM availability_templates WHERE id = $1 AND provider_id = $2",
        )
        .bind(template_id)
        .bind(provider_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DbError::query("find template", e))?;
        if owned.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM template_slots WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query("clear template slots", e))?;
        Self::write_slots(&mut tx, template_id, &slots).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;
        Ok(true)
    }

    async fn set_default_template(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
    ) -> Result<bool, DbError> {
        let mut tx = self.db_client.begin().await?;

        sqlx::query("UPDATE availability_templates SET is_default = 0 WHERE provider_id = $1")
            .bind(provider_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query("clear default template", e))?;

        let result = sqlx::query(
            "UPDATE availability_templates SET is_default = 1 WHERE id = $1 AND provider_id = $2",
        )
        .bind(template_id)
        .bind(provider_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("set default template", e))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| DbError::TransactionError(e.to_string()))?;
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;
        Ok(true)
    }

    async fn find_template(
        &self,
        provider_id: Uuid,
        template_id: Uuid,
    ) -> Result<Option<AvailabilityTemplate>, DbError> {
        let row = sqlx::query_as::<_, DbAvailabilityTemplate>(
            "SELECT * FROM availability_templates WHERE id = $1 AND provider_id = $2",
        )
        .bind(template_id)
        .bind(provider_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find template", e))?;

        self.hydrate(row).await
    }

    async fn find_default_template(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<AvailabilityTemplate>, DbError> {
        let row = sqlx::query_as::<_, DbAvailabilityTemplate>(
            "SELECT * FROM availability_templates WHERE provider_id = $1 AND is_default = 1",
        )
        .bind(provider_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find default template", e))?;

        self.hydrate(row).await
    }

    async fn create_assignment(
        &self,
        assignment: TemplateAssignment,
    ) -> Result<TemplateAssignment, DbError> {
        if let Some(end_date) = assignment.end_date {
            if end_date < assignment.start_date {
                return Err(DbError::InvalidData(format!(
                    "assignment ends {} before it starts {}",
                    end_date, assignment.start_date
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO template_assignments (id, provider_id, template_id, start_date,
                                              end_date, created_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM availability_templates WHERE id = $3 AND provider_id = $2)
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.provider_id)
        .bind(assignment.template_id)
        .bind(assignment.start_date)
        .bind(assignment.end_date)
        .bind(assignment.created_at)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("insert template assignment", e))
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(DbError::ConstraintViolation(format!(
                    "template {} does not belong to provider {}",
                    assignment.template_id, assignment.provider_id
                )))
            } else {
                Ok(())
            }
        })?;

        Ok(assignment)
    }

    async fn find_assignments_covering(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TemplateAssignment>, DbError> {
        let rows = sqlx::query_as::<_, DbTemplateAssignment>(
            r#"
            SELECT * FROM template_assignments
            WHERE provider_id = $1 AND start_date <= $2 AND (end_date IS NULL OR end_date >= $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(provider_id)
        .bind(date)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find covering assignments", e))?;

        Ok(rows.into_iter().map(TemplateAssignment::from).collect())
    }
}
