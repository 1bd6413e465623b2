// --- File: crates/bookify_availability/src/templates.rs ---

//! Which weekly template applies on a date, and what it opens.
//!
//! Overlapping assignments resolve to the most recently created one; ties on `created_at`
//! go to the larger id so the choice never depends on row order.

use bookify_common::models::{day_of_week, AvailabilityTemplate, TemplateAssignment, TimeSlot};
use bookify_db::repositories::{
    ProviderRepository, SqlProviderRepository, SqlTemplateRepository, TemplateRepository,
};
use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AvailabilityError;

/// The assignment that governs `date`, if any.
pub fn effective_assignment(
    assignments: &[TemplateAssignment],
    date: NaiveDate,
) -> Option<&TemplateAssignment> {
    assignments
        .iter()
        .filter(|a| a.covers(date))
        .max_by_key(|a| (a.created_at, a.id))
}

/// Enabled, well-formed slots of `template` for the weekday of `date`.
pub fn get_effective_availability_for_date(
    template: &AvailabilityTemplate,
    date: NaiveDate,
) -> Vec<TimeSlot> {
    let weekday = day_of_week(date);
    template
        .slots
        .iter()
        .filter(|slot| slot.enabled && slot.day_of_week == weekday)
        .filter(|slot| {
            let valid = slot.bounds().is_some();
            if !valid {
                warn!(
                    template_id = %template.id,
                    "Skipping malformed slot {}-{}",
                    slot.start_time,
                    slot.end_time
                );
            }
            valid
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: SqlTemplateRepository,
    providers: SqlProviderRepository,
}

impl TemplateEngine {
    pub fn new(templates: SqlTemplateRepository, providers: SqlProviderRepository) -> Self {
        Self {
            templates,
            providers,
        }
    }

    /// Latest covering assignment, else the provider's default, else `None` (closed).
    pub async fn get_effective_template_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityTemplate>, AvailabilityError> {
        let assignments = self
            .templates
            .find_assignments_covering(provider_id, date)
            .await?;

        if let Some(assignment) = effective_assignment(&assignments, date) {
            if let Some(template) = self
                .templates
                .find_template(provider_id, assignment.template_id)
                .await?
            {
                debug!(
                    provider_id = %provider_id,
                    "Template {} assigned for {}",
                    template.name,
                    date
                );
                return Ok(Some(template));
            }
            warn!(
                provider_id = %provider_id,
                "Assignment {} points at a missing template",
                assignment.id
            );
        }

        Ok(self.templates.find_default_template(provider_id).await?)
    }

    /// Opening windows of a provider location on `date`, in minutes since local midnight.
    pub async fn location_windows_for_date(
        &self,
        provider_id: Uuid,
        location_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<(u32, u32)>, AvailabilityError> {
        let schedules = self
            .providers
            .find_location_schedules(provider_id, location_id)
            .await?
            .ok_or_else(|| {
                AvailabilityError::InvalidInput(format!("unknown location {}", location_id))
            })?;

        Ok(schedules
            .iter()
            .filter(|s| s.applies_to(date))
            .filter_map(|s| s.bounds())
            .collect())
    }
}
