//! Batch mutation with per-target outcomes.
//!
//! A bulk operation is a batch of independent single-item operations, not a
//! transaction: failures are collected per target and never roll back the
//! targets that already succeeded. Only a malformed request as a whole (empty
//! target set, empty change set) is rejected up front.

use db::models::instructor_rate::ActivityType;
use db::models::meeting::MeetingStatus;
use db::models::registration::{PaymentStatus, RegistrationStatus};
use db::models::meeting;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::info;

use crate::audit::Operator;
use crate::error::{ServiceError, ServiceResult};
use crate::meetings::{MeetingService, MeetingUpdate};
use crate::registrations::{PaymentUpdate, RegistrationLedger};

/// Sparse change set for a batch of meetings; only enabled fields apply.
#[derive(Debug, Clone, Default)]
pub struct MeetingChangeSet {
    pub status: Option<MeetingStatus>,
    pub activity_type: Option<ActivityType>,
    pub instructor_id: Option<i64>,
    pub topic: Option<String>,
    pub notes: Option<String>,
    /// Opt-in re-stamp from the current rate table; the only path that
    /// rewrites historical financial snapshots.
    pub recalculate_financials: bool,
}

impl MeetingChangeSet {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.activity_type.is_none()
            && self.instructor_id.is_none()
            && self.topic.is_none()
            && self.notes.is_none()
            && !self.recalculate_financials
    }

    fn field_update(&self) -> MeetingUpdate {
        MeetingUpdate {
            activity_type: self.activity_type,
            instructor_id: self.instructor_id,
            topic: self.topic.clone(),
            notes: self.notes.clone(),
            ..Default::default()
        }
    }
}

/// Sparse change set for a batch of registrations.
#[derive(Debug, Clone, Default)]
pub struct RegistrationChangeSet {
    pub status: Option<RegistrationStatus>,
    pub amount_owed: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl RegistrationChangeSet {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.amount_owed.is_none()
            && self.payment_status.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }

    fn payment_update(&self) -> PaymentUpdate {
        PaymentUpdate {
            amount_owed: self.amount_owed,
            payment_status: self.payment_status,
            payment_method: self.payment_method.clone(),
            notes: self.notes.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Applied,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BulkItemResult {
    pub target_id: i64,
    pub outcome: BulkOutcome,
}

/// One tagged outcome per target, in request order.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub results: Vec<BulkItemResult>,
}

impl BulkReport {
    fn push(&mut self, target_id: i64, result: ServiceResult<()>) {
        let outcome = match result {
            Ok(()) => BulkOutcome::Applied,
            Err(err) => BulkOutcome::Failed(err.to_string()),
        };
        self.results.push(BulkItemResult { target_id, outcome });
    }

    pub fn applied(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == BulkOutcome::Applied)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.applied()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.results
            .iter()
            .filter(|r| !matches!(r.outcome, BulkOutcome::Applied))
    }
}

#[derive(Clone)]
pub struct BulkCoordinator {
    db: DatabaseConnection,
    meetings: MeetingService,
    registrations: RegistrationLedger,
}

impl BulkCoordinator {
    pub fn new(
        db: DatabaseConnection,
        meetings: MeetingService,
        registrations: RegistrationLedger,
    ) -> Self {
        Self {
            db,
            meetings,
            registrations,
        }
    }

    /// Apply one change set to every meeting in `targets`, independently.
    ///
    /// The batch is scoped to one cycle, mirroring the operator selecting
    /// meetings on a cycle's ledger; a target from another cycle fails on its
    /// own without affecting the rest.
    pub async fn update_meetings(
        &self,
        operator: &Operator,
        cycle_id: i64,
        targets: &[i64],
        change: MeetingChangeSet,
    ) -> ServiceResult<BulkReport> {
        if targets.is_empty() {
            return Err(ServiceError::Validation("bulk target set is empty".into()));
        }
        if change.is_empty() {
            return Err(ServiceError::Validation("bulk change set is empty".into()));
        }

        let field_update = change.field_update();
        let mut report = BulkReport::default();
        for &meeting_id in targets {
            let result = self
                .apply_meeting_change(operator, cycle_id, meeting_id, &change, &field_update)
                .await;
            report.push(meeting_id, result);
        }

        info!(
            cycle_id,
            targets = targets.len(),
            applied = report.applied(),
            failed = report.failed(),
            "bulk meeting update"
        );
        Ok(report)
    }

    async fn apply_meeting_change(
        &self,
        operator: &Operator,
        cycle_id: i64,
        meeting_id: i64,
        change: &MeetingChangeSet,
        field_update: &MeetingUpdate,
    ) -> ServiceResult<()> {
        let target = meeting::Entity::find_by_id(meeting_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("meeting {} not found", meeting_id))
            })?;
        if target.cycle_id != cycle_id {
            return Err(ServiceError::Validation(format!(
                "meeting {} belongs to cycle {}, not to cycle {}",
                meeting_id, target.cycle_id, cycle_id
            )));
        }

        if !field_update.is_empty() {
            self.meetings
                .update_meeting(operator, meeting_id, field_update.clone())
                .await?;
        }
        if let Some(status) = change.status {
            self.meetings.transition(operator, meeting_id, status).await?;
        }
        if change.recalculate_financials {
            self.meetings
                .recalculate_financials(operator, meeting_id)
                .await?;
        }
        Ok(())
    }

    /// Apply one change set to every registration in `targets`, independently.
    pub async fn update_registrations(
        &self,
        operator: &Operator,
        targets: &[i64],
        change: RegistrationChangeSet,
    ) -> ServiceResult<BulkReport> {
        if targets.is_empty() {
            return Err(ServiceError::Validation("bulk target set is empty".into()));
        }
        if change.is_empty() {
            return Err(ServiceError::Validation("bulk change set is empty".into()));
        }

        let payment_update = change.payment_update();
        let mut report = BulkReport::default();
        for &registration_id in targets {
            let result = self
                .apply_registration_change(operator, registration_id, &change, &payment_update)
                .await;
            report.push(registration_id, result);
        }

        info!(
            targets = targets.len(),
            applied = report.applied(),
            failed = report.failed(),
            "bulk registration update"
        );
        Ok(report)
    }

    async fn apply_registration_change(
        &self,
        operator: &Operator,
        registration_id: i64,
        change: &RegistrationChangeSet,
        payment_update: &PaymentUpdate,
    ) -> ServiceResult<()> {
        if !payment_update.is_empty() {
            self.registrations
                .update_payment(operator, registration_id, payment_update.clone())
                .await?;
        }
        if let Some(status) = change.status {
            self.registrations
                .update_status(operator, registration_id, status)
                .await?;
        }
        Ok(())
    }
}
