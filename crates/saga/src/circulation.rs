//! Checkout and return sagas.
//!
//! A checkout runs `Validating → Reserving → Recording → Published`:
//! 1. The member must be active with no unpaid fines
//! 2. One copy is taken off the item with a compare-and-set
//! 3. A new checkout stream is created and its record written
//!
//! A return looks up the active checkout, puts the copy back and closes the
//! checkout. When a step fails, the compensations bound to earlier steps run
//! in reverse and the run ends in `Failed`.

use std::future::Future;
use std::time::Instant;

use common::{AggregateId, MemberId};
use domain::{
    CheckOutItem, Checkout, CirculationService, ExecuteOptions, ReturnCheckout, SAGA_ID_KEY,
    VoidCheckout,
};
use event_store::{EventStore, Version};
use projections::{CheckoutRecord, CheckoutRecordStore};
use uuid::Uuid;

use crate::capability::{InventoryCapability, MembershipCapability};
use crate::compensation::{Compensation, CompensationOutcome};
use crate::config::SagaConfig;
use crate::deadline::Deadline;
use crate::error::{FailureKind, Result, SagaError};
use crate::run::{SagaKind, SagaReport, SagaRun};
use crate::state::SagaState;

/// Attempts made by an inventory restore that keeps losing the
/// compare-and-set to concurrent writers.
const RESTORE_ATTEMPTS: u32 = 3;

/// Runs `fut` under `deadline`, flattening the timeout into the step error.
/// Nothing is started once the deadline has passed.
async fn step<T, E>(
    deadline: &Deadline,
    state: SagaState,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    SagaError: From<E>,
{
    if deadline.is_expired() {
        return Err(SagaError::DeadlineExceeded { step: state });
    }
    Ok(deadline.run(state, fut).await??)
}

/// Orchestrates checkouts and returns across membership, inventory and the
/// checkout log.
///
/// The saga owns the checkout aggregate and its records. Members and items
/// are reached only through their capabilities.
pub struct CirculationSaga<S, R, I, M>
where
    S: EventStore,
    R: CheckoutRecordStore,
    I: InventoryCapability,
    M: MembershipCapability,
{
    circulation: CirculationService<S>,
    records: R,
    inventory: I,
    membership: M,
    config: SagaConfig,
}

impl<S, R, I, M> CirculationSaga<S, R, I, M>
where
    S: EventStore,
    R: CheckoutRecordStore,
    I: InventoryCapability,
    M: MembershipCapability,
{
    pub fn new(store: S, records: R, inventory: I, membership: M, config: SagaConfig) -> Self {
        Self {
            circulation: CirculationService::new(store),
            records,
            inventory,
            membership,
            config,
        }
    }

    pub fn circulation(&self) -> &CirculationService<S> {
        &self.circulation
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn membership(&self) -> &M {
        &self.membership
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Checks an item out to a member and returns the new checkout record.
    pub async fn checkout(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: Deadline,
    ) -> Result<CheckoutRecord> {
        self.checkout_with_report(member_id, item_id, deadline)
            .await
            .outcome
    }

    /// Like [`checkout`](Self::checkout), but reports every state and
    /// compensation of the run.
    #[tracing::instrument(skip(self, deadline), fields(saga_id = tracing::field::Empty))]
    pub async fn checkout_with_report(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: Deadline,
    ) -> SagaReport<CheckoutRecord> {
        let mut run = self.start(SagaKind::Checkout);
        let started = Instant::now();
        let outcome = self
            .checkout_steps(&mut run, member_id, item_id, &deadline)
            .await;
        self.finish(run, started, outcome).await
    }

    /// Returns a member's checked-out item and returns the closed record.
    pub async fn return_item(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: Deadline,
    ) -> Result<CheckoutRecord> {
        self.return_with_report(member_id, item_id, deadline)
            .await
            .outcome
    }

    /// Like [`return_item`](Self::return_item), but reports every state and
    /// compensation of the run.
    #[tracing::instrument(skip(self, deadline), fields(saga_id = tracing::field::Empty))]
    pub async fn return_with_report(
        &self,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: Deadline,
    ) -> SagaReport<CheckoutRecord> {
        let mut run = self.start(SagaKind::Return);
        let started = Instant::now();
        let outcome = self
            .return_steps(&mut run, member_id, item_id, &deadline)
            .await;
        self.finish(run, started, outcome).await
    }

    /// Loads a checkout record, falling back to the checkout stream when the
    /// record has not been written yet.
    #[tracing::instrument(skip(self))]
    pub async fn get_checkout(&self, checkout_id: AggregateId) -> Result<Option<CheckoutRecord>> {
        if let Some(record) = self.records.get_checkout_record(checkout_id).await? {
            return Ok(Some(record));
        }
        Ok(self
            .circulation
            .get_checkout(checkout_id)
            .await?
            .as_ref()
            .and_then(CheckoutRecord::from_aggregate))
    }

    fn start(&self, kind: SagaKind) -> SagaRun {
        let run = SagaRun::new(kind);
        tracing::Span::current().record("saga_id", tracing::field::display(run.saga_id()));
        metrics::counter!("saga_started_total", "kind" => kind.as_str()).increment(1);
        tracing::info!(saga_id = %run.saga_id(), kind = kind.as_str(), "saga started");
        run
    }

    async fn checkout_steps(
        &self,
        run: &mut SagaRun,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: &Deadline,
    ) -> Result<CheckoutRecord> {
        let saga_id = run.saga_id();

        let member = step(
            deadline,
            SagaState::Validating,
            self.membership.get_member(member_id),
        )
        .await?;
        if !member.can_borrow() {
            return Err(SagaError::ValidationFailed(format!(
                "member {member_id} may not borrow (status {:?}, fine balance {:.2})",
                member.status, member.fine_balance
            )));
        }

        run.advance(SagaState::Reserving)?;
        let item = step(
            deadline,
            SagaState::Reserving,
            self.inventory.get_item(item_id),
        )
        .await?;
        if item.available == 0 {
            return Err(SagaError::ValidationFailed(format!(
                "no copies of item {item_id} available"
            )));
        }
        self.adjust_inventory(
            run,
            deadline,
            item_id,
            item.total_copies,
            item.available,
            item.available - 1,
            item.version,
            format!("{saga_id}:reserve"),
        )
        .await?;

        run.advance(SagaState::Recording)?;
        let cmd = CheckOutItem::new(member_id, item_id, self.config.loan_period);
        let checkout_id = cmd.checkout_id;
        let void = Compensation::VoidCheckout {
            checkout_id,
            reason: format!("checkout saga {saga_id} failed"),
        };

        let appended = step(
            deadline,
            SagaState::Recording,
            self.circulation.check_out(cmd, saga_options(saga_id)),
        )
        .await;
        let checkout = match appended {
            Ok(result) => result.aggregate,
            Err(error) => {
                if error.outcome_unknown() {
                    run.push_compensation(void);
                }
                return Err(error);
            }
        };
        run.push_compensation(void);

        let record = step(
            deadline,
            SagaState::Recording,
            self.write_record(&checkout),
        )
        .await?;

        run.advance(SagaState::Published)?;
        Ok(record)
    }

    async fn return_steps(
        &self,
        run: &mut SagaRun,
        member_id: MemberId,
        item_id: AggregateId,
        deadline: &Deadline,
    ) -> Result<CheckoutRecord> {
        let saga_id = run.saga_id();

        let active = step(
            deadline,
            SagaState::Validating,
            self.records.find_active_checkout(member_id, item_id),
        )
        .await?
        .ok_or_else(|| {
            SagaError::NotFound(format!(
                "no active checkout of item {item_id} for member {member_id}"
            ))
        })?;

        run.advance(SagaState::Reserving)?;
        let item = step(
            deadline,
            SagaState::Reserving,
            self.inventory.get_item(item_id),
        )
        .await?;
        if item.available >= item.total_copies {
            return Err(SagaError::ValidationFailed(format!(
                "every copy of item {item_id} is already available"
            )));
        }
        self.adjust_inventory(
            run,
            deadline,
            item_id,
            item.total_copies,
            item.available,
            item.available + 1,
            item.version,
            format!("{saga_id}:release"),
        )
        .await?;

        run.advance(SagaState::Recording)?;
        let returned = step(
            deadline,
            SagaState::Recording,
            self.circulation.return_item(
                ReturnCheckout::new(active.checkout_id),
                saga_options(saga_id),
            ),
        )
        .await?;

        let record = CheckoutRecord::from_aggregate(&returned.aggregate).ok_or_else(|| {
            SagaError::NotFound(format!("checkout {} has no record", active.checkout_id))
        })?;
        // The return is committed; the checkout projector fixes a missed row.
        if let Err(error) = self.records.upsert_checkout_record(&record).await {
            tracing::warn!(%saga_id, checkout_id = %record.checkout_id, %error, "checkout record write failed after return");
        }

        run.advance(SagaState::Published)?;
        Ok(record)
    }

    /// Moves an item's available count from `previous` to `next` with a
    /// compare-and-set at `version`, binding the undo on success or when the
    /// outcome is unknown.
    #[allow(clippy::too_many_arguments)]
    async fn adjust_inventory(
        &self,
        run: &mut SagaRun,
        deadline: &Deadline,
        item_id: AggregateId,
        total_copies: u32,
        previous: u32,
        next: u32,
        version: Version,
        change_id: String,
    ) -> Result<()> {
        let adjusted = step(
            deadline,
            SagaState::Reserving,
            self.inventory
                .set_copies(item_id, total_copies, next, version, &change_id),
        )
        .await;

        let (applied_version, failure) = match adjusted {
            Ok(version) => (Some(version), None),
            Err(error) if error.outcome_unknown() => (None, Some(error)),
            Err(error) => return Err(error),
        };
        run.push_compensation(Compensation::RestoreInventory {
            item_id,
            change_id,
            previous_available: previous,
            applied_available: next,
            applied_version,
        });

        failure.map_or(Ok(()), Err)
    }

    async fn write_record(&self, checkout: &Checkout) -> Result<CheckoutRecord> {
        let record = CheckoutRecord::from_aggregate(checkout)
            .ok_or_else(|| SagaError::NotFound("checkout has no record".to_string()))?;
        self.records.upsert_checkout_record(&record).await?;
        Ok(record)
    }

    async fn finish(
        &self,
        mut run: SagaRun,
        started: Instant,
        outcome: Result<CheckoutRecord>,
    ) -> SagaReport<CheckoutRecord> {
        let kind = run.kind().as_str();
        let saga_id = run.saga_id();

        let (compensations, result) = match &outcome {
            Ok(record) => {
                metrics::counter!("saga_completed_total", "kind" => kind).increment(1);
                tracing::info!(%saga_id, checkout_id = %record.checkout_id, "saga completed");
                (Vec::new(), "published")
            }
            Err(error) => {
                let failed_in = run.state();
                let compensations = self.compensate(&mut run).await;
                let reason = error.kind();
                metrics::counter!("saga_failed_total", "kind" => kind, "reason" => reason.as_str())
                    .increment(1);
                tracing::warn!(%saga_id, step = %failed_in, %reason, %error, "saga failed");
                (compensations, "failed")
            }
        };

        metrics::histogram!("saga_duration_seconds", "kind" => kind, "outcome" => result)
            .record(started.elapsed().as_secs_f64());
        run.into_report(compensations, outcome)
    }

    /// Runs bound compensations most recent first. Each gets its own
    /// deadline; a failure is logged and the remaining ones still run.
    async fn compensate(&self, run: &mut SagaRun) -> Vec<CompensationOutcome> {
        let saga_id = run.saga_id();
        if let Err(error) = run.advance(SagaState::Compensating) {
            tracing::error!(%saga_id, %error, "cannot enter compensation");
        }

        let mut outcomes = Vec::new();
        for compensation in run.take_compensations() {
            let name = compensation.name();
            metrics::counter!("saga_compensations_total", "compensation" => name).increment(1);

            let deadline = Deadline::after(self.config.compensation_timeout);
            let result = step(
                &deadline,
                SagaState::Compensating,
                self.apply_compensation(saga_id, &compensation),
            )
            .await;

            let error = match result {
                Ok(()) => {
                    tracing::info!(%saga_id, compensation = name, "compensation applied");
                    None
                }
                Err(error) => {
                    metrics::counter!("saga_compensation_failures_total", "compensation" => name)
                        .increment(1);
                    tracing::error!(
                        %saga_id,
                        compensation = name,
                        ?compensation,
                        %error,
                        "compensation failed, manual reconciliation required"
                    );
                    Some(error.to_string())
                }
            };
            outcomes.push(CompensationOutcome {
                compensation,
                error,
            });
        }

        if let Err(error) = run.advance(SagaState::Failed) {
            tracing::error!(%saga_id, %error, "cannot finish compensation");
        }
        outcomes
    }

    async fn apply_compensation(&self, saga_id: Uuid, compensation: &Compensation) -> Result<()> {
        match compensation {
            Compensation::RestoreInventory {
                item_id,
                change_id,
                applied_version,
                ..
            } => {
                let delta = compensation.inventory_delta().unwrap_or_default();
                self.restore_inventory(*item_id, change_id, delta, applied_version.is_some())
                    .await
            }
            Compensation::VoidCheckout {
                checkout_id,
                reason,
            } => self.void_checkout(saga_id, *checkout_id, reason).await,
        }
    }

    /// Applies `delta` to the item's current available count.
    ///
    /// When the forward change is not known to have committed, the change id
    /// is checked first and nothing is undone if it never landed.
    async fn restore_inventory(
        &self,
        item_id: AggregateId,
        change_id: &str,
        delta: i64,
        committed: bool,
    ) -> Result<()> {
        if !committed && !self.inventory.change_applied(item_id, change_id).await? {
            tracing::info!(%item_id, change_id, "inventory change never committed");
            return Ok(());
        }

        let undo_id = format!("{change_id}:undo");
        let mut attempt = 0;
        loop {
            attempt += 1;
            let item = self.inventory.get_item(item_id).await?;
            let available = i64::from(item.available) + delta;
            let available = u32::try_from(available)
                .ok()
                .filter(|available| *available <= item.total_copies)
                .ok_or_else(|| {
                    SagaError::ValidationFailed(format!(
                        "restoring {delta} copies would leave item {item_id} at {available} of {}",
                        item.total_copies
                    ))
                })?;

            match self
                .inventory
                .set_copies(item_id, item.total_copies, available, item.version, &undo_id)
                .await
            {
                Ok(_) => return Ok(()),
                Err(error)
                    if error.kind() == FailureKind::ConcurrencyConflict
                        && attempt < RESTORE_ATTEMPTS =>
                {
                    tracing::debug!(%item_id, attempt, "inventory restore lost a race, re-reading");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Voids the checkout if it was recorded and refreshes its record.
    async fn void_checkout(
        &self,
        saga_id: Uuid,
        checkout_id: AggregateId,
        reason: &str,
    ) -> Result<()> {
        if self.circulation.get_checkout(checkout_id).await?.is_none() {
            tracing::info!(%checkout_id, "checkout never recorded");
            return Ok(());
        }

        let voided = self
            .circulation
            .void(VoidCheckout::new(checkout_id, reason), saga_options(saga_id))
            .await?;
        if let Some(record) = CheckoutRecord::from_aggregate(&voided.aggregate)
            && let Err(error) = self.records.upsert_checkout_record(&record).await
        {
            tracing::warn!(%checkout_id, %error, "voided checkout record write failed");
        }
        Ok(())
    }
}

fn saga_options(saga_id: Uuid) -> ExecuteOptions {
    ExecuteOptions::new().with_metadata(SAGA_ID_KEY, saga_id.to_string())
}
