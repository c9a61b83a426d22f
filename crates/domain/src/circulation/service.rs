//! Circulation service providing a simplified API for checkout operations.

use chrono::Utc;
use common::AggregateId;
use event_store::{EventStore, Version};

use crate::command::{Command, CommandHandler, CommandResult, ExecuteOptions};
use crate::error::DomainError;

use super::{CheckOutItem, Checkout, ReturnCheckout, VoidCheckout};

/// Service for managing checkout records.
pub struct CirculationService<S: EventStore> {
    handler: CommandHandler<S, Checkout>,
}

impl<S: EventStore> CirculationService<S> {
    /// Creates a new circulation service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Checkout> {
        &self.handler
    }

    /// Opens a new checkout. The stream must not exist yet, so the append
    /// runs at version 0.
    #[tracing::instrument(skip(self))]
    pub async fn check_out(
        &self,
        cmd: CheckOutItem,
        options: ExecuteOptions,
    ) -> Result<CommandResult<Checkout>, DomainError> {
        let options = options.expect_version(Version::initial());
        let now = Utc::now();

        self.handler
            .execute_with(cmd.aggregate_id(), options, |checkout| {
                checkout.check_out(
                    cmd.checkout_id,
                    cmd.member_id,
                    cmd.item_id,
                    now,
                    cmd.loan_period,
                )
            })
            .await
    }

    /// Marks a checkout returned, appending at its current version.
    #[tracing::instrument(skip(self))]
    pub async fn return_item(
        &self,
        cmd: ReturnCheckout,
        options: ExecuteOptions,
    ) -> Result<CommandResult<Checkout>, DomainError> {
        let now = Utc::now();

        self.handler
            .execute_with(cmd.aggregate_id(), options, |checkout| {
                checkout.return_item(now)
            })
            .await
    }

    /// Voids an active checkout. Voiding twice is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn void(
        &self,
        cmd: VoidCheckout,
        options: ExecuteOptions,
    ) -> Result<CommandResult<Checkout>, DomainError> {
        self.handler
            .execute_with(cmd.aggregate_id(), options, |checkout| {
                checkout.void(&cmd.reason)
            })
            .await
    }

    /// Loads a checkout by ID.
    ///
    /// Returns None if the checkout doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_checkout(
        &self,
        checkout_id: AggregateId,
    ) -> Result<Option<Checkout>, DomainError> {
        self.handler.load_existing(checkout_id).await
    }
}
