//! Fine payment and verification.
//!
//! Payment is a stub gateway: both methods complete immediately. Admin
//! verification and the gateway webhook can settle or reopen a fine
//! independently of the user-facing call.

use std::str::FromStr;

use serde::Serialize;
use shelf_ledger::Transaction;
use shelf_types::{PaymentMethod, Status, TransactionId, UserId};
use tracing::{debug, info};

use crate::error::{LendingError, LendingResult};
use crate::service::LendingService;

/// Proof recorded for QRIS payments.
pub const QRIS_PROOF: &str = "auto-paid-dummy";
/// Proof recorded for manual payments submitted without one.
pub const MANUAL_PLACEHOLDER_PROOF: &str = "auto-paid-dummy-manual";

/// Outcome of a successful [`LendingService::pay_fine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub method: PaymentMethod,
    pub message: &'static str,
    pub transaction: Transaction,
}

/// Admin decision on a submitted payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Approve,
    Reject,
}

impl FromStr for Verification {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(LendingError::InvalidAction(other.to_string())),
        }
    }
}

/// What a gateway callback did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The fine was marked paid.
    Settled,
    /// The fine was already paid; nothing changed.
    AlreadySettled,
    /// The status does not settle a payment; nothing changed.
    Ignored,
}

/// Gateway statuses that mean the money arrived.
fn is_settling_status(status: &str) -> bool {
    matches!(status, "settled" | "capture")
}

impl LendingService {
    /// Pay the fine on `tx_id` as `user_id`.
    ///
    /// Both methods auto-complete: the fine is marked paid and the entry
    /// completed. A manual payment without proof gets a placeholder.
    pub async fn pay_fine(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
        method: &str,
        proof: &str,
    ) -> LendingResult<PaymentReceipt> {
        self.bounded("pay_fine", self.do_pay_fine(user_id, tx_id, method, proof))
            .await
    }

    /// Approve or reject a payment. Callers enforce admin access.
    pub async fn verify_fine(&self, tx_id: TransactionId, action: &str) -> LendingResult<Transaction> {
        self.bounded("verify_fine", self.do_verify_fine(tx_id, action))
            .await
    }

    /// Apply a payment-gateway notification. `order_id` is the transaction
    /// id; only `settled` and `capture` change anything, and a fine that is
    /// already paid keeps its first `paid_at`.
    pub async fn handle_payment_callback(
        &self,
        order_id: &str,
        status: &str,
    ) -> LendingResult<CallbackOutcome> {
        self.bounded("payment_callback", self.do_callback(order_id, status))
            .await
    }

    async fn do_pay_fine(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
        method: &str,
        proof: &str,
    ) -> LendingResult<PaymentReceipt> {
        let mut tx = self.owned_transaction(user_id, tx_id).await?;

        if tx.fine <= 0 {
            return Err(LendingError::NoFineOwed);
        }
        if tx.paid_at.is_some() {
            return Err(LendingError::AlreadyPaid);
        }
        if tx.status == Status::PendingVerification {
            return Err(LendingError::PaymentPending);
        }

        let method = PaymentMethod::from_str(method)
            .map_err(|_| LendingError::InvalidPaymentMethod(method.to_string()))?;
        let (proof, message) = match method {
            PaymentMethod::Qris => (QRIS_PROOF.to_string(), "Payment successful (Dummy Mode)"),
            PaymentMethod::Manual => {
                let proof = if proof.is_empty() {
                    MANUAL_PLACEHOLDER_PROOF.to_string()
                } else {
                    proof.to_string()
                };
                (proof, "Payment successful (Dummy Mode - Manual)")
            }
        };

        let now = self.clock.now();
        tx.paid_at = Some(now);
        tx.status = Status::Completed;
        tx.payment_method = Some(method);
        tx.payment_proof = proof;
        tx.updated_at = now;
        let tx = self.ledger.update(&tx).await?;

        info!(tx_id = %tx.id, %user_id, %method, fine = tx.fine, "fine paid");
        Ok(PaymentReceipt {
            method,
            message,
            transaction: tx,
        })
    }

    async fn do_verify_fine(&self, tx_id: TransactionId, action: &str) -> LendingResult<Transaction> {
        let mut tx = self.transaction(tx_id).await?;
        let decision = Verification::from_str(action)?;

        let now = self.clock.now();
        match decision {
            Verification::Approve => {
                tx.paid_at = Some(now);
                tx.status = Status::Completed;
            }
            Verification::Reject => {
                tx.paid_at = None;
                tx.status = Status::Active;
                tx.clear_payment();
            }
        }
        tx.updated_at = now;
        let tx = self.ledger.update(&tx).await?;

        info!(tx_id = %tx.id, ?decision, status = %tx.status, "fine verification applied");
        Ok(tx)
    }

    async fn do_callback(&self, order_id: &str, status: &str) -> LendingResult<CallbackOutcome> {
        let tx_id = TransactionId::from_str(order_id)
            .map_err(|_| LendingError::InvalidOrderId(order_id.to_string()))?;
        let mut tx = self.transaction(tx_id).await?;

        if !is_settling_status(status) {
            debug!(tx_id = %tx_id, status, "payment callback ignored");
            return Ok(CallbackOutcome::Ignored);
        }
        if tx.paid_at.is_some() {
            debug!(tx_id = %tx_id, status, "payment callback for settled fine");
            return Ok(CallbackOutcome::AlreadySettled);
        }

        let now = self.clock.now();
        tx.paid_at = Some(now);
        tx.status = Status::Completed;
        tx.updated_at = now;
        self.ledger.update(&tx).await?;

        info!(tx_id = %tx_id, status, "payment settled by callback");
        Ok(CallbackOutcome::Settled)
    }
}
