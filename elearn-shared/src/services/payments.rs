/// Enrollment and payment reconciliation
///
/// # Flow
///
/// ```text
/// enroll ──► initiate_payment ──► gateway checkout ──► student pays
///                                                     │
///                      webhook (signed) ◄─────────────┤
///                      callback (redirect) ◄──────────┘
///                                 │
///                                 ▼
///                             reconcile
/// ```
///
/// Webhook, callback and the manager re-check all end in [`PaymentService::reconcile`].
/// The status in a callback query string is never trusted; the gateway is
/// asked for the authoritative state instead.
///
/// # Concurrency
///
/// Reconciliation updates the payment with `... WHERE status = 'pending'` and
/// the enrollment in the same transaction. When two deliveries race, the
/// second one's conditional update matches no row and it reports
/// `AlreadySettled`.
///
/// An enrollment has at most one `pending` payment (partial unique index
/// `payments_one_pending_per_enrollment`). A repeated payment request reuses
/// the open checkout while the gateway still reports it pending, and only
/// opens a new one once the old transaction has settled as failed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::gateway::signature::{mask, verify_signature};
use crate::gateway::{
    CheckoutRequest, Customer, GatewayTransaction, PaymentGateway, WebhookEvent,
};
use crate::models::payment::ONE_PENDING_PER_ENROLLMENT;
use crate::models::course::Course;
use crate::models::enrollment::{Enrollment, EnrollmentStatus};
use crate::models::payment::{CreatePayment, Payment, PaymentStatus};
use crate::models::user::User;
use crate::settings::PaymentSettings;

/// Query keys that may carry the transaction id on the callback
pub const CALLBACK_ID_KEYS: [&str; 4] = ["id", "transaction_id", "trans_id", "transaction"];

/// What reconciliation should do with a reported transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPlan {
    /// Payment already left `pending`
    AlreadySettled(PaymentStatus),

    /// Gateway has no final answer yet
    AwaitGateway,

    /// Move the payment to `status`
    Settle {
        status: PaymentStatus,
        amount_mismatch: bool,
    },
}

/// Decides the settlement of a payment from the gateway's report
pub fn plan_settlement(payment: &Payment, reported: &GatewayTransaction) -> SettlementPlan {
    if payment.status.is_terminal() {
        return SettlementPlan::AlreadySettled(payment.status);
    }

    match reported.status.settlement() {
        None => SettlementPlan::AwaitGateway,
        Some(PaymentStatus::Paid) if reported.amount.contradicts(payment.amount) => {
            SettlementPlan::Settle {
                status: PaymentStatus::Failed,
                amount_mismatch: true,
            }
        }
        Some(status) => SettlementPlan::Settle {
            status,
            amount_mismatch: false,
        },
    }
}

/// Result of a reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// This call moved the payment out of `pending`
    Settled {
        transaction_id: String,
        payment_status: PaymentStatus,
        enrollment_id: Uuid,
        enrollment_status: EnrollmentStatus,
    },

    /// Nothing to do, the payment was settled earlier
    AlreadySettled {
        transaction_id: String,
        payment_status: PaymentStatus,
        enrollment_id: Uuid,
    },

    /// The gateway still reports a non-final status
    Pending {
        transaction_id: String,
        enrollment_id: Uuid,
    },

    /// The payment was approved but its enrollment had already been paid
    /// through another payment; needs a manual refund
    DuplicateCharge {
        transaction_id: String,
        enrollment_id: Uuid,
    },

    /// No local payment carries this transaction id
    UnknownTransaction { transaction_id: String },

    /// Event acknowledged without action
    Ignored { reason: String },
}

impl ReconcileOutcome {
    pub fn enrollment_id(&self) -> Option<Uuid> {
        match self {
            ReconcileOutcome::Settled { enrollment_id, .. }
            | ReconcileOutcome::AlreadySettled { enrollment_id, .. }
            | ReconcileOutcome::Pending { enrollment_id, .. }
            | ReconcileOutcome::DuplicateCharge { enrollment_id, .. } => Some(*enrollment_id),
            ReconcileOutcome::UnknownTransaction { .. } | ReconcileOutcome::Ignored { .. } => None,
        }
    }
}

/// Result of starting a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitiatedPayment {
    /// Send the student to the hosted checkout
    Redirect { payment: Payment, payment_url: String },

    /// Free course, settled locally
    SettledFree { payment: Payment, enrollment: Enrollment },
}

/// Enrollment, payment initiation and reconciliation
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
        Self {
            pool,
            gateway,
            settings,
        }
    }

    /// Creates a pending enrollment in a published course
    ///
    /// Returns the existing enrollment when the student is already enrolled;
    /// the boolean tells whether a new row was created.
    pub async fn enroll(&self, student_id: Uuid, course_id: Uuid) -> ServiceResult<(Enrollment, bool)> {
        let course = Course::find_by_id(&self.pool, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {}", course_id)))?;

        if let Some(existing) =
            Enrollment::find_by_student_and_course(&self.pool, student_id, course_id).await?
        {
            return Ok((existing, false));
        }

        if !course.is_published() {
            return Err(ServiceError::Validation(format!(
                "course '{}' is not open for enrollment",
                course.title
            )));
        }

        let (enrollment, created) =
            Enrollment::create_or_get(&self.pool, student_id, course_id).await?;

        if created {
            info!(%student_id, %course_id, enrollment_id = %enrollment.id, "Enrollment created");
        }

        Ok((enrollment, created))
    }

    /// Starts a payment for an enrollment owned by `student`
    ///
    /// If a checkout is already open for the enrollment it is re-checked with
    /// the gateway first: still pending means the same link is returned,
    /// approved means the enrollment is now paid, failed means a fresh
    /// checkout is opened.
    ///
    /// # Errors
    ///
    /// - `PaymentState` if the enrollment is already paid, or another request
    ///   opened a checkout concurrently
    /// - `ExternalService` if the gateway is unreachable; nothing is written
    pub async fn initiate_payment(
        &self,
        student: &User,
        enrollment_id: Uuid,
    ) -> ServiceResult<InitiatedPayment> {
        let enrollment = Enrollment::find_by_id(&self.pool, enrollment_id)
            .await?
            .filter(|e| e.student_id == student.id)
            .ok_or_else(|| ServiceError::NotFound(format!("enrollment {}", enrollment_id)))?;

        if enrollment.is_paid() {
            return Err(ServiceError::PaymentState(
                "enrollment is already paid".to_string(),
            ));
        }

        let course = Course::find_by_id(&self.pool, enrollment.course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {}", enrollment.course_id)))?;

        if let Some(open) = Payment::pending_for_enrollment(&self.pool, enrollment.id).await? {
            if let Some(resumed) = self.resume_checkout(open).await? {
                return Ok(resumed);
            }
        }

        if course.is_free() {
            return self.settle_free(&enrollment).await;
        }

        let request = CheckoutRequest {
            description: format!("Inscription : {}", course.title),
            amount: course.price,
            currency: self.settings.currency.clone(),
            callback_url: self.settings.callback_url(),
            customer: Customer {
                first_name: student.first_name.clone(),
                last_name: student.last_name.clone(),
                email: student.email.clone(),
                phone: student.phone.clone(),
            },
        };

        let checkout = self.gateway.create_checkout(&request).await.map_err(|e| {
            warn!(
                gateway = self.gateway.name(),
                %enrollment_id,
                error = %e,
                retryable = e.is_retryable(),
                "Payment initiation failed"
            );
            ServiceError::from(e)
        })?;

        let mut tx = self.pool.begin().await?;

        let created = Payment::create(
            &mut *tx,
            CreatePayment {
                enrollment_id: enrollment.id,
                transaction_id: checkout.transaction_id.clone(),
                amount: course.price,
                currency: self.settings.currency.clone(),
                status: PaymentStatus::Pending,
                payment_url: Some(checkout.payment_url.clone()),
            },
        )
        .await;

        let payment = match created {
            Ok(payment) => payment,
            Err(sqlx::Error::Database(e)) if e.constraint() == Some(ONE_PENDING_PER_ENROLLMENT) => {
                warn!(
                    %enrollment_id,
                    abandoned_transaction = %checkout.transaction_id,
                    "Concurrent payment request, checkout discarded"
                );
                return Err(ServiceError::PaymentState(
                    "a payment is already in progress for this enrollment".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        // No-op unless the previous attempt failed
        Enrollment::reopen(&mut *tx, enrollment.id).await?;

        tx.commit().await?;

        info!(
            %enrollment_id,
            transaction_id = %payment.transaction_id,
            amount = payment.amount,
            "Payment initiated"
        );

        Ok(InitiatedPayment::Redirect {
            payment_url: checkout.payment_url,
            payment,
        })
    }

    /// Decides what to do with an enrollment's open checkout
    ///
    /// Returns the checkout to reuse, or `None` when its transaction has
    /// failed and a new one may be opened.
    async fn resume_checkout(&self, open: Payment) -> ServiceResult<Option<InitiatedPayment>> {
        let enrollment_id = open.enrollment_id;

        match self.recheck_transaction(&open.transaction_id).await? {
            ReconcileOutcome::Pending { .. } => {
                let Some(payment_url) = open.payment_url.clone() else {
                    return Err(ServiceError::PaymentState(
                        "a payment is already in progress for this enrollment".to_string(),
                    ));
                };

                info!(
                    %enrollment_id,
                    transaction_id = %open.transaction_id,
                    "Reusing open checkout"
                );
                return Ok(Some(InitiatedPayment::Redirect {
                    payment: open,
                    payment_url,
                }));
            }
            outcome => {
                debug!(%enrollment_id, ?outcome, "Open checkout settled on re-check");
            }
        }

        let paid = Enrollment::find_by_id(&self.pool, enrollment_id)
            .await?
            .is_some_and(|e| e.is_paid());
        if paid {
            return Err(ServiceError::PaymentState(
                "enrollment is already paid".to_string(),
            ));
        }

        Ok(None)
    }

    /// Records a zero-amount paid payment and marks the enrollment paid
    async fn settle_free(&self, enrollment: &Enrollment) -> ServiceResult<InitiatedPayment> {
        let mut tx = self.pool.begin().await?;

        let payment = Payment::create(
            &mut *tx,
            CreatePayment {
                enrollment_id: enrollment.id,
                transaction_id: format!("free-{}", Uuid::new_v4()),
                amount: 0,
                currency: self.settings.currency.clone(),
                status: PaymentStatus::Paid,
                payment_url: None,
            },
        )
        .await?;

        let enrollment = match Enrollment::mark_paid(&mut *tx, enrollment.id).await? {
            Some(updated) => updated,
            None => {
                // Settled concurrently; drop our payment row
                tx.rollback().await?;
                return Err(ServiceError::PaymentState(
                    "enrollment is already paid".to_string(),
                ));
            }
        };

        tx.commit().await?;

        info!(enrollment_id = %enrollment.id, "Free enrollment settled");

        Ok(InitiatedPayment::SettledFree { payment, enrollment })
    }

    /// Verifies and processes a webhook delivery
    ///
    /// # Errors
    ///
    /// `Authentication` when the signature is missing or invalid; the payload
    /// is discarded without touching the database.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> ServiceResult<ReconcileOutcome> {
        let header = signature_header.unwrap_or_default();

        if let Err(e) = verify_signature(
            payload,
            header,
            &self.settings.webhook_secret,
            self.settings.webhook_tolerance_secs,
            Utc::now().timestamp(),
        ) {
            warn!(
                reason = %e,
                signature = %mask(header),
                body_len = payload.len(),
                "Rejected webhook with invalid signature"
            );
            return Err(e.into());
        }

        let event = match WebhookEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Signed webhook with unreadable body");
                return Ok(ReconcileOutcome::Ignored {
                    reason: "unreadable payload".to_string(),
                });
            }
        };

        let Some(transaction) = event.transaction else {
            info!(event = ?event.name, "Webhook event without transaction id");
            return Ok(ReconcileOutcome::Ignored {
                reason: "event carries no transaction id".to_string(),
            });
        };

        info!(
            event = ?event.name,
            transaction_id = %transaction.id,
            status = %transaction.status,
            "Webhook received"
        );

        self.reconcile(&transaction).await
    }

    /// Re-verifies a payment after the gateway redirect
    ///
    /// Only the transaction id is read from the query; its status comes from
    /// the gateway.
    pub async fn handle_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> ServiceResult<ReconcileOutcome> {
        let transaction_id = CALLBACK_ID_KEYS
            .iter()
            .find_map(|key| params.get(*key).map(|v| v.trim()).filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                ServiceError::Validation("callback carries no transaction id".to_string())
            })?
            .to_string();

        self.recheck_transaction(&transaction_id).await
    }

    /// Manager re-check of a payment against the gateway
    pub async fn recheck_payment(&self, payment_id: Uuid) -> ServiceResult<ReconcileOutcome> {
        let payment = Payment::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment {}", payment_id)))?;

        if payment.status.is_terminal() {
            return Ok(ReconcileOutcome::AlreadySettled {
                transaction_id: payment.transaction_id,
                payment_status: payment.status,
                enrollment_id: payment.enrollment_id,
            });
        }

        self.recheck_transaction(&payment.transaction_id).await
    }

    async fn recheck_transaction(&self, transaction_id: &str) -> ServiceResult<ReconcileOutcome> {
        let reported = self
            .gateway
            .fetch_transaction(transaction_id)
            .await
            .map_err(|e| {
                warn!(
                    gateway = self.gateway.name(),
                    transaction_id,
                    error = %e,
                    "Could not fetch transaction from gateway"
                );
                ServiceError::from(e)
            })?;

        self.reconcile(&reported).await
    }

    /// Applies a gateway-reported transaction state to local records
    pub async fn reconcile(&self, reported: &GatewayTransaction) -> ServiceResult<ReconcileOutcome> {
        let Some(payment) = Payment::find_by_transaction_id(&self.pool, &reported.id).await? else {
            warn!(transaction_id = %reported.id, "Reconciliation for unknown transaction");
            return Ok(ReconcileOutcome::UnknownTransaction {
                transaction_id: reported.id.clone(),
            });
        };

        let (status, amount_mismatch) = match plan_settlement(&payment, reported) {
            SettlementPlan::AlreadySettled(status) => {
                info!(
                    transaction_id = %payment.transaction_id,
                    status = status.as_str(),
                    "Payment already settled, nothing to do"
                );
                return Ok(ReconcileOutcome::AlreadySettled {
                    transaction_id: payment.transaction_id,
                    payment_status: status,
                    enrollment_id: payment.enrollment_id,
                });
            }
            SettlementPlan::AwaitGateway => {
                return Ok(ReconcileOutcome::Pending {
                    transaction_id: payment.transaction_id,
                    enrollment_id: payment.enrollment_id,
                });
            }
            SettlementPlan::Settle {
                status,
                amount_mismatch,
            } => (status, amount_mismatch),
        };

        if amount_mismatch {
            error!(
                transaction_id = %payment.transaction_id,
                expected = payment.amount,
                reported = ?reported.amount,
                "Gateway amount differs from stored payment, marking failed"
            );
        }

        let mut tx = self.pool.begin().await?;

        let Some(settled) = Payment::settle(&mut *tx, &payment.transaction_id, status).await? else {
            tx.rollback().await?;

            // Another delivery won the race
            let current = Payment::find_by_transaction_id(&self.pool, &payment.transaction_id)
                .await?
                .map(|p| p.status)
                .unwrap_or(status);

            info!(
                transaction_id = %payment.transaction_id,
                status = current.as_str(),
                "Payment settled concurrently, nothing to do"
            );
            return Ok(ReconcileOutcome::AlreadySettled {
                transaction_id: payment.transaction_id,
                payment_status: current,
                enrollment_id: payment.enrollment_id,
            });
        };

        let updated = match status {
            PaymentStatus::Paid => {
                let marked = Enrollment::mark_paid(&mut *tx, settled.enrollment_id).await?;
                if marked.is_none() {
                    // Money was taken twice; keep the payment as paid so it can be refunded
                    tx.commit().await?;

                    error!(
                        transaction_id = %settled.transaction_id,
                        enrollment_id = %settled.enrollment_id,
                        amount = settled.amount,
                        "Payment approved for an enrollment that was already paid"
                    );
                    return Ok(ReconcileOutcome::DuplicateCharge {
                        transaction_id: settled.transaction_id,
                        enrollment_id: settled.enrollment_id,
                    });
                }
                marked
            }
            PaymentStatus::Failed => Enrollment::mark_failed(&mut *tx, settled.enrollment_id).await?,
            PaymentStatus::Pending => None,
        };

        let enrollment_status = match updated {
            Some(enrollment) => enrollment.status,
            None => Enrollment::find_by_id(&mut *tx, settled.enrollment_id)
                .await?
                .map(|e| e.status)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("enrollment {}", settled.enrollment_id))
                })?,
        };

        tx.commit().await?;

        info!(
            transaction_id = %settled.transaction_id,
            payment_status = settled.status.as_str(),
            enrollment_id = %settled.enrollment_id,
            enrollment_status = enrollment_status.as_str(),
            "Payment reconciled"
        );

        Ok(ReconcileOutcome::Settled {
            transaction_id: settled.transaction_id,
            payment_status: settled.status,
            enrollment_id: settled.enrollment_id,
            enrollment_status,
        })
    }
}
