/// In-memory gateway for tests and local development
///
/// Transactions are created `pending` with ids `mock-1-<random>`, `mock-2-<random>`, ...
/// (unique across gateways sharing one database) and can
/// be moved to any status with [`MockGateway::set_status`]. Setting
/// `fail_requests` makes every call return a retryable timeout, which is how
/// the "gateway unreachable" paths are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    Checkout, CheckoutRequest, GatewayError, GatewayResult, GatewayStatus, GatewayTransaction,
    PaymentGateway, ReportedAmount,
};

#[derive(Debug, Default)]
pub struct MockGateway {
    transactions: Mutex<HashMap<String, GatewayTransaction>>,
    next_id: AtomicU64,
    fail_requests: AtomicBool,
    checkouts: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `GatewayError::Timeout`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_requests.store(unreachable, Ordering::SeqCst);
    }

    /// Overrides the status (and optionally the amount) of a transaction
    pub fn set_status(&self, transaction_id: &str, status: GatewayStatus, amount: Option<i64>) {
        let mut transactions = self.lock();
        let entry = transactions
            .entry(transaction_id.to_string())
            .or_insert_with(|| GatewayTransaction {
                id: transaction_id.to_string(),
                status: GatewayStatus::Pending,
                amount: ReportedAmount::Missing,
            });
        entry.status = status;
        if amount.is_some() {
            entry.amount = amount.into();
        }
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<GatewayTransaction> {
        self.lock().get(transaction_id).cloned()
    }

    /// Number of checkouts opened so far
    pub fn checkout_count(&self) -> u64 {
        self.checkouts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, GatewayTransaction>> {
        // A poisoned map only means another test panicked mid-update
        self.transactions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> GatewayResult<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            Err(GatewayError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> GatewayResult<Checkout> {
        self.check_reachable()?;

        if request.amount <= 0 {
            return Err(GatewayError::Upstream {
                status: 422,
                message: "amount must be positive".into(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock-{}-{}", n, &Uuid::new_v4().simple().to_string()[..8]);
        self.lock().insert(
            id.clone(),
            GatewayTransaction {
                id: id.clone(),
                status: GatewayStatus::Pending,
                amount: ReportedAmount::Whole(request.amount),
            },
        );
        self.checkouts.fetch_add(1, Ordering::SeqCst);

        Ok(Checkout {
            payment_url: format!("https://checkout.mock/pay/{}", id),
            transaction_id: id,
            status: GatewayStatus::Pending,
        })
    }

    async fn fetch_transaction(&self, transaction_id: &str) -> GatewayResult<GatewayTransaction> {
        self.check_reachable()?;

        self.transaction(transaction_id)
            .ok_or_else(|| GatewayError::NotFound(transaction_id.to_string()))
    }
}
