/// Business services
///
/// - `payments`: enrollment, payment initiation and gateway reconciliation
/// - `progress`: course completion percentage
/// - `certificates`: eligibility verdicts and idempotent issuance
/// - `grading`: quiz attempt scoring
///
/// Services hold a pool plus explicit settings and are cheap to clone.

pub mod certificates;
pub mod grading;
pub mod payments;
pub mod progress;

pub use certificates::{CertificateService, Eligibility, IssueOutcome};
pub use payments::{InitiatedPayment, PaymentService, ReconcileOutcome};
pub use progress::{compute_progress, ProgressReport, ProgressSnapshot};
