//! Governance policy evaluation.
//!
//! The policy table (`table`) names the thresholds. The checks (`checks`) are
//! pure functions comparing query results against them. The runner (`audit`)
//! plans checks from the table and issues the queries, and `report` turns the
//! outcomes into text, JSON and an exit code.
//!
//! Checks distinguish three results:
//!
//! 1. **Pass**: the live configuration matches the policy.
//! 2. **Fail**: it does not, or the required resource is confirmed absent.
//! 3. **Error**: the query could not answer (denied, rate limited, unreachable),
//!    so the policy could not be evaluated.

pub mod audit;
pub mod checks;
pub mod report;
pub mod table;

pub use audit::{AuditContext, Check, evaluate, plan, run_audit, select};
pub use checks::{CheckOutcome, Verdict};
pub use report::{AuditReport, EXIT_CONFIG, EXIT_FAIL, EXIT_PASS, Summary};
pub use table::{CodeownersPolicy, Policy, RequiredFile};
