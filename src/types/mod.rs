//! Core domain types for the repository audit.
//!
//! Identity and credential newtypes, the three-state `Lookup` result, and the
//! normalized records the client hands to the policy checks.

pub mod ids;
pub mod lookup;
pub mod repository;

// Re-export commonly used types at the module level
pub use ids::{Credential, RepoId};
pub use lookup::Lookup;
pub use repository::{BranchInfo, DeployKeyEntry, FileAtRef, ProtectionRule, RuleSource};
