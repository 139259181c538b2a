//! Search and question answering over a collected identity inventory.
//!
//! [`IdentityAnalyzer`] holds one [`CollectionReport`](nhi_domain::identity::CollectionReport)
//! and answers two kinds of query: keyword searches that return
//! [`IdentityRecord`]s, and free-form questions forwarded to an LLM with
//! the inventory as context.

pub mod analyzer;
pub mod findings;
pub mod records;
pub mod search;

pub use analyzer::{build_context, IdentityAnalyzer, NO_IDENTITIES};
pub use records::{Category, IdentityRecord};
pub use search::{SearchQuery, MAX_RESULTS};
