//! IAM identity collection: tool-call backed queries, the least-privilege
//! SDK path, and the collector that assembles inventories from them.

pub mod collector;
pub mod direct;
pub mod error;
pub mod iam;

pub use collector::IdentityCollector;
pub use direct::{DirectIamApi, SdkIamApi};
pub use error::CollectorError;
pub use iam::{AwsIamClient, CredentialReport, EntityKind};
