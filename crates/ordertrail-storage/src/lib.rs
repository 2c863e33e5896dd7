//! Storage collaborators for ordertrail: message intake with duplicate
//! detection, the hash-addressed message archive, the in-memory order
//! repository and the merchant return-policy table.

pub mod archive;
pub mod messages;
pub mod orders;
pub mod policies;

use thiserror::Error;
use uuid::Uuid;

pub use archive::{ArchivedMessage, MessageArchive};
pub use messages::{Ingested, MessageStore};
pub use orders::{InMemoryOrderStore, OrderRepository};
pub use policies::{ReturnPolicy, ReturnPolicyLookup, ReturnPolicyTable};

pub const CRATE_NAME: &str = "ordertrail-storage";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("order {order_id} from {merchant} already stored for {user_id} as {existing}")]
    DuplicateIdentity {
        user_id: String,
        merchant: String,
        order_id: String,
        existing: Uuid,
    },
    #[error("invalid return policy for {merchant:?}: {reason}")]
    InvalidPolicy { merchant: String, reason: String },
}
