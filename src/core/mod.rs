pub mod engine;
pub mod retry;
pub mod state;
pub mod transform;

pub use crate::domain::model::{ClaimRecord, TransformedClaim};
pub use crate::domain::ports::{ClaimSource, ClaimTarget, StateBackend};
pub use crate::utils::error::Result;
pub use engine::{SyncEngine, SyncRequest, SyncResponse};
pub use state::SyncStateManager;
