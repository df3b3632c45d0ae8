//! Persistence seam — the `MessageStore` trait and an in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, StoredMessage};
pub use traits::MessageStore;
