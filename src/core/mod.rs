//! Core decision and memory engine
//!
//! Intent routing, the token budget guard, conversational memory and the
//! engine that ties them to the capabilities.

pub mod budget;
pub mod engine;
pub mod intent;
pub mod memory;

pub use budget::TokenBudget;
pub use engine::{AssistantEngine, AssistantRequest, AssistantResponse, EngineError};
pub use memory::{ConversationMemory, MemoryKind, ProfileUpdate};
