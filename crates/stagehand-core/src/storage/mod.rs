pub mod memory;

pub use memory::{gather_rules, MemoryPayload, MemoryStore, RuleRecord};
