pub mod mapping;
pub mod search;
pub mod workflow;
