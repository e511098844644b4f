pub mod args;
pub mod classify;
pub mod collect;
pub mod dedup;
pub mod error;
pub mod merge;
pub mod message;
pub mod openai;
pub mod pipeline;
pub mod store;
mod utils;
