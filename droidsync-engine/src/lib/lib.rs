pub mod diff;
pub mod engine;
pub mod exec;
pub mod plan;
pub mod report;
pub mod storage;
pub mod walk;

pub use engine::Engine;
