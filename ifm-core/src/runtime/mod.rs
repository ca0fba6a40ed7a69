pub mod activity;
pub mod context;
pub mod orchestrator;
pub mod retry;
pub mod storage;
pub mod types;
