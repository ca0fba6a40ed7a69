pub mod analysis;
pub mod package;
pub mod upload;
pub mod workflow;
