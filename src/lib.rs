pub mod batch;
pub mod catalog;
pub mod clients;
pub mod config;
pub mod credits;
pub mod engine;
pub mod error;
pub mod filters;
pub mod generation;
pub mod lookup;
pub mod models;
pub mod overview;
pub mod render;
pub mod shell;
pub mod suggest;
pub mod workflow;

pub use engine::{Completion, Dashboard, DashboardSettings, Slot, WorkflowStage};
pub use error::{Result, WhosNextError};
