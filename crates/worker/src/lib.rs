pub mod budget;
pub mod config;
pub mod ports;
pub mod remote;
pub mod runner;

pub use budget::{BudgetError, PostBudget, DEFAULT_POST_LIMIT};
pub use ports::{
    MissingPlatform, MissingRenderer, Platform, PlatformError, PostConfirmation, RenderError,
    RenderedThread, Renderer,
};
pub use runner::{PublishWorker, RunOutcome, WorkerError};
