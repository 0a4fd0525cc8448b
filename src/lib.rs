pub mod app;
pub mod auth;
pub mod dashboard;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod store;
pub mod ui;

pub use app::router;
pub use state::AppState;
pub use storage::{JsonFileBackend, MemoryBackend, resolve_data_path};
pub use store::{StatEvent, StatStore, Subscription};
