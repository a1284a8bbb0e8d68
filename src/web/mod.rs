pub mod auth;
pub mod csrf;
pub mod data;
pub mod error;
pub mod flash;
pub mod forms;
pub mod models;
pub mod router;
pub mod session;
pub mod state;
pub mod students;
pub mod templates;

#[cfg(test)]
mod tests;

pub use state::AppState;
