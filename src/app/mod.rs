pub mod action;
pub mod state;

pub use action::Action;
pub use state::{AppState, Mode, StatusLevel};
