pub mod routes;
mod server;
pub use server::{app, serve};
pub mod public;
mod session;
pub use session::Session;
mod state;
pub use state::AppState;
mod utils;
