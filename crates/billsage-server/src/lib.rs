//! BillSage server: HTTP API, shared state and the background analysis queue.

pub mod analysis;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, Collaborators};
