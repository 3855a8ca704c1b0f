mod handlers;
mod models;
mod session;
mod state;

pub use handlers::run_server;
