pub mod auth;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod observability;
pub mod router;
pub mod state;
pub mod types;
