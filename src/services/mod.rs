pub mod auth;
pub mod endpoints;
pub mod logger;
pub mod schema_registry;
pub mod settings;
pub mod transport;
pub mod validation;
