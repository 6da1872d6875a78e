// Endpoints the gateway answers itself. Everything else is proxied.
pub mod health;

pub use health::health;
