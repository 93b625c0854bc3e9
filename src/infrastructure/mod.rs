pub mod adapters;
pub mod config;

pub use adapters::{FilePendingOrderStore, HttpBackendAdapter, TracingCheckoutEvents};
pub use config::CheckoutConfig;
