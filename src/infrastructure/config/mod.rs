pub mod checkout_config;

pub use checkout_config::CheckoutConfig;
