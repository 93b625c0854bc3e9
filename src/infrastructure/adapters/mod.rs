pub mod file_pending_order_store;
pub mod http_backend_adapter;
pub mod tracing_checkout_events;

pub use file_pending_order_store::FilePendingOrderStore;
pub use http_backend_adapter::HttpBackendAdapter;
pub use tracing_checkout_events::TracingCheckoutEvents;
