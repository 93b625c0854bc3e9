pub mod cart_service_port;
pub mod checkout_events_port;
pub mod order_service_port;
pub mod pending_order_store_port;

pub use cart_service_port::{CartServicePort, CouponCheck, CurrencyContext, PriceRequest};
pub use checkout_events_port::CheckoutEventsPort;
pub use order_service_port::{CallbackUrls, CreateOrderRequest, OrderServicePort};
pub use pending_order_store_port::PendingOrderStorePort;
