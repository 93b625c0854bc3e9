use crate::domain::errors::DomainResult;
use crate::domain::{
    CartId, FulfillmentSelection, OrderCreationResult, OrderId, OrderStatus, PaymentMethod,
    StoredInstrument,
};
use crate::ports::cart_service_port::CurrencyContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Routes the gateway sends the browser back to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackUrls {
    pub success: Url,
    pub failure: Url,
    pub callback: Url,
}

/// Order creation parameters. Carries the price context, not the breakdown:
/// the backend recomputes the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub idempotency_key: Uuid,
    pub cart_id: CartId,
    pub fulfillment: FulfillmentSelection,
    pub currency: CurrencyContext,
    pub coupon: Option<String>,
    pub payment_method_id: u64,
    pub stored_instrument: Option<String>,
    pub contact_phone: String,
    pub callbacks: CallbackUrls,
}

/// Payment and order service port
#[async_trait]
pub trait OrderServicePort: Send + Sync {
    /// Payment methods enabled for the user
    async fn list_payment_methods(&self) -> DomainResult<Vec<PaymentMethod>>;

    /// Instruments the gateway holds for the user
    async fn list_stored_instruments(&self) -> DomainResult<Vec<StoredInstrument>>;

    /// Create the order
    async fn create_order(&self, request: &CreateOrderRequest) -> DomainResult<OrderCreationResult>;

    /// Verify a one-time code with the backend
    async fn verify_challenge(&self, order_id: OrderId, code: &str) -> DomainResult<()>;

    /// Current order status
    async fn get_order_status(&self, order_id: OrderId) -> DomainResult<OrderStatus>;
}
