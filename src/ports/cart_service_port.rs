use crate::domain::errors::DomainResult;
use crate::domain::{Cart, CartId, FulfillmentSelection, PriceBreakdown, ShopId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency the order is priced in, with its rate against the shop currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyContext {
    pub currency_id: u64,
    pub rate: Decimal,
}

impl Default for CurrencyContext {
    fn default() -> Self {
        Self {
            currency_id: 1,
            rate: Decimal::ONE,
        }
    }
}

/// Price recalculation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub fulfillment: FulfillmentSelection,
    pub coupon: Option<String>,
    pub currency: CurrencyContext,
}

/// Result of a coupon check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CouponCheck {
    Valid,
    Invalid { message: String },
}

/// Cart service port
#[async_trait]
pub trait CartServicePort: Send + Sync {
    /// Active cart of the authenticated user, `None` when the server no longer has one
    async fn get_active_cart(&self) -> DomainResult<Option<Cart>>;

    /// Authoritative price breakdown for the cart
    async fn recalculate(&self, cart_id: CartId, request: &PriceRequest)
        -> DomainResult<PriceBreakdown>;

    /// Check a coupon code against a shop
    async fn check_coupon(&self, shop_id: ShopId, code: &str) -> DomainResult<CouponCheck>;
}
