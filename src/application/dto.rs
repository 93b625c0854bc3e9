use crate::domain::errors::CheckoutError;
use crate::domain::{
    Cart, CheckoutPhase, DeliverySchedule, Destination, FulfillmentMode, FulfillmentSelection,
    InstrumentChoice, Money, OrderId, OtpChallenge, PaymentMethod, PaymentSelection,
    PriceBreakdown, StoredInstrument,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Error attached to the checkout view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub code: String,
    pub message: String,
}

impl ErrorView {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<&CheckoutError> for ErrorView {
    fn from(error: &CheckoutError) -> Self {
        Self::new(error.code(), error.user_message())
    }
}

/// Open one-time-code modal
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeView {
    pub order_id: OrderId,
    pub channel: Option<String>,
    /// Code is forwarded to the gateway page instead of verified in place
    pub completes_at_gateway: bool,
    /// What the user typed last, kept after a rejected attempt
    pub entered_code: Option<String>,
    pub error: Option<String>,
}

impl From<&OtpChallenge> for ChallengeView {
    fn from(challenge: &OtpChallenge) -> Self {
        Self {
            order_id: challenge.order_id,
            channel: challenge.channel.clone(),
            completes_at_gateway: challenge.challenge_url.is_some(),
            entered_code: challenge.code().map(String::from),
            error: challenge.last_error.clone(),
        }
    }
}

/// Where the UI has to send the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteHint {
    /// Cart is gone, back to cart building
    Cart,
    /// Order placed, show the confirmation
    Confirmation,
}

/// Snapshot of the checkout flow for the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub phase: CheckoutPhase,
    pub cart: Option<Cart>,
    /// Optimistic display only
    pub local_subtotal: Option<Money>,
    pub breakdown: Option<PriceBreakdown>,
    pub coupon: Option<String>,
    pub fulfillment: FulfillmentSelection,
    pub payment: Option<PaymentSelection>,
    pub payment_methods: Vec<PaymentMethod>,
    pub stored_instruments: Vec<StoredInstrument>,
    pub contact_phone: Option<String>,
    pub error: Option<ErrorView>,
    pub challenge: Option<ChallengeView>,
    pub settled_order: Option<OrderId>,
    pub route: Option<RouteHint>,
}

/// Submit response
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub phase: CheckoutPhase,
    pub order_id: OrderId,
    /// Where the browser goes next, if it leaves the page
    pub redirect_url: Option<Url>,
    pub challenge: Option<ChallengeView>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFulfillmentRequest {
    pub mode: FulfillmentMode,
    pub destination: Option<Destination>,
    pub schedule: Option<DeliverySchedule>,
}

impl From<UpdateFulfillmentRequest> for FulfillmentSelection {
    fn from(request: UpdateFulfillmentRequest) -> Self {
        Self {
            mode: request.mode,
            destination: request.destination,
            schedule: request.schedule,
        }
    }
}

/// Payment choice by method id, resolved against the enabled methods
#[derive(Debug, Deserialize)]
pub struct SelectPaymentRequest {
    pub method_id: u64,
    #[serde(default)]
    pub instrument: InstrumentChoice,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactPhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub code: String,
}

/// Query string of the gateway callback routes
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub order_id: Option<OrderId>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: String, message: String) -> Self {
        Self { error, message }
    }
}

impl From<&CheckoutError> for ErrorResponse {
    fn from(error: &CheckoutError) -> Self {
        Self::new(error.code().to_string(), error.user_message())
    }
}
