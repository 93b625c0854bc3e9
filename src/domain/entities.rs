use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{
    Coordinates, FulfillmentMode, Money, OrderStatus, PaymentMethodKind,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub type CartId = u64;
pub type ShopId = u64;
pub type OrderId = u64;

/// Shop the cart belongs to, with its ordering threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopSummary {
    pub id: ShopId,
    pub minimum_order: Money,
}

/// Optional extra attached to a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartAddon {
    pub stock_id: u64,
    pub quantity: u32,
    pub unit_price: Money,
}

/// One purchasable stock/variant in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub stock_id: u64,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub addons: Vec<CartAddon>,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        let addons: Money = self
            .addons
            .iter()
            .map(|addon| addon.unit_price.times(addon.quantity))
            .sum();
        self.unit_price.times(self.quantity) + addons
    }
}

/// Server-side cart, owned by exactly one shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub shop: ShopSummary,
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Locally summed subtotal. Good for optimistic display and the
    /// minimum-order precheck, never for submission.
    pub fn local_subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Where a delivery goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address_id: Option<u64>,
    #[serde(default)]
    pub label: String,
    pub coordinates: Coordinates,
}

/// Requested delivery date and time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySchedule {
    pub date: NaiveDate,
    pub window: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FulfillmentSelection {
    pub mode: FulfillmentMode,
    pub destination: Option<Destination>,
    pub schedule: Option<DeliverySchedule>,
}

impl FulfillmentSelection {
    pub fn pickup() -> Self {
        Self {
            mode: FulfillmentMode::Pickup,
            destination: None,
            schedule: None,
        }
    }

    pub fn delivery(destination: Destination) -> Self {
        Self {
            mode: FulfillmentMode::Delivery,
            destination: Some(destination),
            schedule: None,
        }
    }

    /// Delivery needs a destination with a resolved position.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            FulfillmentMode::Pickup => Ok(()),
            FulfillmentMode::Delivery => {
                let destination = self
                    .destination
                    .as_ref()
                    .ok_or(ValidationError::MissingDestination)?;
                if destination.coordinates.is_valid() {
                    Ok(())
                } else {
                    Err(ValidationError::InvalidCoordinates)
                }
            }
        }
    }
}

/// Authoritative price breakdown as recomputed by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub service_fee: Money,
    pub tax: Money,
    pub discount: Money,
    pub coupon_discount: Money,
    pub grand_total: Money,
}

/// An enabled payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: u64,
    pub tag: String,
    pub kind: PaymentMethodKind,
}

impl PaymentMethod {
    pub fn new(id: u64, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let kind = PaymentMethodKind::from_tag(&tag);
        Self { id, tag, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardExpiry {
    pub month: u32,
    pub year: i32,
}

impl CardExpiry {
    /// Cards stay valid through the last day of their expiry month.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        (today.year(), today.month()) > (self.year, self.month)
    }
}

/// Payment credential held by the gateway on the user's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInstrument {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub expiry: Option<CardExpiry>,
    #[serde(default)]
    pub is_default: bool,
}

impl StoredInstrument {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry.is_some_and(|expiry| expiry.is_expired(today))
    }
}

/// New card entry at the gateway, or a stored instrument.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "use", rename_all = "snake_case")]
pub enum InstrumentChoice {
    #[default]
    NewInstrument,
    Stored { reference: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSelection {
    pub method: PaymentMethod,
    #[serde(default)]
    pub instrument: InstrumentChoice,
}

impl PaymentSelection {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            instrument: InstrumentChoice::NewInstrument,
        }
    }

    pub fn with_stored(method: PaymentMethod, reference: impl Into<String>) -> Self {
        Self {
            method,
            instrument: InstrumentChoice::Stored {
                reference: Some(reference.into()),
            },
        }
    }

    pub fn uses_stored_instrument(&self) -> bool {
        self.method.kind == PaymentMethodKind::CardGateway
            && matches!(self.instrument, InstrumentChoice::Stored { .. })
    }

    /// Stored-instrument reference sent with the order, if any.
    pub fn stored_reference(&self) -> Option<&str> {
        match (&self.method.kind, &self.instrument) {
            (PaymentMethodKind::CardGateway, InstrumentChoice::Stored { reference }) => {
                reference.as_deref()
            }
            _ => None,
        }
    }
}

/// What the gateway needs to authorize a stored-instrument payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInit {
    pub url: Option<Url>,
    pub token: Option<String>,
    pub channel: Option<String>,
}

/// Normalized order-creation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreationResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub redirect_url: Option<Url>,
    pub challenge: Option<ChallengeInit>,
}

/// Durable record of an order handed off to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrderMarker {
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
}

impl PendingOrderMarker {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            created_at: Utc::now(),
        }
    }

    /// Markers older than `ttl` belong to an abandoned checkout.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// An open one-time-code challenge. The code lives only as long as the
/// challenge and is never persisted or logged.
#[derive(Clone, PartialEq)]
pub struct OtpChallenge {
    pub order_id: OrderId,
    pub channel: Option<String>,
    pub challenge_url: Option<Url>,
    pub token: Option<String>,
    code: Option<String>,
    verifying: bool,
    pub last_error: Option<String>,
}

impl OtpChallenge {
    pub fn new(order_id: OrderId, init: ChallengeInit) -> Self {
        Self {
            order_id,
            channel: init.channel,
            challenge_url: init.url,
            token: init.token,
            code: None,
            verifying: false,
            last_error: None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn enter_code(&mut self, code: impl Into<String>) {
        self.code = Some(code.into());
    }

    /// A submitted code has not been answered yet
    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn begin_verification(&mut self) {
        self.verifying = true;
        self.last_error = None;
    }

    pub fn fail_verification(&mut self, message: impl Into<String>) {
        self.verifying = false;
        self.last_error = Some(message.into());
    }
}

impl fmt::Debug for OtpChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpChallenge")
            .field("order_id", &self.order_id)
            .field("channel", &self.channel)
            .field("challenge_url", &self.challenge_url)
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .field("verifying", &self.verifying)
            .field("last_error", &self.last_error)
            .finish()
    }
}
