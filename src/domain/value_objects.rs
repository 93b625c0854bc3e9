use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Number of decimal places in the currency's minor unit.
pub const MINOR_UNIT_SCALE: u32 = 3;

/// Monetary amount, always held at three decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create from a decimal value, rounding half away from zero.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Create from minor units (`12_500` is `12.500`).
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_UNIT_SCALE))
    }

    /// Amount in minor units.
    pub fn to_minor(&self) -> i64 {
        let mut scaled = self.0;
        scaled.rescale(MINOR_UNIT_SCALE);
        // mantissa of a rescaled money value always fits
        i64::try_from(scaled.mantissa()).unwrap_or(i64::MAX)
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Clamp negative amounts to zero.
    pub fn non_negative(self) -> Self {
        if self.is_negative() { Self::ZERO } else { self }
    }

    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.0 * Decimal::from(quantity))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::new(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::new(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        value.rescale(MINOR_UNIT_SCALE);
        write!(f, "{}", value)
    }
}

/// How a payment method settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    /// Paid on delivery or pickup
    Cash,
    /// Deducted from the in-app wallet
    Wallet,
    /// External card gateway (redirect or stored instrument + one-time code)
    CardGateway,
}

impl PaymentMethodKind {
    /// Map a backend payment tag to its settlement kind. Anything that is not
    /// cash or wallet goes through the card gateway.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "cash" | "cash_on_delivery" => PaymentMethodKind::Cash,
            "wallet" => PaymentMethodKind::Wallet,
            _ => PaymentMethodKind::CardGateway,
        }
    }

    pub fn settles_immediately(&self) -> bool {
        matches!(self, PaymentMethodKind::Cash | PaymentMethodKind::Wallet)
    }
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethodKind::Cash => write!(f, "cash"),
            PaymentMethodKind::Wallet => write!(f, "wallet"),
            PaymentMethodKind::CardGateway => write!(f, "card_gateway"),
        }
    }
}

/// Delivery or pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    #[default]
    Delivery,
    Pickup,
}

impl fmt::Display for FulfillmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillmentMode::Delivery => write!(f, "delivery"),
            FulfillmentMode::Pickup => write!(f, "pickup"),
        }
    }
}

/// Geographic position of a delivery destination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Zero means the map picker never resolved a position.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude != 0.0
            && self.longitude != 0.0
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Backend order status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    New,
    Pending,
    AwaitingPayment,
    Paid,
    Accepted,
    Confirmed,
    Preparing,
    Ready,
    OnTheWay,
    Delivered,
    Completed,
    Cancelled,
    Failed,
    Rejected,
    Other(String),
}

impl OrderStatus {
    /// Payment went through or was deferred to delivery.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::Accepted
                | OrderStatus::Confirmed
                | OrderStatus::Preparing
                | OrderStatus::Ready
                | OrderStatus::OnTheWay
                | OrderStatus::Delivered
                | OrderStatus::Completed
        )
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "new" => OrderStatus::New,
            "pending" => OrderStatus::Pending,
            "awaiting_payment" | "unpaid" => OrderStatus::AwaitingPayment,
            "paid" => OrderStatus::Paid,
            "accepted" => OrderStatus::Accepted,
            "confirmed" => OrderStatus::Confirmed,
            "preparing" | "cooking" => OrderStatus::Preparing,
            "ready" => OrderStatus::Ready,
            "on_the_way" | "shipped" => OrderStatus::OnTheWay,
            "delivered" => OrderStatus::Delivered,
            "completed" => OrderStatus::Completed,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "failed" => OrderStatus::Failed,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Other(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OrderStatus::New => "new",
            OrderStatus::Pending => "pending",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Other(raw) => raw.as_str(),
        };
        write!(f, "{}", text)
    }
}

/// Phase of the order submission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Settled,
    AwaitingRedirect,
    AwaitingChallenge,
    Rejected,
}

impl CheckoutPhase {
    /// Submit must stay disabled in these phases.
    pub fn blocks_submit(&self) -> bool {
        matches!(
            self,
            CheckoutPhase::Validating
                | CheckoutPhase::Submitting
                | CheckoutPhase::AwaitingRedirect
                | CheckoutPhase::AwaitingChallenge
                | CheckoutPhase::Settled
        )
    }
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutPhase::Idle => write!(f, "idle"),
            CheckoutPhase::Validating => write!(f, "validating"),
            CheckoutPhase::Submitting => write!(f, "submitting"),
            CheckoutPhase::Settled => write!(f, "settled"),
            CheckoutPhase::AwaitingRedirect => write!(f, "awaiting_redirect"),
            CheckoutPhase::AwaitingChallenge => write!(f, "awaiting_challenge"),
            CheckoutPhase::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_from_minor() {
        let money = Money::from_minor(12_500);
        assert_eq!(money, Money::new(dec!(12.5)));
        assert_eq!(money.to_minor(), 12_500);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(format!("{}", Money::new(dec!(12.5))), "12.500");
        assert_eq!(format!("{}", Money::new(dec!(1.23456))), "1.235");
        assert_eq!(format!("{}", Money::ZERO), "0.000");
    }

    #[test]
    fn test_money_accepts_number_and_string() {
        let from_number: Money = serde_json::from_str("12.5").unwrap();
        let from_string: Money = serde_json::from_str("\"12.500\"").unwrap();
        assert_eq!(from_number, from_string);
    }

    #[test]
    fn test_money_non_negative() {
        assert_eq!(Money::new(dec!(-1.5)).non_negative(), Money::ZERO);
        assert_eq!(Money::from_minor(1).non_negative(), Money::from_minor(1));
    }

    #[test]
    fn test_payment_kind_from_tag() {
        assert_eq!(PaymentMethodKind::from_tag("cash"), PaymentMethodKind::Cash);
        assert_eq!(PaymentMethodKind::from_tag("Wallet"), PaymentMethodKind::Wallet);
        assert_eq!(
            PaymentMethodKind::from_tag("moyasar"),
            PaymentMethodKind::CardGateway
        );
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates { latitude: 29.37, longitude: 47.97 }.is_valid());
        assert!(!Coordinates { latitude: 0.0, longitude: 0.0 }.is_valid());
        assert!(!Coordinates { latitude: 95.0, longitude: 47.0 }.is_valid());
    }

    #[test]
    fn test_order_status_parsing() {
        assert_eq!(OrderStatus::from("Paid".to_string()), OrderStatus::Paid);
        assert_eq!(
            OrderStatus::from("awaiting-payment".to_string()),
            OrderStatus::AwaitingPayment
        );
        let unknown = OrderStatus::from("on_hold".to_string());
        assert_eq!(unknown, OrderStatus::Other("on_hold".to_string()));
        assert!(!unknown.is_settled());
        assert_eq!(unknown.to_string(), "on_hold");
    }
}
