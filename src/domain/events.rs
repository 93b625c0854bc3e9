use crate::domain::entities::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Domain event trait
pub trait DomainEvent {
    fn event_type(&self) -> &'static str;
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Order settled without leaving the page (cash, wallet, verified one-time code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettled {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub order_id: OrderId,
}

impl DomainEvent for OrderSettled {
    fn event_type(&self) -> &'static str {
        "OrderSettled"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl OrderSettled {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            order_id,
        }
    }
}

/// Pending-order marker written, navigation to the gateway may proceed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectIssued {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub order_id: OrderId,
    pub url: Url,
}

impl DomainEvent for RedirectIssued {
    fn event_type(&self) -> &'static str {
        "RedirectIssued"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl RedirectIssued {
    pub fn new(order_id: OrderId, url: Url) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            order_id,
            url,
        }
    }
}

/// Submission ended without an order the client can settle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejected {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub order_id: Option<OrderId>,
    pub code: String,
    pub reason: String,
}

impl DomainEvent for OrderRejected {
    fn event_type(&self) -> &'static str {
        "OrderRejected"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl OrderRejected {
    pub fn new(order_id: Option<OrderId>, code: &str, reason: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            order_id,
            code: code.to_string(),
            reason,
        }
    }
}
