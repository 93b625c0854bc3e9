use crate::domain::{DomainEvent, OrderRejected, OrderSettled, RedirectIssued};
use crate::ports::CheckoutEventsPort;
use tracing::{info, warn};

/// Event sink for a headless deployment: terminal events go to the log
#[derive(Debug, Clone, Default)]
pub struct TracingCheckoutEvents;

impl CheckoutEventsPort for TracingCheckoutEvents {
    fn on_settled(&self, event: &OrderSettled) {
        info!(
            event_id = %event.event_id,
            order_id = event.order_id,
            "{} at {}",
            event.event_type(),
            event.occurred_at()
        );
    }

    fn on_redirect_issued(&self, event: &RedirectIssued) {
        // gateway URLs may carry session tokens, log the host only
        info!(
            event_id = %event.event_id,
            order_id = event.order_id,
            gateway = event.url.host_str().unwrap_or("unknown"),
            "{} at {}",
            event.event_type(),
            event.occurred_at()
        );
    }

    fn on_rejected(&self, event: &OrderRejected) {
        warn!(
            event_id = %event.event_id,
            order_id = ?event.order_id,
            code = %event.code,
            "{}: {}",
            event.event_type(),
            event.reason
        );
    }
}
