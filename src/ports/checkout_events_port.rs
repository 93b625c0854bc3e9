use crate::domain::{OrderRejected, OrderSettled, RedirectIssued};

/// Terminal callbacks towards the UI layer
pub trait CheckoutEventsPort: Send + Sync {
    fn on_settled(&self, event: &OrderSettled);

    fn on_redirect_issued(&self, event: &RedirectIssued);

    fn on_rejected(&self, event: &OrderRejected);
}
