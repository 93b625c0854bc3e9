use crate::application::lock;
use crate::domain::errors::{CheckoutError, CheckoutResult};
use crate::domain::{CartId, PriceBreakdown, ShopId};
use crate::ports::{CartServicePort, CouponCheck, PriceRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What happened to a recalculation once it resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Recalculation {
    /// Newest request, its breakdown is now current
    Applied(PriceBreakdown),
    /// A later request was issued while this one was in flight
    Superseded,
}

#[derive(Debug, Default)]
struct CurrentPrice {
    sequence: u64,
    breakdown: Option<PriceBreakdown>,
}

/// Asks the backend for authoritative prices.
///
/// Every request takes the next sequence number; a response is applied only
/// if no newer request was issued meanwhile (last request wins).
pub struct PriceCalculator<C: CartServicePort> {
    cart_service: Arc<C>,
    issued: AtomicU64,
    current: Mutex<CurrentPrice>,
    coupon: Mutex<Option<String>>,
}

impl<C: CartServicePort> PriceCalculator<C> {
    pub fn new(cart_service: Arc<C>) -> Self {
        Self {
            cart_service,
            issued: AtomicU64::new(0),
            current: Mutex::new(CurrentPrice::default()),
            coupon: Mutex::new(None),
        }
    }

    /// Recalculate after a change of address, fulfillment mode or coupon
    pub async fn recalculate(
        &self,
        cart_id: CartId,
        request: PriceRequest,
    ) -> CheckoutResult<Recalculation> {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        // An incomplete selection still invalidates older in-flight requests
        request.fulfillment.validate()?;

        debug!("Recalculating cart {} (request #{})", cart_id, sequence);
        let result = self.cart_service.recalculate(cart_id, &request).await;

        // decided under the lock so a newer breakdown is never overwritten
        let mut current = lock(&self.current);
        if sequence != self.issued.load(Ordering::SeqCst) || sequence < current.sequence {
            debug!("Discarding superseded price request #{}", sequence);
            return Ok(Recalculation::Superseded);
        }

        match result {
            Ok(breakdown) => {
                current.sequence = sequence;
                current.breakdown = Some(breakdown.clone());
                info!(
                    "Price breakdown #{} applied, total {}",
                    sequence, breakdown.grand_total
                );
                Ok(Recalculation::Applied(breakdown))
            }
            Err(e) => {
                warn!("Price recalculation #{} failed: {}", sequence, e);
                let message = e
                    .backend_message()
                    .unwrap_or("price service unavailable")
                    .to_string();
                Err(CheckoutError::Calculation(message))
            }
        }
    }

    /// Latest applied breakdown
    pub fn current(&self) -> Option<PriceBreakdown> {
        lock(&self.current).breakdown.clone()
    }

    /// Check a coupon and keep it if valid. An invalid coupon leaves the
    /// current breakdown and any previously applied coupon untouched.
    pub async fn apply_coupon(&self, shop_id: ShopId, code: &str) -> CheckoutResult<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CheckoutError::InvalidCoupon("Enter a coupon code".to_string()));
        }

        match self.cart_service.check_coupon(shop_id, code).await? {
            CouponCheck::Valid => {
                info!("Coupon {} accepted for shop {}", code, shop_id);
                *lock(&self.coupon) = Some(code.to_string());
                Ok(())
            }
            CouponCheck::Invalid { message } => {
                info!("Coupon {} rejected for shop {}: {}", code, shop_id, message);
                Err(CheckoutError::InvalidCoupon(message))
            }
        }
    }

    pub fn remove_coupon(&self) -> Option<String> {
        lock(&self.coupon).take()
    }

    pub fn applied_coupon(&self) -> Option<String> {
        lock(&self.coupon).clone()
    }

    /// Forget prices and coupon after the order is placed
    pub fn reset(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        *lock(&self.current) = CurrentPrice::default();
        lock(&self.coupon).take();
    }
}
