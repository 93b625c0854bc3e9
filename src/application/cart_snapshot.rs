use crate::application::lock;
use crate::domain::errors::{CheckoutError, CheckoutResult};
use crate::domain::Cart;
use crate::ports::CartServicePort;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Server-authoritative view of the user's active cart.
///
/// The cached copy is only a hint for the UI. It is replaced on every fetch
/// and dropped as soon as the server says the cart is gone.
pub struct CartSnapshot<C: CartServicePort> {
    cart_service: Arc<C>,
    cached: Mutex<Option<Cart>>,
}

impl<C: CartServicePort> CartSnapshot<C> {
    pub fn new(cart_service: Arc<C>) -> Self {
        Self {
            cart_service,
            cached: Mutex::new(None),
        }
    }

    /// Re-read the active cart from the server
    pub async fn fetch_active(&self) -> CheckoutResult<Cart> {
        match self.cart_service.get_active_cart().await? {
            Some(cart) if !cart.is_empty() => {
                info!("Active cart {} loaded for shop {}", cart.id, cart.shop.id);
                *lock(&self.cached) = Some(cart.clone());
                Ok(cart)
            }
            _ => {
                warn!("Active cart no longer exists, discarding cached copy");
                self.clear();
                Err(CheckoutError::StaleCart)
            }
        }
    }

    pub fn cached(&self) -> Option<Cart> {
        lock(&self.cached).clone()
    }

    /// Drop the local copy (order placed or cart gone)
    pub fn clear(&self) {
        lock(&self.cached).take();
    }
}
