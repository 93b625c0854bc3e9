use crate::application::lock;
use crate::domain::errors::CheckoutResult;
use crate::domain::{PaymentMethod, PaymentMethodKind, PaymentSelection, StoredInstrument};
use crate::ports::OrderServicePort;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Catalog of enabled payment methods and the user's current selection
pub struct PaymentMethodResolver<O: OrderServicePort> {
    order_service: Arc<O>,
    methods: Mutex<Vec<PaymentMethod>>,
    instruments: Mutex<Vec<StoredInstrument>>,
    selection: Mutex<Option<PaymentSelection>>,
}

impl<O: OrderServicePort> PaymentMethodResolver<O> {
    pub fn new(order_service: Arc<O>) -> Self {
        Self {
            order_service,
            methods: Mutex::new(Vec::new()),
            instruments: Mutex::new(Vec::new()),
            selection: Mutex::new(None),
        }
    }

    pub async fn list_enabled_methods(&self) -> CheckoutResult<Vec<PaymentMethod>> {
        let methods = self.order_service.list_payment_methods().await?;
        debug!("{} payment methods enabled", methods.len());
        *lock(&self.methods) = methods.clone();
        Ok(methods)
    }

    /// Stored instruments of the user. Never fails: a lookup error degrades
    /// to an empty list, i.e. "use new instrument". Expired ones are dropped.
    pub async fn list_stored_instruments(&self) -> Vec<StoredInstrument> {
        let today = Utc::now().date_naive();
        let instruments = match self.order_service.list_stored_instruments().await {
            Ok(instruments) => instruments
                .into_iter()
                .filter(|instrument| !instrument.is_expired(today))
                .collect(),
            Err(e) => {
                warn!("Stored instrument lookup failed, falling back to new card: {}", e);
                Vec::new()
            }
        };
        *lock(&self.instruments) = instruments.clone();
        instruments
    }

    /// Load methods and instruments, then pre-select per the default policy.
    /// An existing selection that is still enabled is kept.
    pub async fn load(&self) -> CheckoutResult<Option<PaymentSelection>> {
        let methods = self.list_enabled_methods().await?;
        let instruments = if methods
            .iter()
            .any(|method| method.kind == PaymentMethodKind::CardGateway)
        {
            self.list_stored_instruments().await
        } else {
            Vec::new()
        };

        let mut selection = lock(&self.selection);
        let still_enabled = selection
            .as_ref()
            .is_some_and(|current| methods.iter().any(|m| m.id == current.method.id));
        if !still_enabled {
            *selection = default_selection(&methods, &instruments);
            if let Some(chosen) = selection.as_ref() {
                info!("Default payment method: {}", chosen.method.tag);
            }
        }
        Ok(selection.clone())
    }

    pub fn select(&self, selection: PaymentSelection) {
        info!("Payment method selected: {}", selection.method.tag);
        *lock(&self.selection) = Some(selection);
    }

    pub fn selection(&self) -> Option<PaymentSelection> {
        lock(&self.selection).clone()
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        lock(&self.methods).clone()
    }

    pub fn instruments(&self) -> Vec<StoredInstrument> {
        lock(&self.instruments).clone()
    }
}

/// First enabled method. For the card gateway, a stored instrument marked
/// default is pre-selected, otherwise a new instrument.
pub fn default_selection(
    methods: &[PaymentMethod],
    instruments: &[StoredInstrument],
) -> Option<PaymentSelection> {
    let method = methods.first()?.clone();
    if method.kind != PaymentMethodKind::CardGateway {
        return Some(PaymentSelection::new(method));
    }

    match instruments.iter().find(|instrument| instrument.is_default) {
        Some(instrument) => Some(PaymentSelection::with_stored(method, instrument.id.clone())),
        None => Some(PaymentSelection::new(method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{FakeOrderService, instrument_fixture};
    use crate::domain::{CardExpiry, InstrumentChoice};

    #[test]
    fn test_default_is_first_method() {
        let methods = vec![PaymentMethod::new(1, "cash"), PaymentMethod::new(2, "tap")];
        let selection = default_selection(&methods, &[]).unwrap();
        assert_eq!(selection.method.tag, "cash");
        assert_eq!(selection.instrument, InstrumentChoice::NewInstrument);
    }

    #[test]
    fn test_default_gateway_prefers_default_instrument() {
        let methods = vec![PaymentMethod::new(2, "tap")];
        let instruments = vec![
            instrument_fixture("card_a", false),
            instrument_fixture("card_b", true),
        ];

        let selection = default_selection(&methods, &instruments).unwrap();

        assert_eq!(selection.stored_reference(), Some("card_b"));
    }

    #[test]
    fn test_default_gateway_without_default_instrument_uses_new() {
        let methods = vec![PaymentMethod::new(2, "tap")];
        let instruments = vec![instrument_fixture("card_a", false)];

        let selection = default_selection(&methods, &instruments).unwrap();

        assert_eq!(selection.instrument, InstrumentChoice::NewInstrument);
    }

    #[test]
    fn test_no_methods_no_selection() {
        assert!(default_selection(&[], &[]).is_none());
    }

    #[tokio::test]
    async fn test_instrument_lookup_failure_degrades_silently() {
        let service = Arc::new(FakeOrderService::default());
        service.set_methods(vec![PaymentMethod::new(2, "tap")]);
        service.fail_instrument_lookup();
        let resolver = PaymentMethodResolver::new(service);

        let selection = resolver.load().await.unwrap().unwrap();

        assert!(resolver.instruments().is_empty());
        assert_eq!(selection.instrument, InstrumentChoice::NewInstrument);
    }

    #[tokio::test]
    async fn test_expired_instruments_are_dropped() {
        let service = Arc::new(FakeOrderService::default());
        let mut expired = instrument_fixture("old", true);
        expired.expiry = Some(CardExpiry { month: 1, year: 2001 });
        service.set_instruments(vec![expired, instrument_fixture("fresh", false)]);
        let resolver = PaymentMethodResolver::new(service);

        let instruments = resolver.list_stored_instruments().await;

        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_load_keeps_enabled_user_choice() {
        let service = Arc::new(FakeOrderService::default());
        service.set_methods(vec![PaymentMethod::new(1, "cash"), PaymentMethod::new(3, "wallet")]);
        let resolver = PaymentMethodResolver::new(service);
        resolver.select(PaymentSelection::new(PaymentMethod::new(3, "wallet")));

        let selection = resolver.load().await.unwrap().unwrap();

        assert_eq!(selection.method.id, 3);
    }
}
