use crate::application::cart_snapshot::CartSnapshot;
use crate::application::dto::{ChallengeView, CheckoutView, ErrorView, RouteHint};
use crate::application::lock;
use crate::application::order_submitter::{OrderDraft, OrderSubmitter, SubmitOutcome};
use crate::application::payment_method_resolver::PaymentMethodResolver;
use crate::application::price_calculator::{PriceCalculator, Recalculation};
use crate::application::settlement_resumer::{
    CallbackKind, ChallengeOutcome, Reconciliation, SettlementResumer, SettlementVerdict,
};
use crate::domain::errors::{CheckoutError, CheckoutResult, ValidationError};
use crate::domain::{
    Cart, CheckoutPhase, Destination, FulfillmentSelection, InstrumentChoice, OrderId,
    OrderRejected, OrderSettled, PaymentSelection, PriceBreakdown, RedirectIssued,
};
use crate::ports::{
    CallbackUrls, CartServicePort, CheckoutEventsPort, CurrencyContext, OrderServicePort,
    PendingOrderStorePort, PriceRequest,
};
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const PAYMENT_NOT_COMPLETED: &str = "Payment was not completed";

/// Static inputs of a checkout flow
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: CurrencyContext,
    pub callbacks: CallbackUrls,
    pub pending_order_ttl: Duration,
}

/// Fields written by the checkout flow itself or the address collaborator
#[derive(Debug, Default)]
struct FlowState {
    fulfillment: FulfillmentSelection,
    contact_phone: Option<String>,
    last_error: Option<ErrorView>,
    settled_order: Option<OrderId>,
    route: Option<RouteHint>,
}

/// Checkout orchestration for one browser tab.
///
/// Owns the shared state and its write rules: the cart is written only by
/// [`CartSnapshot`] and settlement, prices only by [`PriceCalculator`], the
/// destination only through [`CheckoutService::update_destination`].
pub struct CheckoutService<C, O, S>
where
    C: CartServicePort,
    O: OrderServicePort,
    S: PendingOrderStorePort,
{
    cart: CartSnapshot<C>,
    pricing: PriceCalculator<C>,
    payments: PaymentMethodResolver<O>,
    submitter: OrderSubmitter<O>,
    resumer: SettlementResumer<O, S>,
    events: Arc<dyn CheckoutEventsPort>,
    currency: CurrencyContext,
    state: Mutex<FlowState>,
}

impl<C, O, S> CheckoutService<C, O, S>
where
    C: CartServicePort,
    O: OrderServicePort,
    S: PendingOrderStorePort,
{
    pub fn new(
        cart_service: Arc<C>,
        order_service: Arc<O>,
        store: Arc<S>,
        events: Arc<dyn CheckoutEventsPort>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            cart: CartSnapshot::new(cart_service.clone()),
            pricing: PriceCalculator::new(cart_service),
            payments: PaymentMethodResolver::new(order_service.clone()),
            submitter: OrderSubmitter::new(order_service.clone(), settings.callbacks),
            resumer: SettlementResumer::new(order_service, store, settings.pending_order_ttl),
            events,
            currency: settings.currency,
            state: Mutex::new(FlowState::default()),
        }
    }

    /// Enter checkout: revalidate the cart, load payment methods, price it
    pub async fn start(&self) -> CheckoutResult<CheckoutView> {
        let cart = self.cart.fetch_active().await.map_err(|e| self.record(e))?;
        {
            let mut state = lock(&self.state);
            state.route = None;
            state.settled_order = None;
            state.last_error = None;
        }
        if matches!(
            self.submitter.phase(),
            CheckoutPhase::Settled | CheckoutPhase::Rejected
        ) {
            self.submitter.transition(CheckoutPhase::Idle);
        }
        info!("Checkout started for cart {}", cart.id);

        self.payments.load().await.map_err(|e| self.record(e))?;

        if self.fulfillment().validate().is_ok() {
            match self.refresh_price().await {
                // a failed calculation leaves the previous breakdown in place
                Ok(_) | Err(CheckoutError::Calculation(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.view())
    }

    /// Ask the backend for a fresh breakdown. `None` when a newer request
    /// overtook this one.
    pub async fn refresh_price(&self) -> CheckoutResult<Option<PriceBreakdown>> {
        let cart = self.loaded_cart()?;
        let request = PriceRequest {
            fulfillment: self.fulfillment(),
            coupon: self.pricing.applied_coupon(),
            currency: self.currency,
        };
        match self.pricing.recalculate(cart.id, request).await {
            Ok(Recalculation::Applied(breakdown)) => {
                self.clear_error();
                Ok(Some(breakdown))
            }
            Ok(Recalculation::Superseded) => Ok(None),
            Err(e) => Err(self.record(e)),
        }
    }

    /// Replace the whole fulfillment selection and reprice
    pub async fn update_fulfillment(
        &self,
        selection: FulfillmentSelection,
    ) -> CheckoutResult<Option<PriceBreakdown>> {
        info!("Fulfillment set to {}", selection.mode);
        lock(&self.state).fulfillment = selection;
        self.refresh_price().await
    }

    /// Entry point for the address collaborator
    pub async fn update_destination(
        &self,
        destination: Option<Destination>,
    ) -> CheckoutResult<Option<PriceBreakdown>> {
        lock(&self.state).fulfillment.destination = destination;
        self.refresh_price().await
    }

    pub async fn apply_coupon(&self, code: &str) -> CheckoutResult<Option<PriceBreakdown>> {
        let cart = self.loaded_cart()?;
        self.pricing
            .apply_coupon(cart.shop.id, code)
            .await
            .map_err(|e| self.record(e))?;
        self.refresh_price().await
    }

    pub async fn remove_coupon(&self) -> CheckoutResult<Option<PriceBreakdown>> {
        if let Some(code) = self.pricing.remove_coupon() {
            info!("Coupon {} removed", code);
        }
        self.refresh_price().await
    }

    pub fn select_payment(&self, selection: PaymentSelection) -> CheckoutResult<()> {
        let methods = self.payments.methods();
        if !methods.is_empty() && !methods.iter().any(|m| m.id == selection.method.id) {
            warn!("Payment method {} is not enabled", selection.method.id);
            return Err(self.record(ValidationError::MissingPaymentMethod.into()));
        }
        self.payments.select(selection);
        self.clear_error();
        Ok(())
    }

    /// Select one of the enabled methods by id
    pub fn select_payment_method(
        &self,
        method_id: u64,
        instrument: InstrumentChoice,
    ) -> CheckoutResult<()> {
        let method = self
            .payments
            .methods()
            .into_iter()
            .find(|method| method.id == method_id)
            .ok_or_else(|| self.record(ValidationError::MissingPaymentMethod.into()))?;
        self.select_payment(PaymentSelection { method, instrument })
    }

    pub fn set_contact_phone(&self, phone: impl Into<String>) {
        let phone = phone.into();
        lock(&self.state).contact_phone = Some(phone.trim().to_string());
    }

    /// Place the order. Cart, address and payment selection survive a failure.
    pub async fn submit(&self) -> CheckoutResult<SubmitOutcome> {
        let cart = self.loaded_cart()?;
        let draft = {
            let state = lock(&self.state);
            OrderDraft {
                subtotal: self
                    .pricing
                    .current()
                    .map(|breakdown| breakdown.subtotal)
                    .unwrap_or_else(|| cart.local_subtotal()),
                cart,
                fulfillment: state.fulfillment.clone(),
                payment: self.payments.selection(),
                known_instruments: self.payments.instruments(),
                contact_phone: state.contact_phone.clone(),
                coupon: self.pricing.applied_coupon(),
                currency: self.currency,
            }
        };

        match self.submitter.submit(draft).await {
            Ok(SubmitOutcome::Settled { order_id }) => {
                self.settle(order_id);
                Ok(SubmitOutcome::Settled { order_id })
            }
            Ok(SubmitOutcome::AwaitingRedirect { order_id, url }) => {
                // the marker goes to storage before anyone may navigate
                match self.resumer.prepare_redirect(order_id, url) {
                    Ok(url) => {
                        self.clear_error();
                        self.events
                            .on_redirect_issued(&RedirectIssued::new(order_id, url.clone()));
                        Ok(SubmitOutcome::AwaitingRedirect { order_id, url })
                    }
                    Err(e) => {
                        self.submitter.transition(CheckoutPhase::Idle);
                        Err(self.reject(Some(order_id), e))
                    }
                }
            }
            Ok(SubmitOutcome::AwaitingChallenge { order_id, init }) => {
                self.resumer.open_challenge(order_id, init.clone());
                self.clear_error();
                Ok(SubmitOutcome::AwaitingChallenge { order_id, init })
            }
            Err(e @ CheckoutError::ContractViolation { order_id }) => {
                Err(self.reject(Some(order_id), e))
            }
            Err(e @ (CheckoutError::Submission(_) | CheckoutError::Fault(_))) => {
                Err(self.reject(None, e))
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Submit the one-time code of the open challenge
    pub async fn submit_challenge_code(&self, code: &str) -> CheckoutResult<ChallengeOutcome> {
        match self.resumer.submit_code(code).await {
            Ok(ChallengeOutcome::Verified { order_id }) => {
                self.submitter.transition(CheckoutPhase::Settled);
                self.settle(order_id);
                Ok(ChallengeOutcome::Verified { order_id })
            }
            Ok(ChallengeOutcome::Navigate { order_id, url }) => {
                self.submitter.transition(CheckoutPhase::AwaitingRedirect);
                self.clear_error();
                self.events
                    .on_redirect_issued(&RedirectIssued::new(order_id, url.clone()));
                Ok(ChallengeOutcome::Navigate { order_id, url })
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Close the challenge without telling the backend. The order stays
    /// in whatever state the backend left it.
    pub fn cancel_challenge(&self) -> CheckoutResult<OrderId> {
        let order_id = self.resumer.cancel_challenge().map_err(|e| self.record(e))?;
        self.submitter.transition(CheckoutPhase::Idle);
        self.clear_error();
        Ok(order_id)
    }

    /// Run on the gateway callback routes before rendering anything order-specific
    pub async fn reconcile(
        &self,
        kind: CallbackKind,
        order_hint: Option<OrderId>,
    ) -> CheckoutResult<Reconciliation> {
        let reconciliation = self
            .resumer
            .reconcile(kind, order_hint)
            .await
            .map_err(|e| self.record(e))?;

        // only an order this checkout sent to the gateway may settle it
        let owned = reconciliation.resumed
            || self.submitter.phase() == CheckoutPhase::AwaitingRedirect;
        if !owned {
            info!(
                "Order {:?} reconciled as {:?} without a pending checkout, local state kept",
                reconciliation.order_id, reconciliation.verdict
            );
            return Ok(reconciliation);
        }

        match (reconciliation.verdict, reconciliation.order_id) {
            (SettlementVerdict::Succeeded, Some(order_id)) => {
                self.submitter.transition(CheckoutPhase::Settled);
                self.settle(order_id);
            }
            (SettlementVerdict::Failed, _) => {
                self.submitter.transition(CheckoutPhase::Idle);
                lock(&self.state).last_error =
                    Some(ErrorView::new("PAYMENT_NOT_COMPLETED", PAYMENT_NOT_COMPLETED));
            }
            _ => {
                if self.submitter.phase() == CheckoutPhase::AwaitingRedirect {
                    self.submitter.transition(CheckoutPhase::Idle);
                }
            }
        }
        Ok(reconciliation)
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.submitter.phase()
    }

    pub fn breakdown(&self) -> Option<PriceBreakdown> {
        self.pricing.current()
    }

    pub fn view(&self) -> CheckoutView {
        let cart = self.cart.cached();
        let state = lock(&self.state);
        CheckoutView {
            phase: self.submitter.phase(),
            local_subtotal: cart.as_ref().map(|cart| cart.local_subtotal()),
            cart,
            breakdown: self.pricing.current(),
            coupon: self.pricing.applied_coupon(),
            fulfillment: state.fulfillment.clone(),
            payment: self.payments.selection(),
            payment_methods: self.payments.methods(),
            stored_instruments: self.payments.instruments(),
            contact_phone: state.contact_phone.clone(),
            error: state.last_error.clone(),
            challenge: self.resumer.challenge().as_ref().map(ChallengeView::from),
            settled_order: state.settled_order,
            route: state.route,
        }
    }

    fn fulfillment(&self) -> FulfillmentSelection {
        lock(&self.state).fulfillment.clone()
    }

    fn loaded_cart(&self) -> CheckoutResult<Cart> {
        self.cart.cached().ok_or_else(|| {
            let stale = lock(&self.state).route == Some(RouteHint::Cart);
            if stale {
                CheckoutError::StaleCart
            } else {
                CheckoutError::InvalidPhase("not started".to_string())
            }
        })
    }

    /// Clear the cart and show the confirmation
    fn settle(&self, order_id: OrderId) {
        self.cart.clear();
        self.pricing.reset();
        {
            let mut state = lock(&self.state);
            state.last_error = None;
            state.settled_order = Some(order_id);
            state.route = Some(RouteHint::Confirmation);
        }
        info!("Order {} settled", order_id);
        self.events.on_settled(&OrderSettled::new(order_id));
    }

    /// Attach the error to the view
    fn record(&self, error: CheckoutError) -> CheckoutError {
        let mut state = lock(&self.state);
        if matches!(error, CheckoutError::StaleCart) {
            state.route = Some(RouteHint::Cart);
        }
        state.last_error = Some(ErrorView::from(&error));
        error
    }

    /// Attach the error and tell the UI the attempt ended
    fn reject(&self, order_id: Option<OrderId>, error: CheckoutError) -> CheckoutError {
        let error = self.record(error);
        self.events.on_rejected(&OrderRejected::new(
            order_id,
            error.code(),
            error.user_message(),
        ));
        error
    }

    fn clear_error(&self) {
        lock(&self.state).last_error = None;
    }
}
