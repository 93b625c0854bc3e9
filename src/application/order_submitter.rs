use crate::application::lock;
use crate::domain::errors::{CheckoutError, CheckoutResult, ValidationError};
use crate::domain::{
    Cart, ChallengeInit, CheckoutPhase, FulfillmentSelection, Money, OrderCreationResult, OrderId,
    PaymentSelection, StoredInstrument,
};
use crate::ports::{CallbackUrls, CreateOrderRequest, CurrencyContext, OrderServicePort};
use chrono::{NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Everything a submission needs, captured when the user presses submit
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub cart: Cart,
    pub fulfillment: FulfillmentSelection,
    pub payment: Option<PaymentSelection>,
    /// Non-expired instruments of the authenticated user
    pub known_instruments: Vec<StoredInstrument>,
    /// Backend subtotal when known, else the local sum
    pub subtotal: Money,
    pub contact_phone: Option<String>,
    pub coupon: Option<String>,
    pub currency: CurrencyContext,
}

/// How an accepted order continues
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementBranch {
    /// Nothing further needed
    Settled,
    /// Browser goes to the gateway (new card, or any response carrying a redirect)
    Redirect(Url),
    /// One-time code against a stored instrument, on this page
    Challenge(ChallengeInit),
    /// No recognizable settlement path
    Unresolved,
}

/// Successful submission result
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Settled { order_id: OrderId },
    AwaitingRedirect { order_id: OrderId, url: Url },
    AwaitingChallenge { order_id: OrderId, init: ChallengeInit },
}

impl SubmitOutcome {
    pub fn order_id(&self) -> OrderId {
        match self {
            SubmitOutcome::Settled { order_id }
            | SubmitOutcome::AwaitingRedirect { order_id, .. }
            | SubmitOutcome::AwaitingChallenge { order_id, .. } => *order_id,
        }
    }
}

/// Check every precondition of a submission, in a fixed order. Pure: the
/// same draft always produces the same answer.
pub fn validate_draft(draft: &OrderDraft, today: NaiveDate) -> Result<(), ValidationError> {
    draft.fulfillment.validate()?;

    let payment = draft
        .payment
        .as_ref()
        .ok_or(ValidationError::MissingPaymentMethod)?;

    if payment.uses_stored_instrument() {
        let reference = payment
            .stored_reference()
            .filter(|reference| !reference.trim().is_empty())
            .ok_or(ValidationError::MissingStoredInstrument)?;
        let usable = draft
            .known_instruments
            .iter()
            .any(|instrument| instrument.id == reference && !instrument.is_expired(today));
        if !usable {
            return Err(ValidationError::UnavailableStoredInstrument);
        }
    }

    let minimum = draft.cart.shop.minimum_order;
    if draft.subtotal < minimum {
        return Err(ValidationError::BelowMinimumOrder {
            minimum,
            subtotal: draft.subtotal,
        });
    }

    match draft.contact_phone.as_deref() {
        Some(phone) if !phone.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::MissingPhone),
    }
}

/// Pick exactly one settlement branch for an order-creation response.
///
/// A redirect beats a challenge when both are present.
pub fn resolve_branch(payment: &PaymentSelection, result: &OrderCreationResult) -> SettlementBranch {
    if payment.method.kind.settles_immediately() {
        return SettlementBranch::Settled;
    }

    let challenge = result
        .challenge
        .as_ref()
        .filter(|challenge| challenge.url.is_some() || challenge.token.is_some());

    match (&result.redirect_url, challenge) {
        (Some(url), Some(_)) => {
            warn!(
                "Order {} returned both a redirect and a challenge, following the redirect",
                result.order_id
            );
            SettlementBranch::Redirect(url.clone())
        }
        (Some(url), None) => {
            if payment.uses_stored_instrument() {
                debug!("Gateway redirected a stored-instrument payment");
            }
            SettlementBranch::Redirect(url.clone())
        }
        (None, Some(challenge)) if payment.uses_stored_instrument() => {
            SettlementBranch::Challenge(challenge.clone())
        }
        _ => SettlementBranch::Unresolved,
    }
}

/// Order submission state machine.
///
/// `Idle -> Validating -> Submitting -> {Settled, AwaitingRedirect, AwaitingChallenge, Rejected}`.
/// Validation and request failures return to `Idle`.
pub struct OrderSubmitter<O: OrderServicePort> {
    order_service: Arc<O>,
    callbacks: CallbackUrls,
    phase: Mutex<CheckoutPhase>,
}

impl<O: OrderServicePort> OrderSubmitter<O> {
    pub fn new(order_service: Arc<O>, callbacks: CallbackUrls) -> Self {
        Self {
            order_service,
            callbacks,
            phase: Mutex::new(CheckoutPhase::Idle),
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        *lock(&self.phase)
    }

    pub(crate) fn transition(&self, phase: CheckoutPhase) {
        let mut current = lock(&self.phase);
        debug!("Checkout phase {} -> {}", *current, phase);
        *current = phase;
    }

    /// Run one user-initiated submission. Issues at most one order-creation request.
    pub async fn submit(&self, draft: OrderDraft) -> CheckoutResult<SubmitOutcome> {
        {
            let mut phase = lock(&self.phase);
            match *phase {
                CheckoutPhase::Settled => {
                    return Err(CheckoutError::InvalidPhase(phase.to_string()));
                }
                current if current.blocks_submit() => {
                    warn!("Submit ignored while {}", current);
                    return Err(CheckoutError::SubmissionInProgress);
                }
                _ => *phase = CheckoutPhase::Validating,
            }
        }

        // 1. Local preconditions, no network
        if let Err(e) = validate_draft(&draft, Utc::now().date_naive()) {
            info!("Order validation failed: {}", e);
            self.transition(CheckoutPhase::Idle);
            return Err(e.into());
        }
        let Some(payment) = draft.payment.clone() else {
            self.transition(CheckoutPhase::Idle);
            return Err(ValidationError::MissingPaymentMethod.into());
        };

        // 2. Create the order
        self.transition(CheckoutPhase::Submitting);
        let request = CreateOrderRequest {
            idempotency_key: Uuid::new_v4(),
            cart_id: draft.cart.id,
            fulfillment: draft.fulfillment,
            currency: draft.currency,
            coupon: draft.coupon,
            payment_method_id: payment.method.id,
            stored_instrument: payment.stored_reference().map(String::from),
            contact_phone: draft.contact_phone.unwrap_or_default(),
            callbacks: self.callbacks.clone(),
        };
        info!(
            "Submitting order for cart {} with {} (key {})",
            request.cart_id, payment.method.tag, request.idempotency_key
        );

        let result = match self.order_service.create_order(&request).await {
            Ok(result) => result,
            Err(e) => {
                error!("Order creation failed: {}", e);
                self.transition(CheckoutPhase::Idle);
                return Err(CheckoutError::submission(&e));
            }
        };

        // 3. Choose the settlement branch
        let order_id = result.order_id;
        let outcome = match resolve_branch(&payment, &result) {
            SettlementBranch::Settled => {
                self.transition(CheckoutPhase::Settled);
                SubmitOutcome::Settled { order_id }
            }
            SettlementBranch::Redirect(url) => {
                self.transition(CheckoutPhase::AwaitingRedirect);
                SubmitOutcome::AwaitingRedirect { order_id, url }
            }
            SettlementBranch::Challenge(init) => {
                self.transition(CheckoutPhase::AwaitingChallenge);
                SubmitOutcome::AwaitingChallenge { order_id, init }
            }
            SettlementBranch::Unresolved => {
                error!(
                    "Order {} ({}) came back without a settlement path for {}",
                    order_id, result.status, payment.method.kind
                );
                self.transition(CheckoutPhase::Rejected);
                return Err(CheckoutError::ContractViolation { order_id });
            }
        };

        info!("Order {} created, next: {:?}", order_id, self.phase());
        Ok(outcome)
    }
}
