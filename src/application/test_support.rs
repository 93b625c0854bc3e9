use crate::application::lock;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{
    Cart, CartId, CartLine, ChallengeInit, Coordinates, Destination, Money, OrderCreationResult,
    OrderId, OrderRejected, OrderSettled, OrderStatus, PaymentMethod, PendingOrderMarker,
    PriceBreakdown, RedirectIssued, ShopId, ShopSummary, StoredInstrument, CardExpiry,
};
use crate::ports::{
    CallbackUrls, CartServicePort, CheckoutEventsPort, CouponCheck, CreateOrderRequest,
    OrderServicePort, PendingOrderStorePort, PriceRequest,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use url::Url;

pub(crate) type CreateResponse = Result<OrderCreationResult, (u16, Option<String>)>;
pub(crate) type PriceReply = oneshot::Sender<Result<PriceBreakdown, String>>;

fn backend_error(message: String) -> DomainError {
    DomainError::Backend {
        status: 502,
        message: Some(message),
    }
}

pub(crate) fn cart_fixture(subtotal_minor: i64, minimum_minor: i64) -> Cart {
    Cart {
        id: 1,
        shop: ShopSummary {
            id: 7,
            minimum_order: Money::from_minor(minimum_minor),
        },
        lines: vec![CartLine {
            stock_id: 11,
            quantity: 1,
            unit_price: Money::from_minor(subtotal_minor),
            addons: vec![],
        }],
    }
}

pub(crate) fn home_destination() -> Destination {
    Destination {
        address_id: Some(21),
        label: "Home".to_string(),
        coordinates: Coordinates {
            latitude: 29.3759,
            longitude: 47.9774,
        },
    }
}

pub(crate) fn breakdown_fixture(subtotal_minor: i64, delivery_minor: i64) -> PriceBreakdown {
    PriceBreakdown {
        subtotal: Money::from_minor(subtotal_minor),
        delivery_fee: Money::from_minor(delivery_minor),
        grand_total: Money::from_minor(subtotal_minor + delivery_minor),
        ..PriceBreakdown::default()
    }
}

pub(crate) fn instrument_fixture(id: &str, is_default: bool) -> StoredInstrument {
    StoredInstrument {
        id: id.to_string(),
        label: format!("Visa {}", id),
        expiry: Some(CardExpiry {
            month: 12,
            year: 2099,
        }),
        is_default,
    }
}

pub(crate) fn creation_result(
    order_id: OrderId,
    redirect: Option<&str>,
    challenge_url: Option<&str>,
) -> OrderCreationResult {
    OrderCreationResult {
        order_id,
        status: OrderStatus::Pending,
        redirect_url: redirect.map(|raw| Url::parse(raw).unwrap()),
        challenge: challenge_url.map(|raw| ChallengeInit {
            url: Some(Url::parse(raw).unwrap()),
            token: None,
            channel: Some("sms".to_string()),
        }),
    }
}

pub(crate) fn callbacks_fixture() -> CallbackUrls {
    CallbackUrls {
        success: Url::parse("http://localhost:3000/payment/success").unwrap(),
        failure: Url::parse("http://localhost:3000/payment/failure").unwrap(),
        callback: Url::parse("http://localhost:3000/payment/callback").unwrap(),
    }
}

/// Shared ordered log, to assert what happened before what
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: String) {
        lock(&self.0).push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

#[derive(Debug)]
pub(crate) struct FakeCartService {
    cart: Mutex<Option<Cart>>,
    breakdown: Mutex<Result<PriceBreakdown, String>>,
    coupon: Mutex<CouponCheck>,
    cart_calls: Mutex<usize>,
    recalculations: Mutex<Vec<PriceRequest>>,
    coupon_calls: Mutex<usize>,
}

impl Default for FakeCartService {
    fn default() -> Self {
        Self {
            cart: Mutex::new(None),
            breakdown: Mutex::new(Ok(breakdown_fixture(12_500, 1_500))),
            coupon: Mutex::new(CouponCheck::Valid),
            cart_calls: Mutex::new(0),
            recalculations: Mutex::new(Vec::new()),
            coupon_calls: Mutex::new(0),
        }
    }
}

impl FakeCartService {
    pub(crate) fn with_cart(cart: Cart) -> Self {
        let service = Self::default();
        *lock(&service.cart) = Some(cart);
        service
    }

    pub(crate) fn remove_cart(&self) {
        lock(&self.cart).take();
    }

    pub(crate) fn set_breakdown(&self, breakdown: Result<PriceBreakdown, String>) {
        *lock(&self.breakdown) = breakdown;
    }

    pub(crate) fn set_coupon(&self, check: CouponCheck) {
        *lock(&self.coupon) = check;
    }

    pub(crate) fn cart_calls(&self) -> usize {
        *lock(&self.cart_calls)
    }

    pub(crate) fn recalculate_calls(&self) -> usize {
        lock(&self.recalculations).len()
    }

    pub(crate) fn last_price_request(&self) -> Option<PriceRequest> {
        lock(&self.recalculations).last().cloned()
    }

    pub(crate) fn coupon_calls(&self) -> usize {
        *lock(&self.coupon_calls)
    }
}

#[async_trait]
impl CartServicePort for FakeCartService {
    async fn get_active_cart(&self) -> DomainResult<Option<Cart>> {
        *lock(&self.cart_calls) += 1;
        Ok(lock(&self.cart).clone())
    }

    async fn recalculate(
        &self,
        _cart_id: CartId,
        request: &PriceRequest,
    ) -> DomainResult<PriceBreakdown> {
        lock(&self.recalculations).push(request.clone());
        lock(&self.breakdown).clone().map_err(backend_error)
    }

    async fn check_coupon(&self, _shop_id: ShopId, _code: &str) -> DomainResult<CouponCheck> {
        *lock(&self.coupon_calls) += 1;
        Ok(lock(&self.coupon).clone())
    }
}

/// Cart service whose recalculations resolve only when the test replies
pub(crate) struct GatedCartService {
    calls: mpsc::UnboundedSender<(PriceRequest, PriceReply)>,
}

impl GatedCartService {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<(PriceRequest, PriceReply)>) {
        let (calls, receiver) = mpsc::unbounded_channel();
        (Self { calls }, receiver)
    }
}

#[async_trait]
impl CartServicePort for GatedCartService {
    async fn get_active_cart(&self) -> DomainResult<Option<Cart>> {
        Ok(Some(cart_fixture(12_500, 5_000)))
    }

    async fn recalculate(
        &self,
        _cart_id: CartId,
        request: &PriceRequest,
    ) -> DomainResult<PriceBreakdown> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send((request.clone(), reply))
            .map_err(|_| backend_error("test dropped the receiver".to_string()))?;
        response
            .await
            .map_err(|_| backend_error("test dropped the reply".to_string()))?
            .map_err(backend_error)
    }

    async fn check_coupon(&self, _shop_id: ShopId, _code: &str) -> DomainResult<CouponCheck> {
        Ok(CouponCheck::Valid)
    }
}

pub(crate) struct FakeOrderService {
    methods: Mutex<Vec<PaymentMethod>>,
    instruments: Mutex<Option<Vec<StoredInstrument>>>,
    create_response: Mutex<CreateResponse>,
    create_gate: Option<mpsc::UnboundedSender<oneshot::Sender<CreateResponse>>>,
    create_requests: Mutex<Vec<CreateOrderRequest>>,
    verify_error: Mutex<Option<String>>,
    verify_delay: Mutex<Option<Duration>>,
    verify_calls: Mutex<Vec<(OrderId, String)>>,
    /// `None` answers every lookup with `NotFound`
    status: Mutex<Option<OrderStatus>>,
    status_calls: Mutex<Vec<OrderId>>,
}

impl Default for FakeOrderService {
    fn default() -> Self {
        Self {
            methods: Mutex::new(vec![PaymentMethod::new(1, "cash")]),
            instruments: Mutex::new(Some(Vec::new())),
            create_response: Mutex::new(Ok(creation_result(1, None, None))),
            create_gate: None,
            create_requests: Mutex::new(Vec::new()),
            verify_error: Mutex::new(None),
            verify_delay: Mutex::new(None),
            verify_calls: Mutex::new(Vec::new()),
            status: Mutex::new(Some(OrderStatus::Pending)),
            status_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeOrderService {
    /// Order creation waits for the test to send the response
    pub(crate) fn gated() -> (
        Self,
        mpsc::UnboundedReceiver<oneshot::Sender<CreateResponse>>,
    ) {
        let (gate, receiver) = mpsc::unbounded_channel();
        let service = Self {
            create_gate: Some(gate),
            ..Self::default()
        };
        (service, receiver)
    }

    pub(crate) fn set_methods(&self, methods: Vec<PaymentMethod>) {
        *lock(&self.methods) = methods;
    }

    pub(crate) fn set_instruments(&self, instruments: Vec<StoredInstrument>) {
        *lock(&self.instruments) = Some(instruments);
    }

    pub(crate) fn fail_instrument_lookup(&self) {
        lock(&self.instruments).take();
    }

    pub(crate) fn set_create_response(&self, response: CreateResponse) {
        *lock(&self.create_response) = response;
    }

    pub(crate) fn create_requests(&self) -> Vec<CreateOrderRequest> {
        lock(&self.create_requests).clone()
    }

    pub(crate) fn set_verify_error(&self, error: Option<String>) {
        *lock(&self.verify_error) = error;
    }

    pub(crate) fn set_verify_delay(&self, delay: Duration) {
        *lock(&self.verify_delay) = Some(delay);
    }

    pub(crate) fn verify_calls(&self) -> Vec<(OrderId, String)> {
        lock(&self.verify_calls).clone()
    }

    pub(crate) fn set_status(&self, status: OrderStatus) {
        *lock(&self.status) = Some(status);
    }

    pub(crate) fn forget_orders(&self) {
        lock(&self.status).take();
    }

    pub(crate) fn status_calls(&self) -> Vec<OrderId> {
        lock(&self.status_calls).clone()
    }
}

fn into_domain(response: CreateResponse) -> DomainResult<OrderCreationResult> {
    response.map_err(|(status, message)| DomainError::Backend { status, message })
}

#[async_trait]
impl OrderServicePort for FakeOrderService {
    async fn list_payment_methods(&self) -> DomainResult<Vec<PaymentMethod>> {
        Ok(lock(&self.methods).clone())
    }

    async fn list_stored_instruments(&self) -> DomainResult<Vec<StoredInstrument>> {
        lock(&self.instruments)
            .clone()
            .ok_or_else(|| backend_error("vault unavailable".to_string()))
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> DomainResult<OrderCreationResult> {
        lock(&self.create_requests).push(request.clone());
        if let Some(gate) = &self.create_gate {
            let (reply, response) = oneshot::channel();
            gate.send(reply)
                .map_err(|_| backend_error("test dropped the receiver".to_string()))?;
            let response = response
                .await
                .map_err(|_| backend_error("test dropped the reply".to_string()))?;
            return into_domain(response);
        }
        into_domain(lock(&self.create_response).clone())
    }

    async fn verify_challenge(&self, order_id: OrderId, code: &str) -> DomainResult<()> {
        lock(&self.verify_calls).push((order_id, code.to_string()));
        let delay = *lock(&self.verify_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.verify_error).clone() {
            Some(message) => Err(DomainError::Backend {
                status: 422,
                message: Some(message),
            }),
            None => Ok(()),
        }
    }

    async fn get_order_status(&self, order_id: OrderId) -> DomainResult<OrderStatus> {
        lock(&self.status_calls).push(order_id);
        lock(&self.status)
            .clone()
            .ok_or_else(|| DomainError::NotFound(format!("order {}", order_id)))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryPendingOrderStore {
    marker: Mutex<Option<PendingOrderMarker>>,
    fail_writes: Mutex<bool>,
    journal: Journal,
}

impl MemoryPendingOrderStore {
    pub(crate) fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn put(&self, marker: PendingOrderMarker) {
        *lock(&self.marker) = Some(marker);
    }

    pub(crate) fn current(&self) -> Option<PendingOrderMarker> {
        lock(&self.marker).clone()
    }

    pub(crate) fn fail_writes(&self) {
        *lock(&self.fail_writes) = true;
    }
}

impl PendingOrderStorePort for MemoryPendingOrderStore {
    fn set_pending_order(&self, marker: &PendingOrderMarker) -> DomainResult<()> {
        if *lock(&self.fail_writes) {
            return Err(DomainError::StorageError(std::io::Error::other(
                "storage unavailable",
            )));
        }
        self.journal.push(format!("marker:{}", marker.order_id));
        *lock(&self.marker) = Some(marker.clone());
        Ok(())
    }

    fn get_pending_order(&self) -> DomainResult<Option<PendingOrderMarker>> {
        Ok(lock(&self.marker).clone())
    }

    fn clear_pending_order(&self) -> DomainResult<()> {
        self.journal.push("marker:cleared".to_string());
        lock(&self.marker).take();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingEvents {
    journal: Journal,
    settled: Mutex<Vec<OrderId>>,
    redirects: Mutex<Vec<Url>>,
    rejections: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub(crate) fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn settled(&self) -> Vec<OrderId> {
        lock(&self.settled).clone()
    }

    pub(crate) fn redirects(&self) -> Vec<Url> {
        lock(&self.redirects).clone()
    }

    pub(crate) fn rejections(&self) -> Vec<String> {
        lock(&self.rejections).clone()
    }
}

impl CheckoutEventsPort for RecordingEvents {
    fn on_settled(&self, event: &OrderSettled) {
        self.journal.push(format!("settled:{}", event.order_id));
        lock(&self.settled).push(event.order_id);
    }

    fn on_redirect_issued(&self, event: &RedirectIssued) {
        self.journal.push(format!("redirect:{}", event.order_id));
        lock(&self.redirects).push(event.url.clone());
    }

    fn on_rejected(&self, event: &OrderRejected) {
        self.journal.push(format!("rejected:{}", event.code));
        lock(&self.rejections).push(event.code.clone());
    }
}
