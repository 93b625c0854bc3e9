use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{
    Cart, CartAddon, CartId, CartLine, ChallengeInit, CardExpiry, FulfillmentMode,
    Money, OrderCreationResult, OrderId, OrderStatus, PaymentMethod, PriceBreakdown, ShopId,
    ShopSummary, StoredInstrument,
};
use crate::ports::{
    CartServicePort, CouponCheck, CreateOrderRequest, OrderServicePort, PriceRequest,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

const INVALID_COUPON: &str = "Invalid coupon";

/// Cart and order services over HTTP
#[derive(Clone)]
pub struct HttpBackendAdapter {
    base_url: String,
    api_token: Option<String>,
    client: Client,
}

impl HttpBackendAdapter {
    pub fn new(base_url: &Url, api_token: Option<String>, timeout: Duration) -> DomainResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_token,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, path: &str) -> DomainResult<Response> {
        let response = self
            .authorize(self.client.get(self.endpoint(path)))
            .send()
            .await?;
        Ok(response)
    }

    async fn post(&self, path: &str, body: &Value) -> DomainResult<Response> {
        debug!("POST {} {}", path, body);
        let response = self
            .authorize(self.client.post(self.endpoint(path)))
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

/// Unwrap a success body, or turn a failure into `DomainError::Backend`
async fn read_data<T: DeserializeOwned>(response: Response) -> DomainResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        error!("Backend returned {}: {}", status, body);
        return Err(backend_error(status, &body));
    }

    let value: Value = serde_json::from_str(&body)?;
    let data = match value {
        Value::Object(mut object) if object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(data).map_err(|e| DomainError::MalformedResponse(e.to_string()))
}

fn backend_error(status: StatusCode, body: &str) -> DomainError {
    DomainError::Backend {
        status: status.as_u16(),
        message: serde_json::from_str::<Value>(body)
            .ok()
            .as_ref()
            .and_then(error_message),
    }
}

/// Human-readable message of an error body: `message`, then `error`,
/// then the first entry of `errors`.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    let text = |value: &Value| {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    if let Some(message) = body.get("message").and_then(text) {
        return Some(message);
    }
    if let Some(message) = body.get("error").and_then(text) {
        return Some(message);
    }
    match body.get("errors")? {
        Value::Array(entries) => entries.first().and_then(|entry| {
            text(entry).or_else(|| entry.get("message").and_then(text))
        }),
        // field => [messages]
        Value::Object(fields) => fields.values().next().and_then(|messages| match messages {
            Value::Array(entries) => entries.first().and_then(text),
            other => text(other),
        }),
        other => text(other),
    }
}

fn first_present(field: &str, values: [Option<Money>; 2]) -> Option<Money> {
    let [first, second] = values;
    first.or(second).map(|amount| {
        if amount.is_negative() {
            warn!("Backend sent negative {} {}, using zero", field, amount);
        }
        amount.non_negative()
    })
}

#[derive(Debug, Deserialize)]
struct RawShop {
    id: ShopId,
    #[serde(default, alias = "minAmount", alias = "minimum_order")]
    min_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct RawAddon {
    #[serde(alias = "stockId")]
    stock_id: u64,
    quantity: u32,
    #[serde(alias = "unit_price")]
    price: Money,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(alias = "stockId")]
    stock_id: u64,
    quantity: u32,
    #[serde(alias = "unit_price")]
    price: Money,
    #[serde(default)]
    addons: Vec<RawAddon>,
}

#[derive(Debug, Deserialize)]
struct RawCart {
    id: CartId,
    shop: RawShop,
    #[serde(default, alias = "items", alias = "userCarts")]
    lines: Vec<RawLine>,
}

impl From<RawCart> for Cart {
    fn from(raw: RawCart) -> Self {
        Cart {
            id: raw.id,
            shop: ShopSummary {
                id: raw.shop.id,
                minimum_order: raw.shop.min_amount.unwrap_or(Money::ZERO).non_negative(),
            },
            lines: raw
                .lines
                .into_iter()
                .map(|line| CartLine {
                    stock_id: line.stock_id,
                    quantity: line.quantity,
                    unit_price: line.price,
                    addons: line
                        .addons
                        .into_iter()
                        .map(|addon| CartAddon {
                            stock_id: addon.stock_id,
                            quantity: addon.quantity,
                            unit_price: addon.price,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Breakdown as the backend sends it; the same amount may come in snake or
/// camel case and the first present spelling wins.
#[derive(Debug, Default, Deserialize)]
struct RawBreakdown {
    price: Option<Money>,
    subtotal: Option<Money>,
    delivery_fee: Option<Money>,
    #[serde(rename = "deliveryFee")]
    delivery_fee_camel: Option<Money>,
    service_fee: Option<Money>,
    #[serde(rename = "serviceFee")]
    service_fee_camel: Option<Money>,
    total_tax: Option<Money>,
    tax: Option<Money>,
    total_discount: Option<Money>,
    #[serde(rename = "totalDiscount")]
    total_discount_camel: Option<Money>,
    coupon_price: Option<Money>,
    #[serde(rename = "couponPrice")]
    coupon_price_camel: Option<Money>,
    total_price: Option<Money>,
    #[serde(rename = "totalPrice")]
    total_price_camel: Option<Money>,
}

impl TryFrom<RawBreakdown> for PriceBreakdown {
    type Error = DomainError;

    fn try_from(raw: RawBreakdown) -> DomainResult<Self> {
        let grand_total = first_present("total_price", [raw.total_price, raw.total_price_camel])
            .ok_or_else(|| DomainError::MalformedResponse("breakdown without total".to_string()))?;
        let or_zero = |field: &str, values: [Option<Money>; 2]| {
            first_present(field, values).unwrap_or(Money::ZERO)
        };
        Ok(PriceBreakdown {
            subtotal: or_zero("price", [raw.price, raw.subtotal]),
            delivery_fee: or_zero("delivery_fee", [raw.delivery_fee, raw.delivery_fee_camel]),
            service_fee: or_zero("service_fee", [raw.service_fee, raw.service_fee_camel]),
            tax: or_zero("tax", [raw.total_tax, raw.tax]),
            discount: or_zero("total_discount", [raw.total_discount, raw.total_discount_camel]),
            coupon_discount: or_zero("coupon_price", [raw.coupon_price, raw.coupon_price_camel]),
            grand_total,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPaymentMethod {
    id: u64,
    tag: String,
    #[serde(default)]
    active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawStoredCard {
    #[serde(alias = "token")]
    id: Value,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default, alias = "last4", alias = "lastFour")]
    last_four: Option<String>,
    #[serde(default, alias = "expMonth")]
    exp_month: Option<u32>,
    #[serde(default, alias = "expYear")]
    exp_year: Option<i32>,
    #[serde(default, alias = "isDefault", alias = "default")]
    is_default: bool,
}

impl RawStoredCard {
    fn into_instrument(self) -> Option<StoredInstrument> {
        let id = match self.id {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let label = match (self.brand, self.last_four) {
            (Some(brand), Some(last)) => format!("{} •••• {}", brand, last),
            (None, Some(last)) => format!("•••• {}", last),
            (Some(brand), None) => brand,
            (None, None) => id.clone(),
        };
        let expiry = match (self.exp_month, self.exp_year) {
            (Some(month), Some(year)) => Some(CardExpiry { month, year }),
            _ => None,
        };
        Some(StoredInstrument {
            id,
            label,
            expiry,
            is_default: self.is_default,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawOrderResult {
    #[serde(alias = "order_id")]
    id: OrderId,
    #[serde(default)]
    status: Option<OrderStatus>,
    #[serde(default, alias = "redirectUrl", alias = "payment_url")]
    redirect_url: Option<String>,
    #[serde(
        default,
        alias = "otp_verification_url",
        alias = "otp_url",
        alias = "challengeUrl"
    )]
    challenge_url: Option<String>,
    #[serde(default, alias = "otp_token", alias = "challengeToken")]
    challenge_token: Option<String>,
    #[serde(default, alias = "otp_channel", alias = "challengeChannel")]
    challenge_channel: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_link(field: &str, raw: Option<String>) -> DomainResult<Option<Url>> {
    non_blank(raw)
        .map(|raw| {
            Url::parse(&raw)
                .map_err(|e| DomainError::MalformedResponse(format!("{} {:?}: {}", field, raw, e)))
        })
        .transpose()
}

impl TryFrom<RawOrderResult> for OrderCreationResult {
    type Error = DomainError;

    fn try_from(raw: RawOrderResult) -> DomainResult<Self> {
        let url = parse_link("challenge_url", raw.challenge_url)?;
        let token = non_blank(raw.challenge_token);
        let challenge = (url.is_some() || token.is_some()).then(|| ChallengeInit {
            url,
            token,
            channel: non_blank(raw.challenge_channel),
        });
        Ok(OrderCreationResult {
            order_id: raw.id,
            status: raw.status.unwrap_or(OrderStatus::Pending),
            redirect_url: parse_link("redirect_url", raw.redirect_url)?,
            challenge,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawOrderStatus {
    status: OrderStatus,
}

fn price_body(request: &PriceRequest) -> Value {
    let fulfillment = &request.fulfillment;
    let destination = fulfillment.destination.as_ref();
    json!({
        "currency_id": request.currency.currency_id,
        "rate": request.currency.rate,
        "type": fulfillment.mode,
        "address": destination.map(|d| json!({
            "latitude": d.coordinates.latitude,
            "longitude": d.coordinates.longitude,
        })),
        "coupon": request.coupon,
        "delivery_date": fulfillment.schedule.as_ref().map(|s| s.date),
        "delivery_time": fulfillment.schedule.as_ref().map(|s| s.window.clone()),
    })
}

fn order_body(request: &CreateOrderRequest) -> Value {
    let fulfillment = &request.fulfillment;
    let destination = match fulfillment.mode {
        FulfillmentMode::Delivery => fulfillment.destination.as_ref(),
        FulfillmentMode::Pickup => None,
    };
    json!({
        "cart_id": request.cart_id,
        "currency_id": request.currency.currency_id,
        "rate": request.currency.rate,
        "delivery_type": fulfillment.mode,
        "address_id": destination.and_then(|d| d.address_id),
        "address": destination.map(|d| json!({
            "label": d.label,
            "latitude": d.coordinates.latitude,
            "longitude": d.coordinates.longitude,
        })),
        "delivery_date": fulfillment.schedule.as_ref().map(|s| s.date),
        "delivery_time": fulfillment.schedule.as_ref().map(|s| s.window.clone()),
        "coupon": request.coupon,
        "payment_id": request.payment_method_id,
        "card_token": request.stored_instrument,
        "phone": request.contact_phone,
        "success_url": request.callbacks.success,
        "failure_url": request.callbacks.failure,
        "callback_url": request.callbacks.callback,
    })
}

#[async_trait]
impl CartServicePort for HttpBackendAdapter {
    async fn get_active_cart(&self) -> DomainResult<Option<Cart>> {
        let response = self.get("/api/v1/cart").await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Backend has no active cart");
            return Ok(None);
        }
        let cart: Option<RawCart> = read_data(response).await?;
        Ok(cart.map(Cart::from))
    }

    async fn recalculate(
        &self,
        cart_id: CartId,
        request: &PriceRequest,
    ) -> DomainResult<PriceBreakdown> {
        let path = format!("/api/v1/cart/{}/calculate", cart_id);
        let response = self.post(&path, &price_body(request)).await?;
        let raw: RawBreakdown = read_data(response).await?;
        PriceBreakdown::try_from(raw)
    }

    async fn check_coupon(&self, shop_id: ShopId, code: &str) -> DomainResult<CouponCheck> {
        let body = json!({ "shop_id": shop_id, "coupon": code });
        let response = self.post("/api/v1/coupons/check", &body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(CouponCheck::Valid);
        }

        let text = response.text().await?;
        if status.is_client_error() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| INVALID_COUPON.to_string());
            return Ok(CouponCheck::Invalid { message });
        }
        Err(backend_error(status, &text))
    }
}

#[async_trait]
impl OrderServicePort for HttpBackendAdapter {
    async fn list_payment_methods(&self) -> DomainResult<Vec<PaymentMethod>> {
        let response = self.get("/api/v1/payments").await?;
        let raw: Vec<RawPaymentMethod> = read_data(response).await?;
        Ok(raw
            .into_iter()
            .filter(|method| method.active != Some(false))
            .map(|method| PaymentMethod::new(method.id, method.tag))
            .collect())
    }

    async fn list_stored_instruments(&self) -> DomainResult<Vec<StoredInstrument>> {
        let response = self.get("/api/v1/payments/cards").await?;
        let raw: Vec<RawStoredCard> = read_data(response).await?;
        Ok(raw
            .into_iter()
            .filter_map(RawStoredCard::into_instrument)
            .collect())
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> DomainResult<OrderCreationResult> {
        let body = order_body(request);
        debug!("POST /api/v1/orders {}", body);
        let response = self
            .authorize(self.client.post(self.endpoint("/api/v1/orders")))
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .json(&body)
            .send()
            .await?;
        let raw: RawOrderResult = read_data(response).await?;
        OrderCreationResult::try_from(raw)
    }

    async fn verify_challenge(&self, order_id: OrderId, code: &str) -> DomainResult<()> {
        // no debug! of the body here, it carries the code
        let response = self
            .authorize(
                self.client
                    .post(self.endpoint(&format!("/api/v1/orders/{}/otp", order_id))),
            )
            .json(&json!({ "code": code }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await?;
        Err(backend_error(status, &text))
    }

    async fn get_order_status(&self, order_id: OrderId) -> DomainResult<OrderStatus> {
        let response = self.get(&format!("/api/v1/orders/{}", order_id)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DomainError::NotFound(format!("order {}", order_id)));
        }
        let raw: RawOrderStatus = read_data(response).await?;
        Ok(raw.status)
    }
}
