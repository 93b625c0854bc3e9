use crate::application::lock;
use crate::domain::errors::{CheckoutError, CheckoutResult, DomainError};
use crate::domain::{ChallengeInit, OrderId, OrderStatus, OtpChallenge, PendingOrderMarker};
use crate::ports::{OrderServicePort, PendingOrderStorePort};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

/// Query parameter carrying the one-time code to the gateway
pub const OTP_QUERY_PARAM: &str = "otp";

const VERIFICATION_FAILED: &str = "The code could not be verified, please try again";

/// Which gateway callback route the browser came back on. A hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Success,
    Failure,
    Callback,
}

/// What the result page should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementVerdict {
    Succeeded,
    Failed,
    /// No order to look up, or the backend does not know it
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub order_id: Option<OrderId>,
    pub status: Option<OrderStatus>,
    pub verdict: SettlementVerdict,
    /// A fresh pending-order marker was found and consumed
    pub resumed: bool,
}

/// Result of submitting a one-time code
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeOutcome {
    /// Backend accepted the code
    Verified { order_id: OrderId },
    /// Code goes to the gateway's completion page
    Navigate { order_id: OrderId, url: Url },
}

/// Drives the settlement branches that do not finish synchronously:
/// the gateway redirect round-trip and the one-time-code challenge.
pub struct SettlementResumer<O: OrderServicePort, S: PendingOrderStorePort> {
    order_service: Arc<O>,
    store: Arc<S>,
    marker_ttl: Duration,
    challenge: Mutex<Option<OtpChallenge>>,
}

impl<O: OrderServicePort, S: PendingOrderStorePort> SettlementResumer<O, S> {
    pub fn new(order_service: Arc<O>, store: Arc<S>, marker_ttl: Duration) -> Self {
        Self {
            order_service,
            store,
            marker_ttl,
            challenge: Mutex::new(None),
        }
    }

    /// Persist the pending-order marker. Must succeed before the browser
    /// is sent to `url`.
    pub fn prepare_redirect(&self, order_id: OrderId, url: Url) -> CheckoutResult<Url> {
        let marker = PendingOrderMarker::new(order_id);
        self.store.set_pending_order(&marker).map_err(|e| {
            error!("Could not persist pending order {}: {}", order_id, e);
            CheckoutError::Fault(e)
        })?;
        info!("Pending order {} recorded, redirecting to gateway", order_id);
        Ok(url)
    }

    /// Read and clear the marker in one step
    fn take_marker(&self) -> CheckoutResult<Option<PendingOrderMarker>> {
        let marker = self.store.get_pending_order()?;
        if marker.is_some() {
            self.store.clear_pending_order()?;
        }
        Ok(marker)
    }

    /// Reconcile after the gateway sent the browser back. The backend's
    /// order status decides the verdict, never the callback route.
    pub async fn reconcile(
        &self,
        kind: CallbackKind,
        order_hint: Option<OrderId>,
    ) -> CheckoutResult<Reconciliation> {
        let marker = self.take_marker()?;
        let now = Utc::now();

        let (order_id, resumed) = match marker {
            Some(marker) if !marker.is_stale(now, self.marker_ttl) => {
                if order_hint.is_some_and(|hint| hint != marker.order_id) {
                    warn!(
                        "Callback names order {:?} but pending order is {}",
                        order_hint, marker.order_id
                    );
                }
                (Some(marker.order_id), true)
            }
            Some(marker) => {
                warn!(
                    "Pending order {} from {} is stale, treating as abandoned",
                    marker.order_id, marker.created_at
                );
                (order_hint, false)
            }
            None => {
                debug!("No pending order marker on {:?} callback", kind);
                (order_hint, false)
            }
        };

        let Some(order_id) = order_id else {
            info!("Nothing to reconcile on {:?} callback", kind);
            return Ok(Reconciliation {
                order_id: None,
                status: None,
                verdict: SettlementVerdict::Unknown,
                resumed,
            });
        };

        let status = match self.order_service.get_order_status(order_id).await {
            Ok(status) => status,
            Err(DomainError::NotFound(_)) => {
                warn!("Order {} named on {:?} callback does not exist", order_id, kind);
                return Ok(Reconciliation {
                    order_id: Some(order_id),
                    status: None,
                    verdict: SettlementVerdict::Unknown,
                    resumed,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let verdict = if status.is_settled() {
            SettlementVerdict::Succeeded
        } else {
            SettlementVerdict::Failed
        };
        if (kind == CallbackKind::Success) != (verdict == SettlementVerdict::Succeeded) {
            debug!(
                "Gateway {:?} hint disagrees with order {} status {}",
                kind, order_id, status
            );
        }
        info!("Order {} reconciled as {:?} ({})", order_id, verdict, status);

        Ok(Reconciliation {
            order_id: Some(order_id),
            status: Some(status),
            verdict,
            resumed,
        })
    }

    /// Open the one-time-code entry for an order
    pub fn open_challenge(&self, order_id: OrderId, init: ChallengeInit) -> OtpChallenge {
        let challenge = OtpChallenge::new(order_id, init);
        info!(
            "Challenge opened for order {} via {}",
            order_id,
            challenge.channel.as_deref().unwrap_or("default channel")
        );
        *lock(&self.challenge) = Some(challenge.clone());
        challenge
    }

    pub fn challenge(&self) -> Option<OtpChallenge> {
        lock(&self.challenge).clone()
    }

    /// Submit a user-entered code. Exactly one mechanism applies: the
    /// gateway completion URL when supplied, the backend endpoint otherwise.
    /// A code already being verified blocks further submissions.
    pub async fn submit_code(&self, code: &str) -> CheckoutResult<ChallengeOutcome> {
        let code = code.trim().to_string();
        let challenge = {
            let mut guard = lock(&self.challenge);
            let challenge = guard
                .as_mut()
                .ok_or_else(|| CheckoutError::InvalidPhase("without a challenge".to_string()))?;
            if challenge.is_verifying() {
                return Err(CheckoutError::SubmissionInProgress);
            }
            if code.is_empty() {
                return Err(CheckoutError::Challenge("Enter the code you received".to_string()));
            }
            challenge.enter_code(code.clone());
            challenge.begin_verification();
            challenge.clone()
        };
        let order_id = challenge.order_id;

        if let Some(base) = challenge.challenge_url.as_ref() {
            let mut url = base.clone();
            url.query_pairs_mut().append_pair(OTP_QUERY_PARAM, &code);
            // the browser leaves; the callback routes reconcile this order
            let url = match self.prepare_redirect(order_id, url) {
                Ok(url) => url,
                Err(e) => {
                    self.fail_verification(e.user_message());
                    return Err(e);
                }
            };
            lock(&self.challenge).take();
            info!("Forwarding code for order {} to gateway", order_id);
            return Ok(ChallengeOutcome::Navigate { order_id, url });
        }

        match self.order_service.verify_challenge(order_id, &code).await {
            Ok(()) => {
                lock(&self.challenge).take();
                info!("Challenge for order {} verified", order_id);
                Ok(ChallengeOutcome::Verified { order_id })
            }
            Err(e) => {
                warn!("Challenge for order {} rejected: {}", order_id, e);
                let message = e
                    .backend_message()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or(VERIFICATION_FAILED)
                    .to_string();
                self.fail_verification(message.clone());
                Err(CheckoutError::Challenge(message))
            }
        }
    }

    fn fail_verification(&self, message: impl Into<String>) {
        if let Some(open) = lock(&self.challenge).as_mut() {
            open.fail_verification(message);
        }
    }

    /// Abandon the challenge. Nothing is sent to the backend.
    pub fn cancel_challenge(&self) -> CheckoutResult<OrderId> {
        let challenge = lock(&self.challenge)
            .take()
            .ok_or_else(|| CheckoutError::InvalidPhase("without a challenge".to_string()))?;
        info!("Challenge for order {} cancelled", challenge.order_id);
        Ok(challenge.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{FakeOrderService, MemoryPendingOrderStore};
    use crate::domain::DomainError;

    fn resumer(
        service: &Arc<FakeOrderService>,
        store: &Arc<MemoryPendingOrderStore>,
    ) -> SettlementResumer<FakeOrderService, MemoryPendingOrderStore> {
        SettlementResumer::new(service.clone(), store.clone(), Duration::minutes(30))
    }

    fn token_challenge() -> ChallengeInit {
        ChallengeInit {
            url: None,
            token: Some("chal_1".to_string()),
            channel: Some("sms".to_string()),
        }
    }

    #[test]
    fn test_prepare_redirect_writes_marker() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        let url = Url::parse("https://pay.example/r/1").unwrap();

        let returned = resumer(&service, &store).prepare_redirect(12, url.clone()).unwrap();

        assert_eq!(returned, url);
        assert_eq!(store.current().map(|m| m.order_id), Some(12));
    }

    #[test]
    fn test_failed_marker_write_is_fault() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        store.fail_writes();

        let result = resumer(&service, &store)
            .prepare_redirect(12, Url::parse("https://pay.example/r/1").unwrap());

        assert!(matches!(result, Err(CheckoutError::Fault(DomainError::StorageError(_)))));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_consumes_marker_once() {
        let service = Arc::new(FakeOrderService::default());
        service.set_status(OrderStatus::Paid);
        let store = Arc::new(MemoryPendingOrderStore::default());
        store.put(PendingOrderMarker::new(12));
        let resumer = resumer(&service, &store);

        let first = resumer.reconcile(CallbackKind::Success, None).await.unwrap();
        assert_eq!(first.order_id, Some(12));
        assert!(first.resumed);
        assert_eq!(first.verdict, SettlementVerdict::Succeeded);
        assert!(store.current().is_none());

        let second = resumer.reconcile(CallbackKind::Success, None).await.unwrap();
        assert_eq!(second.verdict, SettlementVerdict::Unknown);
        assert_eq!(service.status_calls(), vec![12]);
    }

    #[tokio::test]
    async fn test_success_route_does_not_imply_success() {
        let service = Arc::new(FakeOrderService::default());
        service.set_status(OrderStatus::AwaitingPayment);
        let store = Arc::new(MemoryPendingOrderStore::default());
        store.put(PendingOrderMarker::new(12));

        let result = resumer(&service, &store)
            .reconcile(CallbackKind::Success, None)
            .await
            .unwrap();

        assert_eq!(result.verdict, SettlementVerdict::Failed);
    }

    #[tokio::test]
    async fn test_missing_marker_falls_back_to_status_lookup() {
        let service = Arc::new(FakeOrderService::default());
        service.set_status(OrderStatus::Paid);
        let store = Arc::new(MemoryPendingOrderStore::default());

        let result = resumer(&service, &store)
            .reconcile(CallbackKind::Callback, Some(33))
            .await
            .unwrap();

        assert_eq!(result.order_id, Some(33));
        assert!(!result.resumed);
        assert_eq!(result.verdict, SettlementVerdict::Succeeded);
    }

    #[tokio::test]
    async fn test_stale_marker_is_not_resumed() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        store.put(PendingOrderMarker {
            order_id: 12,
            created_at: Utc::now() - Duration::hours(3),
        });

        let result = resumer(&service, &store)
            .reconcile(CallbackKind::Success, None)
            .await
            .unwrap();

        assert_eq!(result.verdict, SettlementVerdict::Unknown);
        assert!(!result.resumed);
        assert!(store.current().is_none());
        assert!(service.status_calls().is_empty());
    }

    #[tokio::test]
    async fn test_code_goes_to_backend_without_challenge_url() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        let outcome = resumer.submit_code("482913").await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Verified { order_id: 8 });
        assert_eq!(service.verify_calls(), vec![(8, "482913".to_string())]);
        assert!(resumer.challenge().is_none());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_code_goes_to_gateway_url_when_supplied() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(
            8,
            ChallengeInit {
                url: Some(Url::parse("https://pay.example/otp?session=abc").unwrap()),
                token: None,
                channel: None,
            },
        );

        let outcome = resumer.submit_code("482913").await.unwrap();

        let ChallengeOutcome::Navigate { order_id, url } = outcome else {
            panic!("expected navigation");
        };
        assert_eq!(order_id, 8);
        assert_eq!(url.as_str(), "https://pay.example/otp?session=abc&otp=482913");
        assert!(service.verify_calls().is_empty());
        assert_eq!(store.current().map(|m| m.order_id), Some(8));
    }

    #[tokio::test]
    async fn test_rejected_code_keeps_challenge_open() {
        let service = Arc::new(FakeOrderService::default());
        service.set_verify_error(Some("Invalid code".to_string()));
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        let error = resumer.submit_code("482913").await.unwrap_err();

        assert!(matches!(error, CheckoutError::Challenge(ref m) if m == "Invalid code"));
        let open = resumer.challenge().unwrap();
        assert_eq!(open.code(), Some("482913"));
        assert_eq!(open.last_error.as_deref(), Some("Invalid code"));
        assert_eq!(service.verify_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_code_in_flight_blocks_second_submission() {
        let service = Arc::new(FakeOrderService::default());
        service.set_verify_delay(std::time::Duration::from_millis(50));
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        let (first, second) =
            tokio::join!(resumer.submit_code("482913"), resumer.submit_code("482913"));

        assert_eq!(first.unwrap(), ChallengeOutcome::Verified { order_id: 8 });
        assert!(matches!(second, Err(CheckoutError::SubmissionInProgress)));
        assert_eq!(service.verify_calls(), vec![(8, "482913".to_string())]);
    }

    #[tokio::test]
    async fn test_rejected_code_can_be_resubmitted() {
        let service = Arc::new(FakeOrderService::default());
        service.set_verify_error(Some("Invalid code".to_string()));
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        assert!(resumer.submit_code("111111").await.is_err());
        assert!(!resumer.challenge().unwrap().is_verifying());

        service.set_verify_error(None);
        let outcome = resumer.submit_code("482913").await.unwrap();

        assert_eq!(outcome, ChallengeOutcome::Verified { order_id: 8 });
        assert_eq!(service.verify_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_order_reconciles_as_unknown() {
        let service = Arc::new(FakeOrderService::default());
        service.forget_orders();
        let store = Arc::new(MemoryPendingOrderStore::default());

        let result = resumer(&service, &store)
            .reconcile(CallbackKind::Callback, Some(404))
            .await
            .unwrap();

        assert_eq!(result.order_id, Some(404));
        assert_eq!(result.status, None);
        assert_eq!(result.verdict, SettlementVerdict::Unknown);
        assert_eq!(service.status_calls(), vec![404]);
    }

    #[tokio::test]
    async fn test_blank_code_is_not_sent() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        assert!(matches!(
            resumer.submit_code(" ").await,
            Err(CheckoutError::Challenge(_))
        ));
        assert!(service.verify_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_contacts_nobody() {
        let service = Arc::new(FakeOrderService::default());
        let store = Arc::new(MemoryPendingOrderStore::default());
        let resumer = resumer(&service, &store);
        resumer.open_challenge(8, token_challenge());

        assert_eq!(resumer.cancel_challenge().unwrap(), 8);
        assert!(resumer.challenge().is_none());
        assert!(service.verify_calls().is_empty());
        assert!(service.status_calls().is_empty());
        assert!(matches!(
            resumer.submit_code("1").await,
            Err(CheckoutError::InvalidPhase(_))
        ));
    }
}
