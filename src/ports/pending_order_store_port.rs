use crate::domain::errors::DomainResult;
use crate::domain::PendingOrderMarker;

/// Durable client storage for the pending-order marker.
///
/// Calls are synchronous: the marker has to be on disk before the browser
/// leaves for the gateway. Writes are all-or-nothing.
pub trait PendingOrderStorePort: Send + Sync {
    fn set_pending_order(&self, marker: &PendingOrderMarker) -> DomainResult<()>;

    fn get_pending_order(&self) -> DomainResult<Option<PendingOrderMarker>>;

    fn clear_pending_order(&self) -> DomainResult<()>;
}
