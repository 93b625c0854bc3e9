use crate::domain::value_objects::Money;
use thiserror::Error;

/// Fallback shown when the backend gives no usable message.
pub const ORDER_PLACEMENT_FAILED: &str = "Failed to place order";

const GENERIC_FAULT: &str = "Something went wrong, please try again";

/// Infrastructure-level errors raised by the adapters
#[derive(Error, Debug)]
pub enum DomainError {
    /// Backend responded with a non-success status
    #[error("Backend error ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Backend {
        status: u16,
        message: Option<String>,
    },

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend payload did not have the expected shape
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Durable storage could not be read or written
    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl DomainError {
    /// Message the backend supplied for the user, if any.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            DomainError::Backend {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Local precondition failures. No network call is made when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Select a delivery address")]
    MissingDestination,

    #[error("The delivery address has no location on the map")]
    InvalidCoordinates,

    #[error("Select a payment method")]
    MissingPaymentMethod,

    #[error("Select a saved card")]
    MissingStoredInstrument,

    #[error("The selected card is expired or no longer available")]
    UnavailableStoredInstrument,

    #[error("Minimum order amount is {minimum}")]
    BelowMinimumOrder { minimum: Money, subtotal: Money },

    #[error("Add a contact phone number")]
    MissingPhone,
}

/// Outcome taxonomy of the checkout flow.
///
/// Everything except `Fault` is an expected, user-recoverable failure.
#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Your cart is no longer available")]
    StaleCart,

    #[error("Could not calculate the price: {0}")]
    Calculation(String),

    #[error("Coupon is not valid: {0}")]
    InvalidCoupon(String),

    #[error("{0}")]
    Submission(String),

    #[error("No settlement path returned for order {order_id}")]
    ContractViolation { order_id: u64 },

    #[error("{0}")]
    Challenge(String),

    #[error("An order is already being placed")]
    SubmissionInProgress,

    #[error("Not allowed while checkout is {0}")]
    InvalidPhase(String),

    #[error("Something went wrong: {0}")]
    Fault(#[from] DomainError),
}

impl CheckoutError {
    pub fn is_fault(&self) -> bool {
        matches!(self, CheckoutError::Fault(_))
    }

    /// Stable code for the UI layer.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "VALIDATION_ERROR",
            CheckoutError::StaleCart => "STALE_CART",
            CheckoutError::Calculation(_) => "CALCULATION_ERROR",
            CheckoutError::InvalidCoupon(_) => "INVALID_COUPON",
            CheckoutError::Submission(_) => "SUBMISSION_ERROR",
            CheckoutError::ContractViolation { .. } => "CONTRACT_VIOLATION",
            CheckoutError::Challenge(_) => "CHALLENGE_ERROR",
            CheckoutError::SubmissionInProgress => "SUBMISSION_IN_PROGRESS",
            CheckoutError::InvalidPhase(_) => "INVALID_PHASE",
            CheckoutError::Fault(_) => "FAULT",
        }
    }

    /// Message safe to show the user. Faults stay generic, details go to the log.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Fault(_) => GENERIC_FAULT.to_string(),
            other => other.to_string(),
        }
    }

    /// Turn a failed order-creation call into a user-facing submission error.
    pub fn submission(error: &DomainError) -> Self {
        let message = error
            .backend_message()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(ORDER_PLACEMENT_FAILED);
        CheckoutError::Submission(message.to_string())
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;
