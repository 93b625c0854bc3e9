pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use entities::*;
pub use errors::{
    CheckoutError, CheckoutResult, DomainError, DomainResult, ValidationError,
};
pub use events::*;
pub use value_objects::{
    CheckoutPhase, Coordinates, FulfillmentMode, Money, OrderStatus, PaymentMethodKind,
};
