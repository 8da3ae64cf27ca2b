//! Checkout and payment confirmation.
//!
//! - `coordinator`: checkout, cancel, session start-up
//! - `session`: the polling state machine of one payment
//! - `registry`: at most one running session per user
//! - `notifier`: the outbound message seam
//! - `messages`: customer-facing texts

pub mod coordinator;
pub mod messages;
pub mod notifier;
pub mod registry;
pub mod session;

pub use coordinator::{CheckoutError, CheckoutReceipt, PaymentCoordinator, PaymentCoordinatorBuilder, ValidationError};
pub use notifier::{Keyboard, MessageRef, Notifier, NotifyError};
pub use registry::{RegistrationGuard, SessionHandle, TaskRegistry};
pub use session::{classify, PaymentSession, PollDecision, SessionOutcome};
