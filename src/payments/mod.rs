//! Moolre payment integration
//!
//! - `reference`: per-attempt external references and their canonical form
//! - `callback`: normalization of the gateway's webhook payloads
//! - `traits`/`providers`: the gateway interface and the Moolre client
//! - `service`: the confirmation flow tying them to the order store

pub mod callback;
pub mod providers;
pub mod reference;
pub mod service;
pub mod traits;
pub mod types;

pub use callback::{CallbackNotice, CallbackOutcome};
pub use service::{
    CallbackAck, InitiatePayment, PaymentLinkCreated, PaymentService, PaymentSettings,
    VerificationResult,
};
pub use traits::PaymentGateway;
pub use types::{GatewayStatus, PaymentLink, PaymentLinkRequest};
