//! Payment side of the system: gateway adapter, checkout and webhook
//! endpoints, and the reconciler that ties a verified payment event to
//! exactly one entitlement activation.

pub mod gateway;
pub mod handlers;
pub mod reconcile;
pub mod signature;
