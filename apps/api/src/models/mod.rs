pub mod analysis;
pub mod entitlement;
pub mod payment;
