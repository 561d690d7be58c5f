//! Daily-quota accounting: clock policy, the quota gate, and the
//! entitlement read/session endpoints.

pub mod clock;
pub mod gate;
pub mod handlers;
