use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tier for a user. `Pro` only grants unlimited access while
/// `pro_expires_at` is in the future; an expired Pro behaves as Free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            _ => None,
        }
    }
}

/// One entitlement row per user. Single source of truth for quota
/// accounting; never cached across requests.
///
/// `version` backs the optimistic compare-and-swap used by the quota
/// gate, so two concurrent consumers of the same row cannot both win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntitlement {
    pub user_id: Uuid,
    pub tier: Tier,
    pub pro_expires_at: Option<DateTime<Utc>>,
    /// Consumptions since `daily_reset_at`. Reset lazily on access.
    pub daily_used: i32,
    /// Start of the current counting window (a UTC day boundary).
    pub daily_reset_at: DateTime<Utc>,
    /// Audit counter: incremented on every allowed consumption, never
    /// decremented, regardless of tier.
    pub lifetime_used: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl UserEntitlement {
    /// Fresh free-tier row, as created on first sign-in.
    pub fn new_free(user_id: Uuid, day_start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tier: Tier::Free,
            pro_expires_at: None,
            daily_used: 0,
            daily_reset_at: day_start,
            lifetime_used: 0,
            version: 0,
            created_at: now,
        }
    }

    /// Pro is active only while unexpired.
    pub fn is_pro_active(&self, now: DateTime<Utc>) -> bool {
        self.tier == Tier::Pro && self.pro_expires_at.map(|t| t > now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn tier_round_trips_through_str() {
        assert_eq!(Tier::parse(Tier::Free.as_str()), Some(Tier::Free));
        assert_eq!(Tier::parse(Tier::Pro.as_str()), Some(Tier::Pro));
        assert_eq!(Tier::parse("enterprise"), None);
    }

    #[test]
    fn expired_pro_is_not_active() {
        let now = Utc::now();
        let mut ent = UserEntitlement::new_free(Uuid::new_v4(), now, now);
        ent.tier = Tier::Pro;
        ent.pro_expires_at = Some(now - Duration::days(1));
        assert!(!ent.is_pro_active(now));

        ent.pro_expires_at = Some(now + Duration::days(30));
        assert!(ent.is_pro_active(now));
    }

    #[test]
    fn pro_without_expiry_is_not_active() {
        let now = Utc::now();
        let mut ent = UserEntitlement::new_free(Uuid::new_v4(), now, now);
        ent.tier = Tier::Pro;
        ent.pro_expires_at = None;
        assert!(!ent.is_pro_active(now));
    }
}
