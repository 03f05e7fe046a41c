//! Subscription records.
//!
//! A record is either a real platform-issued push credential or a synthetic
//! placeholder used on devices that cannot produce one. Only the `Real`
//! variant exposes keys the platform actually issued.

use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;

pub const PLACEHOLDER_SCHEME: &str = "mobile://";
pub const PLACEHOLDER_P256DH: &str = "mobile-fallback-p256dh";
pub const PLACEHOLDER_AUTH: &str = "mobile-fallback-auth";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A push subscription as handed out by the platform's push manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderSubscription {
    endpoint: String,
}

impl PlaceholderSubscription {
    pub fn for_user_agent(user_agent: &str) -> Self {
        Self {
            endpoint: format!("{PLACEHOLDER_SCHEME}{user_agent}"),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionRecord {
    Real {
        subscription: PushSubscription,
        /// Mobile browser outside an installed app: delivery is best-effort.
        limited: bool,
    },
    Placeholder(PlaceholderSubscription),
}

impl SubscriptionRecord {
    pub fn real(subscription: PushSubscription, profile: &DeviceProfile) -> Self {
        SubscriptionRecord::Real {
            subscription,
            limited: profile.is_mobile && !profile.is_standalone_app,
        }
    }

    pub fn placeholder(user_agent: &str) -> Self {
        SubscriptionRecord::Placeholder(PlaceholderSubscription::for_user_agent(user_agent))
    }

    pub fn endpoint(&self) -> &str {
        match self {
            SubscriptionRecord::Real { subscription, .. } => &subscription.endpoint,
            SubscriptionRecord::Placeholder(p) => p.endpoint(),
        }
    }

    pub fn is_limited(&self) -> bool {
        match self {
            SubscriptionRecord::Real { limited, .. } => *limited,
            SubscriptionRecord::Placeholder(_) => true,
        }
    }

    pub fn is_mobile_fallback(&self) -> bool {
        matches!(self, SubscriptionRecord::Placeholder(_))
    }

    pub fn as_real(&self) -> Option<&PushSubscription> {
        match self {
            SubscriptionRecord::Real { subscription, .. } => Some(subscription),
            SubscriptionRecord::Placeholder(_) => None,
        }
    }

    /// The shape the backend stores. Placeholders get the sentinel keys.
    pub fn to_wire(&self) -> WireSubscription<'_> {
        match self {
            SubscriptionRecord::Real { subscription, .. } => WireSubscription {
                endpoint: &subscription.endpoint,
                keys: WireKeys {
                    p256dh: &subscription.keys.p256dh,
                    auth: &subscription.keys.auth,
                },
            },
            SubscriptionRecord::Placeholder(p) => WireSubscription {
                endpoint: p.endpoint(),
                keys: WireKeys {
                    p256dh: PLACEHOLDER_P256DH,
                    auth: PLACEHOLDER_AUTH,
                },
            },
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WireKeys<'a> {
    pub p256dh: &'a str,
    pub auth: &'a str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WireSubscription<'a> {
    pub endpoint: &'a str,
    pub keys: WireKeys<'a>,
}
