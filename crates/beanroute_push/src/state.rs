use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Browser notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// The authoritative subscribed flag plus what it was computed from.
///
/// Always replaced as a whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionState {
    pub is_subscribed: bool,
    /// Set right after a successful subscribe, cleared by the confirming
    /// status check.
    pub optimistic: bool,
    pub permission: Permission,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn checked(is_subscribed: bool, permission: Permission) -> Self {
        Self {
            is_subscribed,
            optimistic: false,
            permission,
            last_checked_at: Some(Utc::now()),
        }
    }

    pub fn optimistic(permission: Permission) -> Self {
        Self {
            is_subscribed: true,
            optimistic: true,
            permission,
            last_checked_at: None,
        }
    }

    pub fn unsubscribed(permission: Permission) -> Self {
        Self {
            is_subscribed: false,
            optimistic: false,
            permission,
            last_checked_at: None,
        }
    }

    /// Compare everything except the check timestamp.
    pub fn same_status(&self, other: &SubscriptionState) -> bool {
        self.is_subscribed == other.is_subscribed
            && self.optimistic == other.optimistic
            && self.permission == other.permission
    }
}

/// Per-session lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum_macros::Display)]
pub enum LifecyclePhase {
    #[default]
    Uninitialized,
    CheckingSupport,
    /// Terminal for the session.
    Unsupported,
    SupportedUnconfigured,
    Ready,
    RequestingPermission,
    CreatingSubscription,
    RegisteringWithServer,
    Subscribed,
    Unsubscribing,
}

impl LifecyclePhase {
    /// Phases that only exist while an operation is running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::CheckingSupport
                | LifecyclePhase::RequestingPermission
                | LifecyclePhase::CreatingSubscription
                | LifecyclePhase::RegisteringWithServer
                | LifecyclePhase::Unsubscribing
        )
    }

    /// Ready or subscribed, i.e. status checks may move between the two.
    pub fn is_settled(&self) -> bool {
        matches!(self, LifecyclePhase::Ready | LifecyclePhase::Subscribed)
    }
}

/// The signed-in user as known to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: String,
    pub cookie: Option<String>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_wire_names() {
        assert_eq!(
            serde_json::to_string(&Permission::Granted).expect("json"),
            "\"granted\""
        );
        let parsed: Permission = serde_json::from_str("\"denied\"").expect("json");
        assert_eq!(parsed, Permission::Denied);
    }

    #[test]
    fn same_status_ignores_timestamp() {
        let a = SubscriptionState::checked(true, Permission::Granted);
        let mut b = a.clone();
        b.last_checked_at = None;
        assert!(a.same_status(&b));
        assert!(!a.same_status(&SubscriptionState::optimistic(Permission::Granted)));
    }
}
