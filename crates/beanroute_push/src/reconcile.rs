//! Subscription status reconciliation.
//!
//! Merges three independently observed signals into one subscribed flag:
//! the server's record for this user, the platform's own push subscription,
//! and whether the background worker controls the page.
//!
//! Mobile trusts the server alone, since the OS may evict the worker without
//! notice and the local signals give false negatives. Desktop requires all
//! three, since a mismatch there usually means the subscription went stale
//! (revoked in browser settings) before the server noticed.

use tracing::debug;

use crate::api::{bounded, HttpTransport, PushClient};
use crate::device::DeviceProfile;
use crate::platform::PushPlatform;
use crate::record::{PushSubscription, SubscriptionRecord};
use crate::state::{Permission, SubscriptionState};
use crate::PushError;

/// A freshly computed state and the record that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: SubscriptionState,
    pub record: Option<SubscriptionRecord>,
}

pub struct Reconciler<'a, P: PushPlatform + ?Sized, T: HttpTransport> {
    platform: &'a P,
    client: &'a PushClient<T>,
    cookie: Option<&'a str>,
}

impl<'a, P: PushPlatform + ?Sized, T: HttpTransport> Reconciler<'a, P, T> {
    pub fn new(platform: &'a P, client: &'a PushClient<T>, cookie: Option<&'a str>) -> Self {
        Self {
            platform,
            client,
            cookie,
        }
    }

    /// Recompute the subscription state.
    ///
    /// `Ok(None)` means the server answered 401: the session ended while we
    /// were asking, and the caller must leave its previous state untouched.
    #[profiling::function]
    pub async fn reconcile(
        &self,
        profile: &DeviceProfile,
    ) -> Result<Option<Reconciled>, PushError> {
        let Some(server_says) = self.client.user_status(self.cookie).await? else {
            debug!("user status returned 401, keeping previous state");
            return Ok(None);
        };

        let permission = self.platform.notification_permission();

        let reconciled = if profile.is_mobile {
            self.reconcile_mobile(profile, server_says, permission).await
        } else {
            self.reconcile_desktop(profile, server_says, permission).await
        };

        debug!(
            "reconciled: server={} subscribed={} mobile={}",
            server_says, reconciled.state.is_subscribed, profile.is_mobile
        );

        Ok(Some(reconciled))
    }

    async fn reconcile_mobile(
        &self,
        profile: &DeviceProfile,
        server_says: bool,
        permission: Permission,
    ) -> Reconciled {
        if !server_says {
            return Reconciled {
                state: SubscriptionState::checked(false, permission),
                record: None,
            };
        }

        // display only, failures are fine
        let local = match self.local_subscription().await {
            Ok(local) => local,
            Err(err) => {
                debug!("mobile: no local subscription to show ({err})");
                None
            }
        };

        let record = match local {
            Some(subscription) => SubscriptionRecord::real(subscription, profile),
            None => SubscriptionRecord::placeholder(&self.platform.user_agent()),
        };

        Reconciled {
            state: SubscriptionState::checked(true, permission),
            record: Some(record),
        }
    }

    async fn reconcile_desktop(
        &self,
        profile: &DeviceProfile,
        server_says: bool,
        permission: Permission,
    ) -> Reconciled {
        let local = match self.local_subscription().await {
            Ok(local) => local,
            Err(err) => {
                debug!("desktop: reading local subscription failed ({err})");
                None
            }
        };
        let controlling = self.platform.is_worker_controlling();

        let is_subscribed = server_says && local.is_some() && controlling;

        Reconciled {
            state: SubscriptionState::checked(is_subscribed, permission),
            record: local.map(|s| SubscriptionRecord::real(s, profile)),
        }
    }

    /// A wedged worker counts as no subscription rather than a stuck check.
    async fn local_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
        let lookup = self.platform.get_subscription();
        Ok(bounded(self.client.timeout(), "push get subscription", lookup).await??)
    }
}
