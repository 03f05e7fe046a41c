//! Push subscription lifecycle controller.
//!
//! Owns all push state for one signed-in user: the lifecycle phase, the
//! subscription record, and the reconciled [`SubscriptionState`]. Every
//! instance carries its own state, so tests (or several tabs) never share
//! anything hidden.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> CheckingSupport -> Unsupported | SupportedUnconfigured | Ready
//! Ready -> RequestingPermission -> CreatingSubscription -> RegisteringWithServer -> Subscribed
//! Subscribed -> Unsubscribing -> Ready
//! ```
//!
//! Failures in the middle revert to the settled phase and are returned to the
//! caller. Results that arrive after the user signed out are dropped: every
//! sign-in or sign-out bumps a session generation and late writers compare
//! against it.
//!
//! # Usage
//!
//! ```ignore
//! let controller = PushController::new(platform, transport, PushSettings::default());
//! controller.set_user(Some(UserSession::new("user-1")));
//! controller.initialize().await;
//! controller.subscribe().await?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{bounded, HttpTransport, PushClient, RegisterRequest, SendRequest, ServerConfig};
use crate::checker;
use crate::device::{detect, is_push_supported, DeviceProfile, PushCapabilities};
use crate::platform::PushPlatform;
use crate::reconcile::Reconciler;
use crate::record::{PushSubscription, SubscriptionRecord};
use crate::settings::PushSettings;
use crate::state::{LifecyclePhase, Permission, SubscriptionState, UserSession};
use crate::PushError;

/// Vibration played after a test notification was accepted.
const TEST_VIBRATION: &[u32] = &[100, 50, 100];

#[derive(Default)]
pub(crate) struct Inner {
    session: Option<UserSession>,
    /// Bumped on every sign-in and sign-out.
    generation: u64,
    phase: LifecyclePhase,
    profile: Option<DeviceProfile>,
    server_config: Option<ServerConfig>,
    record: Option<SubscriptionRecord>,
    state: SubscriptionState,
    last_error: Option<PushError>,
    /// Number of user-initiated operations in flight.
    loading: usize,
    initializing: bool,
    initialized: bool,
}

impl Inner {
    fn settled_phase(&self) -> LifecyclePhase {
        if self.state.is_subscribed {
            LifecyclePhase::Subscribed
        } else {
            LifecyclePhase::Ready
        }
    }
}

pub(crate) struct Shared<P: PushPlatform, T: HttpTransport> {
    platform: Arc<P>,
    client: PushClient<T>,
    settings: PushSettings,
    inner: Mutex<Inner>,
    checker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: PushPlatform, T: HttpTransport> Shared<P, T> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn checker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.checker.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_session(&self) -> Option<(UserSession, u64)> {
        let inner = self.lock();
        inner.session.clone().map(|s| (s, inner.generation))
    }

    /// The session, if it is still the one from `generation`.
    pub(crate) fn session_for(&self, generation: u64) -> Option<UserSession> {
        let inner = self.lock();
        if inner.generation == generation {
            inner.session.clone()
        } else {
            None
        }
    }

    /// Apply `f` only if the session from `generation` is still signed in.
    fn with_session<R>(&self, generation: u64, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        let mut inner = self.lock();
        if inner.generation != generation || inner.session.is_none() {
            return None;
        }
        Some(f(&mut inner))
    }

    fn set_phase(&self, generation: u64, phase: LifecyclePhase) {
        self.with_session(generation, |inner| {
            debug!("push phase {} -> {}", inner.phase, phase);
            inner.phase = phase;
        });
    }

    fn fail(&self, generation: u64, err: PushError) -> PushError {
        self.fail_with(generation, err, Inner::settled_phase)
    }

    fn fail_with(
        &self,
        generation: u64,
        err: PushError,
        revert: fn(&Inner) -> LifecyclePhase,
    ) -> PushError {
        warn!("push operation failed: {err}");
        self.with_session(generation, |inner| {
            if inner.phase.is_transient() {
                inner.phase = revert(&*inner);
            }
            inner.last_error = Some(err.clone());
        });
        err
    }

    /// Forget the local record once the platform side may have changed.
    fn discard_subscription(&self, generation: u64, permission: Permission) {
        self.with_session(generation, |inner| {
            inner.record = None;
            inner.state = SubscriptionState::unsubscribed(permission);
        });
    }

    fn begin_loading(&self) -> Loading<'_> {
        self.lock().loading += 1;
        Loading { inner: &self.inner }
    }
}

impl<P: PushPlatform, T: HttpTransport> Drop for Shared<P, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.checker_slot().take() {
            handle.abort();
        }
    }
}

/// Clears one unit of the loading flag when the operation ends, however it
/// ends.
struct Loading<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.loading = inner.loading.saturating_sub(1);
    }
}

enum Bootstrap {
    Unsupported,
    Unauthenticated,
    Unconfigured,
    Ready,
}

pub struct PushController<P: PushPlatform, T: HttpTransport> {
    shared: Arc<Shared<P, T>>,
}

impl<P: PushPlatform, T: HttpTransport> Clone for PushController<P, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: PushPlatform, T: HttpTransport> PushController<P, T> {
    pub fn new(platform: Arc<P>, transport: Arc<T>, settings: PushSettings) -> Self {
        let client = PushClient::new(transport, settings.request_timeout());
        Self {
            shared: Arc::new(Shared {
                platform,
                client,
                settings,
                inner: Mutex::new(Inner::default()),
                checker: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<P, T>>) -> Self {
        Self { shared }
    }

    // ---- accessors ----

    pub fn state(&self) -> SubscriptionState {
        self.shared.lock().state.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.lock().state.is_subscribed
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared.lock().phase
    }

    pub fn record(&self) -> Option<SubscriptionRecord> {
        self.shared.lock().record.clone()
    }

    pub fn profile(&self) -> Option<DeviceProfile> {
        self.shared.lock().profile
    }

    pub fn server_config(&self) -> Option<ServerConfig> {
        self.shared.lock().server_config.clone()
    }

    pub fn last_error(&self) -> Option<PushError> {
        self.shared.lock().last_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading > 0
    }

    pub fn is_periodic_check_running(&self) -> bool {
        self.shared
            .checker_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.shared.platform
    }

    pub fn settings(&self) -> &PushSettings {
        &self.shared.settings
    }

    // ---- session ----

    /// Tell the controller who is signed in.
    ///
    /// Signing out (or switching user) discards the record, the state and
    /// the cached server config, and stops the periodic checks; the next
    /// sign-in starts from scratch. The same user with a refreshed cookie
    /// keeps everything.
    pub fn set_user(&self, user: Option<UserSession>) {
        let mut inner = self.shared.lock();

        let same_user = matches!(
            (&inner.session, &user),
            (Some(current), Some(next)) if current.user_id == next.user_id
        );
        if same_user {
            inner.session = user;
            return;
        }

        match &user {
            Some(next) => info!("push: user {} signed in", next.user_id),
            None if inner.session.is_some() => info!("push: user signed out, discarding state"),
            None => {}
        }

        let generation = inner.generation + 1;
        let loading = inner.loading;
        *inner = Inner {
            session: user,
            generation,
            loading,
            ..Inner::default()
        };
        drop(inner);

        // the checker would notice on its next tick, stop it now
        self.teardown();
    }

    // ---- initialize ----

    fn begin_initialize(&self) -> Option<(UserSession, u64)> {
        let mut inner = self.shared.lock();
        let session = inner.session.clone()?;
        if inner.initializing || inner.initialized {
            debug!("push initialize: already done or running");
            return None;
        }
        inner.initializing = true;
        inner.phase = LifecyclePhase::CheckingSupport;
        inner.last_error = None;
        Some((session, inner.generation))
    }

    /// Background bootstrap for a freshly signed-in user.
    ///
    /// Detects support, probes the server config, and when both are fine runs
    /// one status check and starts the periodic checker. Concurrent or
    /// repeated calls are no-ops. Errors land in [`Self::last_error`].
    pub async fn initialize(&self) {
        let Some((session, generation)) = self.begin_initialize() else {
            return;
        };

        let outcome = self.bootstrap(&session, generation).await;

        let start_checker = self
            .shared
            .with_session(generation, |inner| {
                inner.initializing = false;
                match outcome {
                    Ok(Bootstrap::Unsupported) => {
                        inner.phase = LifecyclePhase::Unsupported;
                        inner.initialized = true;
                        false
                    }
                    Ok(Bootstrap::Unauthenticated) => {
                        inner.phase = LifecyclePhase::Uninitialized;
                        false
                    }
                    Ok(Bootstrap::Unconfigured) => {
                        inner.phase = LifecyclePhase::SupportedUnconfigured;
                        inner.initialized = true;
                        false
                    }
                    Ok(Bootstrap::Ready) => {
                        inner.initialized = true;
                        if !inner.phase.is_settled() {
                            inner.phase = inner.settled_phase();
                        }
                        true
                    }
                    Err(err) => {
                        error!("push initialize failed: {err}");
                        inner.phase = LifecyclePhase::Uninitialized;
                        inner.last_error = Some(err);
                        false
                    }
                }
            })
            .unwrap_or(false);

        if start_checker {
            self.start_periodic_checks(generation);
        }
    }

    async fn bootstrap(
        &self,
        session: &UserSession,
        generation: u64,
    ) -> Result<Bootstrap, PushError> {
        let platform = &*self.shared.platform;
        let profile = detect(platform);
        let caps = platform.capabilities();
        self.shared
            .with_session(generation, |inner| inner.profile = Some(profile));

        if !is_push_supported(&profile, &caps) {
            info!("push not supported: {profile:?} {caps:?}");
            return Ok(Bootstrap::Unsupported);
        }

        let Some(config) = self.shared.client.fetch_config(session.cookie()).await? else {
            return Ok(Bootstrap::Unauthenticated);
        };
        let configured = config.configured;
        self.shared
            .with_session(generation, |inner| inner.server_config = Some(config));

        if !configured {
            info!("push not configured on the server");
            return Ok(Bootstrap::Unconfigured);
        }

        self.shared.set_phase(generation, LifecyclePhase::Ready);
        if let Err(err) = self.reconcile_for(session, generation).await {
            warn!("initial push status check failed: {err}");
            self.shared
                .with_session(generation, |inner| inner.last_error = Some(err));
        }

        Ok(Bootstrap::Ready)
    }

    // ---- status ----

    /// Run the reconciler and apply its result if `generation` is still
    /// signed in.
    pub(crate) async fn reconcile_for(
        &self,
        session: &UserSession,
        generation: u64,
    ) -> Result<(), PushError> {
        let platform = &*self.shared.platform;
        let profile = detect(platform);
        let reconciled = Reconciler::new(platform, &self.shared.client, session.cookie())
            .reconcile(&profile)
            .await?;

        let Some(reconciled) = reconciled else {
            return Ok(());
        };

        let applied = self.shared.with_session(generation, |inner| {
            inner.profile = Some(profile);
            inner.record = reconciled.record;
            inner.state = reconciled.state;
            if inner.phase.is_settled() {
                inner.phase = inner.settled_phase();
            }
        });

        if applied.is_none() {
            debug!("push status arrived after sign out, ignoring");
        }
        Ok(())
    }

    /// Recompute the subscription state now.
    pub async fn refresh_subscription_status(&self) -> Result<(), PushError> {
        let Some((session, generation)) = self.shared.current_session() else {
            return Ok(());
        };
        self.reconcile_for(&session, generation).await
    }

    fn start_periodic_checks(&self, generation: u64) {
        let handle = checker::spawn(
            Arc::downgrade(&self.shared),
            generation,
            self.shared.settings.status_poll_interval(),
        );
        if let Some(previous) = self.shared.checker_slot().replace(handle) {
            previous.abort();
        }
    }

    /// Stop background work. The controller stays usable.
    pub fn teardown(&self) {
        if let Some(handle) = self.shared.checker_slot().take() {
            handle.abort();
            info!("push: periodic status checks stopped");
        }
    }

    // ---- permission ----

    /// Ask for notification permission. This is the only operation that
    /// may show a native dialog.
    pub async fn request_permission(&self) -> Result<Permission, PushError> {
        let platform = &*self.shared.platform;
        if !is_push_supported(&detect(platform), &platform.capabilities()) {
            return Err(PushError::not_supported());
        }

        let cached = self.shared.lock().server_config.clone();
        let config = match cached {
            Some(config) => config,
            None => {
                let cookie = self
                    .shared
                    .lock()
                    .session
                    .as_ref()
                    .and_then(|s| s.cookie.clone());
                self.shared
                    .client
                    .fetch_config(cookie.as_deref())
                    .await?
                    .ok_or_else(PushError::auth_required)?
            }
        };

        if !config.configured {
            return Err(PushError::not_configured());
        }

        self.prompt().await
    }

    async fn prompt(&self) -> Result<Permission, PushError> {
        let answer = bounded(
            self.shared.settings.request_timeout(),
            "permission prompt",
            self.shared.platform.request_permission(),
        )
        .await??;

        if answer == Permission::Granted {
            Ok(answer)
        } else {
            Err(PushError::permission_denied())
        }
    }

    async fn ensure_permission(&self) -> Result<(), PushError> {
        match self.shared.platform.notification_permission() {
            Permission::Granted => Ok(()),
            Permission::Denied => Err(PushError::permission_denied()),
            Permission::Default => self.prompt().await.map(|_| ()),
        }
    }

    // ---- subscribe ----

    /// Subscribe this device and register it with the server.
    ///
    /// On success the state is optimistically subscribed and a confirming
    /// status check runs after the configured delay; its answer wins. A
    /// failure returns a transient phase to `Ready`.
    pub async fn subscribe(&self) -> Result<(), PushError> {
        let Some((session, generation)) = self.shared.current_session() else {
            let err = PushError::auth_required();
            self.shared.lock().last_error = Some(err.clone());
            return Err(err);
        };

        let _loading = self.shared.begin_loading();
        match self.try_subscribe(&session, generation).await {
            Ok(()) => {
                self.schedule_confirmation(session, generation);
                Ok(())
            }
            Err(err) => Err(self
                .shared
                .fail_with(generation, err, |_| LifecyclePhase::Ready)),
        }
    }

    async fn try_subscribe(&self, session: &UserSession, generation: u64) -> Result<(), PushError> {
        let platform = &*self.shared.platform;
        let profile = detect(platform);
        let caps = platform.capabilities();

        if !is_push_supported(&profile, &caps) {
            self.shared.set_phase(generation, LifecyclePhase::Unsupported);
            return Err(PushError::not_supported());
        }

        // always fresh, a stale public key gives undeliverable subscriptions
        let config = self
            .shared
            .client
            .fetch_config(session.cookie())
            .await?
            .ok_or_else(PushError::auth_required)?;
        let configured = config.configured;
        let public_key = config.public_key.clone();
        self.shared.with_session(generation, |inner| {
            inner.profile = Some(profile);
            inner.server_config = Some(config);
        });

        if !configured {
            self.shared.set_phase(generation, LifecyclePhase::SupportedUnconfigured);
            return Err(PushError::not_configured());
        }

        self.shared.set_phase(generation, LifecyclePhase::RequestingPermission);
        self.ensure_permission().await?;

        let record = if profile.is_mobile {
            self.shared.set_phase(generation, LifecyclePhase::CreatingSubscription);
            self.mobile_record(&profile, &caps, public_key.as_deref()).await
        } else {
            let key = desktop_key(public_key.as_deref())?;
            self.ensure_worker_control().await?;

            self.shared.set_phase(generation, LifecyclePhase::CreatingSubscription);
            match self.desktop_record(&profile, key).await {
                Ok(record) => record,
                Err(err) => {
                    // the previous platform subscription may already be gone
                    let permission = platform.notification_permission();
                    self.shared.discard_subscription(generation, permission);
                    return Err(err);
                }
            }
        };

        self.shared.set_phase(generation, LifecyclePhase::RegisteringWithServer);
        let user_agent = platform.user_agent();
        let request = RegisterRequest::new(&record, &profile, &user_agent);
        if let Err(err) = self.shared.client.register(session.cookie(), &request).await {
            if record.as_real().is_some() {
                self.drop_platform_subscription().await;
            }
            let permission = platform.notification_permission();
            self.shared.discard_subscription(generation, permission);
            return Err(err);
        }

        info!(
            "push subscription registered (mobile={} fallback={})",
            profile.is_mobile,
            record.is_mobile_fallback()
        );

        let permission = platform.notification_permission();
        self.shared.with_session(generation, |inner| {
            inner.record = Some(record);
            inner.state = SubscriptionState::optimistic(permission);
            inner.phase = LifecyclePhase::Subscribed;
            inner.last_error = None;
        });
        Ok(())
    }

    /// Desktop: the real push stack or nothing.
    async fn desktop_record(
        &self,
        profile: &DeviceProfile,
        key: &str,
    ) -> Result<SubscriptionRecord, PushError> {
        self.replace_existing_subscription().await;

        let subscription = bounded(
            self.shared.settings.request_timeout(),
            "push subscribe",
            self.shared.platform.subscribe(key),
        )
        .await??;

        Ok(SubscriptionRecord::real(subscription, profile))
    }

    /// Mobile: try the real push stack, fall back to a placeholder.
    async fn mobile_record(
        &self,
        profile: &DeviceProfile,
        caps: &PushCapabilities,
        public_key: Option<&str>,
    ) -> SubscriptionRecord {
        match self.try_platform_subscribe(caps, public_key).await {
            Ok(subscription) => SubscriptionRecord::real(subscription, profile),
            Err(err) => {
                info!("mobile push subscribe unavailable ({err}), using limited fallback");
                SubscriptionRecord::placeholder(&self.shared.platform.user_agent())
            }
        }
    }

    async fn try_platform_subscribe(
        &self,
        caps: &PushCapabilities,
        public_key: Option<&str>,
    ) -> Result<PushSubscription, PushError> {
        if !caps.supports_full_push() {
            return Err(PushError::Platform("push manager unavailable".to_owned()));
        }
        let key = public_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PushError::NotConfigured("no public key".to_owned()))?;

        self.replace_existing_subscription().await;

        Ok(bounded(
            self.shared.settings.request_timeout(),
            "push subscribe",
            self.shared.platform.subscribe(key),
        )
        .await??)
    }

    /// The worker must control the page before subscribing. Asks a waiting
    /// worker to take over once; if that is not enough the page needs a
    /// reload, which is surfaced rather than retried.
    async fn ensure_worker_control(&self) -> Result<(), PushError> {
        let platform = &*self.shared.platform;
        if platform.is_worker_controlling() {
            return Ok(());
        }

        info!("background worker not in control, asking it to skip waiting");
        platform.skip_waiting();
        tokio::time::sleep(self.shared.settings.worker_takeover_delay()).await;

        if platform.is_worker_controlling() {
            Ok(())
        } else {
            Err(PushError::worker_not_in_control())
        }
    }

    /// Unsubscribe-then-resubscribe so no orphaned registration is left
    /// behind on the push service.
    async fn replace_existing_subscription(&self) {
        let existing = bounded(
            self.shared.settings.request_timeout(),
            "push get subscription",
            self.shared.platform.get_subscription(),
        )
        .await;

        match existing {
            Ok(Ok(Some(_))) => self.drop_platform_subscription().await,
            Ok(Ok(None)) => {}
            Ok(Err(err)) => debug!("could not read existing push subscription: {err}"),
            Err(err) => debug!("{err}"),
        }
    }

    /// Best-effort platform unsubscribe. Errors are logged, not returned.
    async fn drop_platform_subscription(&self) {
        let result = bounded(
            self.shared.settings.request_timeout(),
            "push unsubscribe",
            self.shared.platform.unsubscribe(),
        )
        .await;

        match result {
            Ok(Ok(true)) => debug!("dropped platform push subscription"),
            Ok(Ok(false)) => {}
            Ok(Err(err)) => debug!("platform unsubscribe failed: {err}"),
            Err(err) => debug!("{err}"),
        }
    }

    fn schedule_confirmation(&self, session: UserSession, generation: u64) {
        let shared = Arc::downgrade(&self.shared);
        let delay = self.shared.settings.confirmation_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let controller = PushController::from_shared(shared);
            if let Err(err) = controller.reconcile_for(&session, generation).await {
                warn!("confirming push subscription failed: {err}");
            }
        });
    }

    // ---- unsubscribe ----

    /// Remove this device's subscription. A no-op without a local record.
    pub async fn unsubscribe(&self) -> Result<(), PushError> {
        let (record, session, generation) = {
            let inner = self.shared.lock();
            let Some(record) = inner.record.clone() else {
                debug!("push unsubscribe: nothing to remove");
                return Ok(());
            };
            let Some(session) = inner.session.clone() else {
                return Err(PushError::auth_required());
            };
            (record, session, inner.generation)
        };

        let _loading = self.shared.begin_loading();
        self.shared.set_phase(generation, LifecyclePhase::Unsubscribing);

        // the server-side removal is what matters, the platform part may fail
        if record.as_real().is_some() {
            self.drop_platform_subscription().await;
        }

        if let Err(err) = self
            .shared
            .client
            .unregister(session.cookie(), record.endpoint())
            .await
        {
            return Err(self.shared.fail(generation, err));
        }

        let permission = self.shared.platform.notification_permission();
        self.shared.with_session(generation, |inner| {
            inner.record = None;
            inner.state = SubscriptionState::unsubscribed(permission);
            inner.phase = LifecyclePhase::Ready;
            inner.last_error = None;
        });
        info!("push subscription removed");

        if let Err(err) = self.reconcile_for(&session, generation).await {
            warn!("push status check after unsubscribe failed: {err}");
        }
        Ok(())
    }

    // ---- self test ----

    /// Ask the server to push a test notification to this user.
    pub async fn send_test_notification(&self) -> Result<(), PushError> {
        let Some((session, generation)) = self.shared.current_session() else {
            return Err(PushError::auth_required());
        };

        let _loading = self.shared.begin_loading();
        let request = SendRequest::self_test(&self.shared.settings.app_name);
        if let Err(err) = self.shared.client.send(session.cookie(), &request).await {
            return Err(self.shared.fail(generation, err));
        }

        self.shared.platform.vibrate(TEST_VIBRATION);
        info!("test notification requested");
        Ok(())
    }
}

/// Desktop subscriptions need the server's public key.
fn desktop_key(public_key: Option<&str>) -> Result<&str, PushError> {
    public_key.filter(|k| !k.is_empty()).ok_or_else(|| {
        PushError::NotConfigured("the server did not provide a public key".to_owned())
    })
}
