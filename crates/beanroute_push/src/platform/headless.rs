use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::PushPlatform;
use crate::device::PushCapabilities;
use crate::error::PlatformError;
use crate::record::{PushSubscription, SubscriptionKeys};
use crate::state::Permission;

pub const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
pub const IOS_SAFARI_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
pub const ANDROID_CHROME_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Mobile Safari/537.36";

const PUSH_SERVICE: &str = "https://push.beanroute.invalid/send";

struct HeadlessState {
    user_agent: String,
    capabilities: PushCapabilities,
    standalone: bool,
    permission: Permission,
    /// What the next prompt answers.
    prompt_answer: Permission,
    worker_controlling: bool,
    /// Whether `skip_waiting` makes a waiting worker take over.
    worker_waiting: bool,
    subscription: Option<PushSubscription>,
    subscribe_error: Option<PlatformError>,
    get_subscription_error: Option<PlatformError>,
    get_subscription_hangs: bool,

    prompts: usize,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    vibrations: Vec<Vec<u32>>,
}

/// An in-memory platform.
///
/// Behaves like a browser whose answers are set up front: the permission
/// prompt answers `prompt_answer`, the push manager hands out fresh
/// subscriptions, and every interaction is counted so callers can assert
/// on what happened.
pub struct HeadlessPlatform {
    state: Mutex<HeadlessState>,
}

impl HeadlessPlatform {
    pub fn new(user_agent: impl Into<String>, capabilities: PushCapabilities) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                user_agent: user_agent.into(),
                capabilities,
                standalone: false,
                permission: Permission::Default,
                prompt_answer: Permission::Granted,
                worker_controlling: capabilities.service_worker_api,
                worker_waiting: false,
                subscription: None,
                subscribe_error: None,
                get_subscription_error: None,
                get_subscription_hangs: false,
                prompts: 0,
                subscribe_calls: 0,
                unsubscribe_calls: 0,
                vibrations: Vec::new(),
            }),
        }
    }

    pub fn desktop_chrome() -> Self {
        Self::new(DESKTOP_CHROME_UA, PushCapabilities::full())
    }

    /// iOS Safari in a browser tab: notifications exist, the push stack
    /// does not.
    pub fn ios_safari() -> Self {
        Self::new(
            IOS_SAFARI_UA,
            PushCapabilities {
                notification_api: true,
                ..Default::default()
            },
        )
    }

    pub fn ios_pwa() -> Self {
        Self::new(IOS_SAFARI_UA, PushCapabilities::full()).with_standalone(true)
    }

    pub fn android_chrome() -> Self {
        Self::new(ANDROID_CHROME_UA, PushCapabilities::full())
    }

    pub fn android_pwa() -> Self {
        Self::android_chrome().with_standalone(true)
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_standalone(self, standalone: bool) -> Self {
        self.lock().standalone = standalone;
        self
    }

    pub fn with_permission(self, permission: Permission) -> Self {
        self.lock().permission = permission;
        self
    }

    pub fn with_prompt_answer(self, answer: Permission) -> Self {
        self.lock().prompt_answer = answer;
        self
    }

    pub fn with_subscription(self, subscription: PushSubscription) -> Self {
        self.lock().subscription = Some(subscription);
        self
    }

    /// Start with a worker that is installed but waiting. It takes control
    /// when told to skip waiting only if `takes_over` is set.
    pub fn with_waiting_worker(self, takes_over: bool) -> Self {
        {
            let mut state = self.lock();
            state.worker_controlling = false;
            state.worker_waiting = takes_over;
        }
        self
    }

    pub fn set_permission(&self, permission: Permission) {
        self.lock().permission = permission;
    }

    pub fn set_worker_controlling(&self, controlling: bool) {
        self.lock().worker_controlling = controlling;
    }

    pub fn set_subscription(&self, subscription: Option<PushSubscription>) {
        self.lock().subscription = subscription;
    }

    pub fn fail_subscribe(&self, error: Option<PlatformError>) {
        self.lock().subscribe_error = error;
    }

    pub fn fail_get_subscription(&self, error: Option<PlatformError>) {
        self.lock().get_subscription_error = error;
    }

    /// Make `get_subscription` never resolve, like a wedged worker.
    pub fn hang_get_subscription(&self, hang: bool) {
        self.lock().get_subscription_hangs = hang;
    }

    pub fn current_subscription(&self) -> Option<PushSubscription> {
        self.lock().subscription.clone()
    }

    pub fn prompts(&self) -> usize {
        self.lock().prompts
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.lock().unsubscribe_calls
    }

    pub fn vibrations(&self) -> Vec<Vec<u32>> {
        self.lock().vibrations.clone()
    }
}

fn fresh_subscription() -> PushSubscription {
    let id = Uuid::new_v4().simple().to_string();
    PushSubscription {
        endpoint: format!("{PUSH_SERVICE}/{id}"),
        keys: SubscriptionKeys {
            p256dh: format!("p256dh-{id}"),
            auth: format!("auth-{}", &id[..8]),
        },
    }
}

#[async_trait::async_trait]
impl PushPlatform for HeadlessPlatform {
    fn user_agent(&self) -> String {
        self.lock().user_agent.clone()
    }

    fn capabilities(&self) -> PushCapabilities {
        self.lock().capabilities
    }

    fn is_standalone_display(&self) -> bool {
        self.lock().standalone
    }

    fn notification_permission(&self) -> Permission {
        self.lock().permission
    }

    async fn request_permission(&self) -> Result<Permission, PlatformError> {
        let mut state = self.lock();
        if !state.capabilities.notification_api {
            return Err(PlatformError::Unavailable(
                "Notification API missing".to_owned(),
            ));
        }

        state.prompts += 1;
        // the browser only asks once, later calls return the stored answer
        if state.permission == Permission::Default {
            state.permission = state.prompt_answer;
        }
        Ok(state.permission)
    }

    fn is_worker_controlling(&self) -> bool {
        self.lock().worker_controlling
    }

    fn skip_waiting(&self) {
        let mut state = self.lock();
        if state.worker_waiting {
            debug!("headless worker took control after skip waiting");
            state.worker_controlling = true;
            state.worker_waiting = false;
        }
    }

    async fn get_subscription(&self) -> Result<Option<PushSubscription>, PlatformError> {
        if self.lock().get_subscription_hangs {
            return std::future::pending().await;
        }
        let state = self.lock();
        if let Some(err) = &state.get_subscription_error {
            return Err(err.clone());
        }
        if !state.capabilities.supports_full_push() {
            return Err(PlatformError::Unavailable(
                "PushManager missing".to_owned(),
            ));
        }
        Ok(state.subscription.clone())
    }

    async fn subscribe(
        &self,
        application_server_key: &str,
    ) -> Result<PushSubscription, PlatformError> {
        let mut state = self.lock();
        state.subscribe_calls += 1;

        if let Some(err) = &state.subscribe_error {
            return Err(err.clone());
        }
        if !state.capabilities.supports_full_push() {
            return Err(PlatformError::Unavailable(
                "PushManager missing".to_owned(),
            ));
        }
        if application_server_key.is_empty() {
            return Err(PlatformError::Rejected(
                "applicationServerKey is empty".to_owned(),
            ));
        }

        let subscription = fresh_subscription();
        state.subscription = Some(subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, PlatformError> {
        let mut state = self.lock();
        state.unsubscribe_calls += 1;
        Ok(state.subscription.take().is_some())
    }

    fn vibrate(&self, pattern: &[u32]) {
        self.lock().vibrations.push(pattern.to_vec());
    }
}
