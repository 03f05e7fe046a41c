//! Platform trait for the browser primitives push depends on.
//!
//! This trait abstracts over the pieces of the browser the controller talks to:
//! - notification permission and its prompt
//! - the background worker (service worker) and whether it controls the page
//! - the push manager's `getSubscription` / `subscribe` / `unsubscribe`
//!
//! A wasm host implements it over `web_sys`; [`HeadlessPlatform`] keeps
//! everything in memory for tests and the command line front end.

mod headless;

pub use headless::{HeadlessPlatform, ANDROID_CHROME_UA, DESKTOP_CHROME_UA, IOS_SAFARI_UA};

use crate::device::PushCapabilities;
use crate::error::PlatformError;
use crate::record::PushSubscription;
use crate::state::Permission;

#[async_trait::async_trait]
pub trait PushPlatform: Send + Sync + 'static {
    /// The raw user agent string.
    fn user_agent(&self) -> String;

    /// Which notification primitives exist. Missing features are `false`.
    fn capabilities(&self) -> PushCapabilities;

    /// Whether the app runs from a home-screen icon (standalone display mode).
    fn is_standalone_display(&self) -> bool;

    /// Current permission, without prompting.
    fn notification_permission(&self) -> Permission;

    /// Show the native permission prompt and return the user's answer.
    async fn request_permission(&self) -> Result<Permission, PlatformError>;

    /// Whether the background worker currently controls this page.
    fn is_worker_controlling(&self) -> bool;

    /// Ask a waiting worker to skip its waiting state and take control.
    fn skip_waiting(&self);

    async fn get_subscription(&self) -> Result<Option<PushSubscription>, PlatformError>;

    /// Open a new push subscription with the server's public key.
    async fn subscribe(&self, application_server_key: &str)
        -> Result<PushSubscription, PlatformError>;

    /// Drop the current push subscription. Returns whether one existed.
    async fn unsubscribe(&self) -> Result<bool, PlatformError>;

    /// Fire-and-forget vibration. Platforms without it ignore the call.
    fn vibrate(&self, pattern: &[u32]);
}
