//! Client-side push notification subscriptions for BeanRoute.
//!
//! [`PushController`] drives the whole flow: it detects whether the device can
//! receive push, probes the server configuration, subscribes and registers
//! the device, and keeps the subscribed flag honest by reconciling it with
//! the server every so often. The browser is reached through
//! [`PushPlatform`] and the backend through [`HttpTransport`], so the same
//! controller runs against a real browser, a headless platform, or canned
//! responses.

pub mod api;
mod checker;
mod controller;
pub mod device;
mod error;
pub mod platform;
mod reconcile;
pub mod record;
mod settings;
mod state;

pub use api::{
    EhttpTransport, HttpRequest, HttpResponse, HttpTransport, PushClient, ScriptedTransport,
    ServerConfig,
};
pub use controller::PushController;
pub use device::{detect, is_push_supported, DeviceProfile, OsFamily, PushCapabilities};
pub use error::{PlatformError, PushError, TransportError};
pub use platform::{HeadlessPlatform, PushPlatform};
pub use reconcile::{Reconciled, Reconciler};
pub use record::{PushSubscription, SubscriptionKeys, SubscriptionRecord};
pub use settings::PushSettings;
pub use state::{LifecyclePhase, Permission, SubscriptionState, UserSession};

pub type Result<T> = std::result::Result<T, PushError>;
