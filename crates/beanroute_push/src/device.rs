//! Capability detection.
//!
//! Classifies the device from the user agent and decides whether push is
//! usable at all. Desktop needs the full push stack; mobile browsers only
//! need the notification API, since a degraded local-only mode beats
//! declaring the device unsupported.

use crate::platform::PushPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OsFamily {
    Ios,
    Android,
    Other,
}

/// Raw feature checks reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushCapabilities {
    pub notification_api: bool,
    pub service_worker_api: bool,
    pub push_manager_api: bool,
}

impl PushCapabilities {
    pub fn full() -> Self {
        Self {
            notification_api: true,
            service_worker_api: true,
            push_manager_api: true,
        }
    }

    /// Worker plus push manager, i.e. a real push subscription is possible.
    pub fn supports_full_push(&self) -> bool {
        self.service_worker_api && self.push_manager_api
    }
}

/// What kind of device we are running on. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub os_family: OsFamily,
    pub is_standalone_app: bool,
}

const MOBILE_MARKERS: &[&str] = &["mobile", "webos", "blackberry", "iemobile", "opera mini"];
const IOS_MARKERS: &[&str] = &["iphone", "ipad", "ipod"];

impl DeviceProfile {
    pub fn from_user_agent(user_agent: &str, is_standalone_app: bool) -> Self {
        let ua = user_agent.to_ascii_lowercase();

        let os_family = if IOS_MARKERS.iter().any(|m| ua.contains(m)) {
            OsFamily::Ios
        } else if ua.contains("android") {
            OsFamily::Android
        } else {
            OsFamily::Other
        };

        let is_mobile =
            os_family != OsFamily::Other || MOBILE_MARKERS.iter().any(|m| ua.contains(m));

        Self {
            is_mobile,
            os_family,
            is_standalone_app,
        }
    }

    pub fn is_ios(&self) -> bool {
        self.os_family == OsFamily::Ios
    }

    pub fn is_android(&self) -> bool {
        self.os_family == OsFamily::Android
    }

    /// Actionable hint for the UI. Installing to the home screen makes
    /// notifications far more reliable on iOS, but nothing is gated on it.
    pub fn install_hint(&self) -> Option<&'static str> {
        if self.is_ios() && !self.is_standalone_app {
            Some("Add BeanRoute to your home screen to receive notifications reliably.")
        } else {
            None
        }
    }
}

/// Inspect the platform. No I/O, no errors.
pub fn detect<P: PushPlatform + ?Sized>(platform: &P) -> DeviceProfile {
    DeviceProfile::from_user_agent(&platform.user_agent(), platform.is_standalone_display())
}

pub fn is_push_supported(profile: &DeviceProfile, caps: &PushCapabilities) -> bool {
    if profile.is_mobile {
        caps.notification_api
    } else {
        caps.notification_api && caps.supports_full_push()
    }
}
