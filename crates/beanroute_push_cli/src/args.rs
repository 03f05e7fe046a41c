use std::collections::BTreeSet;
use std::str::FromStr;

use beanroute_push::HeadlessPlatform;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    Status,
    Subscribe,
    Unsubscribe,
    SendTest,
}

/// Which browser the headless platform pretends to be.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum DevicePreset {
    #[default]
    Desktop,
    Ios,
    IosPwa,
    Android,
    AndroidPwa,
}

impl DevicePreset {
    pub fn platform(self) -> HeadlessPlatform {
        match self {
            DevicePreset::Desktop => HeadlessPlatform::desktop_chrome(),
            DevicePreset::Ios => HeadlessPlatform::ios_safari(),
            DevicePreset::IosPwa => HeadlessPlatform::ios_pwa(),
            DevicePreset::Android => HeadlessPlatform::android_chrome(),
            DevicePreset::AndroidPwa => HeadlessPlatform::android_pwa(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub settings: Option<String>,
    pub base_url: Option<String>,
    pub user: Option<String>,
    pub cookie: Option<String>,
    pub device: DevicePreset,
    pub log_dir: Option<String>,
    pub command: Option<Command>,
}

impl Args {
    // parse arguments, return set of unrecognized args
    pub fn parse(args: &[String]) -> (Self, BTreeSet<String>) {
        let mut unrecognized_args = BTreeSet::new();
        let mut res = Args::default();

        let mut i = 0;
        let len = args.len();
        while i < len {
            let arg = &args[i];

            if arg == "--settings" {
                i += 1;
                let Some(path) = args.get(i) else {
                    error!("settings argument missing?");
                    continue;
                };
                res.settings = Some(path.clone());
            } else if arg == "--base-url" {
                i += 1;
                let Some(url) = args.get(i) else {
                    error!("base-url argument missing?");
                    continue;
                };
                res.base_url = Some(url.clone());
            } else if arg == "--user" {
                i += 1;
                let Some(user) = args.get(i) else {
                    error!("user argument missing?");
                    continue;
                };
                res.user = Some(user.clone());
            } else if arg == "--cookie" {
                i += 1;
                let Some(cookie) = args.get(i) else {
                    error!("cookie argument missing?");
                    continue;
                };
                res.cookie = Some(cookie.clone());
            } else if arg == "--device" {
                i += 1;
                let Some(device) = args.get(i) else {
                    error!("device argument missing?");
                    continue;
                };
                match DevicePreset::from_str(device) {
                    Ok(device) => res.device = device,
                    Err(_) => {
                        error!("unknown device '{device}', expected desktop, ios, ios-pwa, android or android-pwa");
                        unrecognized_args.insert(device.clone());
                    }
                }
            } else if arg == "--log-dir" {
                i += 1;
                let Some(dir) = args.get(i) else {
                    error!("log-dir argument missing?");
                    continue;
                };
                res.log_dir = Some(dir.clone());
            } else if let (None, Ok(command)) = (res.command, Command::from_str(arg)) {
                res.command = Some(command);
            } else {
                unrecognized_args.insert(arg.clone());
            }

            i += 1;
        }

        (res, unrecognized_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_command() {
        let (args, unrecognized) = Args::parse(&strings(&[
            "--base-url",
            "https://beans.example.com",
            "--user",
            "u1",
            "--cookie",
            "sid=abc",
            "--device",
            "ios-pwa",
            "subscribe",
        ]));

        assert!(unrecognized.is_empty());
        assert_eq!(
            args,
            Args {
                base_url: Some("https://beans.example.com".to_owned()),
                user: Some("u1".to_owned()),
                cookie: Some("sid=abc".to_owned()),
                device: DevicePreset::IosPwa,
                command: Some(Command::Subscribe),
                ..Args::default()
            }
        );
    }

    #[test]
    fn leftovers_are_reported() {
        let (args, unrecognized) =
            Args::parse(&strings(&["status", "send-test", "--device", "fridge", "--verbose"]));

        assert_eq!(args.command, Some(Command::Status));
        assert_eq!(args.device, DevicePreset::Desktop);
        assert_eq!(
            unrecognized.into_iter().collect::<Vec<_>>(),
            strings(&["--verbose", "fridge", "send-test"])
        );
    }

    #[test]
    fn missing_value_is_not_fatal() {
        let (args, unrecognized) = Args::parse(&strings(&["status", "--user"]));
        assert_eq!(args.command, Some(Command::Status));
        assert_eq!(args.user, None);
        assert!(unrecognized.is_empty());
    }

    #[test]
    fn command_names() {
        assert_eq!(Command::SendTest.to_string(), "send-test");
        assert_eq!(DevicePreset::AndroidPwa.to_string(), "android-pwa");
    }
}
