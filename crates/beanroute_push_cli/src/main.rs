mod args;

use std::process::ExitCode;
use std::sync::Arc;

use args::{Args, Command};
use beanroute_push::{
    EhttpTransport, HttpTransport, PushController, PushError, PushPlatform, PushSettings,
    UserSession,
};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: beanroute-push [--settings P] [--base-url U] [--user ID] [--cookie C] \
[--device desktop|ios|ios-pwa|android|android-pwa] [--log-dir D] <status|subscribe|unsubscribe|send-test>";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum CliError {
    #[error(transparent)]
    Push(#[from] PushError),

    #[error("this device has no push subscription to remove")]
    NothingToRemove,
}

/// The returned guard flushes the file writer and must live until exit.
fn setup_logging(log_dir: Option<&str>) -> Option<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beanroute_push=info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    use tracing_appender::{
        non_blocking,
        rolling::{RollingFileAppender, Rotation},
    };

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        format!("beanroute-push-{}.log", env!("CARGO_PKG_VERSION")),
    );
    let (non_blocking_writer, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_writer);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Some(guard)
}

fn report<P: PushPlatform, T: HttpTransport>(controller: &PushController<P, T>) {
    let state = controller.state();
    println!("phase:       {}", controller.phase());
    println!("subscribed:  {}", state.is_subscribed);
    println!("optimistic:  {}", state.optimistic);
    println!("permission:  {:?}", state.permission);
    if let Some(checked) = state.last_checked_at {
        println!("checked at:  {}", checked.to_rfc3339());
    }
    if let Some(record) = controller.record() {
        println!("endpoint:    {}", record.endpoint());
        println!("fallback:    {}", record.is_mobile_fallback());
    }
    if let Some(profile) = controller.profile() {
        println!(
            "device:      mobile={} os={} standalone={}",
            profile.is_mobile, profile.os_family, profile.is_standalone_app
        );
        if let Some(hint) = profile.install_hint() {
            println!("hint:        {hint}");
        }
    }
    if let Some(err) = controller.last_error() {
        println!("last error:  {err}");
    }
}

async fn execute<P: PushPlatform, T: HttpTransport>(
    controller: &PushController<P, T>,
    command: Command,
) -> Result<(), CliError> {
    match command {
        Command::Status => {
            controller.initialize().await;
            match controller.last_error() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
        Command::Subscribe => Ok(controller.subscribe().await?),
        Command::Unsubscribe => {
            // learn which record the server holds for this device first
            controller.initialize().await;
            if let Some(err) = controller.last_error() {
                return Err(err.into());
            }
            if controller.record().is_none() {
                return Err(CliError::NothingToRemove);
            }
            Ok(controller.unsubscribe().await?)
        }
        Command::SendTest => Ok(controller.send_test_notification().await?),
    }
}

async fn run(args: Args, command: Command) -> Result<(), CliError> {
    let mut settings = match &args.settings {
        Some(path) => PushSettings::load(path)?,
        None => PushSettings::default(),
    };
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }

    let transport = Arc::new(EhttpTransport::new(settings.base()?));
    let platform = Arc::new(args.device.platform());
    let controller = PushController::new(platform, transport, settings);

    let session = args.user.map(|user| match args.cookie {
        Some(cookie) => UserSession::new(user).with_cookie(cookie),
        None => UserSession::new(user),
    });
    controller.set_user(session);

    info!("running {command} as {} device", args.device);

    let result = execute(&controller, command).await;

    report(&controller);
    controller.teardown();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let (args, unrecognized) = Args::parse(&raw);

    #[allow(unused_variables)] // need guard to live for lifetime of program
    let guard = setup_logging(args.log_dir.as_deref());

    if !unrecognized.is_empty() {
        error!("unrecognized arguments: {unrecognized:?}");
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    let Some(command) = args.command else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    match run(args, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{command} failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beanroute_push::api::{CONFIG_PATH, UNSUBSCRIBE_PATH, USER_STATUS_PATH};
    use beanroute_push::{HeadlessPlatform, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn controller(
        platform: HeadlessPlatform,
        server_says: bool,
    ) -> (
        PushController<HeadlessPlatform, ScriptedTransport>,
        Arc<ScriptedTransport>,
    ) {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(
                CONFIG_PATH,
                200,
                json!({ "configured": true, "publicKey": "BPublicKey" }),
            )
            .respond(USER_STATUS_PATH, 200, json!({ "subscribed": server_says }))
            .respond(UNSUBSCRIBE_PATH, 200, json!({ "ok": true }));
        let controller = PushController::new(
            Arc::new(platform),
            transport.clone(),
            PushSettings::default(),
        );
        controller.set_user(Some(UserSession::new("u1")));
        (controller, transport)
    }

    #[tokio::test]
    async fn unsubscribe_without_a_local_record_fails() {
        // the server remembers a subscription this browser no longer has
        let (controller, transport) = controller(HeadlessPlatform::desktop_chrome(), true);

        let result = execute(&controller, Command::Unsubscribe).await;

        assert_eq!(result, Err(CliError::NothingToRemove));
        assert_eq!(transport.count(UNSUBSCRIBE_PATH), 0);
        controller.teardown();
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_server_record() {
        let (controller, transport) = controller(HeadlessPlatform::android_chrome(), true);

        execute(&controller, Command::Unsubscribe)
            .await
            .expect("unsubscribe");

        assert_eq!(transport.count(UNSUBSCRIBE_PATH), 1);
        assert!(!controller.is_subscribed());
        controller.teardown();
    }

    #[tokio::test]
    async fn status_surfaces_server_failures() {
        let (controller, transport) = controller(HeadlessPlatform::desktop_chrome(), false);
        transport.respond(CONFIG_PATH, 500, json!({ "error": "boom" }));

        let result = execute(&controller, Command::Status).await;

        assert!(matches!(result, Err(CliError::Push(PushError::Config(_)))));
        controller.teardown();
    }
}
