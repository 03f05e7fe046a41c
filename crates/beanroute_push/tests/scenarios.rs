use beanroute_push::api::{CONFIG_PATH, SUBSCRIBE_PATH, UNSUBSCRIBE_PATH, USER_STATUS_PATH};
use beanroute_push::{
    HeadlessPlatform, LifecyclePhase, OsFamily, Permission, PlatformError, PushController,
    PushError, PushPlatform, PushSettings, ScriptedTransport, UserSession,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    controller: PushController<HeadlessPlatform, ScriptedTransport>,
    platform: Arc<HeadlessPlatform>,
    transport: Arc<ScriptedTransport>,
}

fn harness(platform: HeadlessPlatform) -> Harness {
    let platform = Arc::new(platform);
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond(
            CONFIG_PATH,
            200,
            json!({ "configured": true, "publicKey": "BPublicKey" }),
        )
        .respond(USER_STATUS_PATH, 200, json!({ "subscribed": false }))
        .respond(SUBSCRIBE_PATH, 201, json!({ "ok": true }))
        .respond(UNSUBSCRIBE_PATH, 200, json!({ "ok": true }));

    let controller = PushController::new(
        platform.clone(),
        transport.clone(),
        PushSettings::default(),
    );
    Harness {
        controller,
        platform,
        transport,
    }
}

#[tokio::test(start_paused = true)]
async fn desktop_with_granted_permission_subscribes() {
    let h = harness(HeadlessPlatform::desktop_chrome().with_permission(Permission::Granted));
    h.controller.set_user(Some(UserSession::new("alice")));

    h.controller.subscribe().await.expect("subscribe");

    assert!(h.controller.is_subscribed());
    assert_eq!(h.controller.phase(), LifecyclePhase::Subscribed);
    assert_eq!(h.platform.prompts(), 0);

    let posts = h.transport.requests_to(SUBSCRIBE_PATH);
    assert_eq!(posts.len(), 1);
    let body = posts[0].body.clone().expect("body");
    assert_eq!(body["mobile"], false);
    assert_eq!(body["limited"], false);
    assert_eq!(body["pwa"], false);
    assert_eq!(body["userAgent"], h.platform.user_agent());
}

#[tokio::test(start_paused = true)]
async fn ios_safari_tab_falls_back_to_placeholder() {
    let h = harness(HeadlessPlatform::ios_safari());
    h.controller.set_user(Some(UserSession::new("bob")));
    h.controller.initialize().await;
    assert_eq!(h.controller.phase(), LifecyclePhase::Ready);

    let profile = h.controller.profile().expect("profile");
    assert!(profile.is_mobile);
    assert_eq!(profile.os_family, OsFamily::Ios);
    assert!(!profile.is_standalone_app);
    assert!(profile.install_hint().is_some());

    h.controller.subscribe().await.expect("subscribe");

    let record = h.controller.record().expect("record");
    assert!(record.is_mobile_fallback());
    assert!(record.is_limited());
    assert_eq!(h.platform.prompts(), 1);

    let body = h.transport.requests_to(SUBSCRIBE_PATH)[0]
        .body
        .clone()
        .expect("body");
    assert_eq!(body["mobile"], true);
    assert_eq!(body["limited"], true);
    assert!(body["subscription"]["endpoint"]
        .as_str()
        .is_some_and(|e| e.starts_with("mobile://")));

    // the confirming check keeps the placeholder since the server agrees
    h.transport.respond(USER_STATUS_PATH, 200, json!({ "subscribed": true }));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(h.controller.is_subscribed());
    assert!(!h.controller.state().optimistic);
    assert!(h
        .controller
        .record()
        .is_some_and(|r| r.is_mobile_fallback()));
    h.controller.teardown();
}

#[tokio::test(start_paused = true)]
async fn logout_stops_the_checker_before_its_next_tick() {
    let h = harness(HeadlessPlatform::desktop_chrome());
    h.controller.set_user(Some(UserSession::new("carol")));
    h.controller.initialize().await;
    assert!(h.controller.is_periodic_check_running());
    assert_eq!(h.transport.count(USER_STATUS_PATH), 1);

    tokio::time::sleep(Duration::from_secs(15)).await;
    h.controller.set_user(None);
    assert!(!h.controller.is_periodic_check_running());
    h.transport.clear_requests();

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.transport.count(USER_STATUS_PATH), 0);
    assert!(!h.controller.is_periodic_check_running());
}

#[tokio::test(start_paused = true)]
async fn checker_polls_while_signed_in() {
    let h = harness(HeadlessPlatform::desktop_chrome());
    h.controller.set_user(Some(UserSession::new("dave")));
    h.controller.initialize().await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.transport.count(USER_STATUS_PATH), 3);

    // failures are logged and the next tick still runs
    h.transport.fail(USER_STATUS_PATH, "offline");
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.transport.respond(USER_STATUS_PATH, 200, json!({ "subscribed": false }));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.transport.count(USER_STATUS_PATH), 5);
    assert!(h.controller.is_periodic_check_running());
    h.controller.teardown();
}

#[tokio::test(start_paused = true)]
async fn unconfigured_server_never_prompts() {
    let h = harness(HeadlessPlatform::desktop_chrome());
    h.transport.respond(CONFIG_PATH, 200, json!({ "configured": false }));
    h.controller.set_user(Some(UserSession::new("erin")));

    let err = h.controller.subscribe().await.expect_err("not configured");
    assert!(matches!(err, PushError::NotConfigured(_)));
    assert!(err.is_terminal_for_session());
    assert_eq!(h.platform.prompts(), 0);
    assert_eq!(h.transport.count(SUBSCRIBE_PATH), 0);
    assert_eq!(h.controller.phase(), LifecyclePhase::SupportedUnconfigured);
}

#[tokio::test]
async fn initialize_on_unconfigured_server_skips_the_checker() {
    let h = harness(HeadlessPlatform::desktop_chrome());
    h.transport.respond(CONFIG_PATH, 200, json!({ "configured": false }));
    h.controller.set_user(Some(UserSession::new("erin")));

    h.controller.initialize().await;

    assert_eq!(h.controller.phase(), LifecyclePhase::SupportedUnconfigured);
    assert!(!h.controller.is_periodic_check_running());
    assert_eq!(h.transport.count(USER_STATUS_PATH), 0);
}

#[tokio::test]
async fn mobile_subscribed_even_when_platform_lookup_fails() {
    let platform = HeadlessPlatform::android_chrome();
    platform.fail_get_subscription(Some(PlatformError::Unavailable("evicted".to_owned())));
    platform.set_worker_controlling(false);
    let h = harness(platform);
    h.transport.respond(USER_STATUS_PATH, 200, json!({ "subscribed": true }));
    h.controller.set_user(Some(UserSession::new("frank")));

    h.controller
        .refresh_subscription_status()
        .await
        .expect("refresh");

    assert!(h.controller.is_subscribed());
    assert!(h
        .controller
        .record()
        .is_some_and(|r| r.is_mobile_fallback()));
}

#[tokio::test]
async fn refreshing_twice_changes_nothing() {
    let h = harness(HeadlessPlatform::desktop_chrome());
    h.transport.respond(USER_STATUS_PATH, 200, json!({ "subscribed": true }));
    h.controller.set_user(Some(UserSession::new("grace")));
    h.platform.set_subscription(None);

    h.controller.refresh_subscription_status().await.expect("first");
    let first = (h.controller.state(), h.controller.record());
    h.controller.refresh_subscription_status().await.expect("second");
    let second = (h.controller.state(), h.controller.record());

    assert!(first.0.same_status(&second.0));
    assert_eq!(first.1, second.1);
}

#[tokio::test(start_paused = true)]
async fn android_pwa_gets_a_real_subscription() {
    let h = harness(HeadlessPlatform::android_pwa());
    h.controller.set_user(Some(UserSession::new("heidi")));

    h.controller.subscribe().await.expect("subscribe");

    let record = h.controller.record().expect("record");
    assert!(!record.is_mobile_fallback());
    assert!(!record.is_limited());
    assert_eq!(
        record.as_real().cloned(),
        h.platform.current_subscription()
    );
    let body = h.transport.requests_to(SUBSCRIBE_PATH)[0]
        .body
        .clone()
        .expect("body");
    assert_eq!(body["pwa"], true);
}

#[tokio::test(start_paused = true)]
async fn results_after_logout_are_dropped() {
    let h = harness(HeadlessPlatform::desktop_chrome().with_permission(Permission::Granted));
    h.transport.stall(SUBSCRIBE_PATH);
    h.controller.set_user(Some(UserSession::new("ivan")));

    let in_flight = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.subscribe().await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.controller.is_loading());
    h.controller.set_user(None);

    let result = in_flight.await.expect("join");
    assert!(matches!(result, Err(PushError::Network(_))));

    assert_eq!(h.controller.record(), None);
    assert!(!h.controller.is_subscribed());
    assert_eq!(h.controller.last_error(), None);
    assert_eq!(h.controller.phase(), LifecyclePhase::Uninitialized);
    assert!(!h.controller.is_loading());
}
