//! Notifier tests

use std::time::Duration;

use secrecy::SecretString;

use rollguard::notify::discord::{color, payload};
use rollguard::notify::{DiscordNotifier, LogNotifier, Notifier, Severity};

#[test]
fn test_log_notifier_always_delivers() {
    let notifier = LogNotifier;
    for severity in [Severity::Success, Severity::Warning, Severity::Error] {
        assert!(tokio_test::block_on(notifier.notify(severity, "title", "body")));
    }
}

#[test]
fn test_each_severity_has_its_own_color() {
    let colors = [
        color(Severity::Success),
        color(Severity::Warning),
        color(Severity::Error),
    ];
    assert_ne!(colors[0], colors[1]);
    assert_ne!(colors[1], colors[2]);
    assert_ne!(colors[0], colors[2]);
}

#[test]
fn test_payload_carries_trail() {
    let body = "failed: Unhealthy: process offline\nself-heal: failed (process offline)\nresolved by: rollback";
    let value = payload(Severity::Warning, "Deployment of def5678a recovered by rollback", body);
    let embed = &value["embeds"][0];
    assert!(embed["description"].as_str().unwrap().contains("resolved by: rollback"));
    assert!(embed["timestamp"].is_string());
}

#[tokio::test]
async fn test_unreachable_webhook_reports_not_delivered() {
    let notifier = DiscordNotifier::new(
        SecretString::from("http://127.0.0.1:9/api/webhooks/1/token".to_string()),
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(!notifier.notify(Severity::Error, "title", "body").await);
}
