// tests/config_env.rs
//
// Settings read from the real process environment. Serialized because the
// environment is process-global.

use std::time::Duration;

use listing_watch::config::{
    Settings, ENV_BLOB_CONNECTION, ENV_EMAIL_CONNECTION, ENV_JITTER_MAX_SECS, ENV_RECIPIENT,
    ENV_RETENTION_DAYS, ENV_SENDER,
};
use listing_watch::ConfigError;
use serial_test::serial;

const ALL: [&str; 6] = [
    ENV_BLOB_CONNECTION,
    ENV_EMAIL_CONNECTION,
    ENV_SENDER,
    ENV_RECIPIENT,
    ENV_JITTER_MAX_SECS,
    ENV_RETENTION_DAYS,
];

fn clear() {
    for k in ALL {
        std::env::remove_var(k);
    }
}

fn set_required() {
    std::env::set_var(ENV_BLOB_CONNECTION, "file:///var/lib/listing-watch");
    std::env::set_var(ENV_EMAIL_CONNECTION, "log://");
    std::env::set_var(ENV_SENDER, "DoNotReply@watch.example");
    std::env::set_var(ENV_RECIPIENT, "ops@example.com");
}

#[test]
#[serial]
fn reads_required_and_optional_values() {
    clear();
    set_required();
    std::env::set_var(ENV_JITTER_MAX_SECS, "3");
    std::env::set_var(ENV_RETENTION_DAYS, "0");

    let s = Settings::from_env().expect("complete environment");
    assert_eq!(s.recipient, "ops@example.com");
    assert_eq!(s.jitter_max, Duration::from_secs(3));
    assert_eq!(s.retention_days, None, "0 disables retention");
    clear();
}

#[test]
#[serial]
fn first_missing_setting_is_named() {
    clear();
    set_required();
    std::env::remove_var(ENV_EMAIL_CONNECTION);

    match Settings::from_env() {
        Err(ConfigError::Missing(name)) => assert_eq!(name, ENV_EMAIL_CONNECTION),
        other => panic!("unexpected {other:?}"),
    }
    clear();
}

#[test]
#[serial]
fn bad_retention_is_invalid() {
    clear();
    set_required();
    std::env::set_var(ENV_RETENTION_DAYS, "forever");

    assert!(matches!(
        Settings::from_env(),
        Err(ConfigError::Invalid { name: ENV_RETENTION_DAYS, .. })
    ));
    clear();
}
