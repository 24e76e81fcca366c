mod support;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use spinova_core::OptionValue;
use spinova_engine::{Settings, SettingsError, SettingsStore};
use support::init_logging;
use tempfile::TempDir;

#[test]
fn missing_file_is_created_with_defaults() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config").join("settings.json");

    let store = SettingsStore::load(&path);

    assert_eq!(store.settings(), &Settings::default());
    assert!(path.is_file());
    assert_eq!(store.get("locale"), Some(json!("ja")));
    assert_eq!(store.get("job_timeout_secs"), Some(json!(30)));
    assert_eq!(store.get("no_such_key"), None);
}

#[test]
fn malformed_file_falls_back_to_defaults_without_overwriting() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();

    let store = SettingsStore::load(&path);

    assert_eq!(store.settings(), &Settings::default());
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn missing_keys_take_defaults_and_legacy_option_strings_are_read() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("settings.json");
    fs::write(
        &path,
        r#"{"output_dir": "media", "yt_dlp_opts": "{\"retries\": \"4\"}", "theme": "dark"}"#,
    )
    .unwrap();

    let store = SettingsStore::load(&path);
    let settings = store.settings();

    assert_eq!(settings.output_dir, PathBuf::from("media"));
    assert_eq!(settings.locale, "ja");
    assert_eq!(settings.engine_options.get("retries"), Some(&json!("4")));
    assert_eq!(settings.engine_options().retries, Some(4));
}

#[test]
fn set_and_save_round_trip_through_the_file() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("settings.json");

    let mut store = SettingsStore::load(&path);
    store.set("output_dir", json!("/srv/media")).unwrap();
    store.set("ffmpeg_path", json!("/opt/ffmpeg/bin/ffmpeg")).unwrap();
    store.save().unwrap();

    let reloaded = SettingsStore::load(&path);
    assert_eq!(reloaded.settings().output_dir, PathBuf::from("/srv/media"));
    assert_eq!(reloaded.get("ffmpeg_path"), Some(json!("/opt/ffmpeg/bin/ffmpeg")));
}

#[test]
fn set_rejects_unknown_keys_and_bad_values() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut store = SettingsStore::load(temp.path().join("settings.json"));

    assert!(matches!(
        store.set("colour", json!("red")),
        Err(SettingsError::UnknownKey(_))
    ));
    assert!(matches!(
        store.set("job_timeout_secs", json!("soon")),
        Err(SettingsError::InvalidValue { .. })
    ));
    assert_eq!(store.settings().job_timeout_secs, 30);
}

#[test]
fn engine_options_add_ffmpeg_path_and_existing_cookie_file() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let cookie = temp.path().join("cookies.txt");
    fs::write(&cookie, "# Netscape HTTP Cookie File\n").unwrap();
    let mut settings = Settings {
        ffmpeg_path: "/usr/bin/ffmpeg".into(),
        ..Settings::default()
    };
    settings
        .engine_options
        .insert("cookie_file".into(), json!(cookie.to_string_lossy()));

    let forwarded = settings.engine_options().forwarded();

    assert_eq!(
        forwarded,
        vec![
            ("ffmpeg_location", OptionValue::Text("/usr/bin/ffmpeg".into())),
            (
                "cookiefile",
                OptionValue::Text(cookie.to_string_lossy().into_owned())
            ),
        ]
    );
}

#[test]
fn timeouts_feed_the_controller_settings() {
    let settings = Settings {
        job_timeout_secs: 45,
        batch_timeout_secs: 0,
        ..Settings::default()
    };
    let controller = settings.controller_settings();
    assert_eq!(controller.job_timeout, Duration::from_secs(45));
    assert_eq!(controller.batch_timeout, Duration::from_secs(1));
    assert_eq!(controller.job_cancel_grace, None);

    let opted_in = Settings {
        job_cancel_grace_secs: Some(5),
        ..Settings::default()
    };
    assert_eq!(
        opted_in.controller_settings().job_cancel_grace,
        Some(Duration::from_secs(5))
    );
}
