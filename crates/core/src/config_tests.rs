// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const MINIMAL: &str = r#"
MongoDBURI = "mem://"
MongoDB = "imagegw"
ImageExpirationTimeout = "30:00:00:00"

[Platforms.systema]
admins = [0]
accesstype = "remote"
ssh = { imageDir = "/images/systema" }
"#;

#[test]
fn minimal_config_parses_with_defaults() {
    let config = Config::from_toml(MINIMAL).unwrap();
    assert_eq!(config.authentication, "munge");
    assert_eq!(config.pull_update_timeout, 300);
    assert_eq!(config.pull_update_timeout_ms(), 300_000);
    assert_eq!(config.pull_timeout_ms(), config.pull_update_timeout_ms());
    assert!(!config.metrics);
    assert!(config.is_platform("systema"));
    assert!(!config.is_platform("systemb"));
}

#[test]
fn platform_image_dir_follows_access_type() {
    let config = Config::from_toml(MINIMAL).unwrap();
    let platform = config.platform("systema").unwrap();
    assert_eq!(platform.image_dir(), Some("/images/systema"));
    assert_eq!(platform.admins, vec![0]);
}

#[test]
fn expiration_timeout_parses_ddhhmmss() {
    let config = Config::from_toml(MINIMAL).unwrap();
    assert_eq!(
        config.expiration_timeout_ms().unwrap(),
        30 * 24 * 3600 * 1000
    );
}

#[yare::parameterized(
    too_few_fields = { "10:00:00" },
    not_numeric = { "a:b:c:d" },
    empty = { "" },
)]
fn malformed_expiration_is_rejected(value: &str) {
    let toml = MINIMAL.replace("30:00:00:00", value);
    assert!(matches!(
        Config::from_toml(&toml),
        Err(ConfigError::InvalidExpiration(_))
    ));
}

#[test]
fn legacy_pull_update_time_key_is_an_error() {
    let toml = format!("PullUpdateTime = 60\n{MINIMAL}");
    assert!(Config::from_toml(&toml).is_err());
}

#[test]
fn missing_store_uri_is_an_error() {
    let toml = MINIMAL.replace("MongoDBURI = \"mem://\"\n", "");
    assert!(Config::from_toml(&toml).is_err());
}

#[test]
fn no_platforms_is_an_error() {
    let toml = r#"
MongoDBURI = "mem://"
MongoDB = "imagegw"
ImageExpirationTimeout = "30:00:00:00"

[Platforms]
"#;
    assert!(matches!(
        Config::from_toml(toml),
        Err(ConfigError::NoPlatforms)
    ));
}

#[test]
fn overrides_are_honored() {
    let toml = format!(
        "PullUpdateTimeout = 60\nMetrics = true\nDefaultImageFormat = \"squashfs\"\nAuthentication = \"fake\"\n{MINIMAL}"
    );
    let config = Config::from_toml(&toml).unwrap();
    assert_eq!(config.pull_update_timeout, 60);
    assert!(config.metrics);
    assert_eq!(config.default_image_format.as_deref(), Some("squashfs"));
    assert_eq!(config.authentication, "fake");
}
