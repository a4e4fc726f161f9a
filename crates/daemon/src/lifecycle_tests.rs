// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;

fn write_config(dir: &Path, store_uri: &str, extra: &str) -> PathBuf {
    let path = dir.join("imagegw.toml");
    let mut file = File::create(&path).unwrap();
    writeln!(
        file,
        r#"
{extra}
MongoDBURI = "{store_uri}"
MongoDB = "imagegw"
ImageExpirationTimeout = "30:00:00:00"

[Platforms.systema]
admins = [0]
accesstype = "remote"
ssh = {{ imageDir = "/images/systema" }}
"#
    )
    .unwrap();
    path
}

#[tokio::test]
async fn startup_and_shutdown_with_ephemeral_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "mem://", "");

    let startup = startup(&config_path).await.unwrap();
    assert!(startup.connection.snapshot_path.is_none());
    startup.checkpoint().unwrap();

    startup.manager.shutdown().await;
    startup.reconciler.await.unwrap();
}

#[tokio::test]
async fn startup_restores_persistent_store() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let uri = format!("file://{}", state.display());
    let config_path = write_config(dir.path(), &uri, "");

    {
        let first = startup(&config_path).await.unwrap();
        assert!(first.connection.snapshot_path.is_some());
        first.checkpoint().unwrap();
        first.manager.shutdown().await;
        first.reconciler.await.unwrap();
    }

    let second = startup(&config_path).await.unwrap();
    second.manager.shutdown().await;
    second.reconciler.await.unwrap();
}

#[tokio::test]
async fn second_instance_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let uri = format!("file://{}", state.display());
    let config_path = write_config(dir.path(), &uri, "");

    let first = startup(&config_path).await.unwrap();
    let second = startup(&config_path).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    first.manager.shutdown().await;
    first.reconciler.await.unwrap();
}

#[tokio::test]
async fn unknown_auth_backend_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "mem://", "Authentication = \"ldap\"\n");

    let result = startup(&config_path).await;
    assert!(matches!(result, Err(LifecycleError::Auth(_))));
}

#[tokio::test]
async fn unsupported_store_scheme_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), "mongodb://localhost:27017", "");

    let result = startup(&config_path).await;
    assert!(matches!(result, Err(LifecycleError::Store(_))));
}

#[tokio::test]
async fn missing_config_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let result = startup(&dir.path().join("absent.toml")).await;
    assert!(matches!(result, Err(LifecycleError::Config(_))));
}
