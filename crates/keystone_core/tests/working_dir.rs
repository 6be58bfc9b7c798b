//! A working directory on the real filesystem.

use std::fs;
use std::sync::Arc;

use keystone_core::config::{CONFIG_FILE_NAME, EngineConfig};
use keystone_core::conflict::SkipConflicts;
use keystone_core::fs::{RealFileSystem, SyncToAsyncFs};
use keystone_core::mirror::ChangeStatus;
use keystone_core::session::Session;
use keystone_core::storage::MemoryNetwork;
use keystone_core::{Command, Keystone, KeystoneError, Response};

fn keystone(network: &MemoryNetwork, identity: &str) -> Keystone<SyncToAsyncFs<RealFileSystem>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let hub = Arc::new(network.join(identity).unwrap());
    let session = Arc::new(Session::new(hub, network.resolver(), EngineConfig::default()));
    Keystone::new(SyncToAsyncFs::new(RealFileSystem), session, Arc::new(SkipConflicts))
}

#[tokio::test]
async fn init_push_edit_and_reset() {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path();
    let network = MemoryNetwork::new();
    let alice = keystone(&network, "alice");

    let project = alice.init(dir, "app", false).await.unwrap();
    let config = fs::read_to_string(dir.join(CONFIG_FILE_NAME)).unwrap();
    assert!(config.contains(&project));

    fs::write(dir.join(".env"), "TOKEN=abc\nDEBUG=false\n").unwrap();
    alice.push(dir, &[".env"]).await.unwrap();
    assert!(dir.join(".keystone").join("manifest.json").exists());

    fs::write(dir.join(".env"), "TOKEN=abc\nDEBUG=true\n").unwrap();
    let status = alice.status(dir).await.unwrap();
    assert_eq!(status[0].status, ChangeStatus::Modified);
    let diff = alice.diff(dir, ".env").await.unwrap();
    assert!(diff.contains("-DEBUG=false"));
    assert!(diff.contains("+DEBUG=true"));

    assert!(matches!(
        alice.pull(dir, false).await,
        Err(KeystoneError::PullWhileFilesModified(_))
    ));
    alice.reset(dir, &[".env"], true).await.unwrap();
    assert_eq!(
        fs::read_to_string(dir.join(".env")).unwrap(),
        "TOKEN=abc\nDEBUG=false\n"
    );
    assert!(!dir.join(".env.ksreset").exists());
    alice.pull(dir, false).await.unwrap();
}

#[tokio::test]
async fn commands_drive_a_working_directory() {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().to_path_buf();
    let network = MemoryNetwork::new();
    let alice = keystone(&network, "alice");

    let response = alice
        .execute(Command::Init {
            dir: dir.clone(),
            project: "app".to_string(),
            overwrite: false,
        })
        .await
        .unwrap();
    let Response::String(project) = response else {
        panic!("expected the project name");
    };

    alice
        .execute(Command::CreateEnvironment {
            project: project.clone(),
            env: "staging".to_string(),
        })
        .await
        .unwrap();
    let response = alice
        .execute(Command::Checkout {
            dir: dir.clone(),
            env: "staging".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(response, Response::Config(config) if config.env == "staging"));

    fs::write(dir.join("app.yml"), "port: 8080\n").unwrap();
    alice
        .execute(Command::Push {
            dir: dir.clone(),
            files: vec!["app.yml".to_string()],
        })
        .await
        .unwrap();
    let response = alice
        .execute(Command::Delete {
            dir: dir.clone(),
            files: vec!["app.yml".to_string()],
        })
        .await
        .unwrap();
    assert!(matches!(response, Response::Files(files) if files == vec!["app.yml"]));
    assert!(dir.join("app.yml").exists());
}
