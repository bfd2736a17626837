//! Store selection and persistence tests

use std::collections::HashMap;

use nguru::config::NguruConfigFile;
use nguru::{Config, Profile, Role, store};

fn config_with(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_sources(|key| vars.get(key).cloned(), NguruConfigFile::default())
}

#[tokio::test]
async fn test_local_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("nested").join("nguru");
    let config = config_with(&[("NGURU_DATA_DIR", data_dir.to_str().unwrap())]);

    {
        let store = store::open(&config).unwrap();
        assert_eq!(store.name(), "local");

        let profile = Profile {
            age_group: Some("12-14".to_string()),
            ..Profile::default()
        };
        store.save_profile("ada", &profile).await.unwrap();
        store
            .append_message("ada", Role::User, "why is ice slippery?")
            .await
            .unwrap();
    }

    assert!(config.database_path().exists());

    let store = store::open(&config).unwrap();
    let profile = store.get_profile("ada").await.unwrap().unwrap();
    assert_eq!(profile.age_group.as_deref(), Some("12-14"));
    assert!(!profile.is_onboarded());

    let messages = store.list_messages("ada").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "why is ice slippery?");
}

#[tokio::test]
async fn test_profile_saves_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(&[("NGURU_DATA_DIR", dir.path().to_str().unwrap())]);
    let store = store::open(&config).unwrap();

    store
        .save_profile(
            "ada",
            &Profile {
                wonder: Some("volcanoes".to_string()),
                ..Profile::default()
            },
        )
        .await
        .unwrap();
    store
        .save_profile(
            "ada",
            &Profile {
                is_onboarded: Some(true),
                ..Profile::default()
            },
        )
        .await
        .unwrap();

    let profile = store.get_profile("ada").await.unwrap().unwrap();
    assert_eq!(profile.wonder.as_deref(), Some("volcanoes"));
    assert!(profile.is_onboarded());
    assert!(store.get_profile("grace").await.unwrap().is_none());
}

#[test]
fn test_firebase_config_selects_cloud_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(&[
        ("NGURU_DATA_DIR", dir.path().to_str().unwrap()),
        ("FIREBASE_API_KEY", "test-key"),
        ("FIREBASE_PROJECT_ID", "nguru-test"),
    ]);

    let store = store::open(&config).unwrap();

    assert_eq!(store.name(), "firestore");
    assert!(!config.database_path().exists());
}
