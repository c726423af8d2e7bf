//! Saved launch configurations against the in-memory config store.

use onyxia_app::usecases::restorable_config_management::{
    RestorableConfig, SaveOutcome, RESTORABLE_CONFIGS_KEY,
};
use onyxia_app::{AppConfig, AppCore, OnyxiaError};
use onyxia_testkit::{jupyter_values, restorable_config, ApiMethod, MockOnyxiaApi};
use serde_json::json;
use std::sync::Arc;

async fn booted() -> (AppCore, Arc<MockOnyxiaApi>) {
    let api = MockOnyxiaApi::demo();
    let core = AppCore::new(AppConfig::default(), api.clone()).unwrap();
    core.bootstrap().await.unwrap();
    (core, api)
}

fn persisted(api: &MockOnyxiaApi) -> Vec<RestorableConfig> {
    serde_json::from_str(&api.blob(RESTORABLE_CONFIGS_KEY).unwrap()).unwrap()
}

#[tokio::test]
async fn save_replace_and_dedupe() {
    let (core, api) = booted().await;
    let configs = core.restorable_configs();

    let first = restorable_config("Small notebook", jupyter_values());
    assert_eq!(configs.save_config(first.clone()).await.unwrap(), SaveOutcome::Saved);
    assert_eq!(
        configs.save_config(first.clone()).await.unwrap(),
        SaveOutcome::AlreadySaved
    );

    let mut bigger = jupyter_values();
    bigger["resources"]["memory"] = json!("16Gi");
    let resized = restorable_config("Small notebook", bigger);
    assert_eq!(configs.save_config(resized).await.unwrap(), SaveOutcome::Replaced);

    let view = configs.configs().unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].value_count, 6);
    assert!(!configs.is_saved(&first).unwrap());
    assert_eq!(persisted(&api).len(), 1);
}

#[tokio::test]
async fn write_after_external_change_is_a_conflict() {
    let (core, api) = booted().await;
    let configs = core.restorable_configs();
    configs
        .save_config(restorable_config("Mine", jupyter_values()))
        .await
        .unwrap();

    // Another session saved something meanwhile.
    let other = vec![
        restorable_config("Mine", jupyter_values()),
        restorable_config("Theirs", json!({ "service": { "gpu": true } })),
    ];
    api.set_blob(RESTORABLE_CONFIGS_KEY, &serde_json::to_string(&other).unwrap());
    let puts = api.calls(ApiMethod::PutUserConfigBlob);

    let err = configs.delete_config(0).await.unwrap_err();
    assert!(matches!(err, OnyxiaError::Conflict { .. }));
    assert_eq!(api.calls(ApiMethod::PutUserConfigBlob), puts, "nothing written");
    assert_eq!(persisted(&api).len(), 2);

    configs.initialize().await.unwrap();
    configs.delete_config(0).await.unwrap();
    let remaining = persisted(&api);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].friendly_name, "Theirs");
    assert_eq!(configs.configs().unwrap()[0].friendly_name, "Theirs");
}

#[tokio::test]
async fn failed_persist_leaves_state_untouched() {
    let (core, api) = booted().await;
    let configs = core.restorable_configs();
    api.fail_next(ApiMethod::PutUserConfigBlob, OnyxiaError::network("offline"));

    let result = configs
        .save_config(restorable_config("Lost", jupyter_values()))
        .await;
    assert!(result.is_err());
    assert!(configs.configs().unwrap().is_empty());
}

#[tokio::test]
async fn rename_rules() {
    let (core, _api) = booted().await;
    let configs = core.restorable_configs();
    configs
        .save_config(restorable_config("A", jupyter_values()))
        .await
        .unwrap();
    configs
        .save_config(restorable_config("B", json!({ "service": { "replicas": 2 } })))
        .await
        .unwrap();

    assert!(matches!(
        configs.rename_config(1, "  ").await,
        Err(OnyxiaError::Invalid { .. })
    ));
    assert!(matches!(
        configs.rename_config(1, "A").await,
        Err(OnyxiaError::Invalid { .. })
    ));
    assert!(matches!(
        configs.rename_config(7, "C").await,
        Err(OnyxiaError::NotFound { .. })
    ));
    configs.rename_config(1, " C ").await.unwrap();
    assert_eq!(configs.configs().unwrap()[1].friendly_name, "C");
}

#[tokio::test]
async fn restore_adjusts_values_to_current_schema() {
    let (core, _api) = booted().await;
    let configs = core.restorable_configs();
    let saved = json!({
        "resources": { "cpu": "2000m", "memory": "100Gi" },
        "service": { "image": "inseefrlab/jupyter:py3.12", "replicas": 2.6, "gpu": "YES" },
        "legacy": 1
    });
    configs
        .save_config(restorable_config("Old", saved))
        .await
        .unwrap();

    let restored = configs.restore_config(0).await.unwrap();
    assert_eq!(restored.chart_name, "jupyter-python");
    assert_eq!(restored.dropped, vec!["resources.memory".to_string()]);
    assert_eq!(
        restored.adjusted,
        vec!["service.gpu".to_string(), "service.replicas".to_string()]
    );
    assert_eq!(restored.values["service"]["gpu"], json!(true));
    assert_eq!(restored.values["service"]["replicas"], json!(3));
    assert_eq!(restored.values["resources"]["cpu"], json!("2000m"));
    assert!(restored.values["resources"].get("memory").is_none());
    assert_eq!(restored.values["legacy"], json!(1));
}

#[tokio::test]
async fn restore_of_unknown_chart_is_not_found() {
    let (core, api) = booted().await;
    let configs = core.restorable_configs();
    configs
        .save_config(restorable_config("X", jupyter_values()))
        .await
        .unwrap();
    api.set_catalogs(Vec::new());

    let err = configs.restore_config(0).await.unwrap_err();
    assert!(matches!(err, OnyxiaError::NotFound { .. }));
    assert!(matches!(
        configs.restore_config(3).await,
        Err(OnyxiaError::NotFound { .. })
    ));
}
