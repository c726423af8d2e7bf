//! Store sentinel guard and event delivery order across the whole core.

use onyxia_app::events::EventFilter;
use onyxia_app::usecases::project_management::{
    ProjectManagementAction, ProjectManagementSlice, PROJECT_CHANGED,
};
use onyxia_app::{AppConfig, AppCore, OnyxiaError, Slice};
use onyxia_testkit::{project, MockOnyxiaApi};
use parking_lot::Mutex;
use std::sync::Arc;

fn assert_uninitialized<T: std::fmt::Debug>(result: Result<T, OnyxiaError>, usecase: &str) {
    match result {
        Err(OnyxiaError::NotInitialized { usecase: name }) => assert_eq!(name, usecase),
        other => panic!("expected NotInitialized for {usecase}, got {other:?}"),
    }
}

#[tokio::test]
async fn every_slice_refuses_reads_before_initialization() {
    let core = AppCore::new(AppConfig::default(), MockOnyxiaApi::demo()).unwrap();

    assert_uninitialized(core.project_management().current_project(), "projectManagement");
    assert_uninitialized(core.project_management().available_projects(), "projectManagement");
    assert_uninitialized(core.service_management().services(), "serviceManagement");
    assert_uninitialized(core.view_quotas().quotas(), "viewQuotas");
    assert_uninitialized(core.service_details().details(), "serviceDetails");
    assert_uninitialized(core.restorable_configs().configs(), "restorableConfigManagement");
    assert_uninitialized(core.s3_explorer().explorer(), "s3ExplorerRoot");
    assert_uninitialized(core.s3_explorer().route_params(), "s3ExplorerRoot");

    // Thunks fail the same way instead of acting on missing data.
    assert_uninitialized(core.project_management().change_project("team-a"), "projectManagement");
    assert_uninitialized(core.service_management().refresh().await, "projectManagement");
    assert!(core.service_details().set_active("jupyter-1").is_err());
}

#[tokio::test]
async fn root_state_serializes_sentinels_and_live_slices() {
    let core = AppCore::new(AppConfig::default(), MockOnyxiaApi::demo()).unwrap();
    core.bootstrap().await.unwrap();

    let root = core.store().root_state().unwrap();
    assert_eq!(root["projectManagement"]["status"], "ready");
    assert_eq!(
        root["projectManagement"]["state"]["selectedProjectId"],
        "user-alice"
    );
    assert_eq!(root["viewQuotas"]["status"], "uninitialized");
}

#[tokio::test]
async fn bootstrap_without_projects_fails() {
    let api = MockOnyxiaApi::new();
    let core = AppCore::new(AppConfig::default(), api).unwrap();
    assert!(matches!(
        core.bootstrap().await,
        Err(OnyxiaError::Invalid { .. })
    ));
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let mut config = AppConfig::default();
    config.polling.services.interval_ms = 0;
    config.event_bus.capacity = 0;
    let err = AppCore::new(config, MockOnyxiaApi::demo()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("interval_ms"), "{message}");
    assert!(message.contains("capacity"), "{message}");
}

#[tokio::test]
async fn subscribers_see_actions_in_dispatch_order_from_attachment() {
    let api = MockOnyxiaApi::demo();
    api.set_projects(vec![project("user-alice"), project("team-a"), project("team-b")]);
    let core = AppCore::new(AppConfig::default(), api).unwrap();
    core.bootstrap().await.unwrap();
    let projects = core.project_management();

    let filter = || EventFilter::action(ProjectManagementSlice::NAME, PROJECT_CHANGED);
    let early_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = early_seen.clone();
    let _early = core.bus().listen(filter(), move |event| {
        if let Some(ProjectManagementAction::ProjectChanged { project_id }) =
            event.action::<ProjectManagementSlice>()
        {
            sink.lock().push(project_id.clone());
        }
    });
    let mut early_stream = core.bus().subscribe(filter());

    projects.change_project("team-a").unwrap();
    let mut late_stream = core.bus().subscribe(filter());
    projects.change_project("team-b").unwrap();
    projects.change_project("user-alice").unwrap();

    assert_eq!(*early_seen.lock(), vec!["team-a", "team-b", "user-alice"]);

    let drain = |stream: &mut onyxia_app::EventStream| {
        let mut ids = Vec::new();
        while let Some(event) = stream.try_next() {
            if let Some(ProjectManagementAction::ProjectChanged { project_id }) =
                event.action::<ProjectManagementSlice>()
            {
                ids.push(project_id.clone());
            }
        }
        ids
    };
    assert_eq!(drain(&mut early_stream), vec!["team-a", "team-b", "user-alice"]);
    assert_eq!(drain(&mut late_stream), vec!["team-b", "user-alice"]);
}

#[tokio::test]
async fn reselecting_current_project_publishes_nothing() {
    let core = AppCore::new(AppConfig::default(), MockOnyxiaApi::demo()).unwrap();
    core.bootstrap().await.unwrap();
    let mut stream = core
        .bus()
        .subscribe(EventFilter::usecase(ProjectManagementSlice::NAME));

    core.project_management().change_project("user-alice").unwrap();
    assert!(stream.try_next().is_none());

    let err = core.project_management().change_project("nowhere").unwrap_err();
    assert!(matches!(err, OnyxiaError::NotFound { .. }));
    assert!(stream.try_next().is_none(), "failed reduce publishes nothing");
    assert_eq!(core.project_management().current_project().unwrap().id, "user-alice");
}
