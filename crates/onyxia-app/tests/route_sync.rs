//! URL ↔ state synchronization of the S3 explorer.

use onyxia_app::routing::{Route, RouteController, RouteMethod, RouteParams};
use onyxia_app::usecases::s3_explorer_root::{S3ExplorerParams, ViewMode};
use onyxia_app::{AppConfig, AppCore};
use onyxia_testkit::{ApiMethod, MockOnyxiaApi, RecordingRouter};
use std::sync::Arc;

async fn booted(config: AppConfig) -> (AppCore, Arc<MockOnyxiaApi>) {
    let api = MockOnyxiaApi::demo();
    let core = AppCore::new(config, api.clone()).unwrap();
    core.bootstrap().await.unwrap();
    (core, api)
}

fn params(profile: Option<&str>, path: &str, mode: ViewMode) -> S3ExplorerParams {
    S3ExplorerParams {
        profile: profile.map(str::to_string),
        path: path.to_string(),
        mode,
    }
}

#[tokio::test]
async fn load_twice_with_same_params_is_idempotent() {
    let (core, api) = booted(AppConfig::default()).await;
    let explorer = core.s3_explorer();
    let requested = params(Some("archive"), "2024/q1", ViewMode::Grid);

    assert_eq!(explorer.load(requested.clone()).await.unwrap(), None);
    assert_eq!(explorer.load(requested).await.unwrap(), None);
    assert_eq!(api.calls(ApiMethod::ListS3Profiles), 1, "initialized once");

    let view = explorer.explorer().unwrap();
    assert_eq!(view.bucket.as_deref(), Some("alice-archive"));
    assert_eq!(view.breadcrumbs.len(), 3);
}

#[tokio::test]
async fn incomplete_url_is_corrected_with_replace() {
    let (core, _api) = booted(AppConfig::default()).await;
    let router = Arc::new(RecordingRouter::new());
    let bridge = core.attach_router(router.clone());

    bridge.on_route_changed(&Route::new("s3Explorer")).await.unwrap();

    assert_eq!(router.count(), 1, "one correction, not two");
    let (method, route) = router.last().unwrap();
    assert_eq!(method, RouteMethod::Replace);
    assert_eq!(route.param("profile"), Some("default"));
    assert_eq!(route.param("mode"), Some("list"));

    // The corrected URL comes back from the router: nothing more to do.
    bridge.on_route_changed(&route).await.unwrap();
    assert_eq!(router.count(), 1);
}

#[tokio::test]
async fn unknown_profile_falls_back_to_default_route() {
    let (core, _api) = booted(AppConfig::default()).await;
    let router = Arc::new(RecordingRouter::new());
    let bridge = core.attach_router(router.clone());

    let route = params(Some("gone"), "deep/dir", ViewMode::Grid).to_route();
    bridge.on_route_changed(&route).await.unwrap();

    let (_, corrected) = router.last().unwrap();
    let corrected = S3ExplorerParams::from_route(&corrected).unwrap();
    assert_eq!(corrected, params(Some("default"), "", ViewMode::Grid));
    assert_eq!(router.count(), 1);
}

#[tokio::test]
async fn configured_default_profile_wins_over_first() {
    let mut config = AppConfig::default();
    config.s3.default_profile = Some("archive".to_string());
    let (core, _api) = booted(config).await;

    let canonical = core
        .s3_explorer()
        .load(S3ExplorerParams::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canonical.profile.as_deref(), Some("archive"));
}

#[tokio::test]
async fn user_navigation_pushes_and_layout_replaces() {
    let (core, _api) = booted(AppConfig::default()).await;
    let router = Arc::new(RecordingRouter::new());
    let bridge = core.attach_router(router.clone());
    bridge
        .on_route_changed(&params(Some("default"), "", ViewMode::List).to_route())
        .await
        .unwrap();
    assert_eq!(router.count(), 0, "URL already canonical");

    let explorer = bridge.controller();
    explorer.change_directory("/data//2024/").unwrap();
    explorer.change_directory("data/2024").unwrap();
    explorer.change_view_mode(ViewMode::Grid).unwrap();
    explorer.change_profile("archive").unwrap();

    let methods: Vec<RouteMethod> = router.navigations().into_iter().map(|(m, _)| m).collect();
    assert_eq!(
        methods,
        vec![RouteMethod::Push, RouteMethod::Replace, RouteMethod::Push]
    );
    let (_, last) = router.last().unwrap();
    assert_eq!(last.param("profile"), Some("archive"));
    assert_eq!(last.param("path"), None, "profile switch opens the bucket root");
    assert_eq!(last.param("mode"), Some("grid"));
}

#[tokio::test]
async fn external_navigation_reconciles_back_to_state() {
    let (core, _api) = booted(AppConfig::default()).await;
    let router = Arc::new(RecordingRouter::new());
    let bridge = core.attach_router(router.clone());
    bridge
        .on_route_changed(&params(Some("default"), "notebooks", ViewMode::List).to_route())
        .await
        .unwrap();
    router.clear();

    bridge
        .on_route_changed(&params(Some("archive"), "elsewhere", ViewMode::List).to_route())
        .await
        .unwrap();

    let (method, route) = router.last().unwrap();
    assert_eq!(method, RouteMethod::Replace);
    assert_eq!(
        S3ExplorerParams::from_route(&route).unwrap(),
        params(Some("default"), "notebooks", ViewMode::List)
    );
}

#[tokio::test]
async fn other_pages_are_ignored() {
    let (core, api) = booted(AppConfig::default()).await;
    let router = Arc::new(RecordingRouter::new());
    let bridge = core.attach_router(router.clone());

    bridge.on_route_changed(&Route::new("catalog")).await.unwrap();
    assert_eq!(router.count(), 0);
    assert_eq!(api.calls(ApiMethod::ListS3Profiles), 0);
    assert!(core.s3_explorer().explorer().is_err());
}
