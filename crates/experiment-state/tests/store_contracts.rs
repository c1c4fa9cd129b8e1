//! Behavioral contract tests for ExperimentStore.
//!
//! Every test drives the store through `MemoryRemoteClient`, so call counts
//! and payloads can be asserted without a backend.

use std::sync::Arc;
use std::time::Duration;

use experiment_state::fakes::{MemoryRemoteClient, RecordingNotifier};
use experiment_state::views::today_utc;
use experiment_state::{
    CompletionPayload, EndpointKind, Experiment, ExperimentDraft, ExperimentId, ExperimentStore,
    ReloadStatus, RemoteError, StoreError,
};
use serde_json::json;

fn id(n: u64) -> ExperimentId {
    ExperimentId::Number(n)
}

fn experiment(n: u64, title: &str) -> Experiment {
    let mut exp = Experiment::new(n, title);
    exp.benchmark = "previous_month".to_string();
    exp.period = "30_days".to_string();
    exp.metric_of_interest = Some("hrv".to_string());
    exp
}

fn draft(title: &str) -> ExperimentDraft {
    ExperimentDraft::new(title, "previous_month", "30_days").with_metric("hrv")
}

type Harness = (ExperimentStore, Arc<MemoryRemoteClient>, Arc<RecordingNotifier>);

fn setup(remote: MemoryRemoteClient) -> Harness {
    let remote = Arc::new(remote);
    let notifier = Arc::new(RecordingNotifier::new());
    let store = ExperimentStore::new(remote.clone(), notifier.clone());
    (store, remote, notifier)
}

/// Harness whose backend already holds `records`.
fn seeded(records: impl IntoIterator<Item = Experiment>) -> Harness {
    setup(MemoryRemoteClient::new().with_experiments(records))
}

fn titles_of(experiments: Vec<Experiment>) -> Vec<String> {
    experiments.into_iter().map(|e| e.title).collect()
}

fn titles(store: &ExperimentStore) -> Vec<String> {
    titles_of(store.experiments())
}

// ===========================================================================
// reload
// ===========================================================================

#[tokio::test]
async fn reload_replaces_collection_and_reports_count() {
    let (store, remote, notifier) = seeded([experiment(1, "X"), experiment(2, "Y")]);

    let status = store.reload(true).await;

    assert_eq!(status, ReloadStatus::Loaded(2));
    assert_eq!(titles(&store), vec!["X", "Y"]);
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 1);
    assert_eq!(remote.call_count(EndpointKind::List), 0);
    assert_eq!(notifier.successes(), vec!["Loaded 2 experiments"]);
    assert!(!store.is_loading());
    assert_eq!(store.last_error(), None);
}

#[tokio::test]
async fn reload_plain_uses_listing_endpoint() {
    let (store, remote, _) = seeded([experiment(1, "X")]);

    assert!(store.reload(false).await.is_loaded());

    assert_eq!(remote.call_count(EndpointKind::List), 1);
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 0);
    assert!(!store.experiments()[0].extra.contains_key("stats"));
}

#[tokio::test]
async fn aggregated_reload_keeps_stats_payload() {
    let (store, _, _) = seeded([experiment(1, "X")]);

    store.reload(true).await;

    let first = store.experiments().remove(0);
    assert_eq!(first.extra["stats"]["data_points_count"], json!(0));
}

#[tokio::test]
async fn reload_failure_clears_previous_collection() {
    let (store, remote, notifier) = seeded([experiment(1, "X"), experiment(2, "Y")]);
    store.reload(true).await;
    assert_eq!(store.len(), 2);

    remote.fail_next(EndpointKind::ListWithStats, "connection reset");
    let status = store.reload(true).await;

    assert!(matches!(
        status,
        ReloadStatus::Failed(StoreError::Remote(RemoteError::Transport(_)))
    ));
    assert!(store.is_empty());
    assert_eq!(store.last_error().as_deref(), Some("connection reset"));
    assert_eq!(notifier.errors(), vec!["Failed to load experiments"]);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn reload_rejects_non_sequence_payload() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    store.reload(true).await;

    remote.respond_with(
        EndpointKind::ListWithStats,
        json!({"error": "database locked"}),
    );
    let status = store.reload(true).await;

    assert!(matches!(status, ReloadStatus::Failed(StoreError::Shape(_))));
    assert!(store.is_empty());
    assert_eq!(
        store.last_error().as_deref(),
        Some("Invalid data format received from API")
    );
}

#[tokio::test]
async fn reload_tolerates_mistyped_fields() {
    let (store, remote, notifier) = setup(MemoryRemoteClient::new());
    remote.respond_with(
        EndpointKind::ListWithStats,
        json!([
            {"id": 1, "title": "ok"},
            {"id": 2, "title": "t", "period": 30, "benchmark": ["previous_month"]}
        ]),
    );

    let status = store.reload(true).await;

    assert_eq!(status, ReloadStatus::Loaded(2));
    let second = store.lookup(&id(2)).unwrap();
    assert_eq!(second.period, "30");
    assert!(second.benchmark.is_empty());
    assert_eq!(store.last_error(), None);
    assert_eq!(notifier.successes(), vec!["Loaded 2 experiments"]);
}

#[tokio::test]
async fn reload_skips_records_without_usable_id() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());
    remote.respond_with(
        EndpointKind::ListWithStats,
        json!([
            {"id": 1, "title": "ok"},
            {"id": 1.5, "title": "fractional"},
            {"title": "no id"},
            "not a record"
        ]),
    );

    let status = store.reload(true).await;

    assert_eq!(status, ReloadStatus::Loaded(1));
    assert_eq!(titles(&store), vec!["ok"]);
    assert_eq!(store.last_error(), None);
}

#[tokio::test]
async fn successful_reload_clears_last_error() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    remote.fail_next(EndpointKind::ListWithStats, "timeout");
    store.reload(true).await;
    assert!(store.last_error().is_some());

    assert!(store.reload(true).await.is_loaded());
    assert_eq!(store.last_error(), None);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn clear_error_only_resets_error() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());
    remote.fail_next(EndpointKind::ListWithStats, "boom");
    store.reload(true).await;

    store.clear_error();

    assert_eq!(store.last_error(), None);
    assert!(store.is_empty());
    assert!(!store.is_loading());
}

#[tokio::test(start_paused = true)]
async fn overlapping_reload_is_dropped() {
    let (store, remote, _) = setup(
        MemoryRemoteClient::new()
            .with_experiments([experiment(1, "X")])
            .with_latency(Duration::from_millis(200)),
    );

    let (first, second) = tokio::join!(store.reload(true), store.reload(true));

    assert_eq!(first, ReloadStatus::Loaded(1));
    assert_eq!(second, ReloadStatus::Skipped);
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 1);
    assert!(!store.is_loading());
}

#[tokio::test(start_paused = true)]
async fn loading_flag_is_set_while_reload_is_pending() {
    let (store, _, _) = setup(
        MemoryRemoteClient::new()
            .with_experiments([experiment(1, "X")])
            .with_latency(Duration::from_millis(50)),
    );

    let (status, observed) = tokio::join!(store.reload(true), async {
        tokio::task::yield_now().await;
        store.is_loading()
    });

    assert!(status.is_loaded());
    assert!(observed);
    assert!(!store.is_loading());
}

#[tokio::test(start_paused = true)]
async fn cancelled_reload_releases_loading_flag() {
    let (store, remote, _) = setup(
        MemoryRemoteClient::new()
            .with_experiments([experiment(1, "X")])
            .with_latency(Duration::from_secs(10)),
    );

    let timed_out = tokio::time::timeout(Duration::from_secs(1), store.reload(true)).await;
    assert!(timed_out.is_err());
    assert!(!store.is_loading());

    assert!(store.reload(true).await.is_loaded());
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 2);
}

#[tokio::test]
async fn sequential_reloads_each_hit_the_backend() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());

    store.reload(true).await;
    store.reload(true).await;

    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 2);
}

// ===========================================================================
// create
// ===========================================================================

#[tokio::test]
async fn create_without_title_makes_no_network_call() {
    let (store, remote, notifier) = setup(MemoryRemoteClient::new());
    let mut incomplete = draft("ignored");
    incomplete.title = None;

    let err = store.create(&incomplete).await.unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(err.to_string(), "Missing required fields: title");
    assert_eq!(remote.total_calls(), 0);
    assert_eq!(notifier.errors(), vec!["Failed to create experiment"]);
    assert_eq!(store.last_error(), None);
}

#[tokio::test]
async fn create_prepends_server_record() {
    let (store, remote, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;

    let created = store.create(&draft("Y")).await.unwrap();

    assert_eq!(created.id, id(2));
    assert_eq!(titles(&store), vec!["Y", "X"]);
    assert_eq!(remote.call_count(EndpointKind::Create), 1);
    let sent = &remote.calls()[1];
    assert_eq!(sent.body.as_ref().unwrap()["title"], json!("Y"));
    assert_eq!(
        notifier.successes().last().map(String::as_str),
        Some("Experiment created successfully")
    );
}

#[tokio::test]
async fn create_passes_extra_fields_through() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());

    let created = store
        .create(&draft("Sauna").with_field("icon_color", json!("#ef4444")))
        .await
        .unwrap();

    assert_eq!(created.extra["icon_color"], json!("#ef4444"));
    assert_eq!(remote.server_records()[0]["icon_color"], json!("#ef4444"));
}

#[tokio::test]
async fn create_failure_leaves_collection_unchanged() {
    let (store, remote, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.fail_next(EndpointKind::Create, "503");

    let err = store.create(&draft("Y")).await.unwrap_err();

    assert!(matches!(err, StoreError::Remote(_)));
    assert_eq!(titles(&store), vec!["X"]);
    assert_eq!(notifier.errors(), vec!["Failed to create experiment"]);
    assert_eq!(store.last_error(), None);
}

#[tokio::test]
async fn create_with_unusable_response_is_a_shape_error() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());
    remote.respond_with(EndpointKind::Create, json!({"message": "created"}));

    let err = store.create(&draft("Y")).await.unwrap_err();

    assert!(matches!(err, StoreError::Shape(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn create_never_duplicates_an_id() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.respond_with(
        EndpointKind::Create,
        json!({"experiment": {"id": 1, "title": "X again"}}),
    );

    store.create(&draft("X again")).await.unwrap();

    assert_eq!(titles(&store), vec!["X again"]);
}

// ===========================================================================
// update
// ===========================================================================

#[tokio::test]
async fn update_replaces_record_in_place() {
    let (store, _, notifier) = seeded([experiment(1, "X"), experiment(2, "Y")]);
    store.reload(true).await;

    let updated = store.update(&id(2), &draft("Y2")).await.unwrap();

    assert_eq!(updated.title, "Y2");
    assert_eq!(titles(&store), vec!["X", "Y2"]);
    assert_eq!(
        notifier.successes().last().map(String::as_str),
        Some("Experiment updated successfully")
    );
}

#[tokio::test]
async fn update_validation_failure_makes_no_call() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    let before = remote.total_calls();

    let err = store
        .update(&id(1), &ExperimentDraft::new("X", "", "30_days"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Missing required fields: benchmark, primary_metric_of_interest"
    );
    assert_eq!(remote.total_calls(), before);
    assert_eq!(titles(&store), vec!["X"]);
}

#[tokio::test]
async fn update_of_id_missing_locally_refetches_it() {
    let (store, remote, _) = seeded([experiment(5, "Remote only")]);

    let updated = store.update(&id(5), &draft("Renamed")).await.unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(remote.call_count(EndpointKind::Get), 1);
    assert_eq!(titles(&store), vec!["Renamed"]);
}

#[tokio::test]
async fn failed_refetch_still_reports_update_success() {
    let (store, remote, _) = seeded([experiment(5, "Remote only")]);
    remote.fail_next(EndpointKind::Get, "timeout");

    assert!(store.update(&id(5), &draft("Renamed")).await.is_ok());
    assert!(store.is_empty());
}

#[tokio::test]
async fn update_failure_leaves_collection_unchanged() {
    let (store, remote, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.fail_next(EndpointKind::Update, "500");

    assert!(store.update(&id(1), &draft("X2")).await.is_err());
    assert_eq!(titles(&store), vec!["X"]);
    assert_eq!(notifier.errors(), vec!["Failed to update experiment"]);
    assert_eq!(store.last_error(), None);
}

// ===========================================================================
// delete
// ===========================================================================

#[tokio::test]
async fn delete_removes_matching_record() {
    let (store, remote, _) = seeded([experiment(1, "X"), experiment(2, "Y")]);
    store.reload(true).await;

    store.delete(&id(1)).await.unwrap();

    assert_eq!(titles(&store), vec!["Y"]);
    assert_eq!(remote.server_records().len(), 1);
}

#[tokio::test]
async fn delete_of_unknown_id_passes_remote_success_through() {
    let (store, remote, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.respond_with(EndpointKind::Delete, json!({"message": "ok"}));

    assert!(store.delete(&id(99)).await.is_ok());
    assert_eq!(titles(&store), vec!["X"]);
    assert_eq!(
        notifier.successes().last().map(String::as_str),
        Some("Experiment deleted successfully")
    );
}

#[tokio::test]
async fn delete_failure_keeps_record() {
    let (store, _, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;

    // backend answers 404 for an id it does not know
    let err = store.delete(&id(2)).await.unwrap_err();

    assert_eq!(err.to_string(), "API Error: 404 Not Found");
    assert_eq!(titles(&store), vec!["X"]);
    assert_eq!(notifier.errors(), vec!["Failed to delete experiment"]);
}

// ===========================================================================
// complete
// ===========================================================================

#[tokio::test]
async fn complete_triggers_exactly_one_reload() {
    let finished = experiment(1, "X").with_dates("2024-01-01", "2024-01-31");
    let (store, remote, notifier) = seeded([finished]);
    store.reload(true).await;

    let data = store
        .complete(&id(1), &CompletionPayload::default())
        .await
        .unwrap();

    assert_eq!(data["success"], json!(true));
    assert_eq!(remote.call_count(EndpointKind::Complete), 1);
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 2);
    let successes = notifier.successes();
    assert_eq!(
        successes[successes.len() - 2..],
        ["Loaded 1 experiments", "Experiment completed successfully"]
    );
}

#[tokio::test]
async fn complete_picks_up_server_side_end_date() {
    let mut open_ended = experiment(1, "X");
    open_ended.start_date = Some("2024-01-01".to_string());
    let (store, _, _) = seeded([open_ended]);
    store.reload(true).await;
    assert_eq!(store.not_started().len(), 1);

    store
        .complete(&id(1), &CompletionPayload::default())
        .await
        .unwrap();

    let refreshed = store.lookup(&id(1)).unwrap();
    let today = today_utc();
    assert_eq!(refreshed.end(), Some(today.as_str()));
    assert!(store.not_started().is_empty());
}

#[tokio::test]
async fn complete_sends_completion_payload() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    let payload = CompletionPayload {
        final_average: Some(42.5),
        total_datapoints: Some(10),
        ..Default::default()
    };

    store.complete(&id(1), &payload).await.unwrap();

    let call = remote
        .calls()
        .into_iter()
        .find(|c| c.endpoint.kind() == EndpointKind::Complete)
        .unwrap();
    assert_eq!(call.body.unwrap()["final_average"], json!(42.5));
}

#[tokio::test]
async fn complete_failure_does_not_reload() {
    let (store, remote, notifier) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.fail_next(EndpointKind::Complete, "gateway timeout");

    let result = store.complete(&id(1), &CompletionPayload::default()).await;

    assert!(result.is_err());
    assert_eq!(remote.call_count(EndpointKind::ListWithStats), 1);
    assert_eq!(notifier.errors(), vec!["Failed to complete experiment"]);
    assert_eq!(store.len(), 1);
}

// ===========================================================================
// reads
// ===========================================================================

#[tokio::test]
async fn lookup_finds_first_match_without_side_effects() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    let calls = remote.total_calls();

    assert_eq!(store.lookup(&id(1)).unwrap().title, "X");
    assert_eq!(store.lookup(&id(7)), None);
    assert_eq!(remote.total_calls(), calls);
}

#[tokio::test]
async fn fetch_refreshes_local_copy() {
    let (store, remote, _) = seeded([experiment(1, "X")]);
    store.reload(true).await;
    remote.respond_with(
        EndpointKind::Get,
        json!({"id": 1, "title": "X (edited elsewhere)"}),
    );

    let fetched = store.fetch(&id(1)).await.unwrap();

    assert_eq!(fetched.title, "X (edited elsewhere)");
    assert_eq!(titles(&store), vec!["X (edited elsewhere)"]);
}

#[tokio::test]
async fn fetch_does_not_insert_unknown_records() {
    let (store, _, _) = seeded([experiment(3, "Z")]);

    assert!(store.fetch(&id(3)).await.is_ok());
    assert!(store.is_empty());
}

#[tokio::test]
async fn stats_decodes_object_payload() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());
    remote.respond_with(
        EndpointKind::Stats,
        json!({
            "benchmark_value": 50.0,
            "current_value": 55.0,
            "improvement_percentage": 10.0,
            "data_points_count": 14,
            "benchmark_period": {"start": "2024-04-01", "end": "2024-04-30"}
        }),
    );

    let stats = store.stats(&id(1)).await.unwrap();

    assert_eq!(stats.improvement_percentage, Some(10.0));
    assert_eq!(stats.data_points_count, 14);
    assert!(store.is_empty());
}

#[tokio::test]
async fn stats_rejects_non_object_payload() {
    let (store, remote, notifier) = setup(MemoryRemoteClient::new());
    remote.respond_with(EndpointKind::Stats, json!([1, 2, 3]));

    let err = store.stats(&id(1)).await.unwrap_err();

    assert_eq!(err, StoreError::Shape("Invalid stats data".to_string()));
    assert_eq!(notifier.errors(), vec!["Failed to load experiment stats"]);
}

#[tokio::test]
async fn datapoints_for_known_experiment() {
    let (store, remote, _) = setup(MemoryRemoteClient::new());
    remote.respond_with(
        EndpointKind::Datapoints,
        json!({
            "experiment_id": 4,
            "experiment_title": "Magnesium",
            "metric_name": "sleep_score",
            "datapoints": [
                {"date": "2024-05-01", "value": 81.0, "metric_name": "sleep_score"},
                {"date": "2024-05-02", "value": 85.0, "metric_name": "sleep_score"}
            ],
            "total_count": 2
        }),
    );

    let set = store.datapoints(&id(4)).await.unwrap();

    assert_eq!(set.experiment_id, id(4));
    assert_eq!(set.total_count, 2);
    let payload = CompletionPayload::from_datapoints(set.datapoints, set.total_count);
    assert_eq!(payload.final_average, Some(83.0));
}

// ===========================================================================
// views and isolation
// ===========================================================================

#[tokio::test]
async fn store_views_follow_collection() {
    let records = vec![
        experiment(1, "A").with_dates("2024-05-01", "2024-12-31"),
        experiment(2, "B").with_dates("2024-06-01", "2024-12-31"),
        experiment(3, "C"),
        experiment(4, "D").with_dates("2024-01-01", "2024-01-31"),
    ];
    let (store, _, _) = seeded(records);
    store.reload(true).await;

    assert_eq!(titles_of(store.ongoing_on("2024-07-01")), vec!["B", "A"]);
    assert_eq!(titles_of(store.completed_on("2024-07-01")), vec!["D"]);
    assert_eq!(titles_of(store.not_started()), vec!["C"]);

    store.delete(&id(2)).await.unwrap();
    assert_eq!(titles_of(store.ongoing_on("2024-07-01")), vec!["A"]);
}

#[tokio::test]
async fn views_are_recomputed_for_each_date() {
    let records = vec![
        experiment(1, "A").with_dates("2024-05-01", "2024-05-31"),
        experiment(2, "B").with_dates("2024-06-01", "2024-06-30"),
    ];
    let (store, remote, _) = seeded(records);
    store.reload(true).await;
    let calls = remote.total_calls();

    let in_may = titles_of(store.ongoing_on("2024-05-15"));
    let in_june = titles_of(store.ongoing_on("2024-06-15"));

    assert_eq!(in_may, vec!["A"]);
    assert_eq!(in_june, vec!["B"]);
    assert_eq!(titles_of(store.completed_on("2024-06-15")), vec!["A"]);
    assert_eq!(titles(&store), vec!["A", "B"]);
    assert_eq!(remote.total_calls(), calls);
}

#[tokio::test]
async fn independent_stores_do_not_share_state() {
    let remote = MemoryRemoteClient::new().with_experiments([experiment(1, "X")]);
    let remote = Arc::new(remote);
    let first = ExperimentStore::with_remote(remote.clone());
    let second = ExperimentStore::with_remote(remote);

    first.reload(true).await;

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[tokio::test]
async fn store_can_be_shared_across_tasks() {
    let remote = MemoryRemoteClient::new().with_experiments([experiment(1, "X")]);
    let remote = Arc::new(remote);
    let store = Arc::new(ExperimentStore::with_remote(remote));

    let worker = {
        let store = store.clone();
        tokio::spawn(async move { store.reload(true).await })
    };

    assert_eq!(worker.await.unwrap(), ReloadStatus::Loaded(1));
    assert_eq!(store.len(), 1);
}
