mod common;

use std::collections::BTreeSet;

use common::*;
use kabusync_lib::kabusync_sources::{ActionClient, ListingClient};
use kabusync_lib::types::ListingRow;
use kabusync_lib::{
    BlobStore, CursorStore, MemoryStore, Pipeline, Registry, RegistryStore, SeriesStore,
    StoredSeries,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NEW_LISTINGS_HTML: &str = r#"<html><body>
<table class="widetable">
  <tr><th>上場日</th><th>会社名</th><th>コード</th></tr>
  <tr><td>2024/01/12<br>（2023/12/08）</td><td>日立サンプル（株）</td><td>6501</td></tr>
  <tr><td>プライム</td></tr>
  <tr><td>2024/01/15</td><td>来週上場（株）</td><td>135A</td></tr>
  <tr><td>グロース</td></tr>
</table></body></html>"#;

const DELISTED_HTML: &str = r#"<html><body>
<table class="widetable">
  <tr><th>上場廃止日</th><th>銘柄名</th><th>コード</th><th>市場区分</th><th>理由</th></tr>
  <tr><td>2024/01/12</td><td>トヨタサンプル（株）</td><td>7203</td><td>プライム</td><td>株式交換</td></tr>
</table></body></html>"#;

const SPLITS_HTML: &str = r#"<html><body>
<table>
  <tr><th>更新日</th><th>コード</th><th>銘柄名</th><th>市場</th><th colspan="3">比率</th></tr>
  <tr><td>2024/01/12</td><td>6501</td><td>日立サンプル</td><td>東証プライム</td><td>2</td><td>：</td><td>1</td></tr>
</table></body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

async fn mount_feeds(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/listing/stocks/new/index.html"))
        .respond_with(html(NEW_LISTINGS_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listing/stocks/delisted/index.html"))
        .respond_with(html(DELISTED_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/matsui/"))
        .and(query_param("type", "0"))
        .and(query_param("seldate", "1"))
        .respond_with(html(SPLITS_HTML))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/matsui/"))
        .and(query_param("type", "5"))
        .respond_with(html("<html><body>該当なし</body></html>"))
        .mount(server)
        .await;
}

fn seed_state<S: BlobStore>(store: &S) {
    RegistryStore::new(store)
        .save(&Registry::from(vec![instrument("7203")]))
        .unwrap();
    SeriesStore::new(store)
        .save(
            "6501",
            &StoredSeries::new(vec![
                row(date(2024, 1, 9), 1000.0, 3000),
                row(date(2024, 1, 10), 1000.0, 3000),
            ]),
        )
        .unwrap();
    CursorStore::new(store)
        .set("6501", date(2024, 1, 10))
        .unwrap();
}

#[tokio::test]
async fn daily_run_against_mocked_feeds() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;

    let db = open_test_db();
    seed_state(&db);

    let prices = FakePrices::new().with_bars(
        "6501",
        vec![
            bar(date(2024, 1, 11), 1000.0, 3000),
            bar(date(2024, 1, 12), 500.0, 6000),
        ],
    );
    let listings = ListingClient::with_base_url(&server.uri()).unwrap();
    let actions = ActionClient::with_base_url(&format!("{}/matsui/", server.uri())).unwrap();
    let pipeline = Pipeline::new(&db, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(outcome.reconcile);
    assert!(outcome.fetch);
    assert!(outcome.adjust);
    assert!(outcome.overall);

    // 7203 delisted, 6501 listed; next week's listing ignored.
    let registry = RegistryStore::new(&db).load().unwrap();
    assert_eq!(registry.codes(), vec!["6501"]);

    // Incremental fetch asked only for the missing days.
    assert_eq!(
        *prices.requests.lock().unwrap(),
        vec![("6501".to_string(), date(2024, 1, 11), today())]
    );
    assert_eq!(CursorStore::new(&db).get("6501").unwrap(), Some(today()));

    let doc = SeriesStore::new(&db).load("6501").unwrap().unwrap();
    let dates: Vec<_> = doc.rows.iter().map(|r| r.date).collect();
    assert_eq!(
        dates,
        vec![date(2024, 1, 9), date(2024, 1, 10), date(2024, 1, 11), today()]
    );
    // Rows before the effective date are back-adjusted; today's row is not.
    for r in &doc.rows[..3] {
        assert_eq!(r.close, 2000.0);
        assert_eq!(r.volume, 1500);
    }
    assert_eq!(doc.rows[3], row(today(), 500.0, 6000));
    assert_eq!(doc.applied_actions.len(), 1);

    assert_eq!(outcome.counters.reconcile.added, 1);
    assert_eq!(outcome.counters.reconcile.removed, 1);
    assert_eq!(outcome.counters.fetch.fetched, 1);
    assert_eq!(outcome.counters.adjust.applied, 1);
    assert_eq!(db.get_meta("last_run_date").unwrap(), Some("2024-01-12".to_string()));
    assert!(db.get_meta("last_updated").unwrap().is_some());
}

#[tokio::test]
async fn rerun_on_same_day_changes_nothing() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;

    let db = open_test_db();
    seed_state(&db);
    let prices = FakePrices::new().with_bars(
        "6501",
        vec![
            bar(date(2024, 1, 11), 1000.0, 3000),
            bar(date(2024, 1, 12), 500.0, 6000),
        ],
    );
    let listings = ListingClient::with_base_url(&server.uri()).unwrap();
    let actions = ActionClient::with_base_url(&format!("{}/matsui/", server.uri())).unwrap();
    let pipeline = Pipeline::new(&db, &prices, &listings, &actions, settings(), today());

    assert!(pipeline.run(false).await.overall);
    let first = SeriesStore::new(&db).load("6501").unwrap().unwrap();
    let registry = RegistryStore::new(&db).load().unwrap();

    let outcome = pipeline.run(false).await;
    assert!(outcome.overall);
    assert_eq!(outcome.counters.reconcile.added, 0);
    assert_eq!(outcome.counters.reconcile.removed, 0);
    assert_eq!(outcome.counters.fetch.skipped, 1);
    assert_eq!(outcome.counters.adjust.already_applied, 1);
    assert_eq!(outcome.counters.adjust.applied, 0);

    // Cursor is at today: no second price request.
    assert_eq!(prices.request_count(), 1);
    assert_eq!(SeriesStore::new(&db).load("6501").unwrap().unwrap(), first);
    assert_eq!(RegistryStore::new(&db).load().unwrap(), registry);
}

#[tokio::test]
async fn reconcile_failure_skips_later_stages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    seed_state(&store);
    let prices = FakePrices::new();
    let listings = ListingClient::with_base_url(&server.uri()).unwrap();
    let actions = FakeActions::with_split("6501", today(), "2:1");
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(!outcome.reconcile);
    assert!(!outcome.fetch);
    assert!(!outcome.adjust);
    assert!(!outcome.overall);
    assert_eq!(prices.request_count(), 0);
    assert_eq!(actions.call_count(), 0);
    assert_eq!(
        RegistryStore::new(&store).load().unwrap().codes(),
        vec!["7203"]
    );
}

#[tokio::test]
async fn empty_registry_fails_fetch_and_skips_adjust() {
    let store = MemoryStore::new();
    let prices = FakePrices::new();
    let listings = FakeListings::default();
    let actions = FakeActions::with_split("6501", today(), "2:1");
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(outcome.reconcile);
    assert!(!outcome.fetch);
    assert!(!outcome.adjust);
    assert_eq!(actions.call_count(), 0);
    assert_eq!(store.get_meta("last_run_date").unwrap(), Some("2024-01-12".to_string()));
    assert_eq!(store.get_meta("last_updated").unwrap(), None);
}

#[tokio::test]
async fn one_failing_instrument_does_not_fail_the_stage() {
    let store = MemoryStore::new();
    RegistryStore::new(&store)
        .save(&Registry::from(vec![instrument("6501"), instrument("7203")]))
        .unwrap();
    let prices = FakePrices::new()
        .with_bars("6501", vec![bar(today(), 500.0, 100)])
        .failing("7203");
    let listings = FakeListings::default();
    let actions = FakeActions::default();
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(outcome.fetch);
    assert!(outcome.overall);
    assert_eq!(outcome.counters.fetch.fetched, 1);
    assert_eq!(outcome.counters.fetch.failed, 1);
    assert_eq!(CursorStore::new(&store).get("7203").unwrap(), None);
    assert!(SeriesStore::new(&store).load("7203").unwrap().is_none());
    // Both split and merger feeds were consulted with the same-day filter.
    assert_eq!(actions.call_count(), 2);
}

#[tokio::test]
async fn every_instrument_failing_fails_the_stage() {
    let store = MemoryStore::new();
    RegistryStore::new(&store)
        .save(&Registry::from(vec![instrument("7203")]))
        .unwrap();
    let prices = FakePrices::new().failing("7203");
    let listings = FakeListings::default();
    let actions = FakeActions::default();
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(outcome.reconcile);
    assert!(!outcome.fetch);
    assert!(!outcome.overall);
    assert_eq!(actions.call_count(), 0);
}

#[tokio::test]
async fn series_write_failure_restores_cursor() {
    let store = FailingSeriesStore::default();
    RegistryStore::new(&store)
        .save(&Registry::from(vec![instrument("6501"), instrument("7203")]))
        .unwrap();
    CursorStore::new(&store)
        .set("6501", date(2024, 1, 10))
        .unwrap();
    let prices = FakePrices::new()
        .with_bars("6501", vec![bar(date(2024, 1, 11), 1.0, 1), bar(today(), 1.0, 1)])
        .with_bars("7203", vec![bar(today(), 1.0, 1)]);
    let listings = FakeListings::default();
    let actions = FakeActions::default();
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let stage = pipeline.fetch_stage(None, false).await;
    assert!(!stage.ok);
    assert_eq!(stage.counters.persistence_failures, 2);

    let cursors = CursorStore::new(&store);
    assert_eq!(cursors.get("6501").unwrap(), Some(date(2024, 1, 10)));
    assert_eq!(cursors.get("7203").unwrap(), None);
}

#[tokio::test]
async fn full_refetch_replaces_series() {
    let store = MemoryStore::new();
    seed_state(&store);
    let prices = FakePrices::new().with_bars("6501", vec![bar(date(2023, 12, 28), 900.0, 10)]);
    let listings = FakeListings::default();
    let actions = FakeActions::default();
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let codes = vec!["6501".to_string()];
    let stage = pipeline.fetch_stage(Some(&codes), true).await;
    assert!(stage.ok);

    let doc = SeriesStore::new(&store).load("6501").unwrap().unwrap();
    assert_eq!(doc.rows, vec![row(date(2023, 12, 28), 900.0, 10)]);
    assert_eq!(
        CursorStore::new(&store).get("6501").unwrap(),
        Some(date(2023, 12, 28))
    );
    let requests = prices.requests.lock().unwrap();
    assert_eq!(requests[0].1, kabusync_lib::earliest_date());
}

#[tokio::test]
async fn invalid_ratio_is_counted_not_applied() {
    let store = MemoryStore::new();
    seed_state(&store);
    let before = SeriesStore::new(&store).load("6501").unwrap();
    let prices = FakePrices::new();
    let listings = FakeListings::default();
    let actions = FakeActions::with_split("6501", today(), "未定");
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let stage = pipeline.adjust_stage(&BTreeSet::new()).await;
    assert!(stage.ok);
    assert_eq!(stage.counters.invalid_ratio, 1);
    assert_eq!(stage.counters.applied, 0);
    assert_eq!(SeriesStore::new(&store).load("6501").unwrap(), before);
}

#[tokio::test]
async fn listings_from_other_days_do_not_reconcile() {
    let store = MemoryStore::new();
    let listings = FakeListings {
        new_listings: vec![ListingRow {
            effective_date: date(2024, 1, 11),
            name: "昨日上場".to_string(),
            code: "1301".to_string(),
            market_segment: "プライム".to_string(),
        }],
        ..FakeListings::default()
    };
    let prices = FakePrices::new();
    let actions = FakeActions::default();
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let stage = pipeline.reconcile_stage().await;
    assert!(stage.ok);
    assert_eq!(stage.counters.added, 0);
    assert!(RegistryStore::new(&store).load().unwrap().is_empty());
}

#[tokio::test]
async fn action_for_unfetched_instrument_is_deferred_until_prices_land() {
    let store = MemoryStore::new();
    RegistryStore::new(&store)
        .save(&Registry::from(vec![instrument("6501"), instrument("7203")]))
        .unwrap();
    SeriesStore::new(&store)
        .save("6501", &StoredSeries::new(vec![row(date(2024, 1, 9), 1000.0, 3000)]))
        .unwrap();
    CursorStore::new(&store)
        .set("6501", date(2024, 1, 9))
        .unwrap();
    let listings = FakeListings::default();
    let actions = FakeActions::with_split("6501", today(), "2:1");

    let prices = FakePrices::new()
        .failing("6501")
        .with_bars("7203", vec![bar(today(), 2500.0, 100)]);
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());
    let outcome = pipeline.run(false).await;

    assert!(outcome.fetch);
    assert!(!outcome.adjust);
    assert!(!outcome.overall);
    assert_eq!(outcome.counters.fetch.failed, 1);
    assert_eq!(outcome.counters.adjust.deferred, 1);
    assert_eq!(outcome.counters.adjust.applied, 0);
    let doc = SeriesStore::new(&store).load("6501").unwrap().unwrap();
    assert_eq!(doc.rows, vec![row(date(2024, 1, 9), 1000.0, 3000)]);
    assert!(doc.applied_actions.is_empty());
    assert_eq!(store.get_meta("last_updated").unwrap(), None);

    // Same-day rerun once the price source recovers.
    let prices = FakePrices::new().with_bars(
        "6501",
        vec![
            bar(date(2024, 1, 10), 1000.0, 3000),
            bar(date(2024, 1, 11), 1000.0, 3000),
            bar(today(), 500.0, 6000),
        ],
    );
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());
    let outcome = pipeline.run(false).await;

    assert!(outcome.overall);
    assert_eq!(outcome.counters.adjust.deferred, 0);
    assert_eq!(outcome.counters.adjust.applied, 1);
    let doc = SeriesStore::new(&store).load("6501").unwrap().unwrap();
    assert_eq!(doc.rows.len(), 4);
    for r in &doc.rows[..3] {
        assert_eq!(r.close, 2000.0);
        assert_eq!(r.volume, 1500);
    }
    assert_eq!(doc.rows[3], row(today(), 500.0, 6000));
    assert_eq!(doc.applied_actions.len(), 1);
}

#[tokio::test]
async fn same_day_split_and_merger_each_apply_once() {
    let store = MemoryStore::new();
    RegistryStore::new(&store)
        .save(&Registry::from(vec![instrument("6501")]))
        .unwrap();
    SeriesStore::new(&store)
        .save("6501", &StoredSeries::new(vec![row(date(2024, 1, 11), 1000.0, 4000)]))
        .unwrap();
    CursorStore::new(&store)
        .set("6501", date(2024, 1, 11))
        .unwrap();
    let prices = FakePrices::new().with_bars("6501", vec![bar(today(), 250.0, 16000)]);
    let listings = FakeListings::default();
    let actions =
        FakeActions::with_split("6501", today(), "1:2").and_merger("6501", today(), "1:2");
    let pipeline = Pipeline::new(&store, &prices, &listings, &actions, settings(), today());

    let outcome = pipeline.run(false).await;
    assert!(outcome.overall);
    assert_eq!(outcome.counters.adjust.actions, 2);
    assert_eq!(outcome.counters.adjust.applied, 2);
    let doc = SeriesStore::new(&store).load("6501").unwrap().unwrap();
    assert_eq!(doc.rows[0], row(date(2024, 1, 11), 250.0, 16000));
    assert_eq!(doc.applied_actions.len(), 2);

    // Replaying the day scales nothing further.
    let outcome = pipeline.run(false).await;
    assert_eq!(outcome.counters.adjust.applied, 0);
    assert_eq!(outcome.counters.adjust.already_applied, 2);
    let replayed = SeriesStore::new(&store).load("6501").unwrap().unwrap();
    assert_eq!(replayed, doc);
}
