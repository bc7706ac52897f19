//! End-to-end model runs against a mock HTTP server.
//!
//! Each test serves a small synthetic site and drives a full run through the
//! real HTTP fetcher, asserting on the shape of the emitted page-class
//! graph.

use std::sync::Arc;
use tessera::acquisition::HttpFetcher;
use tessera::config::ModelerConfig;
use tessera::graph::types::EdgeKind;
use tessera::modeler::driver::ModelerDriver;
use tessera::modeler::RunOutcome;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_html(server: &MockServer, route: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html.as_bytes().to_vec(), "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

fn detail_page(n: u32) -> String {
    format!(
        r#"<html><body>
            <h1>Item {n}</h1>
            <span class="price">{n}0.00</span>
            <div class="back"><a href="/">home</a></div>
        </body></html>"#
    )
}

fn test_config(entry: &str) -> ModelerConfig {
    let mut cfg = ModelerConfig::for_site(entry);
    cfg.max_total_pages = 30;
    cfg.inter_batch_wait_ms = 0;
    cfg.fetch_timeout_ms = 5_000;
    cfg
}

async fn run(server: &MockServer) -> RunOutcome {
    let cfg = test_config(&format!("{}/", server.uri()));
    let fetcher = Arc::new(HttpFetcher::new(cfg.fetch_timeout_ms));
    let driver = ModelerDriver::new(cfg, fetcher, None).expect("driver starts");
    driver.run().await
}

#[tokio::test]
async fn list_site_produces_home_and_detail_classes() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <ul class="items">
                <li><a href="/item/1">one</a></li>
                <li><a href="/item/2">two</a></li>
                <li><a href="/item/3">three</a></li>
            </ul>
        </body></html>"#,
    )
    .await;
    for n in 1..=3u32 {
        mount_html(&server, &format!("/item/{n}"), &detail_page(n)).await;
    }

    let outcome = run(&server).await;
    let graph = outcome.graph().expect("graph produced");
    graph.validate().expect("well-formed graph");

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.header.pages_fetched, 4);

    let list_edges: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::List)
        .collect();
    assert_eq!(list_edges.len(), 1);
    assert_eq!(list_edges[0].from, graph.root);

    // The detail class links back to home.
    assert!(graph
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Singleton && e.to == graph.root));

    // Detail pages expose their data fields.
    let detail = graph
        .nodes
        .iter()
        .find(|n| n.id != graph.root)
        .expect("detail class");
    assert!(detail.data_paths.iter().any(|d| d.path.contains("h1")));
    assert!(detail
        .data_paths
        .iter()
        .any(|d| d.path.contains("span[@class]")));
}

#[tokio::test]
async fn failed_fetches_are_dropped_not_fatal() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <ul class="items">
                <li><a href="/item/1">one</a></li>
                <li><a href="/item/2">two</a></li>
                <li><a href="/item/3">three</a></li>
            </ul>
        </body></html>"#,
    )
    .await;
    // item/2 is never mocked: the mock server answers 404 and the page is
    // dropped from the batch.
    mount_html(&server, "/item/1", &detail_page(1)).await;
    mount_html(&server, "/item/3", &detail_page(3)).await;

    let outcome = run(&server).await;
    let graph = outcome.graph().expect("partial batch still models");
    graph.validate().expect("well-formed graph");

    assert_eq!(graph.header.pages_dropped, 1);
    // Two surviving pages with one shared schema: still a list.
    assert!(graph.edges.iter().any(|e| e.kind == EdgeKind::List));
}

#[tokio::test]
async fn redirects_deduplicate_against_visited_pages() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <ul class="items">
                <li><a href="/item/1">one</a></li>
                <li><a href="/item/2">two</a></li>
                <li><a href="/item/3">three</a></li>
            </ul>
            <div class="promo"><a href="/alias">featured</a></div>
        </body></html>"#,
    )
    .await;
    for n in 1..=3u32 {
        mount_html(&server, &format!("/item/{n}"), &detail_page(n)).await;
    }
    Mock::given(method("GET"))
        .and(path("/alias"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", "/item/1"),
        )
        .mount(&server)
        .await;

    let outcome = run(&server).await;
    let graph = outcome.graph().expect("graph produced");
    graph.validate().expect("well-formed graph");

    // home + 3 items + the alias fetch (whose redirect target was already
    // visited, so no new page was created).
    assert_eq!(graph.header.pages_fetched, 5);
    assert_eq!(graph.nodes.len(), 2);

    // The alias collection resolves to a singleton edge into the detail
    // class.
    let detail_id = graph
        .nodes
        .iter()
        .find(|n| n.id != graph.root)
        .map(|n| n.id)
        .expect("detail class");
    assert!(graph
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Singleton && e.from == graph.root && e.to == detail_id));
}

#[tokio::test]
async fn heterogeneous_nav_is_classified_as_menu() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <nav id="menu">
                <a href="/about">about</a>
                <a href="/products">products</a>
                <a href="/contact">contact</a>
            </nav>
        </body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/about",
        r#"<html><body><article><h1>About us</h1><p>Founded long ago.</p></article></body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/products",
        r#"<html><body>
            <h2>Products</h2>
            <ul class="plist">
                <li><a href="/p/1">widget</a></li>
                <li><a href="/p/2">gadget</a></li>
            </ul>
        </body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/contact",
        r#"<html><body><section class="contact"><span>mail@example.test</span></section></body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/p/1",
        r#"<html><body><h3>widget</h3></body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/p/2",
        r#"<html><body><h3>gadget</h3></body></html>"#,
    )
    .await;

    let outcome = run(&server).await;
    let graph = outcome.graph().expect("graph produced");
    graph.validate().expect("well-formed graph");

    // Three structurally distinct nav targets: per-position menu edges from
    // the root class.
    let menu_edges: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| matches!(e.kind, EdgeKind::Menu { .. }) && e.from == graph.root)
        .collect();
    assert_eq!(menu_edges.len(), 3);
    for index in 0..3u32 {
        assert!(menu_edges.iter().any(|e| e.kind == EdgeKind::Menu { index }));
    }

    // The products class still carries its own list edge.
    assert!(graph.edges.iter().any(|e| e.kind == EdgeKind::List));
}

#[tokio::test]
async fn unreachable_seed_reports_no_model() {
    let server = MockServer::start().await;
    // Nothing mounted: every request 404s.
    match run(&server).await {
        RunOutcome::NoModel { reason } => assert!(!reason.is_empty()),
        RunOutcome::Graph(_) => panic!("expected the no-model signal"),
    }
}
