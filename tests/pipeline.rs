mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use xshare::dom::{Document, Propagation};
use xshare::{HostServices, Page, ShareConfig, ShareController};

fn controller(page: &Page) -> ShareController {
    ShareController::new(page.clone(), config(), HostServices::noop()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn install_runs_once_per_session() {
    let page = Page::from_html(&feed(&[post("Alice", "alice", "Hi")]), Some(ORIGIN)).unwrap();
    let c = controller(&page);

    assert!(c.install());
    assert!(!c.install());
    assert!(!c.clone().install());
    tick().await;

    assert_eq!(page.observer_count(), 1);
    assert!(c.session().watcher_running());
    assert_eq!(share_buttons(&page).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn existing_and_inserted_posts_get_exactly_one_control() {
    let page = Page::from_html(&feed(&[post("Alice", "alice", "Hi")]), Some(ORIGIN)).unwrap();
    let c = controller(&page);
    c.install();
    tick().await;

    // a wrapper carrying two posts arrives in one batch
    let main = page.query_selector(page.root(), "main").unwrap().unwrap();
    page.update(|d| {
        let wrapper = d.create_element("div");
        for handle in ["bob", "carol"] {
            let article = d.create_element("article");
            d.set_attr(article, "data-handle", handle).unwrap();
            let group = d.create_element("div");
            d.set_attr(group, "role", "group").unwrap();
            d.append_child(article, group).unwrap();
            d.append_child(wrapper, article).unwrap();
        }
        d.append_child(main, wrapper).unwrap();
    });
    tick().await;

    let all_posts = posts(&page);
    assert_eq!(all_posts.len(), 3);
    for p in &all_posts {
        assert_eq!(page.query_selector_all(*p, ".x-share-button").unwrap().len(), 1);
    }

    // re-inserting an already processed post does not add a second control
    let first = all_posts[0];
    page.update(|d| {
        d.remove(first);
        d.append_child(main, first).unwrap();
    });
    tick().await;
    assert_eq!(share_buttons(&page).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn posts_without_action_bar_are_skipped() {
    let page = Page::from_html(
        &feed(&["<article><p>promoted</p></article>".to_string()]),
        Some(ORIGIN),
    )
    .unwrap();
    let c = controller(&page);
    c.install();
    tick().await;

    assert!(share_buttons(&page).is_empty());
    assert!(c.session().watcher_running());
}

#[tokio::test(start_paused = true)]
async fn post_marker_can_use_structural_selectors() {
    let promoted = post("Ad", "ad", "Buy").replace("<article ", r#"<article class="promoted" "#);
    let page = Page::from_html(
        &feed(&[post("Alice", "alice", "Hi"), promoted]),
        Some(ORIGIN),
    )
    .unwrap();
    let mut cfg = config();
    cfg.selectors.post = "main > article:not(.promoted)".to_string();
    let c = ShareController::new(page.clone(), cfg, HostServices::noop()).unwrap();
    c.install();
    tick().await;

    let buttons = share_buttons(&page);
    assert_eq!(buttons.len(), 1);
    let alice = posts(&page)[0];
    assert_eq!(page.query_selector_all(alice, ".x-share-button").unwrap(), buttons);
}

#[tokio::test(start_paused = true)]
async fn waits_for_body_then_feed_root() {
    let page = Page::new(Document::empty(), Some(ORIGIN)).unwrap();
    let c = controller(&page);
    c.install();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(page.observer_count(), 0);

    page.update(|d| {
        let root = d.root();
        let body = d.create_element("body");
        d.append_child(root, body).unwrap();
    });
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(page.observer_count(), 0);
    assert!(c.session().watcher_running());

    let body = page.body().unwrap();
    page.update(|d| {
        let main = d.create_element("main");
        let article = d.create_element("article");
        let group = d.create_element("div");
        d.set_attr(group, "role", "group").unwrap();
        d.append_child(article, group).unwrap();
        d.append_child(main, article).unwrap();
        d.append_child(body, main).unwrap();
    });
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(page.observer_count(), 1);
    assert_eq!(share_buttons(&page).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bounded_root_wait_gives_up() {
    let page = Page::from_html("<body><div id=\"app\"></div></body>", Some(ORIGIN)).unwrap();
    let cfg = ShareConfig {
        root_max_attempts: Some(3),
        ..config()
    };
    let c = ShareController::new(page.clone(), cfg, HostServices::noop()).unwrap();
    c.install();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!c.session().watcher_running());
    assert_eq!(page.observer_count(), 0);
    // the session stays installed
    assert!(!c.install());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_observation() {
    let page = Page::from_html(&feed(&[post("Alice", "alice", "Hi")]), Some(ORIGIN)).unwrap();
    let c = controller(&page);
    c.install();
    tick().await;
    c.shutdown();
    tick().await;

    assert!(!c.session().watcher_running());
    let main = page.query_selector(page.root(), "main").unwrap().unwrap();
    page.update(|d| {
        let article = d.create_element("article");
        let group = d.create_element("div");
        d.set_attr(group, "role", "group").unwrap();
        d.append_child(article, group).unwrap();
        d.append_child(main, article).unwrap();
    });
    tick().await;
    assert_eq!(share_buttons(&page).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn share_click_does_not_reach_the_post() {
    let page = Page::from_html(&feed(&[post("Alice", "alice", "Hi")]), Some(ORIGIN)).unwrap();
    let harness = Harness::new();
    let c = ShareController::new(page.clone(), config(), harness.services()).unwrap();
    c.install();
    tick().await;

    let opened = Arc::new(AtomicUsize::new(0));
    let o = opened.clone();
    let article = posts(&page)[0];
    page.on_click(
        article,
        Arc::new(move |_, _| {
            o.fetch_add(1, Ordering::SeqCst);
            Propagation::Continue
        }),
    );

    page.click(share_buttons(&page)[0]).unwrap();
    let reports = c.settle_actions().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].post, article);
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}
