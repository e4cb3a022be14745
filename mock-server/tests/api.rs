use std::io::Read;
use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, SiteState, BIG_BODY_LEN, GZIP_TEXT};
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_text(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response.headers()[http::header::LOCATION].to_str().unwrap()
}

// --- plain pages ---

#[tokio::test]
async fn hello_returns_text() {
    let resp = app().oneshot(get("/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "hello world");
}

#[tokio::test]
async fn echo_reflects_request() {
    let req = Request::builder()
        .method("POST")
        .uri("/echo?x=1")
        .header("x-probe", "yes")
        .body("a=1".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    let text = body_text(resp).await;
    assert!(text.starts_with("POST /echo?x=1\n"));
    assert!(text.contains("x-probe: yes\n"));
    assert!(text.ends_with("\n\na=1"));
}

#[tokio::test]
async fn big_body_has_fixed_length() {
    let resp = app().oneshot(get("/big")).await.unwrap();
    assert_eq!(body_bytes(resp).await.len(), BIG_BODY_LEN);
}

// --- redirects ---

#[tokio::test]
async fn redirect_counts_down() {
    let resp = app().oneshot(get("/redirect/2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/redirect/1");

    let resp = app().oneshot(get("/redirect/0")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "done");
}

#[tokio::test]
async fn loop_points_at_itself() {
    let resp = app().oneshot(get("/loop")).await.unwrap();
    assert_eq!(location(&resp), "/loop");
}

#[tokio::test]
async fn redirect_to_uses_query() {
    let resp = app()
        .oneshot(get("/redirect-to?url=http%3A%2F%2Flocalhost%3A1%2Fhello"))
        .await
        .unwrap();
    assert_eq!(location(&resp), "http://localhost:1/hello");
}

#[tokio::test]
async fn post_redirect_sends_query_target() {
    let req = Request::builder()
        .method("POST")
        .uri("/post-redirect")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/echo?from=post");
}

#[tokio::test]
async fn set_cookie_redirects_with_cookie() {
    let resp = app().oneshot(get("/set-cookie")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers()[http::header::SET_COOKIE],
        "session=abc%20123; Path=/"
    );
    assert_eq!(location(&resp), "/echo");
}

// --- documents ---

#[tokio::test]
async fn frameset_lists_frames() {
    let resp = app().oneshot(get("/frames/3")).await.unwrap();
    let html = body_text(resp).await;
    assert_eq!(html.matches("<frame src=").count(), 3);
    assert!(html.contains("/frame/2"));
}

#[tokio::test]
async fn meta_refresh_points_at_hello() {
    let resp = app().oneshot(get("/meta-refresh")).await.unwrap();
    assert!(body_text(resp).await.contains("URL=/hello"));
}

#[tokio::test]
async fn gzip_body_decodes() {
    let resp = app().oneshot(get("/gzip")).await.unwrap();
    assert_eq!(resp.headers()[http::header::CONTENT_ENCODING], "gzip");
    let compressed = body_bytes(resp).await;
    let mut text = String::new();
    flate2::read::GzDecoder::new(&compressed[..])
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, GZIP_TEXT);
}

// --- bookkeeping ---

#[tokio::test]
async fn requests_are_counted_per_path() {
    let site = Arc::new(SiteState::default());
    let app = app_with_state(site.clone());
    app.clone().oneshot(get("/hello")).await.unwrap();
    app.clone().oneshot(get("/hello")).await.unwrap();
    app.oneshot(get("/frame/1")).await.unwrap();

    assert_eq!(site.hits("/hello"), 2);
    assert_eq!(site.hits("/frame/1"), 1);
    assert_eq!(site.hits("/frame/0"), 0);
}
