// tests/source_http.rs
//
// HttpPostSource against a real in-process axum server on an ephemeral port.

use serde_json::json;
use shuttle_axum::axum::{extract::Path, http::StatusCode, routing::get, Json, Router};

use oshi_auto_events::source::{HttpPostSource, PostSource};

fn post(id: i64, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "userId": 9,
        "content": format!("post {id}"),
        "createdAt": created_at,
        "user": {"id": 9, "username": "mika", "name": "Mika", "email": "m@example.com", "avatarUrl": ""}
    })
}

async fn posts_for(Path(handle): Path<String>) -> Result<Json<serde_json::Value>, StatusCode> {
    match handle.as_str() {
        "mika" => Ok(Json(json!({
            "posts": [
                post(1, "2025-10-01 09:00:00"),
                post(2, "2025-10-03 21:00:00"),
                post(3, "2025-10-02 12:00:00"),
                post(4, "2025-09-30 08:00:00"),
            ]
        }))),
        "empty" => Ok(Json(json!({ "posts": [] }))),
        "garbage" => Ok(Json(json!({ "items": 3 }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Serves the post API on 127.0.0.1:0 and returns its base URL.
async fn spawn_server() -> String {
    let app = Router::new().route("/v1/posts/username/{handle}", get(posts_for));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        shuttle_axum::axum::serve(listener, app)
            .await
            .expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn returns_newest_posts_up_to_limit() {
    let base = spawn_server().await;
    let source = HttpPostSource::new(base).with_timeout(5);

    let posts = source.get_latest_posts("mika", 2).await.expect("fetch");
    let ids: Vec<_> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(posts[0].user.name, "Mika");
}

#[tokio::test]
async fn empty_list_is_ok() {
    let base = spawn_server().await;
    let source = HttpPostSource::new(format!("{base}/"));
    assert!(source.get_latest_posts("empty", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn non_200_is_an_error_naming_the_account() {
    let base = spawn_server().await;
    let source = HttpPostSource::new(base);

    let err = source.get_latest_posts("nobody", 5).await.unwrap_err();
    assert_eq!(err.to_string(), "API returned status 404 for account nobody");
}

#[tokio::test]
async fn malformed_body_is_an_error() {
    let base = spawn_server().await;
    let source = HttpPostSource::new(base);

    let err = source.get_latest_posts("garbage", 5).await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to unmarshal response"));
}

#[tokio::test]
async fn unreachable_host_is_an_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpPostSource::new(format!("http://{addr}")).with_timeout(2);
    let err = source.get_latest_posts("mika", 5).await.unwrap_err();
    assert!(err.to_string().starts_with("failed to fetch posts for mika"));
}
