mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{bearer, spawn_app, ADA_TOKEN};

#[tokio::test]
async fn get_members_is_a_public_array_oldest_first() -> Result<()> {
    let app = spawn_app().await?;

    let res = app.client.get(app.url("/api/page/generic/get_members")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");

    let body: Value = res.json().await?;
    let names: Vec<&str> = body
        .as_array()
        .expect("array body")
        .iter()
        .filter_map(|m| m["username"].as_str())
        .collect();
    assert_eq!(names, vec!["ada", "grace"]);
    Ok(())
}

#[tokio::test]
async fn query_parameters_reach_read_handlers() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .get(app.url("/api/page/posts/get_by_user?username=ada"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["posts"][0]["title"], "Notes on the Analytical Engine");
    Ok(())
}

#[tokio::test]
async fn insert_with_empty_title_never_touches_the_store() -> Result<()> {
    let app = spawn_app().await?;
    let before = app.store.calls().await;

    let res = app
        .client
        .post(app.url("/api/page/posts/insert"))
        .header("Authorization", bearer(ADA_TOKEN))
        .json(&json!({"title": ""}))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await?;
    assert_eq!(body, json!({"status": "error", "msg": "Post title is required."}));
    assert_eq!(app.store.calls().await, before);
    Ok(())
}

#[tokio::test]
async fn delete_with_malformed_id_is_a_500_envelope() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/page/posts/delete"))
        .header("Authorization", bearer(ADA_TOKEN))
        .json(&json!({"id": "not-a-uuid"}))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await?;
    assert_eq!(body["msg"], "Invalid post ID format.");
    Ok(())
}

#[tokio::test]
async fn post_lifecycle_through_the_page_routes() -> Result<()> {
    let app = spawn_app().await?;
    let auth = bearer(ADA_TOKEN);

    let created: Value = app
        .client
        .post(app.url("/api/page/posts/insert"))
        .header("Authorization", &auth)
        .json(&json!({"title": "Sketch of the engine", "content": "by L. F. Menabrea"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(created["status"], "created");
    let id = created["id"].as_str().unwrap_or_default().to_string();

    let res = app
        .client
        .put(app.url("/api/page/posts/edit"))
        .header("Authorization", &auth)
        .json(&json!({"id": id, "title": "Sketch, with notes", "starred": true}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .client
        .delete(app.url("/api/page/posts/delete"))
        .header("Authorization", &auth)
        .json(&json!({"id": id}))
        .send()
        .await?;
    assert_eq!(res.json::<Value>().await?, json!({"status": "deleted"}));

    let body: Value = app
        .client
        .get(app.url("/api/page/posts/get_by_user?username=ada"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["posts"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn authenticated_components_reject_anonymous_and_bad_tokens() -> Result<()> {
    let app = spawn_app().await?;

    for authorization in [None, Some("Bearer forged"), Some("")] {
        let mut req = app
            .client
            .post(app.url("/api/page/profile/update_profile"))
            .json(&json!({"username": "ada", "fullname": "Ada"}));
        if let Some(value) = authorization {
            req = req.header("Authorization", value);
        }
        let res = req.send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.json::<Value>().await?,
            json!({"status": "Unauthorized", "msg": "Unauthorized"})
        );
    }
    Ok(())
}

#[tokio::test]
async fn unknown_pages_and_routes_are_404_envelopes() -> Result<()> {
    let app = spawn_app().await?;

    let res = app.client.get(app.url("/api/page/generic/nope")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "Not Found");
    assert_eq!(body["msg"], "Resource not found: generic/nope");

    let res = app.client.get(app.url("/no/such/route")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.json::<Value>().await?["msg"], "Resource not found: /no/such/route");
    Ok(())
}

#[tokio::test]
async fn malformed_json_bodies_become_empty_payloads() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/page/posts/insert"))
        .header("Authorization", bearer(ADA_TOKEN))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.json::<Value>().await?["msg"], "Post title is required.");
    Ok(())
}

#[tokio::test]
async fn store_outage_is_reported_as_503() -> Result<()> {
    let app = spawn_app().await?;
    app.store.set_unavailable(true).await;

    let res = app.client.get(app.url("/api/page/generic/get_projects")).send().await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.json::<Value>().await?["status"], "error");
    Ok(())
}
