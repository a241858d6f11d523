mod common;

use std::sync::atomic::Ordering;

use anyhow::Result;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

use common::{
    bearer, spawn_app, spawn_app_with_provider, test_config, FakeProvider, ADA_TOKEN,
    ALLOWED_REDIRECT,
};

fn set_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[tokio::test]
async fn verify_returns_the_callers_account() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .get(app.url("/api/auth/verify"))
        .header("Authorization", bearer(ADA_TOKEN))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["username"], "ada");

    let res = app.client.get(app.url("/api/auth/verify")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.json::<Value>().await?["msg"],
        "Incorrect Authorization (username or token)"
    );
    Ok(())
}

#[tokio::test]
async fn availability_counts_are_normalized() -> Result<()> {
    let app = spawn_app().await?;

    let body: Value = app
        .client
        .get(app.url("/api/auth/email/validate/%20ADA@Example.com"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body, json!({"data": {"count": 1}}));

    let body: Value = app
        .client
        .get(app.url("/api/auth/username/validate/A!d@a"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["count"], 1);

    let body: Value = app
        .client
        .get(app.url("/api/auth/username/validate/charles"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["count"], 0);
    Ok(())
}

#[tokio::test]
async fn signup_checks_fields_then_duplicates_then_invite() -> Result<()> {
    let app = spawn_app().await?;
    let signup = |body: Value| app.client.post(app.url("/api/auth/signup")).json(&body).send();

    let res = signup(json!({"email": "nobody", "username": "x", "fullname": "X"})).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>().await?["msg"],
        "Invalid Request: Invalid email address 'nobody'"
    );

    let res = signup(json!({
        "email": "ADA@example.com",
        "username": "ada",
        "fullname": "Ada",
        "invite_key": "community-invite"
    }))
    .await?;
    assert_eq!(
        res.json::<Value>().await?["msg"],
        "Invalid Request: User with email 'ada@example.com' already exists"
    );

    let res = signup(json!({
        "email": "charles@example.com",
        "username": "charles",
        "fullname": "Charles Babbage",
        "invite_key": "guess"
    }))
    .await?;
    assert_eq!(
        res.json::<Value>().await?["msg"],
        "Invalid Request: Shared password is incorrect"
    );
    Ok(())
}

#[tokio::test]
async fn signup_creates_an_account_visible_to_counts() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/auth/signup"))
        .json(&json!({
            "email": " Charles@Example.com ",
            "username": "Charles!",
            "fullname": "Charles Babbage",
            "description": "Engines",
            "qualifications": ["mathematics", "  "],
            "invite_key": "community-invite"
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["user"]["username"], "charles");
    assert_eq!(body["data"]["user"]["qualifications"], json!(["mathematics"]));

    let body: Value = app
        .client
        .get(app.url("/api/auth/email/validate/charles@example.com"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["count"], 1);
    Ok(())
}

#[tokio::test]
async fn callback_rejects_unlisted_redirects_without_calling_the_provider() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/auth/callback"))
        .json(&json!({
            "code": "c-1",
            "code_verifier": "v-1",
            "redirect_uri": "https://evil.example.net/callback"
        }))
        .send()
        .await?;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["msg"].as_str().unwrap_or_default().contains("invalid redirect"));
    assert_eq!(app.oidc.exchanges.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn callback_sets_the_refresh_cookie_and_refresh_rotates_it() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/auth/callback"))
        .json(&json!({"code": "c-1", "code_verifier": "v-1", "redirect_uri": ALLOWED_REDIRECT}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = set_cookie(&res).unwrap_or_default();
    assert_eq!(
        cookie,
        "refresh_token=refresh-0; HttpOnly; Secure; SameSite=Strict; Path=/api/auth; Domain=example.com; Max-Age=1800"
    );
    let body: Value = res.json().await?;
    assert_eq!(
        body,
        json!({"access_token": "access-0", "expires_in": 300, "token_type": "Bearer"})
    );

    let res = app
        .client
        .post(app.url("/api/auth/refresh"))
        .header(header::COOKIE, "refresh_token=refresh-0")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookie(&res).unwrap_or_default().starts_with("refresh_token=refresh-100;"));
    assert_eq!(res.json::<Value>().await?["access_token"], "access-100");
    Ok(())
}

#[tokio::test]
async fn refresh_tokens_without_a_lifetime_get_a_session_cookie() -> Result<()> {
    for lifetime in [None, Some(0)] {
        let app =
            spawn_app_with_provider(test_config(), FakeProvider::with_refresh_lifetime(lifetime))
                .await?;

        let res = app
            .client
            .post(app.url("/api/auth/callback"))
            .json(&json!({"code": "c-1", "code_verifier": "v-1", "redirect_uri": ALLOWED_REDIRECT}))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = set_cookie(&res).unwrap_or_default();
        assert!(cookie.starts_with("refresh_token=refresh-0;"));
        assert!(!cookie.contains("Max-Age"));
    }
    Ok(())
}

#[tokio::test]
async fn rejected_code_is_unauthorized() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .post(app.url("/api/auth/callback"))
        .json(&json!({"code": "bad-code", "code_verifier": "v", "redirect_uri": ALLOWED_REDIRECT}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&res).is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_without_cookie_is_unauthorized() -> Result<()> {
    let app = spawn_app().await?;

    let res = app.client.post(app.url("/api/auth/refresh")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<Value>().await?["msg"], "Missing refresh token");
    assert_eq!(app.oidc.refreshes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn logout_expires_the_cookie() -> Result<()> {
    let app = spawn_app().await?;

    let res = app.client.post(app.url("/api/auth/logout")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = set_cookie(&res).unwrap_or_default();
    assert!(cookie.starts_with("refresh_token=;"));
    assert!(cookie.ends_with("Max-Age=0"));
    assert_eq!(res.json::<Value>().await?, json!({"status": "OK", "msg": "Logged out"}));
    Ok(())
}

#[tokio::test]
async fn me_echoes_claims_for_verified_callers_only() -> Result<()> {
    let app = spawn_app().await?;

    let res = app
        .client
        .get(app.url("/api/auth/me"))
        .header("Authorization", bearer(ADA_TOKEN))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["sub"], "sub-ada@example.com");

    let res = app.client.get(app.url("/api/auth/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
