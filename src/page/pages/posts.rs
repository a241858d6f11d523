// Member posts: public listing plus author-only create, edit and delete

use serde_json::json;
use uuid::Uuid;

use crate::database::PostDraft;
use crate::error::ApiError;
use crate::page::payload::{flag, optional_uuid, text, text_or_default};
use crate::page::{
    Access, Component, HandlerFuture, HandlerOutput, PageCall, PageModule, Payload,
};

pub const PAGE: PageModule = PageModule {
    name: "posts",
    components: &[
        Component {
            name: "get_by_user",
            access: Access::Public,
            handler: get_by_user,
        },
        Component {
            name: "insert",
            access: Access::Authenticated,
            handler: insert,
        },
        Component {
            name: "edit",
            access: Access::Authenticated,
            handler: edit,
        },
        Component {
            name: "delete",
            access: Access::Authenticated,
            handler: delete,
        },
    ],
};

fn post_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation("Invalid post ID format."))
}

fn post_draft(payload: &Payload, title: &str) -> Result<PostDraft, ApiError> {
    Ok(PostDraft {
        title: title.to_string(),
        content: text_or_default(payload, "content"),
        starred: flag(payload, "starred"),
        file_id: optional_uuid(payload, "file_id")
            .map_err(|_| ApiError::validation("Invalid file ID format."))?,
    })
}

fn get_by_user(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let username = text(call.payload, "username")
            .ok_or_else(|| ApiError::validation("Username is required."))?;

        match call.store.member_posts(username).await? {
            Some(posts) => Ok(HandlerOutput::ok(json!({ "posts": posts }))),
            None => Err(ApiError::not_found(format!("member {}", username))),
        }
    })
}

fn insert(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let email = call.caller_email()?;
        let title = text(call.payload, "title")
            .ok_or_else(|| ApiError::validation("Post title is required."))?;
        let draft = post_draft(call.payload, title)?;

        let id = call.store.insert_post(email, &draft).await?;
        tracing::debug!("Post {} created by {}", id, email);
        Ok(HandlerOutput::ok(json!({"status": "created", "id": id})))
    })
}

/// Only the author's own posts can be edited; any other id reads as not found
fn edit(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let email = call.caller_email()?;
        let (Some(raw_id), Some(title)) =
            (text(call.payload, "id"), text(call.payload, "title"))
        else {
            return Err(ApiError::validation("Post ID and title are required."));
        };
        let id = post_id(raw_id)?;
        let draft = post_draft(call.payload, title)?;

        if call.store.update_post(email, id, &draft).await? {
            Ok(HandlerOutput::ok(json!({"status": "updated", "id": id})))
        } else {
            Err(ApiError::not_found(format!("post {}", id)))
        }
    })
}

/// Deleting a missing or foreign post still answers `deleted`
fn delete(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let email = call.caller_email()?;
        let raw_id =
            text(call.payload, "id").ok_or_else(|| ApiError::validation("Post ID is required."))?;
        let id = post_id(raw_id)?;

        if !call.store.delete_post(email, id).await? {
            tracing::debug!("Delete of post {} by {} matched nothing", id, email);
        }
        Ok(HandlerOutput::ok(json!({"status": "deleted"})))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{as_member, call};
    use crate::auth::AuthContext;
    use crate::testing::seeded_store;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn empty_title_is_rejected_before_the_store() {
        let store = seeded_store().await;
        let before = store.calls().await;

        let triple = call(
            &store,
            "posts",
            "insert",
            json!({"title": ""}),
            &as_member("ada@example.com"),
        )
        .await;
        assert_eq!(triple.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            triple.json_body(),
            json!({"status": "error", "msg": "Post title is required."})
        );
        assert_eq!(store.calls().await, before);
    }

    #[tokio::test]
    async fn insert_then_list_by_user() {
        let store = seeded_store().await;
        let grace = as_member("grace@example.com");

        let triple = call(
            &store,
            "posts",
            "insert",
            json!({"title": "Bugs", "content": "A moth in relay 70", "starred": true}),
            &grace,
        )
        .await;
        assert_eq!(triple.status, StatusCode::OK);
        let body = triple.json_body();
        assert_eq!(body["status"], "created");
        let id = body["id"].as_str().unwrap().to_string();

        let triple = call(
            &store,
            "posts",
            "get_by_user",
            json!({"username": "grace"}),
            &AuthContext::anonymous(),
        )
        .await;
        let posts = triple.json_body()["posts"].clone();
        assert_eq!(posts.as_array().unwrap().len(), 1);
        assert_eq!(posts[0]["id"], id.as_str());
        assert_eq!(posts[0]["starred"], true);
    }

    #[tokio::test]
    async fn edit_validates_and_scopes_to_author() {
        let store = seeded_store().await;
        let ada = as_member("ada@example.com");
        let grace = as_member("grace@example.com");

        let triple = call(&store, "posts", "edit", json!({"id": "x"}), &ada).await;
        assert_eq!(triple.json_body()["msg"], "Post ID and title are required.");

        let triple = call(&store, "posts", "edit", json!({"id": "x", "title": "t"}), &ada).await;
        assert_eq!(triple.json_body()["msg"], "Invalid post ID format.");

        let listing = call(&store, "posts", "get_by_user", json!({"username": "ada"}), &ada).await;
        let id = listing.json_body()["posts"][0]["id"].as_str().unwrap().to_string();

        let triple =
            call(&store, "posts", "edit", json!({"id": id, "title": "Hijacked"}), &grace).await;
        assert_eq!(triple.status, StatusCode::NOT_FOUND);

        let triple =
            call(&store, "posts", "edit", json!({"id": id, "title": "Notes, revised"}), &ada).await;
        assert_eq!(triple.status, StatusCode::OK);
        assert_eq!(triple.json_body()["status"], "updated");

        let listing = call(&store, "posts", "get_by_user", json!({"username": "ada"}), &ada).await;
        assert_eq!(listing.json_body()["posts"][0]["title"], "Notes, revised");
    }

    #[tokio::test]
    async fn delete_requires_a_valid_id() {
        let store = seeded_store().await;
        let ada = as_member("ada@example.com");

        let triple = call(&store, "posts", "delete", json!({}), &ada).await;
        assert_eq!(triple.json_body()["msg"], "Post ID is required.");

        let triple = call(&store, "posts", "delete", json!({"id": "not-a-uuid"}), &ada).await;
        assert_eq!(triple.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            triple.json_body(),
            json!({"status": "error", "msg": "Invalid post ID format."})
        );
    }

    #[tokio::test]
    async fn delete_only_removes_own_posts() {
        let store = seeded_store().await;
        let ada = as_member("ada@example.com");
        let listing = call(&store, "posts", "get_by_user", json!({"username": "ada"}), &ada).await;
        let id = listing.json_body()["posts"][0]["id"].as_str().unwrap().to_string();

        let grace = as_member("grace@example.com");
        let triple = call(&store, "posts", "delete", json!({"id": id}), &grace).await;
        assert_eq!(triple.json_body(), json!({"status": "deleted"}));
        let listing = call(&store, "posts", "get_by_user", json!({"username": "ada"}), &ada).await;
        assert_eq!(listing.json_body()["posts"].as_array().unwrap().len(), 1);

        call(&store, "posts", "delete", json!({"id": id}), &ada).await;
        let listing = call(&store, "posts", "get_by_user", json!({"username": "ada"}), &ada).await;
        assert!(listing.json_body()["posts"].as_array().unwrap().is_empty());
    }
}
