// The signed-in member's own profile

use serde_json::json;

use crate::database::ProfileUpdate;
use crate::error::ApiError;
use crate::page::payload::{optional_uuid, string_list, text, text_or_default};
use crate::page::{Access, Component, HandlerFuture, HandlerOutput, PageCall, PageModule};

pub const PAGE: PageModule = PageModule {
    name: "profile",
    components: &[
        Component {
            name: "update_profile",
            access: Access::Authenticated,
            handler: update_profile,
        },
        Component {
            name: "get_profile",
            access: Access::Authenticated,
            handler: get_profile,
        },
    ],
};

/// Replaces username, full name, bio and qualifications. Avatar and banner are
/// only changed when an id is given.
fn update_profile(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let email = call.caller_email()?;

        let (Some(username), Some(fullname)) =
            (text(call.payload, "username"), text(call.payload, "fullname"))
        else {
            return Err(ApiError::validation("Username and full name are required."));
        };

        let update = ProfileUpdate {
            username: username.to_string(),
            fullname: fullname.to_string(),
            bio: text_or_default(call.payload, "bio"),
            qualifications: string_list(call.payload, "qualifications"),
            avatar_id: optional_uuid(call.payload, "avatar_id")
                .map_err(|_| ApiError::validation("Invalid avatar ID format."))?,
            banner_id: optional_uuid(call.payload, "banner_id")
                .map_err(|_| ApiError::validation("Invalid banner ID format."))?,
        };

        match call.store.update_profile(email, &update).await? {
            Some(id) => Ok(HandlerOutput::ok(json!({"id": id}))),
            None => Err(ApiError::not_found(format!("member {}", email))),
        }
    })
}

/// Full account of the caller. With a `username` the record must match both
/// the username and the caller's email.
fn get_profile(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let email = call.caller_email()?;

        let account = match text(call.payload, "username") {
            Some(username) => call.store.private_member(username, email).await?,
            None => call.store.account(email).await?,
        };

        match account {
            Some(account) => HandlerOutput::json(&account),
            None => Err(ApiError::not_found(format!("member {}", email))),
        }
    })
}
