// Public listings shown on the members and projects pages

use crate::error::ApiError;
use crate::page::payload::text;
use crate::page::{Access, Component, HandlerFuture, HandlerOutput, PageCall, PageModule};

pub const PAGE: PageModule = PageModule {
    name: "generic",
    components: &[
        Component {
            name: "get_members",
            access: Access::Public,
            handler: get_members,
        },
        Component {
            name: "get_public_member",
            access: Access::Public,
            handler: get_public_member,
        },
        Component {
            name: "get_projects",
            access: Access::Public,
            handler: get_projects,
        },
    ],
};

/// Every member's public profile, oldest member first
fn get_members(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let members = call.store.list_members().await?;
        HandlerOutput::json(&members)
    })
}

fn get_public_member(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let username = text(call.payload, "username")
            .ok_or_else(|| ApiError::validation("Username is required."))?;

        match call.store.public_member(username).await? {
            Some(member) => HandlerOutput::json(&member),
            None => Err(ApiError::not_found(format!("member {}", username))),
        }
    })
}

/// Projects with their members, newest first
fn get_projects(call: PageCall<'_>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let projects = call.store.list_projects().await?;
        HandlerOutput::json(&projects)
    })
}
