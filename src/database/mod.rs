pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

/// Errors from a Store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence collaborator. Every write is a single statement or a
/// transaction, so a failure never leaves a partial mutation behind.
#[async_trait]
pub trait Store: Send + Sync {
    /// Public profiles, oldest member first
    async fn list_members(&self) -> Result<Vec<MemberProfile>, StoreError>;

    async fn public_member(&self, username: &str) -> Result<Option<MemberProfile>, StoreError>;

    /// Projects with their members, newest first
    async fn list_projects(&self) -> Result<Vec<ProjectView>, StoreError>;

    /// The account matching both username and email
    async fn private_member(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn account(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Returns the member id, or `None` when no member has this email
    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Uuid>, StoreError>;

    /// `None` when the username is unknown
    async fn member_posts(&self, username: &str) -> Result<Option<Vec<PostView>>, StoreError>;

    async fn insert_post(&self, author_email: &str, draft: &PostDraft) -> Result<Uuid, StoreError>;

    /// Returns false when no post with this id belongs to the author
    async fn update_post(
        &self,
        author_email: &str,
        id: Uuid,
        draft: &PostDraft,
    ) -> Result<bool, StoreError>;

    async fn delete_post(&self, author_email: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn count_email(&self, email: &str) -> Result<i64, StoreError>;

    async fn count_username(&self, username: &str) -> Result<i64, StoreError>;

    async fn shared_password_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Fails with `Conflict` when the email is taken
    async fn create_account(&self, account: &NewAccount) -> Result<Member, StoreError>;

    async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        author_email: Option<&str>,
    ) -> Result<FileAsset, StoreError>;

    /// Returns false when no record has this id
    async fn delete_file(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn files_by_author(&self, email: &str) -> Result<Vec<FileAsset>, StoreError>;

    /// Items ordered by name
    async fn list_items(&self, limit: i64) -> Result<Vec<Item>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
