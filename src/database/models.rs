use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub fullname: String,
    pub bio: String,
    pub qualifications: Vec<String>,
    pub avatar_id: Option<Uuid>,
    pub banner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An uploaded file's metadata; the bytes live in asset storage under `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileAsset {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub author_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A file as embedded in public views; the uploader stays private
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&FileAsset> for FileView {
    fn from(file: &FileAsset) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            created_at: file.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub starred: bool,
    pub created_at: DateTime<Utc>,
    pub file: Option<FileView>,
}

/// What anyone may see about a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub bio: String,
    pub qualifications: Vec<String>,
    pub avatar: Option<FileView>,
    pub banner: Option<FileView>,
    pub posts: Vec<PostView>,
}

/// A member's own view of their account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(flatten)]
    pub profile: MemberProfile,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub avatar: Option<FileView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMemberView {
    pub role: String,
    pub user: MemberSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub banner: Option<FileView>,
    pub logo: Option<FileView>,
    pub members: Vec<ProjectMemberView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
}

/// Fields written by the post insert and edit handlers
#[derive(Debug, Clone, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub starred: bool,
    pub file_id: Option<Uuid>,
}

/// Fields written by the profile update handler. Image ids left as `None` keep
/// their current value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub username: String,
    pub fullname: String,
    pub bio: String,
    pub qualifications: Vec<String>,
    pub avatar_id: Option<Uuid>,
    pub banner_id: Option<Uuid>,
}

/// A validated signup
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub fullname: String,
    pub bio: String,
    pub qualifications: Vec<String>,
    pub avatar_id: Option<Uuid>,
    pub banner_id: Option<Uuid>,
}
