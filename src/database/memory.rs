use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Account, FileAsset, FileView, Item, Member, MemberProfile, MemberSummary, NewAccount, PostDraft,
    PostView, ProfileUpdate, ProjectMemberView, ProjectView, Store, StoreError,
};

#[derive(Debug, Clone)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    title: String,
    content: String,
    starred: bool,
    file_id: Option<Uuid>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: String,
    banner_id: Option<Uuid>,
    logo_id: Option<Uuid>,
    created_at: chrono::DateTime<Utc>,
    members: Vec<(Uuid, String)>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<Member>,
    posts: Vec<PostRow>,
    files: Vec<FileAsset>,
    projects: Vec<ProjectRow>,
    shared_passwords: Vec<String>,
    items: Vec<Item>,
}

impl Tables {
    fn file(&self, id: Option<Uuid>) -> Option<FileView> {
        let id = id?;
        self.files.iter().find(|f| f.id == id).map(FileView::from)
    }

    fn posts_of(&self, author_id: Uuid) -> Vec<PostView> {
        let mut posts: Vec<&PostRow> =
            self.posts.iter().filter(|p| p.author_id == author_id).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
            .into_iter()
            .map(|p| PostView {
                id: p.id,
                title: p.title.clone(),
                content: p.content.clone(),
                starred: p.starred,
                created_at: p.created_at,
                file: self.file(p.file_id),
            })
            .collect()
    }

    fn profile(&self, member: &Member) -> MemberProfile {
        MemberProfile {
            id: member.id,
            username: member.username.clone(),
            fullname: member.fullname.clone(),
            bio: member.bio.clone(),
            qualifications: member.qualifications.clone(),
            avatar: self.file(member.avatar_id),
            banner: self.file(member.banner_id),
            posts: self.posts_of(member.id),
        }
    }

    fn account(&self, member: &Member) -> Account {
        Account {
            profile: self.profile(member),
            email: member.email.clone(),
            created_at: member.created_at,
        }
    }

    fn user_by_email(&self, email: &str) -> Option<&Member> {
        self.users.iter().find(|u| u.email == email)
    }

    fn username_taken_by_other(&self, username: &str, email: &str) -> bool {
        self.users.iter().any(|u| u.username == username && u.email != email)
    }
}

/// In-process Store used in development (no DATABASE_URL) and in tests.
/// Every trait call is recorded so tests can assert a handler never reached
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    calls: RwLock<Vec<&'static str>>,
    unavailable: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the Store operations invoked so far, in order
    pub async fn calls(&self) -> Vec<&'static str> {
        self.calls.read().await.clone()
    }

    /// Make every subsequent operation fail as if the database were down
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn enter(&self, operation: &'static str) -> Result<(), StoreError> {
        self.calls.write().await.push(operation);
        if *self.unavailable.read().await {
            return Err(StoreError::Unavailable(format!("{} refused: store offline", operation)));
        }
        Ok(())
    }

    pub async fn add_shared_password(&self, key: &str) {
        self.tables.write().await.shared_passwords.push(key.to_string());
    }

    pub async fn add_item(&self, name: &str) -> Item {
        let item = Item {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.tables.write().await.items.push(item.clone());
        item
    }

    /// Insert a member directly, bypassing signup validation
    pub async fn add_member(&self, email: &str, username: &str, fullname: &str) -> Member {
        let mut tables = self.tables.write().await;
        // keep created_at strictly increasing so ordering is deterministic
        let created_at = tables
            .users
            .iter()
            .map(|u| u.created_at)
            .max()
            .map_or_else(Utc::now, |latest| latest + Duration::seconds(1));
        let member = Member {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            fullname: fullname.to_string(),
            bio: String::new(),
            qualifications: Vec::new(),
            avatar_id: None,
            banner_id: None,
            created_at,
        };
        tables.users.push(member.clone());
        member
    }

    pub async fn add_project(&self, name: &str, members: &[(Uuid, &str)]) -> Uuid {
        let mut tables = self.tables.write().await;
        let created_at = tables
            .projects
            .iter()
            .map(|p| p.created_at)
            .max()
            .map_or_else(Utc::now, |latest| latest + Duration::seconds(1));
        let id = Uuid::new_v4();
        tables.projects.push(ProjectRow {
            id,
            name: name.to_string(),
            description: String::new(),
            banner_id: None,
            logo_id: None,
            created_at,
            members: members.iter().map(|(user, role)| (*user, role.to_string())).collect(),
        });
        id
    }

    /// Demo content for running the server without a database
    pub async fn seed_demo(&self) {
        let ada = self.add_member("ada@example.com", "ada", "Ada Lovelace").await;
        let grace = self.add_member("grace@example.com", "grace", "Grace Hopper").await;
        self.add_shared_password("community-invite").await;
        self.add_item("compiler").await;
        self.add_item("analytical engine").await;
        self.add_project("Difference Engine", &[(ada.id, "lead"), (grace.id, "reviewer")])
            .await;

        let draft = PostDraft {
            title: "Notes on the Analytical Engine".to_string(),
            content: "The engine weaves algebraic patterns.".to_string(),
            starred: true,
            file_id: None,
        };
        let mut tables = self.tables.write().await;
        tables.posts.push(PostRow {
            id: Uuid::new_v4(),
            author_id: ada.id,
            title: draft.title,
            content: draft.content,
            starred: draft.starred,
            file_id: draft.file_id,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_members(&self) -> Result<Vec<MemberProfile>, StoreError> {
        self.enter("list_members").await?;
        let tables = self.tables.read().await;
        let mut users: Vec<&Member> = tables.users.iter().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users.into_iter().map(|u| tables.profile(u)).collect())
    }

    async fn public_member(&self, username: &str) -> Result<Option<MemberProfile>, StoreError> {
        self.enter("public_member").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| tables.profile(u)))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectView>, StoreError> {
        self.enter("list_projects").await?;
        let tables = self.tables.read().await;
        let mut projects: Vec<&ProjectRow> = tables.projects.iter().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects
            .into_iter()
            .map(|p| ProjectView {
                id: p.id,
                name: p.name.clone(),
                description: p.description.clone(),
                created_at: p.created_at,
                banner: tables.file(p.banner_id),
                logo: tables.file(p.logo_id),
                members: p
                    .members
                    .iter()
                    .filter_map(|(user_id, role)| {
                        let user = tables.users.iter().find(|u| u.id == *user_id)?;
                        Some(ProjectMemberView {
                            role: role.clone(),
                            user: MemberSummary {
                                id: user.id,
                                username: user.username.clone(),
                                fullname: user.fullname.clone(),
                                avatar: tables.file(user.avatar_id),
                            },
                        })
                    })
                    .collect(),
            })
            .collect())
    }

    async fn private_member(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.enter("private_member").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username && u.email == email)
            .map(|u| tables.account(u)))
    }

    async fn account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.enter("account").await?;
        let tables = self.tables.read().await;
        Ok(tables.user_by_email(email).map(|u| tables.account(u)))
    }

    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Uuid>, StoreError> {
        self.enter("update_profile").await?;
        let mut tables = self.tables.write().await;
        if tables.username_taken_by_other(&update.username, email) {
            return Err(StoreError::Conflict(format!("username '{}' is taken", update.username)));
        }
        let Some(user) = tables.users.iter_mut().find(|u| u.email == email) else {
            return Ok(None);
        };
        user.username = update.username.clone();
        user.fullname = update.fullname.clone();
        user.bio = update.bio.clone();
        user.qualifications = update.qualifications.clone();
        if update.avatar_id.is_some() {
            user.avatar_id = update.avatar_id;
        }
        if update.banner_id.is_some() {
            user.banner_id = update.banner_id;
        }
        Ok(Some(user.id))
    }

    async fn member_posts(&self, username: &str) -> Result<Option<Vec<PostView>>, StoreError> {
        self.enter("member_posts").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| tables.posts_of(u.id)))
    }

    async fn insert_post(&self, author_email: &str, draft: &PostDraft) -> Result<Uuid, StoreError> {
        self.enter("insert_post").await?;
        let mut tables = self.tables.write().await;
        let author_id = tables
            .user_by_email(author_email)
            .map(|u| u.id)
            .ok_or_else(|| StoreError::NotFound(format!("member {}", author_email)))?;
        let id = Uuid::new_v4();
        tables.posts.push(PostRow {
            id,
            author_id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            starred: draft.starred,
            file_id: draft.file_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_post(
        &self,
        author_email: &str,
        id: Uuid,
        draft: &PostDraft,
    ) -> Result<bool, StoreError> {
        self.enter("update_post").await?;
        let mut tables = self.tables.write().await;
        let Some(author_id) = tables.user_by_email(author_email).map(|u| u.id) else {
            return Ok(false);
        };
        let Some(post) = tables.posts.iter_mut().find(|p| p.id == id && p.author_id == author_id)
        else {
            return Ok(false);
        };
        post.title = draft.title.clone();
        post.content = draft.content.clone();
        post.starred = draft.starred;
        post.file_id = draft.file_id;
        Ok(true)
    }

    async fn delete_post(&self, author_email: &str, id: Uuid) -> Result<bool, StoreError> {
        self.enter("delete_post").await?;
        let mut tables = self.tables.write().await;
        let Some(author_id) = tables.user_by_email(author_email).map(|u| u.id) else {
            return Ok(false);
        };
        let before = tables.posts.len();
        tables.posts.retain(|p| !(p.id == id && p.author_id == author_id));
        Ok(tables.posts.len() < before)
    }

    async fn count_email(&self, email: &str) -> Result<i64, StoreError> {
        self.enter("count_email").await?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.email == email).count() as i64)
    }

    async fn count_username(&self, username: &str) -> Result<i64, StoreError> {
        self.enter("count_username").await?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.username == username).count() as i64)
    }

    async fn shared_password_exists(&self, key: &str) -> Result<bool, StoreError> {
        self.enter("shared_password_exists").await?;
        let tables = self.tables.read().await;
        Ok(tables.shared_passwords.iter().any(|k| k == key))
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Member, StoreError> {
        self.enter("create_account").await?;
        let mut tables = self.tables.write().await;
        if tables.user_by_email(&account.email).is_some() {
            return Err(StoreError::Conflict(format!(
                "User with email '{}' already exists",
                account.email
            )));
        }
        if tables.users.iter().any(|u| u.username == account.username) {
            return Err(StoreError::Conflict(format!("username '{}' is taken", account.username)));
        }
        let member = Member {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            username: account.username.clone(),
            fullname: account.fullname.clone(),
            bio: account.bio.clone(),
            qualifications: account.qualifications.clone(),
            avatar_id: account.avatar_id,
            banner_id: account.banner_id,
            created_at: Utc::now(),
        };
        tables.users.push(member.clone());
        Ok(member)
    }

    async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        author_email: Option<&str>,
    ) -> Result<FileAsset, StoreError> {
        self.enter("create_file").await?;
        let file = FileAsset {
            id: Uuid::new_v4(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            author_email: author_email.map(str::to_string),
            created_at: Utc::now(),
        };
        self.tables.write().await.files.push(file.clone());
        Ok(file)
    }

    async fn delete_file(&self, id: Uuid) -> Result<bool, StoreError> {
        self.enter("delete_file").await?;
        let mut tables = self.tables.write().await;
        let before = tables.files.len();
        tables.files.retain(|f| f.id != id);
        Ok(tables.files.len() < before)
    }

    async fn files_by_author(&self, email: &str) -> Result<Vec<FileAsset>, StoreError> {
        self.enter("files_by_author").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .iter()
            .filter(|f| f.author_email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn list_items(&self, limit: i64) -> Result<Vec<Item>, StoreError> {
        self.enter("list_items").await?;
        let tables = self.tables.read().await;
        let mut items = tables.items.clone();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter("ping").await
    }
}
