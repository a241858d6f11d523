use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{
    Account, FileAsset, Item, Member, MemberProfile, NewAccount, PostDraft, PostView,
    ProfileUpdate, ProjectView, Store, StoreError,
};
use crate::config::DatabaseConfig;

// Views are assembled in SQL with json_build_object and decoded through serde,
// so the Rust side never stitches rows together.

// Embedded files leave out author_email, which would leak the uploader.
const FILE_JSON: &str = "(SELECT json_build_object(\
    'id', f.id, 'name', f.name, 'mime_type', f.mime_type, 'created_at', f.created_at\
) FROM files f WHERE f.id = {col})";

fn file_json(column: &str) -> String {
    FILE_JSON.replace("{col}", column)
}

fn posts_json(author_column: &str) -> String {
    format!(
        "COALESCE((SELECT json_agg(json_build_object(
            'id', p.id, 'title', p.title, 'content', p.content, 'starred', p.starred,
            'created_at', p.created_at, 'file', {file}
        ) ORDER BY p.created_at DESC) FROM posts p WHERE p.author_id = {author}), '[]'::json)",
        file = file_json("p.file_id"),
        author = author_column,
    )
}

fn profile_json() -> String {
    format!(
        "json_build_object(
            'id', u.id, 'username', u.username, 'fullname', u.fullname, 'bio', u.bio,
            'qualifications', u.qualifications,
            'avatar', {avatar}, 'banner', {banner}, 'posts', {posts}
        )",
        avatar = file_json("u.avatar_id"),
        banner = file_json("u.banner_id"),
        posts = posts_json("u.id"),
    )
}

fn account_json() -> String {
    format!(
        "(({profile})::jsonb || jsonb_build_object('email', u.email, 'created_at', u.created_at))",
        profile = profile_json(),
    )
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        sqlx::Error::PoolTimedOut => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Sqlx(err),
    }
}

/// PostgreSQL-backed Store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Created database pool (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_members(&self) -> Result<Vec<MemberProfile>, StoreError> {
        let sql = format!("SELECT {} FROM users u ORDER BY u.created_at ASC", profile_json());
        let rows: Vec<Json<MemberProfile>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(m)| m).collect())
    }

    async fn public_member(&self, username: &str) -> Result<Option<MemberProfile>, StoreError> {
        let sql = format!("SELECT {} FROM users u WHERE u.username = $1", profile_json());
        let row: Option<Json<MemberProfile>> = sqlx::query_scalar(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(m)| m))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectView>, StoreError> {
        let sql = format!(
            "SELECT json_build_object(
                'id', pr.id, 'name', pr.name, 'description', pr.description,
                'created_at', pr.created_at,
                'banner', {banner}, 'logo', {logo},
                'members', COALESCE((SELECT json_agg(json_build_object(
                    'role', pm.role,
                    'user', json_build_object('id', u.id, 'username', u.username,
                                              'fullname', u.fullname, 'avatar', {avatar})
                )) FROM project_members pm JOIN users u ON u.id = pm.user_id
                   WHERE pm.project_id = pr.id), '[]'::json)
            ) FROM projects pr ORDER BY pr.created_at DESC",
            banner = file_json("pr.banner_id"),
            logo = file_json("pr.logo_id"),
            avatar = file_json("u.avatar_id"),
        );
        let rows: Vec<Json<ProjectView>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    async fn private_member(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users u WHERE u.username = $1 AND u.email = $2",
            account_json()
        );
        let row: Option<Json<Account>> = sqlx::query_scalar(&sql)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(a)| a))
    }

    async fn account(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM users u WHERE u.email = $1 LIMIT 1", account_json());
        let row: Option<Json<Account>> = sqlx::query_scalar(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(a)| a))
    }

    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<Uuid>, StoreError> {
        sqlx::query_scalar(
            "UPDATE users SET
                username = $2, fullname = $3, bio = $4, qualifications = $5,
                avatar_id = COALESCE($6, avatar_id), banner_id = COALESCE($7, banner_id)
             WHERE email = $1
             RETURNING id",
        )
        .bind(email)
        .bind(&update.username)
        .bind(&update.fullname)
        .bind(&update.bio)
        .bind(&update.qualifications)
        .bind(update.avatar_id)
        .bind(update.banner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "username"))
    }

    async fn member_posts(&self, username: &str) -> Result<Option<Vec<PostView>>, StoreError> {
        let sql = format!("SELECT {} FROM users u WHERE u.username = $1", posts_json("u.id"));
        let row: Option<Json<Vec<PostView>>> = sqlx::query_scalar(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(posts)| posts))
    }

    async fn insert_post(&self, author_email: &str, draft: &PostDraft) -> Result<Uuid, StoreError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO posts (id, title, content, starred, file_id, author_id, created_at)
             SELECT $1, $2, $3, $4, $5, u.id, now() FROM users u WHERE u.email = $6
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.starred)
        .bind(draft.file_id)
        .bind(author_email)
        .fetch_optional(&self.pool)
        .await?;

        id.ok_or_else(|| StoreError::NotFound(format!("member {}", author_email)))
    }

    async fn update_post(
        &self,
        author_email: &str,
        id: Uuid,
        draft: &PostDraft,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE posts p SET title = $3, content = $4, starred = $5, file_id = $6
             FROM users u
             WHERE p.id = $1 AND p.author_id = u.id AND u.email = $2",
        )
        .bind(id)
        .bind(author_email)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.starred)
        .bind(draft.file_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, author_email: &str, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM posts p USING users u
             WHERE p.id = $1 AND p.author_id = u.id AND u.email = $2",
        )
        .bind(id)
        .bind(author_email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_email(&self, email: &str) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT count(*) FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_username(&self, username: &str) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT count(*) FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn shared_password_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shared_passwords WHERE key = $1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Member, StoreError> {
        sqlx::query_as::<_, Member>(
            "INSERT INTO users
                (id, email, username, fullname, bio, qualifications,
                 avatar_id, banner_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
             RETURNING id, email, username, fullname, bio, qualifications,
                       avatar_id, banner_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.fullname)
        .bind(&account.bio)
        .bind(&account.qualifications)
        .bind(account.avatar_id)
        .bind(account.banner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &format!("User with email '{}'", account.email)))
    }

    async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        author_email: Option<&str>,
    ) -> Result<FileAsset, StoreError> {
        Ok(sqlx::query_as::<_, FileAsset>(
            "INSERT INTO files (id, name, mime_type, author_email, created_at)
             VALUES ($1, $2, $3, $4, now())
             RETURNING id, name, mime_type, author_email, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(mime_type)
        .bind(author_email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_file(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn files_by_author(&self, email: &str) -> Result<Vec<FileAsset>, StoreError> {
        Ok(sqlx::query_as::<_, FileAsset>(
            "SELECT id, name, mime_type, author_email, created_at FROM files
             WHERE author_email = $1 ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_items(&self, limit: i64) -> Result<Vec<Item>, StoreError> {
        Ok(sqlx::query_as::<_, Item>("SELECT id, name FROM items ORDER BY name LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
