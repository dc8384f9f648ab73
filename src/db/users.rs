//! User records and backend selection.

use super::{Session, Unique};
use crate::error::{Error, Result};
use crate::model::{BackendKind, User, UserId};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    login_name: String,
    scrobbling_backend: Option<String>,
    feedback_backend: Option<String>,
    listenbrainz_token: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: UserId(row.id),
            login_name: row.login_name,
            scrobbling_backend: row.scrobbling_backend.map(|s| s.parse()).transpose()?,
            feedback_backend: row.feedback_backend.map(|s| s.parse()).transpose()?,
            listenbrainz_token: row.listenbrainz_token,
        })
    }
}

const USER_COLUMNS: &str =
    "SELECT id, login_name, scrobbling_backend, feedback_backend, listenbrainz_token FROM users";

impl<M> Session<M> {
    pub async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn find_user_by_login(&mut self, login_name: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE login_name = ?"))
            .bind(login_name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(User::try_from).transpose()
    }

    /// All users, by ID.
    pub async fn users(&mut self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} ORDER BY id"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    /// Users whose feedback goes to `backend`.
    pub async fn users_with_feedback_backend(&mut self, backend: BackendKind) -> Result<Vec<User>> {
        let rows =
            sqlx::query_as::<_, UserRow>(&format!("{USER_COLUMNS} WHERE feedback_backend = ? ORDER BY id"))
                .bind(backend.as_str())
                .fetch_all(&mut *self.tx)
                .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    /// Users whose listens go to `backend`.
    pub async fn users_with_scrobbling_backend(
        &mut self,
        backend: BackendKind,
    ) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_COLUMNS} WHERE scrobbling_backend = ? ORDER BY id"
        ))
        .bind(backend.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }
}

impl Session<Unique> {
    /// Create a user with no backend selected.
    pub async fn create_user(&mut self, login_name: &str) -> Result<User> {
        let id: i64 = sqlx::query_scalar("INSERT INTO users (login_name) VALUES (?) RETURNING id")
            .bind(login_name)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(User {
            id: UserId(id),
            login_name: login_name.to_string(),
            scrobbling_backend: None,
            feedback_backend: None,
            listenbrainz_token: None,
        })
    }

    /// Select the scrobbling backend. Existing listens stay where they are.
    pub async fn set_scrobbling_backend(
        &mut self,
        id: UserId,
        backend: Option<BackendKind>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET scrobbling_backend = ? WHERE id = ?")
            .bind(backend.map(|b| b.as_str()))
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Select the feedback backend. Existing feedback stays where it is.
    pub async fn set_feedback_backend(
        &mut self,
        id: UserId,
        backend: Option<BackendKind>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET feedback_backend = ? WHERE id = ?")
            .bind(backend.map(|b| b.as_str()))
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_listenbrainz_token(&mut self, id: UserId, token: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET listenbrainz_token = ? WHERE id = ?")
            .bind(token)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Remove a user along with its listens and feedback.
    pub async fn remove_user(&mut self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
