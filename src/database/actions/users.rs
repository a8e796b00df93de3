use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    config::Config,
    error::{Error, ErrorKind, QueryError},
    form::NewUser,
    pagination::{PageContext, Pagination},
    schema::{Id, User, UserRead, UserRow},
};

use std::collections::BTreeMap;

use sqlx::{Pool, Postgres};

const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

// Columns of `UserRow`; `$1` is the principal the subscription flag is computed for.
const USER_ROW_COLUMNS: &str = "
    u.id, u.email, u.username, u.first_name, u.last_name,
    EXISTS (
        SELECT 1 FROM subscriptions s WHERE s.user_id = $1 AND s.author_id = u.id
    ) AS is_subscribed,
    COUNT(*) OVER() AS count
";

pub async fn get_user(id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Creates an account. Taken emails and usernames are reported per field.
pub async fn register_user(new: NewUser, pool: &Pool<Postgres>) -> Result<User, Error> {
    let taken: Vec<(String, String)> =
        sqlx::query_as("SELECT email, username FROM users WHERE email = $1 OR username = $2")
            .bind(&new.email)
            .bind(&new.username)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let mut fields = BTreeMap::new();
    if taken.iter().any(|(email, _)| *email == new.email) {
        fields.insert(
            String::from("email"),
            vec![String::from("A user with that email already exists.")],
        );
    }
    if taken.iter().any(|(_, username)| *username == new.username) {
        fields.insert(
            String::from("username"),
            vec![String::from("A user with that username already exists.")],
        );
    }
    if !fields.is_empty() {
        return Err(Error::fields(fields));
    }

    let password = hash_blocking(new.password).await?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *;
    ",
    )
    .bind(&new.email)
    .bind(&new.username)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    log::info!("> Registered user {}", user.id);
    Ok(user)
}

/// Exchanges credentials for a signed session token.
pub async fn login_user(
    email: &str,
    password: &str,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = get_user_by_email(email, pool)
        .await?
        .ok_or_else(|| Error::field("non_field_errors", INVALID_CREDENTIALS))?;

    if !check_password(password, &user.password)? {
        return Err(Error::field("non_field_errors", INVALID_CREDENTIALS));
    }

    generate_jwt_session(&user, &config.secret_key, config.token_lifetime_hours)
}

pub async fn set_password(
    user_id: Id,
    new_password: String,
    current_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user(user_id, pool)
        .await?
        .ok_or_else(|| ErrorKind::Unauthorized.new("User not found."))?;

    if !check_password(current_password, &user.password)? {
        return Err(Error::field("current_password", "Wrong password."));
    }

    let password = hash_blocking(new_password).await?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

pub async fn fetch_users(
    principal: Option<Id>,
    pagination: &Pagination,
    path: &str,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserRead>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_ROW_COLUMNS} FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(principal)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let count = rows.first().map(|row| row.count).unwrap_or(0);

    Ok(PageContext::from_rows(rows, count, pagination, path)?
        .map(|row| UserRead::from_row(row, principal)))
}

pub async fn get_user_read(
    id: Id,
    principal: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserRead>, Error> {
    let rows = list_user_rows(&[id], principal, pool).await?;

    Ok(rows
        .into_iter()
        .next()
        .map(|row| UserRead::from_row(row, principal)))
}

pub async fn list_user_rows(
    ids: &[Id],
    principal: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_ROW_COLUMNS} FROM users u WHERE u.id = ANY($2)"
    ))
    .bind(principal)
    .bind(ids.to_vec())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

fn check_password(password: &str, hash: &str) -> Result<bool, Error> {
    verify_password(password, hash).map_err(|e| {
        log::error!("> Stored password hash is unreadable: {e}");
        ErrorKind::Internal.default()
    })
}

async fn hash_blocking(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            log::error!("> Hashing task failed: {e}");
            ErrorKind::Internal.default()
        })?
        .map_err(|e| {
            log::error!("> Failed to hash password: {e}");
            ErrorKind::Internal.default()
        })
}
