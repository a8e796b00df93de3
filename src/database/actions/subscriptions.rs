use std::collections::HashMap;

use crate::{
    config::Config,
    error::{Error, ErrorKind, QueryError},
    pagination::{PageContext, Pagination},
    schema::{Id, Recipe, RecipeSummary, UserRead, UserRow, UserWithRecipes},
};

use sqlx::{Pool, Postgres};

use super::{get_user, list_user_rows};

pub async fn subscribe(
    user_id: Id,
    author_id: Id,
    recipes_limit: Option<i64>,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<UserWithRecipes, Error> {
    if get_user(author_id, pool).await?.is_none() {
        return Err(ErrorKind::NotFound.new("User not found."));
    }
    if user_id == author_id {
        return Err(ErrorKind::Validation.new("You cannot subscribe to yourself."));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new("You are already subscribed to this user."));
    }

    let rows = list_user_rows(&[author_id], Some(user_id), pool).await?;
    let mut authors = with_recipes(rows, Some(user_id), recipes_limit, config, pool).await?;

    authors
        .pop()
        .ok_or_else(|| ErrorKind::NotFound.new("User not found."))
}

pub async fn unsubscribe(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    if get_user(author_id, pool).await?.is_none() {
        return Err(ErrorKind::NotFound.new("User not found."));
    }

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new("You are not subscribed to this user."));
    }

    Ok(())
}

/// Authors `user_id` follows, each with up to `recipes_limit` of their newest recipes.
pub async fn fetch_subscriptions(
    user_id: Id,
    recipes_limit: Option<i64>,
    pagination: &Pagination,
    path: &str,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserWithRecipes>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            TRUE AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let count = rows.first().map(|row| row.count).unwrap_or(0);
    let authors = with_recipes(rows, Some(user_id), recipes_limit, config, pool).await?;

    PageContext::from_rows(authors, count, pagination, path)
}

async fn with_recipes(
    rows: Vec<UserRow>,
    principal: Option<Id>,
    recipes_limit: Option<i64>,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserWithRecipes>, Error> {
    let author_ids: Vec<Id> = rows.iter().map(|row| row.id).collect();

    let mut recipes: HashMap<Id, Vec<RecipeSummary>> = HashMap::new();
    for recipe in list_author_recipes(&author_ids, recipes_limit, pool).await? {
        recipes
            .entry(recipe.author_id)
            .or_default()
            .push(RecipeSummary::from_recipe(&recipe, config));
    }

    let counts = count_author_recipes(&author_ids, pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.id;
            UserWithRecipes {
                user: UserRead::from_row(row, principal),
                recipes: recipes.remove(&id).unwrap_or_default(),
                recipes_count: counts.get(&id).copied().unwrap_or(0),
            }
        })
        .collect())
}

/// Newest-first recipes per author, at most `limit` each.
async fn list_author_recipes(
    author_ids: &[Id],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, Error> {
    if author_ids.is_empty() {
        return Ok(vec![]);
    }

    let list: Vec<Recipe> = sqlx::query_as(
        "
        SELECT id, author_id, name, text, cooking_time, image, pub_date
        FROM (
            SELECT r.*, ROW_NUMBER() OVER (
                PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC
            ) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(author_ids.to_vec())
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

async fn count_author_recipes(
    author_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, i64>, Error> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Id, i64)> = sqlx::query_as(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(author_ids.to_vec())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().collect())
}
