use crate::{
    config::Config,
    error::{Error, ErrorKind, QueryError},
    schema::{CartLine, Id, MembershipKind, RecipeSummary},
    shopping_list::ShoppingList,
};

use sqlx::{Pool, Postgres};

use super::get_recipe;

const RECIPE_NOT_FOUND: &str = "Recipe not found.";

// A recipe deleted after the existence check surfaces as a foreign key violation.
fn insert_failure(error: QueryError) -> Error {
    if error.is_foreign_key_violation() {
        return ErrorKind::NotFound.new(RECIPE_NOT_FOUND);
    }
    error.into()
}

/// Puts a recipe into one of the user's lists. Adding twice is a conflict.
pub async fn add_membership(
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<RecipeSummary, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new(RECIPE_NOT_FOUND))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| insert_failure(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new(kind.already_member()));
    }

    Ok(RecipeSummary::from_recipe(&recipe, config))
}

pub async fn remove_membership(
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(ErrorKind::NotFound.new(RECIPE_NOT_FOUND));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new(kind.not_member()));
    }

    Ok(())
}

pub async fn is_member(
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

/// The user's cart merged into one line per (ingredient name, unit).
pub async fn fetch_shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<ShoppingList, Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_cart WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    if count.0 == 0 {
        return ShoppingList::aggregate(0, Vec::new());
    }

    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_cart c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    ShoppingList::aggregate(count.0, lines)
}
