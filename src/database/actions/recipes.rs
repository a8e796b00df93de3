use std::collections::{HashMap, HashSet};

use crate::{
    authentication::permissions::{authorize_recipe, Principal, RequestKind},
    config::Config,
    error::{Error, ErrorKind, QueryError},
    form::{IngredientAmount, RecipeDraft, RecipeFilter},
    pagination::{PageContext, Pagination},
    schema::{Id, Recipe, RecipePart, RecipeRead, RecipeRow, Tag, UserRead},
};

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use super::{list_recipe_tags, list_user_rows};

/// `SELECT` of `RecipeRow` with membership flags computed for `principal`.
/// Callers append the `WHERE` conditions.
fn recipe_query<'a>(principal: Option<Id>) -> QueryBuilder<'a, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT r.*, EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
    );
    query_builder
        .push_bind(principal)
        .push(
            ") AS is_favorited, EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ",
        )
        .push_bind(principal)
        .push(") AS is_in_shopping_cart, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    query_builder
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    principal: Option<Id>,
    pagination: &Pagination,
    path: &str,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRead>, Error> {
    let mut query_builder = recipe_query(principal);

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    // Membership filters only narrow results for authenticated principals.
    if let Some(user_id) = principal {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let count = rows.first().map(|row| row.count).unwrap_or(0);
    let recipes = read_recipes(rows, principal, config, pool).await?;

    PageContext::from_rows(recipes, count, pagination, path)
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe for a write by `principal`, enforcing authorship.
pub async fn get_recipe_mut(
    id: Id,
    principal: &Principal,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found."))?;

    authorize_recipe(principal, RequestKind::Write, recipe.author_id)?;

    Ok(recipe)
}

pub async fn get_recipe_read(
    id: Id,
    principal: Option<Id>,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeRead>, Error> {
    let mut query_builder = recipe_query(principal);
    query_builder.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query_builder
        .build_query_as()
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    match row {
        Some(row) => Ok(read_recipes(vec![row], principal, config, pool)
            .await?
            .into_iter()
            .next()),
        None => Ok(None),
    }
}

pub async fn list_recipe_parts(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePart>, Error> {
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let list: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids.to_vec())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

/// Attaches authors, tags and ingredients to listing rows, keeping row order.
pub async fn read_recipes(
    rows: Vec<RecipeRow>,
    principal: Option<Id>,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeRead>, Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let author_ids: Vec<Id> = rows
        .iter()
        .map(|row| row.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    for tag in list_recipe_tags(&ids, pool).await? {
        tags.entry(tag.recipe_id).or_default().push(Tag::from(tag));
    }

    let mut parts: HashMap<Id, Vec<RecipePart>> = HashMap::new();
    for part in list_recipe_parts(&ids, pool).await? {
        parts.entry(part.recipe_id).or_default().push(part);
    }

    let authors: HashMap<Id, UserRead> = list_user_rows(&author_ids, principal, pool)
        .await?
        .into_iter()
        .map(|row| (row.id, UserRead::from_row(row, principal)))
        .collect();

    rows.into_iter()
        .map(|row| {
            let author = authors.get(&row.author_id).cloned().ok_or_else(|| {
                log::error!("> Recipe {} has no author row", row.id);
                ErrorKind::Internal.default()
            })?;
            let recipe_tags = tags.remove(&row.id).unwrap_or_default();
            let recipe_parts = parts.remove(&row.id).unwrap_or_default();

            Ok(RecipeRead::assemble(
                row,
                author,
                recipe_tags,
                recipe_parts,
                principal,
                config,
            ))
        })
        .collect()
}

/// Inserts the recipe with its tags and ingredients atomically.
/// `image` is the stored media path.
pub async fn create_recipe(
    author_id: Id,
    draft: &RecipeDraft,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Id, Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    check_references(draft, &mut tr).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id;
    ",
    )
    .bind(author_id)
    .bind(draft.name.as_deref().unwrap_or_default())
    .bind(draft.text.as_deref().unwrap_or_default())
    .bind(draft.cooking_time.unwrap_or_default())
    .bind(image)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    insert_recipe_tags(id.0, &draft.tags, &mut tr).await?;
    insert_recipe_ingredients(id.0, &draft.ingredients, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("> Created recipe {}", id.0);
    Ok(id.0)
}

/// Applies a validated write to an existing recipe. Absent scalar fields keep
/// their stored value; tags and ingredients are replaced as a whole.
pub async fn update_recipe(
    id: Id,
    draft: &RecipeDraft,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    check_references(draft, &mut tr).await?;

    let result = sqlx::query(
        "
        UPDATE recipes SET
            name = COALESCE($1, name),
            text = COALESCE($2, text),
            cooking_time = COALESCE($3, cooking_time),
            image = COALESCE($4, image)
        WHERE id = $5
    ",
    )
    .bind(draft.name.as_deref())
    .bind(draft.text.as_deref())
    .bind(draft.cooking_time)
    .bind(image)
    .bind(id)
    .execute(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("Recipe not found."));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

    insert_recipe_tags(id, &draft.tags, &mut tr).await?;
    insert_recipe_ingredients(id, &draft.ingredients, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    Ok(())
}

/// Deletes the recipe; tags, ingredients and memberships cascade.
pub async fn delete_recipe(id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("Recipe not found."));
    }

    Ok(())
}

/// Every referenced ingredient and tag must exist.
async fn check_references(
    draft: &RecipeDraft,
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let ingredient_ids: Vec<Id> = draft.ingredients.iter().map(|item| item.id).collect();
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ingredient_ids.clone())
        .fetch_all(&mut **tr)
        .await
        .map_err(QueryError::from)?;
    if let Some(missing) = first_missing(&ingredient_ids, &found) {
        return Err(Error::field(
            "ingredients",
            &format!("Invalid pk \"{missing}\" - object does not exist."),
        ));
    }

    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(draft.tags.clone())
        .fetch_all(&mut **tr)
        .await
        .map_err(QueryError::from)?;
    if let Some(missing) = first_missing(&draft.tags, &found) {
        return Err(Error::field(
            "tags",
            &format!("Invalid pk \"{missing}\" - object does not exist."),
        ));
    }

    Ok(())
}

fn first_missing(wanted: &[Id], found: &[(Id,)]) -> Option<Id> {
    let found: HashSet<Id> = found.iter().map(|row| row.0).collect();
    wanted.iter().copied().find(|id| !found.contains(id))
}

async fn insert_recipe_tags(
    recipe_id: Id,
    tags: &[Id],
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    if tags.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });

    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe_ingredients(
    recipe_id: Id,
    ingredients: &[IngredientAmount],
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    if ingredients.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(ingredients, |mut b, item| {
        b.push_bind(recipe_id)
            .push_bind(item.id)
            .push_bind(item.amount);
    });

    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_first_missing_reference() {
        assert_eq!(first_missing(&[1, 2, 3], &[(1,), (2,), (3,)]), None);
        assert_eq!(first_missing(&[4, 1, 9], &[(1,)]), Some(4));
        assert_eq!(first_missing(&[], &[]), None);
    }
}
