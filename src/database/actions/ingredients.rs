use crate::{
    error::{Error, QueryError},
    schema::{Id, Ingredient},
};

use serde::Deserialize;
use sqlx::{Pool, Postgres, QueryBuilder};

// Three binds per row, well below the postgres bind limit.
const LOAD_BATCH_SIZE: usize = 1000;

/// Catalog entry as found in fixture files.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Ingredients whose name starts with `prefix`, case-insensitively.
pub async fn search_ingredients(
    prefix: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));

    let list: Vec<Ingredient> =
        sqlx::query_as("SELECT * FROM ingredients WHERE LOWER(name) LIKE $1 ORDER BY name, id")
            .bind(pattern)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Bulk insert; pairs already in the catalog are skipped. Returns the number
/// of new rows.
pub async fn load_ingredients(
    items: &[NewIngredient],
    pool: &Pool<Postgres>,
) -> Result<u64, Error> {
    let mut inserted = 0;

    for batch in items.chunks(LOAD_BATCH_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(batch, |mut b, item| {
            b.push_bind(item.name.trim().to_owned())
                .push_bind(item.measurement_unit.trim().to_owned());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        let result = query_builder
            .build()
            .execute(pool)
            .await
            .map_err(QueryError::from)?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
