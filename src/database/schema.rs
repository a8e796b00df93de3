use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub type Id = i32;

/// Which of the two per-user recipe lists a membership row belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Favorite,
    ShoppingCart,
}

impl MembershipKind {
    pub fn table(&self) -> &'static str {
        match self {
            MembershipKind::Favorite => "favorites",
            MembershipKind::ShoppingCart => "shopping_cart",
        }
    }

    pub fn already_member(&self) -> &'static str {
        match self {
            MembershipKind::Favorite => "Recipe is already in favorites.",
            MembershipKind::ShoppingCart => "Recipe is already in the shopping cart.",
        }
    }

    pub fn not_member(&self) -> &'static str {
        match self {
            MembershipKind::Favorite => "Recipe is not in favorites.",
            MembershipKind::ShoppingCart => "Recipe is not in the shopping cart.",
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub date_joined: DateTime<Utc>,
}

/// User row annotated with the requesting principal's subscription flag.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserRow {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Recipe {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub pub_date: DateTime<Utc>,
}

/// Recipe row as returned by listings, with window count and membership flags.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeRow {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub pub_date: DateTime<Utc>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipePart {
    pub recipe_id: Id,
    pub ingredient_id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeTag {
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<LinkedRecipeTag> for Tag {
    fn from(value: LinkedRecipeTag) -> Self {
        Tag {
            id: value.id,
            name: value.name,
            color: value.color,
            slug: value.slug,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

// Wire representations

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserRead {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserRead {
    pub fn from_row(row: UserRow, principal: Option<Id>) -> Self {
        Self {
            email: row.email,
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: principal.is_some() && row.is_subscribed,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserCreated {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserCreated {
    fn from(value: User) -> Self {
        Self {
            email: value.email,
            id: value.id,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserWithRecipes {
    #[serde(flatten)]
    pub user: UserRead,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeSummary {
    pub id: Id,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl RecipeSummary {
    pub fn from_recipe(recipe: &Recipe, config: &Config) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.to_owned(),
            image: config.media_link(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeIngredientRead {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for RecipeIngredientRead {
    fn from(value: RecipePart) -> Self {
        Self {
            id: value.ingredient_id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeRead {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserRead,
    pub ingredients: Vec<RecipeIngredientRead>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeRead {
    /// Assembles the read shape; flags are dropped for anonymous principals.
    pub fn assemble(
        row: RecipeRow,
        author: UserRead,
        tags: Vec<Tag>,
        parts: Vec<RecipePart>,
        principal: Option<Id>,
        config: &Config,
    ) -> Self {
        let authenticated = principal.is_some();

        Self {
            id: row.id,
            tags,
            author,
            ingredients: parts.into_iter().map(RecipeIngredientRead::from).collect(),
            is_favorited: authenticated && row.is_favorited,
            is_in_shopping_cart: authenticated && row.is_in_shopping_cart,
            image: config.media_link(&row.image),
            name: row.name,
            text: row.text,
            cooking_time: row.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub auth_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some(String::from("postgres://localhost/foodgram")),
            "FOODGRAM_SECRET_KEY" => Some(String::from("secret")),
            _ => None,
        })
        .unwrap()
    }

    fn row(favorited: bool, in_cart: bool) -> RecipeRow {
        RecipeRow {
            id: 7,
            author_id: 1,
            name: String::from("Pancakes"),
            text: String::from("Mix and fry."),
            cooking_time: 20,
            image: String::from("recipes/images/p.png"),
            pub_date: Utc::now(),
            is_favorited: favorited,
            is_in_shopping_cart: in_cart,
            count: 1,
        }
    }

    fn author(subscribed: bool) -> UserRow {
        UserRow {
            id: 1,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ann"),
            last_name: String::from("Cook"),
            is_subscribed: subscribed,
            count: 1,
        }
    }

    #[test]
    fn anonymous_reads_never_see_flags() {
        let config = config();
        let recipe = RecipeRead::assemble(
            row(true, true),
            UserRead::from_row(author(true), None),
            vec![],
            vec![],
            None,
            &config,
        );

        assert!(!recipe.is_favorited);
        assert!(!recipe.is_in_shopping_cart);
        assert!(!recipe.author.is_subscribed);
    }

    #[test]
    fn authenticated_reads_reflect_rows() {
        let config = config();
        let recipe = RecipeRead::assemble(
            row(true, false),
            UserRead::from_row(author(true), Some(2)),
            vec![],
            vec![RecipePart {
                recipe_id: 7,
                ingredient_id: 3,
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                amount: 100,
            }],
            Some(2),
            &config,
        );

        assert!(recipe.is_favorited);
        assert!(!recipe.is_in_shopping_cart);
        assert!(recipe.author.is_subscribed);
        assert_eq!(recipe.ingredients[0].id, 3);
        assert_eq!(recipe.image.as_deref(), Some("/media/recipes/images/p.png"));
    }

    #[test]
    fn summary_without_image_is_null() {
        let config = config();
        let recipe = Recipe {
            id: 1,
            author_id: 1,
            name: String::from("Toast"),
            text: String::new(),
            cooking_time: 2,
            image: String::new(),
            pub_date: Utc::now(),
        };

        let summary = serde_json::to_value(RecipeSummary::from_recipe(&recipe, &config)).unwrap();
        assert_eq!(
            summary,
            serde_json::json!({"id": 1, "name": "Toast", "image": null, "cooking_time": 2})
        );
    }

    #[test]
    fn membership_kinds_use_their_own_tables() {
        assert_eq!(MembershipKind::Favorite.table(), "favorites");
        assert_eq!(MembershipKind::ShoppingCart.table(), "shopping_cart");
        assert_ne!(
            MembershipKind::Favorite.already_member(),
            MembershipKind::ShoppingCart.already_member()
        );
    }
}
