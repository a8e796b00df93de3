use std::{collections::BTreeMap, collections::HashSet, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{
    error::{Error, TypeError},
    schema::Id,
};
use crate::constants::{
    EMAIL_MAX_LENGTH, MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, NAME_MAX_LENGTH,
    USER_FIELD_MAX_LENGTH,
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// Query-string parameters in arrival order; keys may repeat (`tags=a&tags=b`).
#[derive(Debug, Default, Clone)]
pub struct Form {
    inner: Vec<(String, String)>,
}

impl Form {
    pub fn from_query(raw: &str) -> Result<Self, TypeError> {
        let inner = serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map_err(|_e| TypeError::new("Malformed query string"))?;
        Ok(Self { inner })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Absent or empty keys are `Ok(None)`; present but unparsable ones are errors.
    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) if !value.is_empty() => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new("Invalid type conversion")),
            _ => Ok(None),
        }
    }

    pub fn get_flag(&self, key: &str) -> bool {
        matches!(self.get_str(key), Some("1") | Some("true") | Some("True"))
    }
}

/// Filters accepted by the recipe listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_form(form: &Form) -> Result<Self, Error> {
        let author = form
            .get_number::<Id>("author")
            .map_err(|_| Error::field("author", "Select a valid author."))?;

        Ok(Self {
            tags: form.get_all("tags").into_iter().map(str::to_owned).collect(),
            author,
            is_favorited: form.get_flag("is_favorited"),
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart"),
        })
    }
}

/// `recipes_limit` for nested recipe lists. Unusable values are ignored.
pub fn recipes_limit(form: &Form) -> Option<i64> {
    form.get_number::<i64>("recipes_limit")
        .ok()
        .flatten()
        .filter(|limit| *limit >= 0)
}

/// Accumulates field-level messages before failing a payload as a whole.
#[derive(Debug, Default)]
struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    fn push(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.to_owned());
    }

    fn finish<T>(self, value: T) -> Result<T, Error> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(Error::fields(self.0))
        }
    }

    fn text(
        &mut self,
        field: &str,
        value: Option<String>,
        required: bool,
        max_length: usize,
    ) -> Option<String> {
        match value {
            None => {
                if required {
                    self.push(field, REQUIRED);
                }
                None
            }
            Some(value) => {
                let value = value.trim().to_owned();
                if value.is_empty() {
                    self.push(field, BLANK);
                } else if value.chars().count() > max_length {
                    self.push(
                        field,
                        &format!("Ensure this field has no more than {max_length} characters."),
                    );
                }
                Some(value)
            }
        }
    }
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| {
        log::debug!("> Rejected payload: {e}");
        Error::field("non_field_errors", "Malformed JSON payload.")
    })
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Write representation of a recipe.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RecipeForm {
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientAmount>>,
    #[serde(default)]
    pub tags: Option<Vec<Id>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub cooking_time: Option<i32>,
}

/// A validated recipe write. Scalar fields are `None` only for partial updates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Id>,
}

impl RecipeForm {
    pub fn validate(self, partial: bool) -> Result<RecipeDraft, Error> {
        let mut errors = FieldErrors::default();
        let required = !partial;

        let ingredients = match self.ingredients {
            None => {
                errors.push("ingredients", REQUIRED);
                vec![]
            }
            Some(ingredients) => {
                if ingredients.is_empty() {
                    errors.push("ingredients", "At least one ingredient is required.");
                }
                let mut seen = HashSet::new();
                if !ingredients.iter().all(|item| seen.insert(item.id)) {
                    errors.push("ingredients", "Ingredients must not repeat.");
                }
                if ingredients
                    .iter()
                    .any(|item| item.amount < MIN_INGREDIENT_AMOUNT)
                {
                    errors.push(
                        "ingredients",
                        &format!("Amount must be at least {MIN_INGREDIENT_AMOUNT}."),
                    );
                }
                ingredients
            }
        };

        let tags = match self.tags {
            None => {
                errors.push("tags", REQUIRED);
                vec![]
            }
            Some(tags) => {
                if tags.is_empty() {
                    errors.push("tags", "At least one tag is required.");
                }
                let mut seen = HashSet::new();
                if !tags.iter().all(|id| seen.insert(*id)) {
                    errors.push("tags", "Tags must not repeat.");
                }
                tags
            }
        };

        let name = errors.text("name", self.name, required, NAME_MAX_LENGTH);
        let text = errors.text("text", self.text, required, usize::MAX);

        let cooking_time = match self.cooking_time {
            None if required => {
                errors.push("cooking_time", REQUIRED);
                None
            }
            Some(time) if time < MIN_COOKING_TIME => {
                errors.push(
                    "cooking_time",
                    &format!("Cooking time must be at least {MIN_COOKING_TIME} minute."),
                );
                None
            }
            time => time,
        };

        let image = match self.image {
            None if required => {
                errors.push("image", REQUIRED);
                None
            }
            Some(image) if image.trim().is_empty() => {
                errors.push("image", BLANK);
                None
            }
            image => image,
        };

        errors.finish(RecipeDraft {
            name,
            text,
            cooking_time,
            image,
            ingredients,
            tags,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RegistrationForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegistrationForm {
    pub fn validate(self) -> Result<NewUser, Error> {
        let mut errors = FieldErrors::default();

        let email = errors
            .text("email", self.email, true, EMAIL_MAX_LENGTH)
            .unwrap_or_default();
        if !email.is_empty() && !is_email(&email) {
            errors.push("email", "Enter a valid email address.");
        }

        let username = errors
            .text("username", self.username, true, USER_FIELD_MAX_LENGTH)
            .unwrap_or_default();
        if !username.is_empty() && !is_username(&username) {
            errors.push(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        let first_name = errors
            .text("first_name", self.first_name, true, USER_FIELD_MAX_LENGTH)
            .unwrap_or_default();
        let last_name = errors
            .text("last_name", self.last_name, true, USER_FIELD_MAX_LENGTH)
            .unwrap_or_default();

        let password = match self.password {
            None => {
                errors.push("password", REQUIRED);
                String::new()
            }
            Some(password) => {
                if password.is_empty() {
                    errors.push("password", BLANK);
                }
                password
            }
        };

        errors.finish(NewUser {
            email: email.to_lowercase(),
            username,
            first_name,
            last_name,
            password,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct LoginForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginForm {
    pub fn validate(self) -> Result<(String, String), Error> {
        let mut errors = FieldErrors::default();
        let email = errors.text("email", self.email, true, EMAIL_MAX_LENGTH);
        let password = self.password.filter(|p| !p.is_empty());
        if password.is_none() {
            errors.push("password", REQUIRED);
        }

        errors.finish((
            email.unwrap_or_default().to_lowercase(),
            password.unwrap_or_default(),
        ))
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PasswordForm {
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

impl PasswordForm {
    pub fn validate(self) -> Result<(String, String), Error> {
        let mut errors = FieldErrors::default();
        let new_password = self.new_password.filter(|p| !p.is_empty());
        if new_password.is_none() {
            errors.push("new_password", REQUIRED);
        }
        let current_password = self.current_password.filter(|p| !p.is_empty());
        if current_password.is_none() {
            errors.push("current_password", REQUIRED);
        }

        errors.finish((
            new_password.unwrap_or_default(),
            current_password.unwrap_or_default(),
        ))
    }
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn is_username(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn recipe() -> RecipeForm {
        RecipeForm {
            ingredients: Some(vec![
                IngredientAmount { id: 1, amount: 100 },
                IngredientAmount { id: 2, amount: 2 },
            ]),
            tags: Some(vec![1, 2]),
            image: Some(String::from("data:image/png;base64,iVBORw0KGgo=")),
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Mix and fry.")),
            cooking_time: Some(15),
        }
    }

    fn messages(error: &Error, field: &str) -> Vec<String> {
        error.fields.get(field).cloned().unwrap_or_default()
    }

    #[test]
    fn query_form_reads_repeated_keys() {
        let form = Form::from_query("tags=breakfast&tags=lunch&author=3&is_favorited=1").unwrap();

        assert_eq!(form.get_all("tags"), vec!["breakfast", "lunch"]);
        assert_eq!(form.get_number::<i32>("author").unwrap(), Some(3));
        assert!(form.get_flag("is_favorited"));
        assert!(!form.get_flag("is_in_shopping_cart"));
        assert_eq!(form.get_number::<i64>("limit").unwrap(), None);
    }

    #[test]
    fn query_form_rejects_non_numeric_values() {
        let form = Form::from_query("limit=ten").unwrap();
        assert!(form.get_number::<i64>("limit").is_err());
    }

    #[test]
    fn recipe_filters() {
        let form = Form::from_query("tags=lunch&tags=&author=4&is_in_shopping_cart=1").unwrap();
        let filter = RecipeFilter::from_form(&form).unwrap();
        assert_eq!(
            filter,
            RecipeFilter {
                tags: vec![String::from("lunch")],
                author: Some(4),
                is_favorited: false,
                is_in_shopping_cart: true,
            }
        );

        let form = Form::from_query("author=me").unwrap();
        assert!(RecipeFilter::from_form(&form)
            .unwrap_err()
            .fields
            .contains_key("author"));
    }

    #[test]
    fn recipes_limit_ignores_garbage() {
        assert_eq!(recipes_limit(&Form::from_query("recipes_limit=2").unwrap()), Some(2));
        assert_eq!(recipes_limit(&Form::from_query("recipes_limit=x").unwrap()), None);
        assert_eq!(recipes_limit(&Form::from_query("recipes_limit=-1").unwrap()), None);
        assert_eq!(recipes_limit(&Form::default()), None);
    }

    #[test]
    fn valid_recipe_passes() {
        let draft = recipe().validate(false).unwrap();
        assert_eq!(draft.ingredients.len(), 2);
        assert_eq!(draft.tags, vec![1, 2]);
        assert_eq!(draft.name.as_deref(), Some("Pancakes"));
    }

    #[test]
    fn repeated_ingredient_fails() {
        let mut form = recipe();
        form.ingredients = Some(vec![
            IngredientAmount { id: 1, amount: 100 },
            IngredientAmount { id: 1, amount: 50 },
        ]);

        let error = form.validate(false).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(messages(&error, "ingredients"), vec!["Ingredients must not repeat."]);
    }

    #[test]
    fn empty_or_missing_lists_fail() {
        let mut form = recipe();
        form.ingredients = Some(vec![]);
        form.tags = None;

        let error = form.validate(false).unwrap_err();
        assert_eq!(messages(&error, "ingredients").len(), 1);
        assert_eq!(messages(&error, "tags"), vec![REQUIRED]);

        let mut form = recipe();
        form.tags = Some(vec![]);
        assert!(form.validate(true).is_err());
    }

    #[test]
    fn repeated_tag_fails() {
        let mut form = recipe();
        form.tags = Some(vec![3, 3]);

        let error = form.validate(false).unwrap_err();
        assert_eq!(messages(&error, "tags"), vec!["Tags must not repeat."]);
    }

    #[test]
    fn amounts_and_cooking_time_must_be_positive() {
        let mut form = recipe();
        form.ingredients = Some(vec![IngredientAmount { id: 1, amount: 0 }]);
        form.cooking_time = Some(0);

        let error = form.validate(false).unwrap_err();
        assert!(error.fields.contains_key("ingredients"));
        assert!(error.fields.contains_key("cooking_time"));
    }

    #[test]
    fn partial_update_only_needs_lists() {
        let form = RecipeForm {
            ingredients: Some(vec![IngredientAmount { id: 4, amount: 1 }]),
            tags: Some(vec![1]),
            ..Default::default()
        };

        assert!(form.clone().validate(false).is_err());
        let draft = form.validate(true).unwrap();
        assert_eq!(draft.name, None);
        assert_eq!(draft.image, None);
    }

    #[test]
    fn long_names_are_rejected() {
        let mut form = recipe();
        form.name = Some("a".repeat(NAME_MAX_LENGTH + 1));
        assert!(form.validate(false).unwrap_err().fields.contains_key("name"));
    }

    #[test]
    fn registration_rules() {
        let form = RegistrationForm {
            email: Some(String::from("Cook@Example.com")),
            username: Some(String::from("cook.book")),
            first_name: Some(String::from("Ann")),
            last_name: Some(String::from("Cook")),
            password: Some(String::from("hunter22")),
        };
        let user = form.clone().validate().unwrap();
        assert_eq!(user.email, "cook@example.com");

        let mut bad = form;
        bad.email = Some(String::from("not-an-email"));
        bad.username = Some(String::from("with space"));
        let error = bad.validate().unwrap_err();
        assert!(error.fields.contains_key("email"));
        assert!(error.fields.contains_key("username"));
    }

    #[test]
    fn malformed_json_is_a_validation_failure() {
        let error = parse_json::<RecipeForm>(b"{not json").unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
    }
}
