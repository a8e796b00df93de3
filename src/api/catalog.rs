use std::{future::Future, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use super::{json_reply, with_form};
use crate::{
    actions,
    cache::cache::{CacheKey, CacheKeyType, RedisValue},
    error::{Error, ErrorKind},
    form::Form,
    middleware::with_state,
    schema::Id,
    state::State,
};

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_tags);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(read_tag);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(with_form())
        .and(with_state(state.clone()))
        .and_then(list_ingredients);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(read_ingredient);

    tags.or(tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(ingredient)
        .unify()
        .boxed()
}

/// Serves a catalog listing through the cache when one is configured.
async fn cached<T, F, Fut>(state: &State, key: CacheKey<String>, callback: F) -> Result<Vec<T>, Error>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, Error>>,
{
    match state.cache.clone() {
        Some(mut cache) => RedisValue::get_or_list(key, &mut cache, callback).await,
        None => callback().await,
    }
}

async fn list_tags(state: Arc<State>) -> Result<Response, Rejection> {
    let tags = cached(&state, CacheKeyType::Tags.new(String::from("all")), || {
        actions::list_tags(&state.pool)
    })
    .await?;

    Ok(json_reply(&tags, StatusCode::OK))
}

async fn read_tag(id: Id, state: Arc<State>) -> Result<Response, Rejection> {
    let tag = actions::get_tag(id, &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Tag not found."))?;

    Ok(json_reply(&tag, StatusCode::OK))
}

async fn list_ingredients(form: Form, state: Arc<State>) -> Result<Response, Rejection> {
    let prefix = form.get_str("name").unwrap_or_default().trim().to_lowercase();

    let ingredients = cached(&state, CacheKeyType::Ingredients.new(prefix.clone()), || {
        actions::search_ingredients(&prefix, &state.pool)
    })
    .await?;

    Ok(json_reply(&ingredients, StatusCode::OK))
}

async fn read_ingredient(id: Id, state: Arc<State>) -> Result<Response, Rejection> {
    let ingredient = actions::get_ingredient(id, &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Ingredient not found."))?;

    Ok(json_reply(&ingredient, StatusCode::OK))
}
