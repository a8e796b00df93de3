use std::sync::Arc;

use warp::{
    filters::BoxedFilter,
    http::StatusCode,
    hyper::body::Bytes,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use super::{json_reply, no_content, with_body, with_form};
use crate::{
    actions,
    constants::SHOPPING_LIST_FILENAME,
    error::ErrorKind,
    form::{parse_json, Form, RecipeFilter, RecipeForm},
    media::{remove_image, InlineImage},
    middleware::{with_principal, with_state},
    pagination::Pagination,
    permissions::{authorize_recipe, ActionType, Principal, RequestKind},
    schema::{Id, MembershipKind},
    state::State,
};

const RECIPES_PATH: &str = "/api/recipes/";

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_form())
        .and(with_state(state.clone()))
        .and_then(list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_principal(state.clone()))
        .and(with_body())
        .and(with_state(state.clone()))
        .and_then(create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart);

    let read = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_state(state.clone()))
        .and_then(read_recipe);

    // PATCH applies a partial update, PUT a full one.
    let update = warp::path!("recipes" / Id)
        .and(
            warp::patch()
                .map(|| true)
                .or(warp::put().map(|| false))
                .unify(),
        )
        .and(with_principal(state.clone()))
        .and(with_body())
        .and(with_state(state.clone()))
        .and_then(update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_principal(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_recipe);

    let favorite = warp::path!("recipes" / Id / "favorite")
        .map(|id: Id| (id, MembershipKind::Favorite))
        .untuple_one();
    let shopping_cart = warp::path!("recipes" / Id / "shopping_cart")
        .map(|id: Id| (id, MembershipKind::ShoppingCart))
        .untuple_one();
    // POST adds to the list, DELETE removes from it.
    let membership = favorite
        .or(shopping_cart)
        .unify()
        .and(
            warp::post()
                .map(|| true)
                .or(warp::delete().map(|| false))
                .unify(),
        )
        .and(with_principal(state.clone()))
        .and(with_state(state))
        .and_then(toggle_membership);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(read)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(membership)
        .unify()
        .boxed()
}

async fn list_recipes(
    principal: Principal,
    form: Form,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let pagination = Pagination::from_form(&form, state.config.page_size)?;
    let filter = RecipeFilter::from_form(&form)?;

    let page = actions::fetch_recipes(
        &filter,
        principal.user_id(),
        &pagination,
        RECIPES_PATH,
        &state.config,
        &state.pool,
    )
    .await?;

    Ok(json_reply(&page, StatusCode::OK))
}

async fn read_recipe(id: Id, principal: Principal, state: Arc<State>) -> Result<Response, Rejection> {
    let recipe = actions::get_recipe_read(id, principal.user_id(), &state.config, &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found."))?;

    authorize_recipe(&principal, RequestKind::Read, recipe.author.id)?;

    Ok(json_reply(&recipe, StatusCode::OK))
}

async fn create_recipe(
    principal: Principal,
    body: Bytes,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::CreateRecipes)?;
    let draft = parse_json::<RecipeForm>(&body)?.validate(false)?;

    let image = InlineImage::parse(draft.image.as_deref().unwrap_or_default())?;
    let path = image.store(&state.config.media_root).await?;

    let id = match actions::create_recipe(session.user_id, &draft, &path, &state.pool).await {
        Ok(id) => id,
        Err(e) => {
            remove_image(&state.config.media_root, &path).await;
            return Err(e.into());
        }
    };

    respond_with_recipe(id, session.user_id, StatusCode::CREATED, &state).await
}

async fn update_recipe(
    id: Id,
    partial: bool,
    principal: Principal,
    body: Bytes,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnRecipes)?;
    let recipe = actions::get_recipe_mut(id, &principal, &state.pool).await?;
    let draft = parse_json::<RecipeForm>(&body)?.validate(partial)?;

    let stored = match draft.image.as_deref() {
        Some(data) => Some(
            InlineImage::parse(data)?
                .store(&state.config.media_root)
                .await?,
        ),
        None => None,
    };

    if let Err(e) = actions::update_recipe(id, &draft, stored.as_deref(), &state.pool).await {
        if let Some(path) = &stored {
            remove_image(&state.config.media_root, path).await;
        }
        return Err(e.into());
    }

    if stored.is_some() {
        remove_image(&state.config.media_root, &recipe.image).await;
    }

    respond_with_recipe(id, session.user_id, StatusCode::OK, &state).await
}

async fn delete_recipe(id: Id, principal: Principal, state: Arc<State>) -> Result<Response, Rejection> {
    principal.require(ActionType::ManageOwnRecipes)?;
    let recipe = actions::get_recipe_mut(id, &principal, &state.pool).await?;

    actions::delete_recipe(recipe.id, &state.pool).await?;
    remove_image(&state.config.media_root, &recipe.image).await;

    log::info!("> Deleted recipe {}", recipe.id);
    Ok(no_content())
}

async fn toggle_membership(
    id: Id,
    kind: MembershipKind,
    adding: bool,
    principal: Principal,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnLists)?;

    if adding {
        let summary =
            actions::add_membership(kind, session.user_id, id, &state.config, &state.pool).await?;
        return Ok(json_reply(&summary, StatusCode::CREATED));
    }

    actions::remove_membership(kind, session.user_id, id, &state.pool).await?;
    Ok(no_content())
}

async fn download_shopping_cart(
    principal: Principal,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnLists)?;
    let list = actions::fetch_shopping_list(session.user_id, &state.pool).await?;

    let reply = warp::reply::with_header(
        list.render(),
        "content-type",
        "text/plain; charset=utf-8",
    );
    let reply = warp::reply::with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    );

    Ok(reply.into_response())
}

async fn respond_with_recipe(
    id: Id,
    user_id: Id,
    status: StatusCode,
    state: &State,
) -> Result<Response, Rejection> {
    let recipe = actions::get_recipe_read(id, Some(user_id), &state.config, &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found."))?;

    Ok(json_reply(&recipe, status))
}
