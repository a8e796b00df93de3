use std::sync::Arc;

use warp::{
    filters::BoxedFilter, http::StatusCode, hyper::body::Bytes, reject::Rejection,
    reply::Response, Filter,
};

use super::{json_reply, no_content, with_body, with_form};
use crate::{
    actions,
    error::ErrorKind,
    form::{parse_json, recipes_limit, Form, LoginForm, PasswordForm, RegistrationForm},
    middleware::{with_principal, with_state},
    pagination::Pagination,
    permissions::{ActionType, Principal},
    schema::{AuthToken, Id, UserCreated},
    state::State,
};

const USERS_PATH: &str = "/api/users/";
const SUBSCRIPTIONS_PATH: &str = "/api/users/subscriptions/";

pub fn routes(state: Arc<State>) -> BoxedFilter<(Response,)> {
    let register = warp::path!("users")
        .and(warp::post())
        .and(with_body())
        .and(with_state(state.clone()))
        .and_then(register_user);

    let list = warp::path!("users")
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_form())
        .and(with_state(state.clone()))
        .and_then(list_users);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_state(state.clone()))
        .and_then(read_me);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_form())
        .and(with_state(state.clone()))
        .and_then(list_subscriptions);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_principal(state.clone()))
        .and(with_body())
        .and(with_state(state.clone()))
        .and_then(change_password);

    let read = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_principal(state.clone()))
        .and(with_state(state.clone()))
        .and_then(read_user);

    // POST subscribes, DELETE unsubscribes.
    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(
            warp::post()
                .map(|| true)
                .or(warp::delete().map(|| false))
                .unify(),
        )
        .and(with_principal(state.clone()))
        .and(with_form())
        .and(with_state(state.clone()))
        .and_then(toggle_subscription);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(with_body())
        .and(with_state(state.clone()))
        .and_then(token_login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_principal(state))
        .and_then(token_logout);

    register
        .or(list)
        .unify()
        .or(me)
        .unify()
        .or(subscriptions)
        .unify()
        .or(set_password)
        .unify()
        .or(read)
        .unify()
        .or(subscribe)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .boxed()
}

async fn register_user(body: Bytes, state: Arc<State>) -> Result<Response, Rejection> {
    let new = parse_json::<RegistrationForm>(&body)?.validate()?;
    let user = actions::register_user(new, &state.pool).await?;

    Ok(json_reply(&UserCreated::from(user), StatusCode::CREATED))
}

async fn list_users(
    principal: Principal,
    form: Form,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let pagination = Pagination::from_form(&form, state.config.page_size)?;
    let page =
        actions::fetch_users(principal.user_id(), &pagination, USERS_PATH, &state.pool).await?;

    Ok(json_reply(&page, StatusCode::OK))
}

async fn read_me(principal: Principal, state: Arc<State>) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnAccount)?;
    let user = actions::get_user_read(session.user_id, Some(session.user_id), &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::Unauthorized.new("User not found."))?;

    Ok(json_reply(&user, StatusCode::OK))
}

async fn read_user(id: Id, principal: Principal, state: Arc<State>) -> Result<Response, Rejection> {
    let user = actions::get_user_read(id, principal.user_id(), &state.pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("User not found."))?;

    Ok(json_reply(&user, StatusCode::OK))
}

async fn change_password(
    principal: Principal,
    body: Bytes,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnAccount)?;
    let (new_password, current_password) = parse_json::<PasswordForm>(&body)?.validate()?;

    actions::set_password(session.user_id, new_password, &current_password, &state.pool).await?;

    Ok(no_content())
}

async fn list_subscriptions(
    principal: Principal,
    form: Form,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageSubscriptions)?;
    let pagination = Pagination::from_form(&form, state.config.page_size)?;

    let page = actions::fetch_subscriptions(
        session.user_id,
        recipes_limit(&form),
        &pagination,
        SUBSCRIPTIONS_PATH,
        &state.config,
        &state.pool,
    )
    .await?;

    Ok(json_reply(&page, StatusCode::OK))
}

async fn toggle_subscription(
    author_id: Id,
    subscribing: bool,
    principal: Principal,
    form: Form,
    state: Arc<State>,
) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageSubscriptions)?;

    if subscribing {
        let author = actions::subscribe(
            session.user_id,
            author_id,
            recipes_limit(&form),
            &state.config,
            &state.pool,
        )
        .await?;
        return Ok(json_reply(&author, StatusCode::CREATED));
    }

    actions::unsubscribe(session.user_id, author_id, &state.pool).await?;
    Ok(no_content())
}

async fn token_login(body: Bytes, state: Arc<State>) -> Result<Response, Rejection> {
    let (email, password) = parse_json::<LoginForm>(&body)?.validate()?;
    let auth_token = actions::login_user(&email, &password, &state.config, &state.pool).await?;

    Ok(json_reply(&AuthToken { auth_token }, StatusCode::OK))
}

/// Tokens are stateless; logging out only checks that the caller holds one.
async fn token_logout(principal: Principal) -> Result<Response, Rejection> {
    let session = principal.require(ActionType::ManageOwnAccount)?;
    log::debug!("> User {} logged out", session.user_id);

    Ok(no_content())
}
