mod catalog;
mod recipes;
mod users;

use std::{convert::Infallible, sync::Arc};

use serde::Serialize;
use warp::{
    http::StatusCode,
    hyper::body::Bytes,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use crate::{
    constants::MAX_BODY_SIZE,
    error::{Error, ErrorKind},
    form::Form,
    state::State,
};

/// Every route of the service: the JSON api under `/api` and uploaded media
/// under `/media`.
pub fn routes(
    state: Arc<State>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = warp::path("api").and(
        recipes::routes(state.clone())
            .or(catalog::routes(state.clone()))
            .unify()
            .or(users::routes(state.clone()))
            .unify(),
    );
    let media = warp::path("media").and(warp::fs::dir(state.config.media_root.clone()));

    api.or(media.map(|file: warp::fs::File| file.into_response()))
        .unify()
        .recover(recover)
        .with(warp::log("foodgram::api"))
}

pub(crate) fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

pub(crate) fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// The raw query string as a `Form`; a missing query is an empty form.
pub(crate) fn with_form() -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::query::raw()
        .or(warp::any().map(String::new))
        .unify()
        .and_then(|raw: String| async move {
            Form::from_query(&raw).map_err(|e| Rejection::from(Error::from(e)))
        })
}

pub(crate) fn with_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::bytes())
}

async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    if let Some(error) = rejection.find::<Error>() {
        if error.kind == ErrorKind::Internal {
            log::error!("> {}", error.info);
        }
        return Ok(error.to_response());
    }

    let error = if rejection.is_not_found() {
        ErrorKind::NotFound.default()
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(json_reply(
            &serde_json::json!({ "detail": "Method not allowed." }),
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(json_reply(
            &serde_json::json!({ "detail": "Request body is too large." }),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    } else if rejection.find::<warp::reject::InvalidHeader>().is_some()
        || rejection.find::<warp::reject::LengthRequired>().is_some()
    {
        ErrorKind::Validation.new("Malformed request.")
    } else {
        log::error!("> Unhandled rejection: {rejection:?}");
        ErrorKind::Internal.default()
    };

    Ok(error.to_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_query_is_an_empty_form() {
        let form = warp::test::request()
            .path("/anything")
            .filter(&with_form())
            .await
            .unwrap();
        assert_eq!(form.get_str("page"), None);

        let form = warp::test::request()
            .path("/anything?page=2&tags=a&tags=b")
            .filter(&with_form())
            .await
            .unwrap();
        assert_eq!(form.get_str("page"), Some("2"));
        assert_eq!(form.get_all("tags"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_rejections_render_json() {
        let response = recover(warp::reject::not_found()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = recover(Rejection::from(Error::field("name", "This field is required.")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
