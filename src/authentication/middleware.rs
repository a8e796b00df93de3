use std::{convert::Infallible, sync::Arc};

use warp::{reject::Rejection, Filter};

use super::{jwt::verify_jwt_session, permissions::Principal};
use crate::{
    constants::TOKEN_PREFIXES,
    database::error::{Error, ErrorKind},
    state::State,
};

pub fn with_state(
    state: Arc<State>,
) -> impl Filter<Extract = (Arc<State>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the request principal. A missing `Authorization` header is an
/// anonymous request; a present but invalid one is rejected.
pub fn with_principal(
    state: Arc<State>,
) -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let state = state.clone();
        async move {
            principal_from_header(header.as_deref(), &state.config.secret_key)
                .map_err(Rejection::from)
        }
    })
}

pub fn principal_from_header(header: Option<&str>, secret: &[u8]) -> Result<Principal, Error> {
    let header = match header.map(str::trim) {
        None | Some("") => return Ok(Principal::Anonymous),
        Some(header) => header,
    };

    let (prefix, token) = header
        .split_once(' ')
        .ok_or_else(|| ErrorKind::Unauthorized.new("Invalid token header."))?;

    if !TOKEN_PREFIXES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(prefix))
    {
        return Err(ErrorKind::Unauthorized.new("Invalid token header."));
    }

    let session = verify_jwt_session(token.trim(), secret).map_err(|e| {
        log::warn!("> Rejected token: {}", e.info);
        e
    })?;

    Ok(Principal::User(session.into()))
}
