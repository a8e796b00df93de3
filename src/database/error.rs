use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde_json::{json, Value};
use warp::{
    http::StatusCode,
    reject::Reject,
    reply::{Reply, Response},
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

const FOREIGN_KEY_INFO: &str = "Referenced object does not exist.";
const CHECK_VIOLATION_INFO: &str = "Invalid value.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    PermissionDenied,
    NotFound,
    Conflict,
    EmptyResult,
    Internal,
}

impl ErrorKind {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_owned(),
            fields: BTreeMap::new(),
        }
    }

    pub fn default(self) -> Error {
        self.new(self.default_info())
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound | ErrorKind::EmptyResult => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_info(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Invalid input.",
            ErrorKind::Unauthorized => "Authentication credentials were not provided.",
            ErrorKind::PermissionDenied => {
                "You do not have permission to perform this action."
            }
            ErrorKind::NotFound => "Not found.",
            ErrorKind::Conflict => "The request conflicts with the current state.",
            ErrorKind::EmptyResult => "Nothing to return.",
            ErrorKind::Internal => "Internal server error.",
        }
    }
}

/// Request-local failure. Every handler error ends up here and is rendered by
/// the rejection recovery of the api module.
#[derive(Debug, thiserror::Error)]
#[error("{info}")]
pub struct Error {
    pub kind: ErrorKind,
    pub info: String,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Error {
    /// Validation failure carrying field-level messages.
    pub fn fields(fields: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            info: ErrorKind::Validation.default_info().to_owned(),
            fields,
        }
    }

    pub fn field(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_owned(), vec![message.to_owned()]);
        Self::fields(fields)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn body(&self) -> Value {
        if self.fields.is_empty() {
            json!({ "detail": self.info })
        } else {
            json!(self.fields)
        }
    }

    pub fn to_response(&self) -> Response {
        warp::reply::with_status(warp::reply::json(&self.body()), self.status()).into_response()
    }
}

impl Reject for Error {}

pub struct QueryError {
    kind: ErrorKind,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: ErrorKind::Internal,
            info,
        }
    }

    pub(crate) fn from_database(code: Option<&str>, constraint: Option<&str>, message: &str) -> Self {
        match code {
            Some(UNIQUE_VIOLATION) => Self {
                kind: ErrorKind::Conflict,
                info: String::from("Object already exists."),
            },
            Some(FOREIGN_KEY_VIOLATION) => Self {
                kind: ErrorKind::Validation,
                info: String::from(FOREIGN_KEY_INFO),
            },
            Some(CHECK_VIOLATION) => {
                log::warn!("> Constraint violated: {}", constraint.unwrap_or("unknown"));
                Self {
                    kind: ErrorKind::Validation,
                    info: String::from(CHECK_VIOLATION_INFO),
                }
            }
            _ => Self::new(message.to_owned()),
        }
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.kind == ErrorKind::Validation && self.info == FOREIGN_KEY_INFO
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                Self::from_database(e.code().as_deref(), e.constraint(), e.message())
            }
            sqlx::Error::RowNotFound => Self {
                kind: ErrorKind::NotFound,
                info: String::from("Not found."),
            },
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value.kind {
            ErrorKind::Internal => {
                log::error!("> Query failed: {}", value.info);
                ErrorKind::Internal.default()
            }
            kind => kind.new(&value.info),
        }
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl From<CacheError> for Error {
    fn from(value: CacheError) -> Self {
        log::error!("> Cache failed: {}", value.info);
        ErrorKind::Internal.default()
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        ErrorKind::Validation.new(&value.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::EmptyResult.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorKind::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_prefers_field_messages() {
        let error = Error::field("tags", "This field is required.");
        assert_eq!(error.body(), json!({ "tags": ["This field is required."] }));

        let error = ErrorKind::Conflict.new("Recipe is already in favorites.");
        assert_eq!(
            error.body(),
            json!({ "detail": "Recipe is already in favorites." })
        );
    }

    #[test]
    fn internal_query_errors_hide_details() {
        let error: Error = QueryError::new(String::from("relation \"users\" does not exist")).into();
        assert_eq!(error.kind, ErrorKind::Internal);
        assert_eq!(error.info, "Internal server error.");
    }

    #[test]
    fn constraint_names_stay_out_of_responses() {
        let error: Error = QueryError::from_database(
            Some(CHECK_VIOLATION),
            Some("recipes_cooking_time_check"),
            "new row violates check constraint",
        )
        .into();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(!error.info.contains("cooking_time"));
        assert!(!error.body().to_string().contains("recipes_"));
    }

    #[test]
    fn storage_codes_map_to_kinds() {
        let error = QueryError::from_database(Some(UNIQUE_VIOLATION), None, "duplicate key");
        assert_eq!(error.kind, ErrorKind::Conflict);

        let error = QueryError::from_database(Some(FOREIGN_KEY_VIOLATION), None, "fk");
        assert!(error.is_foreign_key_violation());

        let error: Error = QueryError::from_database(Some("42P01"), None, "no relation").into();
        assert_eq!(error.kind, ErrorKind::Internal);
    }

    #[test]
    fn missing_rows_become_not_found() {
        let error: Error = QueryError::from(sqlx::Error::RowNotFound).into();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }

    #[test]
    fn errors_travel_inside_rejections() {
        let rejection = warp::reject::Rejection::from(ErrorKind::Conflict.new("Taken."));
        let error = rejection.find::<Error>().unwrap();
        assert_eq!(error.kind, ErrorKind::Conflict);
        assert_eq!(error.info, "Taken.");
    }

    #[test]
    fn type_errors_are_validation_failures() {
        let error: Error = TypeError::new("Invalid key").into();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.to_string(), "Invalid key");
    }
}
