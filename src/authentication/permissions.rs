use crate::{
    database::error::{Error, ErrorKind},
    database::schema::Id,
    jwt::SessionData,
};

const ACTION_TABLE: &[(Role, &[ActionType])] = &[
    (Role::Anonymous, &[ActionType::ReadRecipes]),
    (
        Role::Authenticated,
        &[
            ActionType::ReadRecipes,
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnLists,
            ActionType::ManageSubscriptions,
            ActionType::ManageOwnAccount,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    ReadRecipes,
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnLists,
    ManageSubscriptions,
    ManageOwnAccount,
}

impl ActionType {
    pub fn authenticate(self, principal: &Principal) -> bool {
        let role = principal.role();

        ACTION_TABLE
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, actions)| actions.contains(&self))
            .unwrap_or(false)
    }
}

/// The actor behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(SessionData),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Anonymous => Role::Anonymous,
            Principal::User(_) => Role::Authenticated,
        }
    }

    pub fn user_id(&self) -> Option<Id> {
        match self {
            Principal::Anonymous => None,
            Principal::User(session) => Some(session.user_id),
        }
    }

    /// Returns the session when the principal may perform `action`.
    pub fn require(&self, action: ActionType) -> Result<&SessionData, Error> {
        match self {
            Principal::User(session) if action.authenticate(self) => Ok(session),
            Principal::User(_) => Err(ErrorKind::PermissionDenied.default()),
            Principal::Anonymous => Err(ErrorKind::Unauthorized.default()),
        }
    }
}

/// Whether a request only reads state. Selects the read or write
/// representation and the permission rule that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

/// Reads are open to everyone; writes need the recipe's author.
pub fn authorize_recipe(
    principal: &Principal,
    kind: RequestKind,
    author_id: Id,
) -> Result<(), Error> {
    match kind {
        RequestKind::Read => Ok(()),
        RequestKind::Write => {
            let session = principal.require(ActionType::ManageOwnRecipes)?;
            if session.user_id != author_id {
                return Err(ErrorKind::PermissionDenied.default());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Id) -> Principal {
        Principal::User(SessionData {
            user_id: id,
            username: format!("user{id}"),
        })
    }

    #[test]
    fn anonymous_principals_only_read() {
        assert!(ActionType::ReadRecipes.authenticate(&Principal::Anonymous));
        assert!(!ActionType::CreateRecipes.authenticate(&Principal::Anonymous));
        assert_eq!(
            Principal::Anonymous
                .require(ActionType::ManageOwnLists)
                .unwrap_err()
                .kind,
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn users_manage_their_own_things() {
        let principal = user(1);
        assert_eq!(principal.require(ActionType::CreateRecipes).unwrap().user_id, 1);
        assert_eq!(principal.user_id(), Some(1));
    }

    #[test]
    fn only_authors_write_recipes() {
        assert!(authorize_recipe(&Principal::Anonymous, RequestKind::Read, 1).is_ok());
        assert!(authorize_recipe(&user(2), RequestKind::Read, 1).is_ok());
        assert!(authorize_recipe(&user(1), RequestKind::Write, 1).is_ok());

        assert_eq!(
            authorize_recipe(&user(2), RequestKind::Write, 1).unwrap_err().kind,
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            authorize_recipe(&Principal::Anonymous, RequestKind::Write, 1)
                .unwrap_err()
                .kind,
            ErrorKind::Unauthorized
        );
    }
}
