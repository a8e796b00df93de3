mod ingredients;
mod memberships;
mod recipes;
mod subscriptions;
mod tags;
mod users;

pub use ingredients::*;
pub use memberships::*;
pub use recipes::*;
pub use subscriptions::*;
pub use tags::*;
pub use users::*;
