//! Game rules: roles, session state and the pure resolvers.

pub mod night;
pub mod random;
pub mod roles;
pub mod session;
pub mod validation;
pub mod vote;
pub mod win;

pub use random::Randomizer;
pub use roles::{ActionKind, Faction, Role, RoleAssigner, RoleConfiguration};
pub use session::{PlayerView, ResetMode, SessionState};
