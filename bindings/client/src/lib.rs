mod check;
mod client;
mod error;
mod types;

pub mod prelude {
    pub use crate::check::{Checks, StepResponse};
    pub use crate::client::CheckinClient;
    pub use crate::error::StepError;
    pub use crate::types::{Login, Registration, TeamId, TeamMember, Token};
}
