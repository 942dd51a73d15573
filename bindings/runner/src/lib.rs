mod catalog;
mod common;
mod context;
mod runner_context;
mod workflow;

pub mod prelude {
    /// Common operations for check-in scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::catalog::{
        CatalogError, CredentialCatalog, CredentialRecord, LoginResult, TeamCatalog,
        TeamDescriptor,
    };
    pub use crate::context::CheckinAgentContext;
    pub use crate::runner_context::{CheckinRunnerContext, DEFAULT_POST_URL};

    /// The ready-made behaviours, one per scenario shape.
    pub use crate::workflow::*;

    /// Re-export of the `stampede_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use stampede_runner::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use checkin_client_instrumented::prelude::*;
}
