mod bail;
mod shutdown;

pub mod prelude {
    pub use crate::bail::{AgentBailError, IterationSkipped, RampedDownError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
