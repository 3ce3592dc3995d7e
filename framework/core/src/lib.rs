mod bail;
mod shutdown;

pub mod prelude {
    pub use crate::bail::VirtualUserBailError;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
