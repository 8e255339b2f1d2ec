pub mod bus;
pub mod error;
pub mod logging;
pub mod task;

pub use bus::{EventBus, SharedEventBus};
pub use error::{BackendError, BackendResult, FileError, Result};
pub use logging::init_logging;
pub use task::{spawn_periodic, TaskHandle};
