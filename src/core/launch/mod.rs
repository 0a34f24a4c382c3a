pub mod detached;
pub mod task;

pub use detached::{Detached, ProcessInfo, Session};
pub use task::{accept_eula, ensure_server_jar, eula_accepted, run_server};
