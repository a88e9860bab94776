//! Bounded work queue and result channel.

pub mod results;
pub mod work;

pub use results::{RecvTimeoutError, ResultChannel, Results, TryRecvError};
pub use work::{TrySubmitError, WorkQueue};
