//! Channel plumbing between submitters, workers and the draining caller.

pub mod queue;

pub use queue::{RecvTimeoutError, ResultChannel, Results, TryRecvError, TrySubmitError, WorkQueue};
