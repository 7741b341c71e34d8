//! The work behind each lifecycle handler.
//!
//! Each function is the asynchronous body one handler registers with its
//! event. They take their collaborators explicitly so they can be exercised
//! without a host.

pub mod activate;
pub mod fetch;
pub mod install;

pub use activate::delete_stale_generations;
pub use fetch::network_first;
pub use install::precache;
