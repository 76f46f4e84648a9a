//! Command implementations shared by the `baqpipe` and `baqget` binaries.

pub mod config;
pub mod query;

/// Version string with the build metadata stamped by `build.rs`.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("BAQ_GIT_SHA"),
    ", built: ",
    env!("BAQ_BUILD_TS"),
    ")"
);
