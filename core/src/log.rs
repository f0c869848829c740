//! Logging shims.
//! Forwards to `tracing` when the `tracing` feature is on, expands to nothing otherwise.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, info, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}

// Named apart from the built-in `#[warn]` attribute, which a plain `warn` would be ambiguous with.
#[cfg(not(feature = "tracing"))]
macro_rules! warn_ {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {debug, info, warn_ as warn};
