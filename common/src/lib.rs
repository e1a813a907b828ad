// Library lints
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unsafe_code)]

pub mod container;
pub mod envelope;
pub mod frame;
pub mod interface;
pub mod io;
pub mod logging;
pub mod stats;
