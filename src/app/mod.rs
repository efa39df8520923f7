//! Process-wide plumbing shared by the library and the `fixbridge` binary.

pub mod logging;
