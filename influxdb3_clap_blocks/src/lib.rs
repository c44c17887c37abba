//! Building blocks for [`clap`]-driven configuration.

pub mod coordinator;
