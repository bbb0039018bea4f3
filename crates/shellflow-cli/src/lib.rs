//! Shellflow CLI library: the command implementations behind the
//! `shellflow` binary, exposed so they can be exercised in tests.

pub mod commands;
