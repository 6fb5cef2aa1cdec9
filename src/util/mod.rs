//! Shared helpers used by both the client state machine and the server connected-client loop.
// (c) 2026 nuke-ms contributors

pub(crate) mod framing_io;
