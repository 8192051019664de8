//! Terminal client for the wardrobe relay: HTTP client, local session state
//! and interactive commands.

pub mod client;
pub mod session;
pub mod shell;
