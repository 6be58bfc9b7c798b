//! Working-directory commands.
//!
//! Each command is an `impl` block on [`Keystone`](crate::keystone::Keystone)
//! operating on a directory checked out with `init`. The serializable
//! [`Command`](crate::command::Command) enum dispatches to them.

mod checkout;
mod delete;
mod init;
mod invite;
mod local;
mod pull;
mod push;
mod share;

pub use invite::{INVITATIONS_STORE, Invitation, InviteReport};
pub use pull::PullReport;
pub use push::{FilePush, PushReport};
pub use share::ShareLink;
