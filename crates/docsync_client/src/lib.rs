//! Client-side optimistic local-state machine.
//!
//! Followed entities keep an `origin` (last server-confirmed document),
//! a queue of unconfirmed commits, and a `head` equal to the commits
//! folded over origin. Commits apply locally at once; pushes send the
//! queued prefix to the server and either confirm it or rebase the
//! remaining commits onto the server's diffs. Network failures never
//! lose edits: the in-flight commits queue as unreached until a repush
//! succeeds.

mod error;
mod machine;
mod state;
mod transport;

pub use error::{ClientError, ClientResult};
pub use machine::{PushStatus, SyncClient};
pub use state::{EntityKey, LocalEntityState, UnreachedCommit};
pub use transport::{MockTransport, SyncTransport};
