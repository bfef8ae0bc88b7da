//! Completion of asynchronous creations.
//!
//! Music is the only asynchronous kind: submission returns a provider task id and the record is
//! stored `pending`. From there two paths move things along:
//!
//! - [`callback`]: the provider posts to `/webhooks/music`; the record carrying the task id is
//!   moved forward, never backward, and unknown task ids are dropped.
//! - [`poller`]: clients re-read their records until nothing is in progress. Polling only reads;
//!   it never calls a provider.

pub mod callback;
pub mod poller;

pub use callback::{CallbackPayload, CompletionEvent, apply_event, callback_token, verify_callback_token};
pub use poller::{CreationFeed, CreationPoller, HttpCreationFeed, PollSnapshot, PollerConfig};
