//! Webhook intake: signature verification, payload parsing and
//! normalization into stored events.

pub mod events;
pub mod normalize;
pub mod parser;
pub mod signature;

pub use events::{
    CommentAction, CommentEvent, PrAction, PullRequestEvent, PushEvent, Repository, Webhook,
    WebhookPayload,
};
pub use normalize::{EventHandler, NormalizeError, abbreviate, normalize};
pub use parser::{ParseError, parse_webhook};
pub use signature::{
    WebhookSecret, compute_signature, format_signature_header, parse_signature_header,
    verify_signature,
};
