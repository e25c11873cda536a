pub mod comments;
pub mod cursor;
pub mod feeds;
pub mod hydrate;

pub use comments::{get_thread, GetThreadParams, ThreadPage};
pub use feeds::{community_feed, discover, timeline, FeedPage};
