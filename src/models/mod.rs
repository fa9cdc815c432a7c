mod feed;
mod post;
mod user;

pub use feed::{Feed, FeedFollow, FeedWithOwner, NewFeed};
pub use post::{NewPost, Post, PostInsert};
pub use user::User;
