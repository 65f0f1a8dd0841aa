pub mod feed;
pub mod likes;
pub mod model;
pub mod pending;
pub mod profile;

pub use feed::{FeedSettings, FeedStateEngine};
pub use model::{FeedQuery, FeedSnapshot, Page, PageInfo, Post, Sort};
pub use pending::{PendingLike, PendingLikeRegistry};
pub use profile::{ProfileEngine, ProfileSnapshot};
