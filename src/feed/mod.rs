mod list;
mod model;
mod repository;

pub use list::{FeedList, LoadState, TimeRange};
pub use model::{Feed, Labels, parse_timestamp, strip_html};
pub use repository::{
    DEFAULT_LIMIT, DEFAULT_WINDOW_HOURS, FeedQuery, FeedRepository, fetch_feeds, query_url,
};
