pub mod detail;
pub mod search;

pub use detail::DetailPage;
pub use search::{SearchPage, SearchRequest};
