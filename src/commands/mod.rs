//! CLI commands implementation

pub mod cache;
pub mod init;
pub mod inspect;
pub mod reset;
pub mod scrape;
pub mod statistics;
pub mod summary;

pub use cache::*;
pub use init::*;
pub use inspect::*;
pub use reset::*;
pub use scrape::*;
pub use statistics::*;
pub use summary::*;
