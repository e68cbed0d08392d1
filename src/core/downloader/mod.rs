pub mod client;
pub mod task;

pub use client::{Downloader, FetchedFile};
pub use task::DownloadTask;
