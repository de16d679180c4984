pub mod caption;
pub mod downloader;
pub mod editor;
pub mod executor;
pub mod jobs;
pub mod queue;
pub mod stages;
pub mod storage;
pub mod store;
pub mod worker;
