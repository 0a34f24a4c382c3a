pub mod client;

pub use client::{DownloadEntry, Downloader, HttpTransport, Transport};
