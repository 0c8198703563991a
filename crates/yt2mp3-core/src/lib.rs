//! yt2mp3-core: download and processing pipeline for the yt2mp3 service

pub mod config;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod processor;

pub use config::Config;
pub use error::{ErrorClass, Result, Yt2Mp3Error};
