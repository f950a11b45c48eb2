pub mod backend;
pub mod cli;
pub mod config;
pub mod export;
pub mod map_resolver;
pub mod playback;
pub mod poller;
pub mod render;
pub mod session;
pub mod timeline;
pub mod util;
