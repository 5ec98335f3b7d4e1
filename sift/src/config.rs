use std::net::SocketAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    /// Rough bytes-per-row used to estimate the total line count before
    /// parsing finishes; only drives the `parsing` percentage.
    #[envconfig(default = "64")]
    pub estimated_line_bytes: u64,

    /// Capacity of the progress broadcast channel. Subscribers that fall
    /// further behind than this skip events instead of blocking jobs.
    #[envconfig(default = "128")]
    pub progress_buffer: usize,

    /// Pending routed lines per partition before the router suspends.
    #[envconfig(default = "64")]
    pub line_buffer: usize,
}
