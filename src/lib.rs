//! stampede: a concurrent HTTP load generator.
//!
//! The engine drives a configurable worker population against one or more
//! target URLs, optionally ramping concurrency up over time and pacing each
//! worker under a rate limit, and reduces the per-request outcomes into a
//! statistical summary.
//!
//! ```rust,no_run
//! use stampede::{LoadTest, TestConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = TestConfig::new(vec!["http://localhost:8080/".to_string()]);
//! config.num_requests = 1000;
//! config.concurrency = 20;
//!
//! let run = LoadTest::new(config)?.run().await?;
//! println!("{} requests, p99 = {:?}", run.summary.total_requests,
//!     run.summary.response_times.map(|rt| rt.p99));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod export;
pub mod pace;
pub mod payload;
pub mod sink;
pub mod stats;
pub mod supervisor;
pub mod utils;
pub mod worker;

pub use config::{AssertionSpec, Method, RampPlan, TestConfig};
pub use errors::{ConfigError, EngineError, ErrorKind, RequestError};
pub use sink::{ProgressFn, RequestResult};
pub use stats::Summary;
pub use supervisor::{LoadTest, RunHandle, RunResult};
