pub mod builder;

pub use builder::{IndexBuilder, LaunchState, SiteStatistics, Statistics, TotalStatistics};
