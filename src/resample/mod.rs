//! Wild cluster bootstrap.

/// A resampling scheme: an endless stream of resamples of `T`.
pub trait Re<T> {
    type Item;
    fn re(&self, t: &T) -> impl Iterator<Item = Self::Item>;
}

mod weights;
mod wild_cluster;
mod event_time;

pub use weights::{recommend_distribution, WeightDist, WeightSampler, WildWeights};
pub use wild_cluster::{BootstrapResult, BootstrapState, WildClusterBootstrap};
pub use event_time::{bootstrap_event_time, BootstrapRow, EventTimeBootstrap};
