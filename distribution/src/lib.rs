mod behavior;
mod cloudfront;
mod merger;
pub mod metrics_defs;
mod model;
mod route_table;
mod store;

pub use behavior::{CacheBehavior, CookiePolicy, Distribution, ForwardMode, FunctionAssociation};
pub use cloudfront::{CloudFrontConfig, CloudFrontStore};
pub use merger::{apply_route, merge};
pub use model::{BehaviorSettings, DistributionConfig, RoutedBehavior};
pub use route_table::{
    DEFAULT_ROUTE_KEY, EventAssociations, LifecycleEvent, RouteBehavior, RouteKey, RouteTable,
};
pub use store::{DistributionStore, Fetched, InMemoryStore, StoreError};
