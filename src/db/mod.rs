pub mod subscriptions;

pub use subscriptions::{FeedSubscription, SqliteSubscriptionStore, SubscriptionSource};
