pub mod guest_tokens;
pub mod media;
pub mod media_sets;
pub mod phases;
pub mod projects;
pub mod schema;
pub mod subscription_history;
pub mod subscriptions;
pub mod users;
