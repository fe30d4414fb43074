mod billing_routes;
mod guest_routes;
mod health_routes;
mod import_routes;
pub mod login_routes;
pub mod pagination;
mod phase_routes;
mod project_routes;
mod webhook_routes;

pub use billing_routes::router as billing_routes;
pub use guest_routes::router as guest_routes;
pub use health_routes::router as health_routes;
pub use import_routes::authorize_router as import_authorize_routes;
pub use import_routes::router as import_routes;
pub use login_routes::router as login_routes;
pub use phase_routes::router as phase_routes;
pub use project_routes::router as project_routes;
pub use webhook_routes::router as webhook_routes;
