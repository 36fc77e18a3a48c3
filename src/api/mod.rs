pub mod auth;
pub mod automation;
pub mod billing;
pub mod evolution;
pub mod instances;
pub mod signing;
pub mod subscriptions;
pub mod webhooks;
