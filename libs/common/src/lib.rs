pub mod execute;
pub mod graphql;
pub mod http;
pub mod json;
pub mod origin;
pub mod plugin;
