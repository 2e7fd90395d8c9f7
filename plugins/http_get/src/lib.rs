mod config;
mod plugin;

pub use config::HttpGetPluginConfig as Config;
pub use plugin::extract_graphql_from_get_request;
pub use plugin::HttpGetPlugin as Plugin;
