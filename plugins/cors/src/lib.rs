mod config;
mod plugin;

pub use config::{AllowedOrigin, DEV_ORIGINS};
pub use config::CorsPluginConfig as Config;
pub use plugin::CorsPlugin as Plugin;
