pub mod gateway;
pub mod persisted_queries;
pub mod plugin_manager;
pub mod plugins;
pub mod source;
pub mod transport;
pub mod ws;
