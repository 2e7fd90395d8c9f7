use switchboard_common::{
  execute::RequestExecutionContext,
  graphql::GraphQLRequest,
  http::GatewayHttpResponse,
  plugin::{CreatablePlugin, Plugin, PluginError},
};
use switchboard_config::PluginDefinition;

use crate::plugins::match_content_type::MatchContentTypePlugin;

#[derive(Debug, Default)]
pub struct PluginManager {
  plugins: Vec<Box<dyn Plugin>>,
}

impl PluginManager {
  pub fn new_from_vec(plugins: Vec<Box<dyn Plugin>>) -> Self {
    let mut pm = Self { plugins };

    // We want to make sure to register default plugins last, in order to ensure it's setting the value correctly
    for p in PluginManager::default_plugins() {
      pm.register_boxed_plugin(p);
    }

    pm
  }

  pub async fn create_plugin<T: CreatablePlugin + 'static>(
    config: T::Config,
  ) -> Result<Box<dyn Plugin>, PluginError> {
    let plugin: Box<dyn Plugin> = T::create(config).await?;

    Ok(plugin)
  }

  pub async fn new(plugins_config: &[PluginDefinition]) -> Result<Self, PluginError> {
    let mut instance = PluginManager::default();

    for plugin_def in plugins_config.iter() {
      let plugin = match plugin_def {
        PluginDefinition::CorsPlugin {
          enabled: Some(true),
          config,
        } => Self::create_plugin::<cors_plugin::Plugin>(config.clone().unwrap_or_default()).await?,
        PluginDefinition::HttpGetPlugin {
          enabled: Some(true),
          config,
        } => {
          Self::create_plugin::<http_get_plugin::Plugin>(config.clone().unwrap_or_default()).await?
        }
        // In case plugin is not enabled, we are skipping it.
        _ => continue,
      };

      instance.register_boxed_plugin(plugin)
    }

    // The cross-origin policy and the GET transport apply to every endpoint unless the
    // plugin is declared explicitly.
    let declares_cors = plugins_config
      .iter()
      .any(|plugin_def| matches!(plugin_def, PluginDefinition::CorsPlugin { .. }));
    let declares_http_get = plugins_config
      .iter()
      .any(|plugin_def| matches!(plugin_def, PluginDefinition::HttpGetPlugin { .. }));

    if !declares_cors {
      instance.register_boxed_plugin(
        Self::create_plugin::<cors_plugin::Plugin>(Default::default()).await?,
      );
    }

    if !declares_http_get {
      instance.register_boxed_plugin(
        Self::create_plugin::<http_get_plugin::Plugin>(Default::default()).await?,
      );
    }

    // We want to make sure to register this one last, in order to ensure it's setting the value correctly
    for p in PluginManager::default_plugins() {
      instance.register_boxed_plugin(p);
    }

    Ok(instance)
  }

  fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(MatchContentTypePlugin {})]
  }

  pub fn register_boxed_plugin(&mut self, plugin: Box<dyn Plugin>) {
    self.plugins.push(plugin);
  }

  pub fn len(&self) -> usize {
    self.plugins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.plugins.is_empty()
  }

  #[tracing::instrument(level = "debug", skip(self, context))]
  pub async fn on_downstream_http_request(&self, context: &mut RequestExecutionContext) {
    for plugin in self.plugins.iter() {
      plugin.on_downstream_http_request(context).await;

      if context.is_short_circuit() {
        return;
      }
    }
  }

  #[tracing::instrument(level = "debug", skip(self, context, response))]
  pub fn on_downstream_http_response(
    &self,
    context: &mut RequestExecutionContext,
    response: &mut GatewayHttpResponse,
  ) {
    for plugin in self.plugins.iter() {
      plugin.on_downstream_http_response(context, response);
    }
  }

  #[tracing::instrument(level = "debug", skip(self, context))]
  pub async fn on_downstream_graphql_request(&self, context: &mut RequestExecutionContext) {
    for plugin in self.plugins.iter() {
      plugin.on_downstream_graphql_request(context).await;

      if context.is_short_circuit() {
        return;
      }
    }
  }

  #[tracing::instrument(level = "debug", skip(self, req))]
  pub async fn on_upstream_graphql_request(&self, req: &mut GraphQLRequest) {
    for plugin in self.plugins.iter() {
      plugin.on_upstream_graphql_request(req).await;
    }
  }
}
