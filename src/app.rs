use crate::errors::ToolError;
use crate::managers::engine::{EngineConfig, ExecutionEngine};
use crate::services::auth::{
    CommandTokenSource, CredentialManager, OAuth2TokenSource, StaticTokenSource, TokenSource,
};
use crate::services::endpoints::EndpointStore;
use crate::services::logger::Logger;
use crate::services::schema_registry::SchemaRegistry;
use crate::services::settings::{Settings, TokenSourceConfig};
use crate::services::transport::{ReqwestTransport, Transport};
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub settings: Settings,
    pub engine: Arc<ExecutionEngine>,
}

impl App {
    pub fn initialize() -> Result<Self, ToolError> {
        let settings = Settings::from_env()?;
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Result<Self, ToolError> {
        let logger = Logger::new("apibridge");
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
            settings.timeout,
            settings.max_response_bytes,
            logger.clone(),
        )?);
        Self::with_transport(settings, transport, logger)
    }

    /// Wiring with an injected transport; tests pass a fake here.
    pub fn with_transport(
        settings: Settings,
        transport: Arc<dyn Transport>,
        logger: Logger,
    ) -> Result<Self, ToolError> {
        let endpoints = EndpointStore::load(&settings.endpoints_path)?.filtered(&settings.filter);
        let schemas = SchemaRegistry::load(&settings.schemas_path)?;

        let source: Arc<dyn TokenSource> = match &settings.token_source {
            TokenSourceConfig::Static(token) => Arc::new(StaticTokenSource::new(token.clone())),
            TokenSourceConfig::OAuth2(config) => {
                Arc::new(OAuth2TokenSource::new(config.clone(), transport.clone()))
            }
            TokenSourceConfig::Command(config) => Arc::new(CommandTokenSource::new(config.clone())),
        };
        let auth = Arc::new(CredentialManager::new(
            source,
            settings.expiry_margin,
            logger.clone(),
        ));

        let tool_count = endpoints.len();
        let engine = ExecutionEngine::new(
            endpoints,
            schemas,
            auth,
            transport,
            EngineConfig {
                base_url: settings.base_url.clone(),
                max_pages: settings.max_pages,
            },
            &logger,
        )?;

        logger.info(
            "Bridge initialized",
            Some(&serde_json::json!({
                "base_url": settings.base_url.as_str(),
                "tools": tool_count,
                "token_source": settings.token_source.kind(),
                "read_only": settings.filter.read_only,
                "max_pages": settings.max_pages,
            })),
        );

        Ok(Self {
            logger,
            settings,
            engine: Arc::new(engine),
        })
    }
}
