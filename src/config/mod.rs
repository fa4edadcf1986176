mod settings;

pub use settings::{
    default_indicator_endpoint, IndicatorConfig, OtelConfig, ServerConfig, Settings,
    WebSocketConfig,
};
