use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

use super::options::TelemetryConfig;

/// Resource key for the service name.
pub const SERVICE_NAME: &str = "service.name";
/// Resource key for the deployment environment.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Builds the attribute set shared by the trace and metric pipelines.
pub fn build_resource(config: &TelemetryConfig) -> Resource {
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, config.service_name.clone()),
            KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.env.to_string()),
        ])
        .build()
}
