//! The `serve` built-in: mount every APIEndpoint extension over HTTP.
//!
//! The core stays synchronous; this command is the only place a tokio
//! runtime exists. The router is assembled once from the instantiated
//! endpoint trees and served until the process is stopped.

use std::net::SocketAddr;

use anyhow::Context;

use steward_kit::{
    Extension, ExtensionPoint, ExtensionRegistry, Node, Outcome, Parameter, RegistryError, Services,
};

const DEFAULT_BIND: &str = "127.0.0.1:8674";

/// Instantiates the registered endpoints and registers the `serve`
/// command over the resulting router.
pub fn register(
    registry: &mut ExtensionRegistry,
    services: &Services,
) -> Result<(), RegistryError> {
    let endpoints: Vec<(String, Node)> = registry
        .get_extensions_for(ExtensionPoint::ApiEndpoint, services)
        .into_iter()
        .filter_map(|(name, extension)| extension.into_applet().map(|node| (name, node)))
        .collect();
    let router = steward_server::build_router(endpoints);

    registry.register_extension_class(
        ExtensionPoint::Command,
        "serve",
        Box::new(move |_services| {
            let router = router.clone();
            Ok(Extension::Applet(
                Node::new("Serve the HTTP API")
                    .parameter(
                        Parameter::new("bind")?
                            .default_value(DEFAULT_BIND)
                            .help("Address to listen on"),
                    )?
                    .handler(move |params| {
                        let bind = params
                            .get("bind")
                            .and_then(|value| value.as_str())
                            .unwrap_or(DEFAULT_BIND);
                        let addr: SocketAddr = bind
                            .parse()
                            .with_context(|| format!("invalid bind address {bind:?}"))?;
                        let runtime = tokio::runtime::Builder::new_multi_thread()
                            .enable_all()
                            .build()?;
                        runtime.block_on(steward_server::serve(addr, router.clone()))?;
                        Ok(Outcome::None)
                    }),
            ))
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use steward_kit::{DiskCache, Store};

    #[test]
    fn serve_command_rejects_malformed_bind_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services::new(
            Arc::new(Store::new()),
            Arc::new(DiskCache::new(dir.path().join("cache"))),
        );

        let mut registry = ExtensionRegistry::new();
        registry
            .register_extension_point(ExtensionPoint::Command)
            .unwrap();
        registry
            .register_extension_point(ExtensionPoint::ApiEndpoint)
            .unwrap();
        register(&mut registry, &services).unwrap();

        let node = registry
            .get_extension(ExtensionPoint::Command, "serve", &services)
            .unwrap()
            .into_applet()
            .unwrap();

        let raw: serde_json::Map<String, serde_json::Value> =
            [("bind".to_owned(), serde_json::json!("not-an-address"))]
                .into_iter()
                .collect();
        assert!(node.dispatch(&[], &raw).is_err());
    }
}
