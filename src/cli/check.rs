//! `ailb check`

use crate::loader::load_route;
use ailb_core::RoutingConfig;
use anyhow::Context;
use std::path::Path;

pub fn run(route: &Path) -> anyhow::Result<()> {
    let raw = load_route(route)?;
    let config = RoutingConfig::from_raw(raw).context("Invalid route configuration")?;

    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Some(store) = &config.store {
        eprintln!(
            "✅ {} provider(s), metrics from {}:{}{}",
            config.providers.len(),
            store.service_name,
            store.service_port,
            if store.password.is_some() {
                " (password set)"
            } else {
                ""
            }
        );
    }
    if config.rewrite.is_some() && !config.rewrites_body() {
        eprintln!("⚠️  Body rewrite is configured but no provider has a model");
    }
    Ok(())
}
