mod channel;
mod client;
#[allow(clippy::module_inception)]
mod intellifire;
mod poll;
mod registry;
mod session;
mod signing;
mod store;
mod unit;

use anyhow::Context;
use linkme::distributed_slice;

pub use intellifire::IntellifireIntegration;

use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_intellifire(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let config = if let Some(c) = &ctx.config.integrations.intellifire {
        c
    } else {
        return Ok(None);
    };

    let client = client::ReqwestClient::new().context("Failed to create HTTP client")?;
    Ok(Some(Box::new(IntellifireIntegration::new(client, config))))
}
