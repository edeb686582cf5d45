#[cfg(feature = "integration_intellifire")]
pub mod intellifire;
