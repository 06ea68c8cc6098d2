//! Helpers for tests that need a real, migrated database or a stand-in payment provider.
pub mod fake_provider;
pub mod prepare_env;
