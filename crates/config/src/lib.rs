pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    env_subst::substitute_env,
    loader::{discover_and_load, env_layer, load_config, load_with_env},
    schema::{ClientSettings, OidcConfig},
};
