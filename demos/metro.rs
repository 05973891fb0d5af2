//! Runs one of the bundled scenes in a window.
//!
//! ```text
//! cargo run --example metro -- [dynamic-map|skinned-mesh]
//! ```

use mirror_ngin::{AppConfig, scenes};

fn main() -> anyhow::Result<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| scenes::SCENE_NAMES[0].to_string());
    let Some(script) = scenes::by_name(&name) else {
        anyhow::bail!("unknown scene `{name}`, expected one of {:?}", scenes::SCENE_NAMES);
    };
    let config = AppConfig {
        title: format!("mirror-ngin: {name}"),
        ..AppConfig::default()
    };
    mirror_ngin::run(config, script)
}
