//! `chiefops config`: configuration management commands.

use chiefops_config::AppConfig;

use super::{CmdResult, load_config};

pub async fn init(force: bool) -> CmdResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("  Config already exists: {}", config_path.display());
        println!("  Pass --force to overwrite.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", config_path.display());
    Ok(())
}

pub async fn show() -> CmdResult {
    let config = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    println!("# database: {}", config.storage.db_path().display());
    Ok(())
}

pub async fn path() -> CmdResult {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
