//! `loreloom onboard` — First-time setup.

use loreloom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🧵 Loreloom — First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !config_path.exists() {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created default config: {}", config_path.display());
    } else {
        println!("  Config file exists: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    for subdir in [
        "conversations",
        "presets",
        "characters",
        "personas",
        "world_books",
        "regex_rules",
    ] {
        let dir = config.data_dir.join(subdir);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
            println!("✅ Created {}", dir.display());
        }
    }

    println!("\nNext steps:");
    println!("  1. Drop a conversation file into {}", config.data_dir.join("conversations").display());
    println!("  2. Run `loreloom route <file>` to assemble a prompt");
    Ok(())
}
