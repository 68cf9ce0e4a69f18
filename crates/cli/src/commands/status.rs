//! `loreloom status` — Show configuration status.

use loreloom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🧵 Loreloom Status");
    println!("==================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Data dir:       {}", config.data_dir.display());
    println!("  Router id:      {}", config.router_id);
    println!("  Default view:   {}", config.pipeline.default_view);
    println!("  Macro timeout:  {}s", config.pipeline.macro_timeout_secs);
    println!("  Delta cache:    {} entries, {}s TTL", config.delta.capacity, config.delta.ttl_secs);
    println!("  Model:          {}", config.llm.model);
    println!("  Temperature:    {}", config.llm.temperature);
    println!(
        "  API key:        {}",
        if config.has_api_key() { "configured" } else { "not set" }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `loreloom onboard` first");
    }

    Ok(())
}
