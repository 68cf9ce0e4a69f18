//! `loreloom scan` — List asset files of one kind.

use loreloom_config::AppConfig;
use loreloom_core::store::AssetKind;

fn parse_kind(s: &str) -> Result<AssetKind, String> {
    match s {
        "preset" | "presets" => Ok(AssetKind::Preset),
        "character" | "characters" => Ok(AssetKind::Character),
        "persona" | "personas" => Ok(AssetKind::Persona),
        "world_book" | "world_books" => Ok(AssetKind::WorldBook),
        "regex_rules" => Ok(AssetKind::RegexRules),
        other => Err(format!(
            "unknown asset kind '{other}' (expected preset, character, persona, world_book, or regex_rules)"
        )),
    }
}

pub async fn run(kind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let kind = parse_kind(kind)?;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orchestrator = super::route::build_orchestrator(&config);

    let entries = orchestrator.scan_assets(kind).await;
    if entries.is_empty() {
        println!("No files found.");
        return Ok(());
    }
    for entry in entries {
        match &entry.error {
            None => println!("  ✅ {}", entry.file),
            Some(error) => println!("  ⚠️  {} — {error}", entry.file),
        }
    }
    Ok(())
}
