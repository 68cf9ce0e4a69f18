//! `loreloom route` — Run the pipeline for one conversation and print JSON.

use std::sync::Arc;
use std::time::Duration;

use loreloom_config::AppConfig;
use loreloom_core::message::View;
use loreloom_delta::DeltaCache;
use loreloom_macros::TemplateMacroEngine;
use loreloom_router::{OutputMode, RouteOrchestrator, RouteRequest};
use loreloom_store::FileStore;

pub struct RouteArgs {
    pub file: String,
    pub view: Option<String>,
    pub output: String,
    pub preset: Option<String>,
    pub character: Option<String>,
    pub persona: Option<String>,
    pub world_book: Option<String>,
    pub regex_rules: Option<String>,
}

fn parse_view(s: &str) -> Result<View, String> {
    match s {
        "user_view" => Ok(View::UserView),
        "assistant_view" => Ok(View::AssistantView),
        other => Err(format!(
            "unknown view '{other}' (expected user_view or assistant_view)"
        )),
    }
}

fn parse_output(s: &str) -> Result<OutputMode, String> {
    match s {
        "full" => Ok(OutputMode::Full),
        "history" => Ok(OutputMode::History),
        "delta" => Ok(OutputMode::Delta),
        other => Err(format!(
            "unknown output mode '{other}' (expected full, history, or delta)"
        )),
    }
}

pub fn build_orchestrator(config: &AppConfig) -> RouteOrchestrator {
    let store = Arc::new(FileStore::new(&config.data_dir));
    let default_view = match config.pipeline.default_view.as_str() {
        "user_view" => View::UserView,
        _ => View::AssistantView,
    };
    RouteOrchestrator::new(
        config.router_id.clone(),
        store.clone(),
        store,
        Arc::new(TemplateMacroEngine::new()),
    )
    .with_cache(Arc::new(DeltaCache::new(
        config.delta.capacity,
        Duration::from_secs(config.delta.ttl_secs),
    )))
    .with_macro_timeout(Duration::from_secs(config.pipeline.macro_timeout_secs))
    .with_default_view(default_view)
}

pub async fn run(args: RouteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orchestrator = build_orchestrator(&config);

    let mut request = RouteRequest::new(&args.file);
    request.view = args.view.as_deref().map(parse_view).transpose()?;
    request.output = parse_output(&args.output)?;
    request.preset = args.preset;
    request.character = args.character;
    request.persona = args.persona;
    request.world_book = args.world_book;
    request.regex_rules = args.regex_rules;

    match orchestrator.route(request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_body())?);
            Err(e.to_string().into())
        }
    }
}
