//! `contextloom config` — Configuration management commands.

use std::path::PathBuf;

use contextloom_config::EngineConfig;

pub async fn show(defaults: bool) -> Result<(), Box<dyn std::error::Error>> {
    if defaults {
        println!("{}", EngineConfig::default_toml());
        return Ok(());
    }
    let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn validate(file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = file.unwrap_or_else(|| EngineConfig::config_dir().join("config.toml"));
    println!("Validating {}", path.display());

    match EngineConfig::load_from(&path) {
        Ok(config) => {
            println!("  ok: config parsed and validated");
            println!();
            println!(
                "  Retrieval:  global top_k={} min_score={:.2}, fallback below {:.0}% of top_k",
                config.retrieval.global.top_k,
                config.retrieval.global.min_score,
                config.retrieval.fallback_ratio * 100.0
            );
            println!(
                "  Budget:     {} tokens, {} reserved, linked eviction {:?}",
                config.budget.default_max_tokens,
                config.budget.wrapper_overhead,
                config.budget.linked_eviction
            );
            println!("  Access:     on error {:?}", config.access.on_error);
            println!(
                "  Cache:      {} (stale after {}s, ttl {}s)",
                if config.cache.enabled { "enabled" } else { "disabled" },
                config.cache.staleness_secs,
                config.cache.ttl_secs
            );
            println!(
                "  Quality:    {} intent requirement(s), low relevance below {:.2}",
                config.quality.requirements.len(),
                config.quality.low_relevance_threshold
            );
        }
        Err(e) => {
            println!("  error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = EngineConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
