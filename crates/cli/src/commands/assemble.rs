//! `contextloom assemble` — Assemble one context against fixture data.

use std::path::PathBuf;
use std::sync::Arc;

use contextloom_assembly::{AssemblyRequest, ContextAssembler};
use contextloom_config::EngineConfig;
use contextloom_core::context::{AssembledContext, Severity};
use contextloom_core::query::{Intent, Query, ScopeMode};
use contextloom_security::{AuditLogger, AuditSink};
use contextloom_stores::Fixture;
use contextloom_telemetry::TelemetryEngine;

pub struct AssembleOptions {
    pub fixture: PathBuf,
    pub query: String,
    pub scope: ScopeMode,
    pub entity: Option<String>,
    pub intent: String,
    pub tenant: Option<String>,
    pub user: String,
    pub budget: usize,
    pub json: bool,
    pub config: Option<PathBuf>,
}

pub async fn run(options: AssembleOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &options.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    let fixture = Fixture::load(&options.fixture)?;
    let backends = fixture.into_backends(config.quality.clone()).await;
    let tenant_id = options.tenant.unwrap_or_else(|| backends.tenant_id.clone());

    let telemetry = Arc::new(TelemetryEngine::with_tracing());
    let audit_sinks: Vec<Box<dyn AuditSink>> = vec![Box::new(contextloom_security::TracingSink)];
    let audit = Arc::new(AuditLogger::with_sinks(audit_sinks));

    let assembler = ContextAssembler::builder(backends.entity_store.clone())
        .semantic_search(backends.semantic.clone())
        .keyword_search(backends.keyword.clone())
        .access_control(backends.access.clone())
        .quality_assessor(backends.quality.clone())
        .cache(backends.cache.clone())
        .sink(telemetry.clone())
        .audit(audit.clone())
        .config(config)
        .build();

    let query = Query::new(options.query, options.budget).scoped(options.scope, options.entity);
    let request = AssemblyRequest::new(tenant_id, options.user, query, Intent::new(options.intent, 1.0));
    let context = assembler.assemble(&request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        print_text(&context);
        let summary = telemetry.summary();
        println!(
            "  Events:    {} recorded, {} exception(s), {} audit entr(ies)",
            summary.total_events,
            summary.total_exceptions,
            audit.count()
        );
    }

    Ok(())
}

fn print_text(context: &AssembledContext) {
    if context.formatted_text.is_empty() {
        println!("(empty context)");
    } else {
        println!("{}", context.formatted_text);
    }
    println!("──────────────────────────────────────────");

    let primary = if context.primary_entity.is_absent() {
        "(none)"
    } else {
        context.primary_entity.identifier.as_str()
    };
    let meta = &context.metadata;
    println!("  Primary:   {primary}");
    println!("  Related:   {}", context.related_entities.len());
    println!(
        "  Chunks:    {} via {:?} (cache {:?})",
        context.rag_chunks.len(),
        meta.retrieval_method,
        meta.cache_status
    );
    if let Some(info) = &context.truncation_info {
        println!(
            "  Budget:    {} of {} source(s) excluded ({:.1}% of tokens)",
            info.excluded_sources, info.total_sources, info.truncation_percentage
        );
    }
    if let Some(metrics) = &context.quality_metrics {
        println!(
            "  Quality:   {:.2} ({} source(s), avg relevance {:.2}, requirements {})",
            metrics.quality_score,
            metrics.source_count,
            metrics.average_relevance,
            if metrics.meets_minimum_requirements { "met" } else { "not met" }
        );
    }
    if !meta.degraded.is_empty() {
        println!("  Degraded:  {}", meta.degraded.join(", "));
    }
    for warning in &context.warnings {
        let level = match warning.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        match &warning.suggestion {
            Some(suggestion) => println!("  [{level}] {}: {} ({suggestion})", warning.kind, warning.message),
            None => println!("  [{level}] {}: {}", warning.kind, warning.message),
        }
    }
    println!("  Took:      {}ms", meta.duration_ms);
}
