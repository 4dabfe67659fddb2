use anyhow::{Context, Result};
use medical_report_core::{
    ApiKeyResolver, AppConfig, Document, DocumentLocation, DocumentStore, ExtractionOrchestrator,
    HttpFetcher, ImageDescriber, InMemoryStore, ModelFactory, ModelSource, PdfTextExtractor,
};
use std::env;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <file_path> [pdf|image]", args[0]);
        eprintln!("Example: {} /path/to/lab_results.pdf", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let source_type = match args.get(2) {
        Some(label) => label.clone(),
        None => guess_type(path).to_string(),
    };

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut document = Document::new(
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| args[1].clone()),
        &source_type,
        "",
    );
    document.location = DocumentLocation::inline(None, &bytes);

    let keys = Arc::new(ApiKeyResolver::new(
        config.model.provider,
        config.default_api_key.clone(),
    ));
    let models = ModelFactory::new(config.model.clone(), keys)?;
    let store = Arc::new(InMemoryStore::new());
    store.insert_document(&document).await?;

    let orchestrator = ExtractionOrchestrator::new(
        store,
        Arc::new(PdfTextExtractor::new(Arc::new(HttpFetcher::new(
            models.http_client(),
        )))),
        Arc::new(ImageDescriber::new(
            models.model_for(None, None),
            models.names().vision.clone(),
        )),
    );

    println!("Processing {} as {}", document.name, document.source_type);
    println!("File size: {} bytes", bytes.len());
    println!();

    let result = orchestrator.extract(&mut document, true).await?;

    println!("Extracted {} characters", result.text.chars().count());
    println!("────────────────────────────────────");
    println!("{}", result.text);
    println!("────────────────────────────────────");

    Ok(())
}

fn guess_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "pdf",
        _ => "image",
    }
}
