use anyhow::{Context, Result};
use model_assets::envconfig::AssetConfig;
use model_assets::format::{human_age, human_bytes};
use model_assets::infra::{HttpFetcher, ModelDb, Origin};
use model_assets::progress::PullBar;
use model_assets::{AssetStore, AvailableModel, ModelBundle};
use std::sync::Arc;

pub async fn pull(model: AvailableModel) -> Result<()> {
    let config = AssetConfig::from_env();
    let db = ModelDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let origin = Origin::new(HttpFetcher::new(config.timeout)?, &config.remote_url)?;

    let bar = Arc::new(PullBar::new(model.as_str()));
    let events = Arc::clone(&bar);
    let fetcher = config
        .bundle_fetcher(db.clone(), origin)
        .on_progress(move |event| events.handle(event));
    let store = AssetStore::with_fetcher(db, fetcher);

    let result = store.get_components(model).await;
    bar.clear();
    let bundle = result.with_context(|| format!("pulling {}", model))?;

    print_bundle(&bundle);
    Ok(())
}

pub async fn list() -> Result<()> {
    let config = AssetConfig::from_env();
    let db = ModelDb::open(&config.db_path).await?;
    let entries = db.index().list().await?;

    if entries.is_empty() {
        println!("No cached models in {}", config.db_path.display());
        return Ok(());
    }

    println!("{:<16} {:<38} {}", "NAME", "BUNDLE", "REGISTERED");
    for entry in entries {
        println!(
            "{:<16} {:<38} {}",
            entry.model,
            entry.bundle_id,
            human_age(&entry.registered_at, "unknown")
        );
    }

    let tensors = db.tensors();
    println!(
        "\n{} tensors, {} on disk",
        tensors.count().await?,
        human_bytes(tensors.total_bytes().await?)
    );
    Ok(())
}

pub async fn show(model: AvailableModel) -> Result<()> {
    let config = AssetConfig::from_env();
    let store = config.open_store().await?;

    match store.cached_components(model).await? {
        Some(bundle) => print_bundle(&bundle),
        None => println!("{} is not cached, run `model-assets pull {}`", model, model),
    }
    Ok(())
}

fn print_bundle(bundle: &ModelBundle) {
    println!("{} ({})", bundle.model, bundle.bundle_id);
    for (index, component) in bundle.components.iter().enumerate() {
        println!(
            "  [{}] {:<12} definition {:>8}  {:>4} tensors {:>8}",
            index,
            component.name,
            human_bytes(component.definition.len() as u64),
            component.tensors.len(),
            human_bytes(component.tensor_bytes())
        );
    }
    println!(
        "  config {}, tokenizer {}, total {}",
        human_bytes(bundle.config.len() as u64),
        human_bytes(bundle.tokenizer.len() as u64),
        human_bytes(bundle.total_bytes())
    );
}
