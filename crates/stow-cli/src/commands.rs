use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::Colorize;
use serde_json::Value;
use stow_model::{IdentityScope, ModelType, Presence, Record, StowConfig};
use stow_store::{AdapterRegistry, InMemoryStore, MemoryClient, StoreSpec};
use stow_types::attributes::to_object;
use tracing::info;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Bench(args) => cmd_bench(&config, args),
        Command::Demo(args) => cmd_demo(&config, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StowConfig> {
    match path {
        Some(path) => StowConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(StowConfig::default()),
    }
}

/// Memory store over `client`, honouring a configured `namespace` option.
fn memory_store(config: &StowConfig, client: &MemoryClient) -> InMemoryStore {
    let store = InMemoryStore::with_client(client.clone());
    let namespace = config
        .store
        .as_ref()
        .and_then(|settings| settings.options.get("namespace"))
        .and_then(Value::as_str);
    match namespace {
        Some(ns) => store.namespaced(ns),
        None => store,
    }
}

fn store_spec(config: &StowConfig, client: &MemoryClient) -> StoreSpec {
    match config.store {
        Some(_) => config.store_spec(Arc::new(client.clone())),
        None => StoreSpec::memory(client.clone()),
    }
}

fn cmd_bench(config: &StowConfig, args: BenchArgs) -> anyhow::Result<()> {
    let client = MemoryClient::new();
    let store = Arc::new(memory_store(config, &client));
    let user = ModelType::builder("User", config)
        .attribute("name")
        .store(store.clone())
        .identity_map(args.identity_map)
        .build()?;

    let mut scope = IdentityScope::new();
    let record = user.create(&mut scope, stow_types::attributes! { "name" => "John" })?;
    let id = record.id().context("created user has no id")?;
    let raw_key = store.key_for(&id);
    info!(key = %id, times = args.times, identity_map = args.identity_map, "bench started");

    let started = Instant::now();
    for _ in 0..args.times {
        let bytes = client.get(&raw_key)?.context("user vanished from the store")?;
        black_box(store.decode(&bytes)?);
    }
    let client_time = started.elapsed();

    let started = Instant::now();
    for _ in 0..args.times {
        black_box(user.get(&mut scope, id.clone())?);
    }
    let model_time = started.elapsed();

    println!("{} {} reads of {}", "Bench".bold(), args.times, id.to_string().yellow());
    println!(
        "  identity map: {}",
        if args.identity_map { "on".green() } else { "off".red() }
    );
    println!("  {:<8} {}", "Client".cyan(), format_duration(client_time));
    println!("  {:<8} {}", "Stow".cyan(), format_duration(model_time));
    println!("  {:<8} {:.2}", "Ratio".cyan(), ratio(model_time, client_time));
    Ok(())
}

fn cmd_demo(config: &StowConfig, args: DemoArgs) -> anyhow::Result<()> {
    let client = MemoryClient::new();
    let registry = AdapterRegistry::default();
    let spec = store_spec(config, &client);

    let user = ModelType::builder("User", config).attribute("name").build()?;
    let post = ModelType::builder("Post", config).attribute("title").build()?;
    user.use_store(&registry, &spec)?;
    post.use_store(&registry, &spec)?;
    user.validate(Presence::of("name"));
    post.reference("user", &user);

    let mut scope = IdentityScope::new();
    let author = user.create_strict(&mut scope, stow_types::attributes! { "name" => args.name })?;
    let entry = post.build(stow_types::attributes! { "title" => args.title })?;
    entry.association("user")?.set(Some(&author))?;
    entry.save_strict(&mut scope)?;
    println!("{} Created {} and {}", "✓".green().bold(), describe(&author), describe(&entry));

    // A fresh scope reads everything back from the store.
    scope.clear();
    let post_id = entry.id().context("saved post has no id")?;
    let loaded = post
        .get(&mut scope, post_id)?
        .context("post missing after save")?;
    let loaded_author = loaded
        .association("user")?
        .get(&mut scope)?
        .context("post lost its author")?;

    println!("\n{}", "Post".bold());
    print_record(&loaded)?;
    println!("{}", "User".bold());
    print_record(&loaded_author)?;
    println!(
        "{} entries in store, {} records in scope",
        client.len().to_string().bold(),
        scope.len().to_string().bold()
    );
    Ok(())
}

fn describe(record: &Record) -> String {
    let id = record.id().map(|id| id.to_string()).unwrap_or_default();
    format!("{} {}", record.model_name().cyan(), id.yellow())
}

fn print_record(record: &Record) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&to_object(&record.attributes()))?;
    for line in json.lines() {
        println!("  {line}");
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}

fn ratio(model: Duration, client: Duration) -> f64 {
    model.as_secs_f64() / client.as_secs_f64().max(f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_never_divides_by_zero() {
        assert!(ratio(Duration::from_millis(2), Duration::ZERO).is_finite());
        assert_eq!(ratio(Duration::from_millis(4), Duration::from_millis(2)), 2.0);
    }

    #[test]
    fn namespace_option_reaches_memory_store() {
        let config = StowConfig::from_toml_str(
            "[store]\nadapter = \"memory\"\noptions = { namespace = \"bench\" }\n",
        )
        .unwrap();
        let store = memory_store(&config, &MemoryClient::new());
        assert!(store.key_for(&stow_types::Key::from("a")).starts_with("bench:"));
    }

    #[test]
    fn demo_runs_against_memory_store() {
        let args = DemoArgs {
            name: "John".into(),
            title: "Hello".into(),
        };
        cmd_demo(&StowConfig::default(), args).unwrap();
    }

    #[test]
    fn bench_runs_both_ways() {
        let config = StowConfig::default();
        cmd_bench(&config, BenchArgs { times: 3, identity_map: false }).unwrap();
        cmd_bench(&config, BenchArgs { times: 3, identity_map: true }).unwrap();
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/stow.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stow.toml"));
    }
}
