use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use svcreg_model::{NamespaceStore, TABLE_NAMESPACE};
use svcreg_store::{BucketStore, RecordStore, StoreConfig};

use crate::cli::*;
use crate::render;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store = open_store(&cli)?;
    match cli.command {
        Command::Types => cmd_types(&store, cli.format),
        Command::Count(args) => cmd_count(&store, args, cli.format),
        Command::Keys(args) => cmd_keys(&store, args, cli.format),
        Command::Dump(args) => cmd_dump(&store, args, cli.format),
        Command::Init => cmd_init(store, cli.format),
    }
}

fn store_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = StoreConfig::default();
    if let Some(file) = &cli.config {
        config = StoreConfig::load(file)
            .with_context(|| format!("reading config {}", file.display()))?;
    }
    if let Some(path) = &cli.path {
        config.path = path.clone();
    }
    Ok(config)
}

fn open_store(cli: &Cli) -> anyhow::Result<BucketStore> {
    let config = store_config(cli)?;
    let path = config.path.clone();
    BucketStore::open(config).with_context(|| format!("opening store {}", path.display()))
}

fn cmd_types(store: &BucketStore, format: OutputFormat) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for typ in store.list_types()? {
        let count = store.count_values(&typ)?;
        rows.push((typ, count));
    }
    match format {
        OutputFormat::Json => {
            let out: serde_json::Map<String, serde_json::Value> =
                rows.into_iter().map(|(t, c)| (t, json!(c))).collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No record types in {}.", store.path().display());
            }
            for (typ, count) in rows {
                println!("{:<24} {}", typ.cyan(), count.to_string().bold());
            }
        }
    }
    Ok(())
}

fn cmd_count(store: &BucketStore, args: TypeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let count = store.count_values(&args.typ)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "type": args.typ, "count": count })),
        OutputFormat::Text => println!("{}", count),
    }
    Ok(())
}

fn cmd_keys(store: &BucketStore, args: TypeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = store.record_keys(&args.typ)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
        OutputFormat::Text => {
            for key in keys {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn cmd_dump(store: &BucketStore, args: DumpArgs, format: OutputFormat) -> anyhow::Result<()> {
    let keys = if args.keys.is_empty() {
        store.record_keys(&args.typ)?
    } else {
        args.keys
    };

    let mut records = Vec::new();
    for key in keys {
        match store.raw_record(&args.typ, &key)? {
            Some(record) => records.push((key, record)),
            None => {
                if format == OutputFormat::Text {
                    println!("{} {}", "missing:".yellow(), key);
                }
            }
        }
    }

    match format {
        OutputFormat::Json => {
            let out: serde_json::Map<String, serde_json::Value> = records
                .iter()
                .map(|(key, record)| (key.clone(), render::record_json(record)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for (key, record) in &records {
                println!("{} {}", args.typ.cyan(), key.bold());
                for (field, view) in render::field_views(record) {
                    println!("  {:<20} {}", field, render::text(&view));
                }
            }
        }
    }
    Ok(())
}

fn cmd_init(store: BucketStore, format: OutputFormat) -> anyhow::Result<()> {
    let namespaces = NamespaceStore::new(Arc::new(store));
    namespaces.init_data()?;
    let count = namespaces.store().count_values(TABLE_NAMESPACE)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "namespaces": count })),
        OutputFormat::Text => println!(
            "{} Initialized built-in namespaces ({} namespaces)",
            "✓".green().bold(),
            count
        ),
    }
    Ok(())
}
