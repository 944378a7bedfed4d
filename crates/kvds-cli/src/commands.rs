use anyhow::{bail, Context};
use colored::Colorize;
use kvds_datastore::{default_scopes, DataStore, KvDataStore, ScopesConfig, StoreRegistry};
use kvds_types::{key, DataScope, KvObject, Record};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::*;

/// A record as shown to the user.
#[derive(Debug, PartialEq, Serialize)]
pub struct RecordView {
    pub key: String,
    pub index: u64,
    pub data: Value,
}

impl RecordView {
    fn of(record: &Record) -> Self {
        Self {
            key: key(&record.key()),
            index: record.index(),
            data: record.data().clone(),
        }
    }
}

/// Result of one command, rendered by [`render`].
#[derive(Debug)]
pub enum Output {
    Record(RecordView),
    Records(Vec<RecordView>),
    Stored(RecordView),
    Deleted(String),
    Scopes(ScopesConfig),
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let output = execute(cli).await?;
    render(&output, format)
}

fn load_scopes(cli: &Cli) -> anyhow::Result<ScopesConfig> {
    let defaults = default_scopes(cli.data_dir.clone().unwrap_or_default());
    let Some(path) = &cli.config else {
        return Ok(defaults);
    };
    let mut scopes = ScopesConfig::from_file(path)
        .with_context(|| format!("loading scope configuration {}", path.display()))?;
    scopes.merge_defaults(defaults);
    Ok(scopes)
}

async fn open(cli: &Cli, scopes: &ScopesConfig) -> anyhow::Result<KvDataStore> {
    let Some(cfg) = scopes.get(cli.scope) else {
        bail!("scope {} is not configured", cli.scope);
    };
    debug!(scope = %cli.scope, provider = %cfg.client.provider, address = %cfg.client.address, "opening store");
    let ds = StoreRegistry::global()
        .acquire(cli.scope, cfg)
        .await
        .with_context(|| format!("opening {} store", cli.scope))?;
    Ok(ds)
}

fn record_at(scope: DataScope, segments: &[String]) -> anyhow::Result<Record> {
    Record::from_segments(scope, segments).context("a key needs at least one segment")
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn execute(cli: Cli) -> anyhow::Result<Output> {
    let scopes = load_scopes(&cli)?;
    if matches!(cli.command, Command::Scopes) {
        return Ok(Output::Scopes(scopes));
    }

    let ds = open(&cli, &scopes).await?;
    let output = store_command(&cli, &ds).await;
    ds.close();
    output
}

async fn store_command(cli: &Cli, ds: &KvDataStore) -> anyhow::Result<Output> {
    let output = match &cli.command {
        Command::Get(args) => {
            let mut record = record_at(cli.scope, &args.segments)?;
            ds.get(&key(&args.segments), &mut record).await?;
            Output::Record(RecordView::of(&record))
        }
        Command::Put(args) => {
            let mut record = record_at(cli.scope, &args.segments)?;
            record.set_data(parse_value(&args.value));
            if args.atomic {
                record.set_index(args.index.unwrap_or(0));
                ds.put_atomic(&mut record).await?;
            } else {
                ds.put(&record).await?;
            }
            Output::Stored(RecordView::of(&record))
        }
        Command::Delete(args) => {
            let mut record = record_at(cli.scope, &args.segments)?;
            match args.index.filter(|_| args.atomic) {
                Some(index) => {
                    record.set_index(index);
                    ds.delete_atomic(&record).await?;
                }
                None => ds.delete(&record).await?,
            }
            Output::Deleted(key(&args.segments))
        }
        Command::List(args) => {
            let sample = Record::template(cli.scope, args.segments.clone());
            let mut views = Vec::new();
            for object in ds.list(&key(&args.segments), &sample).await? {
                if let Some(record) = object.downcast_ref::<Record>() {
                    views.push(RecordView::of(record));
                }
            }
            Output::Records(views)
        }
        Command::Scopes => bail!("scopes does not operate on a store"),
    };
    Ok(output)
}

pub fn render(output: &Output, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let json = match output {
            Output::Record(view) | Output::Stored(view) => serde_json::to_string_pretty(view)?,
            Output::Records(views) => serde_json::to_string_pretty(views)?,
            Output::Deleted(key) => serde_json::to_string_pretty(&serde_json::json!({ "deleted": key }))?,
            Output::Scopes(scopes) => serde_json::to_string_pretty(scopes)?,
        };
        println!("{json}");
        return Ok(());
    }

    match output {
        Output::Record(view) => print_record(view),
        Output::Records(views) if views.is_empty() => println!("No records."),
        Output::Records(views) => views.iter().for_each(print_record),
        Output::Stored(view) => println!(
            "{} Stored {} at index {}",
            "✓".green().bold(),
            view.key.bold(),
            view.index.to_string().yellow()
        ),
        Output::Deleted(key) => println!("{} Deleted {}", "✓".green().bold(), key.bold()),
        Output::Scopes(scopes) => {
            for (scope, cfg) in scopes.iter() {
                let kind = if cfg.embedded { "embedded" } else { "client" };
                println!(
                    "{:<8} {} {} ({})",
                    scope.to_string().bold(),
                    cfg.client.provider.cyan(),
                    cfg.client.address,
                    kind.dimmed()
                );
            }
        }
    }
    Ok(())
}

fn print_record(view: &RecordView) {
    println!("{}  {}  {}", view.key.bold(), format!("#{}", view.index).yellow(), view.data);
}
