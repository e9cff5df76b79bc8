// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Developer CLI for register rules
//!
//! Loads resources from a JSON file (a Bundle or an array of resources) into
//! an in-memory store and evaluates a register row or a profile against it.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use octofhir_resource_rules::{
    EngineConfig, FhirResourceConfig, InMemoryResourceStore, ResourceDataLoader, ResourceStore,
    RuleConfig, RuleSet, ViewProperties, parse_rule_expression,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "resource-rules")]
#[command(about = "Evaluate register and profile rules against FHIR resources")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Log debug output (missing bindings, rule trace)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// JSON file with the resources (Bundle or array)
    #[arg(short, long)]
    store: PathBuf,
    /// JSON file with the fetch configuration
    #[arg(short, long)]
    config: PathBuf,
    /// JSON file with the rule list
    #[arg(short, long)]
    rules: Option<PathBuf>,
    /// Extra parameter as key=value, repeatable
    #[arg(short = 'P', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Fixed current date (YYYY-MM-DD)
    #[arg(long)]
    today: Option<NaiveDate>,
    /// Store call timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Pretty-print JSON output
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate register rows, one per resource of the base type or the given ids
    Register {
        #[command(flatten)]
        engine: EngineArgs,
        /// Root ids; all resources of the base type when omitted
        ids: Vec<String>,
    },
    /// Evaluate a profile with its secondary data and lists
    Profile {
        #[command(flatten)]
        engine: EngineArgs,
        /// Root resource id
        id: String,
        /// JSON file with secondary fetch configurations
        #[arg(long)]
        secondary: Option<PathBuf>,
        /// JSON file with the view tree
        #[arg(long)]
        views: Option<PathBuf>,
    },
    /// Parse a rule expression and print its syntax tree
    Parse {
        /// Rule expression
        expression: String,
    },
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Parse { expression } => {
            let ast = parse_rule_expression(&expression)
                .with_context(|| format!("Failed to parse '{expression}'"))?;
            println!("{ast:#?}");
            Ok(())
        }
        Commands::Register { engine, ids } => run(handle_register(engine, ids)),
        Commands::Profile {
            engine,
            id,
            secondary,
            views,
        } => run(handle_profile(engine, id, secondary, views)),
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run(task: impl Future<Output = Result<String>>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let output = runtime.block_on(task)?;
    println!("{output}");
    Ok(())
}

struct Engine {
    store: Arc<InMemoryResourceStore>,
    loader: ResourceDataLoader,
    config: FhirResourceConfig,
    rules: RuleSet,
    params: HashMap<String, String>,
    pretty: bool,
}

impl Engine {
    fn load(args: EngineArgs) -> Result<Self> {
        let json: serde_json::Value = read_json(&args.store)?;
        let store = Arc::new(InMemoryResourceStore::from_json(json)?);
        log::info!("Loaded {} resources from {}", store.len(), args.store.display());

        let mut config = EngineConfig::builder().with_query_timeout(Duration::from_secs(args.timeout));
        if let Some(today) = args.today {
            config = config.with_today(today);
        }

        let rules: Vec<RuleConfig> = match &args.rules {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };

        Ok(Self {
            loader: ResourceDataLoader::new(store.clone(), config.build()),
            store,
            config: read_json(&args.config)?,
            rules: RuleSet::compile(&rules),
            params: args.params.into_iter().collect(),
            pretty: args.pretty,
        })
    }

    fn render(&self, value: &impl serde::Serialize) -> Result<String> {
        let output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(output)
    }
}

async fn handle_register(args: EngineArgs, ids: Vec<String>) -> Result<String> {
    let engine = Engine::load(args)?;
    let resource_type = &engine.config.base_resource.resource_type;

    let roots = if ids.is_empty() {
        engine
            .loader
            .fetcher()
            .search_roots(&engine.config.base_resource, &Default::default())
            .await?
    } else {
        let mut roots = Vec::with_capacity(ids.len());
        for id in &ids {
            match engine.store.get(resource_type, id).await? {
                Some(root) => roots.push(root),
                None => bail!("{resource_type}/{id} not found"),
            }
        }
        roots
    };

    let page = engine
        .loader
        .load_page(roots, &engine.config, &engine.rules, &engine.params)
        .await?;
    engine.render(&page)
}

async fn handle_profile(
    args: EngineArgs,
    id: String,
    secondary: Option<PathBuf>,
    views: Option<PathBuf>,
) -> Result<String> {
    let engine = Engine::load(args)?;
    let secondary: Vec<FhirResourceConfig> = match &secondary {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let views: Vec<ViewProperties> = match &views {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let profile = engine
        .loader
        .load_profile(
            &engine.config.base_resource.resource_type,
            &id,
            &engine.config,
            &secondary,
            &engine.rules,
            &views,
            &engine.params,
        )
        .await?;
    engine.render(&profile)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Error reading file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Error parsing JSON in '{}'", path.display()))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
