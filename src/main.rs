use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use mailgen::config::MailgenConfig;
use mailgen::fetch::UreqFetcher;
use mailgen::hooks::{CommandSendHandler, LogSendHandler, SendHandler};
use mailgen::watcher::ChangeWatcher;
use mailgen::{
    codec, server, ApiRequest, ArtifactGenerator, AuthPolicy, BuildOptions, GateRequest, IdFilter,
    PreviewApi, RegistryBuilder, RequestGate, TemplateEngine,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "mailgen.yaml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base output directory for generated artifacts (defaults to the project directory)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Dry run mode - don't write files
    #[arg(long, global = true)]
    dry_run: bool,

    /// Include patterns over template ids (glob or regex:pattern)
    #[arg(long, global = true)]
    include: Vec<String>,

    /// Exclude patterns over template ids (glob or regex:pattern)
    #[arg(long, global = true)]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate preview wrappers and API routes (default command)
    Build,
    /// Build, then rebuild whenever a template or data store changes
    Watch {
        /// Command run after each rebuild to reload the host
        #[arg(long)]
        on_reload: Option<String>,
    },
    /// Print a shareable preview URL carrying the given data
    Url {
        /// Preview page URL without a query string
        base: String,
        /// JSON object, inline or as a file path
        #[arg(short, long)]
        data: String,
    },
    /// Apply a query string onto a JSON object and print the result
    Decode {
        /// Query string, with or without the leading '?'
        query: String,
        /// JSON object, inline or as a file path
        #[arg(short, long)]
        data: String,
    },
    /// Serve the preview API over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:3001")]
        addr: String,
    },
    /// Render one template through the preview API and print the response
    Send {
        /// Template id, e.g. account/invite
        id: String,
        /// JSON object, inline or as a file path
        #[arg(short, long)]
        data: Option<String>,
    },
}

struct Project {
    config: MailgenConfig,
    base: PathBuf,
    output_base: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Build);

    match command {
        Commands::Build => build(&cli),
        Commands::Watch { on_reload } => watch(&cli, on_reload.as_deref()),
        Commands::Url { base, data } => {
            let data = load_data(&data)?;
            println!("{}", codec::shareable_url(&base, &data));
            Ok(())
        }
        Commands::Decode { query, data } => {
            let mut data = load_data(&data)?;
            codec::decode(&query, &mut data);
            println!("{}", serde_json::to_string_pretty(&Value::Object(data))?);
            Ok(())
        }
        Commands::Serve { addr } => {
            let project = load_project(&cli)?;
            let api = preview_api(&project);
            server::serve(Arc::new(api), &addr)
        }
        Commands::Send { id, data } => send(&cli, &id, data.as_deref()),
    }
}

fn load_project(cli: &Cli) -> Result<Project> {
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.is_file()),
    };

    let (config, base) = match config_path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            let config = MailgenConfig::load(&path).context("Failed to load config")?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (config, base)
        }
        None => {
            info!("No {} found, using defaults", DEFAULT_CONFIG);
            (MailgenConfig::default(), PathBuf::from("."))
        }
    };

    let output_base = cli.output.clone().unwrap_or_else(|| base.clone());
    Ok(Project {
        config,
        base,
        output_base,
    })
}

fn registry_builder(cli: &Cli, project: &Project) -> RegistryBuilder {
    let config = &project.config;
    let mapper = config.mapper(&project.base, &project.output_base);
    let mut options = BuildOptions::new(config.layout_path(&project.base), config.site_url.clone());
    options.dry_run = cli.dry_run;
    options.manifest = config.manifest;
    options.filter = IdFilter::new(&cli.include, &cli.exclude);
    RegistryBuilder::new(mapper, ArtifactGenerator::new(TemplateEngine::new()), options)
}

fn build(cli: &Cli) -> Result<()> {
    let project = load_project(cli)?;
    let builder = registry_builder(cli, &project);
    let report = builder.build();

    for entry in &report.entries {
        println!("{}\t{}", entry.id, entry.route.path);
    }

    if cli.dry_run {
        info!("=== DRY RUN COMPLETE ===");
    }

    if report.is_clean() {
        Ok(())
    } else {
        for failure in &report.failures {
            error!("{:?}: {}", failure.template, failure.error);
        }
        Err(anyhow::anyhow!(
            "{} template(s) failed to generate",
            report.failures.len()
        ))
    }
}

fn watch(cli: &Cli, on_reload: Option<&str>) -> Result<()> {
    let project = load_project(cli)?;
    let builder = registry_builder(cli, &project);
    builder.build();

    let root = builder.mapper().template_root().to_path_buf();
    let watcher = ChangeWatcher::new(&root, &project.config.watch)
        .with_context(|| format!("Failed to watch {:?}", root))?;

    let mut rebuild = || {
        let report = builder.build();
        if !report.is_clean() {
            warn!("Rebuild finished with {} failure(s)", report.failures.len());
        }
    };
    let mut reload = || {
        info!("Templates changed, reload requested");
        if let Some(command) = on_reload {
            run_reload_command(command);
        }
    };
    watcher.run(&mut rebuild, &mut reload);
    Ok(())
}

fn run_reload_command(command: &str) {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };
    match Command::new(program).args(parts).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("Reload command {:?} exited with {}", command, status),
        Err(e) => error!("Failed to run reload command {:?}: {}", command, e),
    }
}

fn preview_api(project: &Project) -> PreviewApi {
    let config = &project.config;
    let gate = RequestGate::new(config.api_key.resolve(), config.rate_limit.resolve());
    let handler: Box<dyn SendHandler> = match &config.send_handler {
        Some(handler) => Box::new(CommandSendHandler::new(handler.clone())),
        None => Box::new(LogSendHandler),
    };
    PreviewApi::new(
        config.mapper(&project.base, &project.output_base),
        config.site_url.clone(),
        gate,
        Box::new(UreqFetcher),
    )
    .with_send_handler(handler)
}

fn send(cli: &Cli, id: &str, data: Option<&str>) -> Result<()> {
    let project = load_project(cli)?;
    let api = preview_api(&project);

    let mut gate = GateRequest::new().with_remote_addr("cli");
    if let AuthPolicy::Key(key) = api.gate().auth() {
        gate = gate.with_header(mailgen::gate::API_KEY_HEADER, key.clone());
    }
    let body = match data {
        Some(data) => load_data(data)?,
        None => Map::new(),
    };
    let request = ApiRequest {
        path: id.to_string(),
        gate,
        body,
    };

    match api.handle(&request) {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{} ({})", e, e.status())),
    }
}

/// Reads a JSON object given inline or as a path to a file.
fn load_data(arg: &str) -> Result<Map<String, Value>> {
    let content = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read data file {arg}"))?
    };
    let value: Value = serde_json::from_str(&content).context("Failed to parse JSON data")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow::anyhow!("Data must be a JSON object")),
    }
}
