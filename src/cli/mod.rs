//! Command-line interface for the AlphaStrat client

mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::api::{EngineApi, GenerateParams, HttpEngineClient, LogLine};
use crate::config::{self, ClientConfig};
use crate::configs::ConfigManager;
use crate::graph::editor::START_NODE_ID;
use crate::graph::{EditOutcome, GraphEdge, NodeEdit, Side, StrategyDocument, StrategyGraph};
use crate::graph::LogicInput;
use crate::monitor::{LogFetcher, LogMonitor, LogSource, StatusAggregator, StatusMonitor};
use crate::orchestrator::backtest::{build_request, BacktestForm};
use crate::orchestrator::{load_catalog, BacktestRunner, BacktestState, Compiler, ControlAction, GatewayJobState, Platform, ProcessController};
use crate::utils::{init_logging, Notices};

/// Main CLI structure using clap derive
#[derive(Debug, Parser)]
#[command(name = "alphastrat", version)]
#[command(about = "Build strategy graphs, run backtests and control the AlphaStrat engine", long_about = None)]
pub struct Cli {
    /// Path to the client configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, overrides the configured level
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlatformArg {
    Pinescript,
    Csharp,
    Mql,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            | PlatformArg::Pinescript => Platform::PineScript,
            | PlatformArg::Csharp => Platform::CSharp,
            | PlatformArg::Mql => Platform::Mql,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create and edit strategy graph documents
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// Generate platform code for a strategy graph
    Compile {
        /// Strategy graph document (JSON)
        #[arg(short, long, value_name = "FILE")]
        graph: PathBuf,

        #[arg(short, long, value_enum, default_value = "pinescript")]
        platform: PlatformArg,

        /// Write the code here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run a backtest on the engine and wait for the result
    Backtest {
        #[arg(short, long, value_name = "FILE")]
        graph: PathBuf,

        /// Comma-separated symbols
        #[arg(short, long)]
        symbols: Option<String>,

        #[arg(long)]
        years: Option<String>,

        #[arg(long)]
        cash: Option<String>,

        #[arg(long)]
        slippage: Option<String>,
    },

    /// Show gateway, auth and pipeline status
    Status {
        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the engine's log tail
    Logs {
        /// pipeline, server, decisions or a run name
        #[arg(short, long, default_value = "pipeline")]
        source: String,

        #[arg(short = 'n', long)]
        lines: Option<usize>,

        /// List historical runs instead
        #[arg(long)]
        runs: bool,

        /// Keep polling until interrupted
        #[arg(short, long)]
        follow: bool,
    },

    /// Control the market-data gateway
    Gateway {
        #[command(subcommand)]
        command: GatewayCommands,
    },

    /// Control the live decision pipeline
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },

    /// Manage pipeline configs stored on the engine
    Configs {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// List indicators offered by the compiler backend
    Indicators,

    /// Write a client configuration file
    Init {
        #[arg(short, long, value_name = "FILE", default_value = config::LOCAL_CONFIG_FILE)]
        output: PathBuf,

        /// Generate a commented config with explanations
        #[arg(long)]
        commented: bool,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum GraphCommands {
    /// Start a new document holding only the start node
    New {
        file: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print nodes and edges
    Show { file: PathBuf },
    /// Add an indicator node from the catalog
    AddIndicator { file: PathBuf, indicator: String },
    /// Add a logic node
    AddLogic { file: PathBuf },
    /// Add an action node
    AddAction {
        file: PathBuf,
        #[arg(value_parser = parse_side)]
        side: Side,
    },
    /// Connect two nodes
    Connect {
        file: PathBuf,
        source: String,
        target: String,
        /// Logic input fed by this edge (a or b)
        #[arg(long, value_parser = parse_input)]
        input: Option<LogicInput>,
    },
    /// Set a node parameter
    Set { file: PathBuf, node: String, field: String, value: String },
    /// Remove a node (edges are kept)
    Remove { file: PathBuf, node: String },
    /// Remove an edge by index
    Disconnect { file: PathBuf, index: usize },
    /// Re-position every node
    Layout { file: PathBuf },
    /// Print the normalized strategy as JSON
    Normalize { file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum GatewayCommands {
    /// Start the gateway and wait until it is up
    Start,
    Stop,
    /// Trigger the gateway login flow
    Login,
}

#[derive(Debug, Subcommand)]
pub enum PipelineCommands {
    /// Start the pipeline with a stored config
    Start {
        name: String,
        /// Place real orders
        #[arg(long)]
        live: bool,
    },
    Stop,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    List,
    Show { name: String },
    /// Replace a config with the contents of a YAML file
    Save { name: String, file: PathBuf },
    /// Create a config, from the built-in template unless a file is given
    Create {
        name: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    Delete { name: String },
    /// Generate a pipeline config from a strategy graph
    Generate {
        #[arg(short, long, value_name = "FILE")]
        graph: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, default_value = "AAPL")]
        symbols: String,
        #[arg(long)]
        cash: Option<String>,
        #[arg(long)]
        slippage: Option<String>,
        #[arg(long)]
        live: bool,
        /// Store the generated YAML as a new config under this name
        #[arg(long)]
        save_as: Option<String>,
    },
}

fn parse_side(raw: &str) -> std::result::Result<Side, String> {
    raw.parse::<Side>().map_err(|e| e.to_string())
}

fn parse_input(raw: &str) -> std::result::Result<LogicInput, String> {
    LogicInput::from_handle(&raw.to_ascii_lowercase()).ok_or_else(|| format!("expected a or b, got '{raw}'"))
}

/// Form numbers fall back the way the generate dialog does: unparseable
/// cash reads as 10000, slippage as 0.
fn generate_params(cash: Option<&str>, slippage: Option<&str>, live: bool) -> GenerateParams {
    let defaults = GenerateParams::default();
    let number = |raw: Option<&str>, fallback: f64| raw.and_then(|r| r.trim().parse::<f64>().ok()).unwrap_or(fallback);
    GenerateParams {
        starting_cash: number(cash, defaults.starting_cash),
        slippage_bps: number(slippage, defaults.slippage_bps),
        dry_run: !live,
    }
}

/// Lines of a sliding tail that come after the last one already printed.
fn unseen<'a>(lines: &'a [LogLine], last_shown: Option<&LogLine>) -> &'a [LogLine] {
    let start = last_shown
        .and_then(|last| lines.iter().rposition(|l| l == last))
        .map_or(0, |i| i + 1);
    &lines[start..]
}

fn read_graph(path: &Path) -> Result<StrategyGraph> {
    let doc = StrategyDocument::read(path).with_context(|| format!("Failed to read graph {}", path.display()))?;
    Ok(doc.into_graph())
}

fn write_graph(path: &Path, graph: &StrategyGraph) -> Result<()> {
    StrategyDocument::from_graph(graph)
        .write(path)
        .with_context(|| format!("Failed to write graph {}", path.display()))
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        if let Commands::Init { output, commented, force } = &self.command {
            return handle_init(output, *commented, *force);
        }

        let mut config = match &self.config {
            | Some(path) => ClientConfig::from_file(path)?,
            | None => ClientConfig::load()?,
        };
        if let Some(level) = &self.log {
            config.log_level = level.clone();
        }
        init_logging(&config.log_level);
        config.validate().context("Invalid client configuration")?;

        let client = HttpEngineClient::from_config(&config)?;
        let compiler_url = client.compiler_url().to_string();
        let session = Session { api: Arc::new(client), compiler_url, config, notices: Notices::new() };
        session.run(self.command).await
    }
}

struct Session {
    api: Arc<dyn EngineApi>,
    compiler_url: String,
    config: ClientConfig,
    notices: Notices,
}

impl Session {
    async fn run(mut self, command: Commands) -> Result<()> {
        let outcome = match command {
            | Commands::Graph { command } => self.handle_graph(command).await,
            | Commands::Compile { graph, platform, output } => self.handle_compile(&graph, platform.into(), output).await,
            | Commands::Backtest { graph, symbols, years, cash, slippage } => {
                self.handle_backtest(&graph, symbols, years, cash, slippage).await
            }
            | Commands::Status { watch } => self.handle_status(watch).await,
            | Commands::Logs { source, lines, runs, follow } => self.handle_logs(&source, lines, runs, follow).await,
            | Commands::Gateway { command } => self.handle_gateway(command).await,
            | Commands::Pipeline { command } => self.handle_pipeline(command).await,
            | Commands::Configs { command } => self.handle_configs(command).await,
            | Commands::Indicators => {
                for info in load_catalog(self.api.as_ref()).await {
                    println!("{}", render::indicator_line(&info));
                }
                Ok(())
            }
            | Commands::Init { .. } => Ok(()),
        };

        if let Err(e) = &outcome {
            match e.downcast_ref::<crate::Error>() {
                | Some(err) => {
                    self.notices.error(err);
                }
                | None => {
                    self.notices.push(crate::utils::NoticeKind::Error, format!("{e:#}"));
                }
            }
        }
        for notice in self.notices.iter() {
            eprintln!("{}", render::notice_line(notice));
        }
        if outcome.is_err() {
            std::process::exit(1);
        }
        Ok(())
    }

    async fn handle_graph(&mut self, command: GraphCommands) -> Result<()> {
        match command {
            | GraphCommands::New { file, name } => {
                if file.exists() {
                    bail!("File already exists: {}", file.display());
                }
                let mut graph = StrategyGraph::new();
                if let Some(name) = name {
                    graph = graph.with_name(name);
                }
                write_graph(&file, &graph)?;
                self.notices.success(format!("Created {}", file.display()));
            }
            | GraphCommands::Show { file } => {
                for line in render::graph_lines(&read_graph(&file)?) {
                    println!("{line}");
                }
            }
            | GraphCommands::AddIndicator { file, indicator } => {
                let mut graph = read_graph(&file)?;
                let catalog = load_catalog(self.api.as_ref()).await;
                let Some(info) = catalog.iter().find(|i| i.id.eq_ignore_ascii_case(&indicator)) else {
                    bail!("Unknown indicator '{indicator}'");
                };
                let id = graph.add_indicator(info).id.clone();
                write_graph(&file, &graph)?;
                self.notices.success(format!("Added {id}"));
            }
            | GraphCommands::AddLogic { file } => {
                let mut graph = read_graph(&file)?;
                let id = graph.add_logic().id.clone();
                write_graph(&file, &graph)?;
                self.notices.success(format!("Added {id}"));
            }
            | GraphCommands::AddAction { file, side } => {
                let mut graph = read_graph(&file)?;
                let id = graph.add_action(side).id.clone();
                write_graph(&file, &graph)?;
                self.notices.success(format!("Added {id}"));
            }
            | GraphCommands::Connect { file, source, target, input } => {
                let mut graph = read_graph(&file)?;
                for id in [&source, &target] {
                    if graph.node(id).is_none() {
                        bail!("No node with id '{id}'");
                    }
                }
                let edge = GraphEdge::new(source, target);
                graph.connect(match input {
                    | Some(input) => edge.into_input(input),
                    | None => edge,
                });
                write_graph(&file, &graph)?;
            }
            | GraphCommands::Set { file, node, field, value } => {
                let mut graph = read_graph(&file)?;
                match graph.apply(NodeEdit::new(node.clone(), field, value)) {
                    | EditOutcome::Applied(stored) => {
                        write_graph(&file, &graph)?;
                        self.notices.success(format!("{node}: stored '{stored}'"));
                    }
                    | EditOutcome::Rejected(rejected) => bail!("{rejected}"),
                    | EditOutcome::UnknownNode => bail!("No node with id '{node}'"),
                }
            }
            | GraphCommands::Remove { file, node } => {
                if node == START_NODE_ID {
                    bail!("The start node cannot be removed");
                }
                let mut graph = read_graph(&file)?;
                if graph.remove_node(&node).is_none() {
                    bail!("No node with id '{node}'");
                }
                write_graph(&file, &graph)?;
            }
            | GraphCommands::Disconnect { file, index } => {
                let mut graph = read_graph(&file)?;
                if graph.remove_edge(index).is_none() {
                    bail!("No edge #{index}");
                }
                write_graph(&file, &graph)?;
            }
            | GraphCommands::Layout { file } => {
                let mut graph = read_graph(&file)?;
                graph.auto_layout();
                write_graph(&file, &graph)?;
            }
            | GraphCommands::Normalize { file } => {
                let graph = read_graph(&file)?;
                let strategy = crate::graph::normalize(&graph.nodes, &graph.edges, graph.display_name(), None);
                println!("{}", serde_json::to_string_pretty(&strategy)?);
            }
        }
        Ok(())
    }

    async fn handle_compile(&mut self, graph: &Path, platform: Platform, output: Option<PathBuf>) -> Result<()> {
        let graph = read_graph(graph)?;
        let code = Compiler::new(self.api.clone(), self.compiler_url.clone()).compile(&graph, platform).await;
        match output {
            | Some(path) => {
                std::fs::write(&path, &code).with_context(|| format!("Failed to write {}", path.display()))?;
                self.notices.success(format!("Wrote {platform} code to {}", path.display()));
            }
            | None => println!("{code}"),
        }
        Ok(())
    }

    async fn handle_backtest(
        &mut self,
        graph: &Path,
        symbols: Option<String>,
        years: Option<String>,
        cash: Option<String>,
        slippage: Option<String>,
    ) -> Result<()> {
        let graph = read_graph(graph)?;
        let mut form = BacktestForm::from_defaults(&self.config.backtest);
        if let Some(s) = symbols {
            form.symbols = s;
        }
        if let Some(y) = years {
            form.years = y;
        }
        if let Some(c) = cash {
            form.starting_cash = c;
        }
        if let Some(s) = slippage {
            form.slippage_bps = s;
        }
        let params = form.parse()?;

        let mut runner = BacktestRunner::new(self.api.clone(), self.config.polling.backtest_interval());
        let mut rx = runner.subscribe();
        let job_id = runner.run(build_request(&graph, params)).await?;
        info!(%job_id, "Waiting for backtest");

        let bar = ProgressBar::new(100);
        bar.set_style(ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")?.progress_chars("=> "));
        bar.enable_steady_tick(Duration::from_millis(120));

        let final_state = loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() {
                break state;
            }
            if let BacktestState::Polling(job) = &state {
                bar.set_position(u64::from(job.progress));
                bar.set_message(format!(
                    "{} {}",
                    job.phase.as_deref().unwrap_or("queued"),
                    job.message.as_deref().unwrap_or_default()
                ));
            }
            if rx.changed().await.is_err() {
                break runner.state();
            }
        };
        bar.finish_and_clear();

        match final_state {
            | BacktestState::Completed(job) => {
                println!("{}", render::phase_strip(Some("completed")));
                for line in render::backtest_lines(&job) {
                    println!("{line}");
                }
                self.notices.success("Backtest completed");
                Ok(())
            }
            | BacktestState::Failed { message, .. } => Err(crate::Error::JobFailed(message).into()),
            | other => bail!("Backtest ended in unexpected state {other:?}"),
        }
    }

    async fn handle_status(&mut self, watch: bool) -> Result<()> {
        let aggregator = Arc::new(StatusAggregator::new(self.api.clone()));
        if !watch {
            if aggregator.poll().await.is_none() {
                bail!("Engine status unavailable");
            }
            for line in render::status_lines(&aggregator.snapshot()) {
                println!("{line}");
            }
            return Ok(());
        }

        let monitor = StatusMonitor::spawn(aggregator, self.config.polling.status_interval());
        let mut rx = monitor.subscribe();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!();
                    for line in render::status_lines(&rx.borrow_and_update()) {
                        println!("{line}");
                    }
                }
            }
        }
        monitor.stop();
        Ok(())
    }

    async fn handle_logs(&mut self, source: &str, lines: Option<usize>, runs: bool, follow: bool) -> Result<()> {
        let max_lines = lines.unwrap_or(self.config.polling.log_lines);
        let fetcher = Arc::new(LogFetcher::new(self.api.clone(), max_lines));
        if runs {
            for run in fetcher.list_runs().await? {
                println!("{}", render::run_line(&run));
            }
            return Ok(());
        }

        let source: LogSource = source.parse().unwrap_or_default();
        if !follow {
            for line in fetcher.fetch_tail(&source, max_lines).await? {
                println!("{}", render::log_line(&line));
            }
            return Ok(());
        }

        fetcher.set_source(source);
        let monitor = LogMonitor::spawn(fetcher, self.config.polling.status_interval());
        let mut rx = monitor.subscribe();
        let mut last_shown = None;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let tail = rx.borrow_and_update().clone();
                    for line in unseen(&tail.lines, last_shown.as_ref()) {
                        println!("{}", render::log_line(line));
                    }
                    if let Some(line) = tail.lines.last() {
                        last_shown = Some(line.clone());
                    }
                }
            }
        }
        monitor.stop();
        Ok(())
    }

    fn controller(&self) -> ProcessController {
        ProcessController::new(self.api.clone(), &self.config.polling)
    }

    async fn handle_gateway(&mut self, command: GatewayCommands) -> Result<()> {
        let mut controller = self.controller();
        let action = match command {
            | GatewayCommands::Start => ControlAction::GatewayStart,
            | GatewayCommands::Stop => ControlAction::GatewayStop,
            | GatewayCommands::Login => ControlAction::GatewayLogin,
        };
        let outcome = controller.execute(action).await?;
        if !outcome.ok {
            bail!(outcome.message);
        }
        if !matches!(controller.gateway_state(), GatewayJobState::Starting { .. }) {
            self.notices.success(outcome.message);
            return Ok(());
        }

        self.notices.info(outcome.message);
        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Starting gateway...");
        spinner.enable_steady_tick(Duration::from_millis(120));
        let state = controller.wait_gateway().await;
        spinner.finish_and_clear();
        println!("{}", render::gateway_line(&state));

        match state {
            | GatewayJobState::Running { .. } => {
                self.notices.success("Gateway is running");
                Ok(())
            }
            | GatewayJobState::ScriptExited { message } => {
                tokio::time::sleep(self.config.polling.gateway_grace()).await;
                let aggregator = StatusAggregator::new(self.api.clone());
                match aggregator.poll().await {
                    | Some(status) if status.gateway.running => {
                        self.notices.success("Gateway is running");
                        Ok(())
                    }
                    | _ => bail!(message),
                }
            }
            | GatewayJobState::Failed { message } => bail!(message),
            | _ => Ok(()),
        }
    }

    async fn handle_pipeline(&mut self, command: PipelineCommands) -> Result<()> {
        let action = match command {
            | PipelineCommands::Start { name, live } => ControlAction::PipelineStart { config: name, dry_run: !live },
            | PipelineCommands::Stop => ControlAction::PipelineStop,
        };
        let outcome = self.controller().execute(action).await?;
        if !outcome.ok {
            bail!(outcome.message);
        }
        self.notices.success(outcome.message);
        Ok(())
    }

    async fn handle_configs(&mut self, command: ConfigCommands) -> Result<()> {
        let manager = ConfigManager::new(self.api.clone());
        match command {
            | ConfigCommands::List => {
                for config in manager.list().await? {
                    println!("{}", render::config_line(&config));
                }
            }
            | ConfigCommands::Show { name } => {
                print!("{}", manager.load(&name).await?.yaml);
            }
            | ConfigCommands::Save { name, file } => {
                let yaml = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
                manager.save(&name, &yaml).await?;
                self.notices.success(format!("Saved {name}"));
            }
            | ConfigCommands::Create { name, file } => {
                let yaml = file
                    .map(|f| std::fs::read_to_string(&f).with_context(|| format!("Failed to read {}", f.display())))
                    .transpose()?;
                let created = manager.create(&name, yaml.as_deref()).await?;
                self.notices.success(format!("Config \"{}\" created", created.name));
            }
            | ConfigCommands::Delete { name } => {
                manager.delete(&name).await?;
                self.notices.success(format!("Deleted {name}"));
            }
            | ConfigCommands::Generate { graph, name, symbols, cash, slippage, live, save_as } => {
                let graph = read_graph(&graph)?;
                let params = generate_params(cash.as_deref(), slippage.as_deref(), live);
                let name = name.or_else(|| Some(graph.name.clone()));
                let yaml = manager.generate_from_graph(&graph, name.as_deref(), &symbols, params).await?;
                match save_as {
                    | Some(target) => {
                        let created = manager.create(&target, Some(&yaml)).await?;
                        self.notices.success(format!("Config \"{}\" created", created.name));
                    }
                    | None => print!("{yaml}"),
                }
            }
        }
        Ok(())
    }
}

fn handle_init(output: &Path, commented: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("File already exists: {}. Use --force to overwrite.", output.display());
    }
    if commented {
        config::generate_commented_config_template(output)?;
        println!("Generated commented configuration at: {}", output.display());
    } else {
        config::generate_config_template(output)?;
        println!("Generated configuration at: {}", output.display());
    }
    Ok(())
}
