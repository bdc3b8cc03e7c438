mod cli;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser};
use cli::{Commands, Opt};
use futures::{StreamExt, channel::mpsc};
use fwu_config::{FlashProfile, ProjectRegistry, Tool};
use fwu_flasher::{FlashRequest, Orchestrator, OutputEvent, StreamKind, ToolLayout, ports};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let opt = Opt::parse();

    init_tracing(opt.log_file.as_deref())?;

    let config = opt.config.or_else(fwu_config::default_catalogue_path);
    let tools_dir = opt.tools_dir.unwrap_or_else(default_tools_dir);

    match opt.command {
        Commands::Flash {
            project,
            firmware,
            port,
            quiet,
        } => {
            let registry = ProjectRegistry::load(config.as_deref());
            flash(&registry, &tools_dir, &project, firmware, port, quiet).await
        }
        Commands::ListProjects { advanced } => {
            let registry = ProjectRegistry::load(config.as_deref());
            list_projects(&registry, advanced, config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ListPorts { project, no_frills } => {
            let registry = ProjectRegistry::load(config.as_deref());
            list_ports(&registry, project.as_deref(), no_frills)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ExportSampleConfig { path } => {
            fwu_config::catalogue::export_sample(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            console::Term::stdout()
                .write_line(&format!("Sample configuration written to {}", path.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::GenerateCompletion { shell } => {
            generate_completion(shell);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(p) => {
            let f = std::fs::File::create(p)
                .with_context(|| format!("Failed to create log file {}", p.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(f),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to register tracing_subscriber")?;

    if let Some(p) = log_file {
        info!("Logging to file at: {:?}", p);
    }

    Ok(())
}

/// `tools` directory beside the executable.
fn default_tools_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|x| x.parent().map(|p| p.join("tools")))
        .unwrap_or_else(|| PathBuf::from("tools"))
}

async fn flash(
    registry: &ProjectRegistry,
    tools_dir: &Path,
    project: &str,
    firmware: PathBuf,
    port: Option<String>,
    quiet: bool,
) -> anyhow::Result<ExitCode> {
    let term = console::Term::stdout();
    let profile = registry.resolve(project)?.clone();

    check_file_type(&profile.tool, &firmware);

    let port = match port {
        Some(x) => x,
        None => auto_select_port(&profile)?,
    };

    if !quiet {
        print_banner(&term, project, &profile, &firmware, &port)?;
    }

    let orchestrator = Arc::new(Orchestrator::new(ToolLayout::from_tools_dir(tools_dir)));

    let abort = orchestrator.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let request = FlashRequest::new(profile, firmware, port);
    let res = if quiet {
        orchestrator.flash(request, None).await
    } else {
        let (tx, rx) = mpsc::channel(20);
        let printer = tokio::spawn(print_output(rx));
        let res = orchestrator.flash(request, Some(tx)).await;
        let _ = printer.await;
        res
    }?;

    ctrl_c.abort();

    if res.is_success() {
        term.write_line(&format!("{} Flash complete", console::style("✔").green()))?;
        Ok(ExitCode::SUCCESS)
    } else {
        console::Term::stderr()
            .write_line(&format!("{} {res}", console::style("✘ Flash failed:").red()))?;
        Ok(ExitCode::FAILURE)
    }
}

fn check_file_type(tool: &Tool, firmware: &Path) {
    let types = tool.file_types();
    let ext = firmware
        .extension()
        .and_then(|x| x.to_str())
        .map(str::to_ascii_lowercase);

    if !ext.is_some_and(|x| types.contains(&x.as_str())) {
        warn!(
            "{} does not look like a {} file accepted by {tool}",
            firmware.display(),
            types.join("/")
        );
    }
}

fn auto_select_port(profile: &FlashProfile) -> anyhow::Result<String> {
    let Some(hint) = profile.port_hint() else {
        bail!("Project has no port hint. Select a port with --port");
    };

    let ports = ports::refresh_ports();
    match ports::best_match(&ports, Some(hint)) {
        Some(m) => {
            info!("Selected {} (matched {} keyword(s) of {hint:?})", m.port, m.score);
            Ok(m.port.path.clone())
        }
        None => bail!(
            "No serial port matches {hint:?} ({} port(s) found). Select a port with --port",
            ports.len()
        ),
    }
}

fn print_banner(
    term: &console::Term,
    project: &str,
    profile: &FlashProfile,
    firmware: &Path,
    port: &str,
) -> std::io::Result<()> {
    let firmware = firmware
        .file_name()
        .map(|x| x.to_string_lossy())
        .unwrap_or_else(|| firmware.to_string_lossy());

    let tool = profile.tool.to_string();

    let rows = [
        ("Project", project),
        ("Chip", profile.chip.as_str()),
        ("Tool", tool.as_str()),
        ("Firmware", &*firmware),
        ("Port", port),
    ];

    term.write_line(&console::style("Flashing firmware").bold().to_string())?;
    for (k, v) in rows {
        term.write_line(&format!("  {k:<10}{v}"))?;
    }
    term.write_line("")
}

/// Print tool output as it arrives, with a spinner until the tool says something.
async fn print_output(mut rx: mpsc::Receiver<OutputEvent>) {
    let stdout = console::Term::stdout();
    let stderr = console::Term::stderr();

    let spinner = indicatif::ProgressBar::new_spinner().with_message("Starting flash tool");
    spinner.enable_steady_tick(Duration::from_millis(100));

    while let Some(ev) = rx.next().await {
        if !spinner.is_finished() {
            spinner.finish_and_clear();
        }

        let _ = match ev.stream {
            StreamKind::Stdout => stdout.write_str(&ev.text),
            StreamKind::Stderr => stderr.write_str(&console::style(&ev.text).yellow().to_string()),
        };
    }

    spinner.finish_and_clear();
}

fn list_projects(
    registry: &ProjectRegistry,
    advanced: bool,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let term = console::Term::stdout();
    let names = registry.list_names(advanced);

    if names.is_empty() {
        let location = config
            .map(|x| x.display().to_string())
            .unwrap_or_else(|| fwu_config::CATALOGUE_FILE_NAME.to_string());
        term.write_line(&format!(
            "No projects in {location}. Use --advanced to list the generic boards."
        ))?;
        return Ok(());
    }

    for name in names {
        term.write_line(name)?;
    }

    Ok(())
}

fn list_ports(
    registry: &ProjectRegistry,
    project: Option<&str>,
    no_frills: bool,
) -> anyhow::Result<()> {
    let term = console::Term::stdout();

    let hint = project
        .map(|x| registry.resolve(x))
        .transpose()?
        .and_then(FlashProfile::port_hint);

    let ports = ports::refresh_ports();

    if no_frills {
        for p in &ports {
            term.write_line(&p.path)?;
        }
        return Ok(());
    }

    if ports.is_empty() {
        term.write_line("No serial ports found")?;
        return Ok(());
    }

    let best = ports::best_match(&ports, hint);

    for p in &ports {
        match best {
            Some(m) if m.port.path == p.path => term.write_line(&format!(
                "{} {}",
                console::style(p).bold(),
                console::style(format!("<- selected, {} keyword(s) matched", m.score)).green()
            ))?,
            _ => term.write_line(&p.to_string())?,
        }
    }

    Ok(())
}

fn generate_completion(target: clap_complete::Shell) {
    let mut cmd = Opt::command();
    const BIN_NAME: &str = env!("CARGO_BIN_NAME");

    clap_complete::generate(target, &mut cmd, BIN_NAME, &mut std::io::stdout())
}
