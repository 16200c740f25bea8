use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use droidsync::{config::parse_pattern_lines, Config, FailurePolicy, SyncMode};
use droidsync_engine::{
    exec::Execution,
    report::{JsonReport, LogReporter, Reporter},
    storage::{
        device::{Adb, DeviceFs, DeviceOptions},
        local::{LocalFs, LocalOptions},
        FileSystem,
    },
    Engine,
};
use tokio_util::sync::CancellationToken;

/// Exit code of a run that left conflicts unresolved
const EXIT_CONFLICTS: u8 = 2;

#[derive(Parser)]
#[command(name = "droidsync")]
#[command(author, version, about, long_about=None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v: debug, -vv: trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize a local directory to the device
    Push {
        local: String,
        device: String,
        #[command(flatten)]
        sync: SyncArgs,
        #[command(flatten)]
        adb: AdbArgs,
    },
    /// Synchronize a device directory to the local filesystem
    Pull {
        device: String,
        local: String,
        #[command(flatten)]
        sync: SyncArgs,
        #[command(flatten)]
        adb: AdbArgs,
    },
    /// Synchronize two local directories
    Mirror {
        src: String,
        dst: String,
        #[command(flatten)]
        sync: SyncArgs,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Propagate changes in both directions. Never deletes.
    #[arg(long)]
    two_way: bool,

    /// Delete destination entries that don't exist on the source
    #[arg(long)]
    delete: bool,

    /// Modification time tolerance in seconds
    #[arg(long, value_name = "SECS")]
    tolerance: Option<f64>,

    /// Carry on after a failed action
    #[arg(long)]
    keep_going: bool,

    /// Exclude entries matching a glob pattern (relative path or name)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Read exclude patterns from a file, one per line
    #[arg(long, value_name = "FILE")]
    exclude_from: Vec<PathBuf>,

    /// Only show what would be done
    #[arg(long)]
    dry_run: bool,

    /// Print the plan and the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// JSON config file. Command line options override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replace characters that are invalid on Windows in local names
    #[arg(long, overrides_with = "no_sanitize_local")]
    sanitize_local: bool,

    #[arg(long, overrides_with = "sanitize_local")]
    no_sanitize_local: bool,
}

#[derive(Args)]
struct AdbArgs {
    /// Path to the adb program
    #[arg(long, value_name = "PATH", default_value = "adb")]
    adb: String,

    /// Serial number of the device
    #[arg(short = 's', value_name = "SERIAL")]
    serial: Option<String>,

    /// Use the only USB device
    #[arg(short = 'd')]
    usb: bool,

    /// Use the only emulator
    #[arg(short = 'e')]
    emulator: bool,

    /// Host of the adb server
    #[arg(short = 'H', value_name = "HOST")]
    server_host: Option<String>,

    /// Port of the adb server
    #[arg(short = 'P', value_name = "PORT")]
    server_port: Option<u16>,

    /// Replace characters that are invalid on FAT storage in device names
    #[arg(long)]
    sanitize_device: bool,
}

impl SyncArgs {
    async fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path).await?,
            None => Config::default(),
        };
        log::trace!("Loaded config: {config:?}");

        if self.two_way {
            config.mode = SyncMode::TwoWay;
        }
        if self.delete {
            config.delete = true;
        }
        if let Some(secs) = self.tolerance {
            if !secs.is_finite() || secs < 0.0 {
                anyhow::bail!("Invalid tolerance: {secs}");
            }
            config.tolerance_ms = (secs * 1000.0).round() as u64;
        }
        if self.keep_going {
            config.failure_policy = FailurePolicy::Continue;
        }
        config.exclude.extend(self.exclude.iter().cloned());
        for path in self.exclude_from.iter() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read exclude file {}", path.display()))?;
            config.exclude.extend(parse_pattern_lines(&content));
        }
        if self.dry_run {
            config.dry_run = true;
        }
        Ok(config)
    }

    fn local_options(&self) -> LocalOptions {
        let mut opts = LocalOptions::default();
        if self.sanitize_local {
            opts.sanitize = true;
        } else if self.no_sanitize_local {
            opts.sanitize = false;
        }
        opts
    }
}

impl AdbArgs {
    fn device(&self) -> DeviceFs {
        let mut adb = Adb::new(self.adb.as_str());
        if let Some(serial) = &self.serial {
            adb = adb.serial(serial);
        }
        if self.usb {
            adb = adb.usb();
        }
        if self.emulator {
            adb = adb.emulator();
        }
        if let Some(host) = &self.server_host {
            adb = adb.server_host(host);
        }
        if let Some(port) = self.server_port {
            adb = adb.server_port(port);
        }
        let opts = DeviceOptions {
            sanitize: self.sanitize_device,
            ..DeviceOptions::default()
        };
        DeviceFs::new(adb, opts)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start the runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let token = CancellationToken::new();
        handle_interrupt(token.clone());
        match run(cli, token).await {
            Ok(code) => code,
            Err(err) => {
                log::error!("{err:#}");
                ExitCode::FAILURE
            }
        }
    })
}

fn handle_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("received interrupt, stopping after the current action");
            token.cancel();
        }
    });
}

async fn run(cli: Cli, token: CancellationToken) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Push {
            local,
            device,
            sync,
            adb,
        } => {
            let config = sync.config().await?;
            let src = LocalFs::new(sync.local_options());
            sync_roots(src, &local, adb.device(), &device, config, sync.json, token).await
        }
        Commands::Pull {
            device,
            local,
            sync,
            adb,
        } => {
            let config = sync.config().await?;
            let dst = LocalFs::new(sync.local_options());
            sync_roots(adb.device(), &device, dst, &local, config, sync.json, token).await
        }
        Commands::Mirror { src, dst, sync } => {
            let config = sync.config().await?;
            let opts = sync.local_options();
            sync_roots(
                LocalFs::new(opts),
                &src,
                LocalFs::new(opts),
                &dst,
                config,
                sync.json,
                token,
            )
            .await
        }
    }
}

async fn sync_roots<S, D>(
    src: S,
    src_root: &str,
    dst: D,
    dst_root: &str,
    config: Config,
    json: bool,
    token: CancellationToken,
) -> anyhow::Result<ExitCode>
where
    S: FileSystem,
    D: FileSystem,
{
    let dry_run = config.dry_run;
    let engine = Engine::new(src, src_root, dst, dst_root, config)?;
    let mut reporter = LogReporter;

    let plan = engine.plan().await?;
    reporter.planned(&plan);
    // execution consumes the plan
    let planned = json.then(|| plan.clone());

    let execution = engine.apply(plan, &mut reporter, &token).await;

    if let Some(plan) = planned.as_ref() {
        let report = JsonReport {
            plan,
            summary: &execution.summary,
            halt: execution.halt,
            dry_run,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(exit_code(&execution))
}

fn exit_code(execution: &Execution) -> ExitCode {
    if execution.halt.is_some() || execution.summary.counts.failed > 0 {
        ExitCode::FAILURE
    } else if execution.summary.counts.conflicted > 0 {
        ExitCode::from(EXIT_CONFLICTS)
    } else {
        ExitCode::SUCCESS
    }
}
