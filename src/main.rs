//! xcdiag CLI
//!
//! Entry point for the `xcdiag` command-line tool.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use xcdiag::config::{
    default_host_config_path, default_repo_config_path, parse_override, set_path, EffectiveConfig,
    Settings,
};
use xcdiag::logging::init_tracing;
use xcdiag::pipeline::{BuildRequest, Pipeline};
use xcdiag::render;
use xcdiag::sink::OperationLog;
use xcdiag_output::{classify_failure, parse_output, reconcile, FailureContext};
use xcdiag_simctl::{DeviceResolver, Simulators, TokioRunner};

#[derive(Parser)]
#[command(name = "xcdiag")]
#[command(about = "Diagnostics for xcodebuild / swift test output and simulator lifecycle", version)]
struct Cli {
    /// Repo config file (default: ./.xcdiag.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Override a config key, e.g. --set display.max_issues=10 (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG still wins)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a build/test log into issues and test results
    Parse {
        /// Log file, or - for stdin
        log: PathBuf,
    },

    /// Classify the failure recorded in a log
    Classify {
        /// Log file, or - for stdin
        log: PathBuf,

        #[arg(long)]
        scheme: Option<String>,

        #[arg(long)]
        platform: Option<String>,

        #[arg(long)]
        configuration: Option<String>,
    },

    /// Reconcile XUnit reports with a console log
    Reconcile {
        /// Log file, or - for stdin
        log: PathBuf,

        /// XUnit report file (repeatable)
        #[arg(long = "report")]
        reports: Vec<PathBuf>,

        /// Delete the report files after reading them
        #[arg(long)]
        consume: bool,
    },

    /// Build a scheme with xcodebuild
    Build(XcodebuildArgs),

    /// Test a scheme with xcodebuild
    Test(XcodebuildArgs),

    /// Run `swift test` for a package
    SwiftTest {
        /// Package directory
        #[arg(default_value = ".")]
        package_path: PathBuf,
    },

    /// Simulator device queries
    Devices {
        #[command(subcommand)]
        action: DevicesCommands,
    },

    /// Boot a simulator (default: the single booted one)
    Boot {
        /// Simulator UDID or name
        simulator: Option<String>,
    },

    /// Shut down a simulator (default: the single booted one)
    Shutdown {
        /// Simulator UDID or name
        simulator: Option<String>,
    },

    /// Install an app bundle, booting the simulator if needed
    Install {
        /// Path to the .app bundle
        app: PathBuf,

        /// Simulator UDID or name (default: the single booted one)
        #[arg(long)]
        simulator_id: Option<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(clap::Args)]
struct XcodebuildArgs {
    #[arg(long)]
    scheme: String,

    #[arg(long, conflicts_with = "project")]
    workspace: Option<PathBuf>,

    #[arg(long)]
    project: Option<PathBuf>,

    #[arg(long)]
    configuration: Option<String>,

    /// xcodebuild -destination value
    #[arg(long)]
    destination: Option<String>,

    /// Platform name used in failure hints (e.g. iOS)
    #[arg(long)]
    platform: Option<String>,
}

impl XcodebuildArgs {
    fn into_request(self) -> BuildRequest {
        BuildRequest {
            workspace: self.workspace,
            project: self.project,
            scheme: self.scheme,
            configuration: self.configuration,
            destination: self.destination,
            platform: self.platform,
        }
    }
}

#[derive(Subcommand)]
enum DevicesCommands {
    /// List all simulators
    List,

    /// Resolve an identifier (or the single booted simulator) to one device
    Resolve {
        /// Simulator UDID or name
        simulator: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with its sources
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (effective, settings) = match load_settings(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings.logging_level, cli.verbose);

    let json = cli.json;
    let runner = TokioRunner::new().with_timeout(settings.toolchain.command_timeout);

    let ok = match cli.command {
        Commands::Parse { log } => run_parse(&log, &settings, json),
        Commands::Classify {
            log,
            scheme,
            platform,
            configuration,
        } => run_classify(
            &log,
            scheme.as_deref(),
            platform.as_deref(),
            configuration.as_deref(),
            &settings,
            json,
        ),
        Commands::Reconcile { log, reports, consume } => {
            run_reconcile(&log, &reports, consume, &settings, json)
        }
        Commands::Build(args) => {
            let request = args.into_request();
            match Pipeline::new(&runner, &settings).build(&request).await {
                Ok(report) => {
                    record(&settings, "build", &report);
                    if json {
                        print_json(&report);
                    } else {
                        print!("{}", render::render_parsed(&report.output, &settings.display));
                        if let Some(error) = &report.error {
                            print!("{}", render::render_error(error, &settings.display));
                        }
                    }
                    report.succeeded
                }
                Err(e) => fail(e),
            }
        }
        Commands::Test(args) => {
            let request = args.into_request();
            match Pipeline::new(&runner, &settings).test(&request).await {
                Ok(report) => {
                    record(&settings, "test", &report);
                    print_test_report(&report, &settings, json);
                    report.succeeded
                }
                Err(e) => fail(e),
            }
        }
        Commands::SwiftTest { package_path } => {
            match Pipeline::new(&runner, &settings)
                .swift_package_test(&package_path)
                .await
            {
                Ok(report) => {
                    record(&settings, "swift-test", &report);
                    print_test_report(&report, &settings, json);
                    report.succeeded
                }
                Err(e) => fail(e),
            }
        }
        Commands::Devices { action } => {
            let resolver = DeviceResolver::new(&runner).with_xcrun(settings.toolchain.xcrun.clone());
            match action {
                DevicesCommands::List => match resolver.list_devices().await {
                    Ok(devices) => {
                        if json {
                            print_json(&devices);
                        } else {
                            for d in &devices {
                                println!("{}  {:<13}  {}  ({})", d.id, d.state.as_str(), d.name, d.runtime_identifier);
                            }
                        }
                        true
                    }
                    Err(e) => fail(e),
                },
                DevicesCommands::Resolve { simulator } => {
                    match resolver.resolve(simulator.as_deref()).await {
                        Ok(device) => {
                            if json {
                                print_json(&device);
                            } else {
                                println!("{} ({})", device.name, device.id);
                                println!("  State: {}", device.state);
                                println!("  Platform: {}", device.platform);
                                println!("  Runtime: {}", device.runtime_identifier);
                            }
                            true
                        }
                        Err(e) => fail(e),
                    }
                }
            }
        }
        Commands::Boot { simulator } => {
            let simulators = Simulators::new(&runner).with_xcrun(settings.toolchain.xcrun.clone());
            let report = simulators.boot(simulator.as_deref()).await;
            finish_operation(&settings, &report, json)
        }
        Commands::Shutdown { simulator } => {
            let simulators = Simulators::new(&runner).with_xcrun(settings.toolchain.xcrun.clone());
            let report = simulators.shutdown(simulator.as_deref()).await;
            finish_operation(&settings, &report, json)
        }
        Commands::Install { app, simulator_id } => {
            let simulators = Simulators::new(&runner).with_xcrun(settings.toolchain.xcrun.clone());
            let report = simulators.install(&app, simulator_id.as_deref()).await;
            finish_operation(&settings, &report, json)
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => match effective.to_json() {
                Ok(text) => {
                    println!("{}", text);
                    true
                }
                Err(e) => fail(e),
            },
        },
    };

    process::exit(if ok { 0 } else { 1 });
}

fn load_settings(cli: &Cli) -> Result<(EffectiveConfig, Settings), String> {
    let mut overrides = None;
    for item in &cli.overrides {
        let (key, value) = parse_override(item).map_err(|e| e.to_string())?;
        let target = overrides.get_or_insert_with(|| serde_json::json!({}));
        set_path(target, &key, value);
    }

    let repo_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_repo_config_path(Path::new(".")),
    };
    let host_path = default_host_config_path();

    let effective = EffectiveConfig::build(host_path.as_deref(), Some(repo_path.as_path()), overrides)
        .map_err(|e| e.to_string())?;
    let settings = Settings::from_effective(&effective);
    Ok((effective, settings))
}

fn read_log(path: &Path) -> Option<String> {
    let result = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).map(|_| text)
    } else {
        fs::read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    };

    match result {
        Ok(text) => Some(text),
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            None
        }
    }
}

fn run_parse(log: &Path, settings: &Settings, json: bool) -> bool {
    let Some(text) = read_log(log) else {
        return false;
    };
    let parsed = parse_output(&text);

    if json {
        print_json(&parsed);
    } else {
        print!("{}", render::render_parsed(&parsed, &settings.display));
    }
    parsed.build_succeeded && parsed.tests_passed
}

fn run_classify(
    log: &Path,
    scheme: Option<&str>,
    platform: Option<&str>,
    configuration: Option<&str>,
    settings: &Settings,
    json: bool,
) -> bool {
    let Some(text) = read_log(log) else {
        return false;
    };
    let parsed = parse_output(&text);
    let ctx = FailureContext::new(&text)
        .with_issues(&parsed.errors)
        .with_scheme(scheme)
        .with_platform(platform)
        .with_configuration(configuration);
    let error = classify_failure(&ctx);

    if json {
        print_json(&error);
    } else {
        print!("{}", render::render_error(&error, &settings.display));
    }
    true
}

fn run_reconcile(log: &Path, reports: &[PathBuf], consume: bool, settings: &Settings, json: bool) -> bool {
    let Some(text) = read_log(log) else {
        return false;
    };
    let parsed = parse_output(&text);

    // Reconciliation removes the files it reads; work on copies unless asked not to.
    let staging = if consume {
        None
    } else {
        match stage_reports(reports) {
            Ok(staged) => Some(staged),
            Err(e) => {
                eprintln!("Error staging reports: {}", e);
                return false;
            }
        }
    };
    let paths = staging.as_ref().map_or(reports, |(_, copies)| copies.as_slice());
    let tests = reconcile(paths, &text, &parsed, settings.continuation_window);

    if let Some((dir, _)) = &staging {
        if let Err(e) = fs::remove_dir(dir) {
            warn!(path = %dir.display(), error = %e, "failed to remove staging directory");
        }
    }

    if json {
        print_json(&tests);
    } else {
        print!("{}", render::render_tests(&tests, &settings.display));
    }
    tests.succeeded()
}

/// Copy existing reports into a fresh temp directory; missing ones keep
/// their (absent) path so reconciliation still sees them as unusable.
fn stage_reports(reports: &[PathBuf]) -> io::Result<(PathBuf, Vec<PathBuf>)> {
    let dir = std::env::temp_dir().join(format!("xcdiag-reconcile-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir)?;

    let mut copies = Vec::with_capacity(reports.len());
    for (i, report) in reports.iter().enumerate() {
        if report.exists() {
            let copy = dir.join(format!("{}.xml", i));
            fs::copy(report, &copy)?;
            copies.push(copy);
        } else {
            copies.push(report.clone());
        }
    }
    Ok((dir, copies))
}

fn print_test_report(report: &xcdiag::TestReport, settings: &Settings, json: bool) {
    if json {
        print_json(report);
        return;
    }
    if !report.output.build_succeeded {
        print!("{}", render::render_parsed(&report.output, &settings.display));
    }
    print!("{}", render::render_tests(&report.tests, &settings.display));
    if let Some(error) = &report.error {
        print!("{}", render::render_error(error, &settings.display));
    }
}

fn finish_operation(settings: &Settings, report: &xcdiag_simctl::OperationReport, json: bool) -> bool {
    record(settings, report.operation().as_str(), report);
    if json {
        print_json(report);
    } else {
        print!("{}", render::render_operation(report));
    }
    report.is_success()
}

/// Write an operation log; failures only warn.
fn record<T: Serialize>(settings: &Settings, operation: &str, payload: &T) {
    if let Err(e) = OperationLog::new(operation, payload).write_to_dir(&settings.logs_dir) {
        warn!(error = %e, "could not write operation log");
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn fail(err: impl std::fmt::Display) -> bool {
    eprintln!("Error: {}", err);
    false
}
