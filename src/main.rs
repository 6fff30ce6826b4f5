mod args;
mod clock;
mod config;
mod ip;
mod providers;
mod signals;
mod state;
mod transport;
mod updater;
mod validate;

use std::error::Error;
use std::process::ExitCode;

/// User-Agent sent to every service and check-ip site.
pub fn user_agent() -> String {
    format!(
        "ipupdate-{} {} (by the ipupdate authors)",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn init_logger(verbose: bool, daemon: bool, debug: bool, quiet: bool) {
    let log_level = if quiet {
        log::LevelFilter::Error
    } else if debug {
        log::LevelFilter::Debug
    } else if verbose || daemon {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::builder()
        .filter(None, log_level)
        .init();
}

fn main() -> ExitCode {
    let args = args::Args::new();

    if args.list_services {
        println!("Supported services:");
        print!("{}", providers::describe_services());
        return ExitCode::SUCCESS;
    }

    let config = match config::Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logger(args.verbose, args.daemon, args.debug, args.quiet);
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logger(args.verbose, config.daemon, config.debug, config.quiet);

    match run(&args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &args::Args, mut config: config::Config) -> Result<(), Box<dyn Error>> {
    let provider = providers::create_provider(&config.service_type)?;
    let descriptor = provider.descriptor();
    log::info!("using the {} service ({})", descriptor.id, descriptor.name);

    // nobody to ask once detached
    if config.daemon {
        provider.check_info(&mut config, &validate::Unattended)?;
    } else {
        provider.check_info(&mut config, &validate::Terminal)?;
    }

    let request = providers::UpdateRequest::from_config(&config, config.address);
    for warning in validate::validate(descriptor, &request) {
        log::warn!("{}", warning);
    }

    let transport = transport::TcpTransport;
    let clock = clock::SystemClock;
    let lookup = ip::SystemLookup;
    let updater = updater::Updater {
        provider: provider.as_ref(),
        transport: &transport,
        clock: &clock,
        lookup: &lookup,
    };

    if !config.daemon {
        updater.run_once(&config)?;
        return Ok(());
    }

    #[cfg(unix)]
    if !config.foreground {
        detach(&config)?;
    }

    let signals = signals::Signals::install()?;
    let reload = || -> Result<config::Config, Box<dyn Error>> {
        let mut fresh = config::Config::load(args)?;
        provider.check_info(&mut fresh, &validate::Unattended)?;
        Ok(fresh)
    };

    updater.run_daemon(config, &signals, &reload)?;
    Ok(())
}

/// Where the detached daemon's stderr goes: beside the pid file, if any.
fn daemon_log_path(config: &config::Config) -> Option<std::path::PathBuf> {
    config.pid_file.as_ref().map(|pid_file| pid_file.with_extension("log"))
}

/// Fork into the background, optionally recording the pid.
#[cfg(unix)]
fn detach(config: &config::Config) -> Result<(), Box<dyn Error>> {
    let mut daemon = daemonize::Daemonize::new().working_directory(std::env::current_dir()?);
    if let Some(pid_file) = &config.pid_file {
        daemon = daemon.pid_file(pid_file);
    }
    if let Some(path) = daemon_log_path(config) {
        let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("logging to {} once detached", path.display());
        daemon = daemon.stderr(log_file);
    }
    daemon.start()?;
    log::info!("running in the background as pid {}", std::process::id());
    Ok(())
}
