/// The update cycle: resolve the address, decide whether the service needs
/// to hear about it, send the update with retries, then record the result
/// and run the post-update command.
///
/// One-shot mode runs the cycle once. Daemon mode repeats it every period,
/// servicing signals between cycles.
use crate::clock::Clock;
use crate::config::Config;
use crate::ip::{self, AddressLookup, AddressSource, LookupError};
use crate::providers::{Endpoint, Provider, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::signals::{Action, Signals};
use crate::state::{self, CacheError, CacheRecord};
use crate::transport::Transport;
use std::error::Error;
use std::fmt;
use std::net::Ipv4Addr;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// Pause between attempts within one cycle.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Granularity at which a pause notices pending signals.
const PAUSE_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    FirstUpdate,
    /// Address left to the server, so there is nothing to compare.
    AddressUnknown,
    AddressChanged { from: Ipv4Addr, to: Ipv4Addr },
    MaxIntervalElapsed { elapsed: u64 },
    /// Reload or explicit request.
    Forced,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::FirstUpdate => f.write_str("no previous update on record"),
            Reason::AddressUnknown => f.write_str("address determined by the server"),
            Reason::AddressChanged { from, to } => write!(f, "address changed from {} to {}", from, to),
            Reason::MaxIntervalElapsed { elapsed } => write!(f, "last update was {}s ago", elapsed),
            Reason::Forced => f.write_str("update requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Update(Reason),
    Skip,
}

/// Whether `current` has to be published given the `last` successful update.
pub fn decide(current: Option<Ipv4Addr>, last: Option<&CacheRecord>, now: u64, max_interval: Option<u64>) -> Decision {
    let Some(last) = last else {
        return Decision::Update(Reason::FirstUpdate);
    };
    let Some(current) = current else {
        return Decision::Update(Reason::AddressUnknown);
    };

    if current != last.last_ip {
        return Decision::Update(Reason::AddressChanged {
            from: last.last_ip,
            to: current,
        });
    }

    let elapsed = now.saturating_sub(last.last_update);
    match max_interval {
        Some(max) if elapsed >= max => Decision::Update(Reason::MaxIntervalElapsed { elapsed }),
        _ => Decision::Skip,
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("update of {host} failed: {outcome}")]
    Update { host: String, outcome: UpdateOutcome },
}

/// Rebuilds the configuration on SIGHUP.
pub type Reload<'a> = &'a dyn Fn() -> Result<Config, Box<dyn Error>>;

/// Everything the cycle talks to, borrowed for the length of a run.
pub struct Updater<'a> {
    pub provider: &'a dyn Provider,
    pub transport: &'a dyn Transport,
    pub clock: &'a dyn Clock,
    pub lookup: &'a dyn AddressLookup,
}

impl Updater<'_> {
    fn max_interval(&self, config: &Config) -> Option<u64> {
        config.max_interval.or(self.provider.descriptor().default_max_interval)
    }

    fn host(config: &Config) -> String {
        config.host.clone().unwrap_or_else(|| "(no host)".to_string())
    }

    /// Call the provider up to `config.retries` times, stopping at the first
    /// success or at an outcome retrying cannot fix.
    pub fn update_with_retry(&self, config: &Config, request: &UpdateRequest) -> UpdateOutcome {
        let ctx = UpdateContext {
            transport: self.transport,
            clock: self.clock,
            endpoint: Endpoint::for_service(self.provider.descriptor(), config),
            timeout: Duration::from_secs(config.timeout),
        };
        let attempts = config.retries.max(1);

        let mut attempt = 1;
        loop {
            log::debug!(
                "attempt {}/{}: {} via {}:{}",
                attempt,
                attempts,
                request.hostname,
                ctx.endpoint.server,
                ctx.endpoint.port
            );
            let outcome = self.provider.update_entry(&ctx, request);

            if outcome.is_success() || !outcome.is_retryable() || attempt >= attempts {
                return outcome;
            }

            log::warn!("attempt {} of {} failed: {}", attempt, attempts, outcome);
            self.clock.sleep(RETRY_BACKOFF);
            attempt += 1;
        }
    }

    /// Record a successful update and run the post-update command.
    ///
    /// `NoChangeNeeded` still refreshes the cache timestamp, which restarts
    /// the max-interval countdown, but the command only runs when the server
    /// actually changed something.
    pub fn post_update(
        &self,
        config: &Config,
        address: Option<Ipv4Addr>,
        outcome: &UpdateOutcome,
    ) -> Result<(), CacheError> {
        if let (Some(path), Some(ip)) = (&config.cache_file, address) {
            let record = CacheRecord {
                last_update: self.clock.now(),
                last_ip: ip,
            };
            state::write(path, &record)?;
        }

        if *outcome == UpdateOutcome::Success {
            if let Some(command) = &config.execute {
                run_hook(command, address);
            }
        }
        Ok(())
    }

    /// A single cycle. Resolution and cache read failures are fatal here.
    pub fn run_once(&self, config: &Config) -> Result<(), RunError> {
        let host = Self::host(config);
        let source = AddressSource::from_config(config);
        let current = ip::resolve_address(&source, self.lookup, config.timeout)?;
        if let Some(ip) = current {
            log::info!("using address {} from {}", ip, source);
        }

        let last = match &config.cache_file {
            Some(path) => state::read(path)?,
            None => None,
        };

        match decide(current, last.as_ref(), self.clock.now(), self.max_interval(config)) {
            Decision::Skip => {
                log::info!("{}: address unchanged, no update needed", host);
                return Ok(());
            }
            Decision::Update(reason) => log::info!("{}: updating, {}", host, reason),
        }

        let request = UpdateRequest::from_config(config, current);
        let outcome = self.update_with_retry(config, &request);
        if !outcome.is_success() {
            return Err(RunError::Update { host, outcome });
        }

        log::info!("{}: {}", host, outcome);
        self.post_update(config, current, &outcome)?;
        Ok(())
    }

    /// Cycle until asked to shut down.
    ///
    /// Nothing in here is fatal once started: resolution failures wait for
    /// the resolve period, update failures for the next period, and cache
    /// problems are logged. Pending signals are serviced at the top of every
    /// iteration and cut pauses short.
    pub fn run_daemon(&self, mut config: Config, signals: &Signals, reload: Reload) -> Result<(), RunError> {
        let mut last = match &config.cache_file {
            Some(path) => state::read(path).unwrap_or_else(|e| {
                log::warn!("{}, starting without it", e);
                None
            }),
            None => None,
        };
        let mut resolve_warned = false;
        let mut force = false;

        log::info!(
            "watching {} for {} on {}",
            AddressSource::from_config(&config),
            Self::host(&config),
            self.provider.descriptor().id
        );

        loop {
            match signals.take() {
                Some(Action::Shutdown) => {
                    log::info!("shutting down");
                    return Ok(());
                }
                Some(Action::Reload) => {
                    match reload() {
                        Ok(fresh) => {
                            if fresh.service_type != config.service_type {
                                log::warn!(
                                    "service type can't change without a restart, still using {}",
                                    self.provider.descriptor().id
                                );
                            }
                            config = fresh;
                            log::info!("configuration reloaded");
                        }
                        Err(e) => log::error!("reload failed, keeping the current configuration: {}", e),
                    }
                    force = true;
                }
                Some(Action::Wake) => log::info!("woken up, checking now"),
                None => {}
            }

            let source = AddressSource::from_config(&config);
            let current = match ip::resolve_address(&source, self.lookup, config.timeout) {
                Ok(current) => {
                    if resolve_warned {
                        log::info!("{} is available again", source);
                        resolve_warned = false;
                    }
                    current
                }
                Err(e) => {
                    if resolve_warned {
                        log::debug!("{}", e);
                    } else {
                        log::warn!("{}, retrying every {}s", e, config.resolv_period);
                        resolve_warned = true;
                    }
                    self.pause(config.resolv_period, signals);
                    continue;
                }
            };

            let decision = if force {
                Decision::Update(Reason::Forced)
            } else {
                decide(current, last.as_ref(), self.clock.now(), self.max_interval(&config))
            };
            force = false;

            if let Decision::Update(reason) = decision {
                let host = Self::host(&config);
                log::info!("{}: updating, {}", host, reason);

                let request = UpdateRequest::from_config(&config, current);
                let outcome = self.update_with_retry(&config, &request);
                if outcome.is_success() {
                    log::info!("{}: {}", host, outcome);
                    last = current.map(|ip| CacheRecord {
                        last_update: self.clock.now(),
                        last_ip: ip,
                    });
                    if let Err(e) = self.post_update(&config, current, &outcome) {
                        log::error!("{}", e);
                    }
                } else {
                    log::error!("{}: update failed: {}", host, outcome);
                    last = None;
                }
            }

            self.pause(config.period, signals);
        }
    }

    /// Sleep for `secs`, returning early once a signal is pending.
    fn pause(&self, secs: u64, signals: &Signals) {
        let mut remaining = Duration::from_secs(secs);
        while !remaining.is_zero() && !signals.pending() {
            let slice = remaining.min(PAUSE_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }
}

/// Run the post-update command through the shell. `{ip}` is replaced by
/// the address; without it the address is appended as the last argument.
fn run_hook(command: &str, address: Option<Ipv4Addr>) {
    let address = address.map(|ip| ip.to_string()).unwrap_or_default();
    let command = if command.contains("{ip}") {
        command.replace("{ip}", &address)
    } else if address.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, address)
    };

    log::debug!("running: {}", command);
    match Command::new("sh").arg("-c").arg(&command).output() {
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                log::debug!("command stderr: {}", stderr.trim());
            }
            if output.status.success() {
                log::info!("post-update command finished");
            } else {
                log::warn!("post-update command '{}' exited with {}", command, output.status);
            }
        }
        Err(e) => log::warn!("unable to run post-update command '{}': {}", command, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::ManualClock;
    use crate::ip::mock::ScriptedLookup;
    use crate::providers::create_provider;
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportError;
    use std::fs;
    use tempfile::tempdir;

    const START: u64 = 1_700_000_000;
    const GOOD: &str = "HTTP/1.0 200 OK\r\n\r\ngood\n";

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 0, 2, last)
    }

    fn record(at: u64, address: Ipv4Addr) -> CacheRecord {
        CacheRecord {
            last_update: at,
            last_ip: address,
        }
    }

    fn dyndns_config() -> Config {
        Config {
            service_type: "dyndns".to_string(),
            user: Some("bob".to_string()),
            password: Some("secret".to_string()),
            host: Some("foo.example.com".to_string()),
            address: Some(ip(1)),
            ..Default::default()
        }
    }

    /// Requests shutdown once virtual time reaches `stop_at`.
    struct StoppingClock<'a> {
        clock: ManualClock,
        signals: &'a Signals,
        stop_at: u64,
    }

    impl Clock for StoppingClock<'_> {
        fn now(&self) -> u64 {
            self.clock.now()
        }

        fn sleep(&self, duration: Duration) {
            self.clock.sleep(duration);
            if self.clock.now() >= self.stop_at {
                self.signals.request(Action::Shutdown);
            }
        }
    }

    fn no_reload() -> Result<Config, Box<dyn Error>> {
        Err("not expected".into())
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(Some(ip(1)), None, START, None), Decision::Update(Reason::FirstUpdate));
        assert_eq!(
            decide(None, Some(&record(START, ip(1))), START, None),
            Decision::Update(Reason::AddressUnknown)
        );
        assert_eq!(
            decide(Some(ip(2)), Some(&record(START, ip(1))), START, None),
            Decision::Update(Reason::AddressChanged { from: ip(1), to: ip(2) })
        );
        assert_eq!(decide(Some(ip(1)), Some(&record(START, ip(1))), START + 100, None), Decision::Skip);
        assert_eq!(decide(Some(ip(1)), Some(&record(START, ip(1))), START + 100, Some(3600)), Decision::Skip);
        assert_eq!(
            decide(Some(ip(1)), Some(&record(START, ip(1))), START + 3600, Some(3600)),
            Decision::Update(Reason::MaxIntervalElapsed { elapsed: 3600 })
        );
    }

    #[test]
    fn test_decide_clock_went_backwards() {
        assert_eq!(decide(Some(ip(1)), Some(&record(START, ip(1))), START - 10, Some(60)), Decision::Skip);
    }

    #[test]
    fn test_unchanged_address_makes_no_connection() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("ipupdate.cache");
        state::write(&cache, &record(START - 60, ip(1))).unwrap();

        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            cache_file: Some(cache.clone()),
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(transport.connects(), 0);
        assert_eq!(state::read(&cache).unwrap(), Some(record(START - 60, ip(1))));
    }

    #[test]
    fn test_changed_address_updates_and_caches() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("ipupdate.cache");
        state::write(&cache, &record(START - 60, ip(9))).unwrap();

        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            cache_file: Some(cache.clone()),
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(transport.connects(), 1);
        assert!(transport.sent().contains("myip=192.0.2.1"));
        assert_eq!(state::read(&cache).unwrap(), Some(record(START, ip(1))));
    }

    #[test]
    fn test_service_default_max_interval_forces_refresh() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("ipupdate.cache");
        state::write(&cache, &record(START - 25 * 86400, ip(1))).unwrap();

        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&["HTTP/1.0 200 OK\r\n\r\nnochg\n"]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            cache_file: Some(cache.clone()),
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(transport.connects(), 1);
        // nochg still restarts the countdown
        assert_eq!(state::read(&cache).unwrap(), Some(record(START, ip(1))));
    }

    #[test]
    fn test_configured_max_interval_overrides_default() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("ipupdate.cache");
        state::write(&cache, &record(START - 7200, ip(1))).unwrap();

        let provider = create_provider("ezip").unwrap();
        let transport = MockTransport::replying(&["HTTP/1.0 200 OK\r\n\r\n"]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            service_type: "ezip".to_string(),
            cache_file: Some(cache),
            max_interval: Some(3600),
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(transport.connects(), 1);
    }

    #[test]
    fn test_retry_bound() {
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::failing(TransportError::Timeout);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            retries: 3,
            ..dyndns_config()
        };
        let err = updater.run_once(&config).unwrap_err();
        assert!(matches!(
            err,
            RunError::Update {
                outcome: UpdateOutcome::TransportError(TransportError::Timeout),
                ..
            }
        ));
        assert_eq!(transport.connects(), 3);
        assert_eq!(clock.sleeps(), vec![RETRY_BACKOFF, RETRY_BACKOFF]);
    }

    #[test]
    fn test_retry_stops_at_first_success() {
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[])
            .then_fail(TransportError::Timeout)
            .then_reply(GOOD);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            retries: 5,
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(transport.connects(), 2);
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&["HTTP/1.0 401 Unauthorized\r\n\r\n", GOOD]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            retries: 3,
            ..dyndns_config()
        };
        assert!(matches!(
            updater.run_once(&config),
            Err(RunError::Update {
                outcome: UpdateOutcome::AuthFailure,
                ..
            })
        ));
        assert_eq!(transport.connects(), 1);
    }

    #[test]
    fn test_one_shot_resolve_failure_is_fatal() {
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[None]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            address: None,
            interface: Some("ppp0".to_string()),
            ..dyndns_config()
        };
        assert!(matches!(updater.run_once(&config), Err(RunError::Lookup(_))));
        assert_eq!(transport.connects(), 0);
    }

    #[test]
    fn test_one_shot_cache_read_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            cache_file: Some(dir.path().to_path_buf()),
            ..dyndns_config()
        };
        assert!(matches!(updater.run_once(&config), Err(RunError::Cache(_))));
        assert_eq!(transport.connects(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_post_update_command() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("hook.out");

        let provider = create_provider("null").unwrap();
        let transport = MockTransport::replying(&[]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            service_type: "null".to_string(),
            address: Some(ip(7)),
            execute: Some(format!("echo addr={{ip}} > {}", marker.display())),
            ..Default::default()
        };
        updater.run_once(&config).unwrap();
        assert_eq!(fs::read_to_string(&marker).unwrap(), "addr=192.0.2.7\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_post_update_command_appends_address() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("hook.out");
        run_hook(&format!("sh -c 'echo \"$0\" > {}'", marker.display()), Some(ip(8)));
        assert_eq!(fs::read_to_string(&marker).unwrap(), "192.0.2.8\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_no_change_skips_command() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("hook.out");

        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&["HTTP/1.0 200 OK\r\n\r\nnochg\n"]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            execute: Some(format!("touch {}", marker.display())),
            ..dyndns_config()
        };
        updater.run_once(&config).unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn test_failing_command_does_not_fail_update() {
        let provider = create_provider("null").unwrap();
        let transport = MockTransport::replying(&[]);
        let clock = ManualClock::at(START);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            service_type: "null".to_string(),
            execute: Some("exit 3".to_string()),
            ..Default::default()
        };
        assert!(updater.run_once(&config).is_ok());
    }

    #[test]
    fn test_daemon_change_detection() {
        let signals = Signals::new();
        let clock = StoppingClock {
            clock: ManualClock::at(START),
            signals: &signals,
            stop_at: START + 150,
        };
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD, GOOD]);
        let lookup = ScriptedLookup::new(&[Some(ip(1)), Some(ip(1)), Some(ip(2))]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            address: None,
            interface: Some("ppp0".to_string()),
            daemon: true,
            period: 60,
            ..dyndns_config()
        };
        updater.run_daemon(config, &signals, &no_reload).unwrap();

        // cycles at 0s, 60s and 120s; only the first and the changed one update
        assert_eq!(transport.connects(), 2);
        let sent = transport.sent();
        assert!(sent.contains("myip=192.0.2.1"));
        assert!(sent.contains("myip=192.0.2.2"));
    }

    #[test]
    fn test_daemon_resolve_failure_waits_resolve_period() {
        let signals = Signals::new();
        let clock = StoppingClock {
            clock: ManualClock::at(START),
            signals: &signals,
            stop_at: START + 45,
        };
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let lookup = ScriptedLookup::new(&[None, Some(ip(3))]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            address: None,
            interface: Some("ppp0".to_string()),
            daemon: true,
            period: 600,
            resolv_period: 30,
            ..dyndns_config()
        };
        updater.run_daemon(config, &signals, &no_reload).unwrap();

        // failed at 0s, retried and updated at 30s, then paused until stopped
        assert_eq!(transport.connects(), 1);
        assert_eq!(clock.now(), START + 45);
    }

    #[test]
    fn test_daemon_failure_resets_state() {
        let signals = Signals::new();
        let clock = StoppingClock {
            clock: ManualClock::at(START),
            signals: &signals,
            stop_at: START + 90,
        };
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[])
            .then_fail(TransportError::Timeout)
            .then_reply(GOOD);
        let lookup = ScriptedLookup::new(&[Some(ip(1))]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            address: None,
            interface: Some("ppp0".to_string()),
            daemon: true,
            period: 60,
            ..dyndns_config()
        };
        updater.run_daemon(config, &signals, &no_reload).unwrap();

        // same address both times, but the first attempt failed
        assert_eq!(transport.connects(), 2);
    }

    #[test]
    fn test_daemon_writes_cache_and_ignores_bad_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("ipupdate.cache");
        fs::write(&cache, "garbage").unwrap();

        let signals = Signals::new();
        let clock = StoppingClock {
            clock: ManualClock::at(START),
            signals: &signals,
            stop_at: START + 10,
        };
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let config = Config {
            cache_file: Some(cache.clone()),
            daemon: true,
            ..dyndns_config()
        };
        updater.run_daemon(config, &signals, &no_reload).unwrap();
        assert_eq!(state::read(&cache).unwrap(), Some(record(START, ip(1))));
    }

    #[test]
    fn test_daemon_reload_then_shutdown() {
        let signals = Signals::new();
        let clock = StoppingClock {
            clock: ManualClock::at(START),
            signals: &signals,
            stop_at: START + 30,
        };
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD, GOOD]);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        let reload = || -> Result<Config, Box<dyn Error>> {
            Ok(Config {
                host: Some("bar.example.com".to_string()),
                daemon: true,
                period: 10,
                ..dyndns_config()
            })
        };

        let config = Config {
            daemon: true,
            period: 10,
            ..dyndns_config()
        };
        signals.request(Action::Reload);
        updater.run_daemon(config, &signals, &reload).unwrap();

        // the reload is taken before the first cycle and forces it
        assert_eq!(transport.connects(), 1);
        assert!(transport.sent().contains("hostname=bar.example.com"));
    }

    #[test]
    fn test_daemon_shutdown_before_first_cycle() {
        let signals = Signals::new();
        let clock = ManualClock::at(START);
        let provider = create_provider("dyndns").unwrap();
        let transport = MockTransport::replying(&[GOOD]);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        signals.request(Action::Shutdown);
        updater.run_daemon(dyndns_config(), &signals, &no_reload).unwrap();
        assert_eq!(transport.connects(), 0);
    }

    #[test]
    fn test_pause_is_cut_short() {
        let signals = Signals::new();
        let clock = ManualClock::at(START);
        let provider = create_provider("null").unwrap();
        let transport = MockTransport::replying(&[]);
        let lookup = ScriptedLookup::new(&[]);
        let updater = Updater {
            provider: provider.as_ref(),
            transport: &transport,
            clock: &clock,
            lookup: &lookup,
        };

        updater.pause(5, &signals);
        assert_eq!(clock.total_slept(), Duration::from_secs(5));

        signals.request(Action::Wake);
        updater.pause(600, &signals);
        assert_eq!(clock.total_slept(), Duration::from_secs(5));
    }
}
