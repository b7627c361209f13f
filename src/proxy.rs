//! Lifecycle of the nginx proxy under test.
//!
//! Every scenario restarts nginx with its own configuration on the same fixed
//! port, so the port has to be released before the next start. nginx
//! daemonizes itself: `start` returns once the master process is listening and
//! `stop` asks it to quit, falling back to `fuser -k <port>/tcp`.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::GeneralConfig;

/// nginx complains about its compiled-in log path before reading `error_log`
/// from the config; harmless when the harness runs unprivileged
const IGNORED_ALERT: &str = "/var/log/nginx/error.log";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors that can occur while managing the proxy process
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Proxy binary not found: {path}")]
    NotFound { path: String },

    #[error("Proxy binary is not executable: {path}")]
    NotExecutable { path: String },

    #[error("Proxy config not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Proxy exited with {status}: {output}")]
    Exited { status: String, output: String },

    #[error("Proxy did not listen on port {port} within {timeout:?}")]
    StartTimeout { port: u16, timeout: Duration },

    #[error("Port {port} still bound after {timeout:?}")]
    PortStillBound { port: u16, timeout: Duration },
}

/// Start/stop control over the proxy under test
pub trait ProxyControl {
    /// Start with `config` and wait until the port accepts connections
    fn start(&mut self, config: &Path) -> Result<(), ProxyError>;

    /// Stop the running proxy and wait for the port to be released
    fn stop(&mut self) -> Result<(), ProxyError>;

    /// Release the port regardless of who holds it
    fn release_port(&mut self) -> Result<(), ProxyError>;
}

/// An nginx binary built with the ALPaCA module
#[derive(Debug, Clone)]
pub struct NginxProxy {
    binary: PathBuf,
    port: u16,
    start_timeout: Duration,
    release_timeout: Duration,
    /// Config of the running instance, needed for `-s stop`
    running_config: Option<PathBuf>,
}

impl NginxProxy {
    pub fn new(binary: &Path, port: u16, start_timeout: Duration, release_timeout: Duration) -> Self {
        Self {
            binary: binary.to_path_buf(),
            port,
            start_timeout,
            release_timeout,
            running_config: None,
        }
    }

    pub fn from_config(general: &GeneralConfig) -> Self {
        Self::new(
            &general.proxy_binary,
            general.port,
            general.proxy_start_timeout,
            general.port_release_timeout,
        )
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check that the binary exists and is executable
    pub fn validate_binary(&self) -> Result<(), ProxyError> {
        let path = self.binary.display().to_string();
        let metadata = fs::metadata(&self.binary).map_err(|_| ProxyError::NotFound { path: path.clone() })?;

        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ProxyError::NotExecutable { path });
        }
        Ok(())
    }

    /// Run the binary to completion, logging its output
    fn run(&self, args: &[&str], config: &Path) -> Result<(), ProxyError> {
        let output = Command::new(&self.binary)
            .arg("-c")
            .arg(config)
            .args(args)
            .output()
            .map_err(|source| ProxyError::Spawn {
                program: self.binary.display().to_string(),
                source,
            })?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let lines = filter_proxy_output(&combined);
        for line in &lines {
            log::debug!("nginx: {}", line);
        }

        if !output.status.success() {
            return Err(ProxyError::Exited {
                status: output.status.to_string(),
                output: lines.join("; "),
            });
        }
        Ok(())
    }
}

impl ProxyControl for NginxProxy {
    fn start(&mut self, config: &Path) -> Result<(), ProxyError> {
        // nginx resolves a relative -c against its prefix, not the working directory
        let config = fs::canonicalize(config).map_err(|_| ProxyError::ConfigNotFound {
            path: config.display().to_string(),
        })?;

        log::debug!("Starting {} with {}", self.binary.display(), config.display());
        self.run(&[], &config)?;
        self.running_config = Some(config);

        if !wait_for_port(self.port, true, self.start_timeout) {
            return Err(ProxyError::StartTimeout {
                port: self.port,
                timeout: self.start_timeout,
            });
        }
        log::debug!("Proxy listening on port {}", self.port);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProxyError> {
        if let Some(config) = self.running_config.take() {
            if let Err(e) = self.run(&["-s", "stop"], &config) {
                log::warn!("Graceful proxy stop failed: {}", e);
            }
        }
        self.release_port()
    }

    fn release_port(&mut self) -> Result<(), ProxyError> {
        if wait_for_port(self.port, false, self.release_timeout.min(Duration::from_secs(1))) {
            return Ok(());
        }

        log::debug!("Killing processes bound to port {}", self.port);
        match Command::new("fuser")
            .arg("-k")
            .arg(format!("{}/tcp", self.port))
            .output()
        {
            Ok(_) => {}
            Err(e) => log::warn!("Failed to run fuser: {}", e),
        }

        if wait_for_port(self.port, false, self.release_timeout) {
            Ok(())
        } else {
            Err(ProxyError::PortStillBound {
                port: self.port,
                timeout: self.release_timeout,
            })
        }
    }
}

/// Whether something accepts TCP connections on the local port
pub fn is_port_open(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
}

/// Poll until the port reaches the wanted state; `false` on timeout
pub fn wait_for_port(port: u16, open: bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if is_port_open(port) == open {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Non-empty output lines, minus the known-harmless error log alert
pub fn filter_proxy_output(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(IGNORED_ALERT))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tempfile::tempdir;

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_filter_proxy_output() {
        let output = "nginx: [alert] could not open error log file: open() \"/var/log/nginx/error.log\" failed (13: Permission denied)\n\
                      \n\
                      nginx: [emerg] unknown directive \"alpaca_prob\"\n";
        assert_eq!(
            filter_proxy_output(output),
            vec!["nginx: [emerg] unknown directive \"alpaca_prob\""]
        );
    }

    #[test]
    fn test_port_state_detection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_open(port));
        assert!(wait_for_port(port, true, Duration::from_millis(100)));

        drop(listener);
        assert!(wait_for_port(port, false, Duration::from_secs(2)));
    }

    #[test]
    fn test_validate_binary() {
        let dir = tempdir().unwrap();
        let missing = NginxProxy::new(&dir.path().join("nginx"), 8888, Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(missing.validate_binary(), Err(ProxyError::NotFound { .. })));

        let plain = dir.path().join("plain");
        fs::write(&plain, "").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        let proxy = NginxProxy::new(&plain, 8888, Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(proxy.validate_binary(), Err(ProxyError::NotExecutable { .. })));

        let exe = script(dir.path(), "nginx-ok", "exit 0");
        let proxy = NginxProxy::new(&exe, 8888, Duration::from_secs(1), Duration::from_secs(1));
        assert!(proxy.validate_binary().is_ok());
    }

    #[test]
    fn test_start_with_missing_config() {
        let dir = tempdir().unwrap();
        let exe = script(dir.path(), "nginx", "exit 0");
        let mut proxy = NginxProxy::new(&exe, free_port(), Duration::from_millis(200), Duration::from_millis(200));
        let err = proxy.start(&dir.path().join("missing.conf")).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_start_reports_failed_exit() {
        let dir = tempdir().unwrap();
        let exe = script(dir.path(), "nginx", "echo 'nginx: [emerg] bad config' >&2\nexit 1");
        let config = dir.path().join("nginx.conf");
        fs::write(&config, "events {}\n").unwrap();

        let mut proxy = NginxProxy::new(&exe, free_port(), Duration::from_millis(200), Duration::from_millis(200));
        match proxy.start(&config).unwrap_err() {
            ProxyError::Exited { output, .. } => assert_eq!(output, "nginx: [emerg] bad config"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_start_times_out_when_nothing_listens() {
        let dir = tempdir().unwrap();
        let exe = script(dir.path(), "nginx", "exit 0");
        let config = dir.path().join("nginx.conf");
        fs::write(&config, "events {}\n").unwrap();

        let mut proxy = NginxProxy::new(&exe, free_port(), Duration::from_millis(300), Duration::from_millis(300));
        assert!(matches!(
            proxy.start(&config),
            Err(ProxyError::StartTimeout { .. })
        ));
    }

    #[test]
    fn test_release_free_port() {
        let mut proxy = NginxProxy::new(Path::new("nginx"), free_port(), Duration::from_secs(1), Duration::from_secs(1));
        assert!(proxy.release_port().is_ok());
    }
}
