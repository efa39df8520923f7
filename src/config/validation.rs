use super::defaults::{
    MAX_CONNECT_TIMEOUT_MS, MAX_LINE_BYTES_LIMIT, MAX_RECONNECT_ATTEMPTS_LIMIT, MAX_WORKER_ARGS,
    MAX_WORKER_ARG_BYTES, MIN_CONNECT_TIMEOUT_MS, MIN_LINE_BYTES, WORKER_BINARY_ALLOWLIST,
};
use super::AppConfig;
use crate::address::is_valid_device_address;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and resolve the worker command.
    pub fn validate(&mut self) -> Result<()> {
        if !is_valid_device_address(&self.address) {
            bail!(
                "address '{}' must look like XX:XX:XX:XX:XX:XX (hex pairs)",
                self.address
            );
        }
        if !(1..=MAX_RECONNECT_ATTEMPTS_LIMIT).contains(&self.max_reconnect_attempts) {
            bail!(
                "--max-reconnect-attempts must be between 1 and {MAX_RECONNECT_ATTEMPTS_LIMIT}, got {}",
                self.max_reconnect_attempts
            );
        }
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&self.connect_timeout_ms) {
            bail!(
                "--connect-timeout-ms must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS}, got {}",
                self.connect_timeout_ms
            );
        }
        if !(MIN_LINE_BYTES..=MAX_LINE_BYTES_LIMIT).contains(&self.max_line_bytes) {
            bail!(
                "--max-line-bytes must be between {MIN_LINE_BYTES} and {MAX_LINE_BYTES_LIMIT}, got {}",
                self.max_line_bytes
            );
        }

        let (command, args) = split_worker_command(&self.worker);
        if command.is_empty() {
            bail!("--worker cannot be empty");
        }
        if args.len() > MAX_WORKER_ARGS {
            bail!(
                "--worker accepts at most {MAX_WORKER_ARGS} arguments, got {}",
                args.len()
            );
        }
        for arg in &args {
            if arg.len() > MAX_WORKER_ARG_BYTES {
                bail!("--worker argument exceeds {MAX_WORKER_ARG_BYTES} bytes");
            }
            if arg.chars().any(|ch| ch == '\0' || ch == '\n' || ch == '\r') {
                bail!("--worker arguments cannot contain control characters");
            }
        }
        self.worker_cmd = sanitize_binary(&command, "--worker", WORKER_BINARY_ALLOWLIST)?;
        self.worker_args = args;
        Ok(())
    }
}

pub(super) fn split_worker_command(raw: &str) -> (String, Vec<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (String::new(), Vec::new());
    }
    let parts = shell_words::split(trimmed)
        .unwrap_or_else(|_| trimmed.split_whitespace().map(|s| s.to_string()).collect());
    match parts.split_first() {
        Some((command, args)) => (command.clone(), args.to_vec()),
        None => (String::new(), Vec::new()),
    }
}

pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must start with one of {allowlist:?} or an existing binary path");
}
