//! Configuration validation
//!
//! Validates config consistency:
//! - Sizes, capacities and budgets are non-zero
//! - The category marker is at least two ASCII characters
//! - `dual` is only used with udp
//! - No two receivers share a protocol and port
//! - At least one receiver is configured

use std::collections::HashMap;

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::receivers::{Family, Protocol, ReceiverConfig};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_scanner(config)?;
    validate_channel(config)?;
    validate_scheduler(config)?;
    validate_receivers(config)?;
    Ok(())
}

fn non_zero(component: &'static str, field: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::invalid_value(
            component,
            component,
            field,
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_scanner(config: &Config) -> Result<()> {
    let scanner = &config.scanner;
    non_zero("scanner", "max_message_size", scanner.max_message_size)?;
    non_zero("scanner", "chunk_capacity", scanner.chunk_capacity)?;
    non_zero("scanner", "time_check_interval", scanner.time_check_interval)?;
    non_zero("scanner", "separator_capacity", scanner.separator_capacity)?;

    let marker = &scanner.category_marker;
    if !marker.is_empty() && (marker.len() < 2 || !marker.is_ascii()) {
        return Err(ConfigError::invalid_value(
            "scanner",
            "scanner",
            "category_marker",
            format!("'{marker}' must be at least two ASCII characters"),
        ));
    }
    Ok(())
}

fn validate_channel(config: &Config) -> Result<()> {
    non_zero("channel", "max_buffered_bytes", config.channel.max_buffered_bytes)?;
    non_zero("channel", "max_buffered_chunks", config.channel.max_buffered_chunks)?;
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<()> {
    non_zero("scheduler", "max_batch_size", config.scheduler.max_batch_size)?;
    if config.scheduler.poll_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "scheduler",
            "scheduler",
            "poll_interval",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_receivers(config: &Config) -> Result<()> {
    if config.receivers.is_empty() {
        return Err(ConfigError::NoReceivers);
    }

    let mut ports: HashMap<(Protocol, u16), Vec<String>> = HashMap::new();
    for receiver in &config.receivers {
        validate_receiver(receiver)?;
        ports
            .entry((receiver.protocol, receiver.port))
            .or_default()
            .push(receiver.id());
    }

    // Port 0 asks the OS for a free port and never conflicts
    for ((protocol, port), ids) in ports {
        if port != 0 && ids.len() > 1 {
            return Err(ConfigError::duplicate_port(
                protocol.as_str(),
                port,
                ids.join(", "),
            ));
        }
    }
    Ok(())
}

fn validate_receiver(receiver: &ReceiverConfig) -> Result<()> {
    let id = receiver.id();
    if receiver.family == Family::Dual && receiver.protocol == Protocol::Tcp {
        return Err(ConfigError::invalid_value(
            "receiver",
            id,
            "family",
            "dual is only supported for udp",
        ));
    }
    if receiver.family == Family::Dual && receiver.address.is_some() {
        return Err(ConfigError::invalid_value(
            "receiver",
            id,
            "address",
            "dual listens on both wildcards and takes no address",
        ));
    }
    if receiver.buffer_size == Some(0) {
        return Err(ConfigError::invalid_value(
            "receiver",
            id,
            "buffer_size",
            "must be greater than zero",
        ));
    }
    if receiver.sweep_interval.is_some_and(|d| d.is_zero()) {
        return Err(ConfigError::invalid_value(
            "receiver",
            id,
            "sweep_interval",
            "must be greater than zero",
        ));
    }
    Ok(())
}
