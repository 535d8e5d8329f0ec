//! Sequencer configuration

use seqcmd_core::constants::{MAX_CMDS_PER_SEC, NUM_RTS, PIPE_DEPTH, SB_TIMEOUT_MS};
use seqcmd_core::env::env_parse;
use std::time::Duration;

/// Configuration for the sequencer task
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Per-tick command emission budget
    pub max_cmds_per_tick: u16,

    /// Input pipe depth
    pub pipe_depth: usize,

    /// Input pipe receive timeout
    pub sb_timeout: Duration,

    /// RTS started automatically after a power-on reset (0 = none)
    pub auto_start_power_on: u16,

    /// RTS started automatically after a processor reset (0 = none)
    pub auto_start_proc_reset: u16,

    /// Power-up state of the continue-on-checksum-failure flag
    pub continue_on_failure: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_cmds_per_tick: env_parse("SEQ_MAX_CMDS_PER_TICK", MAX_CMDS_PER_SEC),
            pipe_depth: PIPE_DEPTH,
            sb_timeout: Duration::from_millis(SB_TIMEOUT_MS),
            auto_start_power_on: 0,
            auto_start_proc_reset: 0,
            continue_on_failure: seqcmd_core::constants::CONT_ON_FAILURE_START,
        }
    }
}

impl SequencerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-tick command budget
    pub fn max_cmds_per_tick(mut self, n: u16) -> Self {
        self.max_cmds_per_tick = n;
        self
    }

    /// Set the input pipe depth
    pub fn pipe_depth(mut self, n: usize) -> Self {
        self.pipe_depth = n;
        self
    }

    /// Set the input pipe receive timeout
    pub fn sb_timeout(mut self, d: Duration) -> Self {
        self.sb_timeout = d;
        self
    }

    /// Select the RTS auto-started after a power-on reset
    pub fn auto_start_power_on(mut self, rts_num: u16) -> Self {
        self.auto_start_power_on = rts_num;
        self
    }

    /// Select the RTS auto-started after a processor reset
    pub fn auto_start_proc_reset(mut self, rts_num: u16) -> Self {
        self.auto_start_proc_reset = rts_num;
        self
    }

    /// Set the power-up continue-on-checksum-failure state
    pub fn continue_on_failure(mut self, on: bool) -> Self {
        self.continue_on_failure = on;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_cmds_per_tick == 0 {
            return Err("max_cmds_per_tick must be at least 1");
        }
        if self.pipe_depth == 0 {
            return Err("pipe_depth must be at least 1");
        }
        if self.auto_start_power_on as usize > NUM_RTS {
            return Err("auto_start_power_on exceeds the RTS pool");
        }
        if self.auto_start_proc_reset as usize > NUM_RTS {
            return Err("auto_start_proc_reset exceeds the RTS pool");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SequencerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let cfg = SequencerConfig::new()
            .max_cmds_per_tick(4)
            .pipe_depth(2)
            .auto_start_power_on(1)
            .continue_on_failure(false);
        assert_eq!(cfg.max_cmds_per_tick, 4);
        assert_eq!(cfg.pipe_depth, 2);
        assert_eq!(cfg.auto_start_power_on, 1);
        assert!(!cfg.continue_on_failure);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(SequencerConfig::new().max_cmds_per_tick(0).validate().is_err());
        assert!(SequencerConfig::new().pipe_depth(0).validate().is_err());
        assert!(SequencerConfig::new()
            .auto_start_power_on(NUM_RTS as u16 + 1)
            .validate()
            .is_err());
    }
}
