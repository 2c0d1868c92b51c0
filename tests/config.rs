//! Tests for scheduler configuration and mode selection.

use anyhow::Result;
use shardwalk::error::SchedulerError;
use shardwalk::scheduler::{ExecMode, Scheduler, SchedulerConfig, DEFAULT_MAX_OUTSTANDING_MERGES};
use std::time::Duration;

#[test]
fn defaults_use_every_cpu() {
    let config = SchedulerConfig::default();
    assert_eq!(config.mode, ExecMode::Hierarchical { threads: None });
    assert_eq!(config.max_outstanding_merges, DEFAULT_MAX_OUTSTANDING_MERGES);
    assert_eq!(config.max_outstanding_merges, 50);
    assert_eq!(config.runtime_limit, None);
    assert_eq!(config.threads(), num_cpus::get());
}

#[test]
fn linear_mode_has_one_thread() {
    assert_eq!(SchedulerConfig::linear().threads(), 1);
    assert_eq!(SchedulerConfig::hierarchical(6).threads(), 6);
}

#[test]
fn zero_threads_are_rejected() {
    let err = Scheduler::new(SchedulerConfig::hierarchical(0)).err().expect("invalid config");
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::InvalidConfig(_))
    ));
}

#[test]
fn zero_merge_bound_is_rejected() {
    let config = SchedulerConfig {
        max_outstanding_merges: 0,
        ..SchedulerConfig::default()
    };
    assert!(matches!(config.validate(), Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn oversubscription_is_allowed() -> Result<()> {
    let threads = num_cpus::get() * 2 + 1;
    let scheduler = Scheduler::new(SchedulerConfig::hierarchical(threads))?;
    assert_eq!(scheduler.threads(), threads);
    Ok(())
}

#[test]
fn loads_from_json() -> Result<()> {
    let config: SchedulerConfig = serde_json::from_str(
        r#"{ "mode": { "Hierarchical": { "threads": 2 } }, "runtime_limit": { "secs": 5, "nanos": 0 } }"#,
    )?;
    assert_eq!(config.threads(), 2);
    assert_eq!(config.max_outstanding_merges, 50);
    assert_eq!(config.runtime_limit, Some(Duration::from_secs(5)));

    let linear: SchedulerConfig = serde_json::from_str(r#"{ "mode": "Linear" }"#)?;
    assert_eq!(linear, SchedulerConfig::linear());

    let empty: SchedulerConfig = serde_json::from_str("{}")?;
    assert_eq!(empty, SchedulerConfig::default());
    Ok(())
}
