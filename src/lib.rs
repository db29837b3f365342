//! Nagios style health checks for OpenStack deployments.
//!
//! * `nova-instance` spawns a throwaway compute instance, optionally probes
//!   it over SSH, deletes it and reports timings as performance data.
//! * `pacemaker-host` finds which cluster node runs a pacemaker resource and
//!   delegates the real check to a local script when this node owns it.
//!
//! Every check ends in a single plugin line and a conventional exit code,
//! see [`plugin`].
pub mod cmd;
pub mod compute;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod pacemaker;
pub mod plugin;
pub mod ssh;
