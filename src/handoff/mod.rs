//! Handoff of ready groups to match instances
//!
//! Provisioning, seat delivery and the confirmation handshake.

pub mod controller;
pub mod notifier;
pub mod provisioner;

pub use controller::{run_handoff, ConfirmStatus, HandoffController, HandoffOutcome};
pub use notifier::{ChannelNotifier, Notifier, RecordingNotifier, TracingNotifier};
pub use provisioner::{LocalProvisioner, MatchProvisioner};
