//! Match instance provisioning interface and implementations
//!
//! The queue never creates match instances itself. It asks a
//! [`MatchProvisioner`] for an instance and then for one seat per member.

use crate::error::{QueueError, Result};
use crate::types::{InstanceHandle, JoinOptions, SeatCredential};
use crate::utils::{current_timestamp, generate_instance_id, generate_session_id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// External backend that creates match instances and reserves seats in them
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchProvisioner: Send + Sync {
    /// Create a match instance of the given kind
    async fn create_instance(
        &self,
        kind: &str,
        config: &serde_json::Value,
    ) -> Result<InstanceHandle>;

    /// Reserve a seat for one participant, passing its join options and auth through
    async fn reserve_seat(
        &self,
        instance: &InstanceHandle,
        options: &JoinOptions,
    ) -> Result<SeatCredential>;
}

/// In-process provisioner that hands out seats without a real backend
#[derive(Debug, Default)]
pub struct LocalProvisioner {
    /// Seats reserved per instance id
    instances: Mutex<HashMap<String, usize>>,
}

impl LocalProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances created so far
    pub fn instance_count(&self) -> usize {
        self.instances
            .lock()
            .map(|instances| instances.len())
            .unwrap_or(0)
    }

    /// Seats reserved in an instance
    pub fn seat_count(&self, instance_id: &str) -> usize {
        self.instances
            .lock()
            .ok()
            .and_then(|instances| instances.get(instance_id).copied())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MatchProvisioner for LocalProvisioner {
    async fn create_instance(
        &self,
        kind: &str,
        _config: &serde_json::Value,
    ) -> Result<InstanceHandle> {
        let handle = InstanceHandle {
            instance_id: generate_instance_id(),
            kind: kind.to_string(),
            created_at: current_timestamp(),
        };

        let mut instances = self.instances.lock().map_err(|_| QueueError::ProvisioningError {
            message: "instance table poisoned".to_string(),
        })?;
        instances.insert(handle.instance_id.clone(), 0);

        debug!("Created local {} instance {}", kind, handle.instance_id);
        Ok(handle)
    }

    async fn reserve_seat(
        &self,
        instance: &InstanceHandle,
        options: &JoinOptions,
    ) -> Result<SeatCredential> {
        let mut instances = self.instances.lock().map_err(|_| QueueError::ProvisioningError {
            message: "instance table poisoned".to_string(),
        })?;

        let Some(seats) = instances.get_mut(&instance.instance_id) else {
            return Err(QueueError::ReservationError {
                participant_id: String::new(),
                message: format!("unknown instance {}", instance.instance_id),
            }
            .into());
        };
        *seats += 1;

        Ok(SeatCredential {
            instance_id: instance.instance_id.clone(),
            session_id: generate_session_id(),
            payload: options.payload.clone(),
        })
    }
}
