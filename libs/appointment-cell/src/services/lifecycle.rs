// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentStatus, SchedulingError};

#[derive(Debug, Clone, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), SchedulingError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(SchedulingError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// All statuses reachable from `current_status`. `Scheduled -> Scheduled`
    /// is a reschedule.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    pub fn is_terminal(&self, status: AppointmentStatus) -> bool {
        self.valid_transitions(status).is_empty()
    }

    /// Reject starts before `now` when the policy asks for it.
    pub fn validate_start_time(
        &self,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
        reject_past_bookings: bool,
    ) -> Result<(), SchedulingError> {
        if reject_past_bookings && start_time < now {
            return Err(SchedulingError::InvalidTime(format!(
                "cannot schedule appointments in the past ({})",
                start_time.format("%Y-%m-%d %H:%M")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_scheduled_can_reach_every_state() {
        let lifecycle = AppointmentLifecycleService::new();
        for next in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert!(lifecycle
                .validate_status_transition(AppointmentStatus::Scheduled, next)
                .is_ok());
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let lifecycle = AppointmentLifecycleService::new();
        for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(lifecycle.is_terminal(terminal));
            let result = lifecycle.validate_status_transition(terminal, AppointmentStatus::Scheduled);
            assert!(matches!(
                result,
                Err(SchedulingError::InvalidStatusTransition { from, to: AppointmentStatus::Scheduled })
                    if from == terminal
            ));
        }
    }

    #[test]
    fn test_past_start_rejected_only_when_enabled() {
        let lifecycle = AppointmentLifecycleService::new();
        let now = Utc::now();
        let yesterday = now - Duration::days(1);

        assert!(lifecycle.validate_start_time(yesterday, now, false).is_ok());
        assert!(matches!(
            lifecycle.validate_start_time(yesterday, now, true),
            Err(SchedulingError::InvalidTime(_))
        ));
        assert!(lifecycle.validate_start_time(now + Duration::hours(1), now, true).is_ok());
    }
}
