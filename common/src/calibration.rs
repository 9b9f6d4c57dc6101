use crate::{
    config::CalibrationConfig,
    types::{CalibrationStatus, LedMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    /// Armed, waiting for the start delay before the first step.
    Pending { remaining_steps: u32 },
    Running { remaining_steps: u32 },
}

impl CalibrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Pending { .. } => "PENDING",
            Self::Running { .. } => "RUNNING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationAction {
    SetLed(LedMode),
    /// Arm (or re-arm) the step timer relative to now.
    ArmStep(u64),
    DisarmStep,
    Co2ServiceInterval,
    Co2NormalInterval,
    RunCalibration,
    Publish(CalibrationStatus),
}

#[derive(Debug, Clone)]
pub struct CalibrationController {
    config: CalibrationConfig,
    state: CalibrationState,
}

impl CalibrationController {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            state: CalibrationState::Idle,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, CalibrationState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CalibrationState::Running { .. })
    }

    pub fn remaining_steps(&self) -> u32 {
        match self.state {
            CalibrationState::Idle => 0,
            CalibrationState::Pending { remaining_steps }
            | CalibrationState::Running { remaining_steps } => remaining_steps,
        }
    }

    /// Long-press: starts a session when idle, aborts the current one otherwise.
    pub fn toggle(&mut self) -> Vec<CalibrationAction> {
        if self.is_active() {
            self.abort()
        } else {
            self.start()
        }
    }

    pub fn abort(&mut self) -> Vec<CalibrationAction> {
        if !self.is_active() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.finish(&mut actions);
        actions
    }

    /// Step timer fired. A stale fire after an abort is ignored.
    pub fn step(&mut self) -> Vec<CalibrationAction> {
        let remaining = match self.state {
            CalibrationState::Idle => return Vec::new(),
            CalibrationState::Pending { remaining_steps }
            | CalibrationState::Running { remaining_steps } => remaining_steps,
        };

        let mut actions = vec![
            CalibrationAction::SetLed(LedMode::BlinkSlow),
            CalibrationAction::Publish(CalibrationStatus::Countdown(remaining)),
            CalibrationAction::Co2ServiceInterval,
            CalibrationAction::RunCalibration,
        ];

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.finish(&mut actions);
        } else {
            self.state = CalibrationState::Running {
                remaining_steps: remaining,
            };
            actions.push(CalibrationAction::ArmStep(self.config.step_interval_ms));
        }

        actions
    }

    fn start(&mut self) -> Vec<CalibrationAction> {
        self.state = CalibrationState::Pending {
            remaining_steps: self.config.steps.max(1),
        };

        vec![
            CalibrationAction::SetLed(LedMode::BlinkFast),
            CalibrationAction::ArmStep(self.config.start_delay_ms),
            CalibrationAction::Publish(CalibrationStatus::Start),
        ]
    }

    fn finish(&mut self, actions: &mut Vec<CalibrationAction>) {
        self.state = CalibrationState::Idle;
        actions.push(CalibrationAction::SetLed(LedMode::Off));
        actions.push(CalibrationAction::DisarmStep);
        actions.push(CalibrationAction::Co2NormalInterval);
        actions.push(CalibrationAction::Publish(CalibrationStatus::End));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn controller() -> CalibrationController {
        CalibrationController::new(CalibrationConfig::default())
    }

    #[test]
    fn hold_while_idle_starts_pending_session() {
        let mut calibration = controller();

        let actions = calibration.toggle();

        assert_eq!(
            actions,
            vec![
                CalibrationAction::SetLed(LedMode::BlinkFast),
                CalibrationAction::ArmStep(240_000),
                CalibrationAction::Publish(CalibrationStatus::Start),
            ]
        );
        assert_eq!(
            calibration.state(),
            CalibrationState::Pending {
                remaining_steps: 32
            }
        );
        assert!(calibration.is_active());
        assert!(!calibration.is_running());
    }

    #[test]
    fn hold_while_pending_aborts_without_stepping() {
        let mut calibration = controller();
        calibration.toggle();

        let actions = calibration.toggle();

        assert_eq!(
            actions,
            vec![
                CalibrationAction::SetLed(LedMode::Off),
                CalibrationAction::DisarmStep,
                CalibrationAction::Co2NormalInterval,
                CalibrationAction::Publish(CalibrationStatus::End),
            ]
        );
        assert_eq!(calibration.state(), CalibrationState::Idle);
        assert!(!actions.contains(&CalibrationAction::RunCalibration));
    }

    #[test]
    fn first_step_enters_running_and_rearms() {
        let mut calibration = controller();
        calibration.toggle();

        let actions = calibration.step();

        assert_eq!(
            actions,
            vec![
                CalibrationAction::SetLed(LedMode::BlinkSlow),
                CalibrationAction::Publish(CalibrationStatus::Countdown(32)),
                CalibrationAction::Co2ServiceInterval,
                CalibrationAction::RunCalibration,
                CalibrationAction::ArmStep(60_000),
            ]
        );
        assert_eq!(
            calibration.state(),
            CalibrationState::Running {
                remaining_steps: 31
            }
        );
    }

    #[test]
    fn countdown_ends_after_all_steps() {
        let mut calibration = controller();
        calibration.toggle();

        let mut rounds = Vec::new();
        for _ in 0..32 {
            assert!(calibration.is_active());
            rounds.push(calibration.step());
        }

        let countdown: Vec<u32> = rounds
            .iter()
            .flatten()
            .filter_map(|action| match action {
                CalibrationAction::Publish(CalibrationStatus::Countdown(n)) => Some(*n),
                _ => None,
            })
            .collect();
        let last = rounds.last().unwrap();

        assert_eq!(countdown, (1..=32).rev().collect::<Vec<_>>());
        assert_eq!(calibration.state(), CalibrationState::Idle);
        assert_eq!(
            last.last(),
            Some(&CalibrationAction::Publish(CalibrationStatus::End))
        );
        assert!(!last.iter().any(|a| matches!(a, CalibrationAction::ArmStep(_))));
    }

    #[test]
    fn abort_while_idle_is_noop() {
        let mut calibration = controller();

        assert!(calibration.abort().is_empty());
        assert!(calibration.step().is_empty());
        assert_eq!(calibration.state(), CalibrationState::Idle);
    }

    #[test]
    fn abort_while_running_ends_once() {
        let mut calibration = controller();
        calibration.toggle();
        calibration.step();
        calibration.step();

        let actions = calibration.abort();
        assert!(actions.contains(&CalibrationAction::Publish(CalibrationStatus::End)));
        assert!(calibration.abort().is_empty());
    }

    #[test]
    fn single_step_session() {
        let mut calibration = CalibrationController::new(CalibrationConfig {
            steps: 1,
            ..CalibrationConfig::default()
        });
        calibration.toggle();

        let actions = calibration.step();

        assert!(actions.contains(&CalibrationAction::RunCalibration));
        assert!(actions.contains(&CalibrationAction::Publish(CalibrationStatus::End)));
        assert_eq!(calibration.state(), CalibrationState::Idle);
    }
}
