use crate::types::SamplingPhase;

#[derive(Debug, Clone)]
pub struct PhaseController {
    phase: SamplingPhase,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self {
            phase: SamplingPhase::Service,
        }
    }
}

impl PhaseController {
    pub fn phase(&self) -> SamplingPhase {
        self.phase
    }

    /// Returns true only on the call that performs the transition.
    pub fn switch_to_normal(&mut self) -> bool {
        if self.phase == SamplingPhase::Normal {
            return false;
        }
        self.phase = SamplingPhase::Normal;
        true
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn switches_exactly_once() {
        let mut phase = PhaseController::default();
        assert_eq!(phase.phase(), SamplingPhase::Service);

        assert!(phase.switch_to_normal());
        assert!(!phase.switch_to_normal());
        assert_eq!(phase.phase(), SamplingPhase::Normal);
    }
}
