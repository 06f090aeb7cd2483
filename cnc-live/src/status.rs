use crate::models::MachineStatus;

/// Code machine brut -> statut. Total : tout code inconnu retombe sur IDLE.
pub fn map_state_to_status(code: i64) -> MachineStatus {
    match code {
        0 => MachineStatus::Idle,
        1 => MachineStatus::Running,
        2 => MachineStatus::Fault,
        _ => MachineStatus::Idle,
    }
}

impl From<i64> for MachineStatus {
    fn from(code: i64) -> Self {
        map_state_to_status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(map_state_to_status(0), MachineStatus::Idle);
        assert_eq!(map_state_to_status(1), MachineStatus::Running);
        assert_eq!(map_state_to_status(2), MachineStatus::Fault);
    }

    #[test]
    fn test_unknown_codes_fall_back_to_idle() {
        for code in [-1, 3, 42, i64::MIN, i64::MAX] {
            assert_eq!(map_state_to_status(code), MachineStatus::Idle, "code {code}");
        }
    }

    proptest! {
        #[test]
        fn prop_out_of_range_is_idle(code in any::<i64>().prop_filter("known code", |c| !(0..=2).contains(c))) {
            prop_assert_eq!(MachineStatus::from(code), MachineStatus::Idle);
        }
    }
}
