use super::models::HookStatus;

/// Operation a user may trigger on a hook from the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Add,
    Check,
    Delete,
    Reconnect,
}

/// Actions offered for a hook in the given status
pub fn allowed_actions(status: HookStatus) -> &'static [HookAction] {
    match status {
        HookStatus::NoInfo => &[HookAction::Add, HookAction::Check],
        HookStatus::NotFound | HookStatus::Missing => &[HookAction::Add],
        HookStatus::Ok | HookStatus::WaitingForServerResponse => &[HookAction::Check, HookAction::Delete],
        HookStatus::Incorrect | HookStatus::PayloadDeliveryFailed => {
            &[HookAction::Check, HookAction::Reconnect, HookAction::Delete]
        }
        HookStatus::Disabled => &[HookAction::Reconnect, HookAction::Delete],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_hooks_can_only_be_added() {
        assert_eq!(allowed_actions(HookStatus::NotFound), &[HookAction::Add]);
        assert_eq!(allowed_actions(HookStatus::Missing), &[HookAction::Add]);
    }

    #[test]
    fn test_bad_hooks_offer_delete() {
        for status in [HookStatus::Incorrect, HookStatus::Disabled, HookStatus::PayloadDeliveryFailed] {
            assert!(status.is_bad());
            assert!(allowed_actions(status).contains(&HookAction::Delete));
        }
    }
}
