use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    MoveForward,
    MoveBack,
    MoveLeft,
    MoveRight,
    Quit,
}

const ACTION_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveForward => 0,
            InputAction::MoveBack => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::Quit => 4,
        }
    }
}

/// Input for one fixed tick. `begin` and `interact` are edges: true only on
/// the tick the press happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    actions: ActionStates,
    begin_pressed: bool,
    interact_pressed: bool,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.actions.is_down(InputAction::Quit)
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub fn begin_pressed(&self) -> bool {
        self.begin_pressed
    }

    pub fn interact_pressed(&self) -> bool {
        self.interact_pressed
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.set(action, is_down);
        self
    }

    pub fn with_begin_pressed(mut self, begin_pressed: bool) -> Self {
        self.begin_pressed = begin_pressed;
        self
    }

    pub fn with_interact_pressed(mut self, interact_pressed: bool) -> Self {
        self.interact_pressed = interact_pressed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_is_an_action() {
        let snapshot = InputSnapshot::empty().with_action_down(InputAction::Quit, true);
        assert!(snapshot.quit_requested());
        assert!(!snapshot.is_down(InputAction::MoveForward));
    }

    #[test]
    fn action_names_deserialize_in_snake_case() {
        let parsed: Vec<InputAction> =
            serde_json::from_str(r#"["move_forward","move_left"]"#).expect("actions");
        assert_eq!(parsed, vec![InputAction::MoveForward, InputAction::MoveLeft]);
    }
}
