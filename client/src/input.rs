//! Keyboard stand-in: maps typed keys to paddle intents with change detection

use shared::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// The paddle intent changed and should be sent.
    Action(Action),
    Quit,
}

/// Turns key presses into discrete events. Repeating the current intent
/// produces nothing, so only transitions go on the wire.
pub struct InputManager {
    current_action: Action,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            current_action: Action::Stop,
        }
    }

    pub fn current_action(&self) -> Action {
        self.current_action
    }

    /// Forgets the current intent so the next movement key is an event again.
    pub fn reset(&mut self) {
        self.current_action = Action::Stop;
    }

    pub fn handle_key(&mut self, key: char) -> Option<InputEvent> {
        let action = match key.to_ascii_lowercase() {
            'a' => Action::MoveLeft,
            'd' => Action::MoveRight,
            's' | ' ' => Action::Stop,
            'q' => return Some(InputEvent::Quit),
            _ => return None,
        };

        // Edge detection: only a change of intent is an event
        if action == self.current_action {
            return None;
        }
        self.current_action = action;
        Some(InputEvent::Action(action))
    }

    /// Processes every key on a typed line in order. Input after a quit is
    /// ignored.
    pub fn handle_line(&mut self, line: &str) -> Vec<InputEvent> {
        let mut events = Vec::new();
        for key in line.trim_end_matches(&['\r', '\n'][..]).chars() {
            if let Some(event) = self.handle_key(key) {
                events.push(event);
                if event == InputEvent::Quit {
                    break;
                }
            }
        }
        events
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
