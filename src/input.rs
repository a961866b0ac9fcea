use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::camera::SpectatorInput;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "PageUp" => PageUp,
        "PageDown" => PageDown,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Keys with a name rather than a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Left,
    Right,
    Up,
    Down,
    Escape,
    PageUp,
    PageDown,
}

/// The six directional inputs polled by the camera each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectatorKey {
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
}

/// Keys that trigger each spectator key. Any bound key counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectatorBindings {
    pub up: Vec<KeyCode>,
    pub down: Vec<KeyCode>,
    pub left: Vec<KeyCode>,
    pub right: Vec<KeyCode>,
    pub page_up: Vec<KeyCode>,
    pub page_down: Vec<KeyCode>,
}

impl Default for SpectatorBindings {
    fn default() -> Self {
        use NamedKey as N;
        Self {
            up: vec![KeyCode::Named(N::Up), KeyCode::Character('W')],
            down: vec![KeyCode::Named(N::Down), KeyCode::Character('S')],
            left: vec![KeyCode::Named(N::Left), KeyCode::Character('A')],
            right: vec![KeyCode::Named(N::Right), KeyCode::Character('D')],
            page_up: vec![KeyCode::Named(N::PageUp), KeyCode::Character('E')],
            page_down: vec![KeyCode::Named(N::PageDown), KeyCode::Character('Q')],
        }
    }
}

impl SpectatorBindings {
    pub fn keys(&self, key: SpectatorKey) -> &[KeyCode] {
        match key {
            SpectatorKey::Up => &self.up,
            SpectatorKey::Down => &self.down,
            SpectatorKey::Left => &self.left,
            SpectatorKey::Right => &self.right,
            SpectatorKey::PageUp => &self.page_up,
            SpectatorKey::PageDown => &self.page_down,
        }
    }

    /// Parses a binding list such as `"Up,W"`. Unknown names are rejected.
    pub fn parse_list(list: &str) -> Option<Vec<KeyCode>> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(KeyCode::from_name)
            .collect()
    }
}

/// Answers whether a spectator key is currently held.
pub trait KeyStateSource {
    fn spectator_key(&self, key: SpectatorKey) -> bool;

    fn spectator_input(&self) -> SpectatorInput {
        SpectatorInput {
            move_forward: self.spectator_key(SpectatorKey::Up),
            move_backward: self.spectator_key(SpectatorKey::Down),
            turn_left: self.spectator_key(SpectatorKey::Left),
            turn_right: self.spectator_key(SpectatorKey::Right),
            look_up: self.spectator_key(SpectatorKey::PageUp),
            look_down: self.spectator_key(SpectatorKey::PageDown),
        }
    }
}

/// Thread-safe pressed-key set written by the event loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    bindings: SpectatorBindings,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(bindings: SpectatorBindings) -> Self {
        Self {
            keys: RwLock::default(),
            bindings,
        }
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    /// Forgets every held key, e.g. when the window loses focus.
    pub fn release_all(&self) {
        self.keys.write().clear();
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    pub fn bindings(&self) -> &SpectatorBindings {
        &self.bindings
    }
}

impl KeyStateSource for InputState {
    fn spectator_key(&self, key: SpectatorKey) -> bool {
        let keys = self.keys.read();
        self.bindings.keys(key).iter().any(|k| keys.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("PageUp"),
            Some(KeyCode::Named(NamedKey::PageUp))
        );
        assert_eq!(KeyCode::from_name("w"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("Hyper"), None);
    }

    #[test]
    fn input_state_tracks_keys() {
        let state = InputState::new();
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        assert!(state.is_key_down_by_name("Space"));
        state.set_key_up(KeyCode::Named(NamedKey::Space));
        assert!(!state.is_key_down_by_name("Space"));
    }

    #[test]
    fn spectator_keys_honour_aliases() {
        let state = InputState::new();
        state.set_key_down(KeyCode::Character('A'));
        state.set_key_down(KeyCode::Named(NamedKey::PageDown));
        let input = state.spectator_input();
        assert!(input.turn_left);
        assert!(input.look_down);
        assert!(!input.move_forward);
        state.release_all();
        assert_eq!(state.spectator_input(), SpectatorInput::default());
    }

    #[test]
    fn custom_bindings_replace_defaults() {
        let bindings = SpectatorBindings {
            up: SpectatorBindings::parse_list("I, Up").unwrap(),
            ..Default::default()
        };
        assert_eq!(
            bindings.up,
            vec![KeyCode::Character('I'), KeyCode::Named(NamedKey::Up)]
        );
        assert!(SpectatorBindings::parse_list("Up,Nope").is_none());

        let state = InputState::with_bindings(bindings);
        state.set_key_down(KeyCode::Character('I'));
        assert!(state.spectator_key(SpectatorKey::Up));
        assert!(!state.spectator_key(SpectatorKey::Down));
    }
}
