use std::collections::HashSet;

use ultraviolet::Vec2;
use winit::event::{MouseButton, VirtualKeyCode};

/// Tracks which keys and mouse buttons are held and accumulates raw mouse
/// motion between frames.
#[derive(Default)]
pub struct InputMap {
    keys_down: HashSet<VirtualKeyCode>,
    mouse_down: HashSet<MouseButton>,
    mouse_delta: Vec2,
}

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_key_press(&mut self, keycode: VirtualKeyCode) {
        self.keys_down.insert(keycode);
    }

    pub fn update_key_release(&mut self, keycode: VirtualKeyCode) {
        self.keys_down.remove(&keycode);
    }

    pub fn is_key_down(&self, keycode: VirtualKeyCode) -> bool {
        self.keys_down.contains(&keycode)
    }

    pub fn update_mouse_press(&mut self, button: MouseButton) {
        self.mouse_down.insert(button);
    }

    pub fn update_mouse_release(&mut self, button: MouseButton) {
        self.mouse_down.remove(&button);
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_down.contains(&button)
    }

    pub fn accumulate_mouse_delta(&mut self, delta: Vec2) {
        self.mouse_delta += delta;
    }

    pub fn take_mouse_delta(&mut self) -> Vec2 {
        std::mem::replace(&mut self.mouse_delta, Vec2::zero())
    }
}
