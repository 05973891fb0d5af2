//! Input hooks.
//!
//! Scenes and objects may opt into input by implementing [`InputHandler`].
//! Every hook defaults to doing nothing, so implementors only override what
//! they use.

use winit::{
    event::{ElementState, KeyEvent, MouseButton},
    keyboard::PhysicalKey,
};

pub trait InputHandler {
    fn on_pointer_pressed(&mut self, _button: MouseButton, _x: f64, _y: f64) {}
    fn on_pointer_released(&mut self, _button: MouseButton, _x: f64, _y: f64) {}
    fn on_pointer_moved(&mut self, _x: f64, _y: f64) {}
    fn on_key_down(&mut self, _key: PhysicalKey) {}
    fn on_key_up(&mut self, _key: PhysicalKey) {}

    /// Routes a winit keyboard event to the key hooks.
    fn on_key_event(&mut self, event: &KeyEvent) {
        match event.state {
            ElementState::Pressed => self.on_key_down(event.physical_key),
            ElementState::Released => self.on_key_up(event.physical_key),
        }
    }
}
