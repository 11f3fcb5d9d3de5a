use crate::compositor::ViewMode;

/// Opaque native window handle supplied by the window host (X11 window id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle(pub u64);

/// Keys the viewer reacts to. The window host translates keysyms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Escape,
    Q,
}

/// Discrete input events forwarded by the window host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    KeyPress(Key),
    ButtonPress { button: u32, x: i32, y: i32 },
    Motion { x: i32, y: i32 },
    CloseRequested,
}

/// Control action an input event maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SwitchView(ViewMode),
    CycleView,
    Shutdown,
}

/// Map an input event to its control action, if any.
pub fn action_for(event: &WindowEvent) -> Option<Action> {
    match event {
        WindowEvent::KeyPress(Key::Num0) => Some(Action::SwitchView(ViewMode::Tiled)),
        WindowEvent::KeyPress(Key::Num1) => Some(Action::SwitchView(ViewMode::Camera(0))),
        WindowEvent::KeyPress(Key::Num2) => Some(Action::SwitchView(ViewMode::Camera(1))),
        WindowEvent::KeyPress(Key::Num3) => Some(Action::SwitchView(ViewMode::Camera(2))),
        WindowEvent::KeyPress(Key::Num4) => Some(Action::SwitchView(ViewMode::Camera(3))),
        WindowEvent::KeyPress(Key::Escape) | WindowEvent::KeyPress(Key::Q) => {
            Some(Action::Shutdown)
        }
        WindowEvent::ButtonPress { button: 1, .. } => Some(Action::SwitchView(ViewMode::Tiled)),
        WindowEvent::ButtonPress { button: 2, .. } => Some(Action::CycleView),
        WindowEvent::ButtonPress { button: 3, .. } => Some(Action::Shutdown),
        WindowEvent::ButtonPress { .. } => None,
        WindowEvent::Motion { .. } => None,
        WindowEvent::CloseRequested => Some(Action::Shutdown),
    }
}

/// Whether the event counts as user activity for the overlay idle timer.
pub fn is_activity(event: &WindowEvent) -> bool {
    matches!(
        event,
        WindowEvent::Motion { .. } | WindowEvent::ButtonPress { .. }
    )
}
