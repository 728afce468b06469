// Front-end hooks. The session layer calls these at the points a UI would
// care about; a headless deployment (or a test) plugs in `NullUi`.

use wildcard_protocol::model::GameState;
use wildcard_protocol::types::PlayerId;

pub trait UiNotifier {
    /// Redraw from the current state. `own` is this client's player id,
    /// once known.
    fn render(&mut self, state: &GameState, own: Option<&PlayerId>);

    /// Switch from the lobby to the table. Called once per session.
    fn show_game_scene(&mut self);

    /// Out-of-band message for the player (kick reasons, join errors).
    fn notify(&mut self, message: &str);
}

/// No-op notifier for headless hosts and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullUi;

impl UiNotifier for NullUi {
    fn render(&mut self, _state: &GameState, _own: Option<&PlayerId>) {}
    fn show_game_scene(&mut self) {}
    fn notify(&mut self, _message: &str) {}
}
