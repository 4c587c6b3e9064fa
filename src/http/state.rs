use crate::session::SessionController;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: SessionController,
}

impl AppState {
    pub fn new(recorder: SessionController) -> Self {
        Self { recorder }
    }
}
