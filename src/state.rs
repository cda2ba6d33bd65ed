// src/state.rs

use crate::config::Config;
use crate::repository::DynRepository;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub repo: DynRepository,
    pub config: Config,
}

impl FromRef<AppState> for DynRepository {
    fn from_ref(state: &AppState) -> Self {
        state.repo.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
