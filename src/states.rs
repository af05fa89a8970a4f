//! The avatar states the controller can announce and the assets shown for them.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarState {
    /// Listening to the user.
    Escuchar,
    /// Thinking about an answer.
    Procesar,
    /// Speaking.
    Hablar,
}

impl AvatarState {
    pub const ALL: [AvatarState; 3] = [
        AvatarState::Escuchar,
        AvatarState::Procesar,
        AvatarState::Hablar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AvatarState::Escuchar => "escuchar",
            AvatarState::Procesar => "procesar",
            AvatarState::Hablar => "hablar",
        }
    }
}

impl fmt::Display for AvatarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown avatar state '{}'", self.0)
    }
}

impl std::error::Error for UnknownState {}

/// Names are matched exactly, `"Hablar"` is not a known state.
impl FromStr for AvatarState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AvatarState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Asset path for every state. Paths are relative to the page origin in the
/// browser and to the asset root natively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetTable {
    pub escuchar: String,
    pub procesar: String,
    pub hablar: String,
}

impl Default for AssetTable {
    fn default() -> Self {
        Self {
            escuchar: "/model_escuchar.fbx".to_string(),
            procesar: "/model_procesar.fbx".to_string(),
            hablar: "/model_hablar.fbx".to_string(),
        }
    }
}

impl AssetTable {
    pub fn path(&self, state: AvatarState) -> &str {
        match state {
            AvatarState::Escuchar => &self.escuchar,
            AvatarState::Procesar => &self.procesar,
            AvatarState::Hablar => &self.hablar,
        }
    }

    /// Maps a state name to its asset, `None` for names outside the table.
    pub fn resolve(&self, name: &str) -> Option<(AvatarState, &str)> {
        let state = name.parse::<AvatarState>().ok()?;
        Some((state, self.path(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_the_shipped_assets() {
        let table = AssetTable::default();
        assert_eq!(
            table.resolve("procesar"),
            Some((AvatarState::Procesar, "/model_procesar.fbx"))
        );
        assert_eq!(table.path(AvatarState::Hablar), "/model_hablar.fbx");
    }

    #[test]
    fn unknown_and_miscased_names_do_not_resolve() {
        let table = AssetTable::default();
        assert_eq!(table.resolve("dormir"), None);
        assert_eq!(table.resolve("Hablar"), None);
        assert_eq!(table.resolve(""), None);
    }
}
