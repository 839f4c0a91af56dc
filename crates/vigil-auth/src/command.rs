//! Commands handed to the validation chain by the controller layer.
//!
//! Stages match on [`Command`] directly. A stage that only cares about
//! path-bound commands uses [`Command::path_binding`] and lets the rest
//! pass through.

use serde::{Deserialize, Serialize};

/// Identifiers a command takes from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathBinding {
    pub principal_id_from_path: i64,
    pub resource_id: i64,
}

impl PathBinding {
    pub fn new(principal_id_from_path: i64, resource_id: i64) -> Self {
        Self {
            principal_id_from_path,
            resource_id,
        }
    }
}

/// Operation requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    ReadContent(PathBinding),
    UpdateContent(PathBinding),
    DeleteContent(PathBinding),
    ListPrincipalContent(PathBinding),
    /// Liveness probe; carries no path identity.
    HealthProbe,
}

impl Command {
    pub fn read(principal_id_from_path: i64, resource_id: i64) -> Self {
        Self::ReadContent(PathBinding::new(principal_id_from_path, resource_id))
    }

    pub fn update(principal_id_from_path: i64, resource_id: i64) -> Self {
        Self::UpdateContent(PathBinding::new(principal_id_from_path, resource_id))
    }

    pub fn delete(principal_id_from_path: i64, resource_id: i64) -> Self {
        Self::DeleteContent(PathBinding::new(principal_id_from_path, resource_id))
    }

    pub fn list(principal_id_from_path: i64, resource_id: i64) -> Self {
        Self::ListPrincipalContent(PathBinding::new(principal_id_from_path, resource_id))
    }

    /// Path identifiers, if the command carries any.
    pub fn path_binding(&self) -> Option<PathBinding> {
        match self {
            Self::ReadContent(binding)
            | Self::UpdateContent(binding)
            | Self::DeleteContent(binding)
            | Self::ListPrincipalContent(binding) => Some(*binding),
            Self::HealthProbe => None,
        }
    }

    /// Operation name used in audit details.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ReadContent(_) => "read_content",
            Self::UpdateContent(_) => "update_content",
            Self::DeleteContent(_) => "delete_content",
            Self::ListPrincipalContent(_) => "list_principal_content",
            Self::HealthProbe => "health_probe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_binding() {
        assert_eq!(
            Command::update(42, 7).path_binding(),
            Some(PathBinding::new(42, 7))
        );
        assert_eq!(Command::HealthProbe.path_binding(), None);
    }

    #[test]
    fn test_command_serde_tag() {
        let json = serde_json::to_value(Command::delete(1, 2)).unwrap();
        assert_eq!(json["op"], "delete_content");
        assert_eq!(json["principal_id_from_path"], 1);
        assert_eq!(json["resource_id"], 2);

        let probe: Command = serde_json::from_str(r#"{"op":"health_probe"}"#).unwrap();
        assert_eq!(probe, Command::HealthProbe);
    }
}
