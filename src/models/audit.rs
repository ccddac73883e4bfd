// src/models/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditEvent {
    Created,
    Updated,
    Deleted,
    Activated,
    Deactivated,
}

impl AuditEvent {
    pub const ALL: &'static [&'static str] = &["created", "updated", "deleted", "activated", "deactivated"];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::Created => "created",
            AuditEvent::Updated => "updated",
            AuditEvent::Deleted => "deleted",
            AuditEvent::Activated => "activated",
            AuditEvent::Deactivated => "deactivated",
        }
    }

    pub fn for_active(active: bool) -> Self {
        if active { AuditEvent::Activated } else { AuditEvent::Deactivated }
    }
}

// Linha do log de auditoria (com o e-mail do autor, se houver)
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Audit {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub event: String,
    pub auditable_type: String,
    pub auditable_id: Uuid,
    #[schema(value_type = Object)]
    pub old_values: Value,
    #[schema(value_type = Object)]
    pub new_values: Value,
    pub url: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// O que um serviço entrega ao repositório para gravar.
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub event: AuditEvent,
    pub auditable_type: &'static str,
    pub auditable_id: Uuid,
    pub old_values: Value,
    pub new_values: Value,
}

/// Quem fez a ação e de onde (preenchido pelo extractor da requisição).
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
}

/// Guarda só as chaves que mudaram entre dois snapshots JSON.
pub fn diff_values(old: &Value, new: &Value) -> (Value, Value) {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        return (old.clone(), new.clone());
    };

    let mut before = serde_json::Map::new();
    let mut after = serde_json::Map::new();

    for (key, new_value) in new_map {
        if key == "updated_at" {
            continue;
        }
        let old_value = old_map.get(key).unwrap_or(&Value::Null);
        if old_value != new_value {
            before.insert(key.clone(), old_value.clone());
            after.insert(key.clone(), new_value.clone());
        }
    }

    (Value::Object(before), Value::Object(after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_keeps_only_changed_keys() {
        let old = json!({ "code": "BOD", "name": "Bodega", "updated_at": "a" });
        let new = json!({ "code": "BOD", "name": "Bodega Central", "updated_at": "b" });

        let (before, after) = diff_values(&old, &new);

        assert_eq!(before, json!({ "name": "Bodega" }));
        assert_eq!(after, json!({ "name": "Bodega Central" }));
    }

    #[test]
    fn event_names_match_choice_list() {
        for event in [AuditEvent::Created, AuditEvent::Updated, AuditEvent::Deleted, AuditEvent::Activated, AuditEvent::Deactivated] {
            assert!(AuditEvent::ALL.contains(&event.as_str()));
        }
        assert_eq!(AuditEvent::for_active(false), AuditEvent::Deactivated);
    }
}
