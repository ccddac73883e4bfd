pub mod audits;
pub mod auth;
pub mod catalog;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::common::{
    error::AppError,
    list_query::{normalize, IndexConfig, ListQuery},
    query_params::string_list,
};

// Parâmetros da listagem já normalizados (erros viram 422 por campo)
pub(crate) fn list_query(params: &Map<String, Value>, config: &IndexConfig) -> Result<ListQuery, AppError> {
    normalize(params, config).map_err(AppError::ValidationError)
}

// `ids[]=...` da rota `selected`; lixo vira erro em `ids`
pub(crate) fn selected_ids(params: &Map<String, Value>) -> Result<Vec<Uuid>, AppError> {
    string_list(params, "ids")
        .iter()
        .map(|raw| Uuid::parse_str(raw).map_err(|_| AppError::field("ids", format!("Identificador inválido: {}.", raw))))
        .collect()
}

pub(crate) fn format_param(params: &Map<String, Value>) -> Option<&str> {
    params.get("format").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::query_params::parse_pairs;

    fn pairs(raw: &[(&str, &str)]) -> Map<String, Value> {
        parse_pairs(raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn selected_ids_keep_request_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let params = pairs(&[("ids[]", &b.to_string()), ("ids[]", &a.to_string())]);

        assert_eq!(selected_ids(&params).unwrap(), vec![b, a]);
    }

    #[test]
    fn malformed_id_is_a_field_error() {
        let params = pairs(&[("ids[]", "abc")]);
        match selected_ids(&params) {
            Err(AppError::ValidationError(errors)) => assert!(errors.contains("ids")),
            other => panic!("esperava erro de validação, veio {:?}", other),
        }
    }

    #[test]
    fn format_is_read_from_query() {
        assert_eq!(format_param(&pairs(&[("format", "xlsx")])), Some("xlsx"));
        assert_eq!(format_param(&pairs(&[])), None);
    }
}
