// src/common/query_params.rs
//
// O frontend envia filtros em notação de colchetes:
//   filters[is_active]=1&filters[created_at][from]=2024-01-01&ids[]=a&ids[]=b
// O serde_urlencoded do axum só entrega pares planos, então montamos o
// objeto aninhado aqui.

use serde_json::{Map, Value};

/// Monta um objeto JSON aninhado a partir dos pares da query string.
pub fn parse_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut root = Map::new();

    for (key, value) in pairs {
        let segments = split_key(&key);
        if segments.is_empty() {
            continue;
        }
        insert(&mut root, &segments, Value::String(value));
    }

    // `filters` também pode chegar como JSON serializado
    let encoded_filters = match root.get("filters") {
        Some(Value::String(raw)) if raw.trim_start().starts_with('{') => {
            serde_json::from_str::<Value>(raw).ok().filter(Value::is_object)
        }
        _ => None,
    };
    if let Some(filters) = encoded_filters {
        root.insert("filters".into(), filters);
    }

    root
}

/// Lê `ids[]=` (ou `ids=a,b`) como lista de strings.
pub fn string_list(params: &Map<String, Value>, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::Object(map)) => map
            .values()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

// "a[b][]" -> ["a", "b", ""]
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return if key.is_empty() { Vec::new() } else { vec![key.to_string()] };
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];

    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                segments.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => {
                // Colchete sem fechamento: o resto vira um segmento literal
                segments.push(stripped.to_string());
                rest = "";
            }
        }
    }

    if segments[0].is_empty() {
        return Vec::new();
    }
    segments
}

fn insert(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let (head, tail) = (&segments[0], &segments[1..]);

    if tail.is_empty() {
        map.insert(head.clone(), value);
        return;
    }

    // "[]" e índices numéricos ("[0]") viram lista
    let is_list = tail.len() == 1 && (tail[0].is_empty() || tail[0].parse::<usize>().is_ok());

    if is_list {
        let slot = map
            .entry(head.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(value);
        }
        return;
    }

    let slot = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert(child, tail, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_nested_filters() {
        let parsed = parse_pairs(pairs(&[
            ("q", "bod"),
            ("filters[is_active]", "1"),
            ("filters[created_at][from]", "2024-01-01"),
            ("filters[created_at][to]", "2024-02-01"),
        ]));

        assert_eq!(
            Value::Object(parsed),
            json!({
                "q": "bod",
                "filters": {
                    "is_active": "1",
                    "created_at": { "from": "2024-01-01", "to": "2024-02-01" }
                }
            })
        );
    }

    #[test]
    fn collects_bracket_lists() {
        let parsed = parse_pairs(pairs(&[("ids[]", "a"), ("ids[]", "b"), ("ids[2]", "c")]));
        assert_eq!(string_list(&parsed, "ids"), vec!["a", "b", "c"]);
    }

    #[test]
    fn accepts_json_encoded_filters() {
        let parsed = parse_pairs(pairs(&[("filters", r#"{"is_active":"true"}"#)]));
        assert_eq!(parsed["filters"], json!({ "is_active": "true" }));
    }

    #[test]
    fn comma_separated_ids_are_split() {
        let parsed = parse_pairs(pairs(&[("ids", "a, b,,c")]));
        assert_eq!(string_list(&parsed, "ids"), vec!["a", "b", "c"]);
    }

    #[test]
    fn ignores_keys_without_name() {
        let parsed = parse_pairs(pairs(&[("[x]", "1"), ("", "2")]));
        assert!(parsed.is_empty());
    }
}
