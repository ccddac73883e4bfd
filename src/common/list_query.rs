// src/common/list_query.rs
//
// Normalização das requisições de listagem (q, page, per_page, sort, dir, filters).
// Cada recurso declara um `IndexConfig` com o que pode ser ordenado e filtrado.

use std::{cmp::Ordering, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::FieldErrors;

pub const MAX_TEXT_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Bool,
    Uuid,
    Text,
    Choice(&'static [&'static str]),
    NumberRange,
    DateRange,
}

#[derive(Debug)]
pub struct FilterDef {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

#[derive(Debug)]
pub struct SortDef {
    pub key: &'static str,
    pub column: &'static str,
}

/// Regras de listagem de um recurso.
#[derive(Debug)]
pub struct IndexConfig {
    pub sorts: &'static [SortDef],
    pub default_sort: &'static str,
    pub default_dir: SortDir,
    pub default_per_page: u32,
    pub max_per_page: u32,
    pub filters: &'static [FilterDef],
    /// Colunas usadas na busca livre (`q`)
    pub search: &'static [&'static str],
    /// Ajuste final específico do recurso
    pub sanitize: Option<fn(&mut ListQuery)>,
}

impl IndexConfig {
    pub fn sort_column(&self, key: &str) -> Option<&'static str> {
        self.sorts.iter().find(|s| s.key == key).map(|s| s.column)
    }

    pub fn filter(&self, key: &str) -> Option<&FilterDef> {
        self.filters.iter().find(|f| f.key == key)
    }
}

/// Consulta de listagem já validada e canônica.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: u32,
    pub per_page: u32,
    pub sort: String,
    pub dir: SortDir,
    #[schema(value_type = Object)]
    pub filters: Map<String, Value>,
}

impl ListQuery {
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.per_page)
    }

    pub fn filter(&self, key: &str) -> Option<&Value> {
        self.filters.get(key)
    }

    /// Primeira página, sem filtros, com os padrões do recurso.
    pub fn defaults(config: &IndexConfig) -> Self {
        Self {
            q: None,
            page: 1,
            per_page: config.default_per_page.clamp(1, config.max_per_page.max(1)),
            sort: config.default_sort.to_string(),
            dir: config.default_dir,
            filters: Map::new(),
        }
    }
}

/// Valida e normaliza os parâmetros brutos de uma listagem.
pub fn normalize(input: &Map<String, Value>, config: &IndexConfig) -> Result<ListQuery, FieldErrors> {
    let mut errors = FieldErrors::new();

    // 1. dir em minúsculas
    let dir_raw = scalar_param(input, "dir", &mut errors).map(|d| d.to_lowercase());

    // 2. booleanos vindos como texto
    let mut filters = input.get("filters").cloned().unwrap_or(Value::Null);
    prune_empty(&mut filters);
    if let Value::Object(map) = &mut filters {
        for (key, value) in map.iter_mut() {
            let coerce = config
                .filter(key)
                .map(|def| matches!(def.kind, FilterKind::Bool))
                .unwrap_or(true);
            if coerce {
                coerce_booleans(value);
            }
        }
    }

    // 3. regras
    let q = match scalar_param(input, "q", &mut errors) {
        Some(text) if text.chars().count() > MAX_TEXT_LENGTH => {
            errors.add("q", format!("La búsqueda no puede superar {} caracteres.", MAX_TEXT_LENGTH));
            None
        }
        other => other,
    };

    let page = match scalar_param(input, "page", &mut errors) {
        None => 1,
        Some(raw) => match parse_int(&raw) {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => {
                errors.add("page", "La página debe ser un número entero mayor o igual a 1.");
                1
            }
        },
    };

    let per_page_raw = match scalar_param(input, "per_page", &mut errors) {
        None => None,
        Some(raw) => match parse_int(&raw) {
            Some(n) => Some(n),
            None => {
                errors.add("per_page", "La cantidad por página debe ser un número entero.");
                None
            }
        },
    };

    let sort = match scalar_param(input, "sort", &mut errors) {
        None => config.default_sort.to_string(),
        Some(key) => {
            if config.sort_column(&key).is_none() {
                errors.add("sort", "El campo de ordenamiento no es válido.");
            }
            key
        }
    };

    let dir = match dir_raw {
        None => config.default_dir,
        Some(raw) => SortDir::parse(&raw).unwrap_or_else(|| {
            errors.add("dir", "La dirección debe ser 'asc' o 'desc'.");
            config.default_dir
        }),
    };

    if let Value::Object(map) = &filters {
        for (key, value) in map {
            match config.filter(key) {
                Some(def) => validate_filter(def, value, &mut errors),
                None => errors.add(format!("filters.{}", key), "Filtro no permitido."),
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // 4. per_page padrão e limite
    let max = i64::from(config.max_per_page.max(1));
    let per_page = per_page_raw
        .unwrap_or_else(|| i64::from(config.default_per_page))
        .clamp(1, max) as u32;

    // 5. filters sempre objeto
    let mut filters = match filters {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    // 6. intervalos invertidos
    swap_ranges(&mut filters);

    let filters = match filters {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut query = ListQuery {
        q,
        page,
        per_page,
        sort,
        dir,
        filters,
    };

    // 7. gancho do recurso
    if let Some(sanitize) = config.sanitize {
        sanitize(&mut query);
    }

    Ok(query)
}

fn validate_filter(def: &FilterDef, value: &Value, errors: &mut FieldErrors) {
    let field = format!("filters.{}", def.key);

    match def.kind {
        FilterKind::Bool => {
            if !value.is_boolean() {
                errors.add(field, "El filtro debe ser verdadero o falso.");
            }
        }
        FilterKind::Uuid => {
            let valid = value.as_str().map(|s| Uuid::parse_str(s.trim()).is_ok()).unwrap_or(false);
            if !valid {
                errors.add(field, "El identificador no es válido.");
            }
        }
        FilterKind::Text => match scalar(value) {
            Some(text) if text.chars().count() <= MAX_TEXT_LENGTH => {}
            Some(_) => errors.add(field, format!("No puede superar {} caracteres.", MAX_TEXT_LENGTH)),
            None => errors.add(field, "El filtro debe ser texto."),
        },
        FilterKind::Choice(options) => {
            let valid = value.as_str().map(|s| options.contains(&s.trim())).unwrap_or(false);
            if !valid {
                errors.add(field, format!("Valores permitidos: {}.", options.join(", ")));
            }
        }
        FilterKind::NumberRange | FilterKind::DateRange => {
            let Value::Object(range) = value else {
                errors.add(field, "El filtro debe ser un rango {from, to}.");
                return;
            };
            for (side, bound) in range {
                let side_field = format!("{}.{}", field, side);
                if side != "from" && side != "to" {
                    errors.add(side_field, "Solo se permiten 'from' y 'to'.");
                    continue;
                }
                let valid = match def.kind {
                    FilterKind::NumberRange => number_bound(bound).is_some(),
                    _ => bound.as_str().and_then(parse_datetime).is_some(),
                };
                if !valid {
                    let message = if def.kind == FilterKind::NumberRange {
                        "Debe ser un número."
                    } else {
                        "Debe ser una fecha válida."
                    };
                    errors.add(side_field, message);
                }
            }
        }
    }
}

// Lê um parâmetro escalar; vazio conta como ausente, lista/objeto é erro
fn scalar_param(input: &Map<String, Value>, key: &str, errors: &mut FieldErrors) -> Option<String> {
    match input.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => match scalar(value) {
            Some(text) => {
                let text = text.trim();
                if text.is_empty() { None } else { Some(text.to_string()) }
            }
            None => {
                errors.add(key, "Debe ser un valor simple.");
                None
            }
        },
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Inteiros que não cabem em i64 saturam em vez de falhar
fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return Some(if raw.starts_with('-') { i64::MIN } else { i64::MAX });
    }
    None
}

/// Remove strings vazias, nulos e objetos que ficaram vazios.
pub fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                prune_empty(child);
            }
            map.retain(|_, v| !is_blank(v));
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                prune_empty(child);
            }
            items.retain(|v| !is_blank(v));
        }
        _ => {}
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// "true"/"1" -> true, "false"/"0" -> false, em qualquer profundidade.
/// Limites de intervalo (`from`/`to`) ficam como vieram.
pub fn coerce_booleans(value: &mut Value) {
    match value {
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => *value = Value::Bool(true),
            "false" | "0" => *value = Value::Bool(false),
            _ => {}
        },
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key != "from" && key != "to" {
                    coerce_booleans(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(coerce_booleans),
        _ => {}
    }
}

/// Troca `from`/`to` quando ambos são comparáveis e estão invertidos.
pub fn swap_ranges(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };

    if let (Some(from), Some(to)) = (map.get("from"), map.get("to")) {
        if compare_bounds(from, to) == Some(Ordering::Greater) {
            let from = map.remove("from");
            let to = map.remove("to");
            if let (Some(from), Some(to)) = (from, to) {
                map.insert("from".into(), to);
                map.insert("to".into(), from);
            }
        }
    }

    for child in map.values_mut() {
        swap_ranges(child);
    }
}

// Só compara número com número ou data com data
fn compare_bounds(a: &Value, b: &Value) -> Option<Ordering> {
    // Mesma precisão usada no SQL; f64 só se não couber em Decimal
    if let (Some(x), Some(y)) = (number_bound(a), number_bound(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    let (x, y) = (a.as_str().and_then(parse_datetime)?, b.as_str().and_then(parse_datetime)?);
    Some(x.cmp(&y))
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    {
        return Some(dt);
    }
    parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Limite de data para SQL; uma data sem hora no lado `to` cobre o dia inteiro.
pub fn date_bound(value: &Value, upper: bool) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    let naive = match parse_date(raw) {
        Some(date) if upper => date.and_hms_micro_opt(23, 59, 59, 999_999)?,
        Some(date) => date.and_hms_opt(0, 0, 0)?,
        None => parse_datetime(raw)?,
    };
    Some(Utc.from_utc_datetime(&naive))
}

pub fn number_bound(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn upper_q(query: &mut ListQuery) {
        if let Some(q) = query.q.as_mut() {
            *q = q.to_uppercase();
        }
    }

    static TEST_INDEX: IndexConfig = IndexConfig {
        sorts: &[
            SortDef { key: "code", column: "t.code" },
            SortDef { key: "name", column: "t.name" },
        ],
        default_sort: "code",
        default_dir: SortDir::Asc,
        default_per_page: 15,
        max_per_page: 100,
        filters: &[
            FilterDef { key: "is_active", column: "t.is_active", kind: FilterKind::Bool },
            FilterDef { key: "market_id", column: "t.market_id", kind: FilterKind::Uuid },
            FilterDef { key: "name", column: "t.name", kind: FilterKind::Text },
            FilterDef { key: "event", column: "t.event", kind: FilterKind::Choice(&["created", "deleted"]) },
            FilterDef { key: "area", column: "t.area", kind: FilterKind::NumberRange },
            FilterDef { key: "created_at", column: "t.created_at", kind: FilterKind::DateRange },
        ],
        search: &["t.code", "t.name"],
        sanitize: Some(upper_q),
    };

    fn input(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("input must be an object"),
        }
    }

    #[rstest]
    #[case(json!({}), 15)]
    #[case(json!({ "per_page": "50" }), 50)]
    #[case(json!({ "per_page": "0" }), 1)]
    #[case(json!({ "per_page": "-20" }), 1)]
    #[case(json!({ "per_page": "500" }), 100)]
    #[case(json!({ "per_page": 100 }), 100)]
    #[case(json!({ "per_page": "99999999999999999999999" }), 100)]
    fn per_page_is_always_within_bounds(#[case] raw: Value, #[case] expected: u32) {
        let query = normalize(&input(raw), &TEST_INDEX).unwrap();
        assert_eq!(query.per_page, expected);
        assert!((1..=TEST_INDEX.max_per_page).contains(&query.per_page));
    }

    #[test]
    fn non_numeric_per_page_is_a_field_error() {
        let errors = normalize(&input(json!({ "per_page": "many" })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("per_page"));
    }

    #[rstest]
    #[case("0")]
    #[case("-1")]
    #[case("abc")]
    fn invalid_page_is_rejected(#[case] page: &str) {
        let errors = normalize(&input(json!({ "page": page })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("page"));
    }

    #[test]
    fn dir_is_lowercased_and_defaults_apply() {
        let query = normalize(&input(json!({ "dir": "DESC", "sort": "name", "page": "3" })), &TEST_INDEX).unwrap();
        assert_eq!(query.dir, SortDir::Desc);
        assert_eq!(query.sort, "name");
        assert_eq!(query.page, 3);
        assert_eq!(query.offset(), 30);

        let query = normalize(&Map::new(), &TEST_INDEX).unwrap();
        assert_eq!(query, ListQuery::defaults(&TEST_INDEX));
    }

    #[test]
    fn rejects_sort_outside_allow_list_and_bad_dir() {
        let errors = normalize(&input(json!({ "sort": "password", "dir": "up" })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("sort"));
        assert!(errors.contains("dir"));
    }

    #[test]
    fn rejects_unknown_filter_keys() {
        let errors = normalize(&input(json!({ "filters": { "deleted_at": "x" } })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("filters.deleted_at"));
    }

    #[rstest]
    #[case("true", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("0", false)]
    fn coerces_string_booleans(#[case] raw: &str, #[case] expected: bool) {
        let query = normalize(&input(json!({ "filters": { "is_active": raw } })), &TEST_INDEX).unwrap();
        assert_eq!(query.filter("is_active"), Some(&Value::Bool(expected)));
    }

    #[test]
    fn non_boolean_bool_filter_fails() {
        let errors = normalize(&input(json!({ "filters": { "is_active": "maybe" } })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("filters.is_active"));
    }

    #[test]
    fn text_filters_are_not_coerced() {
        let query = normalize(&input(json!({ "filters": { "name": "1" } })), &TEST_INDEX).unwrap();
        assert_eq!(query.filter("name"), Some(&json!("1")));
    }

    #[rstest]
    #[case(json!({ "from": "10", "to": "2" }), json!({ "from": "2", "to": "10" }))]
    #[case(json!({ "from": 7.5, "to": 1 }), json!({ "from": 1, "to": 7.5 }))]
    #[case(json!({ "from": "1", "to": "0" }), json!({ "from": "0", "to": "1" }))]
    #[case(json!({ "from": "2", "to": "10" }), json!({ "from": "2", "to": "10" }))]
    #[case(
        json!({ "from": "9007199254740993", "to": "9007199254740992" }),
        json!({ "from": "9007199254740992", "to": "9007199254740993" })
    )]
    fn numeric_ranges_end_up_ordered(#[case] raw: Value, #[case] expected: Value) {
        let query = normalize(&input(json!({ "filters": { "area": raw } })), &TEST_INDEX).unwrap();
        assert_eq!(query.filter("area"), Some(&expected));
    }

    #[rstest]
    #[case("2024-05-01", "2024-01-31")]
    #[case("2024-05-01T10:00:00Z", "2024-05-01 09:00:00")]
    #[case("31/12/2024", "2024-01-01")]
    fn date_ranges_end_up_ordered(#[case] from: &str, #[case] to: &str) {
        let query = normalize(
            &input(json!({ "filters": { "created_at": { "from": from, "to": to } } })),
            &TEST_INDEX,
        )
        .unwrap();
        let range = query.filter("created_at").unwrap();
        let lo = parse_datetime(range["from"].as_str().unwrap()).unwrap();
        let hi = parse_datetime(range["to"].as_str().unwrap()).unwrap();
        assert!(lo <= hi);
        assert_eq!(range["from"], json!(to));
    }

    #[test]
    fn invalid_range_bounds_are_field_errors() {
        let errors = normalize(
            &input(json!({ "filters": {
                "area": { "from": "abc" },
                "created_at": { "to": "2024-13-45", "step": "1" }
            } })),
            &TEST_INDEX,
        )
        .unwrap_err();
        assert!(errors.contains("filters.area.from"));
        assert!(errors.contains("filters.created_at.to"));
        assert!(errors.contains("filters.created_at.step"));
    }

    #[test]
    fn malformed_dates_are_left_unswapped() {
        let mut value = json!({ "from": "2024-99-99", "to": "2024-01-01" });
        swap_ranges(&mut value);
        assert_eq!(value, json!({ "from": "2024-99-99", "to": "2024-01-01" }));
    }

    #[test]
    fn mixed_number_and_date_ranges_are_never_swapped() {
        let mut value = json!({ "outer": { "from": "2024-01-01", "to": 5 } });
        swap_ranges(&mut value);
        assert_eq!(value, json!({ "outer": { "from": "2024-01-01", "to": 5 } }));
    }

    #[test]
    fn nested_ranges_are_swapped_recursively() {
        let mut value = json!({ "a": { "b": { "from": 9, "to": 3 } } });
        swap_ranges(&mut value);
        assert_eq!(value, json!({ "a": { "b": { "from": 3, "to": 9 } } }));
    }

    #[test]
    fn coercion_skips_range_bounds() {
        let mut value = json!({ "flag": "1", "range": { "from": "0", "to": "1" }, "list": ["false"] });
        coerce_booleans(&mut value);
        assert_eq!(value, json!({ "flag": true, "range": { "from": "0", "to": "1" }, "list": [false] }));
    }

    #[test]
    fn non_object_filters_become_empty() {
        let query = normalize(&input(json!({ "filters": "oops" })), &TEST_INDEX).unwrap();
        assert!(query.filters.is_empty());

        let query = normalize(&input(json!({ "filters": ["a"] })), &TEST_INDEX).unwrap();
        assert!(query.filters.is_empty());
    }

    #[test]
    fn empty_filter_values_are_dropped() {
        let query = normalize(
            &input(json!({ "filters": { "name": "", "market_id": null, "area": { "from": "" } } })),
            &TEST_INDEX,
        )
        .unwrap();
        assert!(query.filters.is_empty());
    }

    #[test]
    fn search_is_trimmed_bounded_and_sanitized() {
        let query = normalize(&input(json!({ "q": "  bod  " })), &TEST_INDEX).unwrap();
        assert_eq!(query.q.as_deref(), Some("BOD"));

        let errors = normalize(&input(json!({ "q": "x".repeat(256) })), &TEST_INDEX).unwrap_err();
        assert!(errors.contains("q"));
    }

    #[test]
    fn choice_and_uuid_filters_are_checked() {
        let errors = normalize(
            &input(json!({ "filters": { "event": "exploded", "market_id": "not-a-uuid" } })),
            &TEST_INDEX,
        )
        .unwrap_err();
        assert!(errors.contains("filters.event"));
        assert!(errors.contains("filters.market_id"));
    }

    #[test]
    fn upper_date_bound_covers_the_whole_day() {
        let to = date_bound(&json!("2024-01-31"), true).unwrap();
        let from = date_bound(&json!("2024-01-31"), false).unwrap();
        assert_eq!(to.date_naive(), from.date_naive());
        assert!(to > from);
        assert_eq!(number_bound(&json!("12.50")), Some(Decimal::new(1250, 2)));
    }
}
