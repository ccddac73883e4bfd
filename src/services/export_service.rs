// src/services/export_service.rs

use std::path::{Path, PathBuf};

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use genpdf::{elements, style, Element};
use rust_xlsxwriter::{Format, Workbook};
use serde_json::{Map, Value};

use crate::{catalogs::ExportColumn, common::error::AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
    Pdf,
}

impl ExportFormat {
    /// Sem `format` → CSV. Qualquer outro valor desconhecido é erro de campo.
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("csv") => Ok(ExportFormat::Csv),
            Some("xlsx") => Ok(ExportFormat::Xlsx),
            Some("json") => Ok(ExportFormat::Json),
            Some("pdf") => Ok(ExportFormat::Pdf),
            Some(_) => Err(AppError::field("format", "Formato no soportado. Use csv, xlsx, json o pdf.")),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Arquivo pronto para download.
#[derive(Debug)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl IntoResponse for ExportFile {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename);
        (
            [
                (header::CONTENT_TYPE, self.content_type.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

pub fn export_filename(slug: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("{}_{}.{}", slug, now.format("%Y%m%d_%H%M%S"), format.extension())
}

// Valor da célula como texto (CSV, PDF)
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(true)) => "Sí".to_string(),
        Some(Value::Bool(false)) => "No".to_string(),
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string(),
            Err(_) => s.clone(),
        },
        Some(other) => other.to_string(),
    }
}

pub fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\r', '\n']) || text.starts_with(' ') || text.ends_with(' ') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

pub fn render_csv(columns: &[ExportColumn], rows: &[Map<String, Value>]) -> Vec<u8> {
    // BOM para o Excel reconhecer UTF-8
    let mut out = String::from("\u{FEFF}");

    let header: Vec<String> = columns.iter().map(|c| csv_field(c.header)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");

    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&cell_text(row.get(c.key))))
            .collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }

    out.into_bytes()
}

pub fn render_json(columns: &[ExportColumn], rows: &[Map<String, Value>]) -> Result<Vec<u8>, AppError> {
    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = columns
                .iter()
                .map(|c| (c.key.to_string(), row.get(c.key).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(object)
        })
        .collect();

    serde_json::to_vec_pretty(&items).map_err(|e| AppError::ExportError(e.to_string()))
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> AppError {
    AppError::ExportError(e.to_string())
}

pub fn render_xlsx(title: &str, columns: &[ExportColumn], rows: &[Map<String, Value>]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    // Nome de aba: no máximo 31 caracteres
    let sheet_name: String = title.chars().take(31).collect();
    worksheet.set_name(&sheet_name).map_err(xlsx_error)?;

    let bold = Format::new().set_bold();
    for (col, column) in columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, column.header, &bold)
            .map_err(xlsx_error)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, column) in columns.iter().enumerate() {
            let c = col as u16;
            match row.get(column.key) {
                Some(Value::Number(n)) => {
                    if let Some(f) = n.as_f64() {
                        worksheet.write_number(r, c, f).map_err(xlsx_error)?;
                    }
                }
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(r, c, *b).map_err(xlsx_error)?;
                }
                other => {
                    let text = cell_text(other);
                    if !text.is_empty() {
                        worksheet.write_string(r, c, &text).map_err(xlsx_error)?;
                    }
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

pub fn render_pdf(
    fonts_dir: &Path,
    title: &str,
    columns: &[ExportColumn],
    rows: &[Map<String, Value>],
) -> Result<Vec<u8>, AppError> {
    // Carrega a fonte da pasta configurada
    let font_family = genpdf::fonts::from_files(fonts_dir, "Roboto", None)
        .map_err(|_| AppError::FontNotFound(format!("Fuente no encontrada en {}", fonts_dir.display())))?;

    let mut doc = genpdf::Document::new(font_family);
    doc.set_title(title);
    doc.set_font_size(8);
    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(elements::Paragraph::new(title).styled(style::Style::new().bold().with_font_size(14)));
    doc.push(elements::Paragraph::new(format!(
        "Generado: {} | Registros: {}",
        Utc::now().format("%d/%m/%Y %H:%M"),
        rows.len()
    )));
    doc.push(elements::Break::new(1.5));

    let mut table = elements::TableLayout::new(vec![1; columns.len().max(1)]);
    table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));

    let style_bold = style::Style::new().bold();
    let mut header = table.row();
    for column in columns {
        header.push_element(elements::Paragraph::new(column.header).styled(style_bold));
    }
    header.push().map_err(|e| AppError::ExportError(e.to_string()))?;

    for row in rows {
        let mut line = table.row();
        for column in columns {
            line.push_element(elements::Paragraph::new(cell_text(row.get(column.key))));
        }
        line.push().map_err(|e| AppError::ExportError(e.to_string()))?;
    }

    doc.push(table);

    // Renderiza para buffer (memória)
    let mut buffer = Vec::new();
    doc.render(&mut buffer)
        .map_err(|e| AppError::ExportError(e.to_string()))?;

    Ok(buffer)
}

#[derive(Clone)]
pub struct ExportService {
    fonts_dir: PathBuf,
    max_rows: i64,
}

impl ExportService {
    pub fn new(fonts_dir: PathBuf, max_rows: i64) -> Self {
        Self { fonts_dir, max_rows }
    }

    pub fn max_rows(&self) -> i64 {
        self.max_rows
    }

    /// Serializa as linhas e gera o arquivo numa thread de bloqueio.
    pub async fn export<T: serde::Serialize>(
        &self,
        slug: &'static str,
        title: &'static str,
        columns: &'static [ExportColumn],
        rows: &[T],
        format: ExportFormat,
    ) -> Result<ExportFile, AppError> {
        let rows: Vec<Map<String, Value>> = rows
            .iter()
            .map(|row| match serde_json::to_value(row) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Ok(Map::new()),
                Err(e) => Err(AppError::ExportError(e.to_string())),
            })
            .collect::<Result<_, _>>()?;

        let fonts_dir = self.fonts_dir.clone();
        let bytes = tokio::task::spawn_blocking(move || match format {
            ExportFormat::Csv => Ok(render_csv(columns, &rows)),
            ExportFormat::Json => render_json(columns, &rows),
            ExportFormat::Xlsx => render_xlsx(title, columns, &rows),
            ExportFormat::Pdf => render_pdf(&fonts_dir, title, columns, &rows),
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de exportação: {}", e))??;

        tracing::info!("📄 Exportação {} ({}) com {} bytes", slug, format.extension(), bytes.len());

        Ok(ExportFile {
            filename: export_filename(slug, format, Utc::now()),
            content_type: format.content_type(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    static COLUMNS: &[ExportColumn] = &[
        ExportColumn { key: "code", header: "Código" },
        ExportColumn { key: "name", header: "Nombre" },
        ExportColumn { key: "is_active", header: "Activo" },
    ];

    fn rows() -> Vec<Map<String, Value>> {
        let Value::Object(first) = json!({ "code": "BOD", "name": "Bodega \"Norte\", S.A.", "is_active": true }) else {
            unreachable!()
        };
        let Value::Object(second) = json!({ "code": "MER", "name": null, "is_active": false }) else {
            unreachable!()
        };
        vec![first, second]
    }

    #[rstest]
    #[case(None, ExportFormat::Csv)]
    #[case(Some("XLSX"), ExportFormat::Xlsx)]
    #[case(Some(" json "), ExportFormat::Json)]
    #[case(Some("pdf"), ExportFormat::Pdf)]
    fn parses_known_formats(#[case] raw: Option<&str>, #[case] expected: ExportFormat) {
        assert_eq!(ExportFormat::parse(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_format_is_a_field_error() {
        match ExportFormat::parse(Some("docx")) {
            Err(AppError::ValidationError(errors)) => assert!(errors.contains("format")),
            other => panic!("esperava erro de validação, veio {:?}", other),
        }
    }

    #[rstest]
    #[case("simple", "simple")]
    #[case("a,b", "\"a,b\"")]
    #[case("dice \"hola\"", "\"dice \"\"hola\"\"\"")]
    #[case("linea\nnueva", "\"linea\nnueva\"")]
    #[case(" espacio", "\" espacio\"")]
    fn quotes_csv_fields(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(csv_field(input), expected);
    }

    #[test]
    fn csv_has_bom_header_and_crlf() {
        let bytes = render_csv(COLUMNS, &rows());
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = text.trim_start_matches('\u{FEFF}').split("\r\n").collect();
        assert_eq!(lines[0], "Código,Nombre,Activo");
        assert_eq!(lines[1], "BOD,\"Bodega \"\"Norte\"\", S.A.\",Sí");
        assert_eq!(lines[2], "MER,,No");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn json_keeps_only_export_columns() {
        let mut extra = rows();
        extra[0].insert("secret".into(), json!("x"));

        let bytes = render_json(COLUMNS, &extra).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed[0], json!({ "code": "BOD", "name": "Bodega \"Norte\", S.A.", "is_active": true }));
        assert!(parsed[0].get("secret").is_none());
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = render_xlsx("Bancos", COLUMNS, &rows()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn missing_fonts_are_reported() {
        let result = render_pdf(Path::new("/nao/existe"), "Bancos", COLUMNS, &rows());
        assert!(matches!(result, Err(AppError::FontNotFound(_))));
    }

    #[test]
    fn filename_uses_slug_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_filename("document-types", ExportFormat::Xlsx, now), "document-types_20240309_140507.xlsx");
    }

    #[test]
    fn dates_are_rendered_readably() {
        let value = json!("2024-03-09T14:05:07.123456Z");
        assert_eq!(cell_text(Some(&value)), "2024-03-09 14:05:07");
    }
}
